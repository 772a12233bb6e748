//! 전송 싱크와 배치 전송기
//!
//! [`RecordSink`]는 와이어 한 종류를 담당하고, [`BatchSender`]가 그 위에서
//! 벌크 분할, 호스트 식별 필드 부착, 재시도/폐기 정책을 공통으로
//! 처리합니다.

use metrics::counter;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::TailError;
use tailpost_core::config::{SinkConfig, SourceConfig};
use tailpost_core::metrics::{
    LABEL_SINK, LABEL_SOURCE, SINK_BATCHES_DROPPED_TOTAL, SINK_FLUSHES_TOTAL,
    SINK_SEND_RETRIES_TOTAL,
};
use tailpost_core::types::Record;

pub mod forward;
pub mod stream;

pub use forward::ForwardSink;
pub use stream::{KinesisStreamClient, StreamClient, StreamSink};

/// 와이어 한 종류를 담당하는 싱크 trait
///
/// 배치는 (epoch 초, 레코드) 쌍의 목록이며, 전송 단위의 원자성은
/// 구현체가 보장할 필요가 없습니다. 실패 시 재시도는 [`BatchSender`]가
/// 처리합니다.
pub trait RecordSink: Send {
    /// 메트릭 레이블에 쓰는 싱크 이름
    fn name(&self) -> &'static str;

    /// 배치 하나를 전송합니다.
    fn send(
        &mut self,
        tag: &str,
        batch: &[(i64, Record)],
    ) -> impl Future<Output = Result<(), TailError>> + Send;
}

/// 설정으로 선택되는 싱크
pub enum Sink {
    /// fluent-forward 직접 전송
    Forward(ForwardSink),
    /// Kinesis 집계 전송
    Stream(StreamSink<KinesisStreamClient>),
}

impl Sink {
    /// 싱크 설정으로부터 싱크를 만듭니다.
    pub async fn from_config(cfg: &SinkConfig) -> Result<Self, TailError> {
        match cfg {
            SinkConfig::Forward { host, port } => {
                Ok(Sink::Forward(ForwardSink::new(host.clone(), *port)))
            }
            SinkConfig::Stream {
                stream_name,
                region,
                access_key,
                secret_key,
                max_payload_size,
            } => {
                let client = KinesisStreamClient::connect(region, access_key, secret_key).await;
                Ok(Sink::Stream(StreamSink::new(
                    client,
                    stream_name.clone(),
                    *max_payload_size,
                )))
            }
        }
    }
}

impl RecordSink for Sink {
    fn name(&self) -> &'static str {
        match self {
            Sink::Forward(s) => s.name(),
            Sink::Stream(s) => s.name(),
        }
    }

    async fn send(&mut self, tag: &str, batch: &[(i64, Record)]) -> Result<(), TailError> {
        match self {
            Sink::Forward(s) => s.send(tag, batch).await,
            Sink::Stream(s) => s.send(tag, batch).await,
        }
    }
}

/// 벌크 분할과 재시도 정책을 담당하는 전송기
///
/// 와이어 태그는 `{호스트명(소문자)}.{태그}.data`이고, 모든 레코드에
/// 송신 호스트 식별 필드(`sname_`, `saddr_`)가 붙습니다.
pub struct BatchSender<S> {
    sink: S,
    source_tag: String,
    wire_tag: String,
    sname: String,
    saddr: String,
    bulk_size: usize,
    max_send_retry: u32,
    send_retry: u32,
    echo: bool,
}

impl<S: RecordSink> BatchSender<S> {
    /// 소스 설정으로부터 전송기를 만듭니다.
    pub fn new(sink: S, cfg: &SourceConfig) -> Self {
        let hostname = gethostname::gethostname().to_string_lossy().into_owned();
        let saddr = resolve_host_addr(&hostname);
        let wire_tag = format!("{}.{}.data", hostname.to_lowercase(), cfg.tag);
        BatchSender {
            sink,
            source_tag: cfg.tag.clone(),
            wire_tag,
            sname: hostname,
            saddr,
            bulk_size: cfg.bulk_size,
            max_send_retry: cfg.max_send_retry,
            send_retry: 0,
            echo: cfg.echo,
        }
    }

    /// 전송에 쓰이는 와이어 태그
    pub fn wire_tag(&self) -> &str {
        &self.wire_tag
    }

    /// 레코드 목록을 벌크 단위로 전송합니다.
    ///
    /// 반환값은 위치를 전진시켜도 되는 레코드 수입니다. 재시도 상한에
    /// 도달해 폐기된 배치도 여기에 포함됩니다 (같은 데이터로 무한히
    /// 막히는 것을 피하기 위해). 상한 이전의 실패는 에러로 반환되며
    /// 호출자는 위치를 전진시키지 않아야 합니다.
    pub async fn deliver(&mut self, records: Vec<Record>) -> Result<usize, TailError> {
        if records.is_empty() {
            return Ok(0);
        }

        let ts = chrono::Utc::now().timestamp();
        let mut batch: Vec<(i64, Record)> = Vec::with_capacity(self.bulk_size);
        let mut sent = 0usize;

        for mut record in records {
            record.insert("sname_", Value::String(self.sname.clone()));
            record.insert("saddr_", Value::String(self.saddr.clone()));
            if self.echo {
                debug!(tag = %self.wire_tag, record = %record, "echo");
            }
            batch.push((ts, record));
            if batch.len() >= self.bulk_size {
                self.flush(&batch).await?;
                sent += batch.len();
                batch.clear();
            }
        }
        if !batch.is_empty() {
            self.flush(&batch).await?;
            sent += batch.len();
        }

        self.send_retry = 0;
        Ok(sent)
    }

    async fn flush(&mut self, batch: &[(i64, Record)]) -> Result<(), TailError> {
        match self.sink.send(&self.wire_tag, batch).await {
            Ok(()) => {
                counter!(
                    SINK_FLUSHES_TOTAL,
                    LABEL_SOURCE => self.source_tag.clone(),
                    LABEL_SINK => self.sink.name()
                )
                .increment(1);
                self.send_retry = 0;
                Ok(())
            }
            Err(e) => {
                self.send_retry += 1;
                counter!(
                    SINK_SEND_RETRIES_TOTAL,
                    LABEL_SOURCE => self.source_tag.clone(),
                    LABEL_SINK => self.sink.name()
                )
                .increment(1);

                if self.send_retry >= self.max_send_retry {
                    error!(
                        tag = %self.wire_tag,
                        records = batch.len(),
                        retries = self.send_retry,
                        error = %e,
                        "giving up on batch, data lost"
                    );
                    counter!(
                        SINK_BATCHES_DROPPED_TOTAL,
                        LABEL_SOURCE => self.source_tag.clone(),
                        LABEL_SINK => self.sink.name()
                    )
                    .increment(1);
                    self.send_retry = 0;
                    Ok(())
                } else {
                    warn!(
                        tag = %self.wire_tag,
                        attempt = self.send_retry,
                        max = self.max_send_retry,
                        error = %e,
                        "send failed, will retry next tick"
                    );
                    Err(e)
                }
            }
        }
    }
}

/// 호스트명으로 송신 주소를 찾습니다. 실패하면 루프백.
fn resolve_host_addr(hostname: &str) -> String {
    use std::net::ToSocketAddrs;
    (hostname, 0)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "127.0.0.1".to_owned())
}
