//! 집계 스트림 싱크 (Kinesis)
//!
//! 레코드를 JSON 한 줄씩 직렬화해 개행으로 이어 붙이고, 페이로드 상한에
//! 맞춰 잘라 PutRecord로 보냅니다. 파티션 키는 호출마다 새 UUID라서
//! 샤드에 고르게 퍼집니다.

use bytes::Bytes;
use serde_json::Value;
use tracing::debug;

use super::RecordSink;
use crate::error::TailError;
use tailpost_core::types::Record;

/// PutRecord 응답에서 유지하는 값
#[derive(Debug, Clone)]
pub struct PutAck {
    /// 마지막 시퀀스 번호
    pub sequence_number: String,
    /// 기록된 샤드
    pub shard_id: String,
}

/// 스트림 서비스 클라이언트 trait
///
/// 실제 구현은 [`KinesisStreamClient`]이고, 테스트는 페이로드를 기록하는
/// 목 구현을 씁니다.
pub trait StreamClient: Send {
    /// 페이로드 하나를 스트림에 기록합니다.
    fn put_record(
        &self,
        stream_name: &str,
        data: Bytes,
        partition_key: &str,
    ) -> impl Future<Output = Result<PutAck, TailError>> + Send;
}

/// 개행 구분 JSON 페이로드 집계기
///
/// 줄을 추가했을 때 상한을 넘게 되면 기존 페이로드를 먼저 내보냅니다.
pub struct RecordAggregator {
    max_payload: usize,
    buf: Vec<u8>,
}

impl RecordAggregator {
    /// 페이로드 상한으로 집계기를 만듭니다.
    pub fn new(max_payload: usize) -> Self {
        RecordAggregator {
            max_payload,
            buf: Vec::new(),
        }
    }

    /// 줄 하나를 추가합니다. 상한 초과로 밀려난 페이로드를 반환합니다.
    pub fn push(&mut self, line: &[u8]) -> Option<Bytes> {
        let out = if !self.buf.is_empty() && self.buf.len() + line.len() + 1 > self.max_payload {
            Some(Bytes::from(std::mem::take(&mut self.buf)))
        } else {
            None
        };
        self.buf.extend_from_slice(line);
        self.buf.push(b'\n');
        out
    }

    /// 남아 있는 페이로드를 내보냅니다.
    pub fn flush(&mut self) -> Option<Bytes> {
        if self.buf.is_empty() {
            None
        } else {
            Some(Bytes::from(std::mem::take(&mut self.buf)))
        }
    }
}

/// 집계 스트림 싱크
pub struct StreamSink<C> {
    client: C,
    stream_name: String,
    aggregator: RecordAggregator,
    last_sequence: Option<String>,
    last_shard: Option<String>,
}

impl<C: StreamClient> StreamSink<C> {
    /// 클라이언트와 스트림 이름으로 싱크를 만듭니다.
    pub fn new(client: C, stream_name: String, max_payload_size: usize) -> Self {
        StreamSink {
            client,
            stream_name,
            aggregator: RecordAggregator::new(max_payload_size),
            last_sequence: None,
            last_shard: None,
        }
    }

    /// 마지막 PutRecord의 시퀀스 번호
    pub fn last_sequence(&self) -> Option<&str> {
        self.last_sequence.as_deref()
    }

    /// 마지막 PutRecord가 기록된 샤드
    pub fn last_shard(&self) -> Option<&str> {
        self.last_shard.as_deref()
    }

    async fn put(&mut self, payload: Bytes) -> Result<(), TailError> {
        let key = uuid::Uuid::new_v4().to_string();
        let ack = self
            .client
            .put_record(&self.stream_name, payload, &key)
            .await?;
        debug!(
            stream = self.stream_name.as_str(),
            sequence = ack.sequence_number.as_str(),
            shard = ack.shard_id.as_str(),
            "payload put"
        );
        self.last_sequence = Some(ack.sequence_number);
        self.last_shard = Some(ack.shard_id);
        Ok(())
    }
}

impl<C: StreamClient> RecordSink for StreamSink<C> {
    fn name(&self) -> &'static str {
        "stream"
    }

    async fn send(&mut self, tag: &str, batch: &[(i64, Record)]) -> Result<(), TailError> {
        for (ts, record) in batch {
            // 스트림 소비자가 출처를 알 수 있도록 태그/시각을 필드로 내린다
            let mut entry = Record::new();
            entry.insert("tag_", Value::String(tag.to_owned()));
            entry.insert("ts_", Value::from(*ts));
            entry.merge(record.clone());

            let line = serde_json::to_vec(&entry)
                .map_err(|e| TailError::Sink(format!("json encode: {e}")))?;
            if let Some(payload) = self.aggregator.push(&line) {
                self.put(payload).await?;
            }
        }
        if let Some(payload) = self.aggregator.flush() {
            self.put(payload).await?;
        }
        Ok(())
    }
}

/// aws-sdk-kinesis 기반 클라이언트
pub struct KinesisStreamClient {
    client: aws_sdk_kinesis::Client,
}

impl KinesisStreamClient {
    /// 리전과 자격 증명으로 클라이언트를 만듭니다.
    ///
    /// `access_key`가 비어 있으면 기본 자격 증명 체인(환경변수, 프로파일,
    /// 인스턴스 역할)을 따릅니다.
    pub async fn connect(region: &str, access_key: &str, secret_key: &str) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_owned()));
        if !access_key.is_empty() {
            loader = loader.credentials_provider(aws_credential_types::Credentials::from_keys(
                access_key, secret_key, None,
            ));
        }
        let conf = loader.load().await;
        KinesisStreamClient {
            client: aws_sdk_kinesis::Client::new(&conf),
        }
    }
}

impl StreamClient for KinesisStreamClient {
    async fn put_record(
        &self,
        stream_name: &str,
        data: Bytes,
        partition_key: &str,
    ) -> Result<PutAck, TailError> {
        let out = self
            .client
            .put_record()
            .stream_name(stream_name)
            .data(aws_sdk_kinesis::primitives::Blob::new(data.to_vec()))
            .partition_key(partition_key)
            .send()
            .await
            .map_err(|e| {
                TailError::Sink(aws_sdk_kinesis::error::DisplayErrorContext(&e).to_string())
            })?;
        Ok(PutAck {
            sequence_number: out.sequence_number().to_owned(),
            shard_id: out.shard_id().to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct MockClient {
        payloads: Arc<Mutex<Vec<(String, Bytes, String)>>>,
    }

    impl StreamClient for MockClient {
        async fn put_record(
            &self,
            stream_name: &str,
            data: Bytes,
            partition_key: &str,
        ) -> Result<PutAck, TailError> {
            let mut payloads = self.payloads.lock().unwrap();
            payloads.push((stream_name.to_owned(), data, partition_key.to_owned()));
            Ok(PutAck {
                sequence_number: format!("seq-{}", payloads.len()),
                shard_id: "shard-0".to_owned(),
            })
        }
    }

    #[test]
    fn aggregator_defers_flush_until_limit() {
        let mut agg = RecordAggregator::new(10);
        assert!(agg.push(b"aaaa").is_none());
        // 4 + 1 + 4 + 1 = 10, 상한과 같으므로 아직 유지
        assert!(agg.push(b"bbbb").is_none());
        // 추가 시 초과, 기존 페이로드가 밀려난다
        let flushed = agg.push(b"c").unwrap();
        assert_eq!(&flushed[..], b"aaaa\nbbbb\n");
        assert_eq!(&agg.flush().unwrap()[..], b"c\n");
        assert!(agg.flush().is_none());
    }

    #[tokio::test]
    async fn send_prepends_tag_and_timestamp_fields() {
        let client = MockClient::default();
        let mut sink = StreamSink::new(client.clone(), "audit".to_owned(), 1024);

        let mut rec = Record::new();
        rec.insert("user", json!("kim"));
        sink.send("host.audit.data", &[(1700000000, rec)])
            .await
            .unwrap();

        let payloads = client.payloads.lock().unwrap();
        assert_eq!(payloads.len(), 1);
        let (stream, data, key) = &payloads[0];
        assert_eq!(stream, "audit");
        // 파티션 키는 UUID 형식
        assert_eq!(key.len(), 36);

        let line = std::str::from_utf8(data).unwrap().trim_end();
        // 필드 순서 고정: tag_, ts_ 다음에 레코드 필드
        assert!(line.starts_with(r#"{"tag_":"host.audit.data","ts_":1700000000"#));
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(value["user"], json!("kim"));
    }

    #[tokio::test]
    async fn payload_limit_splits_batch_into_multiple_puts() {
        let client = MockClient::default();
        let mut sink = StreamSink::new(client.clone(), "audit".to_owned(), 100);

        let batch: Vec<(i64, Record)> = (0..4)
            .map(|i| {
                let mut r = Record::new();
                r.insert("filler", json!("x".repeat(40)));
                r.insert("n", json!(i));
                (1700000000, r)
            })
            .collect();
        sink.send("t", &batch).await.unwrap();

        let payloads = client.payloads.lock().unwrap();
        assert!(payloads.len() > 1);
        // 모든 줄을 합치면 레코드 수와 같아야 한다
        let lines: usize = payloads
            .iter()
            .map(|(_, data, _)| data.iter().filter(|b| **b == b'\n').count())
            .sum();
        assert_eq!(lines, 4);
        assert_eq!(sink.last_sequence(), Some(format!("seq-{}", payloads.len()).as_str()));
    }
}
