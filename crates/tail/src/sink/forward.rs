//! fluent-forward 싱크
//!
//! 수집기(fluentd 호환)로 msgpack `[tag, time, record]` 메시지를 TCP로
//! 보냅니다. 벌크는 메시지를 이어 붙인 스트림이며 ack는 쓰지 않습니다.
//! 연결은 게으르게 맺고, 쓰기 실패 시 버려서 다음 전송에서 다시
//! 맺습니다.

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use super::RecordSink;
use crate::error::TailError;
use tailpost_core::types::Record;

/// fluent-forward TCP 싱크
pub struct ForwardSink {
    host: String,
    port: u16,
    conn: Option<TcpStream>,
}

impl ForwardSink {
    /// 수집기 주소로 싱크를 만듭니다. 연결은 첫 전송 때 맺습니다.
    pub fn new(host: String, port: u16) -> Self {
        ForwardSink {
            host,
            port,
            conn: None,
        }
    }

    fn encode(tag: &str, batch: &[(i64, Record)]) -> Result<Vec<u8>, TailError> {
        let mut payload = Vec::new();
        for (ts, record) in batch {
            let msg = rmp_serde::to_vec(&(tag, ts, record))
                .map_err(|e| TailError::Sink(format!("msgpack encode: {e}")))?;
            payload.extend_from_slice(&msg);
        }
        Ok(payload)
    }
}

impl RecordSink for ForwardSink {
    fn name(&self) -> &'static str {
        "forward"
    }

    async fn send(&mut self, tag: &str, batch: &[(i64, Record)]) -> Result<(), TailError> {
        let payload = Self::encode(tag, batch)?;

        let mut stream = match self.conn.take() {
            Some(stream) => stream,
            None => {
                debug!(host = self.host.as_str(), port = self.port, "connecting");
                TcpStream::connect((self.host.as_str(), self.port))
                    .await
                    .map_err(|e| {
                        TailError::Sink(format!("connect {}:{}: {e}", self.host, self.port))
                    })?
            }
        };

        let result = async {
            stream.write_all(&payload).await?;
            stream.flush().await
        }
        .await;

        match result {
            Ok(()) => {
                self.conn = Some(stream);
                Ok(())
            }
            // 죽은 연결은 버리고 다음 전송에서 다시 맺는다
            Err(e) => Err(TailError::Sink(format!(
                "write {}:{}: {e}",
                self.host, self.port
            ))),
        }
    }
}
