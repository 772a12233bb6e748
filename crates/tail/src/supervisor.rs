//! 소스 워커 수퍼바이저
//!
//! 소스마다 tokio 태스크 하나가 tick 루프를 돕니다. tick 에러는 워커를
//! 죽이지 않고 경고로 남깁니다 (일시적 I/O 에러가 대부분이므로 다음
//! tick에서 자연히 복구됩니다). 종료는 취소 토큰으로 알리고 모든
//! 워커가 멈출 때까지 기다립니다.

use std::time::Duration;

use metrics::gauge;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tailpost_core::metrics::DAEMON_SOURCES_RUNNING;
use tailpost_core::pipeline::Tailer;

/// 소스 워커들의 생명주기 관리자
#[derive(Default)]
pub struct Supervisor {
    workers: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl Supervisor {
    /// 빈 수퍼바이저를 만듭니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 실행 중인 워커 수
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// tailer 하나를 워커로 올립니다.
    ///
    /// `poll`은 tick 사이의 휴지 시간입니다. tick이 주기보다 오래
    /// 걸리면 쌓인 데이터를 따라잡도록 바로 다음 tick을 돕니다.
    pub fn spawn<T>(&mut self, name: String, mut tailer: T, poll: Duration)
    where
        T: Tailer + 'static,
    {
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            info!(source = name.as_str(), "worker started");
            gauge!(DAEMON_SOURCES_RUNNING).increment(1.0);

            let mut sleep_time = poll;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(sleep_time) => {}
                }

                let began = Instant::now();
                match tailer.tick().await {
                    Ok(report) => {
                        if report.sent > 0 || report.rotated {
                            debug!(
                                source = name.as_str(),
                                sent = report.sent,
                                rotated = report.rotated,
                                "tick"
                            );
                        }
                    }
                    Err(e) => {
                        warn!(source = name.as_str(), error = %e, "tick failed");
                    }
                }
                sleep_time = if began.elapsed() > poll {
                    Duration::ZERO
                } else {
                    poll
                };
            }

            gauge!(DAEMON_SOURCES_RUNNING).decrement(1.0);
            info!(source = name.as_str(), "worker stopped");
        });
        self.workers.push(handle);
    }

    /// 모든 워커에 종료를 알리고 멈출 때까지 기다립니다.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.workers {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task panicked");
            }
        }
    }
}
