//! tail 엔진 — 소스 하나의 tick 상태 기계
//!
//! tick 한 번은 로테이션 확인, 새 줄 읽기/파싱/전송, 위치 저장,
//! 조용할 때의 대상 재탐색으로 이루어집니다. 전송 위치는 전송이
//! 성공한 뒤에만 저장하므로 실패 시 같은 데이터가 다음 tick에
//! 다시 시도됩니다.

use std::path::PathBuf;
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::time::Instant;
use tracing::{error, warn};

use crate::error::TailError;
use crate::fs;
use crate::multiline::LineParser;
use crate::position::{PositionStore, StartPolicy};
use crate::resolver::TargetResolver;
use crate::sink::{BatchSender, RecordSink};
use tailpost_core::config::SourceConfig;
use tailpost_core::error::TailpostError;
use tailpost_core::metrics::{
    LABEL_SOURCE, TAIL_BYTES_READ_TOTAL, TAIL_PARSE_ERRORS_TOTAL, TAIL_RECORDS_SENT_TOTAL,
    TAIL_ROTATIONS_TOTAL, TAIL_SENT_POSITION_BYTES,
};
use tailpost_core::pipeline::Tailer;
use tailpost_core::types::{Record, TickReport};

/// 줄에서 레코드를 만드는 방법
pub enum Extractor {
    /// 파싱 없이 `message` 필드로 감싸는 pass-through
    Raw,
    /// 한 줄 형식 매칭
    Format(crate::dsl::PatternSet),
    /// 다중행 파서 (tick을 넘어 상태 유지)
    Multiline(Box<dyn LineParser>),
}

/// 소스 하나의 tail 엔진
pub struct TailEngine<S> {
    tag: String,
    resolver: TargetResolver,
    positions: PositionStore,
    sender: BatchSender<S>,
    extractor: Extractor,
    start_policy: StartPolicy,
    max_read_buffer: usize,
    send_interval: Duration,
    update_interval: Duration,
    last_send_try: Option<Instant>,
    last_update: Option<Instant>,
    started: bool,
}

impl<S: RecordSink> TailEngine<S> {
    /// 소스 설정과 싱크로 엔진을 만듭니다.
    ///
    /// order 패턴과 DSL은 이 시점에 컴파일되므로 잘못된 설정은 여기서
    /// 드러납니다.
    pub fn new(
        cfg: &SourceConfig,
        pos_dir: impl Into<PathBuf>,
        sink: S,
    ) -> Result<Self, TailError> {
        let resolver = TargetResolver::new(cfg)?;
        let extractor = crate::config::build_extractor(cfg)?;
        let sender = BatchSender::new(sink, cfg);
        Ok(TailEngine {
            tag: cfg.tag.clone(),
            resolver,
            positions: PositionStore::new(pos_dir),
            sender,
            extractor,
            start_policy: StartPolicy {
                max_between_data: cfg.max_between_data,
                lines_on_start: cfg.lines_on_start,
                max_read_buffer: cfg.max_read_buffer,
            },
            max_read_buffer: cfg.max_read_buffer,
            send_interval: Duration::from_secs(cfg.send_interval_secs),
            update_interval: Duration::from_secs(cfg.update_interval_secs),
            last_send_try: None,
            last_update: None,
            started: false,
        })
    }

    fn send_due(&self) -> bool {
        self.last_send_try
            .is_none_or(|t| t.elapsed() >= self.send_interval)
    }

    fn update_due(&self) -> bool {
        self.last_update
            .is_none_or(|t| t.elapsed() >= self.update_interval)
    }

    async fn run_tick(&mut self) -> Result<TickReport, TailError> {
        let mut report = TickReport::default();

        if !self.started {
            self.positions.ensure_dir().await?;
            self.resolver
                .update_target(true, &mut self.positions, &self.start_policy)
                .await?;
            self.started = true;
            self.last_update = Some(Instant::now());
        }

        if self.resolver.has_latest() {
            if self
                .resolver
                .handle_latest_rotation(&mut self.positions)
                .await?
            {
                report.rotated = true;
                counter!(TAIL_ROTATIONS_TOTAL, LABEL_SOURCE => self.tag.clone()).increment(1);
            }
        } else {
            self.resolver.handle_recreate(&mut self.positions).await?;
        }

        if self.resolver.target().is_some() && self.send_due() {
            self.last_send_try = Some(Instant::now());
            match self.send_new_lines().await {
                Ok((sent, read_bytes)) => {
                    report.sent = sent;
                    report.read_bytes = read_bytes;
                }
                Err(e) if e.is_not_found() => {
                    // 읽는 사이에 대상이 지워짐, 다음 재탐색에 맡긴다
                    warn!(tag = %self.tag, "target disappeared while reading");
                    self.resolver.clear_target();
                }
                Err(TailError::LatestFileChanged(_)) => {
                    warn!(
                        tag = %self.tag,
                        "live file changed mid-tick, deferring to rotation handling"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        if !report.rotated && report.sent == 0 && self.update_due() {
            self.last_update = Some(Instant::now());
            self.resolver
                .update_target(false, &mut self.positions, &self.start_policy)
                .await?;
        }

        Ok(report)
    }

    /// 대상에서 완성된 줄을 읽어 파싱/전송하고 위치를 저장합니다.
    async fn send_new_lines(&mut self) -> Result<(usize, u64), TailError> {
        let Some(target) = self.resolver.target().cloned() else {
            return Ok((0, 0));
        };

        let file_pos = fs::file_len(&target.path).await?;
        let sent_pos = self.positions.get(&target.path).await?;

        if sent_pos > file_pos {
            // 저장 위치가 파일보다 앞섬: truncate 혹은 막 일어난 로테이션
            error!(
                tag = %self.tag,
                sent = sent_pos,
                file = file_pos,
                "sent position is beyond file size"
            );
            if self.resolver.has_latest() {
                return Err(TailError::LatestFileChanged(self.tag.clone()));
            }
            return Ok((0, 0));
        }
        if sent_pos == file_pos {
            return Ok((0, 0));
        }

        let (bytes, full) = fs::read_span(&target.path, sent_pos, self.max_read_buffer).await?;
        if full {
            warn!(
                tag = %self.tag,
                buffer = self.max_read_buffer,
                "read buffer full, last line may be split across ticks"
            );
        }

        // 완성된 줄까지만 소비하고 나머지는 다음 tick으로 넘긴다
        let Some(last_nl) = bytes.iter().rposition(|b| *b == b'\n') else {
            return Ok((0, 0));
        };
        let text = String::from_utf8_lossy(&bytes[..=last_nl]);

        let mut records = Vec::new();
        let mut unparsed_warned = false;
        for line in text.split('\n') {
            if line.is_empty() {
                continue;
            }
            match &mut self.extractor {
                Extractor::Raw => records.push(Record::raw(line)),
                Extractor::Format(set) => match set.parse_line(line) {
                    Some(rec) => records.push(rec),
                    None => {
                        // 형식에 맞지 않는 줄은 기록만 남기고 버린다
                        counter!(TAIL_PARSE_ERRORS_TOTAL, LABEL_SOURCE => self.tag.clone())
                            .increment(1);
                        if !unparsed_warned {
                            warn!(tag = %self.tag, line, "line matched no format, dropped");
                            unparsed_warned = true;
                        }
                    }
                },
                Extractor::Multiline(parser) => {
                    if !parser.parse_line(line) {
                        counter!(TAIL_PARSE_ERRORS_TOTAL, LABEL_SOURCE => self.tag.clone())
                            .increment(1);
                        if !unparsed_warned {
                            warn!(tag = %self.tag, line, "unrecognized line, dropped");
                            unparsed_warned = true;
                        }
                    }
                    while let Some(rec) = parser.take_record() {
                        records.push(rec);
                    }
                }
            }
        }

        let read_bytes = (last_nl + 1) as u64;
        let sent = self.sender.deliver(records).await?;
        // 전송이 끝난 뒤에만 위치를 전진시킨다
        self.positions.save(&target.path, sent_pos + read_bytes).await?;

        counter!(TAIL_BYTES_READ_TOTAL, LABEL_SOURCE => self.tag.clone()).increment(read_bytes);
        counter!(TAIL_RECORDS_SENT_TOTAL, LABEL_SOURCE => self.tag.clone())
            .increment(sent as u64);
        gauge!(TAIL_SENT_POSITION_BYTES, LABEL_SOURCE => self.tag.clone())
            .set((sent_pos + read_bytes) as f64);

        Ok((sent, read_bytes))
    }
}

impl<S: RecordSink> Tailer for TailEngine<S> {
    type Position = u64;

    async fn tick(&mut self) -> Result<TickReport, TailpostError> {
        Ok(self.run_tick().await?)
    }

    fn has_target(&self) -> bool {
        self.resolver.target().is_some()
    }

    async fn sent_position(&mut self) -> Result<u64, TailpostError> {
        let Some(target) = self.resolver.target().cloned() else {
            return Err(TailError::NoTarget(self.tag.clone()).into());
        };
        let pos = self.positions.get(&target.path).await?;
        Ok(pos)
    }

    async fn save_position(&mut self, pos: u64) -> Result<(), TailpostError> {
        let Some(target) = self.resolver.target().cloned() else {
            return Err(TailError::NoTarget(self.tag.clone()).into());
        };
        self.positions.save(&target.path, pos).await?;
        Ok(())
    }
}
