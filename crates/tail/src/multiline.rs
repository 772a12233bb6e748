//! 다중행 레코드 파서
//!
//! 한 레코드가 여러 줄에 걸치는 로그를 다룹니다. 레코드 경계는 다음
//! 헤더가 나타나야 확정되므로, 파서는 tick을 넘어 상태를 유지하고
//! 완성된 레코드만 ready 큐로 내보냅니다.
//!
//! 두 종류를 지원합니다:
//!
//! - [`HeaderBodyParser`]: 헤더 줄 + 반복 key:value 줄. Request/Response
//!   같은 섹션 전환 줄이 이후 키에 접두어를 붙입니다.
//! - [`SentinelBodyParser`]: 헤더/섹션 줄 + `[Body]` 류의 sentinel 이후
//!   종료 줄까지 raw로 누적한 JSON 본문.

use std::collections::VecDeque;

use serde_json::Value;
use tracing::warn;

use crate::dsl::{KeyValue, LineMatcher, PatternSet};
use crate::error::TailError;
use tailpost_core::config::MultilineConfig;
use tailpost_core::types::Record;

/// 다중행 파서 공통 trait
///
/// 구현체는 줄을 순서대로 받아 내부 버퍼를 채우고, 완성된 레코드를
/// [`take_record`](LineParser::take_record)로 내보냅니다. 마지막
/// 레코드는 다음 헤더가 올 때까지 미완성으로 남습니다.
pub trait LineParser: Send {
    /// 줄 하나를 처리합니다. 인식하지 못한 줄이면 false.
    fn parse_line(&mut self, line: &str) -> bool;

    /// 지금까지 완성된 레코드 수
    fn completed(&self) -> u64;

    /// 완성된 레코드를 하나 꺼냅니다.
    fn take_record(&mut self) -> Option<Record>;

    /// 미완성 버퍼를 강제로 완성 처리합니다 (소스 종료 시).
    fn finish(&mut self);
}

/// 다중행 설정으로부터 파서를 만듭니다.
///
/// 패턴은 `set`에 등록된 DSL 참조를 쓸 수 있습니다.
pub fn from_config(
    set: &PatternSet,
    ml: &MultilineConfig,
) -> Result<Box<dyn LineParser>, TailError> {
    match ml.kind.as_str() {
        "header_body" => {
            let Some(kv_pattern) = ml.key_value.as_deref() else {
                return Err(TailError::Config {
                    field: "multiline.key_value".to_owned(),
                    reason: "header_body parser requires a key_value pattern".to_owned(),
                });
            };
            let header = set.matcher(&ml.header)?;
            let method = match ml.method.as_deref() {
                Some(pattern) => Some(set.matcher(pattern)?),
                None => None,
            };
            let key_value = set.key_value(kv_pattern)?;
            Ok(Box::new(HeaderBodyParser::new(header, method, key_value)))
        }
        "sentinel_body" => {
            let Some(sentinel) = ml.body_sentinel.as_deref() else {
                return Err(TailError::Config {
                    field: "multiline.body_sentinel".to_owned(),
                    reason: "sentinel_body parser requires a body_sentinel pattern".to_owned(),
                });
            };
            let header = set.matcher(&ml.header)?;
            let mut sections = Vec::with_capacity(ml.sections.len());
            for pattern in &ml.sections {
                sections.push(set.matcher(pattern)?);
            }
            let body_sentinel = set.matcher(sentinel)?;
            Ok(Box::new(SentinelBodyParser::new(
                header,
                sections,
                body_sentinel,
                ml.terminator.clone(),
            )))
        }
        other => Err(TailError::Config {
            field: "multiline.kind".to_owned(),
            reason: format!("unknown multiline kind '{other}'"),
        }),
    }
}

/// 헤더 + 반복 key:value 형식 파서
///
/// 헤더가 새 레코드를 열고 직전 레코드를 완성시킵니다. method 줄이
/// `Request*`/`Response*`면 이후 key:value 키에 `req-`/`res-` 접두어가
/// 붙습니다.
pub struct HeaderBodyParser {
    header: LineMatcher,
    method: Option<LineMatcher>,
    key_value: KeyValue,
    prefix: Option<&'static str>,
    buf: Record,
    ready: VecDeque<Record>,
    completed: u64,
}

impl HeaderBodyParser {
    /// 구성 요소로부터 파서를 만듭니다.
    pub fn new(header: LineMatcher, method: Option<LineMatcher>, key_value: KeyValue) -> Self {
        HeaderBodyParser {
            header,
            method,
            key_value,
            prefix: None,
            buf: Record::new(),
            ready: VecDeque::new(),
            completed: 0,
        }
    }

    fn flush(&mut self) {
        if !self.buf.is_empty() {
            self.ready.push_back(std::mem::take(&mut self.buf));
            self.completed += 1;
        }
        self.prefix = None;
    }

    fn method_line(&mut self, line: &str) -> bool {
        let Some(matcher) = &self.method else {
            return false;
        };
        let Some(caps) = matcher.captures(line) else {
            return false;
        };
        let Some((_, Value::String(method))) = caps.iter().next() else {
            return false;
        };
        if let Some(kind) = method.strip_prefix("Request") {
            self.prefix = Some("req");
            self.buf.insert("type", Value::String(kind.to_owned()));
        } else if method.starts_with("Response") {
            self.prefix = Some("res");
        }
        true
    }
}

impl LineParser for HeaderBodyParser {
    fn parse_line(&mut self, line: &str) -> bool {
        let pairs = self.key_value.pairs(line);
        if !pairs.is_empty() {
            for (key, value) in pairs {
                let key = match self.prefix {
                    Some(prefix) => format!("{prefix}-{key}"),
                    None => key,
                };
                self.buf.insert(key, Value::String(value));
            }
            return true;
        }

        if let Some(caps) = self.header.captures(line) {
            self.flush();
            self.buf = caps;
            return true;
        }

        self.method_line(line)
    }

    fn completed(&self) -> u64 {
        self.completed
    }

    fn take_record(&mut self) -> Option<Record> {
        self.ready.pop_front()
    }

    fn finish(&mut self) {
        self.flush();
    }
}

/// 헤더/섹션 + sentinel 본문 형식 파서
///
/// `body_sentinel` 이후의 줄은 종료 줄까지 raw로 모아 JSON으로
/// 해석합니다. 파싱에 실패하면 `body` 필드에 원문을 담습니다.
pub struct SentinelBodyParser {
    header: LineMatcher,
    sections: Vec<LineMatcher>,
    body_sentinel: LineMatcher,
    terminator: String,
    accumulating: bool,
    body: Vec<String>,
    buf: Record,
    ready: VecDeque<Record>,
    completed: u64,
}

impl SentinelBodyParser {
    /// 구성 요소로부터 파서를 만듭니다.
    pub fn new(
        header: LineMatcher,
        sections: Vec<LineMatcher>,
        body_sentinel: LineMatcher,
        terminator: String,
    ) -> Self {
        SentinelBodyParser {
            header,
            sections,
            body_sentinel,
            terminator,
            accumulating: false,
            body: Vec::new(),
            buf: Record::new(),
            ready: VecDeque::new(),
            completed: 0,
        }
    }

    fn flush(&mut self) {
        if self.accumulating || !self.body.is_empty() {
            // 종료 줄 없이 레코드가 끝난 경우 본문을 원문으로 보존
            let text = std::mem::take(&mut self.body).join("\n");
            self.buf.insert("body", Value::String(text));
            self.accumulating = false;
        }
        if !self.buf.is_empty() {
            self.ready.push_back(std::mem::take(&mut self.buf));
            self.completed += 1;
        }
    }

    fn merge_json(&mut self, text: &str) {
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => self.buf.merge_object(map),
            Ok(other) => {
                self.buf.insert("body", other);
            }
            Err(e) => {
                warn!(error = %e, "body is not valid json, keeping raw text");
                self.buf.insert("body", Value::String(text.to_owned()));
            }
        }
    }
}

impl LineParser for SentinelBodyParser {
    fn parse_line(&mut self, line: &str) -> bool {
        if self.accumulating {
            if line == self.terminator {
                self.body.push(line.to_owned());
                let text = std::mem::take(&mut self.body).join("\n");
                self.merge_json(&text);
                self.accumulating = false;
            } else {
                self.body.push(line.to_owned());
            }
            return true;
        }

        if let Some(caps) = self.header.captures(line) {
            self.flush();
            self.buf = caps;
            return true;
        }

        for section in &self.sections {
            if let Some(caps) = section.captures(line) {
                self.buf.merge(caps);
                return true;
            }
        }

        if self.body_sentinel.is_match(line) {
            self.accumulating = true;
            self.body.clear();
            return true;
        }

        // 한 줄짜리 JSON 객체는 바로 병합
        let trimmed = line.trim();
        if trimmed.starts_with('{') && trimmed.ends_with('}') {
            self.merge_json(trimmed);
            return true;
        }

        false
    }

    fn completed(&self) -> u64 {
        self.completed
    }

    fn take_record(&mut self) -> Option<Record> {
        self.ready.pop_front()
    }

    fn finish(&mut self) {
        self.flush();
    }
}
