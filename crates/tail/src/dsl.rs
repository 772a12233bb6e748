//! 로그 형식 패턴 DSL
//!
//! 정규식 조각을 이름 붙여 재사용하는 작은 DSL입니다. 패턴 문자열 안의
//! `%{name}`은 등록된 토큰/그룹을 참조하고, `%(...)`는 토큰 자신의 캡처
//! 위치를 표시합니다.
//!
//! - **토큰**: 값 하나를 캡처하는 조각. `%(...)`가 있으면 그 부분만,
//!   없으면 전체가 `(?P<name>...)` 캡처가 됩니다.
//! - **그룹**: 토큰을 조합한 조각. 자신은 캡처를 만들지 않고 내부
//!   토큰의 캡처를 그대로 노출합니다.
//! - **형식**: 한 줄 전체를 매칭하는 최상위 패턴. 등록 순서대로
//!   시도하며 처음 매칭된 것이 이깁니다.
//!
//! 모든 패턴은 [`PatternSet`] 빌더에 등록하는 시점에 확장/컴파일되며,
//! 미해결 참조와 이름 중복은 그 자리에서 에러가 됩니다.
//!
//! ```
//! use tailpost_tail::dsl::PatternSet;
//!
//! let mut set = PatternSet::new();
//! set.token("date", r"\d{4}-\d{2}-\d{2}").unwrap();
//! set.token("level", r"DEBUG|INFO|WARN|ERROR").unwrap();
//! set.format(r"%{date} %{level} (?P<message>.*)").unwrap();
//!
//! let rec = set.parse_line("2024-01-02 INFO server started").unwrap();
//! assert_eq!(rec.get("level").unwrap(), "INFO");
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::error::DslError;
use crate::transform::TransformExpr;
use tailpost_core::types::Record;

/// `%{name}` 참조
static REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%\{([^}]+)\}").unwrap_or_else(|e| panic!("ref pattern: {e}"))
});

/// `%(...)` 캡처 위치 표시 (중첩 불가)
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%\(([^)]*)\)").unwrap_or_else(|e| panic!("placeholder pattern: {e}"))
});

/// 이름 붙은 패턴 조각
///
/// `raw`는 캡처 없는 확장 결과, `named`는 명명 캡처를 포함한 확장
/// 결과입니다. 토큰이 다른 토큰을 참조할 때는 `raw`를 써서 캡처
/// 이름 중복을 피합니다.
#[derive(Debug)]
struct Node {
    raw: String,
    named: String,
}

#[derive(Debug)]
struct Format {
    regex: Regex,
}

/// 패턴 DSL 빌더 겸 줄 파서
///
/// 소스 하나가 자신의 `PatternSet`을 소유합니다. 전역 레지스트리는
/// 없으므로 소스 간 이름 충돌이 생기지 않습니다.
#[derive(Debug, Default)]
pub struct PatternSet {
    nodes: HashMap<String, Node>,
    formats: Vec<Format>,
    transforms: HashMap<String, TransformExpr>,
}

impl PatternSet {
    /// 빈 패턴 집합을 만듭니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 등록된 형식이 있는지 여부
    pub fn has_formats(&self) -> bool {
        !self.formats.is_empty()
    }

    /// 토큰을 등록합니다.
    pub fn token(&mut self, name: &str, pattern: &str) -> Result<(), DslError> {
        self.insert_token(name, pattern, None)
    }

    /// 변환 식이 붙은 토큰을 등록합니다.
    ///
    /// 식은 이 시점에 파싱/검증되고, 매칭 시 캡처 값에 적용됩니다.
    pub fn token_with_transform(
        &mut self,
        name: &str,
        pattern: &str,
        expr: &str,
    ) -> Result<(), DslError> {
        let transform = TransformExpr::parse(expr)?;
        self.insert_token(name, pattern, Some(transform))
    }

    fn insert_token(
        &mut self,
        name: &str,
        pattern: &str,
        transform: Option<TransformExpr>,
    ) -> Result<(), DslError> {
        if self.nodes.contains_key(name) {
            return Err(DslError::DuplicateName(name.to_owned()));
        }

        let expanded = self.expand(pattern, false)?;

        // %(...)가 있으면 그 자리만, 없으면 전체가 이 토큰의 캡처
        let (raw, named) = match PLACEHOLDER.captures(&expanded) {
            Some(caps) => {
                let (whole, inner) = match (caps.get(0), caps.get(1)) {
                    (Some(whole), Some(inner)) => (whole, inner.as_str()),
                    _ => return Err(invalid_regex(name, &expanded)),
                };
                let head = &expanded[..whole.start()];
                let tail = &expanded[whole.end()..];
                (
                    format!("(?:{head}(?:{inner}){tail})"),
                    format!("(?:{head}(?P<{name}>{inner}){tail})"),
                )
            }
            None => (
                format!("(?:{expanded})"),
                format!("(?P<{name}>{expanded})"),
            ),
        };

        compile(name, &named)?;
        self.nodes.insert(name.to_owned(), Node { raw, named });
        if let Some(transform) = transform {
            self.transforms.insert(name.to_owned(), transform);
        }
        Ok(())
    }

    /// 그룹을 등록합니다. 내부 토큰의 캡처는 유지되고 그룹 자체는
    /// 캡처를 만들지 않습니다.
    pub fn group(&mut self, name: &str, pattern: &str) -> Result<(), DslError> {
        if self.nodes.contains_key(name) {
            return Err(DslError::DuplicateName(name.to_owned()));
        }
        let raw = self.expand(pattern, false)?;
        let named = self.expand(pattern, true)?;
        compile(name, &named)?;
        self.nodes.insert(
            name.to_owned(),
            Node {
                raw: format!("(?:{raw})"),
                named: format!("(?:{named})"),
            },
        );
        Ok(())
    }

    /// 형식을 등록합니다. 줄 시작에 고정(anchored)됩니다.
    pub fn format(&mut self, pattern: &str) -> Result<(), DslError> {
        let named = self.expand(pattern, true)?;
        let regex = compile(pattern, &format!(r"\A(?:{named})"))?;
        self.formats.push(Format { regex });
        Ok(())
    }

    /// 반복 key:value 패턴을 만듭니다.
    ///
    /// 패턴은 명명 캡처를 정확히 두 개(키, 값 순서) 가져야 합니다.
    pub fn key_value(&self, pattern: &str) -> Result<KeyValue, DslError> {
        let named = self.expand(pattern, true)?;
        let regex = compile(pattern, &named)?;
        let names: Vec<String> = regex
            .capture_names()
            .flatten()
            .map(str::to_owned)
            .collect();
        if names.len() != 2 {
            return Err(DslError::KeyValueCaptures(names.len()));
        }
        let mut names = names.into_iter();
        let (key_name, value_name) = match (names.next(), names.next()) {
            (Some(k), Some(v)) => (k, v),
            _ => return Err(DslError::KeyValueCaptures(0)),
        };
        Ok(KeyValue {
            regex,
            key_name,
            value_name,
        })
    }

    /// 단일 줄 매처를 만듭니다. 다중행 파서의 헤더/섹션 역할에 씁니다.
    pub fn matcher(&self, pattern: &str) -> Result<LineMatcher, DslError> {
        let named = self.expand(pattern, true)?;
        let regex = compile(pattern, &format!(r"\A(?:{named})"))?;
        Ok(LineMatcher { regex })
    }

    /// 등록된 형식을 순서대로 시도해 첫 매칭을 레코드로 만듭니다.
    ///
    /// 변환 식이 있는 토큰은 값이 변환되며, 객체 결과는 레코드에
    /// 병합됩니다. 변환 실패는 경고 후 원본 문자열을 유지합니다.
    pub fn parse_line(&self, line: &str) -> Option<Record> {
        for format in &self.formats {
            let Some(caps) = format.regex.captures(line) else {
                continue;
            };
            let mut record = Record::new();
            for name in format.regex.capture_names().flatten() {
                let Some(m) = caps.name(name) else {
                    continue;
                };
                let text = m.as_str();
                match self.transforms.get(name) {
                    Some(expr) => match expr.eval(text) {
                        Ok(Value::Object(map)) => record.merge_object(map),
                        Ok(value) => record.insert(name, value),
                        Err(e) => {
                            warn!(
                                token = name,
                                error = %e,
                                "transform failed, keeping raw capture"
                            );
                            record.insert(name, Value::String(text.to_owned()));
                        }
                    },
                    None => record.insert(name, Value::String(text.to_owned())),
                }
            }
            return Some(record);
        }
        None
    }

    /// `%{name}` 참조를 등록된 조각으로 치환합니다.
    ///
    /// 등록 시점에 조각이 이미 완전히 확장되어 있으므로 한 번의
    /// 치환으로 끝납니다.
    fn expand(&self, pattern: &str, named: bool) -> Result<String, DslError> {
        let mut out = String::new();
        let mut last = 0;
        for caps in REF.captures_iter(pattern) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let node = self.nodes.get(name.as_str()).ok_or_else(|| {
                DslError::UnresolvedReference {
                    owner: pattern.to_owned(),
                    name: name.as_str().to_owned(),
                }
            })?;
            out.push_str(&pattern[last..whole.start()]);
            out.push_str(if named { &node.named } else { &node.raw });
            last = whole.end();
        }
        out.push_str(&pattern[last..]);
        Ok(out)
    }
}

fn compile(name: &str, pattern: &str) -> Result<Regex, DslError> {
    Regex::new(pattern).map_err(|e| DslError::InvalidRegex {
        name: name.to_owned(),
        source: e,
    })
}

fn invalid_regex(name: &str, pattern: &str) -> DslError {
    DslError::InvalidRegex {
        name: name.to_owned(),
        source: regex::Error::Syntax(pattern.to_owned()),
    }
}

/// 반복 key:value 추출기
#[derive(Debug)]
pub struct KeyValue {
    regex: Regex,
    key_name: String,
    value_name: String,
}

impl KeyValue {
    /// 줄에서 모든 (키, 값) 쌍을 추출합니다. 매칭이 없으면 빈 벡터.
    pub fn pairs(&self, line: &str) -> Vec<(String, String)> {
        self.regex
            .captures_iter(line)
            .filter_map(|caps| {
                let key = caps.name(&self.key_name)?.as_str().to_owned();
                let value = caps.name(&self.value_name)?.as_str().to_owned();
                Some((key, value))
            })
            .collect()
    }
}

/// 줄 시작에 고정된 단일 패턴 매처
pub struct LineMatcher {
    regex: Regex,
}

impl LineMatcher {
    /// 매칭 여부
    pub fn is_match(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }

    /// 명명 캡처를 문자열 필드 레코드로 반환합니다.
    pub fn captures(&self, line: &str) -> Option<Record> {
        let caps = self.regex.captures(line)?;
        let mut record = Record::new();
        for name in self.regex.capture_names().flatten() {
            if let Some(m) = caps.name(name) {
                record.insert(name, Value::String(m.as_str().to_owned()));
            }
        }
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_set() -> PatternSet {
        let mut set = PatternSet::new();
        set.token("date", r"\d{4}-\d{2}-\d{2}").unwrap();
        set.token("time", r"\d{2}:\d{2}:\d{2}").unwrap();
        set.token("level", r"DEBUG|INFO|WARN|ERROR").unwrap();
        set
    }

    #[test]
    fn token_without_placeholder_captures_whole() {
        let set = base_set();
        let m = set.matcher("%{level}").unwrap();
        let rec = m.captures("INFO").unwrap();
        assert_eq!(rec.get("level"), Some(&json!("INFO")));
    }

    #[test]
    fn token_with_placeholder_captures_inner_part() {
        let mut set = PatternSet::new();
        set.token("bracket_level", r"\[%(\w+)\]").unwrap();
        let m = set.matcher("%{bracket_level}").unwrap();
        let rec = m.captures("[WARN] disk full").unwrap();
        assert_eq!(rec.get("bracket_level"), Some(&json!("WARN")));
    }

    #[test]
    fn token_referencing_token_does_not_duplicate_captures() {
        let mut set = base_set();
        // date를 참조하지만 자신의 캡처는 전체 타임스탬프
        set.token("ts", r"%{date}T%{time}").unwrap();
        set.format(r"%{ts} (?P<message>.*)").unwrap();

        let rec = set.parse_line("2024-01-02T10:20:30 hello").unwrap();
        assert_eq!(rec.get("ts"), Some(&json!("2024-01-02T10:20:30")));
        // 참조된 토큰의 캡처는 raw로 치환되어 나타나지 않는다
        assert!(rec.get("date").is_none());
    }

    #[test]
    fn group_exposes_inner_captures() {
        let mut set = base_set();
        set.group("stamp", r"%{date} %{time}").unwrap();
        set.format(r"%{stamp} %{level} (?P<message>.*)").unwrap();

        let rec = set.parse_line("2024-01-02 10:20:30 ERROR boom").unwrap();
        assert_eq!(rec.get("date"), Some(&json!("2024-01-02")));
        assert_eq!(rec.get("time"), Some(&json!("10:20:30")));
        assert_eq!(rec.get("level"), Some(&json!("ERROR")));
        assert_eq!(rec.get("message"), Some(&json!("boom")));
    }

    #[test]
    fn formats_tried_in_declaration_order() {
        let mut set = base_set();
        set.format(r"%{level} (?P<first>.*)").unwrap();
        set.format(r"(?P<second>.*)").unwrap();

        let rec = set.parse_line("INFO picked by first").unwrap();
        assert!(rec.get("first").is_some());

        let rec = set.parse_line("no level here").unwrap();
        assert!(rec.get("second").is_some());
    }

    #[test]
    fn unmatched_line_returns_none() {
        let mut set = base_set();
        set.format(r"%{date} %{level}").unwrap();
        assert!(set.parse_line("garbage").is_none());
    }

    #[test]
    fn unresolved_reference_is_rejected() {
        let mut set = PatternSet::new();
        let err = set.format(r"%{missing} .*").unwrap_err();
        assert!(matches!(
            err,
            DslError::UnresolvedReference { name, .. } if name == "missing"
        ));
    }

    #[test]
    fn duplicate_token_is_rejected() {
        let mut set = base_set();
        let err = set.token("date", r"\d+").unwrap_err();
        assert!(matches!(err, DslError::DuplicateName(name) if name == "date"));
    }

    #[test]
    fn invalid_regex_is_rejected_at_registration() {
        let mut set = PatternSet::new();
        let err = set.token("broken", r"(unclosed").unwrap_err();
        assert!(matches!(err, DslError::InvalidRegex { .. }));
    }

    #[test]
    fn transform_merges_json_object() {
        let mut set = base_set();
        set.token_with_transform("body", r"%(\{.*\})", "json(_)")
            .unwrap();
        set.format(r"%{date} %{body}").unwrap();

        let rec = set
            .parse_line(r#"2024-01-02 {"user": "kim", "score": 42}"#)
            .unwrap();
        assert_eq!(rec.get("date"), Some(&json!("2024-01-02")));
        assert_eq!(rec.get("user"), Some(&json!("kim")));
        assert_eq!(rec.get("score"), Some(&json!(42)));
        assert!(rec.get("body").is_none());
    }

    #[test]
    fn failed_transform_keeps_raw_capture() {
        let mut set = PatternSet::new();
        set.token_with_transform("body", r".*", "json(_)").unwrap();
        set.format(r"%{body}").unwrap();

        let rec = set.parse_line("not json at all").unwrap();
        assert_eq!(rec.get("body"), Some(&json!("not json at all")));
    }

    #[test]
    fn key_value_extracts_all_pairs() {
        let set = PatternSet::new();
        let kv = set
            .key_value(r"(?P<key>\w+)=(?P<value>\S+)")
            .unwrap();
        let pairs = kv.pairs("a=1 b=two c=3");
        assert_eq!(
            pairs,
            vec![
                ("a".to_owned(), "1".to_owned()),
                ("b".to_owned(), "two".to_owned()),
                ("c".to_owned(), "3".to_owned()),
            ]
        );
        assert!(kv.pairs("no pairs here").is_empty());
    }

    #[test]
    fn key_value_requires_two_named_captures() {
        let set = PatternSet::new();
        let err = set.key_value(r"(?P<key>\w+)=\S+").unwrap_err();
        assert!(matches!(err, DslError::KeyValueCaptures(1)));
    }

    #[test]
    fn formats_are_anchored_at_line_start() {
        let mut set = base_set();
        set.format(r"%{level}").unwrap();
        assert!(set.parse_line("INFO").is_some());
        assert!(set.parse_line("prefix INFO").is_none());
    }

    // Property-based tests using proptest
    #[cfg(test)]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn parse_arbitrary_line_does_not_panic(line in "\\PC*") {
                let mut set = base_set();
                set.format(r"%{date} %{time} %{level} (?P<message>.*)").unwrap();
                let _ = set.parse_line(&line);
            }

            #[test]
            fn arbitrary_token_pattern_never_panics(
                name in "[a-z]{1,8}",
                pattern in "\\PC{0,40}",
            ) {
                let mut set = PatternSet::new();
                // 잘못된 정규식과 미해결 참조는 Err로만 드러나야 한다
                let _ = set.token(&name, &pattern);
            }

            #[test]
            fn unresolved_reference_is_rejected(name in "[a-z]{1,8}") {
                let mut set = PatternSet::new();
                let result = set.format(&format!("%{{{name}}} .*"));
                prop_assert!(result.is_err());
            }
        }
    }
}
