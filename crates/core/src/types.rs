//! 도메인 타입 — 시스템 전역에서 사용되는 공통 타입
//!
//! tailing 파이프라인이 주고받는 데이터 구조를 정의합니다.

use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

/// 전송 레코드
///
/// 한 줄(또는 여러 줄 묶음)을 파싱하여 얻은 필드 맵입니다.
/// 삽입 순서를 보존하며, 같은 키로 다시 삽입하면 값만 교체됩니다.
/// 직렬화 시 JSON/msgpack 맵으로 표현됩니다.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    /// 빈 레코드를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 원시 한 줄을 `message` 필드 하나로 감싼 레코드를 생성합니다.
    ///
    /// format/parser가 없는 소스의 pass-through 전송에 사용됩니다.
    pub fn raw(line: &str) -> Self {
        let mut rec = Self::new();
        rec.insert("message", Value::String(line.to_owned()));
        rec
    }

    /// 필드를 삽입합니다. 키가 이미 있으면 기존 위치에서 값을 교체합니다.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some(slot) = self.fields.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.fields.push((key, value));
        }
    }

    /// 키에 해당하는 값을 반환합니다.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// 다른 레코드의 필드를 순서대로 병합합니다. 중복 키는 교체됩니다.
    pub fn merge(&mut self, other: Record) {
        for (k, v) in other.fields {
            self.insert(k, v);
        }
    }

    /// JSON 객체의 필드를 순서대로 병합합니다.
    pub fn merge_object(&mut self, object: serde_json::Map<String, Value>) {
        for (k, v) in object {
            self.insert(k, v);
        }
    }

    /// 필드 수
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// 필드가 하나도 없으면 true
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// (키, 값) 순회
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        write!(f, "}}")
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut rec = Record::new();
        for (k, v) in iter {
            rec.insert(k, v);
        }
        rec
    }
}

/// 한 tick의 처리 결과
///
/// [`Tailer::tick`](crate::pipeline::Tailer::tick)이 반환하며,
/// 상위 워커 루프와 테스트가 tick 동작을 관찰하는 데 사용합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// 이번 tick에서 latest 파일 로테이션이 처리되었는지 여부
    pub rotated: bool,
    /// 전송된 레코드 수
    pub sent: usize,
    /// 이번 tick에서 읽은 바이트 수
    pub read_bytes: u64,
}
