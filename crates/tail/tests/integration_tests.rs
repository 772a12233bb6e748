//! 통합 테스트 — 실제 tempdir 위에서 생성/추가/재시작/로테이션 시나리오를 돌립니다.

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tailpost_core::config::SourceConfig;
use tailpost_core::pipeline::Tailer;
use tailpost_core::types::Record;
use tailpost_tail::engine::TailEngine;
use tailpost_tail::error::TailError;
use tailpost_tail::sink::RecordSink;

/// 전송된 레코드를 그대로 기록하는 싱크
#[derive(Clone, Default)]
struct CaptureSink {
    records: Arc<Mutex<Vec<Record>>>,
}

impl CaptureSink {
    fn messages(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| r.get("message").and_then(|v| v.as_str().map(str::to_owned)))
            .collect()
    }
}

impl RecordSink for CaptureSink {
    fn name(&self) -> &'static str {
        "capture"
    }

    async fn send(&mut self, _tag: &str, batch: &[(i64, Record)]) -> Result<(), TailError> {
        let mut records = self.records.lock().unwrap();
        records.extend(batch.iter().map(|(_, r)| r.clone()));
        Ok(())
    }
}

fn source(dir: &Path) -> SourceConfig {
    SourceConfig {
        tag: "game".to_owned(),
        dir: dir.to_string_lossy().into_owned(),
        pattern: "*.log".to_owned(),
        send_interval_secs: 0,
        update_interval_secs: 0,
        ..SourceConfig::default()
    }
}

fn append(path: &Path, data: &[u8]) {
    let mut f = std::fs::OpenOptions::new().append(true).open(path).unwrap();
    f.write_all(data).unwrap();
}

#[tokio::test]
async fn restart_resumes_from_saved_position() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.log");
    std::fs::write(&path, b"one\ntwo\n").unwrap();
    let cfg = source(dir.path());

    // 첫 실행: 전부 전송
    let sink = CaptureSink::default();
    let mut engine = TailEngine::new(&cfg, dir.path().join("pos"), sink.clone()).unwrap();
    let report = engine.tick().await.unwrap();
    assert_eq!(report.sent, 2);
    drop(engine);

    // 재시작: 추가분만 전송
    append(&path, b"three\n");
    let sink2 = CaptureSink::default();
    let mut engine = TailEngine::new(&cfg, dir.path().join("pos"), sink2.clone()).unwrap();
    let report = engine.tick().await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(sink2.messages(), vec!["three"]);
}

#[tokio::test]
async fn oversized_backlog_is_skipped_on_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.log");
    let backlog: Vec<u8> = b"x\n".repeat(100);
    std::fs::write(&path, &backlog).unwrap();

    let mut cfg = source(dir.path());
    cfg.max_between_data = 50;

    let sink = CaptureSink::default();
    let mut engine = TailEngine::new(&cfg, dir.path().join("pos"), sink.clone()).unwrap();
    let report = engine.tick().await.unwrap();
    assert_eq!(report.sent, 0);

    // 시작 이후의 데이터는 정상 전송
    append(&path, b"fresh\n");
    let report = engine.tick().await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(sink.messages(), vec!["fresh"]);
}

#[tokio::test]
async fn lines_on_start_resends_recent_tail() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.log");
    std::fs::write(&path, b"old-1\nold-2\nold-3\n").unwrap();

    let mut cfg = source(dir.path());
    cfg.lines_on_start = 2;

    let sink = CaptureSink::default();
    let mut engine = TailEngine::new(&cfg, dir.path().join("pos"), sink.clone()).unwrap();
    let report = engine.tick().await.unwrap();
    assert_eq!(report.sent, 2);
    assert_eq!(sink.messages(), vec!["old-2", "old-3"]);
}

#[tokio::test]
async fn rotation_preserves_every_line_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let live = dir.path().join("play.log");
    std::fs::write(&live, b"a1\n").unwrap();

    let mut cfg = source(dir.path());
    cfg.latest = Some("play.log".to_owned());
    cfg.order_pattern = Some(r"play-(?P<date>\d{8})-(?P<order>\d+)\.log".to_owned());

    let sink = CaptureSink::default();
    let mut engine = TailEngine::new(&cfg, dir.path().join("pos"), sink.clone()).unwrap();
    engine.tick().await.unwrap();

    // 로테이션 1: 꼬리가 남은 채로 rename
    append(&live, b"a2\n");
    std::fs::rename(&live, dir.path().join("play-20240101-1.log")).unwrap();
    std::fs::write(&live, b"b1\n").unwrap();

    let report = engine.tick().await.unwrap();
    assert!(report.rotated);
    assert_eq!(report.sent, 1); // a2

    // frozen을 비운 뒤 live로 복귀
    engine.tick().await.unwrap(); // 재탐색
    let report = engine.tick().await.unwrap();
    assert_eq!(report.sent, 1); // b1

    // 로테이션 2: order 패턴 정렬로 최신 frozen을 고른다
    append(&live, b"b2\n");
    std::fs::rename(&live, dir.path().join("play-20240101-2.log")).unwrap();
    std::fs::write(&live, b"c1\n").unwrap();

    let report = engine.tick().await.unwrap();
    assert!(report.rotated);
    assert_eq!(report.sent, 1); // b2
    engine.tick().await.unwrap();
    let report = engine.tick().await.unwrap();
    assert_eq!(report.sent, 1); // c1

    assert_eq!(sink.messages(), vec!["a1", "a2", "b1", "b2", "c1"]);
}

#[tokio::test]
async fn multiline_record_spans_ticks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fcs.log");
    std::fs::write(&path, b"[10:00:01] sess-1\nCode : 200\n").unwrap();

    let toml = format!(
        r#"
[[sources]]
tag = "fcs"
dir = '{dir}'
pattern = "*.log"
send_interval_secs = 0
update_interval_secs = 0

[sources.parser.multiline]
kind = "header_body"
header = '\[(?P<stamp>[\d:]+)\] (?P<session>\S+)'
key_value = '(?P<key>\w+) : (?P<value>\S+)'

[sources.sink]
kind = "forward"
host = "127.0.0.1"
port = 24224
"#,
        dir = dir.path().display()
    );
    let config = tailpost_core::config::TailpostConfig::parse(&toml).unwrap();
    let cfg = &config.sources[0];

    let sink = CaptureSink::default();
    let mut engine = TailEngine::new(cfg, dir.path().join("pos"), sink.clone()).unwrap();

    // 다음 헤더가 없으므로 레코드는 아직 미완성
    let report = engine.tick().await.unwrap();
    assert_eq!(report.sent, 0);
    assert!(report.read_bytes > 0);

    // 다음 헤더가 오면 이전 레코드가 완성된다
    append(&path, b"[10:00:02] sess-2\n");
    let report = engine.tick().await.unwrap();
    assert_eq!(report.sent, 1);

    let records = sink.records.lock().unwrap();
    assert_eq!(records[0].get("session"), Some(&json!("sess-1")));
    assert_eq!(records[0].get("Code"), Some(&json!("200")));
}

#[tokio::test]
async fn host_identity_fields_are_attached() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.log"), b"hello\n").unwrap();

    let sink = CaptureSink::default();
    let cfg = source(dir.path());
    let mut engine = TailEngine::new(&cfg, dir.path().join("pos"), sink.clone()).unwrap();
    engine.tick().await.unwrap();

    let records = sink.records.lock().unwrap();
    assert!(records[0].get("sname_").is_some());
    assert!(records[0].get("saddr_").is_some());
}
