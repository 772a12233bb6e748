//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `tailpost_`
//! - 모듈명: `tail_`, `sink_`, `daemon_`
//! - 접미어: `_total` (counter), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 소스 태그 레이블 키
pub const LABEL_SOURCE: &str = "source";

/// 싱크 종류 레이블 키 (forward, stream)
pub const LABEL_SINK: &str = "sink";

// ─── Tail 메트릭 ────────────────────────────────────────────────────

/// Tail: 전송된 레코드 수 (counter, label: source)
pub const TAIL_RECORDS_SENT_TOTAL: &str = "tailpost_tail_records_sent_total";

/// Tail: 읽은 바이트 수 (counter, label: source)
pub const TAIL_BYTES_READ_TOTAL: &str = "tailpost_tail_bytes_read_total";

/// Tail: 파싱 실패 줄 수 (counter, label: source)
pub const TAIL_PARSE_ERRORS_TOTAL: &str = "tailpost_tail_parse_errors_total";

/// Tail: 처리된 live 파일 로테이션 수 (counter, label: source)
pub const TAIL_ROTATIONS_TOTAL: &str = "tailpost_tail_rotations_total";

/// Tail: 현재 전송 위치 (gauge, label: source)
pub const TAIL_SENT_POSITION_BYTES: &str = "tailpost_tail_sent_position_bytes";

// ─── Sink 메트릭 ────────────────────────────────────────────────────

/// Sink: 전송 재시도 수 (counter, labels: source, sink)
pub const SINK_SEND_RETRIES_TOTAL: &str = "tailpost_sink_send_retries_total";

/// Sink: 재시도 초과로 폐기된 배치 수 (counter, labels: source, sink)
pub const SINK_BATCHES_DROPPED_TOTAL: &str = "tailpost_sink_batches_dropped_total";

/// Sink: 전송 성공한 페이로드 수 (counter, labels: source, sink)
pub const SINK_FLUSHES_TOTAL: &str = "tailpost_sink_flushes_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "tailpost_daemon_uptime_seconds";

/// Daemon: 실행 중인 소스 워커 수 (gauge)
pub const DAEMON_SOURCES_RUNNING: &str = "tailpost_daemon_sources_running";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `tailpost-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        TAIL_RECORDS_SENT_TOTAL,
        "Total number of records delivered to the sink"
    );
    describe_counter!(
        TAIL_BYTES_READ_TOTAL,
        "Total bytes read from tailed files"
    );
    describe_counter!(
        TAIL_PARSE_ERRORS_TOTAL,
        "Total number of lines that matched no configured format"
    );
    describe_counter!(
        TAIL_ROTATIONS_TOTAL,
        "Total number of live-file rotations handled"
    );
    describe_gauge!(
        TAIL_SENT_POSITION_BYTES,
        "Current sent position of the active target in bytes"
    );

    describe_counter!(
        SINK_SEND_RETRIES_TOTAL,
        "Total number of delivery retries after a send failure"
    );
    describe_counter!(
        SINK_BATCHES_DROPPED_TOTAL,
        "Total number of batches dropped after exhausting retries"
    );
    describe_counter!(
        SINK_FLUSHES_TOTAL,
        "Total number of payloads successfully flushed to the sink"
    );

    describe_gauge!(DAEMON_UPTIME_SECONDS, "Tailpost daemon uptime in seconds");
    describe_gauge!(
        DAEMON_SOURCES_RUNNING,
        "Number of source workers currently running"
    );
}
