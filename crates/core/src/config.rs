//! 설정 관리 — tailpost.toml 파싱 및 런타임 설정
//!
//! [`TailpostConfig`]는 에이전트 전체 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. 환경변수 (`TAILPOST_GENERAL_POS_DIR=/var/lib/tailpost` 형식)
//! 2. 설정 파일 (`tailpost.toml`)
//! 3. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), tailpost_core::error::TailpostError> {
//! use tailpost_core::config::TailpostConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = TailpostConfig::load("tailpost.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = TailpostConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, TailpostError};

/// 한 번에 읽는 최대 바이트 수 기본값 (2MiB)
pub const DEFAULT_MAX_READ_BUFFER: usize = 2 * 1024 * 1024;
/// 재시작 시 전송을 허용하는 미전송 백로그 상한 기본값 (1MiB)
pub const DEFAULT_MAX_BETWEEN_DATA: u64 = 1024 * 1024;
/// 전송 재시도 상한 기본값
pub const DEFAULT_MAX_SEND_RETRY: u32 = 5;
/// 전송 주기 기본값 (초)
pub const DEFAULT_SEND_INTERVAL_SECS: u64 = 1;
/// 대상 재탐색 주기 기본값 (초)
pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 5;
/// 벌크 전송 크기 기본값
pub const DEFAULT_BULK_SIZE: usize = 200;
/// 스트림 싱크 페이로드 상한 기본값 (1MiB)
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Tailpost 통합 설정
///
/// `tailpost.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TailpostConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 메트릭 엔드포인트 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// tail 소스 목록
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl TailpostConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, TailpostError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, TailpostError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TailpostError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                TailpostError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, TailpostError> {
        toml::from_str(toml_str).map_err(|e| {
            TailpostError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `TAILPOST_{SECTION}_{FIELD}`
    /// 소스 목록은 파일로만 설정합니다.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "TAILPOST_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "TAILPOST_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pos_dir, "TAILPOST_GENERAL_POS_DIR");

        // Metrics
        override_bool(&mut self.metrics.enabled, "TAILPOST_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "TAILPOST_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "TAILPOST_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), TailpostError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.general.pos_dir.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "general.pos_dir".to_owned(),
                reason: "position directory must not be empty".to_owned(),
            }
            .into());
        }

        for source in &self.sources {
            source.validate()?;
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 위치 파일 디렉토리
    pub pos_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pos_dir: "/var/lib/tailpost/pos".to_owned(),
        }
    }
}

/// 메트릭 엔드포인트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9189,
        }
    }
}

/// tail 소스 설정
///
/// 소스 하나가 디렉토리 하나의 로테이션 파일 집합을 tail합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// 전송 태그 (호스트명이 접두어로 붙습니다)
    pub tag: String,
    /// 감시 디렉토리
    pub dir: String,
    /// 파일명 glob 패턴
    pub pattern: String,
    /// 현재 기록 중인 live 파일명 (로테이션 대상)
    pub latest: Option<String>,
    /// 파일 정렬용 패턴 (`date`, `order` 명명 캡처 필요)
    pub order_pattern: Option<String>,
    /// 정렬 반전 여부
    pub reverse_order: bool,
    /// 전송 주기 (초)
    pub send_interval_secs: u64,
    /// 대상 재탐색 주기 (초)
    pub update_interval_secs: u64,
    /// 전송 재시도 상한
    pub max_send_retry: u32,
    /// 벌크 전송 크기
    pub bulk_size: usize,
    /// 한 번에 읽는 최대 바이트 수
    pub max_read_buffer: usize,
    /// 재시작 시 전송을 허용하는 미전송 백로그 상한 (바이트)
    pub max_between_data: u64,
    /// 시작 시 재전송할 기존 로그 줄 수 (디버깅용)
    pub lines_on_start: usize,
    /// 전송 레코드를 디버그 로그로 복사할지 여부
    pub echo: bool,
    /// 한 줄 형식 정규식 (parser와 동시 지정 불가)
    pub format: Option<String>,
    /// 패턴 DSL / 다중행 파서 설정
    pub parser: Option<ParserConfig>,
    /// 전송 싱크
    pub sink: SinkConfig,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            tag: String::new(),
            dir: String::new(),
            pattern: "*.log".to_owned(),
            latest: None,
            order_pattern: None,
            reverse_order: false,
            send_interval_secs: DEFAULT_SEND_INTERVAL_SECS,
            update_interval_secs: DEFAULT_UPDATE_INTERVAL_SECS,
            max_send_retry: DEFAULT_MAX_SEND_RETRY,
            bulk_size: DEFAULT_BULK_SIZE,
            max_read_buffer: DEFAULT_MAX_READ_BUFFER,
            max_between_data: DEFAULT_MAX_BETWEEN_DATA,
            lines_on_start: 0,
            echo: false,
            format: None,
            parser: None,
            sink: SinkConfig::default(),
        }
    }
}

impl SourceConfig {
    /// 소스 설정을 검증합니다.
    pub fn validate(&self) -> Result<(), TailpostError> {
        if self.tag.is_empty() {
            return Err(invalid("sources.tag", "tag must not be empty"));
        }
        if self.dir.is_empty() {
            return Err(invalid("sources.dir", "directory must not be empty"));
        }
        if self.pattern.is_empty() {
            return Err(invalid("sources.pattern", "glob pattern must not be empty"));
        }
        if self.format.is_some() && self.parser.is_some() {
            return Err(invalid(
                "sources.format",
                "format and parser are mutually exclusive",
            ));
        }
        if self.max_read_buffer == 0 {
            return Err(invalid(
                "sources.max_read_buffer",
                "read buffer must be greater than zero",
            ));
        }
        if self.bulk_size == 0 {
            return Err(invalid(
                "sources.bulk_size",
                "bulk size must be greater than zero",
            ));
        }
        if self.max_send_retry == 0 {
            return Err(invalid(
                "sources.max_send_retry",
                "retry limit must be greater than zero",
            ));
        }
        if let Some(parser) = &self.parser {
            parser.validate()?;
        }
        self.sink.validate()?;
        Ok(())
    }
}

/// 패턴 DSL / 다중행 파서 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// 토큰 이름 → 정규식 (또는 [정규식, transform 식])
    pub tokens: std::collections::BTreeMap<String, TokenSpec>,
    /// 그룹 이름 → 조합 정규식
    pub groups: std::collections::BTreeMap<String, String>,
    /// 형식 정규식 목록 (선언 순서대로 시도)
    pub formats: Vec<String>,
    /// 다중행 파서 설정 (formats 대신 사용)
    pub multiline: Option<MultilineConfig>,
}

impl ParserConfig {
    /// 파서 설정을 검증합니다.
    pub fn validate(&self) -> Result<(), TailpostError> {
        if self.formats.is_empty() && self.multiline.is_none() {
            return Err(invalid(
                "sources.parser",
                "either formats or multiline must be present",
            ));
        }
        if !self.formats.is_empty() && self.multiline.is_some() {
            return Err(invalid(
                "sources.parser",
                "formats and multiline are mutually exclusive",
            ));
        }
        if let Some(ml) = &self.multiline {
            ml.validate()?;
        }
        Ok(())
    }
}

/// 토큰 정의: 정규식 하나 또는 [정규식, transform 식] 쌍
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenSpec {
    /// 정규식만
    Regex(String),
    /// [정규식, transform 식]
    WithTransform(Vec<String>),
}

impl TokenSpec {
    /// (정규식, transform 식) 분해. 형식이 잘못되면 None.
    pub fn parts(&self) -> Option<(&str, Option<&str>)> {
        match self {
            TokenSpec::Regex(rx) => Some((rx, None)),
            TokenSpec::WithTransform(v) if v.len() == 2 => {
                Some((v[0].as_str(), Some(v[1].as_str())))
            }
            TokenSpec::WithTransform(_) => None,
        }
    }
}

/// 다중행 파서 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MultilineConfig {
    /// 파서 종류: `header_body` | `sentinel_body`
    pub kind: String,
    /// 레코드 시작 헤더 패턴 (DSL 참조 허용)
    pub header: String,
    /// `header_body`: 섹션 전환 패턴 (Request/Response 판별)
    pub method: Option<String>,
    /// `header_body`: 반복 key:value 패턴 (명명 캡처 key, value 필요)
    pub key_value: Option<String>,
    /// `sentinel_body`: 섹션 헤더 패턴 목록
    pub sections: Vec<String>,
    /// `sentinel_body`: raw 누적 모드 진입 패턴
    pub body_sentinel: Option<String>,
    /// `sentinel_body`: raw 누적 종료 라인
    pub terminator: String,
}

impl MultilineConfig {
    /// 다중행 설정을 검증합니다.
    pub fn validate(&self) -> Result<(), TailpostError> {
        match self.kind.as_str() {
            "header_body" => {
                if self.key_value.is_none() {
                    return Err(invalid(
                        "sources.parser.multiline.key_value",
                        "header_body parser requires a key_value pattern",
                    ));
                }
            }
            "sentinel_body" => {
                if self.body_sentinel.is_none() {
                    return Err(invalid(
                        "sources.parser.multiline.body_sentinel",
                        "sentinel_body parser requires a body_sentinel pattern",
                    ));
                }
            }
            other => {
                return Err(invalid(
                    "sources.parser.multiline.kind",
                    &format!(
                        "unknown multiline kind '{}', expected 'header_body' or 'sentinel_body'",
                        other
                    ),
                ));
            }
        }
        if self.header.is_empty() {
            return Err(invalid(
                "sources.parser.multiline.header",
                "header pattern must not be empty",
            ));
        }
        Ok(())
    }
}

/// 전송 싱크 설정
///
/// 소스마다 정확히 하나의 싱크가 활성화됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    /// fluent-forward 직접 전송
    Forward {
        /// 수신 호스트
        host: String,
        /// 수신 포트
        port: u16,
    },
    /// 집계 스트림 전송 (Kinesis)
    Stream {
        /// 스트림 이름
        stream_name: String,
        /// AWS 리전
        region: String,
        /// 액세스 키 (비우면 기본 자격 증명 체인 사용)
        #[serde(default)]
        access_key: String,
        /// 시크릿 키
        #[serde(default)]
        secret_key: String,
        /// 집계 페이로드 상한 (바이트)
        #[serde(default = "default_max_payload_size")]
        max_payload_size: usize,
    },
}

fn default_max_payload_size() -> usize {
    DEFAULT_MAX_PAYLOAD_SIZE
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::Forward {
            host: "127.0.0.1".to_owned(),
            port: 24224,
        }
    }
}

impl SinkConfig {
    /// 싱크 설정을 검증합니다.
    pub fn validate(&self) -> Result<(), TailpostError> {
        match self {
            SinkConfig::Forward { host, port } => {
                if host.is_empty() {
                    return Err(invalid("sources.sink.host", "host must not be empty"));
                }
                if *port == 0 {
                    return Err(invalid("sources.sink.port", "port must not be zero"));
                }
            }
            SinkConfig::Stream {
                stream_name,
                region,
                max_payload_size,
                ..
            } => {
                if stream_name.is_empty() {
                    return Err(invalid(
                        "sources.sink.stream_name",
                        "stream name must not be empty",
                    ));
                }
                if region.is_empty() {
                    return Err(invalid("sources.sink.region", "region must not be empty"));
                }
                if *max_payload_size == 0 {
                    return Err(invalid(
                        "sources.sink.max_payload_size",
                        "payload size must be greater than zero",
                    ));
                }
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> TailpostError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
    .into()
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}
