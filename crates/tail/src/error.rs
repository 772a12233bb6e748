//! tail 도메인 에러 타입
//!
//! [`TailError`]는 tailing 파이프라인 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<TailError> for TailpostError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use tailpost_core::error::{ParseError, PipelineError, TailpostError};

/// tail 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum TailError {
    /// 현재 대상 파일 없음 (재탐색 주기에 다시 시도)
    #[error("no target for source '{0}'")]
    NoTarget(String),

    /// live 파일이 tick 도중 교체됨 — 다음 tick의 로테이션 처리에 위임
    #[error("latest file changed for source '{0}'")]
    LatestFileChanged(String),

    /// DSL 구성 에러 (시작 시 치명적)
    #[error("dsl error: {0}")]
    Dsl(#[from] DslError),

    /// 싱크 전송 에러
    #[error("sink error: {0}")]
    Sink(String),

    /// 소스 구성 에러
    #[error("source config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TailError {
    /// 파일이 사라져서 난 I/O 에러인지 여부
    pub fn is_not_found(&self) -> bool {
        matches!(self, TailError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

/// 패턴 DSL 구성 에러
///
/// 전부 구성 시점 에러이며, 소스 초기화를 중단시켜야 합니다.
#[derive(Debug, thiserror::Error)]
pub enum DslError {
    /// 정의되지 않은 노드 참조
    #[error("unresolved reference '%{{{name}}}' in '{owner}'")]
    UnresolvedReference {
        /// 참조를 포함한 패턴
        owner: String,
        /// 찾지 못한 이름
        name: String,
    },

    /// 이름 재정의
    #[error("duplicate name '{0}'")]
    DuplicateName(String),

    /// 정규식 컴파일 실패
    #[error("invalid regex for '{name}': {source}")]
    InvalidRegex {
        /// 노드 이름 또는 패턴
        name: String,
        /// regex 크레이트 에러
        #[source]
        source: regex::Error,
    },

    /// transform 테이블에 없는 이름
    #[error("unknown transform '{0}'")]
    UnknownTransform(String),

    /// transform 식 문법/인자 오류
    #[error("invalid transform expression '{expr}': {reason}")]
    InvalidTransform {
        /// 원본 식
        expr: String,
        /// 오류 사유
        reason: String,
    },

    /// key_value 패턴의 명명 캡처 수 오류
    #[error("key_value pattern must have exactly two named captures (key, value), got {0}")]
    KeyValueCaptures(usize),

    /// order 패턴에 `date`/`order` 명명 캡처가 없음
    #[error("order pattern must contain named captures 'date' and 'order'")]
    OrderCaptures,
}

impl From<TailError> for TailpostError {
    fn from(err: TailError) -> Self {
        match err {
            TailError::NoTarget(tag) => TailpostError::Pipeline(PipelineError::NoTarget(tag)),
            TailError::Sink(reason) => TailpostError::Pipeline(PipelineError::SendFailed(reason)),
            TailError::Dsl(e) => TailpostError::Parse(ParseError::Failed {
                reason: e.to_string(),
            }),
            TailError::Io(e) => TailpostError::Io(e),
            other => TailpostError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_reference_display() {
        let err = DslError::UnresolvedReference {
            owner: "%{date} %{nope}".to_owned(),
            name: "nope".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("%{nope}"));
        assert!(msg.contains("%{date}"));
    }

    #[test]
    fn not_found_detection() {
        let err = TailError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(err.is_not_found());
        let err = TailError::Io(std::io::Error::other("boom"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn converts_to_tailpost_error() {
        let err: TailpostError = TailError::NoTarget("game".to_owned()).into();
        assert!(matches!(
            err,
            TailpostError::Pipeline(PipelineError::NoTarget(_))
        ));

        let err: TailpostError = TailError::Sink("connection refused".to_owned()).into();
        assert!(matches!(
            err,
            TailpostError::Pipeline(PipelineError::SendFailed(_))
        ));
    }
}
