//! 소스 설정으로부터 추출기 구성
//!
//! 설정 파일의 토큰/그룹은 이름순으로 저장되므로 선언 순서가 의존
//! 순서와 다를 수 있습니다. 미해결 참조 에러가 난 항목을 다음 라운드로
//! 미루는 고정점 반복으로 등록하고, 한 라운드 동안 진전이 없으면 실제
//! 미해결(또는 순환) 참조로 보고 중단합니다.

use crate::dsl::PatternSet;
use crate::engine::Extractor;
use crate::error::{DslError, TailError};
use crate::multiline;
use tailpost_core::config::{ParserConfig, SourceConfig};

/// 소스 설정에 맞는 추출기를 만듭니다.
///
/// `format`이 있으면 단일 형식, `parser`가 있으면 DSL(다중행 포함),
/// 둘 다 없으면 pass-through입니다.
pub fn build_extractor(cfg: &SourceConfig) -> Result<Extractor, TailError> {
    if let Some(format) = &cfg.format {
        let mut set = PatternSet::new();
        set.format(format)?;
        return Ok(Extractor::Format(set));
    }

    let Some(parser) = &cfg.parser else {
        return Ok(Extractor::Raw);
    };

    let set = build_pattern_set(parser)?;
    if let Some(ml) = &parser.multiline {
        return Ok(Extractor::Multiline(multiline::from_config(&set, ml)?));
    }
    Ok(Extractor::Format(set))
}

/// 파서 설정의 토큰/그룹/형식을 등록한 패턴 집합을 만듭니다.
pub fn build_pattern_set(parser: &ParserConfig) -> Result<PatternSet, TailError> {
    let mut set = PatternSet::new();

    // 토큰 등록 (고정점 반복)
    let mut pending: Vec<(&str, &str, Option<&str>)> = Vec::with_capacity(parser.tokens.len());
    for (name, spec) in &parser.tokens {
        let Some((pattern, transform)) = spec.parts() else {
            return Err(TailError::Config {
                field: format!("parser.tokens.{name}"),
                reason: "token must be a pattern or a [pattern, transform] pair".to_owned(),
            });
        };
        pending.push((name, pattern, transform));
    }
    loop {
        let mut next = Vec::new();
        let mut progressed = false;
        let mut last_err = None;
        for (name, pattern, transform) in pending {
            let result = match transform {
                Some(expr) => set.token_with_transform(name, pattern, expr),
                None => set.token(name, pattern),
            };
            match result {
                Ok(()) => progressed = true,
                Err(err @ DslError::UnresolvedReference { .. }) => {
                    next.push((name, pattern, transform));
                    last_err = Some(err);
                }
                Err(e) => return Err(e.into()),
            }
        }
        if next.is_empty() {
            break;
        }
        if !progressed {
            let Some(err) = last_err else { break };
            return Err(err.into());
        }
        pending = next;
    }

    // 그룹 등록 (토큰과 같은 방식)
    let mut pending: Vec<(&str, &str)> = parser
        .groups
        .iter()
        .map(|(name, pattern)| (name.as_str(), pattern.as_str()))
        .collect();
    loop {
        let mut next = Vec::new();
        let mut progressed = false;
        let mut last_err = None;
        for (name, pattern) in pending {
            match set.group(name, pattern) {
                Ok(()) => progressed = true,
                Err(err @ DslError::UnresolvedReference { .. }) => {
                    next.push((name, pattern));
                    last_err = Some(err);
                }
                Err(e) => return Err(e.into()),
            }
        }
        if next.is_empty() {
            break;
        }
        if !progressed {
            let Some(err) = last_err else { break };
            return Err(err.into());
        }
        pending = next;
    }

    // 형식은 선언 순서가 시도 순서
    for format in &parser.formats {
        set.format(format)?;
    }

    Ok(set)
}
