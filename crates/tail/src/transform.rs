//! 토큰 캡처 값 변환 식
//!
//! 토큰 정의에 `['%(.*)', 'json(_)']`처럼 붙는 호출 식을 다룹니다.
//! 식은 구성 시점에 AST로 파싱/검증되고, 매 줄마다 캡처 문자열에
//! 적용됩니다. `_`는 캡처된 입력 값을 가리킵니다.
//!
//! 지원 함수는 고정 테이블입니다:
//!
//! | 함수 | 인자 | 동작 |
//! |------|------|------|
//! | `json(e)` | 1 | 문자열을 JSON으로 파싱 |
//! | `flatten(e)` | 1 | 중첩 객체를 `a_b` 키로 평탄화 |
//! | `prefix(e, 'p')` | 2 (두 번째는 리터럴) | 객체 키에 `p_` 접두어 |
//! | `lower_keys(e)` | 1 | 객체 키를 소문자로 |
//! | `upper_keys(e)` | 1 | 객체 키를 대문자로 |

use serde_json::Value;

use crate::error::DslError;

/// 변환 식 적용 중 런타임 오류
///
/// 구성 오류([`DslError`])와 달리 줄 단위로 발생하며, 호출자는
/// 경고 후 원본 문자열을 유지하는 식으로 복구합니다.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct TransformError(String);

/// 파싱/검증이 끝난 변환 식
#[derive(Debug, Clone, PartialEq)]
pub enum TransformExpr {
    /// 캡처된 입력 값 (`_`)
    Input,
    /// 문자열 리터럴
    Str(String),
    /// 함수 호출
    Call {
        /// 함수 이름
        name: String,
        /// 인자 목록
        args: Vec<TransformExpr>,
    },
}

impl TransformExpr {
    /// 식 문자열을 파싱하고 함수 이름/인자 수를 검증합니다.
    pub fn parse(expr: &str) -> Result<Self, DslError> {
        let mut parser = Parser { src: expr, pos: 0 };
        let ast = parser.expr()?;
        parser.skip_ws();
        if parser.pos < parser.src.len() {
            return Err(invalid(expr, "unexpected trailing input"));
        }
        ast.check(expr)?;
        Ok(ast)
    }

    fn check(&self, src: &str) -> Result<(), DslError> {
        if let TransformExpr::Call { name, args } = self {
            match name.as_str() {
                "json" | "flatten" | "lower_keys" | "upper_keys" => {
                    if args.len() != 1 {
                        return Err(invalid(
                            src,
                            &format!("'{name}' takes exactly one argument"),
                        ));
                    }
                }
                "prefix" => {
                    if args.len() != 2 {
                        return Err(invalid(src, "'prefix' takes exactly two arguments"));
                    }
                    if !matches!(args[1], TransformExpr::Str(_)) {
                        return Err(invalid(
                            src,
                            "second argument of 'prefix' must be a string literal",
                        ));
                    }
                }
                other => return Err(DslError::UnknownTransform(other.to_owned())),
            }
            for arg in args {
                arg.check(src)?;
            }
        }
        Ok(())
    }

    /// 캡처된 입력에 식을 적용합니다.
    pub fn eval(&self, input: &str) -> Result<Value, TransformError> {
        match self {
            TransformExpr::Input => Ok(Value::String(input.to_owned())),
            TransformExpr::Str(s) => Ok(Value::String(s.clone())),
            TransformExpr::Call { name, args } => match name.as_str() {
                "json" => {
                    let arg = args[0].eval(input)?;
                    let text = arg
                        .as_str()
                        .ok_or_else(|| TransformError("'json' expects a string".to_owned()))?;
                    serde_json::from_str(text)
                        .map_err(|e| TransformError(format!("invalid json: {e}")))
                }
                "flatten" => Ok(flatten(args[0].eval(input)?)),
                "prefix" => {
                    let TransformExpr::Str(prefix) = &args[1] else {
                        // parse()가 리터럴을 보장하므로 도달하지 않음
                        return Err(TransformError("prefix argument missing".to_owned()));
                    };
                    Ok(map_keys(args[0].eval(input)?, |k| format!("{prefix}_{k}")))
                }
                "lower_keys" => Ok(map_keys(args[0].eval(input)?, |k| k.to_lowercase())),
                "upper_keys" => Ok(map_keys(args[0].eval(input)?, |k| k.to_uppercase())),
                other => Err(TransformError(format!("unknown transform '{other}'"))),
            },
        }
    }
}

fn invalid(expr: &str, reason: &str) -> DslError {
    DslError::InvalidTransform {
        expr: expr.to_owned(),
        reason: reason.to_owned(),
    }
}

/// 중첩 객체를 `parent_child` 키의 평평한 객체로 만듭니다.
/// 객체가 아닌 값은 그대로 둡니다.
fn flatten(value: Value) -> Value {
    let Value::Object(map) = value else {
        return value;
    };
    let mut out = serde_json::Map::new();
    for (key, val) in map {
        match flatten(val) {
            Value::Object(inner) => {
                for (ik, iv) in inner {
                    out.insert(format!("{key}_{ik}"), iv);
                }
            }
            other => {
                out.insert(key, other);
            }
        }
    }
    Value::Object(out)
}

/// 객체 키를 일괄 변환합니다. 객체가 아닌 값은 그대로 둡니다.
fn map_keys(value: Value, f: impl Fn(&str) -> String) -> Value {
    let Value::Object(map) = value else {
        return value;
    };
    Value::Object(map.into_iter().map(|(k, v)| (f(&k), v)).collect())
}

/// 호출 식 전용의 작은 재귀 하강 파서
struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn expr(&mut self) -> Result<TransformExpr, DslError> {
        self.skip_ws();
        match self.peek() {
            Some('_') => {
                self.pos += 1;
                Ok(TransformExpr::Input)
            }
            Some(q @ ('\'' | '"')) => self.string(q),
            Some(c) if c.is_ascii_alphabetic() => self.call(),
            _ => Err(invalid(self.src, "expected '_', a literal, or a call")),
        }
    }

    fn string(&mut self, quote: char) -> Result<TransformExpr, DslError> {
        self.pos += quote.len_utf8();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == quote {
                let text = self.src[start..self.pos].to_owned();
                self.pos += quote.len_utf8();
                return Ok(TransformExpr::Str(text));
            }
            self.pos += c.len_utf8();
        }
        Err(invalid(self.src, "unterminated string literal"))
    }

    fn call(&mut self) -> Result<TransformExpr, DslError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        let name = self.src[start..self.pos].to_owned();
        self.skip_ws();
        if self.peek() != Some('(') {
            return Err(invalid(self.src, "expected '(' after function name"));
        }
        self.pos += 1;

        let mut args = Vec::new();
        loop {
            args.push(self.expr()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(')') => {
                    self.pos += 1;
                    return Ok(TransformExpr::Call { name, args });
                }
                _ => return Err(invalid(self.src, "expected ',' or ')' in argument list")),
            }
        }
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }
}
