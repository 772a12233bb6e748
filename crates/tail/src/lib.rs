#![doc = include_str!("../README.md")]

pub mod config;
pub mod dsl;
pub mod engine;
pub mod error;
pub mod fs;
pub mod multiline;
pub mod position;
pub mod resolver;
pub mod sink;
pub mod supervisor;
pub mod transform;

// --- 주요 타입 re-export ---

// 엔진
pub use engine::{Extractor, TailEngine};

// 패턴 DSL
pub use dsl::PatternSet;

// 에러
pub use error::{DslError, TailError};

// 싱크
pub use sink::{BatchSender, ForwardSink, RecordSink, Sink, StreamSink};

// 워커 관리
pub use supervisor::Supervisor;

// 위치/대상
pub use position::{PositionStore, StartPolicy};
pub use resolver::TargetResolver;
