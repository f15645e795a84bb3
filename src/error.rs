//! The engine's error surface. Intentionally small: per the runtime's
//! error-handling design, invalid runtime operations short-circuit
//! silently and are observable via status fields rather than by
//! returning an error, so `RtuneError` only covers the handful of
//! construction-time misuses worth naming.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RtuneError {
    #[error("region table at capacity ({0} entries)")]
    TableFull(&'static str),

    #[error("tunable schedule batch_size must be >= 1")]
    EmptyBatch,

    #[error("list tunable must declare at least one value")]
    EmptyList,

    #[error("range tunable step must be non-zero")]
    ZeroStep,

    #[error("unknown-kind function requires at least one input tunable")]
    NoInputs,

    #[error("objective kind does not match the constructor used to build it")]
    InvalidKind,
}
