use thiserror::Error;

/// Expression parse and evaluation errors.
///
/// Callers catch these per expression: the effect of the failing
/// expression is simply not applied for that occurrence.
#[derive(Error, Debug)]
pub enum ExprError {
    #[error("parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("function '{name}' expects {expected} arguments, got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("type error: {0}")]
    Type(String),

    #[error("invalid regex '{pattern}': {message}")]
    Regex { pattern: String, message: String },

    #[error("index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("evaluation depth limit exceeded (possible runaway recursion)")]
    DepthExceeded,

    #[error("division by zero")]
    DivisionByZero,
}
