//! Expression substrate: value model, parser, evaluator, built-in
//! functions, and the user-function dependency resolver.

pub mod builtins;
pub mod eval;
pub mod functions;
pub mod parser;
pub mod value;

pub use eval::Evaluator;
pub use functions::{FunctionRegistry, Symbol, UserFunction};
pub use parser::{parse, Expr};
pub use value::{Scope, Value};

use crate::error::ExprError;

/// Parse and evaluate in one step. Most call sites run each source string
/// once per turn; the parse cost is negligible next to the backend calls.
pub fn evaluate(source: &str, scope: &Scope, functions: &FunctionRegistry) -> Result<Value, ExprError> {
    let expr = parse(source)?;
    Evaluator::new(functions).eval(&expr, scope)
}
