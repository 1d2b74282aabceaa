#[allow(clippy::module_inception)]
pub mod error;
pub mod expression;
pub mod orchestrator;

pub use error::{BackendError, ConfigError};
pub use expression::ExprError;
pub use orchestrator::OrchestratorError;
