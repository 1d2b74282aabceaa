//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `stagehand_core::api` instead of reaching into
//! internal modules.

pub use crate::backend::{
    ClassifyBackend, ClassifyRequest, ClassifyResponse, GenerateBackend, ImageGenRequest,
    ImageGenResponse, TextGenRequest, TextGenResponse,
};
pub use crate::config::load::{load_document, request_updated_variables};
pub use crate::config::types::{
    ClassificationDef, ClassifierDef, ContentCategory, ContentRuleDef, Document, FunctionDef,
    GeneratorDef, GeneratorKind, Phase, VariableDef,
};
pub use crate::context::{IdentityProfile, TurnContext};
pub use crate::engine::{TurnEngine, TurnOutcome};
pub use crate::error::{BackendError, ConfigError, ExprError, OrchestratorError};
pub use crate::expression::{evaluate, FunctionRegistry, Scope, Value};
pub use crate::orchestrator::Orchestrator;
pub use crate::state::{Trigger, VariableStore};
