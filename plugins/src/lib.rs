//! Backend implementations for the stagehand orchestrator.
//!
//! The core crate defines the `ClassifyBackend`/`GenerateBackend`
//! contracts; this crate supplies the production implementations: JSON
//! HTTP clients, an adapter that turns any text generator into a
//! zero-shot classifier, a lexical local fallback, and the failover
//! wrapper that stitches remote and fallback together.

pub mod failover;
pub mod http;
pub mod lexical;
pub mod llm;

pub use failover::FailoverClassifier;
pub use http::{HttpClassifier, HttpGenerator};
pub use lexical::LexicalClassifier;
pub use llm::LlmClassifier;
