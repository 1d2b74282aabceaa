//! Turn-scoped request orchestration for conversational exchanges.
//!
//! A scenario document declares variables, expression functions,
//! classifiers, generators, and content rules; [`engine::TurnEngine`]
//! drives one user/model exchange through variable triggers, a
//! dependency-aware concurrent task set, and declarative content
//! rewriting, yielding the rewritten message and persistable state.

pub mod api;
pub mod backend;
pub mod config;
pub mod content;
pub mod context;
pub mod engine;
pub mod error;
pub mod expression;
pub mod orchestrator;
pub mod state;
pub mod task;
pub mod template;
