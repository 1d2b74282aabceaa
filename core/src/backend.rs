//! Narrow contracts for the external classification and generation
//! services. The orchestrator treats both as opaque: a failed call
//! becomes an empty-result sentinel, never a turn-level error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifyRequest {
    pub sequence: String,
    pub candidate_labels: Vec<String>,
    pub hypothesis_template: String,
    pub multi_label: bool,
}

/// Parallel arrays, same length, in whatever order the backend returned.
/// That order is an observable part of the selection contract and must be
/// preserved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifyResponse {
    pub labels: Vec<String>,
    pub scores: Vec<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextGenRequest {
    pub prompt: String,
    pub min_tokens: u32,
    pub max_tokens: u32,
    pub stop: Vec<String>,
    pub include_history: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextGenResponse {
    pub result: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageGenRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub aspect_ratio: Option<String>,
    pub remove_background: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageGenResponse {
    pub url: String,
}

#[async_trait]
pub trait ClassifyBackend: Send + Sync {
    async fn classify(&self, request: ClassifyRequest) -> Result<ClassifyResponse, BackendError>;

    /// Probe availability after a failure. Failover wrappers call this in
    /// the background to decide when to promote back to the primary.
    async fn reconnect(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

#[async_trait]
pub trait GenerateBackend: Send + Sync {
    async fn text(&self, request: TextGenRequest) -> Result<TextGenResponse, BackendError>;

    async fn image(&self, request: ImageGenRequest) -> Result<ImageGenResponse, BackendError>;
}
