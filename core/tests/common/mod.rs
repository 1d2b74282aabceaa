use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use stagehand_core::api::{
    load_document, ClassifyBackend, ClassifyRequest, ClassifyResponse, GenerateBackend,
    IdentityProfile, ImageGenRequest, ImageGenResponse, TextGenRequest, TextGenResponse,
    TurnEngine,
};
use stagehand_core::error::BackendError;

/// Classifier backend scripted with `(label, score)` pairs. Pairs whose
/// label was not requested are filtered out; response order follows the
/// script, which is what the selection scan observes.
pub struct ScoredClassify {
    pairs: Vec<(String, f64)>,
    pub calls: AtomicUsize,
}

impl ScoredClassify {
    pub fn new(pairs: &[(&str, f64)]) -> Arc<Self> {
        Arc::new(Self {
            pairs: pairs
                .iter()
                .map(|(label, score)| (label.to_string(), *score))
                .collect(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ClassifyBackend for ScoredClassify {
    async fn classify(&self, request: ClassifyRequest) -> Result<ClassifyResponse, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut response = ClassifyResponse::default();
        for (label, score) in &self.pairs {
            if request.candidate_labels.contains(label) {
                response.labels.push(label.clone());
                response.scores.push(*score);
            }
        }
        Ok(response)
    }
}

/// Text backend that replays a queue of outputs, one per call, then
/// empty strings. Image requests return a fixed URL.
pub struct QueueGenerate {
    outputs: Mutex<VecDeque<String>>,
    pub calls: AtomicUsize,
}

impl QueueGenerate {
    pub fn new(outputs: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            outputs: Mutex::new(outputs.iter().map(|s| s.to_string()).collect()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl GenerateBackend for QueueGenerate {
    async fn text(&self, _request: TextGenRequest) -> Result<TextGenResponse, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = self.outputs.lock().unwrap().pop_front().unwrap_or_default();
        Ok(TextGenResponse { result })
    }

    async fn image(&self, _request: ImageGenRequest) -> Result<ImageGenResponse, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ImageGenResponse {
            url: "https://images.invalid/out.png".into(),
        })
    }
}

pub fn engine(
    json: &str,
    classify: Arc<dyn ClassifyBackend>,
    generate: Arc<dyn GenerateBackend>,
) -> TurnEngine {
    let document = load_document(json).expect("scenario document should load");
    TurnEngine::new(document, IdentityProfile::default(), None, classify, generate)
}
