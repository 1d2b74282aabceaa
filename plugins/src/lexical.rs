//! Local fallback classifier. No model, no network: a candidate scores
//! by how much of its label's vocabulary appears verbatim in the
//! sequence. Crude, but deterministic and always available, and it keeps
//! the orchestrator fed with well-formed responses when the remote
//! service is down.

use std::collections::HashSet;

use stagehand_core::api::{ClassifyBackend, ClassifyRequest, ClassifyResponse};
use stagehand_core::error::BackendError;

use async_trait::async_trait;

/// Lowercased alphanumeric tokens.
pub(crate) fn tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

#[derive(Debug, Default)]
pub struct LexicalClassifier;

impl LexicalClassifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ClassifyBackend for LexicalClassifier {
    async fn classify(&self, request: ClassifyRequest) -> Result<ClassifyResponse, BackendError> {
        let sequence = tokens(&request.sequence);
        let mut response = ClassifyResponse::default();
        for label in &request.candidate_labels {
            let vocabulary = tokens(label);
            if vocabulary.is_empty() {
                continue;
            }
            let hits = vocabulary.intersection(&sequence).count() as f64;
            let score = hits / vocabulary.len() as f64;
            response.labels.push(label.clone());
            response.scores.push(score);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn literal_mention_scores_full() {
        let backend = LexicalClassifier::new();
        let response = backend
            .classify(ClassifyRequest {
                sequence: "I am so happy today!".into(),
                candidate_labels: vec!["happy".into(), "sad".into()],
                hypothesis_template: "The user is {}.".into(),
                multi_label: true,
            })
            .await
            .unwrap();
        assert_eq!(response.labels, vec!["happy", "sad"]);
        assert_eq!(response.scores, vec![1.0, 0.0]);
    }

    #[test]
    fn jaccard_is_symmetric_and_bounded() {
        let a = tokens("the user is happy");
        let b = tokens("the user is sad");
        let sim = jaccard(&a, &b);
        assert!(sim > 0.0 && sim < 1.0);
        assert_eq!(sim, jaccard(&b, &a));
        assert_eq!(jaccard(&a, &a), 1.0);
    }
}
