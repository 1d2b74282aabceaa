//! Zero-shot classification over a plain text generator. The generator
//! is prompted to score each hypothesis; its free-form answer is parsed
//! back into the `{labels, scores}` shape by line pattern plus token-set
//! similarity, so mild rephrasing by the model still resolves to the
//! right candidate.

use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use stagehand_core::api::{
    ClassifyBackend, ClassifyRequest, ClassifyResponse, GenerateBackend, TextGenRequest,
};
use stagehand_core::error::BackendError;

use async_trait::async_trait;

use crate::lexical::{jaccard, tokens};

const MAX_ATTEMPTS: u32 = 3;
const MATCH_FLOOR: f64 = 0.5;

pub struct LlmClassifier {
    backend: Arc<dyn GenerateBackend>,
}

impl LlmClassifier {
    pub fn new(backend: Arc<dyn GenerateBackend>) -> Self {
        Self { backend }
    }

    fn build_prompt(request: &ClassifyRequest) -> String {
        let mut prompt = String::from(
            "Rate how strongly each hypothesis is entailed by the text, \
             as a number between 0 and 1.\n\nText:\n",
        );
        prompt.push_str(&request.sequence);
        prompt.push_str("\n\nHypotheses:\n");
        for (i, label) in request.candidate_labels.iter().enumerate() {
            let hypothesis = request.hypothesis_template.replace("{}", label);
            prompt.push_str(&format!("{}. {}\n", i + 1, hypothesis));
        }
        prompt.push_str(
            "\nAnswer with one line per hypothesis, in the form \
             `N. hypothesis: score`, and nothing else.\n",
        );
        prompt
    }

    /// Parse `N. hypothesis: score` lines and resolve each hypothesis
    /// back to its candidate label.
    fn parse(answer: &str, request: &ClassifyRequest) -> ClassifyResponse {
        static LINE: OnceLock<Regex> = OnceLock::new();
        let re = LINE.get_or_init(|| {
            Regex::new(r"(?m)^\s*\d+\.\s*(.*?)\s*:\s*([0-9]*\.?[0-9]+)\s*$")
                .unwrap_or_else(|e| panic!("entailment line pattern: {e}"))
        });

        let hypotheses: Vec<(String, _)> = request
            .candidate_labels
            .iter()
            .map(|label| {
                let hypothesis = request.hypothesis_template.replace("{}", label);
                (label.clone(), tokens(&hypothesis))
            })
            .collect();

        let mut response = ClassifyResponse::default();
        for captures in re.captures_iter(answer) {
            let Ok(score) = captures[2].parse::<f64>() else {
                continue;
            };
            let answered = tokens(&captures[1]);

            let best = hypotheses
                .iter()
                .map(|(label, hypothesis)| (label, jaccard(&answered, hypothesis)))
                .max_by(|a, b| a.1.total_cmp(&b.1));
            match best {
                Some((label, similarity)) if similarity >= MATCH_FLOOR => {
                    if !response.labels.contains(label) {
                        response.labels.push(label.clone());
                        response.scores.push(score.clamp(0.0, 1.0));
                    }
                }
                _ => {
                    debug!(line = &captures[1], "unmatched entailment line");
                }
            }
        }
        response
    }
}

#[async_trait]
impl ClassifyBackend for LlmClassifier {
    async fn classify(&self, request: ClassifyRequest) -> Result<ClassifyResponse, BackendError> {
        let prompt = Self::build_prompt(&request);

        for attempt in 1..=MAX_ATTEMPTS {
            let answer = self
                .backend
                .text(TextGenRequest {
                    prompt: prompt.clone(),
                    min_tokens: 0,
                    max_tokens: 40 * request.candidate_labels.len().max(1) as u32,
                    stop: vec![],
                    include_history: false,
                })
                .await?;

            let response = Self::parse(&answer.result, &request);
            if !response.labels.is_empty() {
                return Ok(response);
            }
            warn!(attempt, "entailment answer yielded no scores");
        }
        Ok(ClassifyResponse::default())
    }
}
