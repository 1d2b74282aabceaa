use std::collections::HashMap;

use tracing::{debug, warn};

use crate::backend::{ClassifyRequest, ClassifyResponse};
use crate::config::types::{ClassifierDef, Phase};
use crate::context::TurnContext;
use crate::expression::Value;
use crate::task::{TaskState, DEFAULT_THRESHOLD};

/// A classifier task: candidate construction on start, winner selection
/// and updates on apply.
pub struct ClassifierTask {
    pub def: ClassifierDef,
    pub state: TaskState<ClassifyResponse>,

    /// Candidate label -> owning classification index, rebuilt on every
    /// start. Dynamic labels make this a per-turn artifact.
    label_mapping: HashMap<String, usize>,
}

impl ClassifierTask {
    pub fn new(def: ClassifierDef) -> Self {
        Self {
            def,
            state: TaskState::default(),
            label_mapping: HashMap::new(),
        }
    }

    pub fn reset(&mut self) {
        self.state.reset();
        self.label_mapping.clear();
    }

    /// Build the classification request for this phase, or mark the task
    /// skipped and return `None`. Never issues anything itself; the
    /// orchestrator owns dispatch.
    pub fn build_request(&mut self, phase: Phase, ctx: &TurnContext) -> Option<ClassifyRequest> {
        let (template, hypothesis) = match phase {
            Phase::OnResponse => (
                self.def.response_template.as_deref(),
                self.def.response_hypothesis.as_deref(),
            ),
            _ => (
                self.def.input_template.as_deref(),
                self.def.input_hypothesis.as_deref(),
            ),
        };

        let hypothesis = ctx.substitute(hypothesis.unwrap_or(""));
        if hypothesis.trim().is_empty() {
            // This classifier does not apply to this phase's content.
            self.state.skipped = true;
            return None;
        }

        match ctx.eval_condition(self.def.condition.as_deref(), true) {
            Ok(true) => {}
            Ok(false) => {
                self.state.skipped = true;
                return None;
            }
            Err(e) => {
                warn!(classifier = %self.def.name, error = %e, "condition failed to evaluate; skipping");
                self.state.skipped = true;
                return None;
            }
        }

        let sequence = ctx.substitute(template.unwrap_or(""));
        let sequence = if sequence.trim().is_empty() {
            ctx.content().to_string()
        } else {
            sequence.replace("{}", ctx.content())
        };

        let mut candidates = Vec::new();
        self.label_mapping.clear();
        for (index, classification) in self.def.classifications.iter().enumerate() {
            match ctx.eval_condition(classification.condition.as_deref(), true) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!(
                        classifier = %self.def.name,
                        label = %classification.label,
                        error = %e,
                        "classification condition failed; excluding candidate"
                    );
                    continue;
                }
            }

            let substituted = ctx.substitute(&classification.label);
            if classification.dynamic {
                let labels = match ctx.eval(&substituted) {
                    Ok(Value::Str(s)) => vec![s],
                    Ok(Value::List(items)) => items.iter().map(Value::render).collect(),
                    Ok(other) => vec![other.render()],
                    Err(e) => {
                        warn!(
                            classifier = %self.def.name,
                            label = %substituted,
                            error = %e,
                            "dynamic label failed to evaluate"
                        );
                        continue;
                    }
                };
                for label in labels {
                    if !label.is_empty() {
                        self.label_mapping.insert(label.clone(), index);
                        candidates.push(label);
                    }
                }
            } else {
                self.label_mapping.insert(substituted.clone(), index);
                candidates.push(substituted);
            }
        }

        if candidates.is_empty() {
            self.state.skipped = true;
            return None;
        }

        Some(ClassifyRequest {
            sequence,
            candidate_labels: candidates,
            hypothesis_template: hypothesis,
            multi_label: true,
        })
    }

    /// Apply a ready result: one left-to-right scan in backend order, at
    /// most one winner per category, then the winners' updates. A later
    /// equal score never displaces an earlier winner.
    pub fn apply(&mut self, ctx: &mut TurnContext) {
        let Some(response) = self.state.result.take() else {
            return;
        };

        struct Winner {
            index: usize,
            matched_label: String,
            score: f64,
        }

        let mut order: Vec<String> = Vec::new();
        let mut winners: HashMap<String, Winner> = HashMap::new();

        for (label, score) in response.labels.iter().zip(response.scores.iter()) {
            let Some(&index) = self.label_mapping.get(label) else {
                continue;
            };
            let classification = &self.def.classifications[index];
            // The configured threshold can only raise the bar, never
            // lower it below the system default.
            let threshold = classification
                .threshold
                .unwrap_or(DEFAULT_THRESHOLD)
                .max(DEFAULT_THRESHOLD);
            if *score < threshold {
                continue;
            }
            let category = classification.category_key().to_string();
            match winners.get(&category) {
                Some(best) if *score <= best.score => continue,
                Some(_) => {}
                None => order.push(category.clone()),
            }
            winners.insert(
                category,
                Winner {
                    index,
                    matched_label: label.clone(),
                    score: *score,
                },
            );
        }

        for category in &order {
            let winner = &winners[category];
            let classification = &self.def.classifications[winner.index];
            debug!(
                classifier = %self.def.name,
                category = %category,
                label = %winner.matched_label,
                score = winner.score,
                "classification selected"
            );
            ctx.set_label(winner.matched_label.clone());
            for (variable, formula) in &classification.updates {
                ctx.update_variable(variable, formula);
            }
            ctx.clear_label();
        }

        self.state.processed = true;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::types::{ClassificationDef, VariableDef};
    use crate::context::IdentityProfile;
    use crate::expression::FunctionRegistry;
    use crate::state::VariableStore;

    fn ctx(defs: Vec<VariableDef>) -> TurnContext {
        let mut ctx = TurnContext::new(
            VariableStore::new(defs),
            Arc::new(FunctionRegistry::empty()),
            IdentityProfile::default(),
        );
        ctx.initialize_missing();
        ctx
    }

    fn variable(name: &str, init: &str) -> VariableDef {
        VariableDef {
            name: name.into(),
            init: init.into(),
            per_turn: Some("null".into()),
            post_input: None,
            pre_response: None,
            post_response: None,
        }
    }

    fn classification(label: &str, category: &str, threshold: f64) -> ClassificationDef {
        ClassificationDef {
            label: label.into(),
            dynamic: false,
            condition: None,
            category: Some(category.into()),
            threshold: Some(threshold),
            updates: vec![("winner".into(), format!("'{label}'"))],
        }
    }

    fn classifier(classifications: Vec<ClassificationDef>) -> ClassifierTask {
        ClassifierTask::new(ClassifierDef {
            name: "mood".into(),
            condition: None,
            dependencies: vec![],
            input_template: None,
            response_template: None,
            input_hypothesis: Some("The speaker is {}.".into()),
            response_hypothesis: None,
            classifications,
        })
    }

    #[test]
    fn blank_hypothesis_skips_without_request() {
        let mut task = classifier(vec![classification("happy", "mood", 0.6)]);
        task.def.input_hypothesis = None;
        let ctx = ctx(vec![]);
        assert!(task.build_request(Phase::OnInput, &ctx).is_none());
        assert!(task.state.skipped);
    }

    #[test]
    fn false_condition_skips() {
        let mut task = classifier(vec![classification("happy", "mood", 0.6)]);
        task.def.condition = Some("1 == 2".into());
        let ctx = ctx(vec![]);
        assert!(task.build_request(Phase::OnInput, &ctx).is_none());
        assert!(task.state.skipped);
    }

    #[test]
    fn builds_candidates_with_dynamic_expansion() {
        let mut task = classifier(vec![
            classification("happy", "mood", 0.6),
            ClassificationDef {
                label: "['angry', 'calm']".into(),
                dynamic: true,
                condition: None,
                category: Some("temper".into()),
                threshold: None,
                updates: vec![],
            },
        ]);
        let mut c = ctx(vec![]);
        c.set_content("some message");
        let request = task.build_request(Phase::OnInput, &c).unwrap();
        assert_eq!(request.candidate_labels, vec!["happy", "angry", "calm"]);
        assert_eq!(request.sequence, "some message");
        assert!(request.multi_label);
    }

    #[test]
    fn highest_score_in_category_wins() {
        let mut task = classifier(vec![
            classification("happy", "mood", 0.6),
            classification("sad", "mood", 0.6),
        ]);
        let mut c = ctx(vec![variable("winner", "''")]);
        c.set_content("msg");
        task.build_request(Phase::OnInput, &c).unwrap();
        task.state.result = Some(ClassifyResponse {
            labels: vec!["happy".into(), "sad".into()],
            scores: vec![0.7, 0.9],
        });
        task.apply(&mut c);
        assert_eq!(c.variables.get("winner"), Some(&Value::Str("sad".into())));
        assert!(task.state.processed);
    }

    #[test]
    fn later_equal_score_never_overrides() {
        let mut task = classifier(vec![
            classification("happy", "mood", 0.6),
            classification("sad", "mood", 0.6),
        ]);
        let mut c = ctx(vec![variable("winner", "''")]);
        c.set_content("msg");
        task.build_request(Phase::OnInput, &c).unwrap();
        task.state.result = Some(ClassifyResponse {
            labels: vec!["happy".into(), "sad".into()],
            scores: vec![0.8, 0.8],
        });
        task.apply(&mut c);
        assert_eq!(
            c.variables.get("winner"),
            Some(&Value::Str("happy".into()))
        );
    }

    #[test]
    fn below_threshold_selects_nothing() {
        let mut task = classifier(vec![classification("happy", "mood", 0.6)]);
        let mut c = ctx(vec![variable("winner", "''")]);
        c.set_content("msg");
        task.build_request(Phase::OnInput, &c).unwrap();
        task.state.result = Some(ClassifyResponse {
            labels: vec!["happy".into()],
            scores: vec![0.5],
        });
        task.apply(&mut c);
        assert_eq!(c.variables.get("winner"), Some(&Value::Str("".into())));
        assert!(task.state.processed);
    }

    #[test]
    fn label_binding_is_set_during_updates() {
        let mut task = classifier(vec![ClassificationDef {
            label: "happy".into(),
            dynamic: false,
            condition: None,
            category: None,
            threshold: Some(0.5),
            updates: vec![("winner".into(), "'{{label}}'".to_string())],
        }]);
        let mut c = ctx(vec![variable("winner", "''")]);
        c.set_content("msg");
        task.build_request(Phase::OnInput, &c).unwrap();
        task.state.result = Some(ClassifyResponse {
            labels: vec!["happy".into()],
            scores: vec![0.9],
        });
        task.apply(&mut c);
        assert_eq!(
            c.variables.get("winner"),
            Some(&Value::Str("happy".into()))
        );
    }
}
