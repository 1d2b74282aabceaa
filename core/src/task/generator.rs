use tracing::{debug, warn};

use crate::backend::{ImageGenRequest, TextGenRequest};
use crate::config::types::{GeneratorDef, GeneratorKind, Phase};
use crate::context::TurnContext;
use crate::task::{TaskState, MAX_RETRIES};

/// What a generator asks its backend for.
#[derive(Debug, Clone)]
pub enum GenRequest {
    Text(TextGenRequest),
    Image(ImageGenRequest),
}

/// Outcome of applying a ready generator result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Updates ran; the task is processed.
    Processed,
    /// The output was rejected and the task returned to not-started for
    /// another attempt.
    Retrying,
    /// The output was rejected with no retries left; the task is skipped.
    Exhausted,
    /// There was no ready result to apply.
    NotReady,
}

pub struct GeneratorTask {
    pub def: GeneratorDef,
    pub state: TaskState<String>,
    retries: u32,
}

impl GeneratorTask {
    pub fn new(def: GeneratorDef) -> Self {
        Self {
            def,
            state: TaskState::default(),
            retries: 0,
        }
    }

    pub fn reset(&mut self) {
        self.state.reset();
        self.retries = 0;
    }

    #[cfg(test)]
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Build the backend request for this phase, or mark the task skipped
    /// and return `None`. The prompt is tag-substituted and then evaluated
    /// as an expression, so prompts can branch on variables.
    pub fn build_request(&mut self, phase: Phase, ctx: &TurnContext) -> Option<GenRequest> {
        if self.def.phase != phase {
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
                warn!(generator = %self.def.name, error = %e, "condition failed to evaluate; skipping");
                self.state.skipped = true;
                return None;
            }
        }

        let prompt = match ctx.eval(&self.def.prompt) {
            Ok(value) => value.render(),
            Err(e) => {
                warn!(generator = %self.def.name, error = %e, "prompt failed to evaluate; skipping");
                self.state.skipped = true;
                return None;
            }
        };

        match self.def.kind {
            GeneratorKind::Text => Some(GenRequest::Text(TextGenRequest {
                prompt,
                min_tokens: self.def.min_tokens.unwrap_or(0),
                max_tokens: self.def.max_tokens.unwrap_or(512),
                stop: self
                    .def
                    .stopping_strings
                    .as_deref()
                    .unwrap_or("")
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
                include_history: self.def.include_history,
            })),
            GeneratorKind::Image => {
                let negative_prompt = match self.def.negative_prompt.as_deref() {
                    Some(src) => match ctx.eval(src) {
                        Ok(value) => value.render(),
                        Err(e) => {
                            warn!(generator = %self.def.name, error = %e, "negative prompt failed to evaluate; ignoring");
                            String::new()
                        }
                    },
                    None => String::new(),
                };
                Some(GenRequest::Image(ImageGenRequest {
                    prompt,
                    negative_prompt,
                    aspect_ratio: self.def.aspect_ratio.clone(),
                    remove_background: self.def.remove_background,
                }))
            }
        }
    }

    /// Apply a ready result. The generator's output stands in as `content`
    /// while the retry condition and updates evaluate; the caller's
    /// original content is restored on every path out.
    pub fn apply(&mut self, ctx: &mut TurnContext) -> ApplyOutcome {
        let Some(output) = self.state.result.take() else {
            return ApplyOutcome::NotReady;
        };

        let backup = ctx.swap_content(output.clone());

        let retry_requested = output.is_empty()
            || match ctx.eval_condition(self.def.retry_condition.as_deref(), false) {
                Ok(wanted) => wanted,
                Err(e) => {
                    warn!(generator = %self.def.name, error = %e, "retry condition failed to evaluate; accepting output");
                    false
                }
            };

        if retry_requested {
            ctx.set_content(backup);
            if self.retries < MAX_RETRIES {
                self.retries += 1;
                debug!(generator = %self.def.name, retry = self.retries, "output rejected; retrying");
                self.state.result = None;
                self.state.inflight = None;
                return ApplyOutcome::Retrying;
            }
            debug!(generator = %self.def.name, "retries exhausted; skipping");
            self.state.skipped = true;
            return ApplyOutcome::Exhausted;
        }

        for (variable, formula) in &self.def.updates {
            ctx.update_variable(variable, formula);
        }
        ctx.set_content(backup);
        self.state.processed = true;
        ApplyOutcome::Processed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::types::VariableDef;
    use crate::context::IdentityProfile;
    use crate::expression::{FunctionRegistry, Value};
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

    fn generator(prompt: &str) -> GeneratorTask {
        GeneratorTask::new(GeneratorDef {
            name: "summary".into(),
            kind: GeneratorKind::Text,
            phase: Phase::OnInput,
            lazy: false,
            condition: None,
            dependencies: vec![],
            prompt: prompt.into(),
            negative_prompt: None,
            min_tokens: None,
            max_tokens: None,
            stopping_strings: Some("END, STOP".into()),
            include_history: false,
            aspect_ratio: None,
            remove_background: false,
            retry_condition: None,
            updates: vec![],
        })
    }

    #[test]
    fn phase_mismatch_skips() {
        let mut task = generator("'hi'");
        let c = ctx(vec![]);
        assert!(task.build_request(Phase::OnResponse, &c).is_none());
        assert!(task.state.skipped);
    }

    #[test]
    fn builds_text_request_from_evaluated_prompt() {
        let mut task = generator("'Summarize: ' + content");
        let mut c = ctx(vec![]);
        c.set_content("the message");
        let Some(GenRequest::Text(request)) = task.build_request(Phase::OnInput, &c) else {
            panic!("expected a text request");
        };
        assert_eq!(request.prompt, "Summarize: the message");
        assert_eq!(request.stop, vec!["END", "STOP"]);
        assert_eq!(request.max_tokens, 512);
    }

    #[test]
    fn unparseable_prompt_skips() {
        let mut task = generator("'unterminated");
        let c = ctx(vec![]);
        assert!(task.build_request(Phase::OnInput, &c).is_none());
        assert!(task.state.skipped);
    }

    #[test]
    fn apply_runs_updates_with_output_as_content() {
        let mut task = generator("'x'");
        task.def.updates = vec![("out".into(), "content".to_string())];
        let mut c = ctx(vec![variable("out", "''")]);
        c.set_content("original");
        task.state.result = Some("generated text".into());
        assert_eq!(task.apply(&mut c), ApplyOutcome::Processed);
        assert_eq!(
            c.variables.get("out"),
            Some(&Value::Str("generated text".into()))
        );
        assert_eq!(c.content(), "original");
        assert!(task.state.processed);
    }

    #[test]
    fn updates_apply_in_declaration_order() {
        let mut task = generator("'x'");
        task.def.updates = vec![
            ("trail".into(), "'a'".to_string()),
            ("trail".into(), "trail + 'b'".to_string()),
        ];
        let mut c = ctx(vec![variable("trail", "''")]);
        task.state.result = Some("output".into());
        assert_eq!(task.apply(&mut c), ApplyOutcome::Processed);
        assert_eq!(c.variables.get("trail"), Some(&Value::Str("ab".into())));
    }

    #[test]
    fn empty_output_retries_until_exhausted() {
        let mut task = generator("'x'");
        let mut c = ctx(vec![]);
        for attempt in 1..=MAX_RETRIES {
            task.state.result = Some(String::new());
            assert_eq!(task.apply(&mut c), ApplyOutcome::Retrying);
            assert_eq!(task.retries(), attempt);
            assert!(!task.state.is_started());
        }
        task.state.result = Some(String::new());
        assert_eq!(task.apply(&mut c), ApplyOutcome::Exhausted);
        assert!(task.state.skipped);
    }

    #[test]
    fn retry_condition_rejects_output() {
        let mut task = generator("'x'");
        task.def.retry_condition = Some("contains(content, 'sorry')".into());
        let mut c = ctx(vec![]);
        c.set_content("original");
        task.state.result = Some("I'm sorry, I cannot".into());
        assert_eq!(task.apply(&mut c), ApplyOutcome::Retrying);
        assert_eq!(c.content(), "original");

        task.state.result = Some("A fine answer".into());
        assert_eq!(task.apply(&mut c), ApplyOutcome::Processed);
    }

    #[test]
    fn broken_retry_condition_accepts_output() {
        let mut task = generator("'x'");
        task.def.retry_condition = Some("nonsense +".into());
        let mut c = ctx(vec![]);
        task.state.result = Some("output".into());
        assert_eq!(task.apply(&mut c), ApplyOutcome::Processed);
    }
}
