//! Per-turn orchestration context. Everything a task operation needs —
//! content, variables, identity bindings, the function registry — is
//! carried here explicitly and passed by reference; there are no
//! process-wide singletons.

use std::sync::Arc;

use tracing::warn;

use crate::error::ExprError;
use crate::expression::{self, FunctionRegistry, Scope, Value};
use crate::state::{Trigger, VariableStore};
use crate::template;

/// Fixed identity bindings available to template substitution.
#[derive(Debug, Clone, Default)]
pub struct IdentityProfile {
    pub user: String,
    pub persona: String,
    pub char_name: String,
    pub personality: String,
    pub scenario: String,
}

pub struct TurnContext {
    pub variables: VariableStore,
    pub functions: Arc<FunctionRegistry>,
    pub identity: IdentityProfile,
    content: String,
    /// Reserved `label` binding, set while a winning classification's
    /// updates run.
    label: Option<String>,
}

impl TurnContext {
    pub fn new(
        variables: VariableStore,
        functions: Arc<FunctionRegistry>,
        identity: IdentityProfile,
    ) -> Self {
        Self {
            variables,
            functions,
            identity,
            content: String::new(),
            label: None,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
    }

    /// Swap in temporary content (a generator's output) and return the
    /// previous value for restoration.
    pub fn swap_content(&mut self, content: String) -> String {
        std::mem::replace(&mut self.content, content)
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = Some(label.into());
    }

    pub fn clear_label(&mut self) {
        self.label = None;
    }

    /// Current expression scope: every variable value plus the reserved
    /// `content` entry.
    pub fn scope(&self) -> Scope {
        let mut scope: Scope = self
            .variables
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        scope.insert("content".to_string(), Value::Str(self.content.clone()));
        scope
    }

    /// Textual `{{tag}}` substitution over identity bindings, `content`,
    /// `label`, and variable values. Runs before expression evaluation.
    pub fn substitute(&self, text: &str) -> String {
        template::substitute(text, |name| self.lookup_tag(name))
    }

    fn lookup_tag(&self, name: &str) -> Option<String> {
        match name {
            "user" => return Some(template::escape(&self.identity.user)),
            "persona" => return Some(template::escape(&self.identity.persona)),
            "char" => return Some(template::escape(&self.identity.char_name)),
            "personality" => return Some(template::escape(&self.identity.personality)),
            "scenario" => return Some(template::escape(&self.identity.scenario)),
            "content" => return Some(template::escape(&self.content)),
            "label" => {
                if let Some(label) = &self.label {
                    return Some(template::escape(label));
                }
            }
            _ => {}
        }
        // Variable lookup is case-insensitive, matching the tag regex's
        // lowercased capture.
        for (var_name, value) in self.variables.iter() {
            if var_name.to_lowercase() == name {
                return Some(template::escape(&template::render_value(value)));
            }
        }
        None
    }

    /// Substitute tags, then parse and evaluate against the current scope.
    pub fn eval(&self, source: &str) -> Result<Value, ExprError> {
        let substituted = self.substitute(source);
        expression::evaluate(&substituted, &self.scope(), &self.functions)
    }

    /// Evaluate a gating condition; `None`/blank means `default`.
    pub fn eval_condition(&self, source: Option<&str>, default: bool) -> Result<bool, ExprError> {
        match source {
            Some(src) if !src.trim().is_empty() => Ok(self.eval(src)?.is_truthy()),
            _ => Ok(default),
        }
    }

    /// Evaluate a formula and assign the result. Evaluation errors are
    /// logged and the assignment is skipped; no error escapes to the turn.
    pub fn update_variable(&mut self, name: &str, formula: &str) {
        match self.eval(formula) {
            Ok(value) => self.variables.set(name, value),
            Err(e) => {
                warn!(variable = name, formula, error = %e, "variable update failed; effect not applied");
            }
        }
    }

    /// Initialize every declared variable that has no value yet (fresh
    /// sessions, or names newly introduced since the state was saved).
    pub fn initialize_missing(&mut self) {
        let pending: Vec<(String, String)> = self
            .variables
            .definitions()
            .iter()
            .filter(|d| !self.variables.has_value(&d.name))
            .map(|d| (d.name.clone(), d.init.clone()))
            .collect();
        for (name, init) in pending {
            match self.eval(&init) {
                Ok(value) => self.variables.set(&name, value),
                Err(e) => {
                    warn!(variable = %name, error = %e, "initializer failed; defaulting to null");
                    self.variables.set(&name, Value::Null);
                }
            }
        }
    }

    /// Run every variable's recompute expression for the given trigger,
    /// in declaration order.
    pub fn apply_trigger(&mut self, trigger: Trigger) {
        let updates: Vec<(String, String)> = self
            .variables
            .definitions()
            .iter()
            .filter_map(|d| {
                d.update_for(trigger)
                    .map(|formula| (d.name.clone(), formula.to_string()))
            })
            .collect();
        for (name, formula) in updates {
            self.update_variable(&name, &formula);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::VariableDef;

    fn ctx_with(defs: Vec<VariableDef>) -> TurnContext {
        let mut ctx = TurnContext::new(
            VariableStore::new(defs),
            Arc::new(FunctionRegistry::empty()),
            IdentityProfile {
                user: "Alice".into(),
                char_name: "Bot".into(),
                ..Default::default()
            },
        );
        ctx.initialize_missing();
        ctx
    }

    fn var(name: &str, init: &str, per_turn: Option<&str>) -> VariableDef {
        VariableDef {
            name: name.into(),
            init: init.into(),
            per_turn: per_turn.map(str::to_string),
            post_input: None,
            pre_response: None,
            post_response: None,
        }
    }

    #[test]
    fn initializes_missing_variables() {
        let ctx = ctx_with(vec![var("score", "1 + 2", None)]);
        assert_eq!(ctx.variables.get("score"), Some(&Value::Number(3.0)));
    }

    #[test]
    fn substitutes_identity_and_variables() {
        let mut ctx = ctx_with(vec![var("mood", "'happy'", None)]);
        ctx.set_content("hello");
        assert_eq!(
            ctx.substitute("{{user}}/{{char}}: {{mood}} ({{content}})"),
            "Alice/Bot: happy (hello)"
        );
    }

    #[test]
    fn eval_sees_substituted_tags_and_scope() {
        let ctx = ctx_with(vec![var("mood", "'happy'", None)]);
        assert_eq!(
            ctx.eval("'{{mood}}' == mood").unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn failed_update_leaves_value_untouched() {
        let mut ctx = ctx_with(vec![var("score", "5", None)]);
        ctx.update_variable("score", "nonsense +");
        assert_eq!(ctx.variables.get("score"), Some(&Value::Number(5.0)));
    }

    #[test]
    fn trigger_runs_only_matching_updates() {
        let mut ctx = ctx_with(vec![
            var("turns", "0", Some("turns + 1")),
            var("fixed", "7", None),
        ]);
        ctx.apply_trigger(Trigger::PerTurn);
        assert_eq!(ctx.variables.get("turns"), Some(&Value::Number(1.0)));
        assert_eq!(ctx.variables.get("fixed"), Some(&Value::Number(7.0)));
    }

    #[test]
    fn swap_content_round_trips() {
        let mut ctx = ctx_with(vec![]);
        ctx.set_content("original");
        let backup = ctx.swap_content("temporary".into());
        assert_eq!(ctx.content(), "temporary");
        ctx.set_content(backup);
        assert_eq!(ctx.content(), "original");
    }
}
