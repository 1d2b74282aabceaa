//! Turn engine: the outer wiring that takes a raw user or model message
//! through variable triggers, the phase's task set, and content rules,
//! and hands back the rewritten message plus persistable state.

use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value as Json};
use tracing::{debug, info, warn};

use crate::backend::{ClassifyBackend, GenerateBackend};
use crate::config::load::request_updated_variables;
use crate::config::types::{ContentCategory, ContentRuleDef, Document, Phase};
use crate::content;
use crate::context::{IdentityProfile, TurnContext};
use crate::error::OrchestratorError;
use crate::expression::FunctionRegistry;
use crate::orchestrator::Orchestrator;
use crate::state::{Trigger, VariableStore};

/// Result of processing one side of a turn.
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    /// The message after content rules; equals the input when nothing
    /// rewrote it.
    pub modified_message: String,
    /// Out-of-band output of the post-phase rules. Those rules start from
    /// empty content, so this never overlaps the message itself.
    pub system_message: Option<String>,
    pub stage_directions: Vec<String>,
    /// Persistable variable state as of the end of processing.
    pub state: Map<String, Json>,
}

pub struct TurnEngine {
    ctx: TurnContext,
    orchestrator: Orchestrator,
    rules: Vec<ContentRuleDef>,
}

impl TurnEngine {
    /// Assemble an engine from a validated document. `saved` carries the
    /// variable state of a previous session; names it does not cover are
    /// initialized fresh.
    pub fn new(
        document: Document,
        identity: IdentityProfile,
        saved: Option<&Map<String, Json>>,
        classify_backend: Arc<dyn ClassifyBackend>,
        generate_backend: Arc<dyn GenerateBackend>,
    ) -> Self {
        let variable_names: std::collections::HashSet<String> =
            document.variables.iter().map(|v| v.name.clone()).collect();
        let functions = Arc::new(FunctionRegistry::compile(
            &document.functions,
            &variable_names,
        ));

        let mut variables = VariableStore::new(document.variables.clone());
        for name in request_updated_variables(&document) {
            variables.mark_mutable(&name);
        }
        if let Some(saved) = saved {
            variables.read_saved(saved);
        }

        let mut ctx = TurnContext::new(variables, functions, identity);
        ctx.initialize_missing();

        let orchestrator = Orchestrator::new(
            document.classifiers,
            document.generators,
            classify_backend,
            generate_backend,
        );

        info!(
            variables = variable_names.len(),
            rules = document.content.len(),
            "turn engine assembled"
        );
        Self {
            ctx,
            orchestrator,
            rules: document.content,
        }
    }

    /// Run the one-off initialization phase. Intended to be called once
    /// per session, before any turn.
    pub async fn initialize(&mut self) -> Result<(), OrchestratorError> {
        self.ctx.set_content("");
        self.orchestrator
            .run_phase(Phase::Initialization, &mut self.ctx)
            .await
    }

    /// Process a user message: `/setvar` commands, per-turn triggers, the
    /// input task set, post-input triggers, then input content rules.
    pub async fn process_input(&mut self, message: &str) -> Result<TurnOutcome, OrchestratorError> {
        let message = self.apply_setvar(message);

        self.ctx.apply_trigger(Trigger::PerTurn);
        self.ctx.set_content(message);

        self.orchestrator
            .run_phase(Phase::OnInput, &mut self.ctx)
            .await?;

        self.ctx.apply_trigger(Trigger::PostInput);
        content::apply_rules(&self.rules, ContentCategory::Input, &mut self.ctx);
        let message = self.ctx.content().to_string();

        // Post rules build a system message from scratch; the rewritten
        // message above is already final.
        self.ctx.set_content("");
        content::apply_rules(&self.rules, ContentCategory::PostInput, &mut self.ctx);

        Ok(self.outcome(message))
    }

    /// Process a model response: pre-response triggers, the response task
    /// set, post-response triggers, then response content rules.
    pub async fn process_response(
        &mut self,
        message: &str,
    ) -> Result<TurnOutcome, OrchestratorError> {
        self.ctx.apply_trigger(Trigger::PreResponse);
        self.ctx.set_content(message.to_string());

        self.orchestrator
            .run_phase(Phase::OnResponse, &mut self.ctx)
            .await?;

        self.ctx.apply_trigger(Trigger::PostResponse);
        content::apply_rules(&self.rules, ContentCategory::Response, &mut self.ctx);
        let message = self.ctx.content().to_string();

        self.ctx.set_content("");
        content::apply_rules(&self.rules, ContentCategory::PostResponse, &mut self.ctx);

        Ok(self.outcome(message))
    }

    pub fn saved_state(&self) -> Map<String, Json> {
        self.ctx.variables.write_saved()
    }

    #[cfg(test)]
    pub(crate) fn context(&self) -> &TurnContext {
        &self.ctx
    }

    fn outcome(&self, modified_message: String) -> TurnOutcome {
        let system = self.ctx.content();
        TurnOutcome {
            modified_message,
            system_message: (!system.is_empty()).then(|| system.to_string()),
            stage_directions: content::stage_directions(&self.rules, &self.ctx),
            state: self.saved_state(),
        }
    }

    /// Apply every `/setvar name=value` command line in the input, in
    /// order, and strip them all from the message. Each value is evaluated
    /// as an expression; input that does not parse is assigned as a
    /// literal string.
    fn apply_setvar(&mut self, message: &str) -> String {
        static SETVAR: OnceLock<Regex> = OnceLock::new();
        let re = SETVAR.get_or_init(|| {
            Regex::new(r"(?im)^[ \t]*/setvar\s+([A-Za-z_][A-Za-z0-9_]*)\s*=\s*([^\n\r]*)")
                .unwrap_or_else(|e| panic!("setvar pattern: {e}"))
        });

        if !re.is_match(message) {
            return message.to_string();
        }

        for captures in re.captures_iter(message) {
            let name = captures[1].to_string();
            let raw = captures[2].trim().to_string();

            let value = match self.ctx.eval(&raw) {
                Ok(value) => value,
                Err(_) => raw.clone().into(),
            };
            if self.ctx.variables.is_defined(&name) {
                debug!(variable = %name, "applying /setvar command");
                self.ctx.variables.set(&name, value);
            } else {
                warn!(variable = %name, "/setvar names an undeclared variable; ignored");
            }
        }

        re.replace_all(message, "").trim().to_string()
    }
}
