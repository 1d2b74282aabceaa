//! Declarative content rewriting. Rules run after a phase's tasks settle,
//! in declaration order within their category, each seeing the previous
//! rule's output as the active content.

use tracing::warn;

use crate::config::types::{ContentCategory, ContentRuleDef};
use crate::context::TurnContext;

/// Apply every rule of `category`. Evaluation errors leave the content
/// untouched and the turn continues.
pub fn apply_rules(rules: &[ContentRuleDef], category: ContentCategory, ctx: &mut TurnContext) {
    for rule in rules.iter().filter(|r| r.category == category) {
        match ctx.eval_condition(rule.condition.as_deref(), true) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                warn!(?category, error = %e, "content rule condition failed; rule not applied");
                continue;
            }
        }

        let modification = rule.modification.as_deref().unwrap_or("'{{content}}'");
        match ctx.eval(modification) {
            Ok(value) => {
                let rendered = value.render();
                ctx.set_content(rendered);
            }
            Err(e) => {
                warn!(?category, error = %e, "content rule modification failed; content unchanged");
            }
        }
    }
}

/// Collect the outputs of every stage-direction rule whose condition
/// holds. These never rewrite the active content.
pub fn stage_directions(rules: &[ContentRuleDef], ctx: &TurnContext) -> Vec<String> {
    let mut out = Vec::new();
    for rule in rules
        .iter()
        .filter(|r| r.category == ContentCategory::StageDirection)
    {
        match ctx.eval_condition(rule.condition.as_deref(), true) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                warn!(error = %e, "stage direction condition failed; skipped");
                continue;
            }
        }
        let Some(modification) = rule.modification.as_deref() else {
            continue;
        };
        match ctx.eval(modification) {
            Ok(value) => {
                let rendered = value.render();
                if !rendered.is_empty() {
                    out.push(rendered);
                }
            }
            Err(e) => {
                warn!(error = %e, "stage direction failed to evaluate; skipped");
            }
        }
    }
    out
}
