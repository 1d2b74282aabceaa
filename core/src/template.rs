//! `{{tag}}` substitution. Purely textual: it runs before any expression
//! evaluation, so substituted values become part of the expression source.

use std::sync::OnceLock;

use regex::Regex;

use crate::expression::Value;

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([A-Za-z_][A-Za-z0-9_]*)\}\}").unwrap())
}

/// Replace every `{{identifier}}` with the value returned by `lookup`
/// (matched case-insensitively via lowercased keys). Unknown identifiers
/// are left verbatim, which makes substitution idempotent on text
/// containing no recognized placeholders.
pub fn substitute<F>(text: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    tag_regex()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = caps[1].to_lowercase();
            lookup(&name).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Escape a value for safe embedding inside expression string literals,
/// whichever quote style encloses it.
pub fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\'', "\\'")
}

/// String form of a variable value for substitution: lists and structured
/// values serialize to JSON, scalars render plainly.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::List(_) => serde_json::to_string(value).unwrap_or_default(),
        other => other.render(),
    }
}
