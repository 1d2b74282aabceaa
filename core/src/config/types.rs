use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Deserializer, Serialize};

/// A scenario document: arrays of declared entities, each validated
/// per-entry at load so a malformed entry never takes down the turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub variables: Vec<VariableDef>,
    #[serde(default)]
    pub functions: Vec<FunctionDef>,
    #[serde(default)]
    pub classifiers: Vec<ClassifierDef>,
    #[serde(default)]
    pub generators: Vec<GeneratorDef>,
    #[serde(default)]
    pub content: Vec<ContentRuleDef>,
}

/// Turn-persistent named state. A definition with no recompute trigger is
/// constant: fully determined by its initializer, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDef {
    pub name: String,

    /// Initializer expression, evaluated when the name is missing from
    /// incoming saved state.
    #[serde(default = "default_init")]
    pub init: String,

    #[serde(default)]
    pub per_turn: Option<String>,
    #[serde(default)]
    pub post_input: Option<String>,
    #[serde(default)]
    pub pre_response: Option<String>,
    #[serde(default)]
    pub post_response: Option<String>,
}

fn default_init() -> String {
    "null".to_string()
}

/// User-declared expression function. `parameters` is a comma-separated
/// name list; the body may reference sibling functions and declared
/// variables, resolved by the dependency closure at load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    #[serde(default)]
    pub parameters: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierDef {
    pub name: String,

    /// Gating expression; the task is skipped when falsy. Defaults true.
    #[serde(default)]
    pub condition: Option<String>,

    /// Names of tasks that must reach a terminal state first.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Sequence template for the input phase; `{}` marks the content
    /// slot, blank falls back to raw content.
    #[serde(default)]
    pub input_template: Option<String>,
    #[serde(default)]
    pub response_template: Option<String>,

    /// Hypothesis templates per phase; a blank hypothesis after
    /// substitution skips the classifier for that phase.
    #[serde(default)]
    pub input_hypothesis: Option<String>,
    #[serde(default)]
    pub response_hypothesis: Option<String>,

    #[serde(default)]
    pub classifications: Vec<ClassificationDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationDef {
    /// Literal label, or an expression producing a string or list of
    /// strings when `dynamic` is set.
    pub label: String,

    #[serde(default)]
    pub dynamic: bool,

    #[serde(default)]
    pub condition: Option<String>,

    /// Classifications sharing a category compete; only the highest
    /// scoring winner per category applies. Defaults to the label.
    #[serde(default)]
    pub category: Option<String>,

    /// Minimum acceptance score; the system default applies when unset.
    #[serde(default)]
    pub threshold: Option<f64>,

    /// Variable name -> expression, evaluated and assigned on selection
    /// in declaration order.
    #[serde(
        default,
        deserialize_with = "updates_in_order",
        serialize_with = "updates_as_map"
    )]
    pub updates: Vec<(String, String)>,
}

impl ClassificationDef {
    /// Category key this classification competes under.
    pub fn category_key(&self) -> &str {
        self.category.as_deref().unwrap_or(&self.label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorKind {
    #[default]
    Text,
    Image,
}

/// Orchestration phase gating which generators are eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Initialization,
    #[default]
    OnInput,
    OnResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorDef {
    pub name: String,

    #[serde(rename = "type", default)]
    pub kind: GeneratorKind,

    #[serde(default)]
    pub phase: Phase,

    /// Lazy generators start only when another task depends on them.
    #[serde(default)]
    pub lazy: bool,

    #[serde(default)]
    pub condition: Option<String>,

    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Prompt source: tag-substituted, then evaluated as an expression.
    pub prompt: String,

    #[serde(default)]
    pub negative_prompt: Option<String>,

    #[serde(default)]
    pub min_tokens: Option<u32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Comma-separated stop strings for text generation.
    #[serde(default)]
    pub stopping_strings: Option<String>,

    #[serde(default)]
    pub include_history: bool,

    #[serde(default)]
    pub aspect_ratio: Option<String>,

    #[serde(default)]
    pub remove_background: bool,

    /// Truthy result (evaluated with the generator's output as `content`)
    /// requests a retry. Defaults false.
    #[serde(default)]
    pub retry_condition: Option<String>,

    #[serde(
        default,
        deserialize_with = "updates_in_order",
        serialize_with = "updates_as_map"
    )]
    pub updates: Vec<(String, String)>,
}

/// `updates` is written as a JSON object but applied in declaration
/// order, so it decodes into a pair list instead of a map.
fn updates_in_order<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct UpdatesVisitor;

    impl<'de> Visitor<'de> for UpdatesVisitor {
        type Value = Vec<(String, String)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of variable names to expressions")
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some(entry) = access.next_entry()? {
                entries.push(entry);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(UpdatesVisitor)
}

fn updates_as_map<S>(entries: &[(String, String)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_map(entries.iter().map(|(name, formula)| (name, formula)))
}

/// Where a content rule applies within turn processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentCategory {
    Input,
    PostInput,
    Response,
    PostResponse,
    StageDirection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRuleDef {
    pub category: ContentCategory,

    #[serde(default)]
    pub condition: Option<String>,

    /// Expression producing the replacement content. Defaults to
    /// `{{content}}` (identity).
    #[serde(default)]
    pub modification: Option<String>,
}
