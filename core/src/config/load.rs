use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use serde_json::Value as Json;
use tracing::warn;

use crate::config::types::{
    ClassifierDef, ContentRuleDef, Document, FunctionDef, GeneratorDef, VariableDef,
};
use crate::error::ConfigError;

/// Raw document: entity arrays held as untyped JSON so one malformed
/// entry is dropped with a diagnostic instead of failing the whole load.
#[derive(Debug, Default, Deserialize)]
struct RawDocument {
    #[serde(default)]
    variables: Vec<Json>,
    #[serde(default)]
    functions: Vec<Json>,
    #[serde(default)]
    classifiers: Vec<Json>,
    #[serde(default)]
    generators: Vec<Json>,
    #[serde(default)]
    content: Vec<Json>,
}

/// Parse and validate a scenario document. Malformed entries, duplicate
/// names, and tasks caught in a dependency cycle are dropped with
/// diagnostics; only an unreadable document is an error.
pub fn load_document(json: &str) -> Result<Document, ConfigError> {
    let raw: RawDocument = serde_json::from_str(json)?;

    let mut doc = Document {
        variables: decode_entries(raw.variables, "variable"),
        functions: decode_entries(raw.functions, "function"),
        classifiers: decode_entries(raw.classifiers, "classifier"),
        generators: decode_entries(raw.generators, "generator"),
        content: decode_entries(raw.content, "content rule"),
    };

    dedupe_variables(&mut doc.variables);
    validate_tasks(&mut doc);
    reject_cycles(&mut doc);

    Ok(doc)
}

fn decode_entries<T: serde::de::DeserializeOwned>(entries: Vec<Json>, schema: &str) -> Vec<T> {
    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(schema, error = %e, "dropping malformed configuration entry");
                None
            }
        })
        .collect()
}

fn dedupe_variables(variables: &mut Vec<VariableDef>) {
    let mut seen = HashSet::new();
    variables.retain(|v| {
        if v.name.is_empty() {
            warn!("dropping variable with empty name");
            return false;
        }
        if !seen.insert(v.name.clone()) {
            warn!(name = %v.name, "dropping duplicate variable");
            return false;
        }
        true
    });
}

/// Task names must be unique across classifiers and generators: both
/// share one dependency namespace within a turn's task set.
fn validate_tasks(doc: &mut Document) {
    let mut seen = HashSet::new();

    doc.classifiers.retain(|c| {
        if c.name.is_empty() {
            warn!("dropping classifier with empty name");
            return false;
        }
        if !seen.insert(c.name.clone()) {
            warn!(name = %c.name, "dropping classifier with duplicate task name");
            return false;
        }
        if c.classifications.is_empty() {
            warn!(name = %c.name, "dropping classifier with no classifications");
            seen.remove(&c.name);
            return false;
        }
        true
    });

    doc.generators.retain(|g| {
        if g.name.is_empty() {
            warn!("dropping generator with empty name");
            return false;
        }
        if !seen.insert(g.name.clone()) {
            warn!(name = %g.name, "dropping generator with duplicate task name");
            return false;
        }
        true
    });

    // Dependencies on names that exist nowhere are treated as already
    // satisfied at run time; flag them here so authors notice.
    for (name, deps) in task_edges(doc) {
        for dep in deps {
            if !seen.contains(&dep) {
                warn!(task = %name, dependency = %dep, "dependency does not name a declared task; treated as satisfied");
            }
        }
    }
}

fn task_edges(doc: &Document) -> Vec<(String, Vec<String>)> {
    let mut edges = Vec::new();
    for c in &doc.classifiers {
        edges.push((c.name.clone(), c.dependencies.clone()));
    }
    for g in &doc.generators {
        edges.push((g.name.clone(), g.dependencies.clone()));
    }
    edges
}

/// A cyclic dependency graph would leave its tasks perpetually
/// not-started; reject the participants at load instead of hanging the
/// turn.
fn reject_cycles(doc: &mut Document) {
    let edges: HashMap<String, Vec<String>> = task_edges(doc).into_iter().collect();
    let mut cyclic: HashSet<String> = HashSet::new();

    for start in edges.keys() {
        if cyclic.contains(start) {
            continue;
        }
        let mut stack = Vec::new();
        if let Some(cycle) = dfs_cycle(start, &edges, &mut HashSet::new(), &mut stack) {
            warn!(cycle = %cycle.join(" -> "), "dropping tasks in dependency cycle");
            cyclic.extend(cycle);
        }
    }

    if !cyclic.is_empty() {
        doc.classifiers.retain(|c| !cyclic.contains(&c.name));
        doc.generators.retain(|g| !cyclic.contains(&g.name));
    }
}

fn dfs_cycle(
    node: &str,
    edges: &HashMap<String, Vec<String>>,
    visited: &mut HashSet<String>,
    stack: &mut Vec<String>,
) -> Option<Vec<String>> {
    visited.insert(node.to_string());
    stack.push(node.to_string());

    if let Some(deps) = edges.get(node) {
        for dep in deps {
            // Dependencies on undeclared names are satisfied trivially.
            if !edges.contains_key(dep) {
                continue;
            }
            if let Some(pos) = stack.iter().position(|x| x == dep) {
                return Some(stack[pos..].to_vec());
            }
            if !visited.contains(dep) {
                if let Some(cycle) = dfs_cycle(dep, edges, visited, stack) {
                    return Some(cycle);
                }
            }
        }
    }

    stack.pop();
    None
}

/// Names of variables assigned by any classification or generator
/// `updates` entry. Request-driven updates are invisible to the static
/// trigger analysis, so these variables must never be treated constant.
pub fn request_updated_variables(doc: &Document) -> HashSet<String> {
    let mut names = HashSet::new();
    for classifier in &doc.classifiers {
        for classification in &classifier.classifications {
            names.extend(classification.updates.iter().map(|(name, _)| name.clone()));
        }
    }
    for generator in &doc.generators {
        names.extend(generator.updates.iter().map(|(name, _)| name.clone()));
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_malformed_entry_keeps_rest() {
        let doc = load_document(
            r#"{
                "variables": [
                    {"name": "score", "init": "0"},
                    {"init": 42},
                    {"name": "mood"}
                ]
            }"#,
        )
        .unwrap();
        let names: Vec<_> = doc.variables.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["score", "mood"]);
    }

    #[test]
    fn drops_duplicate_task_names_across_kinds() {
        let doc = load_document(
            r#"{
                "classifiers": [
                    {"name": "a", "classifications": [{"label": "x"}]}
                ],
                "generators": [
                    {"name": "a", "prompt": "'p'"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(doc.classifiers.len(), 1);
        assert!(doc.generators.is_empty());
    }

    #[test]
    fn rejects_dependency_cycles_at_load() {
        let doc = load_document(
            r#"{
                "generators": [
                    {"name": "a", "prompt": "'p'", "dependencies": ["b"]},
                    {"name": "b", "prompt": "'p'", "dependencies": ["a"]},
                    {"name": "c", "prompt": "'p'"}
                ]
            }"#,
        )
        .unwrap();
        let names: Vec<_> = doc.generators.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["c"]);
    }

    #[test]
    fn undeclared_dependency_is_kept() {
        let doc = load_document(
            r#"{
                "generators": [
                    {"name": "a", "prompt": "'p'", "dependencies": ["ghost"]}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(doc.generators.len(), 1);
    }

    #[test]
    fn collects_request_updated_variables() {
        let doc = load_document(
            r#"{
                "classifiers": [{
                    "name": "mood",
                    "classifications": [
                        {"label": "happy", "updates": {"joy": "joy + 1"}}
                    ]
                }],
                "generators": [
                    {"name": "g", "prompt": "'p'", "updates": {"summary": "content"}}
                ]
            }"#,
        )
        .unwrap();
        let updated = request_updated_variables(&doc);
        assert!(updated.contains("joy"));
        assert!(updated.contains("summary"));
    }

    #[test]
    fn updates_preserve_declaration_order() {
        let doc = load_document(
            r#"{
                "generators": [{
                    "name": "g", "prompt": "'p'",
                    "updates": {"zeta": "'1'", "alpha": "'2'", "mid": "'3'"}
                }]
            }"#,
        )
        .unwrap();
        let names: Vec<_> = doc.generators[0]
            .updates
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn invalid_document_is_an_error() {
        assert!(load_document("not json").is_err());
    }
}
