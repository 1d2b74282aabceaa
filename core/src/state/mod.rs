//! Turn-persistent variable state: definitions with recompute triggers,
//! the value store, and the persisted-state round trip.

use std::collections::HashMap;

use serde_json::{Map, Value as Json};
use tracing::warn;

use crate::config::types::VariableDef;
use crate::expression::Value;

/// When a variable's recompute expression runs within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    PerTurn,
    PostInput,
    PreResponse,
    PostResponse,
}

#[derive(Debug, Clone)]
pub struct VariableDefinition {
    pub name: String,
    pub init: String,
    pub per_turn: Option<String>,
    pub post_input: Option<String>,
    pub pre_response: Option<String>,
    pub post_response: Option<String>,

    /// No recompute trigger and no request-driven update: the value is
    /// fully determined by the initializer and is not persisted.
    pub constant: bool,
}

impl VariableDefinition {
    pub fn from_def(def: VariableDef) -> Self {
        let constant = def.per_turn.is_none()
            && def.post_input.is_none()
            && def.pre_response.is_none()
            && def.post_response.is_none();
        Self {
            name: def.name,
            init: def.init,
            per_turn: def.per_turn,
            post_input: def.post_input,
            pre_response: def.pre_response,
            post_response: def.post_response,
            constant,
        }
    }

    pub fn update_for(&self, trigger: Trigger) -> Option<&str> {
        match trigger {
            Trigger::PerTurn => self.per_turn.as_deref(),
            Trigger::PostInput => self.post_input.as_deref(),
            Trigger::PreResponse => self.pre_response.as_deref(),
            Trigger::PostResponse => self.post_response.as_deref(),
        }
    }
}

/// Current values for every declared variable.
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    definitions: Vec<VariableDefinition>,
    values: HashMap<String, Value>,
}

impl VariableStore {
    pub fn new(defs: Vec<VariableDef>) -> Self {
        Self {
            definitions: defs.into_iter().map(VariableDefinition::from_def).collect(),
            values: HashMap::new(),
        }
    }

    pub fn definitions(&self) -> &[VariableDefinition] {
        &self.definitions
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.definitions.iter().any(|d| d.name == name)
    }

    pub fn definition(&self, name: &str) -> Option<&VariableDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    /// Force a variable non-constant. Applied at load to every variable a
    /// Classification's or Generator's `updates` assigns, since
    /// request-driven updates are invisible to the trigger analysis.
    pub fn mark_mutable(&mut self, name: &str) {
        if let Some(def) = self.definitions.iter_mut().find(|d| d.name == name) {
            def.constant = false;
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn has_value(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Assignment is ignored for undeclared names.
    pub fn set(&mut self, name: &str, value: Value) {
        if self.is_defined(name) {
            self.values.insert(name.to_string(), value);
        } else {
            warn!(name, "ignoring assignment to undeclared variable");
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Restore values from incoming saved state. Names that are not
    /// declared are ignored; declared names missing from the state remain
    /// unset and are re-initialized by the caller.
    pub fn read_saved(&mut self, saved: &Map<String, Json>) {
        for (name, json) in saved {
            if self.is_defined(name) {
                self.values.insert(name.clone(), Value::from_json(json));
            }
        }
    }

    /// Persisted form: only non-constant variables.
    pub fn write_saved(&self) -> Map<String, Json> {
        let mut out = Map::new();
        for def in &self.definitions {
            if def.constant {
                continue;
            }
            if let Some(value) = self.values.get(&def.name) {
                out.insert(def.name.clone(), value.to_json());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, per_turn: Option<&str>) -> VariableDef {
        VariableDef {
            name: name.to_string(),
            init: "0".to_string(),
            per_turn: per_turn.map(str::to_string),
            post_input: None,
            pre_response: None,
            post_response: None,
        }
    }

    #[test]
    fn constant_iff_no_trigger() {
        let store = VariableStore::new(vec![var("a", None), var("b", Some("b + 1"))]);
        assert!(store.definition("a").unwrap().constant);
        assert!(!store.definition("b").unwrap().constant);
    }

    #[test]
    fn mark_mutable_overrides_constant() {
        let mut store = VariableStore::new(vec![var("a", None)]);
        store.mark_mutable("a");
        assert!(!store.definition("a").unwrap().constant);
    }

    #[test]
    fn saved_state_excludes_constants() {
        let mut store = VariableStore::new(vec![var("keep", Some("1")), var("drop", None)]);
        store.set("keep", Value::Number(5.0));
        store.set("drop", Value::Number(9.0));
        let saved = store.write_saved();
        assert!(saved.contains_key("keep"));
        assert!(!saved.contains_key("drop"));
    }

    #[test]
    fn read_saved_ignores_undeclared_names() {
        let mut store = VariableStore::new(vec![var("a", Some("1"))]);
        let mut saved = Map::new();
        saved.insert("a".to_string(), Json::from(3));
        saved.insert("ghost".to_string(), Json::from(4));
        store.read_saved(&saved);
        assert_eq!(store.get("a"), Some(&Value::Number(3.0)));
        assert!(store.get("ghost").is_none());
    }

    #[test]
    fn undeclared_assignment_is_ignored() {
        let mut store = VariableStore::new(vec![]);
        store.set("nope", Value::Number(1.0));
        assert!(store.get("nope").is_none());
    }
}
