use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::warn;

use crate::config::types::FunctionDef;
use crate::expression::builtins;
use crate::expression::parser::{self, Expr};

/// A symbol a user function's body references but cannot resolve itself:
/// the underlying evaluator only sees a function's own parameters, so
/// sibling functions and turn variables must be supplied explicitly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Symbol {
    Function(String),
    Variable(String),
}

/// A user-declared function compiled once with its resolved closure.
///
/// `closure` is the transitive set of function/variable symbols the body
/// (or any function it calls) references; it acts as an implicit trailing
/// parameter list bound by the evaluator at every call site.
#[derive(Debug, Clone)]
pub struct UserFunction {
    pub name: String,
    pub params: Vec<String>,
    pub body: Expr,
    pub closure: Vec<Symbol>,
}

#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, UserFunction>,
}

impl FunctionRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&UserFunction> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Compile declared functions against the set of declared variable
    /// names. Functions whose bodies fail to parse are dropped with a
    /// diagnostic; the rest get their dependency closure resolved.
    pub fn compile(defs: &[FunctionDef], variable_names: &HashSet<String>) -> Self {
        let mut functions: HashMap<String, UserFunction> = HashMap::new();

        for def in defs {
            if def.name.is_empty() {
                warn!("dropping function with empty name");
                continue;
            }
            if builtins::is_builtin(&def.name) {
                warn!(name = %def.name, "dropping function shadowing a built-in");
                continue;
            }
            if functions.contains_key(&def.name) {
                warn!(name = %def.name, "dropping duplicate function");
                continue;
            }
            let body = match parser::parse(&def.body) {
                Ok(body) => body,
                Err(e) => {
                    warn!(name = %def.name, error = %e, "dropping function with unparseable body");
                    continue;
                }
            };
            let params: Vec<String> = def
                .parameters
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            functions.insert(
                def.name.clone(),
                UserFunction {
                    name: def.name.clone(),
                    params,
                    body,
                    closure: Vec::new(),
                },
            );
        }

        let direct = direct_dependencies(&functions, variable_names);
        let resolved = transitive_closure(&direct);

        for (name, closure) in resolved {
            if let Some(func) = functions.get_mut(&name) {
                func.closure = closure.into_iter().collect();
            }
        }

        Self { functions }
    }
}

/// Direct symbol references per function: called sibling functions, plus
/// free identifiers naming declared variables (a function's own
/// parameters shadow variables of the same name).
fn direct_dependencies(
    functions: &HashMap<String, UserFunction>,
    variable_names: &HashSet<String>,
) -> HashMap<String, BTreeSet<Symbol>> {
    let mut direct = HashMap::new();

    for (name, func) in functions {
        let mut idents = Vec::new();
        let mut calls = Vec::new();
        parser::collect_references(&func.body, &mut idents, &mut calls);

        let mut deps = BTreeSet::new();
        for ident in idents {
            if !func.params.contains(&ident) && variable_names.contains(&ident) {
                deps.insert(Symbol::Variable(ident));
            }
        }
        for call in calls {
            if call != *name && functions.contains_key(&call) {
                deps.insert(Symbol::Function(call));
            }
        }
        direct.insert(name.clone(), deps);
    }

    direct
}

/// Fixpoint over the symbol graph: each function's closure absorbs the
/// direct dependencies of every function already in its closure.
/// Accumulation into a set makes mutually referential functions a no-op
/// after the first pass, so the fixpoint always terminates.
fn transitive_closure(
    direct: &HashMap<String, BTreeSet<Symbol>>,
) -> HashMap<String, BTreeSet<Symbol>> {
    let mut resolved: HashMap<String, BTreeSet<Symbol>> = direct.clone();

    let mut changed = true;
    while changed {
        changed = false;
        for name in direct.keys() {
            let current = resolved[name].clone();
            let mut expanded = current.clone();
            for sym in &current {
                if let Symbol::Function(other) = sym {
                    if let Some(other_deps) = direct.get(other) {
                        expanded.extend(other_deps.iter().cloned());
                    }
                }
            }
            if expanded.len() != current.len() {
                resolved.insert(name.clone(), expanded);
                changed = true;
            }
        }
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str, parameters: &str, body: &str) -> FunctionDef {
        FunctionDef {
            name: name.to_string(),
            parameters: parameters.to_string(),
            body: body.to_string(),
        }
    }

    fn vars(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn resolves_variable_dependency() {
        let registry = FunctionRegistry::compile(
            &[def("bump", "amount", "score + amount")],
            &vars(&["score"]),
        );
        let func = registry.get("bump").unwrap();
        assert_eq!(func.closure, vec![Symbol::Variable("score".into())]);
    }

    #[test]
    fn parameters_shadow_variables() {
        let registry =
            FunctionRegistry::compile(&[def("f", "score", "score + 1")], &vars(&["score"]));
        assert!(registry.get("f").unwrap().closure.is_empty());
    }

    #[test]
    fn transitive_closure_reaches_nested_variables() {
        let registry = FunctionRegistry::compile(
            &[
                def("inner", "x", "x + base"),
                def("outer", "y", "inner(y) * 2"),
            ],
            &vars(&["base"]),
        );
        let outer = registry.get("outer").unwrap();
        assert!(outer.closure.contains(&Symbol::Function("inner".into())));
        assert!(outer.closure.contains(&Symbol::Variable("base".into())));
    }

    #[test]
    fn mutual_reference_terminates() {
        let registry = FunctionRegistry::compile(
            &[
                def("ping", "n", "pong(n) + a"),
                def("pong", "n", "ping(n) + b"),
            ],
            &vars(&["a", "b"]),
        );
        let ping = registry.get("ping").unwrap();
        assert!(ping.closure.contains(&Symbol::Function("pong".into())));
        assert!(ping.closure.contains(&Symbol::Variable("a".into())));
        assert!(ping.closure.contains(&Symbol::Variable("b".into())));
    }

    #[test]
    fn drops_unparseable_and_shadowing_functions() {
        let registry = FunctionRegistry::compile(
            &[def("bad", "", "1 +"), def("split", "a", "a")],
            &HashSet::new(),
        );
        assert!(registry.is_empty());
    }
}
