//! Lexical scope graph
//!
//! Scopes live in an arena owned by the graph and are addressed by
//! [`ScopeId`]. Ids are allocated by the arena itself, so two graphs never
//! share a counter. Scopes are never destroyed; only their bindings change.
//!
//! The graph always starts with two scopes:
//! - `builtin()`: host functions registered by the embedder
//! - `global()`: child of builtin, where top-level `var`s land

use crate::value::{RuntimeError, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Index of a scope in its graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScopeId(pub u32);

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeKind {
    Builtin,
    Global,
    /// Root scope of a spawned fiber
    Process,
    Local,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub name: Option<Arc<str>>,
    pub parent: Option<ScopeId>,
    bindings: HashMap<String, Value>,
}

impl Scope {
    pub fn bindings(&self) -> &HashMap<String, Value> {
        &self.bindings
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }
}

/// Arena of scopes with parent links
#[derive(Debug, Clone)]
pub struct ScopeGraph {
    scopes: Vec<Scope>,
}

const BUILTIN: ScopeId = ScopeId(0);
const GLOBAL: ScopeId = ScopeId(1);

impl ScopeGraph {
    pub fn new() -> Self {
        let mut graph = Self { scopes: Vec::new() };
        graph.push_scope(ScopeKind::Builtin, None, Some("builtin".into()));
        graph.push_scope(ScopeKind::Global, Some(BUILTIN), Some("global".into()));
        graph
    }

    pub fn builtin(&self) -> ScopeId {
        BUILTIN
    }

    pub fn global(&self) -> ScopeId {
        GLOBAL
    }

    /// Allocate a new scope under `parent`
    pub fn create_child(
        &mut self,
        kind: ScopeKind,
        parent: Option<ScopeId>,
        name: Option<Arc<str>>,
    ) -> ScopeId {
        self.push_scope(kind, parent, name)
    }

    pub fn get(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(id.0 as usize)
    }

    pub fn bindings(&self, id: ScopeId) -> Option<&HashMap<String, Value>> {
        self.get(id).map(Scope::bindings)
    }

    /// Number of scopes ever allocated
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Walk from `from` to the root and return the first scope declaring
    /// `name`
    pub fn find_declare_scope(&self, from: ScopeId, name: &str) -> Option<ScopeId> {
        let mut current = Some(from);
        while let Some(id) = current {
            let scope = self.get(id)?;
            if scope.bindings.contains_key(name) {
                return Some(id);
            }
            current = scope.parent;
        }
        None
    }

    /// Like [`find_declare_scope`](Self::find_declare_scope), but falls back
    /// to `from` when no scope declares `name`
    pub fn lookup_declare_scope(&self, from: ScopeId, name: &str) -> ScopeId {
        self.find_declare_scope(from, name).unwrap_or(from)
    }

    pub fn lookup(&self, from: ScopeId, name: &str) -> Result<&Value, RuntimeError> {
        self.find_declare_scope(from, name)
            .and_then(|id| self.get(id))
            .and_then(|scope| scope.bindings.get(name))
            .ok_or_else(|| RuntimeError::VariableNotFound {
                name: name.to_string(),
            })
    }

    /// Insert or overwrite `name` in exactly `scope`
    pub fn define(&mut self, scope: ScopeId, name: &str, value: Value) {
        if let Some(scope) = self.scopes.get_mut(scope.0 as usize) {
            scope.bindings.insert(name.to_string(), value);
        }
    }

    /// Overwrite `name` in the scope that declares it
    pub fn assign(&mut self, from: ScopeId, name: &str, value: Value) -> Result<(), RuntimeError> {
        let id = self
            .find_declare_scope(from, name)
            .ok_or_else(|| RuntimeError::VariableNotFound {
                name: name.to_string(),
            })?;
        self.define(id, name, value);
        Ok(())
    }

    /// Iterate `from` and its ancestors, nearest first
    pub fn ancestors(&self, from: ScopeId) -> impl Iterator<Item = &Scope> + '_ {
        std::iter::successors(self.get(from), move |scope| {
            scope.parent.and_then(|parent| self.get(parent))
        })
    }

    fn push_scope(
        &mut self,
        kind: ScopeKind,
        parent: Option<ScopeId>,
        name: Option<Arc<str>>,
    ) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            id,
            kind,
            name,
            parent,
            bindings: HashMap::new(),
        });
        id
    }
}

impl Default for ScopeGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_graph_has_builtin_and_global() {
        let graph = ScopeGraph::new();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.get(graph.global()).unwrap().parent, Some(graph.builtin()));
        assert_eq!(graph.get(graph.builtin()).unwrap().kind, ScopeKind::Builtin);
    }

    #[test]
    fn test_ids_are_per_graph() {
        let mut a = ScopeGraph::new();
        let mut b = ScopeGraph::new();
        let ga = a.global();
        let gb = b.global();
        assert_eq!(a.create_child(ScopeKind::Local, Some(ga), None), ScopeId(2));
        assert_eq!(b.create_child(ScopeKind::Local, Some(gb), None), ScopeId(2));
    }

    #[test]
    fn test_lookup_declare_scope_falls_back_to_start() {
        let mut graph = ScopeGraph::new();
        let global = graph.global();
        let child = graph.create_child(ScopeKind::Local, Some(global), None);
        graph.define(global, "x", Value::Int(1));

        assert_eq!(graph.lookup_declare_scope(child, "x"), global);
        assert_eq!(graph.lookup_declare_scope(child, "nope"), child);
        assert_eq!(graph.find_declare_scope(child, "nope"), None);
    }

    #[test]
    fn test_assign_requires_declaration() {
        let mut graph = ScopeGraph::new();
        let global = graph.global();
        let err = graph.assign(global, "x", Value::Null).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::VariableNotFound {
                name: "x".to_string()
            }
        );
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let mut graph = ScopeGraph::new();
        let global = graph.global();
        let child = graph.create_child(ScopeKind::Local, Some(global), Some("f".into()));
        let ids: Vec<ScopeId> = graph.ancestors(child).map(|s| s.id).collect();
        assert_eq!(ids, vec![child, global, graph.builtin()]);
    }
}
