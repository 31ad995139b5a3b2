//! Scope graph: lookup, shadowing and assignment

mod common;

use common::*;
use pretty_assertions::assert_eq;
use weft_runtime::build::*;
use weft_runtime::{RuntimeError, ScopeGraph, ScopeKind, Value};

#[test]
fn child_shadows_ancestor() {
    let mut scopes = ScopeGraph::new();
    let global = scopes.global();
    let child = scopes.create_child(ScopeKind::Local, Some(global), None);

    scopes.define(global, "x", Value::Int(1));
    scopes.define(global, "y", Value::Int(2));
    scopes.define(child, "x", Value::Int(10));

    assert_eq!(scopes.lookup(child, "x"), Ok(&Value::Int(10)));
    assert_eq!(scopes.lookup(child, "y"), Ok(&Value::Int(2)));
    assert_eq!(scopes.lookup(global, "x"), Ok(&Value::Int(1)));
}

#[test]
fn assign_updates_the_declaring_scope() {
    let mut scopes = ScopeGraph::new();
    let global = scopes.global();
    let child = scopes.create_child(ScopeKind::Local, Some(global), Some("call".into()));
    scopes.define(global, "counter", Value::Int(0));

    scopes.assign(child, "counter", Value::Int(5)).unwrap();

    assert_eq!(scopes.find_declare_scope(child, "counter"), Some(global));
    assert_eq!(scopes.lookup(global, "counter"), Ok(&Value::Int(5)));
    assert!(!scopes.bindings(child).unwrap().contains_key("counter"));
}

#[test]
fn assign_to_undeclared_name_fails() {
    let mut scopes = ScopeGraph::new();
    let global = scopes.global();
    assert_eq!(
        scopes.assign(global, "ghost", Value::Null),
        Err(RuntimeError::VariableNotFound {
            name: "ghost".to_string()
        })
    );
}

#[test]
fn builtin_is_the_root_of_every_chain() {
    let mut scopes = ScopeGraph::new();
    let global = scopes.global();
    let a = scopes.create_child(ScopeKind::Process, Some(global), None);
    let b = scopes.create_child(ScopeKind::Local, Some(a), None);

    let chain: Vec<_> = scopes.ancestors(b).map(|s| s.id).collect();
    assert_eq!(chain, vec![b, a, global, scopes.builtin()]);
}

#[test]
fn closures_see_later_assignments() {
    // Closures capture the scope, not a copy of its values
    let result = eval_all(vec![
        call("var", vec![ident("n"), int(1)]),
        call("var", vec![ident("get"), lambda(&[], vec![ident("n")])]),
        call("set", vec![ident("n"), int(2)]),
        call("get", vec![]),
    ]);
    assert_eq!(result, Ok(Value::Int(2)));
}

#[test]
fn parameters_shadow_globals() {
    let result = eval_all(vec![
        call("var", vec![ident("x"), string("global")]),
        call("var", vec![ident("show"), lambda(&["x"], vec![ident("x")])]),
        call("list", vec![call("show", vec![string("param")]), ident("x")]),
    ]);
    assert_eq!(
        result,
        Ok(Value::list(vec![
            Value::string("param"),
            Value::string("global")
        ]))
    );
}

#[test]
fn counter_closure_keeps_private_state() {
    let make_counter = lambda(
        &[],
        vec![
            call("var", vec![ident("count"), int(0)]),
            lambda(
                &[],
                vec![call(
                    "set",
                    vec![ident("count"), call("+", vec![ident("count"), int(1)])],
                )],
            ),
        ],
    );
    let result = eval_all(vec![
        call("var", vec![ident("make"), make_counter]),
        call("var", vec![ident("c"), call("make", vec![])]),
        call("c", vec![]),
        call("c", vec![]),
        call("c", vec![]),
    ]);
    assert_eq!(result, Ok(Value::Int(3)));
}
