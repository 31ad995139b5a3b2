//! Effects: try, perform, handle and runtime errors as effects

mod common;

use common::*;
use pretty_assertions::assert_eq;
use weft_runtime::build::*;
use weft_runtime::{NodeRef, RuntimeError, Value};

fn handle(name: &str, handler: NodeRef) -> NodeRef {
    call("handle", vec![ident(name), handler])
}

#[test]
fn unhandled_perform_is_an_error() {
    let result = eval(call("perform", vec![ident("boom"), int(1)]));
    assert_eq!(
        result,
        Err(RuntimeError::EffectNotHandled {
            effect: "boom".to_string()
        })
    );
}

#[test]
fn resume_supplies_the_value_of_perform() {
    // (try (+ 1 (perform ask)) (handle ask (fn [k] (k 41))))
    assert_eval(
        call(
            "try",
            vec![
                call("+", vec![int(1), call("perform", vec![ident("ask")])]),
                handle(
                    "ask",
                    lambda(&["k"], vec![call("k", vec![int(41)])]),
                ),
            ],
        ),
        Value::Int(42),
    );
}

#[test]
fn each_perform_gets_its_own_resume() {
    let tree = call(
        "try",
        vec![
            call(
                "+",
                vec![
                    call("perform", vec![ident("ask"), int(1)]),
                    call("perform", vec![ident("ask"), int(2)]),
                ],
            ),
            handle(
                "ask",
                lambda(
                    &["k", "n"],
                    vec![call("k", vec![call("*", vec![ident("n"), int(10)])])],
                ),
            ),
        ],
    );
    assert_eval(tree, Value::Int(30));
}

#[test]
fn two_performs_reach_two_different_handlers() {
    let tree = call(
        "try",
        vec![
            call(
                "+",
                vec![
                    call("perform", vec![ident("add"), int(1), int(2)]),
                    call("perform", vec![ident("mul"), int(3), int(4)]),
                ],
            ),
            handle(
                "add",
                lambda(
                    &["k", "a", "b"],
                    vec![call("k", vec![call("+", vec![ident("a"), ident("b")])])],
                ),
            ),
            handle(
                "mul",
                lambda(
                    &["k", "a", "b"],
                    vec![call("k", vec![call("*", vec![ident("a"), ident("b")])])],
                ),
            ),
        ],
    );
    assert_eval(tree, Value::Int(15));
}

#[test]
fn handler_without_resume_gives_the_value_of_try() {
    let tree = block(vec![
        call(
            "var",
            vec![
                ident("r"),
                call(
                    "try",
                    vec![
                        call("+", vec![int(1), call("perform", vec![ident("oops")])]),
                        string("unreachable"),
                        handle("oops", lambda(&["k"], vec![string("handled")])),
                    ],
                ),
            ],
        ),
        call("str", vec![ident("r"), string("!")]),
    ]);
    assert_eval(tree, Value::string("handled!"));
}

#[test]
fn try_without_perform_is_its_body() {
    let tree = call(
        "try",
        vec![
            int(1),
            int(2),
            handle("never", lambda(&["k"], vec![int(0)])),
        ],
    );
    assert_eval(tree, Value::Int(2));
}

#[test]
fn perform_inside_a_handler_reaches_the_outer_try() {
    let inner = call(
        "try",
        vec![
            call("perform", vec![ident("e"), int(1)]),
            handle(
                "e",
                lambda(
                    &["k", "x"],
                    vec![call(
                        "perform",
                        vec![ident("e"), call("+", vec![ident("x"), int(1)])],
                    )],
                ),
            ),
        ],
    );
    let outer = call(
        "try",
        vec![
            inner,
            handle(
                "e",
                lambda(&["k", "x"], vec![call("*", vec![ident("x"), int(100)])]),
            ),
        ],
    );
    assert_eval(outer, Value::Int(200));
}

#[test]
fn effects_are_found_lexically_from_the_perform() {
    // A function defined outside the try does not see its handlers
    let result = eval_all(vec![
        call(
            "var",
            vec![
                ident("ask"),
                lambda(&[], vec![call("perform", vec![ident("ask")])]),
            ],
        ),
        call(
            "try",
            vec![
                call("ask", vec![]),
                handle("ask", lambda(&["k"], vec![call("k", vec![int(1)])])),
            ],
        ),
    ]);
    assert_eq!(
        result,
        Err(RuntimeError::EffectNotHandled {
            effect: "ask".to_string()
        })
    );
}

#[test]
fn runtime_errors_are_performed_as_effects() {
    // (try (index (list 1) 5) (handle runtime-error (fn [k e] (index e "kind"))))
    let tree = call(
        "try",
        vec![
            index(list(vec![int(1)]), int(5)),
            handle(
                "runtime-error",
                lambda(&["k", "e"], vec![index(ident("e"), string("kind"))]),
            ),
        ],
    );
    assert_eval(tree, Value::string("invalid-operand"));
}

#[test]
fn runtime_error_handler_can_resume_with_a_replacement() {
    let tree = call(
        "try",
        vec![
            call("+", vec![int(1), ident("missing")]),
            handle(
                "runtime-error",
                lambda(&["k", "e"], vec![call("k", vec![int(41)])]),
            ),
        ],
    );
    assert_eval(tree, Value::Int(42));
}

#[test]
fn runtime_error_without_handler_propagates() {
    let result = eval(call("+", vec![int(1), ident("missing")]));
    assert_eq!(
        result,
        Err(RuntimeError::VariableNotFound {
            name: "missing".to_string()
        })
    );
}

#[test]
fn error_inside_the_handler_itself_is_not_recaught() {
    let tree = call(
        "try",
        vec![
            ident("missing"),
            handle(
                "runtime-error",
                lambda(&["k", "e"], vec![ident("also-missing")]),
            ),
        ],
    );
    assert_eq!(
        eval(tree),
        Err(RuntimeError::VariableNotFound {
            name: "also-missing".to_string()
        })
    );
}

#[test]
fn spawned_fiber_cannot_unwind_a_try_on_another_fiber() {
    let mut runtime = runtime();
    runtime
        .evaluate(&call("var", vec![ident("log"), int(0)]))
        .unwrap();

    let tree = block(vec![
        call(
            "try",
            vec![
                call("spawn", vec![lambda(&[], vec![call("perform", vec![ident("stop")])])]),
                handle("stop", lambda(&["k"], vec![string("stopped")])),
            ],
        ),
        call("set", vec![ident("log"), call("+", vec![ident("log"), int(1)])]),
    ]);
    assert_eq!(
        runtime.evaluate(&tree),
        Err(RuntimeError::EffectNotHandled {
            effect: "stop".to_string()
        })
    );
    assert_eq!(runtime.global("log"), Some(Value::Int(1)));
}

#[test]
fn try_inside_a_spawned_fiber_handles_its_performs() {
    let body = call(
        "try",
        vec![
            call("perform", vec![ident("stop")]),
            handle("stop", lambda(&["k"], vec![string("inner")])),
        ],
    );
    let tree = call("await", vec![call("spawn", vec![lambda(&[], vec![body])])]);
    assert_eval(tree, Value::string("inner"));
}
