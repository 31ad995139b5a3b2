//! Embedding API: host functions, methods, conversions and configuration

mod common;

use common::*;
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;
use weft_runtime::api::{BuildError, ConversionError};
use weft_runtime::build::*;
use weft_runtime::{
    ArityPolicy, FromValue, HostFunctionBuilder, Instruction, Machine, NodeRef, Opcode, Runtime,
    RuntimeError, ScopeId, ToValue, TypeTag, Value,
};

/// `(unless c body...)` as `(if c null {body...})`
fn expand_unless(m: &mut Machine, scope: ScopeId, args: &[NodeRef]) -> Result<(), RuntimeError> {
    let Some((cond, body)) = args.split_first() else {
        return Err(RuntimeError::invalid_operand("unless expects a condition"));
    };
    let lowered = call("if", vec![cond.clone(), null(), block(body.to_vec())]);
    m.emit(Instruction::eval(scope, lowered))
}

/// `(twice expr)` evaluates `expr` two times and keeps the second value
fn expand_twice(m: &mut Machine, scope: ScopeId, args: &[NodeRef]) -> Result<(), RuntimeError> {
    let [expr] = args else {
        return Err(RuntimeError::invalid_operand("twice expects one expression"));
    };
    m.batch(|m| {
        m.emit(Instruction::eval(scope, expr.clone()))?;
        m.emit(Instruction::bare(Opcode::Pop, scope))?;
        m.emit(Instruction::eval(scope, expr.clone()))
    })
}

#[test]
fn builder_functions_are_callable_from_trees() {
    let clamp = HostFunctionBuilder::new("clamp")
        .with_arity(3)
        .with_implementation(|args| {
            let x = i64::from_value(&args[0]).map_err(|e| RuntimeError::host("clamp", e.to_string()))?;
            let lo = i64::from_value(&args[1]).map_err(|e| RuntimeError::host("clamp", e.to_string()))?;
            let hi = i64::from_value(&args[2]).map_err(|e| RuntimeError::host("clamp", e.to_string()))?;
            Ok(Value::Int(x.clamp(lo, hi)))
        })
        .build()
        .unwrap();

    let mut runtime = runtime();
    runtime.register(clamp);

    let result = runtime.evaluate(&call("clamp", vec![int(15), int(0), int(10)]));
    assert_eq!(result, Ok(Value::Int(10)));

    let result = runtime.evaluate(&call("clamp", vec![int(1)]));
    assert_eq!(
        result,
        Err(RuntimeError::ArityMismatch {
            name: "clamp".to_string(),
            expected: 3,
            found: 1
        })
    );
}

#[test]
fn builder_without_implementation_fails() {
    let result = HostFunctionBuilder::new("nothing").with_arity(0).build();
    assert!(matches!(result, Err(BuildError::MissingImplementation(name)) if name == "nothing"));
}

#[test]
fn host_errors_can_be_handled_in_script() {
    let mut runtime = runtime();
    runtime.register_host_function("fail", |_args| Err(RuntimeError::host("fail", "nope")));

    let tree = call(
        "try",
        vec![
            call("fail", vec![]),
            call(
                "handle",
                vec![
                    ident("runtime-error"),
                    lambda(&["k", "e"], vec![index(ident("e"), string("kind"))]),
                ],
            ),
        ],
    );
    assert_eq!(runtime.evaluate(&tree), Ok(Value::string("host")));
}

#[test]
fn embedder_macros_expand_like_core_keywords() {
    let mut runtime = runtime();
    runtime.register_macro("unless", expand_unless);
    runtime.register_macro("twice", expand_twice);
    assert!(runtime.machine().registry().keywords().contains(&"unless"));

    let result = runtime.evaluate(&call("unless", vec![boolean(false), int(1), int(2)]));
    assert_eq!(result, Ok(Value::Int(2)));
    let result = runtime.evaluate(&call("unless", vec![boolean(true), int(1)]));
    assert_eq!(result, Ok(Value::Null));

    let tree = block(vec![
        call("var", vec![ident("n"), int(0)]),
        call(
            "twice",
            vec![call("set", vec![ident("n"), call("+", vec![ident("n"), int(5)])])],
        ),
    ]);
    assert_eq!(runtime.evaluate(&tree), Ok(Value::Int(10)));

    let result = runtime.evaluate(&call("twice", vec![]));
    assert!(matches!(result, Err(RuntimeError::InvalidOperand { .. })));
}

#[test]
fn registered_methods_dispatch_on_type() {
    let mut runtime = runtime();
    runtime.register_method(TypeTag::Int, "double", |args| match args {
        [Value::Int(n)] => Ok(Value::Int(n * 2)),
        _ => Err(RuntimeError::invalid_operand("double takes no arguments")),
    });

    let result = runtime.evaluate(&method(int(21), "double", vec![]));
    assert_eq!(result, Ok(Value::Int(42)));

    let result = runtime.evaluate(&method(string("x"), "double", vec![]));
    assert!(matches!(result, Err(RuntimeError::InvalidOperand { .. })));
}

#[test]
fn map_fields_win_over_builtin_methods() {
    let tree = block(vec![
        call(
            "var",
            vec![
                ident("obj"),
                map(vec![
                    ("len", lambda(&["self"], vec![int(99)])),
                    ("name", string("box")),
                ]),
            ],
        ),
        call(
            "list",
            vec![method(ident("obj"), "len", vec![]), member(ident("obj"), "name")],
        ),
    ]);
    assert_eval(
        tree,
        Value::list(vec![Value::Int(99), Value::string("box")]),
    );
}

#[test]
fn globals_round_trip_through_conversions() {
    let mut runtime = runtime();
    let mut scores = HashMap::new();
    scores.insert("ada".to_string(), 3_i64);
    scores.insert("bob".to_string(), 5_i64);
    runtime.define_global("scores", scores);
    runtime.define_global("names", vec!["ada", "bob"]);

    let total = runtime
        .evaluate(&call(
            "+",
            vec![
                index(ident("scores"), string("ada")),
                index(ident("scores"), string("bob")),
            ],
        ))
        .unwrap();
    assert_eq!(i64::from_value(&total), Ok(8));

    let names = runtime.global("names").unwrap();
    assert_eq!(
        Vec::<String>::from_value(&names),
        Ok(vec!["ada".to_string(), "bob".to_string()])
    );
    assert!(runtime.global("nobody").is_none());
}

#[test]
fn conversion_errors_name_the_bad_part() {
    let value = vec![Value::Int(1), Value::string("two")].to_value();
    let err = Vec::<i64>::from_value(&value).unwrap_err();
    assert!(matches!(err, ConversionError::Element { index: 1, .. }));
}

#[test]
fn json_values_cross_the_boundary() {
    let input = serde_json::json!({"items": [1, 2, 3], "label": "sum"});
    let mut runtime = runtime();
    runtime.define_global("input", input);

    let tree = call(
        "str",
        vec![
            index(ident("input"), string("label")),
            string("="),
            method(index(ident("input"), string("items")), "len", vec![]),
        ],
    );
    let out = runtime.evaluate(&tree).unwrap();
    assert_eq!(
        serde_json::Value::from_value(&out),
        Ok(serde_json::json!("sum=3"))
    );
}

#[test]
fn globals_persist_across_evaluations() {
    let mut runtime = runtime();
    runtime
        .evaluate(&call("var", vec![ident("total"), int(1)]))
        .unwrap();
    runtime
        .evaluate(&call("set", vec![ident("total"), call("+", vec![ident("total"), int(1)])]))
        .unwrap();
    assert_eq!(runtime.global("total"), Some(Value::Int(2)));
}

#[test]
fn runtime_without_prelude_has_no_builtins() {
    let mut runtime = Runtime::new();
    let result = runtime.evaluate(&call("+", vec![int(1), int(2)]));
    assert_eq!(
        result,
        Err(RuntimeError::VariableNotFound {
            name: "+".to_string()
        })
    );
}

#[test]
fn lenient_arity_pads_and_drops_arguments() {
    let result = eval_all(vec![
        call("var", vec![ident("pair"), lambda(&["a", "b"], vec![list(vec![ident("a"), ident("b")])])]),
        call(
            "list",
            vec![
                call("pair", vec![int(1)]),
                call("pair", vec![int(1), int(2), int(3)]),
            ],
        ),
    ]);
    assert_eq!(
        result,
        Ok(Value::list(vec![
            Value::list(vec![Value::Int(1), Value::Null]),
            Value::list(vec![Value::Int(1), Value::Int(2)]),
        ]))
    );
}

#[test]
#[serial]
fn project_config_is_loaded_from_weft_toml() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("weft.toml"),
        "[semantics]\narity = \"strict\"\n\n[limits]\nmax_steps = 10000\n",
    )
    .unwrap();
    let nested = dir.path().join("src").join("scripts");
    fs::create_dir_all(&nested).unwrap();

    let runtime = Runtime::from_project_dir(&nested).unwrap();
    assert_eq!(runtime.config().arity(), ArityPolicy::Strict);
    assert_eq!(runtime.config().max_steps(), Some(10000));

    let mut runtime = runtime.with_prelude();
    let result = runtime.evaluate(&call_expr(
        lambda(&["a", "b"], vec![ident("a")]),
        vec![int(1)],
    ));
    assert_eq!(
        result,
        Err(RuntimeError::ArityMismatch {
            name: "<lambda>".to_string(),
            expected: 2,
            found: 1
        })
    );
}

#[test]
#[serial]
fn invalid_project_config_is_reported() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("weft.toml"), "[semantics]\narity = \"loose\"\n").unwrap();
    assert!(Runtime::from_project_dir(dir.path()).is_err());
}

#[test]
#[serial]
fn tracing_initializes_once() {
    let runtime = runtime();
    // Another test binary may not have installed a subscriber, but within
    // this one the second call always reports the existing subscriber
    weft_runtime::logging::init_tracing(runtime.config());
    assert!(!weft_runtime::logging::init_tracing(runtime.config()));
}
