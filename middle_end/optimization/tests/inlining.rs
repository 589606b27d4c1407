use pretty_assertions::assert_eq;

use super::super::inlining::{call_graph, inline, topological_sort};
use super::{count_op, parse};
use crate::middle_end::ir::Op;

#[test]
fn leaf_call_is_spliced_into_the_caller() {
    let program = parse(
        r#"{"functions": [
            {"name": "main", "instrs": [
                {"op": "const", "dest": "x", "type": "int", "value": 5},
                {"op": "call", "dest": "y", "type": "int", "funcs": ["double"], "args": ["x"]},
                {"op": "print", "args": ["y"]},
                {"op": "ret"}
            ]},
            {"name": "double", "args": [{"name": "a", "type": "int"}], "type": "int", "instrs": [
                {"op": "add", "dest": "t", "type": "int", "args": ["a", "a"]},
                {"op": "ret", "args": ["t"]}
            ]}
        ]}"#,
    );
    let out = inline(program);
    let main = out.0.get_function("main").unwrap();

    assert!(!main.instrs.iter().any(|i| i.is_call()));
    // the body arrived: an add over the renamed parameter
    let add = main.instrs.iter().find(|i| i.is(Op::Add)).unwrap();
    assert!(add.args()[0].ends_with("_inlined"));
    // the result flows into y through the return variable
    let result = main
        .instrs
        .iter()
        .find(|i| i.is_id() && i.dest().map(|d| d == "y").unwrap_or(false))
        .expect("call result is bound");
    assert!(result.args()[0].starts_with("return_var"));
}

#[test]
fn every_call_site_gets_its_own_copy() {
    let program = parse(
        r#"{"functions": [
            {"name": "main", "instrs": [
                {"op": "const", "dest": "x", "type": "int", "value": 5},
                {"op": "call", "dest": "y", "type": "int", "funcs": ["double"], "args": ["x"]},
                {"op": "call", "dest": "z", "type": "int", "funcs": ["double"], "args": ["y"]},
                {"op": "print", "args": ["z"]},
                {"op": "ret"}
            ]},
            {"name": "double", "args": [{"name": "a", "type": "int"}], "type": "int", "instrs": [
                {"op": "add", "dest": "t", "type": "int", "args": ["a", "a"]},
                {"op": "ret", "args": ["t"]}
            ]}
        ]}"#,
    );
    let out = inline(program);
    let main = out.0.get_function("main").unwrap();
    assert!(!main.instrs.iter().any(|i| i.is_call()));
    assert_eq!(
        main.instrs.iter().filter(|i| i.is(Op::Add)).count(),
        2
    );
    // the two copies do not share names
    let adds: Vec<&str> = main
        .instrs
        .iter()
        .filter(|i| i.is(Op::Add))
        .map(|i| i.dest().unwrap().as_str())
        .collect();
    assert!(adds[0] != adds[1]);
}

#[test]
fn chains_inline_transitively() {
    let program = parse(
        r#"{"functions": [
            {"name": "main", "instrs": [
                {"op": "const", "dest": "x", "type": "int", "value": 1},
                {"op": "call", "dest": "y", "type": "int", "funcs": ["outer"], "args": ["x"]},
                {"op": "print", "args": ["y"]},
                {"op": "ret"}
            ]},
            {"name": "outer", "args": [{"name": "n", "type": "int"}], "type": "int", "instrs": [
                {"op": "call", "dest": "m", "type": "int", "funcs": ["leaf"], "args": ["n"]},
                {"op": "ret", "args": ["m"]}
            ]},
            {"name": "leaf", "args": [{"name": "k", "type": "int"}], "type": "int", "instrs": [
                {"op": "add", "dest": "r", "type": "int", "args": ["k", "k"]},
                {"op": "ret", "args": ["r"]}
            ]}
        ]}"#,
    );
    let out = inline(program);
    let main = out.0.get_function("main").unwrap();
    // callees were processed first, so main sees only straight-line code
    assert!(!main.instrs.iter().any(|i| i.is_call()));
    assert!(main.instrs.iter().any(|i| i.is(Op::Add)));
}

#[test]
fn recursion_is_left_alone() {
    let program = parse(
        r#"{"functions": [
            {"name": "main", "instrs": [
                {"op": "const", "dest": "x", "type": "int", "value": 3},
                {"op": "call", "dest": "y", "type": "int", "funcs": ["fact"], "args": ["x"]},
                {"op": "print", "args": ["y"]},
                {"op": "ret"}
            ]},
            {"name": "fact", "args": [{"name": "n", "type": "int"}], "type": "int", "instrs": [
                {"op": "call", "dest": "r", "type": "int", "funcs": ["fact"], "args": ["n"]},
                {"op": "ret", "args": ["r"]}
            ]}
        ]}"#,
    );
    let out = inline(program);
    // the self-recursive callee is excluded wholesale
    assert_eq!(count_op(&out.0, Op::Call), 2);
}

#[test]
fn topological_order_puts_callees_first() {
    let program = parse(
        r#"{"functions": [
            {"name": "main", "instrs": [
                {"op": "call", "funcs": ["mid"]},
                {"op": "ret"}
            ]},
            {"name": "mid", "instrs": [
                {"op": "call", "funcs": ["leaf"]},
                {"op": "ret"}
            ]},
            {"name": "leaf", "instrs": [
                {"op": "nop"},
                {"op": "ret"}
            ]}
        ]}"#,
    );
    let (vertices, edges) = call_graph(&program.0);
    let order = topological_sort(vertices, edges);
    let position = |name: &str| order.iter().position(|v| v == name).unwrap();
    assert!(position("leaf") < position("mid"));
    assert!(position("mid") < position("main"));
}
