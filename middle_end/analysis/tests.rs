use std::collections::BTreeSet as Set;

use pretty_assertions::assert_eq;

use crate::commons::Valid;

use super::super::ir::{Literal, Op, Program};
use super::*;

fn parse(json: &str) -> Valid<Program> {
    serde_json::from_str::<Program>(json)
        .expect("test program parses")
        .validate()
        .expect("test program validates")
}

#[test]
fn reaching_defs_start_from_parameters() {
    let program = parse(
        r#"{"functions": [{
            "name": "main",
            "args": [{"name": "a", "type": "int"}, {"name": "b", "type": "int"}],
            "instrs": [
                {"op": "add", "dest": "c", "type": "int", "args": ["a", "b"]},
                {"op": "ret"}
            ]
        }]}"#,
    );
    let solution = reaching_defs::analyze(&program, "main");
    let entry_in = &solution.input["b0"];
    let expected: Set<reaching_defs::Def> =
        [(-1, "a".to_string()), (-2, "b".to_string())].into();
    assert_eq!(entry_in, &expected);
    // c's definition reaches the block exit; the parameters survive
    assert!(solution.output["b0"].contains(&(1, "c".to_string())));
    assert!(solution.output["b0"].contains(&(-1, "a".to_string())));
}

#[test]
fn reaching_defs_kill_earlier_definitions() {
    let program = parse(
        r#"{"functions": [{
            "name": "main",
            "instrs": [
                {"op": "const", "dest": "x", "type": "int", "value": 1},
                {"op": "const", "dest": "x", "type": "int", "value": 2},
                {"op": "print", "args": ["x"]}
            ]
        }]}"#,
    );
    let solution = reaching_defs::analyze(&program, "main");
    let out = &solution.output["b0"];
    assert!(out.contains(&(2, "x".to_string())));
    assert!(!out.contains(&(1, "x".to_string())));
}

#[test]
fn live_variables_flow_backwards() {
    let program = parse(
        r#"{"functions": [{
            "name": "main",
            "instrs": [
                {"op": "const", "dest": "a", "type": "int", "value": 1},
                {"op": "const", "dest": "dead", "type": "int", "value": 2},
                {"label": "use"},
                {"op": "print", "args": ["a"]},
                {"op": "ret"}
            ]
        }]}"#,
    );
    let solution = live_variables::analyze(&program, "main");
    let live_out_entry = &solution.output["b0"];
    assert!(live_out_entry.contains("a"));
    assert!(!live_out_entry.contains("dead"));
    // a variable is live-out of b exactly when it is live-in to a successor
    assert_eq!(live_out_entry, &solution.input["use"]);
}

#[test]
fn available_exprs_require_all_paths() {
    let program = parse(
        r#"{"functions": [{
            "name": "main",
            "args": [{"name": "a", "type": "int"}, {"name": "b", "type": "int"}, {"name": "c", "type": "bool"}],
            "instrs": [
                {"op": "br", "args": ["c"], "labels": ["left", "right"]},
                {"label": "left"},
                {"op": "add", "dest": "x", "type": "int", "args": ["a", "b"]},
                {"op": "mul", "dest": "y", "type": "int", "args": ["a", "b"]},
                {"op": "jmp", "labels": ["join"]},
                {"label": "right"},
                {"op": "add", "dest": "z", "type": "int", "args": ["a", "b"]},
                {"label": "join"},
                {"op": "ret"}
            ]
        }]}"#,
    );
    let solution = available_exprs::analyze(&program, "main");
    let at_join = &solution.input["join"];
    let both_paths = (Op::Add, vec!["a".to_string(), "b".to_string()]);
    let one_path = (Op::Mul, vec!["a".to_string(), "b".to_string()]);
    assert!(at_join.contains(&both_paths));
    assert!(!at_join.contains(&one_path));
}

#[test]
fn available_exprs_killed_by_redefinition() {
    let program = parse(
        r#"{"functions": [{
            "name": "main",
            "args": [{"name": "a", "type": "int"}, {"name": "b", "type": "int"}],
            "instrs": [
                {"op": "add", "dest": "x", "type": "int", "args": ["a", "b"]},
                {"op": "const", "dest": "a", "type": "int", "value": 0},
                {"op": "ret"}
            ]
        }]}"#,
    );
    let solution = available_exprs::analyze(&program, "main");
    assert!(solution.output["b0"].is_empty());
}

#[test]
fn constant_prop_interprets_and_merges() {
    let program = parse(
        r#"{"functions": [{
            "name": "main",
            "args": [{"name": "c", "type": "bool"}],
            "instrs": [
                {"op": "br", "args": ["c"], "labels": ["left", "right"]},
                {"label": "left"},
                {"op": "const", "dest": "same", "type": "int", "value": 5},
                {"op": "const", "dest": "diff", "type": "int", "value": 1},
                {"op": "jmp", "labels": ["join"]},
                {"label": "right"},
                {"op": "const", "dest": "same", "type": "int", "value": 5},
                {"op": "const", "dest": "diff", "type": "int", "value": 2},
                {"label": "join"},
                {"op": "ret"}
            ]
        }]}"#,
    );
    let solution = constant_prop::analyze(&program, "main");
    let at_join = &solution.input["join"];
    assert_eq!(
        at_join["same"],
        constant_prop::Value::Constant(Literal::Int(5))
    );
    assert_eq!(at_join["diff"], constant_prop::Value::NotConstant);
    // the parameter is ? from the start
    assert_eq!(at_join["c"], constant_prop::Value::NotConstant);
}

#[test]
fn constant_prop_folds_arithmetic() {
    let program = parse(
        r#"{"functions": [{
            "name": "main",
            "instrs": [
                {"op": "const", "dest": "a", "type": "int", "value": 3},
                {"op": "const", "dest": "b", "type": "int", "value": 4},
                {"op": "add", "dest": "c", "type": "int", "args": ["a", "b"]},
                {"op": "const", "dest": "z", "type": "int", "value": 0},
                {"op": "div", "dest": "bad", "type": "int", "args": ["a", "z"]},
                {"op": "ret"}
            ]
        }]}"#,
    );
    let solution = constant_prop::analyze(&program, "main");
    let out = &solution.output["b0"];
    assert_eq!(out["c"], constant_prop::Value::Constant(Literal::Int(7)));
    // division by a known zero refuses to fold
    assert_eq!(out["bad"], constant_prop::Value::NotConstant);
}

#[test]
fn alias_tracks_allocation_sites() {
    let program = parse(
        r#"{"functions": [{
            "name": "main",
            "instrs": [
                {"op": "const", "dest": "n", "type": "int", "value": 4},
                {"op": "alloc", "dest": "p", "type": {"ptr": "int"}, "args": ["n"]},
                {"op": "alloc", "dest": "q", "type": {"ptr": "int"}, "args": ["n"]},
                {"op": "ptradd", "dest": "r", "type": {"ptr": "int"}, "args": ["p", "n"]},
                {"op": "id", "dest": "s", "type": {"ptr": "int"}, "args": ["q"]},
                {"op": "ret"}
            ]
        }]}"#,
    );
    let solution = alias::analyze(&program, "main");
    let env = &solution.output["b0"];
    assert!(alias::may_alias(env, &"p".to_string(), &"r".to_string()));
    assert!(alias::may_alias(env, &"q".to_string(), &"s".to_string()));
    assert!(!alias::may_alias(env, &"p".to_string(), &"q".to_string()));
    assert!(!alias::may_alias(env, &"r".to_string(), &"s".to_string()));
}

#[test]
fn alias_load_unions_matching_pointer_type() {
    let program = parse(
        r#"{"functions": [{
            "name": "main",
            "instrs": [
                {"op": "const", "dest": "n", "type": "int", "value": 1},
                {"op": "alloc", "dest": "cell", "type": {"ptr": {"ptr": "int"}}, "args": ["n"]},
                {"op": "alloc", "dest": "p", "type": {"ptr": "int"}, "args": ["n"]},
                {"op": "load", "dest": "loaded", "type": {"ptr": "int"}, "args": ["cell"]},
                {"op": "ret"}
            ]
        }]}"#,
    );
    let solution = alias::analyze(&program, "main");
    let env = &solution.output["b0"];
    // the loaded ptr<int> may be anything the other ptr<int>s point at
    assert!(alias::may_alias(env, &"loaded".to_string(), &"p".to_string()));
    assert!(!alias::may_alias(env, &"loaded".to_string(), &"cell".to_string()));
}
