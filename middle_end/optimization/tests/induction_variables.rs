use pretty_assertions::assert_eq;

use super::super::induction_variables::ive;
use super::parse;
use crate::middle_end::cfg::form_cfg;
use crate::middle_end::ir::{Literal, Op};

#[test]
fn derived_variable_becomes_a_running_sum() {
    let program = parse(
        r#"{"functions": [{
            "name": "main",
            "instrs": [
                {"op": "const", "dest": "i", "type": "int", "value": 0},
                {"op": "const", "dest": "one", "type": "int", "value": 1},
                {"op": "const", "dest": "four", "type": "int", "value": 4},
                {"op": "const", "dest": "c", "type": "int", "value": 3},
                {"op": "const", "dest": "d", "type": "int", "value": 5},
                {"op": "jmp", "labels": ["loop"]},
                {"label": "loop"},
                {"op": "mul", "dest": "a", "type": "int", "args": ["c", "i"]},
                {"op": "add", "dest": "j", "type": "int", "args": ["a", "d"]},
                {"op": "print", "args": ["j"]},
                {"op": "lt", "dest": "cond", "type": "bool", "args": ["i", "four"]},
                {"op": "add", "dest": "i", "type": "int", "args": ["i", "one"]},
                {"op": "br", "args": ["cond"], "labels": ["loop", "done"]},
                {"label": "done"},
                {"op": "ret"}
            ]
        }]}"#,
    );
    let out = ive(program);
    let func = &out.0.functions[0];
    let cfg = form_cfg(&func.instrs);

    let preheader = cfg
        .keys()
        .find(|k| k.starts_with("loop.preheader"))
        .expect("ive inserted a preheader");
    // j is initialized to the offset before the loop
    assert!(cfg[preheader].instrs.iter().any(|i| {
        i.is_const()
            && i.dest().map(|d| d == "j").unwrap_or(false)
            && i.as_code().unwrap().value == Some(Literal::Int(5))
    }));

    // inside the loop, j advances by the multiplier instead of being
    // recomputed from a
    let loop_instrs = &cfg["loop"].instrs;
    assert!(!loop_instrs
        .iter()
        .any(|i| i.is(Op::Add) && i.dest().map(|d| d == "j").unwrap_or(false) && i.args().contains(&"a".to_string())));
    let update = loop_instrs
        .iter()
        .find(|i| i.is(Op::Add) && i.dest().map(|d| d == "j").unwrap_or(false))
        .expect("j keeps an in-loop update");
    assert_eq!(update.args(), &["j".to_string(), "c".to_string()]);
}

#[test]
fn a_second_counter_does_not_block_the_rewrite() {
    let program = parse(
        r#"{"functions": [{
            "name": "main",
            "instrs": [
                {"op": "const", "dest": "i", "type": "int", "value": 0},
                {"op": "const", "dest": "k", "type": "int", "value": 0},
                {"op": "const", "dest": "one", "type": "int", "value": 1},
                {"op": "const", "dest": "four", "type": "int", "value": 4},
                {"op": "const", "dest": "d", "type": "int", "value": 1},
                {"op": "jmp", "labels": ["loop"]},
                {"label": "loop"},
                {"op": "mul", "dest": "a", "type": "int", "args": ["four", "i"]},
                {"op": "add", "dest": "j", "type": "int", "args": ["a", "d"]},
                {"op": "print", "args": ["j", "k"]},
                {"op": "lt", "dest": "cond", "type": "bool", "args": ["i", "four"]},
                {"op": "add", "dest": "i", "type": "int", "args": ["i", "one"]},
                {"op": "add", "dest": "k", "type": "int", "args": ["k", "one"]},
                {"op": "br", "args": ["cond"], "labels": ["loop", "done"]},
                {"label": "done"},
                {"op": "ret"}
            ]
        }]}"#,
    );
    let out = ive(program);
    let func = &out.0.functions[0];
    let cfg = form_cfg(&func.instrs);

    // j is strength-reduced against i even though k also counts
    let preheader = cfg
        .keys()
        .find(|l| l.starts_with("loop.preheader"))
        .expect("ive inserted a preheader");
    assert!(cfg[preheader].instrs.iter().any(|i| {
        i.is_const()
            && i.dest().map(|dst| dst == "j").unwrap_or(false)
            && i.as_code().unwrap().value == Some(Literal::Int(1))
    }));
    let update = cfg["loop"]
        .instrs
        .iter()
        .find(|i| i.is(Op::Add) && i.dest().map(|dst| dst == "j").unwrap_or(false))
        .expect("j keeps an in-loop update");
    assert_eq!(update.args(), &["j".to_string(), "four".to_string()]);
    // k's own update is untouched
    assert!(cfg["loop"]
        .instrs
        .iter()
        .any(|i| i.is(Op::Add)
            && i.dest().map(|dst| dst == "k").unwrap_or(false)
            && i.args().contains(&"one".to_string())));
}

#[test]
fn loops_without_the_strict_shape_are_untouched() {
    // the bump is 2, not 1: no basic induction variable
    let program = parse(
        r#"{"functions": [{
            "name": "main",
            "instrs": [
                {"op": "const", "dest": "i", "type": "int", "value": 0},
                {"op": "const", "dest": "two", "type": "int", "value": 2},
                {"op": "const", "dest": "four", "type": "int", "value": 4},
                {"op": "const", "dest": "c", "type": "int", "value": 3},
                {"op": "const", "dest": "d", "type": "int", "value": 5},
                {"op": "jmp", "labels": ["loop"]},
                {"label": "loop"},
                {"op": "mul", "dest": "a", "type": "int", "args": ["c", "i"]},
                {"op": "add", "dest": "j", "type": "int", "args": ["a", "d"]},
                {"op": "print", "args": ["j"]},
                {"op": "lt", "dest": "cond", "type": "bool", "args": ["i", "four"]},
                {"op": "add", "dest": "i", "type": "int", "args": ["i", "two"]},
                {"op": "br", "args": ["cond"], "labels": ["loop", "done"]},
                {"label": "done"},
                {"op": "ret"}
            ]
        }]}"#,
    );
    let out = ive(program);
    let func = &out.0.functions[0];
    let cfg = form_cfg(&func.instrs);
    // the derived definition stays exactly as written
    assert!(cfg["loop"]
        .instrs
        .iter()
        .any(|i| i.is(Op::Add)
            && i.dest().map(|d| d == "j").unwrap_or(false)
            && i.args().contains(&"a".to_string())));
}
