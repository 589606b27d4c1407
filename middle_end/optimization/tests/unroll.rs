use pretty_assertions::assert_eq;

use super::super::unroll::{fully_unroll, partial_unroll};
use super::{count_op, parse};
use crate::commons::Valid;
use crate::middle_end::cfg::form_cfg;
use crate::middle_end::dominators::natural_loops;
use crate::middle_end::ir::{Op, Program};

fn counting_loop(bound: i64) -> Valid<Program> {
    parse(&format!(
        r#"{{"functions": [{{
            "name": "main",
            "instrs": [
                {{"op": "const", "dest": "i", "type": "int", "value": 0}},
                {{"op": "const", "dest": "end", "type": "int", "value": {bound}}},
                {{"op": "const", "dest": "one", "type": "int", "value": 1}},
                {{"op": "jmp", "labels": ["loop"]}},
                {{"label": "loop"}},
                {{"op": "lt", "dest": "c", "type": "bool", "args": ["i", "end"]}},
                {{"op": "br", "args": ["c"], "labels": ["body", "done"]}},
                {{"label": "body"}},
                {{"op": "print", "args": ["i"]}},
                {{"op": "add", "dest": "i", "type": "int", "args": ["i", "one"]}},
                {{"op": "jmp", "labels": ["loop"]}},
                {{"label": "done"}},
                {{"op": "ret"}}
            ]
        }}]}}"#
    ))
}

#[test]
fn trip_three_unrolls_to_three_bodies() {
    let out = fully_unroll(counting_loop(3));
    // three copies of the body, in a straight line
    assert_eq!(count_op(&out.0, Op::Print), 3);
    // no loop remains
    let cfg = form_cfg(&out.0.functions[0].instrs);
    assert!(natural_loops(&cfg).is_empty());
    // the residual header copy jumps to the original exit
    let jumps_to_done = out.0.functions[0]
        .instrs
        .iter()
        .filter(|i| i.is(Op::Jmp) && i.labels()[0] == "done")
        .count();
    assert_eq!(jumps_to_done, 1);
}

#[test]
fn single_trip_loops_are_left_alone() {
    let out = fully_unroll(counting_loop(1));
    assert_eq!(count_op(&out.0, Op::Print), 1);
    let cfg = form_cfg(&out.0.functions[0].instrs);
    assert_eq!(natural_loops(&cfg).len(), 1);
}

#[test]
fn unknown_bounds_are_left_alone() {
    let program = parse(
        r#"{"functions": [{
            "name": "main",
            "args": [{"name": "end", "type": "int"}],
            "instrs": [
                {"op": "const", "dest": "i", "type": "int", "value": 0},
                {"op": "const", "dest": "one", "type": "int", "value": 1},
                {"op": "jmp", "labels": ["loop"]},
                {"label": "loop"},
                {"op": "lt", "dest": "c", "type": "bool", "args": ["i", "end"]},
                {"op": "br", "args": ["c"], "labels": ["body", "done"]},
                {"label": "body"},
                {"op": "print", "args": ["i"]},
                {"op": "add", "dest": "i", "type": "int", "args": ["i", "one"]},
                {"op": "jmp", "labels": ["loop"]},
                {"label": "done"},
                {"op": "ret"}
            ]
        }]}"#,
    );
    let out = fully_unroll(program);
    assert_eq!(count_op(&out.0, Op::Print), 1);
}

#[test]
fn counting_down_works_too() {
    let program = parse(
        r#"{"functions": [{
            "name": "main",
            "instrs": [
                {"op": "const", "dest": "i", "type": "int", "value": 2},
                {"op": "const", "dest": "end", "type": "int", "value": 0},
                {"op": "const", "dest": "one", "type": "int", "value": 1},
                {"op": "jmp", "labels": ["loop"]},
                {"label": "loop"},
                {"op": "gt", "dest": "c", "type": "bool", "args": ["i", "end"]},
                {"op": "br", "args": ["c"], "labels": ["body", "done"]},
                {"label": "body"},
                {"op": "print", "args": ["i"]},
                {"op": "sub", "dest": "i", "type": "int", "args": ["i", "one"]},
                {"op": "jmp", "labels": ["loop"]},
                {"label": "done"},
                {"op": "ret"}
            ]
        }]}"#,
    );
    let out = fully_unroll(program);
    assert_eq!(count_op(&out.0, Op::Print), 2);
    let cfg = form_cfg(&out.0.functions[0].instrs);
    assert!(natural_loops(&cfg).is_empty());
}

#[test]
fn partial_unroll_keeps_the_guards() {
    let out = partial_unroll(counting_loop(3), 2);
    // header + two replicas, each with its own branch
    assert_eq!(count_op(&out.0, Op::Br), 3);
    assert_eq!(count_op(&out.0, Op::Print), 3);
    // still a loop: the last replica jumps back to the original header
    let back = out.0.functions[0]
        .instrs
        .iter()
        .filter(|i| i.is(Op::Jmp) && i.labels()[0] == "loop")
        .count();
    assert!(back >= 1);
}
