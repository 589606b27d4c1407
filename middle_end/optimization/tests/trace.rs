use pretty_assertions::assert_eq;

use super::super::trace::{trace_opt, Trace, TraceStep};
use super::{count_op, parse};
use crate::middle_end::ir::{Code, Instruction, Literal, Op, Type};

fn step(instr: Instruction) -> TraceStep {
    TraceStep {
        instr,
        branch: None,
    }
}

fn branch_step(instr: Instruction, taken: bool) -> TraceStep {
    TraceStep {
        instr,
        branch: Some(taken),
    }
}

#[test]
fn straight_line_trace_is_speculated_and_value_numbered() {
    let program = parse(
        r#"{"functions": [{
            "name": "main",
            "instrs": [
                {"op": "const", "dest": "x", "type": "int", "value": 1},
                {"op": "add", "dest": "y", "type": "int", "args": ["x", "x"]},
                {"op": "print", "args": ["y"]},
                {"op": "ret"}
            ]
        }]}"#,
    );
    let trace = Trace {
        start_func: "main".into(),
        start_offset: 0,
        end_func: "main".into(),
        end_offset: 2,
        instrs: vec![
            step(Instruction::const_int("x", 1)),
            step(Instruction::binop(Op::Add, "y", Type::Int, "x", "x")),
        ],
    };
    let out = trace_opt(program, &trace);

    assert_eq!(count_op(&out.0, Op::Speculate), 1);
    assert_eq!(count_op(&out.0, Op::Commit), 1);
    // value numbering folded the speculative add
    let folded = out.0.functions[0]
        .instrs
        .iter()
        .any(|i| i.is_const() && i.as_code().unwrap().value == Some(Literal::Int(2)));
    assert!(folded);
}

#[test]
fn false_arm_branches_guard_on_the_negation() {
    let program = parse(
        r#"{"functions": [{
            "name": "main",
            "args": [{"name": "c", "type": "bool"}],
            "instrs": [
                {"op": "br", "args": ["c"], "labels": ["yes", "no"]},
                {"label": "yes"},
                {"op": "const", "dest": "x", "type": "int", "value": 1},
                {"op": "jmp", "labels": ["after"]},
                {"label": "no"},
                {"op": "const", "dest": "x", "type": "int", "value": 2},
                {"label": "after"},
                {"op": "ret"}
            ]
        }]}"#,
    );
    let trace = Trace {
        start_func: "main".into(),
        start_offset: 0,
        end_func: "main".into(),
        end_offset: 7,
        instrs: vec![
            branch_step(Instruction::br("c", "yes", "no"), false),
            step(Instruction::const_int("x", 2)),
        ],
    };
    let out = trace_opt(program, &trace);
    assert_eq!(count_op(&out.0, Op::Guard), 1);
    assert_eq!(count_op(&out.0, Op::Not), 1);
    let guard = out.0.functions[0]
        .instrs
        .iter()
        .find(|i| i.is_guard())
        .unwrap();
    assert!(guard.labels()[0].starts_with("trace.bailout"));
}

#[test]
fn taken_branches_guard_directly() {
    let program = parse(
        r#"{"functions": [{
            "name": "main",
            "instrs": [
                {"op": "const", "dest": "c", "type": "bool", "value": true},
                {"op": "br", "args": ["c"], "labels": ["yes", "no"]},
                {"label": "yes"},
                {"op": "ret"},
                {"label": "no"},
                {"op": "ret"}
            ]
        }]}"#,
    );
    let trace = Trace {
        start_func: "main".into(),
        start_offset: 0,
        end_func: "main".into(),
        end_offset: 3,
        instrs: vec![
            step(Instruction::constant("c", Type::Bool, Literal::Bool(true))),
            branch_step(Instruction::br("c", "yes", "no"), true),
        ],
    };
    let out = trace_opt(program, &trace);
    assert_eq!(count_op(&out.0, Op::Guard), 1);
    assert_eq!(count_op(&out.0, Op::Not), 0);
}

#[test]
fn memory_traffic_rejects_the_trace() {
    let program = parse(
        r#"{"functions": [{
            "name": "main",
            "instrs": [
                {"op": "const", "dest": "x", "type": "int", "value": 1},
                {"op": "print", "args": ["x"]},
                {"op": "ret"}
            ]
        }]}"#,
    );
    let original = program.0.clone();
    let trace = Trace {
        start_func: "main".into(),
        start_offset: 0,
        end_func: "main".into(),
        end_offset: 1,
        instrs: vec![
            step(Instruction::const_int("x", 1)),
            step(Instruction::Code(Code {
                op: Op::Store,
                dest: None,
                typ: None,
                args: vec!["p".into(), "x".into()],
                funcs: vec![],
                labels: vec![],
                value: None,
            })),
        ],
    };
    let out = trace_opt(program, &trace);
    assert_eq!(out.0, original);
}

#[test]
fn float_traces_skip_value_numbering() {
    let program = parse(
        r#"{"functions": [{
            "name": "main",
            "args": [{"name": "g", "type": "float"}, {"name": "h", "type": "float"}],
            "instrs": [
                {"op": "const", "dest": "x", "type": "int", "value": 1},
                {"op": "add", "dest": "y", "type": "int", "args": ["x", "x"]},
                {"op": "print", "args": ["y"]},
                {"op": "ret"}
            ]
        }]}"#,
    );
    let trace = Trace {
        start_func: "main".into(),
        start_offset: 0,
        end_func: "main".into(),
        end_offset: 2,
        instrs: vec![
            step(Instruction::const_int("x", 1)),
            step(Instruction::binop(Op::Add, "y", Type::Int, "x", "x")),
            step(Instruction::binop(Op::FAdd, "f", Type::Float, "g", "h")),
        ],
    };
    let out = trace_opt(program, &trace);
    // the speculative add is still an add: no folding happened
    assert!(count_op(&out.0, Op::Add) >= 2);
    assert_eq!(count_op(&out.0, Op::Speculate), 1);
}
