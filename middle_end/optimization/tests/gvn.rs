use pretty_assertions::assert_eq;

use super::super::gvn::gvn;
use super::{count_op, parse};
use crate::middle_end::ir::{Literal, Op};
use crate::middle_end::ssa::is_ssa;

#[test]
fn meaningless_phi_folds_to_its_argument() {
    let program = parse(
        r#"{"functions": [{
            "name": "main",
            "args": [{"name": "c", "type": "bool"}],
            "instrs": [
                {"op": "const", "dest": "x_1", "type": "int", "value": 1},
                {"op": "br", "args": ["c"], "labels": ["left", "right"]},
                {"label": "left"},
                {"op": "jmp", "labels": ["join"]},
                {"label": "right"},
                {"op": "jmp", "labels": ["join"]},
                {"label": "join"},
                {"op": "phi", "dest": "x_2", "type": "int", "args": ["x_1", "x_1"], "labels": ["left", "right"]},
                {"op": "print", "args": ["x_2"]},
                {"op": "ret"}
            ]
        }]}"#,
    );
    let out = gvn(program);
    assert_eq!(count_op(&out.0, Op::Phi), 0);
    let print = out.0.functions[0]
        .instrs
        .iter()
        .find(|i| i.is_print())
        .unwrap();
    assert_eq!(print.args(), &["x_1".to_string()]);
}

#[test]
fn redundant_phi_folds_to_the_canonical_one() {
    let program = parse(
        r#"{"functions": [{
            "name": "main",
            "args": [{"name": "c", "type": "bool"}],
            "instrs": [
                {"op": "br", "args": ["c"], "labels": ["left", "right"]},
                {"label": "left"},
                {"op": "const", "dest": "u_1", "type": "int", "value": 1},
                {"op": "jmp", "labels": ["join"]},
                {"label": "right"},
                {"op": "const", "dest": "u_2", "type": "int", "value": 2},
                {"op": "jmp", "labels": ["join"]},
                {"label": "join"},
                {"op": "phi", "dest": "p_1", "type": "int", "args": ["u_1", "u_2"], "labels": ["left", "right"]},
                {"op": "phi", "dest": "p_2", "type": "int", "args": ["u_1", "u_2"], "labels": ["left", "right"]},
                {"op": "print", "args": ["p_1", "p_2"]},
                {"op": "ret"}
            ]
        }]}"#,
    );
    let out = gvn(program);
    assert_eq!(count_op(&out.0, Op::Phi), 1);
    let print = out.0.functions[0]
        .instrs
        .iter()
        .find(|i| i.is_print())
        .unwrap();
    assert_eq!(print.args(), &["p_1".to_string(), "p_1".to_string()]);
}

#[test]
fn dominating_computation_is_reused() {
    let program = parse(
        r#"{"functions": [{
            "name": "main",
            "args": [{"name": "p", "type": "int"}, {"name": "q", "type": "int"}, {"name": "c", "type": "bool"}],
            "instrs": [
                {"op": "add", "dest": "s_1", "type": "int", "args": ["p", "q"]},
                {"op": "br", "args": ["c"], "labels": ["left", "done"]},
                {"label": "left"},
                {"op": "add", "dest": "t_1", "type": "int", "args": ["p", "q"]},
                {"op": "print", "args": ["t_1"]},
                {"op": "jmp", "labels": ["done"]},
                {"label": "done"},
                {"op": "print", "args": ["s_1"]},
                {"op": "ret"}
            ]
        }]}"#,
    );
    let out = gvn(program);
    // t_1 is the same value as s_1 computed in a dominator
    assert_eq!(count_op(&out.0, Op::Add), 1);
    let prints: Vec<&str> = out.0.functions[0]
        .instrs
        .iter()
        .filter(|i| i.is_print())
        .map(|i| i.args()[0].as_str())
        .collect();
    assert_eq!(prints, vec!["s_1", "s_1"]);
}

#[test]
fn siblings_do_not_share_values() {
    let program = parse(
        r#"{"functions": [{
            "name": "main",
            "args": [{"name": "p", "type": "int"}, {"name": "c", "type": "bool"}],
            "instrs": [
                {"op": "br", "args": ["c"], "labels": ["left", "right"]},
                {"label": "left"},
                {"op": "add", "dest": "l_1", "type": "int", "args": ["p", "p"]},
                {"op": "print", "args": ["l_1"]},
                {"op": "ret"},
                {"label": "right"},
                {"op": "add", "dest": "r_1", "type": "int", "args": ["p", "p"]},
                {"op": "print", "args": ["r_1"]},
                {"op": "ret"}
            ]
        }]}"#,
    );
    let out = gvn(program);
    // the branches are siblings in the dominator tree: no sharing
    assert_eq!(count_op(&out.0, Op::Add), 2);
}

#[test]
fn interpretation_folds_constants() {
    let program = parse(
        r#"{"functions": [{
            "name": "main",
            "instrs": [
                {"op": "const", "dest": "a_1", "type": "int", "value": 3},
                {"op": "const", "dest": "b_1", "type": "int", "value": 4},
                {"op": "add", "dest": "c_1", "type": "int", "args": ["a_1", "b_1"]},
                {"op": "print", "args": ["c_1"]},
                {"op": "ret"}
            ]
        }]}"#,
    );
    let out = gvn(program);
    let c = out.0.functions[0]
        .instrs
        .iter()
        .find(|i| i.dest().map(|d| d == "c_1").unwrap_or(false))
        .unwrap();
    assert!(c.is_const());
    assert_eq!(c.as_code().unwrap().value, Some(Literal::Int(7)));
}

#[test]
fn gvn_converts_to_ssa_when_needed() {
    let program = parse(
        r#"{"functions": [{
            "name": "main",
            "instrs": [
                {"op": "const", "dest": "x", "type": "int", "value": 1},
                {"op": "const", "dest": "x", "type": "int", "value": 2},
                {"op": "print", "args": ["x"]},
                {"op": "ret"}
            ]
        }]}"#,
    );
    let out = gvn(program);
    assert_eq!(is_ssa(&out.0), Ok(()));
}
