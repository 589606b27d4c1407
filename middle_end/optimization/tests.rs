// Shared helpers for the optimization pass tests.

use crate::commons::Valid;
use crate::middle_end::ir::{Instruction, Op, Program};

mod gvn;
mod induction_variables;
mod inlining;
mod trace;
mod unroll;

pub(crate) fn parse(json: &str) -> Valid<Program> {
    serde_json::from_str::<Program>(json)
        .expect("test program parses")
        .validate()
        .expect("test program validates")
}

pub(crate) fn ops_of(program: &Program, func: &str) -> Vec<Op> {
    program
        .get_function(func)
        .expect("function exists")
        .instrs
        .iter()
        .filter_map(Instruction::op)
        .collect()
}

pub(crate) fn count_op(program: &Program, op: Op) -> usize {
    program
        .functions
        .iter()
        .flat_map(|f| f.instrs.iter())
        .filter(|i| i.is(op))
        .count()
}
