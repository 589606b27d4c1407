//! Naive packing: every run gets freshly zeroed input vectors, lane
//! loads, one vector operation, and lane stores back into the scalar
//! destinations.  Nothing is reused between runs.

use crate::commons::{NameSupply, Valid};

use super::super::cfg::{form_blocks, join_blocks};
use super::super::ir::{Instruction, Op, Program, Type, Var};
use super::runs::{build_runs, Run};

/// Triples (dest, left, right) for the members of a run.
pub fn run_triples(instrs: &[Instruction], run: &Run) -> Vec<(Var, Var, Var)> {
    run.members
        .iter()
        .map(|m| {
            let code = instrs[*m].as_code().unwrap();
            (
                code.dest.clone().unwrap(),
                code.args[0].clone(),
                code.args[1].clone(),
            )
        })
        .collect()
}

fn load_lanes(out: &mut Vec<Instruction>, args: &[Var], supply: &mut NameSupply) -> Var {
    let vec_name = supply.suffixed("new_vector_var");
    out.push(Instruction::veczero(vec_name.clone()));
    let one = supply.suffixed("one");
    out.push(Instruction::const_int(one.clone(), 1));
    let mut idx = supply.suffixed("new_vector_idx");
    out.push(Instruction::const_int(idx.clone(), 0));
    for (lane, arg) in args.iter().enumerate() {
        out.push(Instruction::vecload(vec_name.clone(), idx.clone(), arg.clone()));
        if lane + 1 < args.len() {
            let next = supply.suffixed("new_vector_idx");
            out.push(Instruction::binop(
                Op::Add,
                next.clone(),
                Type::Int,
                idx.clone(),
                one.clone(),
            ));
            idx = next;
        }
    }
    vec_name
}

fn store_lanes(out: &mut Vec<Instruction>, result: &Var, dests: &[Var], supply: &mut NameSupply) {
    let one = supply.suffixed("one");
    out.push(Instruction::const_int(one.clone(), 1));
    let mut idx = supply.suffixed("new_vector_idx");
    out.push(Instruction::const_int(idx.clone(), 0));
    for (lane, dest) in dests.iter().enumerate() {
        out.push(Instruction::vecstore(dest.clone(), result.clone(), idx.clone()));
        if lane + 1 < dests.len() {
            let next = supply.suffixed("new_vector_idx");
            out.push(Instruction::binop(
                Op::Add,
                next.clone(),
                Type::Int,
                idx.clone(),
                one.clone(),
            ));
            idx = next;
        }
    }
}

fn pack_run(instrs: &[Instruction], run: &Run, supply: &mut NameSupply) -> Vec<Instruction> {
    let triples = run_triples(instrs, run);
    let lefts: Vec<Var> = triples.iter().map(|t| t.1.clone()).collect();
    let rights: Vec<Var> = triples.iter().map(|t| t.2.clone()).collect();
    let dests: Vec<Var> = triples.iter().map(|t| t.0.clone()).collect();

    let mut out = vec![];
    let left_vec = load_lanes(&mut out, &lefts, supply);
    let right_vec = load_lanes(&mut out, &rights, supply);
    let result = supply.suffixed("result_vector_var");
    out.push(Instruction::vecbinop(
        run.op.vec_op().expect("run ops have vector counterparts"),
        result.clone(),
        left_vec,
        right_vec,
    ));
    store_lanes(&mut out, &result, &dests, supply);
    out
}

/// Replace each run in each block with its packed form, emitted at the
/// position of the run's last member.
pub fn replace_runs(
    block: Vec<Instruction>,
    packed: Vec<(Run, Vec<Instruction>)>,
) -> Vec<Instruction> {
    let mut out = vec![];
    for (i, instr) in block.into_iter().enumerate() {
        let mut consumed = false;
        for (run, code) in &packed {
            if run.members.last() == Some(&i) {
                out.extend(code.iter().cloned());
                consumed = true;
            } else if run.members.contains(&i) {
                consumed = true;
            }
        }
        if !consumed {
            out.push(instr);
        }
    }
    out
}

/// The actual strategy.
pub fn naive_vectorize(program: Valid<Program>) -> Valid<Program> {
    let mut program = program.0;
    let mut supply = NameSupply::new();
    for func in &mut program.functions {
        let blocks = form_blocks(&func.instrs);
        let mut new_blocks = vec![];
        for block in blocks {
            let runs = build_runs(&block);
            let packed: Vec<(Run, Vec<Instruction>)> = runs
                .into_iter()
                .map(|run| {
                    let code = pack_run(&block, &run, &mut supply);
                    (run, code)
                })
                .collect();
            new_blocks.push(replace_runs(block, packed));
        }
        func.instrs = join_blocks(new_blocks);
    }
    program.validate().expect("vectorization produced malformed IR")
}
