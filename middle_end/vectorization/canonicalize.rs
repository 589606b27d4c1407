//! Run canonicalization: reorder adjacent independent arithmetic so
//! same-opcode groups become contiguous, and float constants and copies
//! up to the top of their block so runs are not interrupted.

use crate::commons::Valid;

use super::super::cfg::{form_blocks, join_blocks};
use super::super::ir::{Instruction, Op, Program};

/// Divisions sort to the front of their group so a division never moves
/// below code that might change whether it executes.
fn rank(op: Op) -> u8 {
    match op {
        Op::Div => 0,
        Op::Add => 1,
        Op::Sub => 2,
        Op::Mul => 3,
        _ => u8::MAX,
    }
}

fn reorderable(instr: &Instruction) -> bool {
    matches!(
        instr.op(),
        Some(Op::Add) | Some(Op::Sub) | Some(Op::Mul) | Some(Op::Div)
    ) && instr.dest().is_some()
}

fn independent(a: &Instruction, b: &Instruction) -> bool {
    let a_dest = a.dest().unwrap();
    let b_dest = b.dest().unwrap();
    a_dest != b_dest && !b.args().contains(a_dest) && !a.args().contains(b_dest)
}

fn sort_block(instrs: &mut [Instruction]) {
    let mut changed = true;
    while changed {
        changed = false;
        for i in 1..instrs.len() {
            let (a, b) = (&instrs[i - 1], &instrs[i]);
            if reorderable(a)
                && reorderable(b)
                && independent(a, b)
                && rank(b.op().unwrap()) < rank(a.op().unwrap())
            {
                instrs.swap(i - 1, i);
                changed = true;
            }
        }
    }
}

/// Group adjacent independent arithmetic by opcode.
pub fn canonicalize(program: Valid<Program>) -> Valid<Program> {
    let mut program = program.0;
    for func in &mut program.functions {
        let mut blocks = form_blocks(&func.instrs);
        for block in &mut blocks {
            sort_block(block);
        }
        func.instrs = join_blocks(blocks);
    }
    program
        .validate()
        .expect("canonicalization produced malformed IR")
}

/// Barriers a constant or copy may not float past.
fn movement_barrier(instr: &Instruction) -> bool {
    instr.is_label()
        || instr.is_phi()
        || instr.is_terminator()
        || matches!(instr.op(), Some(Op::Speculate) | Some(Op::Commit) | Some(Op::Guard))
}

fn float_up_block(instrs: &mut [Instruction]) {
    let mut changed = true;
    while changed {
        changed = false;
        for i in 1..instrs.len() {
            let mover = &instrs[i];
            if !(mover.is_const() || mover.is_id()) || mover.dest().is_none() {
                continue;
            }
            let above = &instrs[i - 1];
            if movement_barrier(above) {
                continue;
            }
            // constants and copies keep their relative order
            if above.is_const() || above.is_id() {
                continue;
            }
            let dest = mover.dest().unwrap();
            let blocked = above.dest() == Some(dest)
                || above.args().contains(dest)
                || mover.args().iter().any(|arg| above.dest() == Some(arg));
            if !blocked {
                instrs.swap(i - 1, i);
                changed = true;
            }
        }
    }
}

/// Move constants and copies as early in their block as their operands
/// allow.
pub fn constant_movement(program: Valid<Program>) -> Valid<Program> {
    let mut program = program.0;
    for func in &mut program.functions {
        let mut blocks = form_blocks(&func.instrs);
        for block in &mut blocks {
            float_up_block(block);
        }
        func.instrs = join_blocks(blocks);
    }
    program
        .validate()
        .expect("constant movement produced malformed IR")
}
