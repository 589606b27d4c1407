//! Sink stores toward the bottom of their block, as far as may-alias
//! information allows, so packs of arithmetic are not split by them.

use crate::commons::Valid;

use super::super::analysis::alias::{self, may_alias, Env};
use super::super::cfg::{form_cfg, join_cfg};
use super::super::ir::{Instruction, Program};

fn barrier(instr: &Instruction, store: &Instruction, env: &Env) -> bool {
    if instr.is_label() || instr.is_terminator() || instr.is_phi() {
        return true;
    }
    // a store may not move past anything redefining its operands
    if let Some(dest) = instr.dest() {
        if store.args().contains(dest) {
            return true;
        }
    }
    if instr.is_mem() {
        let store_ptr = &store.args()[0];
        if instr.is_load() || instr.is_store() {
            return may_alias(env, store_ptr, &instr.args()[0]);
        }
        // allocs, frees and pointer arithmetic are not moved across
        return true;
    }
    false
}

/// Walk the block bottom-up; every store sinks until it hits a barrier.
fn move_stores_block(instrs: &[Instruction], env: &Env) -> Vec<Instruction> {
    // reversed accumulator: the front holds the bottom of the block
    let mut reversed: Vec<Instruction> = vec![];
    for instr in instrs.iter().rev() {
        if !instr.is_store() {
            reversed.push(instr.clone());
            continue;
        }
        let mut hopped = vec![];
        loop {
            match reversed.last() {
                None => {
                    reversed.push(instr.clone());
                    break;
                }
                Some(below) if barrier(below, instr, env) => {
                    reversed.push(instr.clone());
                    break;
                }
                Some(_) => hopped.push(reversed.pop().unwrap()),
            }
        }
        reversed.extend(hopped);
    }
    reversed.reverse();
    reversed
}

/// The actual pass.
pub fn move_stores(program: Valid<Program>) -> Valid<Program> {
    let mut inner = program.0;
    for i in 0..inner.functions.len() {
        let func = &inner.functions[i];
        let cfg = form_cfg(&func.instrs);
        let solution = alias::analyze_cfg(func, &cfg);
        let mut cfg = cfg;
        for (name, data) in cfg.iter_mut() {
            data.instrs = move_stores_block(&data.instrs, &solution.output[name]);
        }
        inner.functions[i].instrs = join_cfg(&cfg);
    }
    inner
        .validate()
        .expect("store movement produced malformed IR")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::super::super::ir::{Code, Op, Type};
    use super::*;

    fn store(ptr: &str, val: &str) -> Instruction {
        Instruction::Code(Code {
            op: Op::Store,
            dest: None,
            typ: None,
            args: vec![ptr.into(), val.into()],
            funcs: vec![],
            labels: vec![],
            value: None,
        })
    }

    #[test]
    fn stores_sink_past_independent_arithmetic() {
        let program = Program {
            functions: vec![super::super::super::ir::Function {
                name: "main".into(),
                args: vec![],
                typ: None,
                instrs: vec![
                    Instruction::const_int("n", 1),
                    Instruction::Code(Code {
                        op: Op::Alloc,
                        dest: Some("p".into()),
                        typ: Some(Type::ptr_to(Type::Int)),
                        args: vec!["n".into()],
                        funcs: vec![],
                        labels: vec![],
                        value: None,
                    }),
                    store("p", "n"),
                    Instruction::binop(Op::Add, "x", Type::Int, "n", "n"),
                    Instruction::binop(Op::Add, "y", Type::Int, "n", "n"),
                    Instruction::ret(None),
                ],
            }],
        };
        let out = move_stores(program.validate().unwrap());
        let ops: Vec<Op> = out.0.functions[0]
            .instrs
            .iter()
            .filter_map(Instruction::op)
            .collect();
        assert_eq!(
            ops,
            vec![Op::Const, Op::Alloc, Op::Add, Op::Add, Op::Store, Op::Ret]
        );
    }
}
