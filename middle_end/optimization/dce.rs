//! Dead code elimination, three ways: delete-unused, local
//! overwrite-before-use, and aggressive (control-dependence driven) DCE.

use std::collections::{BTreeMap as Map, BTreeSet as Set};

use indexmap::IndexMap;
use log::debug;

use crate::commons::Valid;

use super::super::cfg::{
    add_unique_exit, form_blocks, form_cfg, join_blocks, join_cfg, reverse_cfg,
};
use super::super::dominators::{back_edges, Dominators};
use super::super::ir::{Function, Instruction, Label, Op, Program, Var};
use super::super::ssa::{ensure_ssa, is_ssa};

// SECTION: trivial fixpoint modes

fn delete_unused_once(program: &mut Program) -> bool {
    let mut changed = false;
    for func in &mut program.functions {
        let mut written: Set<Var> = func
            .instrs
            .iter()
            .filter_map(|i| i.dest().cloned())
            .collect();
        for instr in &func.instrs {
            for arg in instr.args() {
                written.remove(arg);
            }
        }
        // `written` now holds variables assigned but never read
        let before = func.instrs.len();
        func.instrs.retain(|instr| match instr.dest() {
            Some(dest) => !written.contains(dest),
            None => true,
        });
        changed |= func.instrs.len() != before;
    }
    changed
}

fn local_once(program: &mut Program) -> bool {
    let mut changed = false;
    for func in &mut program.functions {
        let blocks = form_blocks(&func.instrs);
        let mut new_blocks = vec![];
        for block in blocks {
            // index of each variable's pending definition and whether it
            // has been read since
            let mut pending: Map<&Var, (usize, bool)> = Map::new();
            let mut delete: Set<usize> = Set::new();
            for (idx, instr) in block.iter().enumerate() {
                for arg in instr.args() {
                    if let Some((_, used)) = pending.get_mut(arg) {
                        *used = true;
                    }
                }
                if let Some(dest) = instr.dest() {
                    if let Some((def_idx, used)) = pending.get(dest) {
                        if !used {
                            delete.insert(*def_idx);
                        }
                    }
                    pending.insert(dest, (idx, false));
                }
            }
            changed |= !delete.is_empty();
            new_blocks.push(
                block
                    .iter()
                    .enumerate()
                    .filter(|(idx, _)| !delete.contains(idx))
                    .map(|(_, instr)| instr.clone())
                    .collect(),
            );
        }
        func.instrs = join_blocks(new_blocks);
    }
    changed
}

fn iterate(program: &mut Program, step: fn(&mut Program) -> bool) {
    while step(program) {}
}

/// Delete instructions whose destination is never read, to fixpoint.
pub fn delete_unused(program: Valid<Program>) -> Valid<Program> {
    let mut program = program.0;
    iterate(&mut program, delete_unused_once);
    program.validate().expect("dce produced malformed IR")
}

/// Per-block elimination of definitions overwritten before any read.
pub fn local_dce(program: Valid<Program>) -> Valid<Program> {
    let mut program = program.0;
    iterate(&mut program, local_once);
    program.validate().expect("dce produced malformed IR")
}

/// The default trivial wrapper: local then global, each to fixpoint.
pub fn dce(program: Valid<Program>, global_delete: bool, local_delete: bool) -> Valid<Program> {
    let mut program = program.0;
    if local_delete || !global_delete {
        iterate(&mut program, local_once);
    }
    if global_delete || !local_delete {
        iterate(&mut program, delete_unused_once);
    }
    program.validate().expect("dce produced malformed IR")
}

// SECTION: aggressive DCE

/// Opcodes that are live by themselves: observable effects the sweep must
/// never remove.
fn is_root(op: Op) -> bool {
    matches!(
        op,
        Op::Print
            | Op::Call
            | Op::Ret
            | Op::Store
            | Op::Free
            | Op::Alloc
            | Op::Speculate
            | Op::Commit
            | Op::Guard
    )
}

type InstrAt = (Label, usize);

fn fresh_exit_name(cfg: &IndexMap<Label, super::super::cfg::BlockData>) -> String {
    let mut name = "exit.unique".to_string();
    while cfg.contains_key(&name) {
        name.push('.');
    }
    name
}

fn adce_func(func: &mut Function, safe: bool) {
    let cfg = form_cfg(&func.instrs);

    // post-dominance: reverse the CFG against a unique pseudo-exit and run
    // the dominance engine; the frontier there is control dependence
    let mut with_exit = cfg.clone();
    let exit_name = fresh_exit_name(&with_exit);
    add_unique_exit(&mut with_exit, &exit_name);
    let mut reversed = reverse_cfg(&with_exit);
    let exit_index = reversed.get_index_of(&exit_name).unwrap();
    reversed.move_index(exit_index, 0);
    let postdom = Dominators::compute(&reversed);

    let dominators = Dominators::compute(&cfg);
    let tails: Set<Label> = back_edges(&cfg, &dominators)
        .into_iter()
        .map(|(t, _)| t)
        .collect();

    // definition sites (SSA: at most one per variable)
    let mut def_site: Map<Var, InstrAt> = Map::new();
    let mut term_site: Map<Label, InstrAt> = Map::new();
    for (name, data) in &cfg {
        for (idx, instr) in data.instrs.iter().enumerate() {
            if let Some(dest) = instr.dest() {
                def_site.insert(dest.clone(), (name.clone(), idx));
            }
            if instr.is_terminator() {
                term_site.insert(name.clone(), (name.clone(), idx));
            }
        }
    }

    // mark
    let mut live: Set<InstrAt> = Set::new();
    let mut worklist: Vec<InstrAt> = vec![];
    for (name, data) in &cfg {
        for (idx, instr) in data.instrs.iter().enumerate() {
            let rooted = instr.op().map(is_root).unwrap_or(false)
                || (safe && instr.is_terminator() && tails.contains(name));
            if rooted {
                worklist.push((name.clone(), idx));
            }
        }
    }
    while let Some(at) = worklist.pop() {
        if !live.insert(at.clone()) {
            continue;
        }
        let (name, idx) = &at;
        let instr = &cfg[name].instrs[*idx];
        for arg in instr.args() {
            if let Some(site) = def_site.get(arg) {
                worklist.push(site.clone());
            }
        }
        // the terminators this instruction is control-dependent on
        for controlling in &postdom.frontier[name] {
            if let Some(site) = term_site.get(controlling) {
                worklist.push(site.clone());
            }
        }
    }

    // sweep
    let mut swept = cfg;
    for (name, data) in swept.iter_mut() {
        let mut kept = vec![];
        for (idx, instr) in data.instrs.iter().enumerate() {
            let marked = live.contains(&(name.clone(), idx));
            match instr.op() {
                None => kept.push(instr.clone()), // labels stay
                Some(Op::Jmp) | Some(Op::Ret) => kept.push(instr.clone()),
                Some(Op::Br) => {
                    if marked {
                        kept.push(instr.clone());
                    } else {
                        // the branch decides nothing live: fall straight
                        // to the immediate postdominator
                        match postdom.idom.get(name) {
                            Some(target) if target != &exit_name && target != name => {
                                debug!("adce: rewriting dead branch in {name} to jmp {target}");
                                kept.push(Instruction::jmp(target.clone()));
                            }
                            _ => kept.push(instr.clone()),
                        }
                    }
                }
                Some(_) => {
                    if marked {
                        kept.push(instr.clone());
                    }
                }
            }
        }
        data.instrs = kept;
    }

    func.instrs = join_cfg(&swept);
}

fn adce_mode(program: Valid<Program>, safe: bool) -> Valid<Program> {
    let program = ensure_ssa(program);
    let mut program = program.0;
    for func in &mut program.functions {
        adce_func(func, safe);
    }
    is_ssa(&program).expect("adce must preserve SSA");
    program.validate().expect("adce produced malformed IR")
}

/// Aggressive DCE, safe variant: back edges stay live, so loops without
/// observable effects survive.
pub fn adce(program: Valid<Program>) -> Valid<Program> {
    adce_mode(program, true)
}

/// The unsafe variant drops back-edge preservation and will delete
/// side-effect-free infinite loops.
pub fn adce_unsafe(program: Valid<Program>) -> Valid<Program> {
    adce_mode(program, false)
}
