//! Loop-invariant code motion.
//!
//! Preheaders first: one per natural-loop header, wired so only
//! non-back-edge predecessors go through it.  Invariance is a fixpoint
//! over the loop body; hoisting applies the safety filter (dominates its
//! uses, sole definition, dominates the exits or dead afterwards) and
//! moves instructions in dependency order.

use std::collections::{BTreeMap as Map, BTreeSet as Set};

use log::debug;

use crate::commons::{NameSupply, Valid};

use super::super::analysis::live_variables;
use super::super::cfg::{form_cfg, insert_preheader, join_cfg, Cfg};
use super::super::dominators::{natural_loops, Dominators, NaturalLoop};
use super::super::ir::{Function, Instruction, Label, Op, Program, Var};

type InstrAt = (Label, usize);

/// Pure valued operations that may move.
fn hoistable_op(op: Op) -> bool {
    op == Op::Const || op == Op::Id || op.is_core_binop() || op.is_core_unop()
}

fn defs_in_loop(cfg: &Cfg, natural_loop: &NaturalLoop) -> Map<Var, Vec<InstrAt>> {
    let mut defs: Map<Var, Vec<InstrAt>> = Map::new();
    for block in &natural_loop.blocks {
        for (idx, instr) in cfg[block].instrs.iter().enumerate() {
            if let Some(dest) = instr.dest() {
                defs.entry(dest.clone()).or_default().push((block.clone(), idx));
            }
        }
    }
    defs
}

/// Fixpoint classification of loop-invariant instructions.
fn invariant_instrs(cfg: &Cfg, natural_loop: &NaturalLoop) -> Set<InstrAt> {
    let defs = defs_in_loop(cfg, natural_loop);
    let mut invariant: Set<InstrAt> = Set::new();

    let mut changed = true;
    while changed {
        changed = false;
        for block in &natural_loop.blocks {
            for (idx, instr) in cfg[block].instrs.iter().enumerate() {
                let at = (block.clone(), idx);
                if invariant.contains(&at) {
                    continue;
                }
                let Some(code) = instr.as_code() else { continue };
                let Some(dest) = &code.dest else { continue };
                if !hoistable_op(code.op) {
                    continue;
                }
                let sole_def = defs[dest].len() == 1;
                let ok = if code.op == Op::Const {
                    sole_def
                } else {
                    sole_def
                        && code.args.iter().all(|arg| match defs.get(arg) {
                            // reaching in from outside the loop
                            None => true,
                            // or defined exactly once, by an invariant
                            Some(sites) => {
                                sites.len() == 1 && invariant.contains(&sites[0])
                            }
                        })
                };
                if ok {
                    invariant.insert(at);
                    changed = true;
                }
            }
        }
    }
    invariant
}

fn uses_in_loop(cfg: &Cfg, natural_loop: &NaturalLoop, var: &Var) -> Vec<InstrAt> {
    let mut uses = vec![];
    for block in &natural_loop.blocks {
        for (idx, instr) in cfg[block].instrs.iter().enumerate() {
            if instr.args().contains(var) {
                uses.push((block.clone(), idx));
            }
        }
    }
    uses
}

/// The safe-to-hoist filter from the design notes.
fn safe_to_hoist(
    cfg: &Cfg,
    dominators: &Dominators,
    live: &super::super::dataflow::Solution<Set<Var>>,
    natural_loop: &NaturalLoop,
    at: &InstrAt,
) -> bool {
    let (block, idx) = at;
    let instr = &cfg[block].instrs[*idx];
    let dest = instr.dest().expect("hoist candidates define");

    // (1) dominate every use inside the loop
    for (use_block, use_idx) in uses_in_loop(cfg, natural_loop, dest) {
        if use_block == *block {
            if use_idx < *idx {
                return false;
            }
        } else if !dominators.dominates(block, &use_block) {
            return false;
        }
    }

    // (2) sole definition of its destination in the loop
    let defs = defs_in_loop(cfg, natural_loop);
    if defs[dest].len() != 1 {
        return false;
    }

    // (3) dominate every exit, or be dead after the loop
    let dominates_exits = natural_loop
        .exits
        .iter()
        .all(|(inside, _)| dominators.dominates(block, inside));
    if dominates_exits {
        return true;
    }
    natural_loop
        .exits
        .iter()
        .all(|(_, outside)| !live.input[outside].contains(dest))
}

fn hoist_loop(
    cfg: &mut Cfg,
    dominators: &Dominators,
    live: &super::super::dataflow::Solution<Set<Var>>,
    natural_loop: &NaturalLoop,
    preheader: &Label,
) {
    let invariant = invariant_instrs(cfg, natural_loop);
    let chosen: Set<InstrAt> = invariant
        .iter()
        .filter(|at| safe_to_hoist(cfg, dominators, live, natural_loop, at))
        .cloned()
        .collect();
    if chosen.is_empty() {
        return;
    }

    // dependency-ordered emission into the preheader
    let defs = defs_in_loop(cfg, natural_loop);
    let mut emitted: Vec<InstrAt> = vec![];
    fn emit(
        at: &InstrAt,
        cfg: &Cfg,
        defs: &Map<Var, Vec<InstrAt>>,
        chosen: &Set<InstrAt>,
        emitted: &mut Vec<InstrAt>,
    ) {
        if emitted.contains(at) {
            return;
        }
        let instr = &cfg[&at.0].instrs[at.1];
        for arg in instr.args() {
            if let Some(sites) = defs.get(arg) {
                if sites.len() == 1 && chosen.contains(&sites[0]) {
                    emit(&sites[0], cfg, defs, chosen, emitted);
                }
            }
        }
        emitted.push(at.clone());
    }
    for at in &chosen {
        emit(at, cfg, &defs, &chosen, &mut emitted);
    }

    let moved: Vec<Instruction> = emitted
        .iter()
        .map(|(block, idx)| cfg[block].instrs[*idx].clone())
        .collect();
    for instr in &moved {
        debug!("licm: hoisting {instr} into {preheader}");
    }

    // delete from the loop body, highest index first per block
    let mut by_block: Map<&Label, Vec<usize>> = Map::new();
    for (block, idx) in &emitted {
        by_block.entry(block).or_default().push(*idx);
    }
    let by_block: Vec<(Label, Vec<usize>)> = by_block
        .into_iter()
        .map(|(b, mut idxs)| {
            idxs.sort_unstable_by(|a, b| b.cmp(a));
            (b.clone(), idxs)
        })
        .collect();
    for (block, idxs) in by_block {
        for idx in idxs {
            cfg[&block].instrs.remove(idx);
        }
    }

    // place before the preheader's jump to the header
    let pre_instrs = &mut cfg[preheader].instrs;
    let at = pre_instrs.len() - 1;
    for instr in moved.into_iter().rev() {
        pre_instrs.insert(at, instr);
    }
}

fn func_licm(func: &mut Function, supply: &mut NameSupply) {
    let mut cfg = form_cfg(&func.instrs);
    let loops = natural_loops(&cfg);
    if loops.is_empty() {
        return;
    }

    let mut preheaders: Map<Label, Label> = Map::new();
    for natural_loop in &loops {
        // one preheader per header, even when back edges are shared
        if !preheaders.contains_key(&natural_loop.header) {
            let pre = insert_preheader(&mut cfg, &natural_loop.header, &natural_loop.tails(), supply);
            preheaders.insert(natural_loop.header.clone(), pre);
        }
    }

    // an inner loop's preheader sits inside every enclosing loop
    let mut loops = loops;
    for natural_loop in &mut loops {
        for (header, pre) in &preheaders {
            if *header != natural_loop.header && natural_loop.blocks.contains(header) {
                natural_loop.blocks.insert(pre.clone());
            }
        }
    }

    let dominators = Dominators::compute(&cfg);
    let live = live_variables::analyze_cfg(&cfg);
    for natural_loop in &loops {
        let preheader = preheaders[&natural_loop.header].clone();
        hoist_loop(&mut cfg, &dominators, &live, natural_loop, &preheader);
    }

    func.instrs = join_cfg(&cfg);
}

/// The actual pass.
pub fn licm(program: Valid<Program>) -> Valid<Program> {
    let mut program = program.0;
    let mut supply = NameSupply::new();
    for func in &mut program.functions {
        func_licm(func, &mut supply);
    }
    program.validate().expect("licm produced malformed IR")
}
