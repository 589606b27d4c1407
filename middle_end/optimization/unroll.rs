//! Loop unrolling.
//!
//! Full unrolling handles counted loops of a narrow shape: single exit
//! through the header, not nested, one comparison in the header between
//! the iteration variable and an invariant integer bound, one `i ± 1`
//! update in the body, one back jump, and a constant start value found in
//! the header's strict dominators.  The trip count comes from the closed
//! form; loops with trip ≤ 1 are left alone.
//!
//! Partial unrolling replicates header+body a fixed number of times and
//! keeps every guard branch, so it needs no trip-count proof.

use std::collections::BTreeSet as Set;

use log::debug;

use crate::commons::Valid;

use super::super::cfg::{form_cfg, join_cfg, Cfg};
use super::super::dominators::{natural_loops, Dominators, NaturalLoop};
use super::super::ir::{Function, Instruction, Label, Literal, Op, Program, Var};

#[derive(Clone, Debug)]
struct CountedLoop {
    header: Label,
    /// body blocks in textual order (header excluded)
    body: Vec<Label>,
    /// label the header branches to inside the loop
    body_entry: Label,
    /// label the header branches to outside the loop
    exit_target: Label,
    /// block and index of the single back jump
    back_jump: (Label, usize),
    trip: i64,
}

fn unique_const_def_of(func: &Function, var: &Var) -> Option<i64> {
    let mut defs = func.instrs.iter().filter(|i| i.dest() == Some(var));
    let first = defs.next()?;
    if defs.next().is_some() {
        return None;
    }
    match (first.op(), first.as_code().and_then(|c| c.value)) {
        (Some(Op::Const), Some(Literal::Int(n))) => Some(n),
        _ => None,
    }
}

/// The most recent constant assignment to `var` walking up the strict
/// dominators of `header`.
fn start_value(
    cfg: &Cfg,
    dominators: &Dominators,
    header: &Label,
    var: &Var,
) -> Option<i64> {
    let mut block = header.clone();
    loop {
        let parent = dominators.idom.get(&block)?.clone();
        if parent == block {
            return None;
        }
        for instr in cfg[&parent].instrs.iter().rev() {
            if instr.dest() == Some(var) {
                return match (instr.op(), instr.as_code().and_then(|c| c.value)) {
                    (Some(Op::Const), Some(Literal::Int(n))) => Some(n),
                    _ => None,
                };
            }
        }
        block = parent;
    }
}

/// Closed-form trip count for `i cmp_op end` with a ±1 step.  `None`
/// means unknown or unbounded.
fn trip_count(start: i64, end: i64, cmp_op: Op, step: i64) -> Option<i64> {
    let trips = match (cmp_op, step) {
        (Op::Eq, _) => {
            if start == end {
                1
            } else {
                0
            }
        }
        (Op::Lt, 1) => (end - start).max(0),
        (Op::Le, 1) => (end - start + 1).max(0),
        (Op::Gt, 1) | (Op::Ge, 1) => {
            // counting up while staying above the bound never terminates
            // unless it is false from the start
            if start > end || (cmp_op == Op::Ge && start == end) {
                return None;
            }
            0
        }
        (Op::Gt, -1) => (start - end).max(0),
        (Op::Ge, -1) => (start - end + 1).max(0),
        (Op::Lt, -1) | (Op::Le, -1) => {
            if start < end || (cmp_op == Op::Le && start == end) {
                return None;
            }
            0
        }
        _ => return None,
    };
    Some(trips)
}

fn mirror(op: Op) -> Op {
    match op {
        Op::Lt => Op::Gt,
        Op::Gt => Op::Lt,
        Op::Le => Op::Ge,
        Op::Ge => Op::Le,
        other => other,
    }
}

fn detect(func: &Function) -> Option<CountedLoop> {
    let cfg = form_cfg(&func.instrs);
    let loops = natural_loops(&cfg);
    let dominators = Dominators::compute(&cfg);

    'candidates: for candidate in &loops {
        // not nested
        for other in &loops {
            if other.header != candidate.header
                && other.blocks.intersection(&candidate.blocks).next().is_some()
            {
                continue 'candidates;
            }
        }
        // single exit, through the header
        if candidate.exits.len() != 1 || candidate.exits[0].0 != candidate.header {
            continue;
        }

        let header_data = &cfg[&candidate.header];
        let Some(Instruction::Code(br)) = header_data.instrs.last().cloned() else {
            continue;
        };
        if br.op != Op::Br {
            continue;
        }
        let (body_entry, exit_target, continue_on_true) =
            if candidate.blocks.contains(&br.labels[0]) {
                (br.labels[0].clone(), br.labels[1].clone(), true)
            } else {
                (br.labels[1].clone(), br.labels[0].clone(), false)
            };

        // exactly one comparison in the header, defining the branch cond
        let cmps: Vec<&Instruction> = header_data
            .instrs
            .iter()
            .filter(|i| i.op().map(|o| o.is_cmp()).unwrap_or(false))
            .collect();
        if cmps.len() != 1 || cmps[0].dest() != Some(&br.args[0]) {
            continue;
        }
        let cmp = cmps[0].as_code().unwrap();

        // exactly one i ± 1 update in the loop
        let mut updates = vec![];
        for block in &candidate.blocks {
            for instr in &cfg[block].instrs {
                let Some(code) = instr.as_code() else { continue };
                if !matches!(code.op, Op::Add | Op::Sub) {
                    continue;
                }
                let Some(dest) = &code.dest else { continue };
                let [a, b] = &code.args[..] else { continue };
                let bump = if a == dest {
                    b
                } else if b == dest && code.op == Op::Add {
                    a
                } else {
                    continue;
                };
                if unique_const_def_of(func, bump) == Some(1) {
                    let step = if code.op == Op::Add { 1 } else { -1 };
                    updates.push((dest.clone(), step));
                }
            }
        }
        if updates.len() != 1 {
            continue;
        }
        let (iter_var, step) = updates[0].clone();

        // the comparison relates i and an invariant bound
        let [lhs, rhs] = &cmp.args[..] else { continue };
        let (bound_var, op_normalized) = if *lhs == iter_var {
            (rhs, cmp.op)
        } else if *rhs == iter_var {
            (lhs, mirror(cmp.op))
        } else {
            continue;
        };
        let Some(end) = unique_const_def_of(func, bound_var) else {
            continue;
        };
        if !continue_on_true {
            // the loop runs while the condition is false; only the
            // equality shape has no representable negation
            continue;
        }

        // exactly one back jump to the header
        let mut back_jumps = vec![];
        for block in &candidate.blocks {
            for (idx, instr) in cfg[block].instrs.iter().enumerate() {
                if instr.is(Op::Jmp) && instr.labels()[0] == candidate.header {
                    back_jumps.push((block.clone(), idx));
                }
            }
        }
        if back_jumps.len() != 1 {
            continue;
        }

        let Some(start) = start_value(&cfg, &dominators, &candidate.header, &iter_var) else {
            continue;
        };
        let Some(trip) = trip_count(start, end, op_normalized, step) else {
            continue;
        };
        if trip <= 1 {
            continue;
        }

        let body: Vec<Label> = cfg
            .keys()
            .filter(|b| candidate.blocks.contains(*b) && **b != candidate.header)
            .cloned()
            .collect();
        debug!(
            "unroll: counted loop at {} with trip count {trip}",
            candidate.header
        );
        return Some(CountedLoop {
            header: candidate.header.clone(),
            body,
            body_entry,
            exit_target,
            back_jump: back_jumps[0].clone(),
            trip,
        });
    }
    None
}

fn renamed(label: &Label, iteration: i64) -> Label {
    format!("{label}.unroll.{iteration}")
}

fn apply(func: &mut Function, plan: &CountedLoop) {
    let mut cfg = form_cfg(&func.instrs);
    let loop_labels: Set<&Label> = plan.body.iter().chain([&plan.header]).collect();

    // copies for iterations 2..trip, then one residual header copy; the
    // original back jump is rewired only after the copies are taken
    let mut appended: Vec<(Label, Vec<Instruction>)> = vec![];
    for k in 1..plan.trip {
        for block in &plan.body {
            let mut instrs = cfg[block].instrs.clone();
            for instr in instrs.iter_mut() {
                match instr {
                    Instruction::Label { label } => *label = renamed(label, k),
                    Instruction::Code(code) => {
                        for target in code.labels.iter_mut() {
                            if *target == plan.header {
                                *target = if k + 1 < plan.trip {
                                    renamed(&plan.body_entry, k + 1)
                                } else {
                                    renamed(&plan.header, plan.trip)
                                };
                            } else if loop_labels.contains(target) {
                                *target = renamed(target, k);
                            }
                        }
                    }
                }
            }
            appended.push((renamed(block, k), instrs));
        }
    }
    let mut residual = cfg[&plan.header].instrs.clone();
    for instr in residual.iter_mut() {
        if let Instruction::Label { label } = instr {
            *label = renamed(label, plan.trip);
        }
    }
    residual.pop(); // the branch
    residual.push(Instruction::jmp(plan.exit_target.clone()));
    appended.push((renamed(&plan.header, plan.trip), residual));

    // the original back jump chains into the first copy
    {
        let (block, idx) = &plan.back_jump;
        cfg[block].instrs[*idx] = Instruction::jmp(renamed(&plan.body_entry, 1));
    }

    // splice the copies after the last loop block
    let after = plan
        .body
        .iter()
        .chain([&plan.header])
        .map(|b| cfg.get_index_of(b).unwrap())
        .max()
        .unwrap();
    let mut at = after + 1;
    for (label, instrs) in appended {
        cfg.shift_insert(at, label, super::super::cfg::BlockData {
            instrs,
            preds: vec![],
            succs: vec![],
        });
        at += 1;
    }

    func.instrs = join_cfg(&cfg);
}

/// Fully unroll every counted loop that keeps qualifying.
pub fn fully_unroll(program: Valid<Program>) -> Valid<Program> {
    let mut program = program.0;
    for func in &mut program.functions {
        while let Some(plan) = detect(func) {
            apply(func, &plan);
        }
    }
    program.validate().expect("unroll produced malformed IR")
}

/// Replicate header+body `factor` times, keeping the guard branches.
pub fn partial_unroll(program: Valid<Program>, factor: usize) -> Valid<Program> {
    let mut program = program.0;
    for func in &mut program.functions {
        partial_unroll_func(func, factor);
    }
    program.validate().expect("unroll produced malformed IR")
}

fn partial_unroll_func(func: &mut Function, factor: usize) {
    if factor == 0 {
        return;
    }
    let cfg = form_cfg(&func.instrs);
    let loops = natural_loops(&cfg);
    // one loop at a time; the label remapping below does not compose
    let Some(candidate) = loops.iter().find(|l| simple_loop(&cfg, l)) else {
        return;
    };
    let mut cfg = cfg;

    let body: Vec<Label> = cfg
        .keys()
        .filter(|b| candidate.blocks.contains(*b))
        .cloned()
        .collect();
    let (tail, _) = candidate.back_edges[0].clone();

    let mut appended = vec![];
    for k in 1..=factor as i64 {
        for block in &body {
            let mut instrs = cfg[block].instrs.clone();
            for instr in instrs.iter_mut() {
                match instr {
                    Instruction::Label { label } => *label = renamed(label, k),
                    Instruction::Code(code) => {
                        for target in code.labels.iter_mut() {
                            if *target == candidate.header && *block == tail {
                                // replica back jump: next replica, or back
                                // around to the original header
                                *target = if k < factor as i64 {
                                    renamed(&candidate.header, k + 1)
                                } else {
                                    candidate.header.clone()
                                };
                            } else if candidate.blocks.contains(target) {
                                *target = renamed(target, k);
                            }
                        }
                    }
                }
            }
            appended.push((renamed(block, k), instrs));
        }
    }

    // original back jump enters the first replica
    let back_idx = cfg[&tail]
        .instrs
        .iter()
        .position(|i| i.is(Op::Jmp) && i.labels()[0] == candidate.header)
        .expect("simple loop ends in a back jump");
    cfg[&tail].instrs[back_idx] = Instruction::jmp(renamed(&candidate.header, 1));

    let after = body.iter().map(|b| cfg.get_index_of(b).unwrap()).max().unwrap();
    let mut at = after + 1;
    for (label, instrs) in appended {
        cfg.shift_insert(at, label, super::super::cfg::BlockData {
            instrs,
            preds: vec![],
            succs: vec![],
        });
        at += 1;
    }
    func.instrs = join_cfg(&cfg);
}

/// Loops the partial mode can replicate: one back edge whose tail ends in
/// an explicit jump, and header-only exits.
fn simple_loop(cfg: &Cfg, natural_loop: &NaturalLoop) -> bool {
    if natural_loop.back_edges.len() != 1 {
        return false;
    }
    let (tail, header) = &natural_loop.back_edges[0];
    let jumps_back = cfg[tail]
        .instrs
        .last()
        .map(|i| i.is(Op::Jmp) && i.labels()[0] == *header)
        .unwrap_or(false);
    jumps_back
        && natural_loop
            .exits
            .iter()
            .all(|(inside, _)| inside == &natural_loop.header)
}
