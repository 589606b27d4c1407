//! Induction-variable strength reduction.
//!
//! A basic induction variable is `i = i + 1` with a single in-loop
//! definition.  A multiplied invariant is `a = c * i` with `c` invariant;
//! a derived induction variable is `j = a + d` with `d` a concrete
//! invariant integer constant.  Each derived variable is rewritten to a
//! running sum: `j := d` in the preheader, `j := j + c` next to `i`'s
//! update.

use std::collections::{BTreeMap as Map, BTreeSet as Set};

use log::debug;

use crate::commons::{NameSupply, Valid};

use super::super::cfg::{form_cfg, insert_preheader, join_cfg, Cfg};
use super::super::dominators::{natural_loops, Dominators, NaturalLoop};
use super::super::ir::{Function, Instruction, Label, Literal, Op, Program, Var};

type InstrAt = (Label, usize);

#[derive(Clone, Debug)]
struct BasicIv {
    var: Var,
    update: InstrAt,
}

#[derive(Clone, Debug)]
struct DerivedIv {
    var: Var,
    definition: InstrAt,
    /// the basic induction variable i in j = c*i + d
    basic: Var,
    /// the invariant multiplier c
    multiplier: Var,
    /// the concrete offset d
    offset: i64,
}

/// The unique constant-integer definition of `var` across the function,
/// if there is exactly one definition at all.
fn unique_const_def(func_instrs: &Map<Label, Vec<Instruction>>, var: &Var) -> Option<i64> {
    let mut defs = func_instrs
        .values()
        .flatten()
        .filter(|instr| instr.dest() == Some(var));
    let first = defs.next()?;
    if defs.next().is_some() {
        return None;
    }
    match (first.op(), first.as_code().and_then(|c| c.value)) {
        (Some(Op::Const), Some(Literal::Int(n))) => Some(n),
        _ => None,
    }
}

fn block_instrs(cfg: &Cfg) -> Map<Label, Vec<Instruction>> {
    cfg.iter()
        .map(|(name, data)| (name.clone(), data.instrs.clone()))
        .collect()
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

/// Basic IVs: `i = i + c` with the bump restricted to the literal 1.
fn find_basic_ivs(
    cfg: &Cfg,
    natural_loop: &NaturalLoop,
    instrs_by_block: &Map<Label, Vec<Instruction>>,
) -> Vec<BasicIv> {
    let defs = defs_in_loop(cfg, natural_loop);
    let mut basics = vec![];
    for block in &natural_loop.blocks {
        for (idx, instr) in cfg[block].instrs.iter().enumerate() {
            let Some(code) = instr.as_code() else { continue };
            if code.op != Op::Add {
                continue;
            }
            let Some(dest) = &code.dest else { continue };
            if defs[dest].len() != 1 {
                continue;
            }
            let [a, b] = &code.args[..] else { continue };
            let bump = if a == dest {
                b
            } else if b == dest {
                a
            } else {
                continue;
            };
            if defs.contains_key(bump) {
                continue; // the bump must be loop-invariant
            }
            if unique_const_def(instrs_by_block, bump) != Some(1) {
                continue;
            }
            basics.push(BasicIv {
                var: dest.clone(),
                update: (block.clone(), idx),
            });
        }
    }
    basics
}

/// Derived IVs: `a = c*i` (multiplied invariant) feeding `j = a + d`.
fn find_derived_ivs(
    cfg: &Cfg,
    natural_loop: &NaturalLoop,
    basics: &[BasicIv],
    instrs_by_block: &Map<Label, Vec<Instruction>>,
) -> Vec<DerivedIv> {
    let defs = defs_in_loop(cfg, natural_loop);
    let basic_vars: Set<&Var> = basics.iter().map(|b| &b.var).collect();

    // multiplied invariants: dest -> (multiplier, basic variable)
    let mut multiplied: Map<Var, (Var, Var)> = Map::new();
    for block in &natural_loop.blocks {
        for instr in &cfg[block].instrs {
            let Some(code) = instr.as_code() else { continue };
            if code.op != Op::Mul {
                continue;
            }
            let Some(dest) = &code.dest else { continue };
            if defs[dest].len() != 1 {
                continue;
            }
            let [a, b] = &code.args[..] else { continue };
            let (c, i) = if basic_vars.contains(b) {
                (a, b)
            } else if basic_vars.contains(a) {
                (b, a)
            } else {
                continue;
            };
            if defs.contains_key(c) {
                continue; // multiplier must come from outside the loop
            }
            multiplied.insert(dest.clone(), (c.clone(), i.clone()));
        }
    }

    let mut derived = vec![];
    for block in &natural_loop.blocks {
        for (idx, instr) in cfg[block].instrs.iter().enumerate() {
            let Some(code) = instr.as_code() else { continue };
            if code.op != Op::Add {
                continue;
            }
            let Some(dest) = &code.dest else { continue };
            if defs[dest].len() != 1 || multiplied.contains_key(dest) {
                continue;
            }
            let [a, b] = &code.args[..] else { continue };
            let (mul_var, d_var) = if multiplied.contains_key(a) {
                (a, b)
            } else if multiplied.contains_key(b) {
                (b, a)
            } else {
                continue;
            };
            if defs.contains_key(d_var) {
                continue;
            }
            let Some(offset) = unique_const_def(instrs_by_block, d_var) else {
                continue;
            };
            let (multiplier, basic) = multiplied[mul_var].clone();
            derived.push(DerivedIv {
                var: dest.clone(),
                definition: (block.clone(), idx),
                basic,
                multiplier,
                offset,
            });
        }
    }
    derived
}

fn rewrite_derived(
    cfg: &mut Cfg,
    dominators: &Dominators,
    basic: &BasicIv,
    derived: &DerivedIv,
    preheader: &Label,
) {
    let (j_block, j_idx) = &derived.definition;
    let (i_block, _) = &basic.update;
    let typ = cfg[j_block].instrs[*j_idx]
        .typ()
        .cloned()
        .expect("definitions carry a type");

    debug!(
        "ive: rewriting {} = {}*{} + {} as a running sum",
        derived.var, derived.multiplier, basic.var, derived.offset
    );

    // j starts at the offset in the preheader
    let init = Instruction::constant(derived.var.clone(), typ.clone(), Literal::Int(derived.offset));
    let pre_instrs = &mut cfg[preheader].instrs;
    let at = pre_instrs.len() - 1;
    pre_instrs.insert(at, init);

    // the in-loop update j := j + c, next to i's update
    let update = Instruction::binop(
        Op::Add,
        derived.var.clone(),
        typ,
        derived.var.clone(),
        derived.multiplier.clone(),
    );

    cfg[j_block].instrs.remove(*j_idx);
    // earlier rewrites may have shifted the update; find it again
    let i_idx = cfg[i_block]
        .instrs
        .iter()
        .position(|ins| ins.is(Op::Add) && ins.dest() == Some(&basic.var))
        .expect("basic induction variable keeps its update");
    // placement tracks which definition dominates the other
    if dominators.strictly_dominates(i_block, j_block) {
        cfg[i_block].instrs.insert(i_idx, update);
    } else {
        cfg[i_block].instrs.insert(i_idx + 1, update);
    }
}

fn func_ive(func: &mut Function, supply: &mut NameSupply) {
    let mut cfg = form_cfg(&func.instrs);
    let loops = natural_loops(&cfg);
    if loops.is_empty() {
        return;
    }

    let mut preheaders: Map<Label, Label> = Map::new();
    for natural_loop in &loops {
        if !preheaders.contains_key(&natural_loop.header) {
            let pre = insert_preheader(&mut cfg, &natural_loop.header, &natural_loop.tails(), supply);
            preheaders.insert(natural_loop.header.clone(), pre);
        }
    }
    let dominators = Dominators::compute(&cfg);

    for natural_loop in &loops {
        let instrs_by_block = block_instrs(&cfg);
        let basics = find_basic_ivs(&cfg, natural_loop, &instrs_by_block);
        if basics.is_empty() {
            continue;
        }
        let derived = find_derived_ivs(&cfg, natural_loop, &basics, &instrs_by_block);
        // rewrite highest indices first so earlier sites stay valid
        let mut derived = derived;
        derived.sort_by(|x, y| y.definition.cmp(&x.definition));
        for d in &derived {
            let Some(basic) = basics.iter().find(|b| b.var == d.basic) else {
                continue;
            };
            rewrite_derived(&mut cfg, &dominators, basic, d, &preheaders[&natural_loop.header]);
        }
    }

    func.instrs = join_cfg(&cfg);
}

/// The actual pass.
pub fn ive(program: Valid<Program>) -> Valid<Program> {
    let mut program = program.0;
    let mut supply = NameSupply::new();
    for func in &mut program.functions {
        func_ive(func, &mut supply);
    }
    program.validate().expect("ive produced malformed IR")
}
