//! Basic blocks and the control-flow graph.
//!
//! A block map preserves insertion order so that "fall through to the next
//! block in textual order" stays well defined; the CFG is the same map
//! enriched with predecessor and successor lists.

use std::collections::BTreeSet as Set;

use indexmap::IndexMap;
use log::debug;

use crate::commons::NameSupply;

use super::ir::{Instruction, Label, Op};

#[derive(Clone, Debug, Default)]
pub struct BlockData {
    pub instrs: Vec<Instruction>,
    pub preds: Vec<Label>,
    pub succs: Vec<Label>,
}

pub type Cfg = IndexMap<Label, BlockData>;

/// Split an instruction sequence into maximal straight-line runs.  Labels
/// start a new block; terminators end one.
pub fn form_blocks(instrs: &[Instruction]) -> Vec<Vec<Instruction>> {
    let mut blocks = vec![];
    let mut cur: Vec<Instruction> = vec![];
    for instr in instrs {
        if instr.is_label() {
            if !cur.is_empty() {
                blocks.push(std::mem::take(&mut cur));
            }
            cur.push(instr.clone());
        } else {
            cur.push(instr.clone());
            if instr.is_terminator() {
                blocks.push(std::mem::take(&mut cur));
            }
        }
    }
    if !cur.is_empty() {
        blocks.push(cur);
    }
    blocks
}

/// Name each block, synthesizing `bN` when the block does not start with a
/// label.  Label instructions are kept in place; `join_cfg` knows not to
/// duplicate them.
pub fn block_map(blocks: Vec<Vec<Instruction>>) -> IndexMap<Label, Vec<Instruction>> {
    let mut out = IndexMap::new();
    for (i, block) in blocks.into_iter().enumerate() {
        let name = match block.first().and_then(Instruction::label_name) {
            Some(label) => label.clone(),
            None => format!("b{i}"),
        };
        out.insert(name, block);
    }
    out
}

/// Build the CFG for an instruction sequence: successors from the
/// terminator (fall-through to the next block in textual order when there
/// is none), predecessors by inversion.
pub fn form_cfg(instrs: &[Instruction]) -> Cfg {
    let name2block = block_map(form_blocks(instrs));
    let names: Vec<Label> = name2block.keys().cloned().collect();

    let mut cfg: Cfg = IndexMap::new();
    for (i, (name, instrs)) in name2block.into_iter().enumerate() {
        let succs = match instrs.last().and_then(Instruction::op) {
            Some(Op::Jmp) | Some(Op::Br) => instrs.last().unwrap().labels().to_vec(),
            Some(Op::Ret) => vec![],
            _ => match names.get(i + 1) {
                Some(next) => vec![next.clone()],
                None => vec![],
            },
        };
        cfg.insert(
            name,
            BlockData {
                instrs,
                preds: vec![],
                succs,
            },
        );
    }

    let mut preds: IndexMap<Label, Vec<Label>> = IndexMap::new();
    for (name, data) in &cfg {
        for succ in &data.succs {
            preds.entry(succ.clone()).or_default().push(name.clone());
        }
    }
    for (name, pred_list) in preds {
        cfg[&name].preds = pred_list;
    }
    cfg
}

pub fn entry_label(cfg: &Cfg) -> &Label {
    cfg.keys().next().expect("cfg has no blocks")
}

/// Flatten blocks back into one instruction sequence.  Inverts
/// `form_blocks`; labels stay wherever they already are.
pub fn join_blocks(blocks: Vec<Vec<Instruction>>) -> Vec<Instruction> {
    blocks.into_iter().flatten().collect()
}

/// Rebuild the flat instruction sequence, reinserting a label instruction
/// only for blocks whose first instruction is not already one.
pub fn join_cfg(cfg: &Cfg) -> Vec<Instruction> {
    let mut instrs = vec![];
    for (name, data) in cfg {
        match data.instrs.first() {
            Some(first) if first.is_label() => {}
            _ => instrs.push(Instruction::label(name.clone())),
        }
        instrs.extend(data.instrs.iter().cloned());
    }
    instrs
}

/// Flip every edge; block contents are untouched.
pub fn reverse_cfg(cfg: &Cfg) -> Cfg {
    cfg.iter()
        .map(|(name, data)| {
            (
                name.clone(),
                BlockData {
                    instrs: data.instrs.clone(),
                    preds: data.succs.clone(),
                    succs: data.preds.clone(),
                },
            )
        })
        .collect()
}

/// Append an empty block that every exitless block flows into.  Used to
/// give the reverse CFG a unique entry.
pub fn add_unique_exit(cfg: &mut Cfg, exit_name: &str) {
    let mut preds_of_exit = vec![];
    for (name, data) in cfg.iter_mut() {
        if data.succs.is_empty() {
            data.succs.push(exit_name.to_string());
            preds_of_exit.push(name.clone());
        }
    }
    cfg.insert(
        exit_name.to_string(),
        BlockData {
            instrs: vec![],
            preds: preds_of_exit,
            succs: vec![],
        },
    );
}

/// Insert a block with explicit wiring.  The new block is placed at the
/// end of the map; callers that rely on fall-through must wire terminators
/// themselves.
pub fn insert_block(
    cfg: &mut Cfg,
    label: Label,
    instrs: Vec<Instruction>,
    preds: Vec<Label>,
    succs: Vec<Label>,
) {
    cfg.insert(
        label,
        BlockData {
            instrs,
            preds,
            succs,
        },
    );
}

/// Inject a preheader for `header`: every predecessor that is not a
/// back-edge tail is rewired to the new block, which jumps to the header.
/// The block is inserted immediately before the header in textual order so
/// fall-through predecessors need no rewriting.
pub fn insert_preheader(
    cfg: &mut Cfg,
    header: &Label,
    back_tails: &Set<Label>,
    supply: &mut NameSupply,
) -> Label {
    let pre = supply.dotted("loop.preheader");
    debug!("inserting preheader {pre} for header {header}");

    let outside_preds: Vec<Label> = cfg[header]
        .preds
        .iter()
        .filter(|p| !back_tails.contains(*p))
        .cloned()
        .collect();

    for pred in &outside_preds {
        for instr in cfg[pred].instrs.iter_mut() {
            if let Some(code) = instr.as_code_mut() {
                if code.op.is_terminator() {
                    for target in code.labels.iter_mut() {
                        if target == header {
                            *target = pre.clone();
                        }
                    }
                }
            }
        }
        for succ in cfg[pred].succs.iter_mut() {
            if succ == header {
                *succ = pre.clone();
            }
        }
    }

    let keep: Vec<Label> = cfg[header]
        .preds
        .iter()
        .filter(|p| back_tails.contains(*p))
        .cloned()
        .collect();
    cfg[header].preds = keep;
    cfg[header].preds.insert(0, pre.clone());

    let index = cfg.get_index_of(header).unwrap();
    cfg.shift_insert(
        index,
        pre.clone(),
        BlockData {
            instrs: vec![Instruction::label(pre.clone()), Instruction::jmp(header.clone())],
            preds: outside_preds,
            succs: vec![header.clone()],
        },
    );
    pre
}

fn label_reference_count(cfg: &Cfg, label: &Label) -> usize {
    cfg.values()
        .flat_map(|data| data.instrs.iter())
        .filter(|instr| instr.labels().contains(label))
        .count()
}

/// Merge single-predecessor/single-successor chains, dropping the jump and
/// label between them.  A block is swallowed only if nothing else
/// references its label.
pub fn coalesce(cfg: &mut Cfg) {
    loop {
        let entry = entry_label(cfg).clone();
        let mut candidate = None;
        for (name, data) in cfg.iter() {
            if data.succs.len() != 1 {
                continue;
            }
            let succ = data.succs[0].clone();
            if succ == *name || succ == entry {
                continue;
            }
            if cfg[&succ].preds.len() != 1 {
                continue;
            }
            let jumps_in = cfg[name]
                .instrs
                .last()
                .map(|i| i.is(Op::Jmp))
                .unwrap_or(false);
            let refs = label_reference_count(cfg, &succ);
            // the only allowed reference is the jump we are about to drop
            if refs > usize::from(jumps_in) {
                continue;
            }
            candidate = Some((name.clone(), succ));
            break;
        }

        let Some((upper, lower)) = candidate else {
            break;
        };
        debug!("coalescing {lower} into {upper}");

        let mut lower_data = cfg.shift_remove(&lower).unwrap();
        if let Some(first) = lower_data.instrs.first() {
            if first.is_label() {
                lower_data.instrs.remove(0);
            }
        }
        let upper_data = &mut cfg[&upper];
        if upper_data
            .instrs
            .last()
            .map(|i| i.is(Op::Jmp))
            .unwrap_or(false)
        {
            upper_data.instrs.pop();
        }
        upper_data.instrs.extend(lower_data.instrs);
        upper_data.succs = lower_data.succs.clone();

        for succ in lower_data.succs {
            for pred in cfg[&succ].preds.iter_mut() {
                if *pred == lower {
                    *pred = upper.clone();
                }
            }
        }
    }
}
