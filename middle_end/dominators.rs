//! Dominator toolkit: dominator sets, the dominator tree, the dominance
//! frontier, back edges, and natural loops.
//!
//! Iteration runs only over blocks reachable from the entry; unreachable
//! blocks keep empty dominator sets.

use std::collections::{BTreeMap as Map, BTreeSet as Set};

use super::cfg::{entry_label, Cfg};
use super::ir::Label;

#[derive(Clone, Debug)]
pub struct Dominators {
    /// domby[b]: blocks dominating b, b included.
    pub domby: Map<Label, Set<Label>>,
    /// dom[b]: blocks dominated by b, b included.
    pub dom: Map<Label, Set<Label>>,
    /// sdomby[b]: strict dominators of b.
    pub sdomby: Map<Label, Set<Label>>,
    /// Immediate dominator; the entry maps to itself.
    pub idom: Map<Label, Label>,
    /// Dominator-tree children, every block present as a key.
    pub tree: Map<Label, Vec<Label>>,
    /// Dominance frontier.
    pub frontier: Map<Label, Set<Label>>,
}

/// All blocks reachable from the entry, via an explicit stack.
pub fn reachable_blocks(cfg: &Cfg) -> Set<Label> {
    let mut visited = Set::new();
    if cfg.is_empty() {
        return visited;
    }
    let mut stack = vec![entry_label(cfg).clone()];
    while let Some(block) = stack.pop() {
        if !visited.insert(block.clone()) {
            continue;
        }
        for succ in &cfg[&block].succs {
            if !visited.contains(succ) {
                stack.push(succ.clone());
            }
        }
    }
    visited
}

impl Dominators {
    pub fn compute(cfg: &Cfg) -> Self {
        let entry = entry_label(cfg).clone();
        let reachable = reachable_blocks(cfg);

        let mut domby: Map<Label, Set<Label>> = Map::new();
        for name in cfg.keys() {
            if !reachable.contains(name) {
                domby.insert(name.clone(), Set::new());
            } else if *name == entry {
                domby.insert(name.clone(), [entry.clone()].into());
            } else {
                domby.insert(name.clone(), reachable.clone());
            }
        }

        let mut changed = true;
        while changed {
            changed = false;
            for name in cfg.keys() {
                if !reachable.contains(name) || *name == entry {
                    continue;
                }
                let pred_doms: Vec<&Set<Label>> = cfg[name]
                    .preds
                    .iter()
                    .filter(|p| reachable.contains(*p))
                    .map(|p| &domby[p])
                    .collect();
                let mut next = intersect_all(&pred_doms);
                next.insert(name.clone());
                if next != domby[name] {
                    domby.insert(name.clone(), next);
                    changed = true;
                }
            }
        }

        let mut dom: Map<Label, Set<Label>> = cfg.keys().map(|b| (b.clone(), Set::new())).collect();
        for (b, dominators) in &domby {
            for d in dominators {
                dom.get_mut(d).unwrap().insert(b.clone());
            }
        }

        let sdomby: Map<Label, Set<Label>> = domby
            .iter()
            .map(|(b, doms)| {
                let mut strict = doms.clone();
                strict.remove(b);
                (b.clone(), strict)
            })
            .collect();

        // The immediate dominator is the strict dominator that strictly
        // dominates no other strict dominator.  The entry is its own idom.
        let mut idom: Map<Label, Label> = Map::new();
        for name in cfg.keys() {
            if !reachable.contains(name) {
                continue;
            }
            let strict = &sdomby[name];
            let immediate = strict.iter().find(|cand| {
                strict
                    .iter()
                    .filter(|other| *other != *cand)
                    .all(|other| !sdomby[other].contains(*cand))
            });
            match immediate {
                Some(parent) => idom.insert(name.clone(), parent.clone()),
                None => idom.insert(name.clone(), name.clone()),
            };
        }

        // children in block order, so tree walks visit a join after the
        // blocks that feed it
        let mut tree: Map<Label, Vec<Label>> =
            cfg.keys().map(|b| (b.clone(), vec![])).collect();
        for name in cfg.keys() {
            if let Some(parent) = idom.get(name) {
                if parent != name {
                    tree.get_mut(parent).unwrap().push(name.clone());
                }
            }
        }

        // b is in df[a] iff a dominates a predecessor of b but does not
        // strictly dominate b itself.
        let mut frontier: Map<Label, Set<Label>> =
            cfg.keys().map(|b| (b.clone(), Set::new())).collect();
        for name in cfg.keys() {
            if !reachable.contains(name) {
                continue;
            }
            for pred in &cfg[name].preds {
                if !reachable.contains(pred) {
                    continue;
                }
                for above in &domby[pred] {
                    if !sdomby[name].contains(above) {
                        frontier.get_mut(above).unwrap().insert(name.clone());
                    }
                }
            }
        }

        Dominators {
            domby,
            dom,
            sdomby,
            idom,
            tree,
            frontier,
        }
    }

    pub fn dominates(&self, a: &Label, b: &Label) -> bool {
        self.domby.get(b).map(|d| d.contains(a)).unwrap_or(false)
    }

    pub fn strictly_dominates(&self, a: &Label, b: &Label) -> bool {
        self.sdomby.get(b).map(|d| d.contains(a)).unwrap_or(false)
    }

    /// Dominator-tree preorder starting at `root`.
    pub fn preorder(&self, root: &Label) -> Vec<Label> {
        let mut order = vec![];
        let mut stack = vec![root.clone()];
        while let Some(block) = stack.pop() {
            order.push(block.clone());
            for child in self.tree[&block].iter().rev() {
                stack.push(child.clone());
            }
        }
        order
    }
}

fn intersect_all(sets: &[&Set<Label>]) -> Set<Label> {
    let Some(first) = sets.first() else {
        return Set::new();
    };
    let mut out: Set<Label> = (*first).clone();
    for s in &sets[1..] {
        out = out.intersection(s).cloned().collect();
    }
    out
}

// SECTION: loops

/// A natural loop.  Loops sharing a header are merged: the body is the
/// union over every back edge into that header.
#[derive(Clone, Debug)]
pub struct NaturalLoop {
    pub header: Label,
    /// (tail, header) pairs, one per back edge.
    pub back_edges: Vec<(Label, Label)>,
    pub blocks: Set<Label>,
    /// Edges leaving the loop, as (inside, outside).
    pub exits: Vec<(Label, Label)>,
}

impl NaturalLoop {
    pub fn tails(&self) -> Set<Label> {
        self.back_edges.iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn contains(&self, block: &Label) -> bool {
        self.blocks.contains(block)
    }
}

/// Every edge (t, h) with h ∈ domby[t].
pub fn back_edges(cfg: &Cfg, dominators: &Dominators) -> Vec<(Label, Label)> {
    let mut edges = vec![];
    for (name, data) in cfg {
        for succ in &data.succs {
            if dominators.dominates(succ, name) {
                edges.push((name.clone(), succ.clone()));
            }
        }
    }
    edges
}

/// The body of the loop for back edge (tail, header): the header plus
/// every block that reaches the tail without passing through the header.
fn loop_body(cfg: &Cfg, tail: &Label, header: &Label) -> Set<Label> {
    let mut body: Set<Label> = [header.clone()].into();
    let mut stack = vec![tail.clone()];
    while let Some(block) = stack.pop() {
        if !body.insert(block.clone()) {
            continue;
        }
        for pred in &cfg[&block].preds {
            if !body.contains(pred) {
                stack.push(pred.clone());
            }
        }
    }
    body
}

pub fn natural_loops(cfg: &Cfg) -> Vec<NaturalLoop> {
    let dominators = Dominators::compute(cfg);
    let mut by_header: Map<Label, NaturalLoop> = Map::new();

    for (tail, header) in back_edges(cfg, &dominators) {
        let body = loop_body(cfg, &tail, &header);
        let entry = by_header.entry(header.clone()).or_insert_with(|| NaturalLoop {
            header: header.clone(),
            back_edges: vec![],
            blocks: Set::new(),
            exits: vec![],
        });
        entry.back_edges.push((tail, header));
        entry.blocks.extend(body);
    }

    let mut loops: Vec<NaturalLoop> = by_header.into_values().collect();
    for natural_loop in &mut loops {
        for block in &natural_loop.blocks {
            for succ in &cfg[block].succs {
                if !natural_loop.blocks.contains(succ) {
                    natural_loop.exits.push((block.clone(), succ.clone()));
                }
            }
        }
    }
    loops
}
