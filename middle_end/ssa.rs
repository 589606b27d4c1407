//! Conversion to and from SSA form.
//!
//! To-SSA places φ-functions on the dominance frontier of every
//! definition, then renames along the dominator tree.  φ arity always
//! equals the predecessor count of the carrying block; an operand that is
//! unbound on some path gets a synthetic type-default definition in that
//! predecessor so the program stays total.

use std::collections::{BTreeMap as Map, BTreeSet as Set};

use log::debug;

use crate::commons::{Valid, ValidationError};

use super::cfg::{entry_label, form_cfg, join_cfg, Cfg};
use super::dominators::Dominators;
use super::ir::{Function, Instruction, Label, Literal, Op, Program, Type, Var};

/// Every variable has at most one static definition.
pub fn is_ssa(program: &Program) -> Result<(), ValidationError> {
    for func in &program.functions {
        let mut defined: Set<&Var> = func.args.iter().map(|p| &p.name).collect();
        for instr in &func.instrs {
            if let Some(dest) = instr.dest() {
                if !defined.insert(dest) {
                    return Err(ValidationError::NotSsa {
                        func: func.name.clone(),
                        var: dest.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Convert to SSA only when the program is not already in SSA form.
pub fn ensure_ssa(program: Valid<Program>) -> Valid<Program> {
    match is_ssa(&program.0) {
        Ok(()) => program,
        Err(_) => to_ssa(program),
    }
}

pub fn to_ssa(program: Valid<Program>) -> Valid<Program> {
    let mut program = program.0;
    for func in &mut program.functions {
        func_to_ssa(func);
    }
    is_ssa(&program).expect("to_ssa must produce SSA");
    program.validate().expect("to_ssa produced malformed IR")
}

pub fn from_ssa(program: Valid<Program>) -> Valid<Program> {
    let mut program = program.0;
    for func in &mut program.functions {
        func_from_ssa(func);
    }
    program.validate().expect("from_ssa produced malformed IR")
}

fn insert_at_front(instrs: &mut Vec<Instruction>, instr: Instruction) {
    let at = usize::from(instrs.first().map(Instruction::is_label).unwrap_or(false));
    instrs.insert(at, instr);
}

fn insert_at_end(instrs: &mut Vec<Instruction>, instr: Instruction) {
    let at = if instrs.last().map(Instruction::is_terminator).unwrap_or(false) {
        instrs.len() - 1
    } else {
        instrs.len()
    };
    instrs.insert(at, instr);
}

fn type_default(typ: &Type) -> Literal {
    match typ {
        Type::Int => Literal::Int(0),
        Type::Bool => Literal::Bool(true),
        Type::Float => Literal::Float(0.0),
        other => panic!("no synthetic default for values of type {other}"),
    }
}

// SECTION: to SSA

struct Renamer {
    cfg: Cfg,
    tree: Map<Label, Vec<Label>>,
    /// var -> stack of SSA names currently in scope
    stacks: Map<Var, Vec<Var>>,
    /// var -> next fresh index (monotone, never reused after pops)
    next_index: Map<Var, u64>,
}

impl Renamer {
    fn fresh(&mut self, base: &Var) -> Var {
        let n = self.next_index.entry(base.clone()).or_insert(0);
        *n += 1;
        format!("{base}_{n}")
    }

    fn current(&self, base: &Var) -> Option<&Var> {
        self.stacks.get(base).and_then(|s| s.last())
    }

    /// Rename along the dominator tree with an explicit enter/exit stack.
    fn run(&mut self, entry: &Label) {
        enum Step {
            Enter(Label),
            Exit(Vec<(Var, usize)>),
        }
        let mut work = vec![Step::Enter(entry.clone())];
        while let Some(step) = work.pop() {
            match step {
                Step::Exit(pushed) => {
                    for (var, count) in pushed {
                        let stack = self.stacks.get_mut(&var).unwrap();
                        for _ in 0..count {
                            stack.pop();
                        }
                    }
                }
                Step::Enter(block) => {
                    let pushed = self.rename_block(&block);
                    work.push(Step::Exit(pushed));
                    for child in self.tree[&block].iter().rev() {
                        work.push(Step::Enter(child.clone()));
                    }
                }
            }
        }
    }

    fn rename_block(&mut self, block: &Label) -> Vec<(Var, usize)> {
        let mut pushed: Map<Var, usize> = Map::new();

        let mut instrs = std::mem::take(&mut self.cfg[block].instrs);
        for instr in instrs.iter_mut() {
            let Some(code) = instr.as_code_mut() else {
                continue;
            };
            // φ operands are filled in from the predecessor side; a name
            // with no definition on this path keeps its spelling and the
            // exit validation reports it
            if code.op != Op::Phi {
                for arg in code.args.iter_mut() {
                    if let Some(name) = self.stacks.get(arg.as_str()).and_then(|s| s.last()) {
                        *arg = name.clone();
                    }
                }
            }
            if let Some(dest) = code.dest.clone() {
                let fresh = self.fresh(&dest);
                code.dest = Some(fresh.clone());
                self.stacks.entry(dest.clone()).or_default().push(fresh);
                *pushed.entry(dest).or_insert(0) += 1;
            }
        }
        self.cfg[block].instrs = instrs;

        // fill our slot of every successor φ
        let succs = self.cfg[block].succs.clone();
        for succ in succs {
            // (instruction index, operand slot, base name, type)
            let mut slots: Vec<(usize, usize, Var, Type)> = vec![];
            for (at, instr) in self.cfg[&succ].instrs.iter().enumerate() {
                let Some(code) = instr.as_code() else { continue };
                if code.op != Op::Phi {
                    continue;
                }
                for (i, label) in code.labels.iter().enumerate() {
                    if label == block {
                        slots.push((at, i, code.args[i].clone(), code.typ.clone().unwrap()));
                    }
                }
            }
            for (at, slot, base, typ) in slots {
                let name = match self.current(&base) {
                    Some(name) => name.clone(),
                    None => {
                        // the variable is not defined on this path: make
                        // the program total with a type-default constant
                        let fresh = self.fresh(&base);
                        let synthetic =
                            Instruction::constant(fresh.clone(), typ.clone(), type_default(&typ));
                        insert_at_end(&mut self.cfg[block].instrs, synthetic);
                        fresh
                    }
                };
                let instr = &mut self.cfg[&succ].instrs[at];
                if let Some(code) = instr.as_code_mut() {
                    code.args[slot] = name;
                }
            }
        }

        pushed.into_iter().collect()
    }
}

fn func_to_ssa(func: &mut Function) {
    let mut cfg = form_cfg(&func.instrs);
    let entry = entry_label(&cfg).clone();
    let dominators = Dominators::compute(&cfg);

    // definition sites per variable; parameters count as entry definitions
    let mut def_blocks: Map<Var, Vec<Label>> = Map::new();
    let mut var_types: Map<Var, Type> = Map::new();
    for param in &func.args {
        def_blocks.entry(param.name.clone()).or_default().push(entry.clone());
        var_types.insert(param.name.clone(), param.typ.clone());
    }
    for (name, data) in &cfg {
        for instr in &data.instrs {
            if let (Some(dest), Some(typ)) = (instr.dest(), instr.typ()) {
                def_blocks.entry(dest.clone()).or_default().push(name.clone());
                var_types.insert(dest.clone(), typ.clone());
            }
        }
    }

    // φ placement over the iterated dominance frontier
    for (var, blocks) in def_blocks.iter_mut() {
        let mut placed: Set<Label> = Set::new();
        let mut i = 0;
        while i < blocks.len() {
            let defining = blocks[i].clone();
            i += 1;
            for df_block in &dominators.frontier[&defining] {
                if placed.insert(df_block.clone()) {
                    let preds = cfg[df_block].preds.clone();
                    let phi = Instruction::phi(
                        var.clone(),
                        var_types[var].clone(),
                        vec![var.clone(); preds.len()],
                        preds,
                    );
                    insert_at_front(&mut cfg[df_block].instrs, phi);
                }
                if !blocks.contains(df_block) {
                    blocks.push(df_block.clone());
                }
            }
        }
    }

    // rename parameters to their _0 names
    let mut stacks: Map<Var, Vec<Var>> = Map::new();
    for param in func.args.iter_mut() {
        let renamed = format!("{}_0", param.name);
        stacks.insert(param.name.clone(), vec![renamed.clone()]);
        param.name = renamed;
    }

    let mut renamer = Renamer {
        cfg,
        tree: dominators.tree,
        stacks,
        next_index: Map::new(),
    };
    renamer.run(&entry);
    debug!("converted {} to SSA", func.name);
    func.instrs = join_cfg(&renamer.cfg);
}

// SECTION: from SSA

fn func_from_ssa(func: &mut Function) {
    let mut cfg = form_cfg(&func.instrs);

    // copies to append per predecessor, gathered before mutation
    let mut copies: Vec<(Label, Instruction)> = vec![];
    for (_, data) in &cfg {
        for instr in &data.instrs {
            let Some(code) = instr.as_code() else { continue };
            if code.op != Op::Phi {
                continue;
            }
            let dest = code.dest.clone().unwrap();
            let typ = code.typ.clone().unwrap();
            for (arg, label) in code.args.iter().zip(&code.labels) {
                copies.push((
                    label.clone(),
                    Instruction::id(dest.clone(), typ.clone(), arg.clone()),
                ));
            }
        }
    }
    for (label, copy) in copies {
        insert_at_end(&mut cfg[&label].instrs, copy);
    }
    for (_, data) in cfg.iter_mut() {
        data.instrs.retain(|instr| !instr.is_phi());
    }

    func.instrs = join_cfg(&cfg);
}
