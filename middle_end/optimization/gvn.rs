//! Dominator-based global value numbering over SSA.
//!
//! Walks the dominator tree in preorder carrying a variable-to-canonical
//! map (shared, mutated) and an expression table scoped by cloning per
//! child so sibling subtrees do not see each other's values.  φ-functions
//! fold when meaningless (all arms equal) or redundant (a syntactically
//! identical φ already numbered in this block).

use std::collections::BTreeMap as Map;

use log::debug;

use crate::commons::Valid;

use super::super::analysis::constant_prop::interpret;
use super::super::cfg::{entry_label, form_cfg, join_cfg, Cfg};
use super::super::dominators::Dominators;
use super::super::ir::{Code, Instruction, Label, Literal, Op, Program, Type, Var};
use super::super::ssa::{ensure_ssa, is_ssa};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Expr {
    Const(Literal, Type),
    Op(Op, Vec<Var>),
    Argument(Var),
}

struct Tables {
    /// variable -> canonical SSA name for its value
    var_to_num: Map<Var, Var>,
    /// scoped expression table; cloned per dominator-tree child
    expr_to_num: Map<Expr, Var>,
    /// scoped constant values of canonical names, for interpretation
    const_of: Map<Var, Literal>,
}

fn instr_to_expr(code: &Code) -> Expr {
    match code.op {
        Op::Const => Expr::Const(
            code.value.expect("const carries a value"),
            code.typ.clone().expect("const carries a type"),
        ),
        _ => Expr::Op(code.op, code.args.clone()),
    }
}

fn canonicalize(expr: Expr) -> Expr {
    match expr {
        Expr::Op(op, mut args) if op.is_commutative() => {
            args.sort();
            Expr::Op(op, args)
        }
        other => other,
    }
}

/// All φ arms name the same value.
fn meaningless(code: &Code) -> Option<Var> {
    let first = code.args.first()?;
    code.args.iter().all(|a| a == first).then(|| first.clone())
}

fn value_numberable(code: &Code) -> bool {
    code.op == Op::Const || code.op == Op::Id || code.op.is_core_binop() || code.op.is_core_unop()
}

/// Fold the expression to a constant when every operand has a known
/// literal; equal-operand comparisons also simplify.  `None` keeps the
/// original instruction.
fn fold(code: &Code, tables: &Tables) -> Option<Literal> {
    if code.op == Op::Const {
        return None;
    }
    if code.args.len() == 2 && code.args[0] == code.args[1] {
        match code.op {
            Op::Eq | Op::Le | Op::Ge => return Some(Literal::Bool(true)),
            Op::Lt | Op::Gt => return Some(Literal::Bool(false)),
            _ => {}
        }
    }
    let operands: Option<Vec<Literal>> = code
        .args
        .iter()
        .map(|a| tables.const_of.get(a).copied())
        .collect();
    interpret(code.op, &operands?)
}

fn dvnt(
    block: &Label,
    cfg: &mut Cfg,
    dominators: &Dominators,
    var_to_num: &mut Map<Var, Var>,
    mut tables_scope: (Map<Expr, Var>, Map<Var, Literal>),
) {
    let mut tables = Tables {
        var_to_num: std::mem::take(var_to_num),
        expr_to_num: std::mem::take(&mut tables_scope.0),
        const_of: std::mem::take(&mut tables_scope.1),
    };

    // φ-functions first; they sit at the top of the block
    let mut phi_to_num: Map<Expr, Var> = Map::new();
    let mut kept: Vec<Instruction> = vec![];
    for instr in std::mem::take(&mut cfg[block].instrs) {
        let Some(code) = instr.as_code() else {
            kept.push(instr);
            continue;
        };
        if code.op != Op::Phi {
            kept.push(instr);
            continue;
        }
        let dest = code.dest.clone().unwrap();
        let fully_analyzed = code.args.iter().all(|a| tables.var_to_num.contains_key(a));
        if !fully_analyzed {
            tables.var_to_num.insert(dest.clone(), dest.clone());
            phi_to_num.insert(canonicalize(instr_to_expr(code)), dest);
            kept.push(instr);
        } else if let Some(single) = meaningless(code) {
            let canonical = tables.var_to_num[&single].clone();
            tables.var_to_num.insert(dest, canonical);
        } else if let Some(canonical) = phi_to_num.get(&canonicalize(instr_to_expr(code))) {
            tables.var_to_num.insert(dest, canonical.clone());
        } else {
            tables.var_to_num.insert(dest.clone(), dest.clone());
            phi_to_num.insert(canonicalize(instr_to_expr(code)), dest);
            kept.push(instr);
        }
    }

    // regular instructions
    let mut output: Vec<Instruction> = vec![];
    for mut instr in kept {
        let Some(code) = instr.as_code_mut() else {
            output.push(instr);
            continue;
        };
        if code.op == Op::Phi {
            output.push(instr);
            continue;
        }
        if value_numberable(code) {
            // an operand the walk has not numbered keeps its own name;
            // the expression then simply misses the table
            for arg in code.args.iter_mut() {
                if let Some(canonical) = tables.var_to_num.get(arg) {
                    *arg = canonical.clone();
                }
            }
            if let Some(lit) = fold(code, &tables) {
                let typ = code.typ.clone().expect("definitions carry a type");
                *code = Code {
                    op: Op::Const,
                    dest: code.dest.clone(),
                    typ: Some(typ),
                    args: vec![],
                    funcs: vec![],
                    labels: vec![],
                    value: Some(lit),
                };
            }
            let dest = code.dest.clone().unwrap();
            let expr = canonicalize(instr_to_expr(code));
            if let Some(canonical) = tables.expr_to_num.get(&expr) {
                // a dominating computation already holds this value
                tables.var_to_num.insert(dest, canonical.clone());
            } else {
                tables.var_to_num.insert(dest.clone(), dest.clone());
                if let Expr::Const(lit, _) = &expr {
                    tables.const_of.insert(dest.clone(), *lit);
                }
                tables.expr_to_num.insert(expr, dest);
                output.push(instr);
            }
        } else {
            for arg in code.args.iter_mut() {
                if let Some(canonical) = tables.var_to_num.get(arg) {
                    *arg = canonical.clone();
                }
            }
            // calls and effectful defs keep their destination: only the
            // use sites get renumbered
            if let Some(dest) = code.dest.clone() {
                tables.var_to_num.insert(dest.clone(), dest);
            }
            output.push(instr);
        }
    }
    cfg[block].instrs = output;

    // reflect the numbering into successor φ operands
    let succs = cfg[block].succs.clone();
    for succ in succs {
        for instr in cfg[&succ].instrs.iter_mut() {
            let Some(code) = instr.as_code_mut() else { continue };
            if code.op != Op::Phi {
                continue;
            }
            for arg in code.args.iter_mut() {
                if let Some(canonical) = tables.var_to_num.get(arg) {
                    *arg = canonical.clone();
                }
            }
        }
    }

    *var_to_num = tables.var_to_num;
    for child in dominators.tree[block].clone() {
        dvnt(
            &child,
            cfg,
            dominators,
            var_to_num,
            (tables.expr_to_num.clone(), tables.const_of.clone()),
        );
    }
}

fn gvn_func(func: &mut super::super::ir::Function) {
    let mut cfg = form_cfg(&func.instrs);
    let dominators = Dominators::compute(&cfg);
    let entry = entry_label(&cfg).clone();

    let mut var_to_num: Map<Var, Var> = Map::new();
    let mut expr_to_num: Map<Expr, Var> = Map::new();
    for param in &func.args {
        var_to_num.insert(param.name.clone(), param.name.clone());
        expr_to_num.insert(Expr::Argument(param.name.clone()), param.name.clone());
    }

    dvnt(
        &entry,
        &mut cfg,
        &dominators,
        &mut var_to_num,
        (expr_to_num, Map::new()),
    );
    func.instrs = join_cfg(&cfg);
}

/// The actual pass.  Requires SSA; converts first when handed a non-SSA
/// program, and preserves SSA on exit.
pub fn gvn(program: Valid<Program>) -> Valid<Program> {
    let program = ensure_ssa(program);
    let mut program = program.0;
    for func in &mut program.functions {
        debug!("gvn over {}", func.name);
        gvn_func(func);
    }
    is_ssa(&program).expect("gvn must preserve SSA");
    program.validate().expect("gvn produced malformed IR")
}
