//! Intraprocedural constant propagation.
//!
//! Per-variable state is ⊤ ("known not constant", printed `?`), a concrete
//! literal, or ⊥ ("undefined", printed `!`).

use std::collections::BTreeMap as Map;
use std::fmt::Write;

use derive_more::Display;

use crate::commons::Valid;

use super::super::cfg::{form_cfg, BlockData, Cfg};
use super::super::dataflow::{solve, Dataflow, Solution};
use super::super::ir::{Code, Function, Label, Literal, Op, Program, Var};

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum Value {
    #[display(fmt = "?")]
    NotConstant,
    #[display(fmt = "{}", _0)]
    Constant(Literal),
    #[display(fmt = "!")]
    Undefined,
}

pub type Env = Map<Var, Value>;

/// Interpret one operation over known-constant operands.  `None` means the
/// interpretation refused (division by zero, unhandled opcode).
pub fn interpret(op: Op, operands: &[Literal]) -> Option<Literal> {
    use Literal::*;
    let int2 = || match operands {
        [Int(a), Int(b)] => Some((*a, *b)),
        _ => None,
    };
    let bool2 = || match operands {
        [Bool(a), Bool(b)] => Some((*a, *b)),
        _ => None,
    };
    match op {
        Op::Add => int2().map(|(a, b)| Int(a.wrapping_add(b))),
        Op::Sub => int2().map(|(a, b)| Int(a.wrapping_sub(b))),
        Op::Mul => int2().map(|(a, b)| Int(a.wrapping_mul(b))),
        Op::Div => int2().and_then(|(a, b)| {
            if b == 0 {
                None
            } else {
                Some(Int(a.wrapping_div(b)))
            }
        }),
        Op::Eq => int2().map(|(a, b)| Bool(a == b)),
        Op::Lt => int2().map(|(a, b)| Bool(a < b)),
        Op::Gt => int2().map(|(a, b)| Bool(a > b)),
        Op::Le => int2().map(|(a, b)| Bool(a <= b)),
        Op::Ge => int2().map(|(a, b)| Bool(a >= b)),
        Op::And => bool2().map(|(a, b)| Bool(a && b)),
        Op::Or => bool2().map(|(a, b)| Bool(a || b)),
        Op::Not => match operands {
            [Bool(a)] => Some(Bool(!a)),
            _ => None,
        },
        Op::Id => operands.first().copied(),
        _ => None,
    }
}

pub struct ConstantProp {
    args: Vec<Var>,
}

impl ConstantProp {
    pub fn new(func: &Function) -> Self {
        ConstantProp {
            args: func.args.iter().map(|p| p.name.clone()).collect(),
        }
    }
}

fn transfer_code(env: &mut Env, code: &Code) {
    let Some(dest) = &code.dest else {
        return;
    };
    let value = if !code.funcs.is_empty() {
        // calls are not interpreted
        Value::NotConstant
    } else if code.op == Op::Const {
        match code.value {
            Some(lit) => Value::Constant(lit),
            None => Value::NotConstant,
        }
    } else if !code.args.is_empty() {
        let operands: Option<Vec<Literal>> = code
            .args
            .iter()
            .map(|arg| match env.get(arg) {
                Some(Value::Constant(lit)) => Some(*lit),
                _ => None,
            })
            .collect();
        match operands.and_then(|ops| interpret(code.op, &ops)) {
            Some(lit) => Value::Constant(lit),
            None => Value::NotConstant,
        }
    } else {
        // alloc, veczero and friends define without readable operands
        Value::NotConstant
    };
    env.insert(dest.clone(), value);
}

impl Dataflow for ConstantProp {
    type Fact = Env;

    fn entry_fact(&self) -> Self::Fact {
        self.args
            .iter()
            .map(|name| (name.clone(), Value::NotConstant))
            .collect()
    }

    fn bottom(&self) -> Self::Fact {
        Map::new()
    }

    fn merge(&self, facts: Vec<&Self::Fact>) -> Self::Fact {
        let mut merged: Env = Map::new();
        for env in facts {
            for (var, val) in env {
                match merged.get(var) {
                    None => {
                        merged.insert(var.clone(), *val);
                    }
                    Some(existing) if existing == val => {}
                    Some(_) => {
                        merged.insert(var.clone(), Value::NotConstant);
                    }
                }
            }
        }
        merged
    }

    fn transfer(&self, input: &Self::Fact, _label: &Label, block: &BlockData) -> Self::Fact {
        let mut env = input.clone();
        for instr in &block.instrs {
            if let Some(code) = instr.as_code() {
                transfer_code(&mut env, code);
            }
        }
        env
    }
}

pub fn analyze_cfg(func: &Function, cfg: &Cfg) -> Solution<Env> {
    solve(&ConstantProp::new(func), cfg)
}

pub fn analyze(program: &Valid<Program>, func: &str) -> Solution<Env> {
    let f = program
        .0
        .get_function(func)
        .unwrap_or_else(|| panic!("unknown function {func}"));
    analyze_cfg(f, &form_cfg(&f.instrs))
}

pub fn report(program: &Valid<Program>) -> String {
    let mut out = String::new();
    for func in &program.0.functions {
        let solution = analyze(program, &func.name);
        writeln!(out, "Function: {}", func.name).unwrap();
        for (title, side) in [("In:", &solution.input), ("Out:", &solution.output)] {
            writeln!(out, "{title}").unwrap();
            for (block, env) in side {
                if env.is_empty() {
                    writeln!(out, "\t{block}: No Constant Definitions.").unwrap();
                } else {
                    for (var, val) in env {
                        writeln!(out, "\t{block}: {var} has value {val}.").unwrap();
                    }
                }
            }
        }
    }
    out
}
