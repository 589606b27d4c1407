//! Local value numbering with interpretation.
//!
//! Each basic block gets a fresh numbering.  A value is `(op, arg
//! numbers…)` or a constant; every value owns a number and a canonical
//! variable holding it.  Variables flowing into the block are
//! preregistered as opaque values; when a block input is redefined later
//! in the block, its incoming value is captured under a fresh name at the
//! top of the block so the canonical location survives the overwrite.

use std::collections::BTreeMap as Map;

use log::trace;

use crate::commons::{NameSupply, Valid};

use super::super::cfg::{form_blocks, join_blocks};
use super::super::ir::{Code, Instruction, Literal, Op, Program, Type, Var};

type Num = u32;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Const(Literal),
    Expr(Op, Vec<Num>),
    /// An uninterpreted call: callee names plus argument numbers.
    Call(Vec<String>, Vec<Num>),
    /// A value defined outside the block (argument or predecessor def).
    Opaque(Var),
}

impl Value {
    fn is_const(&self) -> bool {
        matches!(self, Value::Const(_))
    }
}

struct Numbering {
    /// rows of (number, value, canonical location)
    rows: Vec<(Num, Value, Var)>,
    var_to_num: Map<Var, Num>,
    next: Num,
}

impl Numbering {
    fn new() -> Self {
        Numbering {
            rows: vec![],
            var_to_num: Map::new(),
            next: 0,
        }
    }

    fn fresh_num(&mut self) -> Num {
        self.next += 1;
        self.next
    }

    fn value_of(&self, num: Num) -> &Value {
        &self
            .rows
            .iter()
            .find(|(n, _, _)| *n == num)
            .expect("number must be in the table")
            .1
    }

    fn canonical(&self, num: Num) -> &Var {
        &self
            .rows
            .iter()
            .find(|(n, _, _)| *n == num)
            .expect("number must be in the table")
            .2
    }

    /// The number for a variable, registering an opaque row for values
    /// that flowed in from outside the block.
    fn num_of_arg(&mut self, arg: &Var) -> Num {
        if let Some(num) = self.var_to_num.get(arg) {
            return *num;
        }
        let num = self.fresh_num();
        self.rows
            .push((num, Value::Opaque(arg.clone()), arg.clone()));
        self.var_to_num.insert(arg.clone(), num);
        num
    }

    /// Two values are the same modulo the recognized identities:
    /// `a+a ≡ 2*a` and the inverse orientations of gt/le and lt/ge.
    fn values_equal(&self, a: &Value, b: &Value) -> bool {
        if a == b {
            return true;
        }
        if double_of(self, a) == double_of(self, b) && double_of(self, a).is_some() {
            return true;
        }
        if let (Value::Expr(op_a, args_a), Value::Expr(op_b, args_b)) = (a, b) {
            let flipped = matches!(
                (op_a, op_b),
                (Op::Gt, Op::Lt) | (Op::Lt, Op::Gt) | (Op::Le, Op::Ge) | (Op::Ge, Op::Le)
            );
            if flipped && args_a.len() == 2 && args_a[0] == args_b[1] && args_a[1] == args_b[0] {
                return true;
            }
        }
        false
    }

    fn lookup(&self, value: &Value) -> Option<Num> {
        self.rows
            .iter()
            .find(|(_, existing, _)| self.values_equal(existing, value))
            .map(|(n, _, _)| *n)
    }
}

/// The doubled operand when a value reads as `a + a` or `2 * a`.
fn double_of(table: &Numbering, value: &Value) -> Option<Num> {
    match value {
        Value::Expr(Op::Add, args) if args.len() == 2 && args[0] == args[1] => Some(args[0]),
        Value::Expr(Op::Mul, args) if args.len() == 2 => {
            let two = Value::Const(Literal::Int(2));
            if *table.value_of(args[0]) == two {
                Some(args[1])
            } else if *table.value_of(args[1]) == two {
                Some(args[0])
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Fold a value down to a constant or a simpler value where the
/// interpretation rules allow.  Division by a literal zero and calls are
/// left uninterpreted.
fn interpret(table: &Numbering, value: Value) -> Value {
    let Value::Expr(op, args) = &value else {
        return value;
    };
    if *op == Op::Id {
        return table.value_of(args[0]).clone();
    }
    if *op == Op::Call {
        return value;
    }
    if !(op.is_core_binop() || op.is_core_unop()) {
        return value;
    }

    let operands: Vec<&Value> = args.iter().map(|n| table.value_of(*n)).collect();
    if !operands.iter().all(|v| v.is_const()) {
        // equal-operand comparisons still simplify
        if args.len() == 2 && args[0] == args[1] {
            match op {
                Op::Eq | Op::Le | Op::Ge => return Value::Const(Literal::Bool(true)),
                Op::Lt | Op::Gt => return Value::Const(Literal::Bool(false)),
                _ => {}
            }
        }
        return value;
    }

    let literals: Vec<Literal> = operands
        .iter()
        .map(|v| match v {
            Value::Const(lit) => *lit,
            _ => unreachable!(),
        })
        .collect();
    match super::super::analysis::constant_prop::interpret(*op, &literals) {
        Some(lit) => Value::Const(lit),
        None => value,
    }
}

fn value_to_instr(dest: Var, value: &Value, table: &Numbering, original: &Code) -> Instruction {
    match value {
        Value::Const(lit) => {
            let typ = original.typ.clone().unwrap_or(Type::Int);
            Instruction::constant(dest, typ, *lit)
        }
        Value::Expr(op, nums) => {
            let mut code = original.clone();
            code.op = *op;
            code.dest = Some(dest);
            code.args = nums.iter().map(|n| table.canonical(*n).clone()).collect();
            Instruction::Code(code)
        }
        Value::Call(funcs, nums) => {
            let mut code = original.clone();
            code.dest = Some(dest);
            code.funcs = funcs.clone();
            code.args = nums.iter().map(|n| table.canonical(*n).clone()).collect();
            Instruction::Code(code)
        }
        Value::Opaque(var) => {
            let typ = original.typ.clone().unwrap_or(Type::Int);
            Instruction::id(dest, typ, var.clone())
        }
    }
}

/// Can the value-numbering engine build a value for this opcode?
fn interpretable(code: &Code) -> bool {
    code.op == Op::Const
        || code.op == Op::Id
        || code.op == Op::Call
        || code.op.is_core_binop()
        || code.op.is_core_unop()
}

fn instr_to_value(code: &Code, table: &mut Numbering) -> Value {
    if code.op == Op::Const {
        return Value::Const(code.value.expect("const carries a value"));
    }
    if code.op == Op::Call {
        let nums = code.args.iter().map(|a| table.num_of_arg(a)).collect();
        return Value::Call(code.funcs.clone(), nums);
    }
    let mut args = code.args.clone();
    if code.op.is_commutative() {
        args.sort();
    }
    let nums = args.iter().map(|a| table.num_of_arg(a)).collect();
    interpret(table, Value::Expr(code.op, nums))
}

fn block_inputs_redefined(instrs: &[Instruction]) -> Vec<Var> {
    let mut defined: Vec<&Var> = vec![];
    let mut captured = vec![];
    for instr in instrs {
        if instr.is_phi() {
            // φ operands name predecessor values, not block inputs
            if let Some(dest) = instr.dest() {
                defined.push(dest);
            }
            continue;
        }
        for arg in instr.args() {
            if !defined.iter().any(|d| *d == arg)
                && instrs
                    .iter()
                    .any(|other| other.dest() == Some(arg))
                && !captured.contains(arg)
            {
                captured.push(arg.clone());
            }
        }
        if let Some(dest) = instr.dest() {
            defined.push(dest);
        }
    }
    captured
}

fn lvn_block(
    instrs: Vec<Instruction>,
    arg_types: &Map<Var, Type>,
    supply: &mut NameSupply,
) -> Vec<Instruction> {
    let mut table = Numbering::new();
    let mut out: Vec<Instruction> = vec![];

    if instrs.first().map(Instruction::is_label).unwrap_or(false) {
        out.push(instrs[0].clone());
    }

    // capture block inputs that are later redefined, so their opaque
    // value keeps a live canonical location
    for var in block_inputs_redefined(&instrs) {
        let fresh = supply.suffixed(&var);
        let typ = arg_types.get(&var).cloned().unwrap_or(Type::Int);
        let num = table.fresh_num();
        table
            .rows
            .push((num, Value::Opaque(var.clone()), fresh.clone()));
        table.var_to_num.insert(var.clone(), num);
        out.push(Instruction::id(fresh, typ, var));
    }

    for (i, instr) in instrs.iter().enumerate() {
        if instr.is_label() {
            continue;
        }
        let code = instr.as_code().unwrap();

        if code.dest.is_some() && interpretable(code) {
            let dest = code.dest.clone().unwrap();
            let value = instr_to_value(code, &mut table);

            if let Some(num) = table.lookup(&value) {
                table.var_to_num.insert(dest.clone(), num);
                let replacement = if value.is_const() {
                    let typ = code.typ.clone().unwrap_or(Type::Int);
                    let Value::Const(lit) = value else { unreachable!() };
                    Instruction::constant(dest, typ, lit)
                } else {
                    let typ = code.typ.clone().unwrap_or(Type::Int);
                    Instruction::id(dest, typ, table.canonical(num).clone())
                };
                trace!("lvn: reused value for {replacement}");
                out.push(replacement);
            } else {
                let num = table.fresh_num();
                let overwritten = instrs[i + 1..].iter().any(|later| later.dest() == Some(&dest));
                let location = if overwritten {
                    supply.suffixed(&dest)
                } else {
                    dest.clone()
                };
                table.rows.push((num, value.clone(), location.clone()));
                table.var_to_num.insert(dest, num);
                out.push(value_to_instr(location, &value, &table, code));
            }
        } else if code.dest.is_some() {
            // memory, float, vector and speculative defs are opaque to the
            // numbering but their arguments still canonicalize
            let mut code = code.clone();
            if code.op != Op::Phi {
                for arg in code.args.iter_mut() {
                    if let Some(num) = table.var_to_num.get(arg) {
                        *arg = table.canonical(*num).clone();
                    }
                }
            }
            let dest = code.dest.clone().unwrap();
            let num = table.fresh_num();
            let overwritten = instrs[i + 1..].iter().any(|later| later.dest() == Some(&dest));
            let location = if overwritten {
                supply.suffixed(&dest)
            } else {
                dest.clone()
            };
            code.dest = Some(location.clone());
            table
                .rows
                .push((num, Value::Opaque(location.clone()), location));
            table.var_to_num.insert(dest, num);
            out.push(Instruction::Code(code));
        } else {
            // effect position: canonicalize plain argument lists and guards
            let rewrite = (!code.args.is_empty() && code.labels.is_empty()) || code.op == Op::Guard;
            if rewrite {
                let mut code = code.clone();
                for arg in code.args.iter_mut() {
                    if let Some(num) = table.var_to_num.get(arg) {
                        *arg = table.canonical(*num).clone();
                    }
                }
                out.push(Instruction::Code(code));
            } else {
                out.push(instr.clone());
            }
        }
    }

    out
}

/// The actual pass.
pub fn lvn(program: Valid<Program>) -> Valid<Program> {
    let mut program = program.0;
    let mut supply = NameSupply::new();
    for func in &mut program.functions {
        let arg_types: Map<Var, Type> = func
            .args
            .iter()
            .map(|p| (p.name.clone(), p.typ.clone()))
            .collect();
        let mut types = arg_types.clone();
        for instr in &func.instrs {
            if let (Some(dest), Some(typ)) = (instr.dest(), instr.typ()) {
                types.insert(dest.clone(), typ.clone());
            }
        }
        let blocks = form_blocks(&func.instrs);
        let mut new_blocks = vec![];
        for block in blocks {
            new_blocks.push(lvn_block(block, &types, &mut supply));
        }
        func.instrs = join_blocks(new_blocks);
    }
    program.validate().expect("lvn produced malformed IR")
}
