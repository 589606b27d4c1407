//! The intermediate representation: programs, functions, instructions,
//! types, and literals, together with the predicates and builders the
//! passes lean on.
//!
//! The serialized form is JSON.  A program is `{"functions": [...]}`; an
//! instruction is either `{"label": L}` or an operation record carrying
//! `op` plus whichever of `dest`, `type`, `args`, `funcs`, `labels`,
//! `value` the opcode uses.  Types are the strings `int`, `bool`, `float`,
//! `vector`, or `{"ptr": T}`.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::commons::{Valid, ValidationError};

pub type Var = String;
pub type Label = String;

/// Lanes per vector register.
pub const VECTOR_LANE_WIDTH: usize = 4;

// SECTION: types

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Type {
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "vector")]
    Vector,
    #[serde(rename = "ptr")]
    Ptr(Box<Type>),
}

impl Type {
    pub fn ptr_to(inner: Type) -> Type {
        Type::Ptr(Box::new(inner))
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, Type::Ptr(_))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Bool => write!(f, "bool"),
            Type::Float => write!(f, "float"),
            Type::Vector => write!(f, "vector"),
            Type::Ptr(inner) => write!(f, "ptr<{inner}>"),
        }
    }
}

// SECTION: literals

/// A constant literal.  Floats are ordered and hashed through
/// `f64::total_cmp` so literals can key value-numbering tables.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Literal {}

impl PartialOrd for Literal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Literal {
    fn cmp(&self, other: &Self) -> Ordering {
        use Literal::*;
        match (self, other) {
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Bool(_), _) => Ordering::Less,
            (_, Bool(_)) => Ordering::Greater,
            (Int(_), _) => Ordering::Less,
            (_, Int(_)) => Ordering::Greater,
        }
    }
}

impl Hash for Literal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Literal::Bool(b) => (0u8, *b as u8 as u64).hash(state),
            Literal::Int(n) => (1u8, *n as u64).hash(state),
            Literal::Float(x) => (2u8, x.to_bits()).hash(state),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Int(n) => write!(f, "{n}"),
            Literal::Float(x) => write!(f, "{x}"),
        }
    }
}

// SECTION: opcodes

/// The closed opcode universe.  Adding an opcode here forces every
/// exhaustive match in the passes to acknowledge it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Const,
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Lt,
    Gt,
    Le,
    Ge,
    Not,
    And,
    Or,
    Jmp,
    Br,
    Ret,
    Call,
    Id,
    Print,
    Nop,
    Phi,
    Alloc,
    Free,
    Load,
    Store,
    PtrAdd,
    FAdd,
    FSub,
    FMul,
    FDiv,
    Speculate,
    Commit,
    Guard,
    VecAdd,
    VecSub,
    VecMul,
    VecDiv,
    VecNeg,
    VecMac,
    VecLoad,
    VecStore,
    VecZero,
    VecMove,
}

pub const TERMINATORS: [Op; 3] = [Op::Jmp, Op::Br, Op::Ret];

pub const COMMUTATIVE: [Op; 5] = [Op::Add, Op::Mul, Op::And, Op::Or, Op::Eq];

impl Op {
    pub fn as_str(&self) -> &'static str {
        use Op::*;
        match self {
            Const => "const",
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Div => "div",
            Eq => "eq",
            Lt => "lt",
            Gt => "gt",
            Le => "le",
            Ge => "ge",
            Not => "not",
            And => "and",
            Or => "or",
            Jmp => "jmp",
            Br => "br",
            Ret => "ret",
            Call => "call",
            Id => "id",
            Print => "print",
            Nop => "nop",
            Phi => "phi",
            Alloc => "alloc",
            Free => "free",
            Load => "load",
            Store => "store",
            PtrAdd => "ptradd",
            FAdd => "fadd",
            FSub => "fsub",
            FMul => "fmul",
            FDiv => "fdiv",
            Speculate => "speculate",
            Commit => "commit",
            Guard => "guard",
            VecAdd => "vecadd",
            VecSub => "vecsub",
            VecMul => "vecmul",
            VecDiv => "vecdiv",
            VecNeg => "vecneg",
            VecMac => "vecmac",
            VecLoad => "vecload",
            VecStore => "vecstore",
            VecZero => "veczero",
            VecMove => "vecmove",
        }
    }

    pub fn is_terminator(&self) -> bool {
        TERMINATORS.contains(self)
    }

    /// Integer arithmetic.
    pub fn is_arith(&self) -> bool {
        matches!(self, Op::Add | Op::Sub | Op::Mul | Op::Div)
    }

    pub fn is_cmp(&self) -> bool {
        matches!(self, Op::Eq | Op::Lt | Op::Gt | Op::Le | Op::Ge)
    }

    pub fn is_logic(&self) -> bool {
        matches!(self, Op::Not | Op::And | Op::Or)
    }

    /// The binary operators the value-numbering and availability engines
    /// interpret.
    pub fn is_core_binop(&self) -> bool {
        self.is_arith() || self.is_cmp() || matches!(self, Op::And | Op::Or)
    }

    pub fn is_core_unop(&self) -> bool {
        matches!(self, Op::Not)
    }

    pub fn is_commutative(&self) -> bool {
        COMMUTATIVE.contains(self)
    }

    pub fn is_mem(&self) -> bool {
        matches!(self, Op::Alloc | Op::Free | Op::Load | Op::Store | Op::PtrAdd)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Op::FAdd | Op::FSub | Op::FMul | Op::FDiv)
    }

    pub fn is_vec(&self) -> bool {
        matches!(
            self,
            Op::VecAdd
                | Op::VecSub
                | Op::VecMul
                | Op::VecDiv
                | Op::VecNeg
                | Op::VecMac
                | Op::VecLoad
                | Op::VecStore
                | Op::VecZero
                | Op::VecMove
        )
    }

    /// The vector counterpart of a scalar arithmetic opcode.
    pub fn vec_op(&self) -> Option<Op> {
        match self {
            Op::Add => Some(Op::VecAdd),
            Op::Sub => Some(Op::VecSub),
            Op::Mul => Some(Op::VecMul),
            Op::Div => Some(Op::VecDiv),
            _ => None,
        }
    }

    /// Result type of an interpretable operator, when fixed.
    pub fn result_type(&self) -> Option<Type> {
        if self.is_arith() {
            Some(Type::Int)
        } else if self.is_cmp() || self.is_logic() {
            Some(Type::Bool)
        } else if self.is_float() {
            Some(Type::Float)
        } else {
            None
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// SECTION: instructions

/// An operation record: the union of fields an opcode can carry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Code {
    pub op: Op,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<Var>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<Type>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Var>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub funcs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Literal>,
}

/// An instruction is a block-header label or an operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Instruction {
    Label { label: Label },
    Code(Code),
}

impl Instruction {
    // constructors, mirroring the opcode table

    pub fn label(name: impl Into<Label>) -> Self {
        Instruction::Label { label: name.into() }
    }

    fn code(op: Op) -> Code {
        Code {
            op,
            dest: None,
            typ: None,
            args: vec![],
            funcs: vec![],
            labels: vec![],
            value: None,
        }
    }

    pub fn constant(dest: impl Into<Var>, typ: Type, value: Literal) -> Self {
        let mut c = Self::code(Op::Const);
        c.dest = Some(dest.into());
        c.typ = Some(typ);
        c.value = Some(value);
        Instruction::Code(c)
    }

    pub fn const_int(dest: impl Into<Var>, value: i64) -> Self {
        Self::constant(dest, Type::Int, Literal::Int(value))
    }

    pub fn binop(op: Op, dest: impl Into<Var>, typ: Type, lhs: impl Into<Var>, rhs: impl Into<Var>) -> Self {
        let mut c = Self::code(op);
        c.dest = Some(dest.into());
        c.typ = Some(typ);
        c.args = vec![lhs.into(), rhs.into()];
        Instruction::Code(c)
    }

    pub fn unop(op: Op, dest: impl Into<Var>, typ: Type, arg: impl Into<Var>) -> Self {
        let mut c = Self::code(op);
        c.dest = Some(dest.into());
        c.typ = Some(typ);
        c.args = vec![arg.into()];
        Instruction::Code(c)
    }

    pub fn id(dest: impl Into<Var>, typ: Type, arg: impl Into<Var>) -> Self {
        Self::unop(Op::Id, dest, typ, arg)
    }

    pub fn jmp(target: impl Into<Label>) -> Self {
        let mut c = Self::code(Op::Jmp);
        c.labels = vec![target.into()];
        Instruction::Code(c)
    }

    pub fn br(cond: impl Into<Var>, tt: impl Into<Label>, ff: impl Into<Label>) -> Self {
        let mut c = Self::code(Op::Br);
        c.args = vec![cond.into()];
        c.labels = vec![tt.into(), ff.into()];
        Instruction::Code(c)
    }

    pub fn ret(arg: Option<Var>) -> Self {
        let mut c = Self::code(Op::Ret);
        c.args = arg.into_iter().collect();
        Instruction::Code(c)
    }

    pub fn speculate() -> Self {
        Instruction::Code(Self::code(Op::Speculate))
    }

    pub fn commit() -> Self {
        Instruction::Code(Self::code(Op::Commit))
    }

    pub fn guard(cond: impl Into<Var>, bailout: impl Into<Label>) -> Self {
        let mut c = Self::code(Op::Guard);
        c.args = vec![cond.into()];
        c.labels = vec![bailout.into()];
        Instruction::Code(c)
    }

    pub fn veczero(dest: impl Into<Var>) -> Self {
        let mut c = Self::code(Op::VecZero);
        c.dest = Some(dest.into());
        c.typ = Some(Type::Vector);
        Instruction::Code(c)
    }

    /// Writes the scalar `val` into lane `idx` of `vec`.
    pub fn vecload(vec: impl Into<Var>, idx: impl Into<Var>, val: impl Into<Var>) -> Self {
        let mut c = Self::code(Op::VecLoad);
        c.args = vec![vec.into(), idx.into(), val.into()];
        Instruction::Code(c)
    }

    /// Reads lane `idx` of `vec` into the scalar destination.
    pub fn vecstore(dest: impl Into<Var>, vec: impl Into<Var>, idx: impl Into<Var>) -> Self {
        let mut c = Self::code(Op::VecStore);
        c.dest = Some(dest.into());
        c.typ = Some(Type::Int);
        c.args = vec![vec.into(), idx.into()];
        Instruction::Code(c)
    }

    pub fn vecmove(dest: impl Into<Var>, src: impl Into<Var>) -> Self {
        let mut c = Self::code(Op::VecMove);
        c.dest = Some(dest.into());
        c.typ = Some(Type::Vector);
        c.args = vec![src.into()];
        Instruction::Code(c)
    }

    pub fn vecbinop(op: Op, dest: impl Into<Var>, lhs: impl Into<Var>, rhs: impl Into<Var>) -> Self {
        let mut c = Self::code(op);
        c.dest = Some(dest.into());
        c.typ = Some(Type::Vector);
        c.args = vec![lhs.into(), rhs.into()];
        Instruction::Code(c)
    }

    pub fn phi(dest: impl Into<Var>, typ: Type, args: Vec<Var>, labels: Vec<Label>) -> Self {
        let mut c = Self::code(Op::Phi);
        c.dest = Some(dest.into());
        c.typ = Some(typ);
        c.args = args;
        c.labels = labels;
        Instruction::Code(c)
    }

    // accessors

    pub fn as_code(&self) -> Option<&Code> {
        match self {
            Instruction::Code(c) => Some(c),
            Instruction::Label { .. } => None,
        }
    }

    pub fn as_code_mut(&mut self) -> Option<&mut Code> {
        match self {
            Instruction::Code(c) => Some(c),
            Instruction::Label { .. } => None,
        }
    }

    pub fn op(&self) -> Option<Op> {
        self.as_code().map(|c| c.op)
    }

    pub fn dest(&self) -> Option<&Var> {
        self.as_code().and_then(|c| c.dest.as_ref())
    }

    pub fn typ(&self) -> Option<&Type> {
        self.as_code().and_then(|c| c.typ.as_ref())
    }

    pub fn args(&self) -> &[Var] {
        self.as_code().map(|c| c.args.as_slice()).unwrap_or(&[])
    }

    pub fn labels(&self) -> &[Label] {
        self.as_code().map(|c| c.labels.as_slice()).unwrap_or(&[])
    }

    pub fn label_name(&self) -> Option<&Label> {
        match self {
            Instruction::Label { label } => Some(label),
            Instruction::Code(_) => None,
        }
    }

    // predicates

    pub fn is_label(&self) -> bool {
        matches!(self, Instruction::Label { .. })
    }

    pub fn is(&self, op: Op) -> bool {
        self.op() == Some(op)
    }

    pub fn is_terminator(&self) -> bool {
        self.op().map(|op| op.is_terminator()).unwrap_or(false)
    }

    pub fn is_phi(&self) -> bool {
        self.is(Op::Phi)
    }

    pub fn is_const(&self) -> bool {
        self.is(Op::Const)
    }

    pub fn is_call(&self) -> bool {
        self.is(Op::Call)
    }

    pub fn is_id(&self) -> bool {
        self.is(Op::Id)
    }

    pub fn is_print(&self) -> bool {
        self.is(Op::Print)
    }

    pub fn is_mem(&self) -> bool {
        self.op().map(|op| op.is_mem()).unwrap_or(false)
    }

    pub fn is_store(&self) -> bool {
        self.is(Op::Store)
    }

    pub fn is_load(&self) -> bool {
        self.is(Op::Load)
    }

    pub fn is_guard(&self) -> bool {
        self.is(Op::Guard)
    }

    /// Float opcode, or any instruction producing a float.
    pub fn touches_float(&self) -> bool {
        self.op().map(|op| op.is_float()).unwrap_or(false) || self.typ() == Some(&Type::Float)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Instruction::Label { label } => write!(f, ".{label}:"),
            Instruction::Code(c) => {
                if let Some(dest) = &c.dest {
                    write!(f, "{dest}")?;
                    if let Some(typ) = &c.typ {
                        write!(f, ": {typ}")?;
                    }
                    write!(f, " = ")?;
                }
                write!(f, "{}", c.op)?;
                for func in &c.funcs {
                    write!(f, " @{func}")?;
                }
                for arg in &c.args {
                    write!(f, " {arg}")?;
                }
                for label in &c.labels {
                    write!(f, " .{label}")?;
                }
                if let Some(value) = &c.value {
                    write!(f, " {value}")?;
                }
                Ok(())
            }
        }
    }
}

// SECTION: functions and programs

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: Var,
    #[serde(rename = "type")]
    pub typ: Type,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Param>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<Type>,
    pub instrs: Vec<Instruction>,
}

impl Function {
    pub fn has_mem_ops(&self) -> bool {
        self.instrs.iter().any(Instruction::is_mem)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub functions: Vec<Function>,
}

impl Program {
    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn get_function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    pub fn has_mem_ops(&self) -> bool {
        self.functions.iter().any(Function::has_mem_ops)
    }

    pub fn from_reader(r: impl Read) -> serde_json::Result<Program> {
        serde_json::from_reader(r)
    }

    pub fn to_writer(&self, w: impl Write, pretty: bool) -> serde_json::Result<()> {
        if pretty {
            serde_json::to_writer_pretty(w, self)
        } else {
            serde_json::to_writer(w, self)
        }
    }

    /// Structural validation.  Every pass boundary goes through here so a
    /// malformed program is reported at the pass that produced it.
    pub fn validate(self) -> Result<Valid<Program>, ValidationError> {
        use std::collections::BTreeSet as Set;

        if self.functions.is_empty() {
            return Err(ValidationError::EmptyProgram);
        }
        let mut names = Set::new();
        for func in &self.functions {
            if !names.insert(func.name.clone()) {
                return Err(ValidationError::DuplicateFunction(func.name.clone()));
            }
        }
        for func in &self.functions {
            let known_labels: Set<&Label> = func
                .instrs
                .iter()
                .filter_map(|i| i.label_name())
                .collect();
            let defined: Set<&Var> = func
                .args
                .iter()
                .map(|p| &p.name)
                .chain(func.instrs.iter().filter_map(Instruction::dest))
                .collect();
            for instr in &func.instrs {
                let code = match instr {
                    Instruction::Label { .. } => continue,
                    Instruction::Code(c) => c,
                };
                for arg in &code.args {
                    if !defined.contains(arg) {
                        return Err(ValidationError::UndefinedVariable {
                            func: func.name.clone(),
                            var: arg.clone(),
                        });
                    }
                }
                validate_code(func, code, &known_labels)?;
            }
        }
        Ok(Valid(self))
    }
}

fn validate_code(
    func: &Function,
    code: &Code,
    known_labels: &std::collections::BTreeSet<&Label>,
) -> Result<(), ValidationError> {
    let fname = || func.name.clone();
    let dest_name = || code.dest.clone().unwrap_or_default();

    for label in &code.labels {
        if !known_labels.contains(label) {
            return Err(ValidationError::UnknownLabel {
                func: fname(),
                label: label.clone(),
            });
        }
    }

    let want_labels = match code.op {
        Op::Jmp | Op::Guard => Some(1),
        Op::Br => Some(2),
        Op::Ret => Some(0),
        _ => None,
    };
    if let Some(want) = want_labels {
        if code.labels.len() != want {
            return Err(ValidationError::LabelArity {
                func: fname(),
                op: code.op.to_string(),
                want,
                got: code.labels.len(),
            });
        }
    }

    let want_args = match code.op {
        op if op.is_core_binop() => Some(2),
        op if op.is_float() => Some(2),
        Op::Not | Op::Id | Op::Free | Op::Load | Op::Alloc => Some(1),
        Op::Store | Op::PtrAdd => Some(2),
        Op::Br | Op::Guard => Some(1),
        Op::Const | Op::Jmp | Op::Nop | Op::Speculate | Op::Commit | Op::VecZero => Some(0),
        Op::VecLoad => Some(3),
        Op::VecStore => Some(2),
        Op::VecMove | Op::VecNeg => Some(1),
        Op::VecAdd | Op::VecSub | Op::VecMul | Op::VecDiv => Some(2),
        Op::VecMac => Some(3),
        _ => None,
    };
    if let Some(want) = want_args {
        if code.args.len() != want {
            return Err(ValidationError::ArgArity {
                func: fname(),
                op: code.op.to_string(),
                want,
                got: code.args.len(),
            });
        }
    }

    if code.op == Op::Phi && code.args.len() != code.labels.len() {
        return Err(ValidationError::PhiArity {
            func: fname(),
            dest: dest_name(),
            args: code.args.len(),
            labels: code.labels.len(),
        });
    }

    if code.op == Op::Const && code.value.is_none() {
        return Err(ValidationError::MissingValue {
            func: fname(),
            dest: dest_name(),
        });
    }

    if code.dest.is_some() && code.typ.is_none() {
        return Err(ValidationError::MissingType {
            func: fname(),
            dest: dest_name(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn type_round_trip() {
        let t: Type = serde_json::from_str(r#"{"ptr": {"ptr": "int"}}"#).unwrap();
        assert_eq!(t, Type::ptr_to(Type::ptr_to(Type::Int)));
        assert_eq!(
            serde_json::to_string(&t).unwrap(),
            r#"{"ptr":{"ptr":"int"}}"#
        );
        let scalar: Type = serde_json::from_str(r#""bool""#).unwrap();
        assert_eq!(scalar, Type::Bool);
    }

    #[test]
    fn instruction_round_trip() {
        let json = r#"{"op": "add", "dest": "c", "type": "int", "args": ["a", "b"]}"#;
        let instr: Instruction = serde_json::from_str(json).unwrap();
        assert_eq!(instr, Instruction::binop(Op::Add, "c", Type::Int, "a", "b"));

        let label: Instruction = serde_json::from_str(r#"{"label": "loop"}"#).unwrap();
        assert_eq!(label, Instruction::label("loop"));

        let konst: Instruction =
            serde_json::from_str(r#"{"op": "const", "dest": "x", "type": "int", "value": 4}"#)
                .unwrap();
        assert_eq!(konst, Instruction::const_int("x", 4));
    }

    #[test]
    fn literal_untagged_order() {
        // true must parse as a bool, 3 as an int, 3.5 as a float
        let v: Literal = serde_json::from_str("true").unwrap();
        assert_eq!(v, Literal::Bool(true));
        let v: Literal = serde_json::from_str("3").unwrap();
        assert_eq!(v, Literal::Int(3));
        let v: Literal = serde_json::from_str("3.5").unwrap();
        assert_eq!(v, Literal::Float(3.5));
    }

    #[test]
    fn validate_rejects_undefined_use() {
        let prog = Program {
            functions: vec![Function {
                name: "main".into(),
                args: vec![],
                typ: None,
                instrs: vec![
                    Instruction::Code(Code {
                        op: Op::Print,
                        dest: None,
                        typ: None,
                        args: vec!["ghost".into()],
                        funcs: vec![],
                        labels: vec![],
                        value: None,
                    }),
                    Instruction::ret(None),
                ],
            }],
        };
        assert_eq!(
            prog.validate().err(),
            Some(ValidationError::UndefinedVariable {
                func: "main".into(),
                var: "ghost".into()
            })
        );
    }

    #[test]
    fn validate_rejects_bad_branch() {
        let prog = Program {
            functions: vec![Function {
                name: "main".into(),
                args: vec![],
                typ: None,
                instrs: vec![Instruction::Code(Code {
                    op: Op::Jmp,
                    dest: None,
                    typ: None,
                    args: vec![],
                    funcs: vec![],
                    labels: vec!["nowhere".into()],
                    value: None,
                })],
            }],
        };
        assert_eq!(
            prog.validate().err(),
            Some(ValidationError::UnknownLabel {
                func: "main".into(),
                label: "nowhere".into()
            })
        );
    }
}
