use std::{collections::HashMap, fmt, rc::Rc};

use crate::{
    builtins::{Builtin, Builtins},
    runtime::{
        slots::Shape,
        value::{Callable, Value},
    },
};

/// A compiled program: its functions lowered to instruction units, plus the
/// natives they may call.
#[derive(Debug)]
pub struct Module {
    pub imports: Vec<ImportEntry>,
    pub natives: Builtins,
    pub units: Vec<Unit>,
    index: HashMap<Rc<str>, usize>,
}

impl Module {
    pub fn new(imports: Vec<ImportEntry>, natives: Builtins, units: Vec<Unit>) -> Module {
        let index = units
            .iter()
            .enumerate()
            .map(|(i, unit)| (Rc::clone(&unit.name), i))
            .collect();
        Module {
            imports,
            natives,
            units,
            index,
        }
    }

    pub fn unit(&self, name: &str) -> Option<&Unit> {
        self.index.get(name).map(|&i| &self.units[i])
    }

    pub fn native(&self, name: &str) -> Option<&Rc<Builtin>> {
        self.natives.get(name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImportEntry {
    pub alias: Option<Rc<str>>,
    pub path: Box<str>,
}

/// One lowered function.
#[derive(Debug)]
pub struct Unit {
    pub name: Rc<str>,
    /// Expanded alias of the full signature, arguments first.
    pub signature: String,
    pub shape: Shape,
    pub code: Vec<Instr>,
}

/// Stack machine instructions. Each expression leaves exactly one value on
/// the operand stack.
#[derive(Clone, Debug, PartialEq)]
pub enum Instr {
    Const(Value),
    Load(Rc<str>),
    Store(Rc<str>),
    /// Pushes a global function as a value.
    Global(Callable),
    /// Calls a global with the top `argc` values.
    Call { callee: Callable, argc: usize },
    /// Calls the callable held by a local.
    CallLocal { name: Rc<str>, argc: usize },
    /// Pops a callable and the `captured` values below it, pushing a partial
    /// application.
    Apply { captured: usize },
    Index,
    /// Flattens the top `n` values into one.
    Pack(usize),
    Pop,
    Jump(usize),
    JumpUnless(usize),
    /// Returns the top `n` values, flattened.
    Return(usize),
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Const(Value::Str(s)) => write!(f, "const {s:?}"),
            Instr::Const(value) => write!(f, "const {value}"),
            Instr::Load(name) => write!(f, "load {name}"),
            Instr::Store(name) => write!(f, "store {name}"),
            Instr::Global(callable) => write!(f, "global {}", CallableName(callable)),
            Instr::Call { callee, argc } => write!(f, "call {} {argc}", CallableName(callee)),
            Instr::CallLocal { name, argc } => write!(f, "call.local {name} {argc}"),
            Instr::Apply { captured } => write!(f, "apply {captured}"),
            Instr::Index => f.write_str("index"),
            Instr::Pack(n) => write!(f, "pack {n}"),
            Instr::Pop => f.write_str("pop"),
            Instr::Jump(target) => write!(f, "jump {target}"),
            Instr::JumpUnless(target) => write!(f, "jump.unless {target}"),
            Instr::Return(n) => write!(f, "ret {n}"),
        }
    }
}

struct CallableName<'a>(&'a Callable);

impl fmt::Display for CallableName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Callable::Unit(name) => write!(f, "{name}"),
            Callable::Native(name) => write!(f, "native.{name}"),
            Callable::Partial(_) => write!(f, "{}", self.0),
        }
    }
}
