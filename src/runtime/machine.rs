use std::{collections::HashMap, io, rc::Rc};

use tracing::{debug, trace};

use crate::{
    builtins::Builtin,
    codegen::{Instr, Module, Unit},
    runtime::{
        error::{RuntimeError, RuntimeResult},
        slots::Slots,
        value::{flatten, pack, Callable, Value},
    },
};

pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// Executes the units of a [`Module`], writing program output to `out`.
pub struct Machine<'m, W> {
    module: &'m Module,
    out: W,
    depth: usize,
    max_depth: usize,
}

impl<'m, W> Machine<'m, W>
where
    W: io::Write,
{
    pub fn new(module: &'m Module, out: W) -> Machine<'m, W> {
        Machine {
            module,
            out,
            depth: 0,
            max_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Calls the unit or native named `name` under the variadic calling
    /// convention.
    pub fn call(&mut self, name: &str, args: Vec<Value>) -> RuntimeResult<Value> {
        let callee = if self.module.unit(name).is_some() {
            Callable::Unit(Rc::from(name))
        } else if self.module.native(name).is_some() {
            Callable::Native(Rc::from(name))
        } else {
            return Err(RuntimeError::UndefinedFunction(Rc::from(name)));
        };
        self.invoke(&callee, args)
    }

    pub fn invoke(&mut self, callee: &Callable, args: Vec<Value>) -> RuntimeResult<Value> {
        let module = self.module;
        match callee {
            Callable::Unit(name) => {
                let unit = module
                    .unit(name)
                    .ok_or_else(|| RuntimeError::UndefinedFunction(Rc::clone(name)))?;
                self.nested(|this| this.run_unit(unit, args))
            }
            Callable::Native(name) => {
                let native = module
                    .native(name)
                    .ok_or_else(|| RuntimeError::UndefinedFunction(Rc::clone(name)))?;
                self.nested(|this| this.run_native(native, args))
            }
            Callable::Partial(partial) => {
                let mut all = partial.captured.clone();
                all.extend(args);
                self.invoke(&partial.target, all)
            }
        }
    }

    fn nested(&mut self, f: impl FnOnce(&mut Self) -> RuntimeResult<Value>) -> RuntimeResult<Value> {
        if self.depth >= self.max_depth {
            return Err(RuntimeError::CallDepthExceeded(self.max_depth));
        }
        self.depth += 1;
        let res = f(self);
        self.depth -= 1;
        res
    }

    fn run_native(&mut self, native: &Builtin, args: Vec<Value>) -> RuntimeResult<Value> {
        let slots = Slots::enter(&native.name, &native.shape, args)?;
        let argv = slots.arguments()?;
        let result = (native.func)(&argv, &mut self.out)?;
        slots.settle(vec![result])
    }

    fn run_unit(&mut self, unit: &'m Unit, args: Vec<Value>) -> RuntimeResult<Value> {
        let slots = Slots::enter(&unit.name, &unit.shape, args)?;
        let mut frame = Frame {
            locals: unit
                .shape
                .params
                .iter()
                .map(|(name, _)| Rc::clone(name))
                .zip(slots.arguments()?)
                .collect(),
            stack: Vec::with_capacity(16),
        };
        debug!(unit = %unit.name, depth = self.depth, "running");

        let mut pc = 0;
        while let Some(instr) = unit.code.get(pc) {
            trace!(unit = %unit.name, pc, %instr);
            pc += 1;
            match instr {
                Instr::Const(value) => frame.push(value.clone()),
                Instr::Load(name) => {
                    let value = frame
                        .locals
                        .get(name)
                        .cloned()
                        .ok_or_else(|| RuntimeError::UnboundLocal(Rc::clone(name)))?;
                    frame.push(value);
                }
                Instr::Store(name) => {
                    let value = frame.pop()?;
                    frame.locals.insert(Rc::clone(name), value);
                }
                Instr::Global(callable) => frame.push(Value::Callable(callable.clone())),
                Instr::Call { callee, argc } => {
                    let args = frame.pop_n(*argc)?;
                    let result = self.invoke(callee, args)?;
                    frame.push(result);
                }
                Instr::CallLocal { name, argc } => {
                    let args = frame.pop_n(*argc)?;
                    let target = frame
                        .locals
                        .get(name)
                        .ok_or_else(|| RuntimeError::UnboundLocal(Rc::clone(name)))?
                        .as_callable()?
                        .clone();
                    let result = self.invoke(&target, args)?;
                    frame.push(result);
                }
                Instr::Apply { captured } => {
                    let target = frame.pop()?.as_callable()?.clone();
                    let captured = flatten(frame.pop_n(*captured)?);
                    frame.push(Value::Callable(Callable::partial(target, captured)));
                }
                Instr::Index => {
                    let index = frame.pop()?;
                    let base = frame.pop()?;
                    frame.push(index_into(&base, &index)?);
                }
                Instr::Pack(n) => {
                    let values = flatten(frame.pop_n(*n)?);
                    frame.push(pack(values));
                }
                Instr::Pop => {
                    frame.pop()?;
                }
                Instr::Jump(target) => pc = *target,
                Instr::JumpUnless(target) => {
                    if !frame.pop()?.as_bool()? {
                        pc = *target;
                    }
                }
                Instr::Return(n) => {
                    let values = frame.pop_n(*n)?;
                    return slots.settle(values);
                }
            }
        }
        Err(RuntimeError::NoReturn {
            function: Rc::clone(&unit.name),
        })
    }
}

struct Frame {
    locals: HashMap<Rc<str>, Value>,
    stack: Vec<Value>,
}

impl Frame {
    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> RuntimeResult<Value> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    /// Pops `n` values, returned in push order.
    fn pop_n(&mut self, n: usize) -> RuntimeResult<Vec<Value>> {
        let at = self
            .stack
            .len()
            .checked_sub(n)
            .ok_or(RuntimeError::StackUnderflow)?;
        Ok(self.stack.split_off(at))
    }
}

/// Indexes a multi-value; negative indices count from the end.
fn index_into(base: &Value, index: &Value) -> RuntimeResult<Value> {
    let Value::Tuple(items) = base else {
        return Err(RuntimeError::NotIndexable(base.describe()));
    };
    let Value::Int(i) = *index else {
        return Err(RuntimeError::Representation {
            expected: crate::types::Repr::Int,
            actual: index.describe(),
        });
    };
    let len = items.len();
    let resolved = if i < 0 {
        usize::try_from(i.unsigned_abs())
            .ok()
            .and_then(|back| len.checked_sub(back))
    } else {
        usize::try_from(i).ok().filter(|&i| i < len)
    };
    resolved
        .map(|i| items[i].clone())
        .ok_or(RuntimeError::IndexOutOfRange { index: i, len })
}
