//! The variadic calling convention.
//!
//! Every callee owns `total_arity` slots: its arguments followed by its
//! return values. A call may supply up to that many values; values reaching
//! the return slots are expectations the callee's actual results must meet.

use std::rc::Rc;

use tracing::trace;

use crate::{
    runtime::{
        error::{RuntimeError, RuntimeResult},
        value::{flatten, pack, Value},
    },
    types::Repr,
};

/// The runtime shape of a callee: one representation per slot.
#[derive(Clone, Debug, PartialEq)]
pub struct Shape {
    pub params: Rc<[(Rc<str>, Repr)]>,
    pub returns: Rc<[Repr]>,
}

impl Shape {
    pub fn total_arity(&self) -> usize {
        self.params.len() + self.returns.len()
    }

    fn repr(&self, slot: usize) -> Repr {
        match self.params.get(slot) {
            Some(&(_, repr)) => repr,
            None => self.returns[slot - self.params.len()],
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Slot {
    NeedsValue,
    CallerSupplied(Value),
    Computed(Value),
}

/// The slots of one activation.
#[derive(Debug)]
pub struct Slots<'s> {
    function: &'s Rc<str>,
    shape: &'s Shape,
    slots: Vec<Slot>,
}

impl<'s> Slots<'s> {
    /// Binds the supplied values, flattened, to the leading slots.
    pub fn enter(
        function: &'s Rc<str>,
        shape: &'s Shape,
        supplied: Vec<Value>,
    ) -> RuntimeResult<Slots<'s>> {
        let supplied = flatten(supplied);
        let limit = shape.total_arity();
        if supplied.len() > limit {
            return Err(RuntimeError::ArityExceeded {
                function: Rc::clone(function),
                limit,
                actual: supplied.len(),
            });
        }
        let mut slots = Vec::with_capacity(limit);
        for (i, value) in supplied.into_iter().enumerate() {
            slots.push(Slot::CallerSupplied(value.coerce(shape.repr(i))?));
        }
        slots.resize(limit, Slot::NeedsValue);
        trace!(%function, supplied = ?slots, "entered");
        Ok(Slots {
            function,
            shape,
            slots,
        })
    }

    /// The argument values; every argument slot must have been supplied.
    pub fn arguments(&self) -> RuntimeResult<Vec<Value>> {
        self.shape
            .params
            .iter()
            .zip(&self.slots)
            .map(|((param, _), slot)| match slot {
                Slot::CallerSupplied(value) => Ok(value.clone()),
                Slot::NeedsValue | Slot::Computed(_) => Err(RuntimeError::MissingArgument {
                    function: Rc::clone(self.function),
                    param: Rc::clone(param),
                }),
            })
            .collect()
    }

    /// Fills the return slots with the computed results, checking them
    /// against the caller's expectations, and yields what the call
    /// evaluates to.
    pub fn settle(mut self, computed: Vec<Value>) -> RuntimeResult<Value> {
        let computed = flatten(computed);
        let returns = self.shape.returns.len();
        if computed.len() != returns {
            return Err(RuntimeError::ReturnCount {
                function: Rc::clone(self.function),
                expected: returns,
                actual: computed.len(),
            });
        }
        let offset = self.shape.params.len();
        for (i, value) in computed.into_iter().enumerate() {
            let value = value.coerce(self.shape.returns[i])?;
            let slot = &mut self.slots[offset + i];
            if let Slot::CallerSupplied(expected) = slot {
                if *expected != value {
                    return Err(RuntimeError::ReturnMismatch {
                        function: Rc::clone(self.function),
                        expected: expected.to_string(),
                        actual: value.to_string(),
                    });
                }
            }
            *slot = Slot::Computed(value);
        }
        let results = self
            .slots
            .drain(offset..)
            .map(|slot| match slot {
                Slot::Computed(value) => value,
                Slot::NeedsValue | Slot::CallerSupplied(_) => {
                    unreachable!("every return slot was computed above")
                }
            })
            .collect();
        Ok(pack(results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(params: &[Repr], returns: &[Repr]) -> Shape {
        Shape {
            params: params
                .iter()
                .enumerate()
                .map(|(i, &repr)| (Rc::from(format!("p{i}")), repr))
                .collect(),
            returns: returns.into(),
        }
    }

    fn add2() -> (Rc<str>, Shape) {
        ("add2".into(), shape(&[Repr::Real, Repr::Real], &[Repr::Real]))
    }

    #[test]
    fn arguments_only() {
        let (name, shape) = add2();
        let slots = Slots::enter(&name, &shape, vec![Value::Int(2), Value::Int(3)]).unwrap();
        assert_eq!(
            slots.arguments().unwrap(),
            [Value::Real(2.0), Value::Real(3.0)]
        );
        assert_eq!(slots.settle(vec![Value::Real(5.0)]).unwrap(), Value::Real(5.0));
    }

    #[test]
    fn matching_expectation_passes() {
        let (name, shape) = add2();
        let args = vec![Value::Int(2), Value::Int(3), Value::Int(5)];
        let slots = Slots::enter(&name, &shape, args).unwrap();
        assert_eq!(slots.settle(vec![Value::Real(5.0)]).unwrap(), Value::Real(5.0));
    }

    #[test]
    fn contradicting_expectation_fails() {
        let (name, shape) = add2();
        let args = vec![Value::Int(2), Value::Int(3), Value::Int(6)];
        let slots = Slots::enter(&name, &shape, args).unwrap();
        let err = slots.settle(vec![Value::Real(5.0)]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "return mismatch in add2: expected 6.0, returned 5.0"
        );
    }

    #[test]
    fn too_many_values_fail_before_binding() {
        let (name, shape) = add2();
        let args = vec![Value::Tuple(vec![Value::Int(1); 3].into()), Value::Int(1)];
        let err = Slots::enter(&name, &shape, args).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::ArityExceeded { limit: 3, actual: 4, .. }
        ));
    }

    #[test]
    fn missing_argument_is_reported_by_name() {
        let (name, shape) = add2();
        let slots = Slots::enter(&name, &shape, vec![Value::Int(2)]).unwrap();
        let err = slots.arguments().unwrap_err();
        assert_eq!(err.to_string(), "add2 is missing a value for argument 'p1'");
    }

    #[test]
    fn multiple_returns_are_packed() {
        let name: Rc<str> = "pair".into();
        let shape = shape(&[Repr::Int], &[Repr::Int, Repr::Int]);
        let slots = Slots::enter(&name, &shape, vec![Value::Int(1)]).unwrap();
        let computed = vec![Value::Tuple(vec![Value::Int(1), Value::Int(2)].into())];
        assert_eq!(
            slots.settle(computed).unwrap(),
            Value::Tuple(vec![Value::Int(1), Value::Int(2)].into())
        );
    }
}
