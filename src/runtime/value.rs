use std::{fmt, rc::Rc};

use crate::{
    runtime::error::{RuntimeError, RuntimeResult},
    types::Repr,
};

/// A runtime value.
///
/// Tuples only exist transiently, as the result of calls returning more than
/// one value; every calling-convention boundary [flattens](flatten) them.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Real(f64),
    Bool(bool),
    Str(Rc<str>),
    Tuple(Rc<[Value]>),
    Callable(Callable),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Real(_) => "real",
            Value::Bool(_) => "boolean",
            Value::Str(_) => "string",
            Value::Tuple(_) => "tuple",
            Value::Callable(_) => "callable",
        }
    }

    pub fn as_callable(&self) -> RuntimeResult<&Callable> {
        match self {
            Value::Callable(callable) => Ok(callable),
            other => Err(RuntimeError::NotCallable(other.describe())),
        }
    }

    pub fn as_real(&self) -> RuntimeResult<f64> {
        match self {
            Value::Real(r) => Ok(*r),
            #[allow(clippy::cast_precision_loss)]
            Value::Int(i) => Ok(*i as f64),
            other => Err(mismatch(Repr::Real, other)),
        }
    }

    pub fn as_bool(&self) -> RuntimeResult<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(mismatch(Repr::Bool, other)),
        }
    }

    pub fn as_str(&self) -> RuntimeResult<&str> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(mismatch(Repr::Str, other)),
        }
    }

    /// Kind and rendered value, for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Value::Str(s) => format!("string {s:?}"),
            other => format!("{} {other}", other.kind()),
        }
    }

    /// Adapts a value to the representation of the slot it is bound to.
    ///
    /// Integers widen to reals; pointers accept anything.
    pub fn coerce(self, repr: Repr) -> RuntimeResult<Value> {
        match (repr, self) {
            (Repr::Pointer, value) => Ok(value),
            (Repr::Int, value @ Value::Int(_)) => Ok(value),
            (Repr::Real, value @ Value::Real(_)) => Ok(value),
            #[allow(clippy::cast_precision_loss)]
            (Repr::Real, Value::Int(i)) => Ok(Value::Real(i as f64)),
            (Repr::Bool, value @ Value::Bool(_)) => Ok(value),
            (Repr::Str, value @ Value::Str(_)) => Ok(value),
            (Repr::Callable, value @ Value::Callable(_)) => Ok(value),
            (Repr::Callable, value) => Err(RuntimeError::NotCallable(value.describe())),
            (repr, value) => Err(mismatch(repr, &value)),
        }
    }
}

fn mismatch(expected: Repr, actual: &Value) -> RuntimeError {
    RuntimeError::Representation {
        expected,
        actual: actual.describe(),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            // Debug keeps the trailing `.0` of integral reals.
            Value::Real(r) => write!(f, "{r:?}"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Str(s) => f.write_str(s),
            Value::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Value::Callable(callable) => write!(f, "{callable}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Callable {
    /// A function compiled into the module.
    Unit(Rc<str>),
    /// A host function imported into the module.
    Native(Rc<str>),
    /// A callable with some leading values already bound.
    Partial(Rc<Partial>),
}

#[derive(Debug, PartialEq)]
pub struct Partial {
    pub target: Callable,
    pub captured: Vec<Value>,
}

impl Callable {
    pub fn partial(target: Callable, captured: Vec<Value>) -> Callable {
        Callable::Partial(Rc::new(Partial { target, captured }))
    }
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Unit(name) => write!(f, "<function {name}>"),
            Callable::Native(name) => write!(f, "<native {name}>"),
            Callable::Partial(partial) => {
                write!(f, "<partial {} of {}>", partial.captured.len(), partial.target)
            }
        }
    }
}

/// Splices nested tuples into one flat sequence, recursively.
pub fn flatten(values: impl IntoIterator<Item = Value>) -> Vec<Value> {
    let mut out = Vec::new();
    flatten_into(values, &mut out);
    out
}

fn flatten_into(values: impl IntoIterator<Item = Value>, out: &mut Vec<Value>) {
    for value in values {
        match value {
            Value::Tuple(items) => flatten_into(items.iter().cloned(), out),
            other => out.push(other),
        }
    }
}

/// Packs call results: a single value stays itself, anything else becomes a
/// tuple.
pub fn pack(mut values: Vec<Value>) -> Value {
    if values.len() == 1 {
        values.swap_remove(0)
    } else {
        Value::Tuple(values.into())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn tuple(values: Vec<Value>) -> Value {
        Value::Tuple(values.into())
    }

    #[test]
    fn flatten_splices_nested_tuples() {
        let nested = vec![
            Value::Int(1),
            tuple(vec![Value::Int(2), tuple(vec![Value::Int(3)]), tuple(vec![])]),
            Value::Int(4),
        ];
        assert_eq!(
            flatten(nested),
            [1, 2, 3, 4].map(Value::Int).to_vec(),
        );
    }

    #[test]
    fn coercion_widens_integers_only() {
        assert_eq!(Value::Int(2).coerce(Repr::Real).unwrap(), Value::Real(2.0));
        assert_eq!(Value::Int(2).coerce(Repr::Pointer).unwrap(), Value::Int(2));
        assert!(matches!(
            Value::Real(2.0).coerce(Repr::Int),
            Err(RuntimeError::Representation { expected: Repr::Int, .. })
        ));
        assert!(matches!(
            Value::Int(2).coerce(Repr::Callable),
            Err(RuntimeError::NotCallable(_))
        ));
    }

    #[test]
    fn display() {
        assert_eq!(Value::Real(5.0).to_string(), "5.0");
        assert_eq!(Value::Real(0.5).to_string(), "0.5");
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(
            tuple(vec![Value::Int(1), Value::Str("a".into())]).to_string(),
            "(1, a)"
        );
        let partial = Callable::partial(Callable::Unit("f".into()), vec![Value::Int(1)]);
        assert_eq!(partial.to_string(), "<partial 1 of <function f>>");
    }

    fn value() -> impl Strategy<Value = Value> {
        let leaf = any::<i64>().prop_map(Value::Int);
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop::collection::vec(inner, 0..4).prop_map(|items| Value::Tuple(items.into()))
        })
    }

    proptest! {
        #[test]
        fn flatten_is_associative(a in value(), b in value(), c in value()) {
            let left = flatten([tuple(vec![a.clone(), b.clone()]), c.clone()]);
            let right = flatten([a.clone(), tuple(vec![b.clone(), c.clone()])]);
            let plain = flatten([a, b, c]);
            prop_assert_eq!(&left, &right);
            prop_assert_eq!(&left, &plain);
            prop_assert!(left.iter().all(|v| !matches!(v, Value::Tuple(_))));
        }
    }
}
