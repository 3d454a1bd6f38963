use std::rc::Rc;

use thiserror::Error;

use crate::types::Repr;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Failures raised while executing a compiled module.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("arguments exceeded the limits of {function}: at most {limit} values, got {actual}")]
    ArityExceeded {
        function: Rc<str>,
        limit: usize,
        actual: usize,
    },

    #[error("{function} is missing a value for argument '{param}'")]
    MissingArgument { function: Rc<str>, param: Rc<str> },

    #[error("return mismatch in {function}: expected {expected}, returned {actual}")]
    ReturnMismatch {
        function: Rc<str>,
        expected: String,
        actual: String,
    },

    #[error("{function} returned {actual} values, but its signature has {expected}")]
    ReturnCount {
        function: Rc<str>,
        expected: usize,
        actual: usize,
    },

    #[error("{function} fell off its end without returning")]
    NoReturn { function: Rc<str> },

    #[error("expected a callable, but got {0}")]
    NotCallable(String),

    #[error("expected a {expected} value, but got {actual}")]
    Representation { expected: Repr, actual: String },

    #[error("local variable '{0}' is not bound")]
    UnboundLocal(Rc<str>),

    #[error("function '{0}' is not defined")]
    UndefinedFunction(Rc<str>),

    #[error("cannot index into {0}")]
    NotIndexable(String),

    #[error("index {index} is out of range for {len} values")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("division by zero")]
    DivisionByZero,

    #[error("call depth exceeded the limit of {0}")]
    CallDepthExceeded(usize),

    #[error("stack underflow")]
    StackUnderflow,

    #[error("failed to write output")]
    Output(#[from] std::io::Error),
}
