//! Execution of compiled modules under the variadic calling convention.

pub mod error;
pub mod machine;
pub mod slots;
pub mod value;

pub use error::{RuntimeError, RuntimeResult};
pub use machine::Machine;
pub use value::{Callable, Value};
