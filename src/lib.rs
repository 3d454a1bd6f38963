//! A compiler and runtime for sigmastar, a small language whose functions
//! are typed by concatenative signatures such as `RRR`.

/// The lexer takes the source input, mapping it into a sequence of tokens.
pub mod lexer;

/// The parser takes a sequence of tokens, mapping it into an AST. It also
/// extends the type registry with the primitives the source declares.
pub mod parser;

/// The type checker validates every function of a parsed program against
/// the signatures it declares.
pub mod type_checker;

/// Lowers validated programs into instruction units.
pub mod codegen;

/// Executes lowered modules under the variadic calling convention.
pub mod runtime;

pub mod ast;
pub mod builtins;
pub mod driver;
pub mod token;
pub mod types;

pub use driver::{compile, compile_str, Compiler, Diagnostic, Options};

pub mod util {
    pub mod fmt;
    #[cfg(test)]
    pub(crate) mod test_utils;
}
