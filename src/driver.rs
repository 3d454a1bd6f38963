//! Ties the phases together: lex, parse, check and lower one compilation
//! unit.

use std::io;

use tracing::{debug, info_span};

use crate::{
    builtins::{Builtins, Libraries, NativeDef},
    codegen::{self, Module},
    lexer, parser,
    runtime::{machine::DEFAULT_MAX_CALL_DEPTH, Machine},
    token::{Spanned, Token},
    type_checker,
    types::TypeRegistry,
};

/// Compilation and execution settings.
#[derive(Clone, Debug)]
pub struct Options {
    /// Whether the prelude natives (`add`, `print`, ...) are callable
    /// unprefixed.
    pub prelude: bool,
    /// How deep calls may nest at runtime.
    pub max_call_depth: usize,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            prelude: true,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] parser::Error),
    #[error(transparent)]
    Check(#[from] type_checker::Error),
}

/// A compilation error with the location it was raised at.
pub type Diagnostic = Spanned<Error>;

pub struct Compiler {
    options: Options,
    libraries: Libraries,
}

impl Compiler {
    pub fn new(options: Options) -> Compiler {
        Compiler {
            options,
            libraries: Libraries::default(),
        }
    }

    /// Makes `defs` importable under `path`.
    pub fn with_library(mut self, path: &str, defs: &'static [NativeDef]) -> Compiler {
        self.libraries.register(path, defs);
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Compiles one unit. Every call starts from a fresh type registry.
    pub fn compile(&self, tokens: &[Token]) -> Result<Module, Diagnostic> {
        let _span = info_span!("compile", tokens = tokens.len()).entered();
        let mut registry = TypeRegistry::with_builtins();
        let mut builtins = if self.options.prelude {
            Builtins::prelude(&registry)
        } else {
            Builtins::empty()
        };

        let program = parser::parse_program(tokens, &mut registry, &mut builtins, &self.libraries)
            .map_err(|e| e.map(Error::Parse))?;
        type_checker::check_program(&program, &registry, &builtins)
            .map_err(|e| e.map(Error::Check))?;
        let module = codegen::lower(&program, builtins);
        debug!(units = module.units.len(), "compiled");
        Ok(module)
    }

    pub fn compile_str(&self, path: &str, src: &str) -> Result<Module, Diagnostic> {
        let tokens = lexer::lex_in_new(path, src);
        self.compile(&tokens)
    }

    /// A machine for `module`, configured by these options.
    pub fn machine<'m, W: io::Write>(&self, module: &'m Module, out: W) -> Machine<'m, W> {
        Machine::new(module, out).with_max_depth(self.options.max_call_depth)
    }
}

impl Default for Compiler {
    fn default() -> Compiler {
        Compiler::new(Options::default())
    }
}

/// Compiles `tokens` with the given options.
pub fn compile(tokens: &[Token], options: Options) -> Result<Module, Diagnostic> {
    Compiler::new(options).compile(tokens)
}

/// Lexes and compiles `src` with the default options.
pub fn compile_str(path: &str, src: &str) -> Result<Module, Diagnostic> {
    Compiler::default().compile_str(path, src)
}
