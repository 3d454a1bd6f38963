use std::{format_args as f, io};

use crate::codegen::module::{ImportEntry, Module, Unit};

/// Runtime helpers every module relies on: flattening of call results,
/// the callable check of local calls, and the print primitive natives share.
pub const HELPERS: &[&str] = &["flatten", "assert_callable", "print_and_return"];

/// Writes the textual listing of a module.
pub struct Generator<W> {
    writer: W,
    indent: bool,
}

impl<W> Generator<W>
where
    W: io::Write,
{
    pub fn new(writer: W) -> Generator<W> {
        Generator {
            writer,
            indent: false,
        }
    }

    pub fn generate(mut self, module: &Module) -> io::Result<()> {
        self.g_header()?;
        self.g_imports(&module.imports)?;
        self.g_natives(module)?;
        for unit in &module.units {
            self.g_unit(unit)?;
        }
        Ok(())
    }

    fn g_header(&mut self) -> io::Result<()> {
        self.out("; sigmastar module")?;
        for helper in HELPERS {
            self.out(f!("helper {helper}"))?;
        }
        self.out_line()
    }

    fn g_imports(&mut self, imports: &[ImportEntry]) -> io::Result<()> {
        for ImportEntry { alias, path } in imports {
            let alias = alias.as_deref().unwrap_or("*");
            self.out(f!("import {path:?} as {alias}"))?;
        }
        Ok(())
    }

    fn g_natives(&mut self, module: &Module) -> io::Result<()> {
        if module.natives.is_empty() {
            return Ok(());
        }
        for native in module.natives.iter() {
            let params: Vec<_> = native.params.iter().map(|(name, _)| &**name).collect();
            let signature: String = native
                .params
                .iter()
                .map(|(_, ty)| ty.alias())
                .chain([native.ret.alias()])
                .collect();
            self.out(f!("native {}({}) {signature}", native.name, params.join(", ")))?;
        }
        self.out_line()
    }

    fn g_unit(&mut self, unit: &Unit) -> io::Result<()> {
        let params: Vec<_> = unit.shape.params.iter().map(|(name, _)| &**name).collect();
        self.out(f!(
            "unit {}({}) {}",
            unit.name,
            params.join(", "),
            unit.signature
        ))?;
        self.indented(|this| {
            for (pc, instr) in unit.code.iter().enumerate() {
                this.out(f!("{pc:04} {instr}"))?;
            }
            Ok(())
        })
    }

    /// Prints a line.
    fn out(&mut self, f: impl std::fmt::Display) -> io::Result<()> {
        let indent = if self.indent { "    " } else { "" };
        writeln!(self.writer, "{indent}{f}")
    }

    /// Prints an empty line.
    fn out_line(&mut self) -> io::Result<()> {
        writeln!(self.writer)
    }

    /// Writes in an indented block that is finished with an empty line.
    fn indented(&mut self, f: impl FnOnce(&mut Self) -> io::Result<()>) -> io::Result<()> {
        self.indent = true;
        let res = f(self);
        self.indent = false;
        res?;
        self.out_line()
    }
}
