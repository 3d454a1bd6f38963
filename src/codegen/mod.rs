//! Lowering of validated programs into stack machine [`Module`]s, and their
//! textual listing.

use std::io;

mod listing;
mod lower;
mod module;

pub use listing::HELPERS;
pub use lower::{lower, shape_of};
pub use module::{ImportEntry, Instr, Module, Unit};

/// Writes the listing of `module`: the helper declarations, then the
/// imports and natives, then one block per unit.
pub fn generate<W>(writer: W, module: &Module) -> io::Result<()>
where
    W: io::Write,
{
    listing::Generator::new(writer).generate(module)
}

/// Like [`generate`], into a string.
pub fn listing(module: &Module) -> String {
    let mut buf = Vec::with_capacity(1024);
    generate(&mut buf, module).expect("writing to a buffer cannot fail");
    String::from_utf8(buf).expect("listings are valid UTF-8")
}

#[cfg(test)]
mod tests;
