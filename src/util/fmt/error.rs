use std::fmt::{self, Write};

use crate::token::Spanned;

/// Renders a located error against the source it was raised in: the
/// location, the offending line, and a marker under the offending token
/// followed by the message.
pub fn render<T: fmt::Display>(error: &Spanned<T>, src: &str) -> String {
    let Spanned { span, inner } = error;
    let mut out = String::with_capacity(128);
    _ = writeln!(out, "at {span}");
    let Some(line) = src.lines().nth((span.row as usize).saturating_sub(1)) else {
        _ = write!(out, "{inner}");
        return out;
    };
    _ = writeln!(out, "{line}");
    let pad = (span.col as usize).saturating_sub(1);
    let marks = (span.len as usize).saturating_sub(1);
    _ = write!(out, "{:pad$}{:~<marks$}> {inner}", "", "");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Span;

    #[test]
    fn test_render_underlines_token() {
        let src = "RR f(a) {\n  return b\n}";
        let error = Span::new("main.ss", 2, 10, 1).wrap("b is not defined");
        assert_eq!(
            render(&error, src),
            "at main.ss:2:10\n  return b\n         > b is not defined"
        );

        let error = Span::new("main.ss", 2, 3, 6).wrap("oops");
        assert_eq!(
            render(&error, src),
            "at main.ss:2:3\n  return b\n  ~~~~~> oops"
        );
    }

    #[test]
    fn test_render_without_line() {
        let error = Span::builtin().wrap("function abs already defined");
        assert_eq!(
            render(&error, ""),
            "at <builtin>:0:0\nfunction abs already defined"
        );
    }
}
