use std::{iter::Peekable, rc::Rc, str::CharIndices};

use crate::token::{Span, Token};

pub const SUGGESTED_TOKENS_CAPACITY: usize = 1_024;

/// Lexes the provided source, producing the tokens into the provided buffer.
///
/// Whitespace is dropped. Characters that start no known lexeme become
/// single-character tokens, leaving the diagnosis to the parser.
pub fn lex(path: &str, src: &str, tokens: &mut Vec<Token>) {
    Lexer::new(path, src, tokens).lex();
}

/// A convenience function that allocates a new buffer per lexed input and
/// returns it.
pub fn lex_in_new(path: &str, src: &str) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(SUGGESTED_TOKENS_CAPACITY);
    lex(path, src, &mut tokens);
    tokens
}

struct Lexer<'src, 'tok> {
    path: Rc<str>,
    src: &'src str,
    iter: Peekable<CharIndices<'src>>,
    row: u32,
    col: u32,
    tokens: &'tok mut Vec<Token>,
}

impl<'src, 'tok> Lexer<'src, 'tok> {
    fn new(path: &str, src: &'src str, tokens: &'tok mut Vec<Token>) -> Self {
        Lexer {
            path: Rc::from(path),
            src,
            iter: src.char_indices().peekable(),
            row: 1,
            col: 1,
            tokens,
        }
    }

    fn lex(mut self) {
        assert_eq!(self.tokens.len(), 0, "must pass clean tokens buffer");
        while let Some(&(lo, c)) = self.iter.peek() {
            if c.is_whitespace() {
                self.advance();
                continue;
            }
            let (row, col) = (self.row, self.col);
            self.advance();
            match c {
                '"' => self.string(),
                c if c.is_ascii_digit() => self.number(),
                '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.number(),
                c if c.is_alphanumeric() || c == '_' => self.word(),
                _ => {}
            }
            self.produce(lo, row, col);
        }
    }

    /// Consumes the remaining characters of a double-quoted string. Escaped
    /// quotes do not terminate it; an unterminated string stops at the end of
    /// the line.
    fn string(&mut self) {
        let mut escaping = false;
        while let Some(c) = self.peek() {
            if c == '\n' {
                return;
            }
            self.advance();
            match (escaping, c) {
                (false, '"') => return,
                (false, '\\') => escaping = true,
                _ => escaping = false,
            }
        }
    }

    /// Integer and real literals: `12`, `12.5`, `12.`, `.5`, `3e8`, `1.5e-3`.
    fn number(&mut self) {
        self.advance_while(|c| c.is_ascii_digit());
        if self.peek() == Some('.') {
            self.advance();
            self.advance_while(|c| c.is_ascii_digit());
        }
        if matches!(self.peek(), Some('e' | 'E')) && self.exponent_follows() {
            self.advance();
            if matches!(self.peek(), Some('+' | '-')) {
                self.advance();
            }
            self.advance_while(|c| c.is_ascii_digit());
        }
    }

    fn exponent_follows(&self) -> bool {
        let mut ahead = self.iter.clone().skip(1).map(|(_, c)| c);
        match ahead.next() {
            Some('+' | '-') => ahead.next().is_some_and(|c| c.is_ascii_digit()),
            Some(c) => c.is_ascii_digit(),
            None => false,
        }
    }

    fn word(&mut self) {
        self.advance_while(|c| c.is_alphanumeric() || c == '_');
    }

    fn produce(&mut self, lo: usize, row: u32, col: u32) {
        let hi = self.iter.peek().map_or(self.src.len(), |&(i, _)| i);
        let text = &self.src[lo..hi];
        let len = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
        let span = Span {
            path: Rc::clone(&self.path),
            row,
            col,
            len,
        };
        self.tokens.push(Token::new(text, span));
    }

    fn peek(&mut self) -> Option<char> {
        self.iter.peek().map(|&(_, c)| c)
    }

    fn advance(&mut self) -> Option<char> {
        let (_, c) = self.iter.next()?;
        if c == '\n' {
            self.row += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn advance_while(&mut self, pred: impl Fn(char) -> bool) {
        while self.peek().is_some_and(&pred) {
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::token::TokenKind;

    fn kinds(src: &str) -> Vec<(TokenKind, String, u32, u32)> {
        lex_in_new("t.ss", src)
            .into_iter()
            .map(|t| (t.kind, t.text.to_string(), t.span.row, t.span.col))
            .collect()
    }

    #[test]
    fn test_lex_function() {
        use TokenKind::*;
        let src = "RRR add2(a, b) {\n    return add(a, b)\n}";
        let expected = [
            (Identifier, "RRR", 1, 1),
            (Identifier, "add2", 1, 5),
            (LParen, "(", 1, 9),
            (Identifier, "a", 1, 10),
            (Comma, ",", 1, 11),
            (Identifier, "b", 1, 13),
            (RParen, ")", 1, 14),
            (LBrace, "{", 1, 16),
            (Return, "return", 2, 5),
            (Identifier, "add", 2, 12),
            (LParen, "(", 2, 15),
            (Identifier, "a", 2, 16),
            (Comma, ",", 2, 17),
            (Identifier, "b", 2, 19),
            (RParen, ")", 2, 20),
            (RBrace, "}", 3, 1),
        ];
        let expected: Vec<_> = expected
            .into_iter()
            .map(|(k, t, r, c)| (k, t.to_string(), r, c))
            .collect();
        assert_eq!(kinds(src), expected);
    }

    #[test]
    fn test_lex_literals() {
        use TokenKind::*;
        let lexed: Vec<_> = kinds(r#"1 2.5 3. .5 3e8 1.5e-3 "a \" b" True x[0]"#)
            .into_iter()
            .map(|(k, t, _, _)| (k, t))
            .collect();
        let expected = [
            (Int, "1"),
            (Real, "2.5"),
            (Real, "3."),
            (Real, ".5"),
            (Real, "3e8"),
            (Real, "1.5e-3"),
            (String, r#""a \" b""#),
            (True, "True"),
            (Identifier, "x"),
            (LBracket, "["),
            (Int, "0"),
            (RBracket, "]"),
        ];
        let expected: Vec<_> = expected
            .into_iter()
            .map(|(k, t)| (k, t.to_string()))
            .collect();
        assert_eq!(lexed, expected);
    }

    #[test]
    fn test_lex_declarations() {
        use TokenKind::*;
        let lexed: Vec<_> = kinds("X: {R3}\n*: \"ext\"\ny = \\X 1 | f")
            .into_iter()
            .map(|(k, _, _, _)| k)
            .collect();
        assert_eq!(
            lexed,
            [
                Identifier, Colon, LBrace, Identifier, RBrace, Star, Colon, String, Identifier,
                Assign, Backslash, Identifier, Int, Pipe, Identifier,
            ]
        );
    }

    #[test]
    fn test_lex_unterminated_string() {
        let lexed = kinds("\"abc\nx");
        assert_eq!(lexed[0].0, TokenKind::Other);
        assert_eq!(lexed[0].1, "\"abc");
        assert_eq!(lexed[1], (TokenKind::Identifier, "x".to_string(), 2, 1));
    }

    #[test]
    fn test_lex_exponent_needs_digits() {
        let lexed: Vec<_> = kinds("2else").into_iter().map(|(k, t, _, _)| (k, t)).collect();
        assert_eq!(
            lexed,
            [
                (TokenKind::Int, "2".to_string()),
                (TokenKind::Else, "else".to_string()),
            ]
        );
    }
}
