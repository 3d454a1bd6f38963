use std::{fmt, rc::Rc};

/// A lexeme together with its source location.
///
/// Tokens are produced by the [`lexer`](crate::lexer), but any external token
/// producer may build them through [`Token::new`], which classifies the
/// lexeme by its shape.
#[derive(Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: Rc<str>,
    pub span: Span,
}

impl Token {
    pub fn new(text: impl Into<Rc<str>>, span: Span) -> Token {
        let text = text.into();
        Token {
            kind: TokenKind::classify(&text),
            text,
            span,
        }
    }

    pub fn span(&self) -> Span {
        self.span.clone()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    /// The end-of-input token, located right after `last`.
    pub fn eof_after(last: Option<&Token>) -> Token {
        let span = match last {
            Some(token) => Span {
                col: token.span.col + token.span.len,
                len: 0,
                ..token.span.clone()
            },
            None => Span::new("<input>", 1, 1, 0),
        };
        Token {
            kind: TokenKind::Eof,
            text: Rc::from(""),
            span,
        }
    }

    /// Wraps the given value with this token's location.
    pub fn wrap<T>(&self, inner: T) -> Spanned<T> {
        self.span.clone().wrap(inner)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:?}, {:?}, {})", self.kind, self.text, self.span)
    }
}

/// A source location: file path, 1-based row and column, and the lexeme
/// length (used for underlining).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Span {
    pub path: Rc<str>,
    pub row: u32,
    pub col: u32,
    pub len: u32,
}

impl Span {
    pub fn new(path: impl Into<Rc<str>>, row: u32, col: u32, len: u32) -> Span {
        Span {
            path: path.into(),
            row,
            col,
            len,
        }
    }

    /// Location used by entries that do not come from a source file, such as
    /// natives.
    pub fn builtin() -> Span {
        Span::new("<builtin>", 0, 0, 0)
    }

    pub fn wrap<T>(self, inner: T) -> Spanned<T> {
        Spanned { span: self, inner }
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Span({self}, len: {})", self.len)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.path, self.row, self.col)
    }
}

/// A value located at some source position.
#[derive(Clone, Debug, PartialEq)]
pub struct Spanned<T> {
    pub span: Span,
    pub inner: T,
}

impl<T> Spanned<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> {
        Spanned {
            span: self.span,
            inner: f(self.inner),
        }
    }
}

/// Located values display as `path:row:col: message`. The alternate form
/// (`{:#}`) omits the path, which keeps test expectations short.
impl<T: fmt::Display> fmt::Display for Spanned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Spanned { span, inner } = self;
        if f.alternate() {
            write!(f, "{}:{}: {inner}", span.row, span.col)
        } else {
            write!(f, "{span}: {inner}")
        }
    }
}

impl<T: fmt::Debug + fmt::Display> std::error::Error for Spanned<T> {}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Return,
    If,
    Else,
    While,

    True,
    False,

    /// `:`
    Colon,
    Comma,
    /// `=`
    Assign,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    /// `|`, the partial application operator.
    Pipe,
    /// `\`, introduces a cast.
    Backslash,
    /// `*`, the unprefixed import alias.
    Star,

    /// Words: identifiers and signature aliases such as `R3` alike.
    Identifier,
    Int,
    Real,
    /// A double-quoted string, quotes included in the token text.
    String,

    /// Any other single character.
    Other,

    /// End of input. Never lexed; the parser synthesizes it past the last
    /// token.
    Eof,
}

impl TokenKind {
    /// Classifies a lexeme by its lexical shape.
    pub fn classify(text: &str) -> TokenKind {
        if let Some(&keyword) = KEYWORDS.get(text) {
            return keyword;
        }
        let mut chars = text.chars();
        let Some(first) = chars.next() else {
            return TokenKind::Other;
        };
        match first {
            ':' if text.len() == 1 => TokenKind::Colon,
            ',' if text.len() == 1 => TokenKind::Comma,
            '=' if text.len() == 1 => TokenKind::Assign,
            '(' if text.len() == 1 => TokenKind::LParen,
            ')' if text.len() == 1 => TokenKind::RParen,
            '{' if text.len() == 1 => TokenKind::LBrace,
            '}' if text.len() == 1 => TokenKind::RBrace,
            '[' if text.len() == 1 => TokenKind::LBracket,
            ']' if text.len() == 1 => TokenKind::RBracket,
            '|' if text.len() == 1 => TokenKind::Pipe,
            '\\' if text.len() == 1 => TokenKind::Backslash,
            '*' if text.len() == 1 => TokenKind::Star,
            '"' if text.len() >= 2 && text.ends_with('"') => TokenKind::String,
            c if c.is_ascii_digit() || c == '.' => {
                if text.bytes().all(|b| b.is_ascii_digit()) {
                    TokenKind::Int
                } else if is_real_literal(text) {
                    TokenKind::Real
                } else {
                    TokenKind::Other
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                if chars.all(|c| c.is_alphanumeric() || c == '_') {
                    TokenKind::Identifier
                } else {
                    TokenKind::Other
                }
            }
            _ => TokenKind::Other,
        }
    }

    pub fn is_keyword(self) -> bool {
        matches!(
            self,
            TokenKind::Return
                | TokenKind::If
                | TokenKind::Else
                | TokenKind::While
                | TokenKind::True
                | TokenKind::False
        )
    }
}

/// Real literals: `12.5`, `12.`, `.5`, and exponent forms such as `3e8`.
fn is_real_literal(text: &str) -> bool {
    let has_digit = text.bytes().any(|b| b.is_ascii_digit());
    let allowed = text
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
    has_digit && allowed && text.parse::<f64>().is_ok()
}

pub static KEYWORDS: phf::Map<&'static str, TokenKind> = phf::phf_map! {
    "return" => TokenKind::Return,
    "if" => TokenKind::If,
    "else" => TokenKind::Else,
    "while" => TokenKind::While,
    "True" => TokenKind::True,
    "False" => TokenKind::False,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify() {
        use TokenKind::*;
        let cases = [
            ("return", Return),
            ("True", True),
            ("true", Identifier),
            ("R3", Identifier),
            ("_tmp", Identifier),
            ("42", Int),
            ("99999999999999999999", Int),
            ("4.2", Real),
            ("42.", Real),
            (".5", Real),
            ("3e8", Real),
            ("\"hi\"", String),
            ("\"", Other),
            ("|", Pipe),
            ("\\", Backslash),
            ("*", Star),
            ("$", Other),
            ("1.2.3", Other),
        ];
        for (text, kind) in cases {
            assert_eq!(TokenKind::classify(text), kind, "classifying {text:?}");
        }
    }

    #[test]
    fn spanned_display() {
        let s = Span::new("main.ss", 3, 7, 2).wrap("oops");
        assert_eq!(format!("{s}"), "main.ss:3:7: oops");
        assert_eq!(format!("{s:#}"), "3:7: oops");
    }
}
