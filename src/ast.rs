// program ::= decl*
// decl ::= LETTER ':' '{' SIGNATURE '}'
//        | ALIAS ':' STRING
//        | SIGNATURE ID '(' [ID (',' ID)*] ')' '{' stmt* '}'
// stmt ::= 'return' expr (',' expr)*
//        | 'if' expr '{' stmt+ '}' ['else' '{' stmt+ '}']
//        | 'while' expr '{' stmt+ '}'
//        | ID '(' [expr (',' expr)*] ')'
//        | ID '=' expr (',' expr)*
// expr ::= '\' LETTER expr
//        | operand ('|' operand)*
// operand ::= ID '(' [expr (',' expr)*] ')'
//           | value '[' expr ']'
//           | value
// value ::= ID | integer | real | string | True | False

use std::rc::Rc;

use crate::{token::Span, types::Type};

#[derive(Debug, PartialEq, Default)]
pub struct Program {
    /// Powersets declared in source, in declaration order.
    pub primitives: Vec<PrimitiveDecl>,
    pub imports: Vec<Import>,
    pub functions: Vec<Function>,
}

#[derive(Debug, PartialEq)]
pub struct PrimitiveDecl {
    pub alias: char,
    pub ty: Type,
    pub span: Span,
}

#[derive(Debug, PartialEq)]
pub struct Import {
    /// `None` for the unprefixed `*` alias.
    pub alias: Option<Rc<str>>,
    pub path: Box<str>,
    pub span: Span,
}

#[derive(Debug, PartialEq)]
pub struct Function {
    pub name: Ident,
    /// Non repeating, in declaration order.
    pub params: Vec<Param>,
    pub ret: Type,
    pub body: Vec<Expr>,
}

impl Function {
    /// Argument count plus return length; the number of values a call may
    /// supply at most.
    pub fn total_arity(&self) -> usize {
        self.params.len() + self.ret.len()
    }
}

#[derive(Debug, PartialEq)]
pub struct Param {
    pub name: Ident,
    /// Always a single atom.
    pub ty: Type,
}

#[derive(Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, PartialEq)]
pub enum ExprKind {
    Value(Term),
    Call {
        callee: Ident,
        args: Vec<Expr>,
    },
    Assign {
        target: Ident,
        values: Vec<Expr>,
    },
    Return {
        values: Vec<Expr>,
    },
    If {
        test: Box<Expr>,
        /// Non empty.
        then_body: Vec<Expr>,
        else_body: Vec<Expr>,
    },
    While {
        test: Box<Expr>,
        /// Non empty.
        body: Vec<Expr>,
    },
    Access {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    /// `\X expr`
    Cast {
        target: Ident,
        expr: Box<Expr>,
    },
    /// `a | b | f`: `captured` are pre-bound to the leading arguments of
    /// `callee`.
    LambdaApply {
        captured: Vec<Expr>,
        callee: Box<Expr>,
    },
}

impl ExprKind {
    /// Whether this variant can only appear as a statement.
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            ExprKind::Assign { .. }
                | ExprKind::Return { .. }
                | ExprKind::If { .. }
                | ExprKind::While { .. }
        )
    }
}

/// A value token, classified by its lexical shape.
#[derive(Debug, PartialEq)]
pub enum Term {
    Int(i64),
    Real(f64),
    Bool(bool),
    String(Box<str>),
    Name(Ident),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ident {
    pub name: Rc<str>,
    pub span: Span,
}

impl Ident {
    pub fn as_str(&self) -> &str {
        &self.name
    }
}
