use std::rc::Rc;

use tracing::debug;

use crate::{
    ast::{Expr, ExprKind, Function, Ident, Import, Param, PrimitiveDecl, Program, Term},
    builtins::{Builtins, ImportError, Libraries},
    token::{Spanned, Token, TokenKind},
    types::{self, SignatureError, Type, TypeRegistry},
};

type Result<T, E = Spanned<Error>> = std::result::Result<T, E>;

/// Parses a whole compilation unit.
///
/// Primitive declarations extend `registry`, and import declarations bring
/// natives from `libraries` into `builtins`, as they are met. Parsing stops
/// at the first error.
pub fn parse_program(
    tokens: &[Token],
    registry: &mut TypeRegistry,
    builtins: &mut Builtins,
    libraries: &Libraries,
) -> Result<Program> {
    let mut p = Parser::new(tokens, registry, builtins, libraries);
    let program = p.parse_program()?;
    debug!(
        primitives = program.primitives.len(),
        imports = program.imports.len(),
        functions = program.functions.len(),
        "parsed program"
    );
    Ok(program)
}

/// Parses a single expression spanning all of `tokens`.
pub fn parse_expr(tokens: &[Token], registry: &mut TypeRegistry) -> Result<Expr> {
    let mut builtins = Builtins::empty();
    let libraries = Libraries::empty();
    let mut p = Parser::new(tokens, registry, &mut builtins, &libraries);
    let expr = p.parse_expr()?;
    p.consume(TokenKind::Eof, "end of input")?;
    Ok(expr)
}

struct Parser<'tok, 'env> {
    tokens: &'tok [Token],
    cursor: usize,
    eof: Token,
    registry: &'env mut TypeRegistry,
    builtins: &'env mut Builtins,
    libraries: &'env Libraries,
}

impl Parser<'_, '_> {
    fn parse_program(&mut self) -> Result<Program> {
        let mut program = Program::default();
        while !self.is(TokenKind::Eof) {
            if self.nth(1).is(TokenKind::Colon) {
                self.parse_declaration(&mut program)?;
            } else {
                program.functions.push(self.parse_function()?);
            }
        }
        Ok(program)
    }

    /// Primitive (`X : { SIG }`) and import (`alias : "path"`) declarations.
    fn parse_declaration(&mut self, program: &mut Program) -> Result<()> {
        let key = self.advance();
        self.consume(TokenKind::Colon, "':'")?;
        if self.is(TokenKind::String) {
            let path = self.advance();
            let import = self.parse_import(&key, &path)?;
            program.imports.push(import);
            return Ok(());
        }

        let alias = self.parse_primitive_alias(&key)?;
        self.consume(TokenKind::LBrace, "'{'")?;
        if self.is(TokenKind::RBrace) {
            return Err(self.peek().wrap(Error::Signature(SignatureError::Empty)));
        }
        let sig = self.advance();
        let base = types::parse_signature(sig.text(), self.registry)
            .map_err(|e| sig.wrap(Error::Signature(e)))?;
        self.consume(TokenKind::RBrace, "'}'")?;
        let ty = self
            .registry
            .define_powerset(alias, base)
            .map_err(|()| key.wrap(Error::PrimitiveExists(key.text().into())))?;
        program.primitives.push(PrimitiveDecl {
            alias,
            ty,
            span: key.span(),
        });
        Ok(())
    }

    fn parse_primitive_alias(&self, key: &Token) -> Result<char> {
        if let Some(existing) = self.registry.lookup(key.text()) {
            return Err(key.wrap(Error::PrimitiveExists(existing.pretty())));
        }
        let mut chars = key.text().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_alphabetic() => Ok(c),
            (Some(_), None) => Err(key.wrap(Error::PrimitiveNotLetter(key.text().into()))),
            _ => Err(key.wrap(Error::PrimitiveLength(key.text().into()))),
        }
    }

    fn parse_import(&mut self, key: &Token, path: &Token) -> Result<Import> {
        let alias: Option<Rc<str>> = match key.kind {
            TokenKind::Star => None,
            TokenKind::Identifier => Some(Rc::clone(&key.text)),
            _ => return Err(key.wrap(Error::InvalidImportAlias(key.text().into()))),
        };
        let path_text = unquote(path.text());
        let defs = self
            .libraries
            .get(&path_text)
            .ok_or_else(|| path.wrap(Error::UnknownModule(path_text.clone().into())))?;
        self.builtins
            .import(alias.as_deref(), defs, self.registry)
            .map_err(|e| path.wrap(Error::Import(e)))?;
        Ok(Import {
            alias,
            path: path_text.into(),
            span: key.span(),
        })
    }

    fn parse_function(&mut self) -> Result<Function> {
        let sig = self.advance();
        if !sig.is(TokenKind::Identifier) {
            return Err(sig.wrap(Error::Unexpected {
                expected: "a function signature",
                actual: sig.text().into(),
            }));
        }
        let mut atoms = types::parse_atoms(sig.text(), self.registry)
            .map_err(|e| sig.wrap(Error::Signature(e)))?;
        let name = self.parse_variable_name()?;

        self.consume(TokenKind::LParen, "'('")?;
        let mut names: Vec<Ident> = Vec::new();
        if !self.take(TokenKind::RParen) {
            loop {
                let param = self.parse_variable_name()?;
                if names.len() + 1 >= atoms.len() {
                    return Err(param.span.clone().wrap(Error::TooManyParams {
                        signature: sig.text().into(),
                    }));
                }
                if names.iter().any(|other| other.name == param.name) {
                    return Err(param.span.clone().wrap(Error::DuplicateParam(
                        param.as_str().into(),
                    )));
                }
                names.push(param);
                if self.take(TokenKind::RParen) {
                    break;
                }
                self.consume(TokenKind::Comma, "',' or ')'")?;
            }
        }

        self.consume(TokenKind::LBrace, "'{'")?;
        let body = self.parse_body()?;
        self.consume(TokenKind::RBrace, "'}'")?;

        let ret = Type::from_atoms(atoms.split_off(names.len()));
        let params = names
            .into_iter()
            .zip(atoms)
            .map(|(name, ty)| Param { name, ty })
            .collect();
        Ok(Function {
            name,
            params,
            ret,
            body,
        })
    }

    /// Statements up to, not including, the closing brace.
    fn parse_body(&mut self) -> Result<Vec<Expr>> {
        let mut body = Vec::new();
        while !self.is(TokenKind::RBrace) && !self.is(TokenKind::Eof) {
            body.push(self.parse_statement()?);
        }
        Ok(body)
    }

    /// A braced, non empty statement block.
    fn parse_block(&mut self, construct: &'static str) -> Result<Vec<Expr>> {
        let open = self.consume(TokenKind::LBrace, "'{'")?;
        let body = self.parse_body()?;
        self.consume(TokenKind::RBrace, "'}'")?;
        if body.is_empty() {
            return Err(open.wrap(Error::EmptyBlock(construct)));
        }
        Ok(body)
    }

    fn parse_statement(&mut self) -> Result<Expr> {
        let token = self.peek();
        match token.kind {
            TokenKind::Return => {
                self.advance();
                let values = self.parse_expr_list()?;
                Ok(Expr {
                    kind: ExprKind::Return { values },
                    span: token.span(),
                })
            }
            TokenKind::If => {
                self.advance();
                let test = self.parse_expr()?;
                let then_body = self.parse_block("if")?;
                let else_body = if self.take(TokenKind::Else) {
                    self.parse_block("else")?
                } else {
                    Vec::new()
                };
                Ok(Expr {
                    kind: ExprKind::If {
                        test: Box::new(test),
                        then_body,
                        else_body,
                    },
                    span: token.span(),
                })
            }
            TokenKind::While => {
                self.advance();
                let test = self.parse_expr()?;
                let body = self.parse_block("while")?;
                Ok(Expr {
                    kind: ExprKind::While {
                        test: Box::new(test),
                        body,
                    },
                    span: token.span(),
                })
            }
            _ if self.nth(1).is(TokenKind::LParen) => self.parse_operand(),
            _ => self.parse_assignment(),
        }
    }

    fn parse_assignment(&mut self) -> Result<Expr> {
        let target = self.parse_variable_name()?;
        if self.is(TokenKind::Comma) {
            return Err(self.peek().wrap(Error::MultipleTargets));
        }
        self.consume(TokenKind::Assign, "'='")?;
        let values = self.parse_expr_list()?;
        Ok(Expr {
            span: target.span.clone(),
            kind: ExprKind::Assign { target, values },
        })
    }

    fn parse_expr_list(&mut self) -> Result<Vec<Expr>> {
        let mut exprs = vec![self.parse_expr()?];
        while self.take(TokenKind::Comma) {
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        if self.is(TokenKind::Backslash) {
            let backslash = self.advance();
            let target = self.consume(TokenKind::Identifier, "a primitive to cast to")?;
            let expr = self.parse_expr()?;
            return Ok(Expr {
                kind: ExprKind::Cast {
                    target: ident(&target),
                    expr: Box::new(expr),
                },
                span: backslash.span(),
            });
        }

        let first = self.parse_operand()?;
        if !self.is(TokenKind::Pipe) {
            return Ok(first);
        }
        let span = first.span.clone();
        let mut operands = vec![first];
        while self.take(TokenKind::Pipe) {
            operands.push(self.parse_operand()?);
        }
        let callee = operands.pop().expect("at least two operands");
        Ok(Expr {
            kind: ExprKind::LambdaApply {
                captured: operands,
                callee: Box::new(callee),
            },
            span,
        })
    }

    fn parse_operand(&mut self) -> Result<Expr> {
        let token = self.advance();
        if self.take(TokenKind::LBracket) {
            let base = Parser::parse_value(&token)?;
            let index = self.parse_expr()?;
            self.consume(TokenKind::RBracket, "']'")?;
            return Ok(Expr {
                kind: ExprKind::Access {
                    base: Box::new(base),
                    index: Box::new(index),
                },
                span: token.span(),
            });
        }
        if !self.take(TokenKind::LParen) {
            return Parser::parse_value(&token);
        }

        let callee = Parser::check_variable_name(&token)?;
        let mut args = Vec::new();
        while !self.is(TokenKind::RParen) {
            args.push(self.parse_expr()?);
            if !self.is(TokenKind::RParen) {
                self.consume(TokenKind::Comma, "',' or ')'")?;
            }
        }
        self.consume(TokenKind::RParen, "')'")?;
        Ok(Expr {
            kind: ExprKind::Call { callee, args },
            span: token.span(),
        })
    }

    fn parse_value(token: &Token) -> Result<Expr> {
        let term = match token.kind {
            TokenKind::Int => Term::Int(
                token
                    .text()
                    .parse()
                    .map_err(|_| token.wrap(Error::InvalidNumber(token.text().into())))?,
            ),
            TokenKind::Real => Term::Real(
                token
                    .text()
                    .parse()
                    .map_err(|_| token.wrap(Error::InvalidNumber(token.text().into())))?,
            ),
            TokenKind::True => Term::Bool(true),
            TokenKind::False => Term::Bool(false),
            TokenKind::String => Term::String(unquote(token.text()).into()),
            TokenKind::Identifier => Term::Name(ident(token)),
            TokenKind::Eof => return Err(token.wrap(Error::UnexpectedEof)),
            _ => return Err(token.wrap(Error::UnexpectedInExpr(token.text().into()))),
        };
        Ok(Expr {
            kind: ExprKind::Value(term),
            span: token.span(),
        })
    }

    fn parse_variable_name(&mut self) -> Result<Ident> {
        let token = self.advance();
        Parser::check_variable_name(&token)
    }

    fn check_variable_name(token: &Token) -> Result<Ident> {
        match token.kind {
            TokenKind::Identifier => Ok(ident(token)),
            TokenKind::Eof => Err(token.wrap(Error::UnexpectedEof)),
            kind if kind.is_keyword() => Err(token.wrap(Error::ReservedName(token.text().into()))),
            _ => Err(token.wrap(Error::InvalidName(token.text().into()))),
        }
    }
}

fn ident(token: &Token) -> Ident {
    Ident {
        name: Rc::clone(&token.text),
        span: token.span(),
    }
}

/// Strips the quotes of a string token and resolves its escapes.
fn unquote(text: &str) -> String {
    let inner = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(c @ ('\\' | '"' | '\'')) => out.push(c),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Utility functions.
impl<'tok, 'env> Parser<'tok, 'env> {
    fn new(
        tokens: &'tok [Token],
        registry: &'env mut TypeRegistry,
        builtins: &'env mut Builtins,
        libraries: &'env Libraries,
    ) -> Parser<'tok, 'env> {
        Parser {
            tokens,
            cursor: 0,
            eof: Token::eof_after(tokens.last()),
            registry,
            builtins,
            libraries,
        }
    }

    fn nth(&self, n: usize) -> &Token {
        self.tokens.get(self.cursor + n).unwrap_or(&self.eof)
    }

    fn peek(&self) -> Token {
        self.nth(0).clone()
    }

    /// Returns the current token and advances.
    fn advance(&mut self) -> Token {
        let c = self.peek();
        if self.cursor < self.tokens.len() {
            self.cursor += 1;
        }
        c
    }

    /// Checks whether the current token matches the given one.
    fn is(&self, expect: TokenKind) -> bool {
        self.nth(0).is(expect)
    }

    /// Advances if the current token matches the provided one, returning true.
    /// If not, returns false and doesn't advance.
    fn take(&mut self, expect: TokenKind) -> bool {
        if self.is(expect) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Advances if the current token matches the provided one, failing
    /// otherwise.
    fn consume(&mut self, expect: TokenKind, expected: &'static str) -> Result<Token> {
        let c = self.peek();
        if c.is(expect) {
            self.advance();
            Ok(c)
        } else if c.is(TokenKind::Eof) {
            Err(c.wrap(Error::UnexpectedEof))
        } else {
            Err(c.wrap(Error::Unexpected {
                expected,
                actual: c.text().into(),
            }))
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("expected {expected}, but got '{actual}'")]
    Unexpected {
        expected: &'static str,
        actual: Box<str>,
    },
    #[error("unexpected token '{0}' in expression")]
    UnexpectedInExpr(Box<str>),
    #[error("invalid number literal '{0}'")]
    InvalidNumber(Box<str>),
    #[error("invalid variable name: '{0}'")]
    InvalidName(Box<str>),
    #[error("variable name '{0}' is a reserved keyword")]
    ReservedName(Box<str>),
    #[error("multiple variables on the left-hand side are not allowed")]
    MultipleTargets,
    #[error("signature {signature} must have more primitives than there are arguments")]
    TooManyParams { signature: Box<str> },
    #[error("argument '{0}' is declared twice")]
    DuplicateParam(Box<str>),
    #[error("{0} body must not be empty")]
    EmptyBlock(&'static str),
    #[error("primitive already exists: {0}")]
    PrimitiveExists(String),
    #[error("primitive names must be a single character, got '{0}'")]
    PrimitiveLength(Box<str>),
    #[error("primitive names must be a letter, got '{0}'")]
    PrimitiveNotLetter(Box<str>),
    #[error("invalid import alias '{0}'")]
    InvalidImportAlias(Box<str>),
    #[error("module not found: {0}")]
    UnknownModule(Box<str>),
    #[error(transparent)]
    Signature(SignatureError),
    #[error(transparent)]
    Import(ImportError),
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;
    use crate::{lexer, util::test_utils::TEST_PATH};

    pub fn parse_program(src: &str) -> (TypeRegistry, Program) {
        let mut registry = TypeRegistry::with_builtins();
        let mut builtins = Builtins::prelude(&registry);
        let tokens = lexer::lex_in_new(TEST_PATH, src);
        let program = super::parse_program(&tokens, &mut registry, &mut builtins, &Libraries::default())
            .expect("failed to parse");
        (registry, program)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::test_utils::parse_program;
    use crate::{ast::test_utils::assigned_names, util::test_utils::tree_tests};

    #[test]
    fn test_assignments_in_nested_blocks() {
        let (_, program) = parse_program(
            "
            RR f(a) {
                x = a
                if True { y = a } else { while False { z = a } }
                w = x
                return w
            }
            ",
        );
        assert_eq!(assigned_names(&program.functions[0].body), ["x", "y", "z", "w"]);
    }

    #[test]
    fn test_declarations_extend_the_registry() {
        let (registry, program) = parse_program("X: {RR}\nY: {X2}");
        assert_eq!(program.primitives.len(), 2);
        assert_eq!(registry.get('Y').unwrap().pretty(), "Y: {XX}");
        assert_eq!(registry.len(), 8);
    }

    tree_tests!(
        use parser;

        fn test_function_with_call() {
            let program = "RRR add2(a, b) {\n  return add(a, b)\n}";
            let tree_ok = "
                function add2(a: R, b: R) -> R (1:5)
                  return (2:3)
                    call add (2:10)
                      name a (2:14)
                      name b (2:17)
            ";
        }

        fn test_compact_signature() {
            let program = "R3 f(a, b) { return a }";
            let tree_ok = "
                function f(a: R, b: R) -> R (1:4)
                  return (1:14)
                    name a (1:21)
            ";
        }

        fn test_multiple_returns() {
            let program = "NRR split(n) { x = 1.0, 2.0\n return x }";
            let tree_ok = "
                function split(n: N) -> RR (1:5)
                  assign x (1:16)
                    real 1.0 (1:20)
                    real 2.0 (1:25)
                  return (2:2)
                    name x (2:9)
            ";
        }

        fn test_primitive_declaration() {
            let program = "X: {RR}\nRX f(a) { return a }";
            let tree_ok = "
                primitive X: {RR} (1:1)
                function f(a: R) -> X (2:4)
                  return (2:11)
                    name a (2:18)
            ";
        }

        fn test_import_declarations() {
            let program = "*: \"ext\"\nm: \"ext\"\nRR f(a) { return R__abs(m__R__abs(a)) }";
            let tree_ok = "
                import \"ext\" as * (1:1)
                import \"ext\" as m (2:1)
                function f(a: R) -> R (3:4)
                  return (3:11)
                    call R__abs (3:18)
                      call m__R__abs (3:25)
                        name a (3:35)
            ";
        }

        fn test_control_flow() {
            let program = "
RB f(a) {
  if lt(a, 0) { return True } else { return False }
  while True { a = sub(a, 1) }
  print(a)
}";
            let tree_ok = "
                function f(a: R) -> B (2:4)
                  if (3:3)
                    call lt (3:6)
                      name a (3:9)
                      int 0 (3:12)
                  then
                    return (3:17)
                      bool True (3:24)
                  else
                    return (3:38)
                      bool False (3:45)
                  while (4:3)
                    bool True (4:9)
                  do
                    assign a (4:16)
                      call sub (4:20)
                        name a (4:24)
                        int 1 (4:27)
                  call print (5:3)
                    name a (5:9)
            ";
        }

        fn test_cast_access_and_pipe() {
            let program = "X: {RRR}\nRRX f(a, b) { y = \\X a | b | sum3\n return y[0], \"s\\\"q\" }";
            let tree_ok = r#"
                primitive X: {RRR} (1:1)
                function f(a: R, b: R) -> X (2:5)
                  assign y (2:15)
                    cast X (2:19)
                      apply (2:22)
                        name a (2:22)
                        name b (2:26)
                      to
                        name sum3 (2:30)
                  return (3:2)
                    access (3:9)
                      name y (3:9)
                      int 0 (3:11)
                    string "s\"q" (3:15)
            "#;
        }

        fn test_primitive_alias_too_long() {
            let program = "RR: {R}";
            let expected_errors = &["1:1: primitive names must be a single character, got 'RR'"];
        }

        fn test_primitive_redefinition() {
            let program = "R: {NN}";
            let expected_errors = &["1:1: primitive already exists: R: {\\real}"];
        }

        fn test_primitive_empty_signature() {
            let program = "X: {}";
            let expected_errors = &["1:5: cannot declare an empty signature"];
        }

        fn test_undefined_primitive_in_signature() {
            let program = "RQ f(a) { return a }";
            let expected_errors = &["1:1: primitive Q is not defined"];
        }

        fn test_too_many_params() {
            let program = "RR f(a, b) { return a }";
            let expected_errors = &["1:9: signature RR must have more primitives than there are arguments"];
        }

        fn test_duplicate_param() {
            let program = "RRR f(a, a) { return a }";
            let expected_errors = &["1:10: argument 'a' is declared twice"];
        }

        fn test_keyword_param() {
            let program = "RR f(while) { return 1 }";
            let expected_errors = &["1:6: variable name 'while' is a reserved keyword"];
        }

        fn test_multiple_assignment_targets() {
            let program = "RR f(a) { x, y = a, a\n return x }";
            let expected_errors = &["1:12: multiple variables on the left-hand side are not allowed"];
        }

        fn test_empty_if_body() {
            let program = "RR f(a) { if True { } return a }";
            let expected_errors = &["1:19: if body must not be empty"];
        }

        fn test_unknown_module() {
            let program = "m: \"nowhere\"";
            let expected_errors = &["1:4: module not found: nowhere"];
        }

        fn test_unexpected_eof() {
            let program = "RR f(a) { return a";
            let expected_errors = &["1:19: unexpected end of input"];
        }

        fn test_unexpected_token_in_expression() {
            let program = "RR f(a) { return ) }";
            let expected_errors = &["1:18: unexpected token ')' in expression"];
        }

        fn test_integer_literal_out_of_range() {
            let program = "NN f(n) { return 99999999999999999999 }";
            let expected_errors = &["1:18: invalid number literal '99999999999999999999'"];
        }

        fn test_invalid_callee() {
            let program = "RR f(a) { return 3(a) }";
            let expected_errors = &["1:18: invalid variable name: '3'"];
        }
    );

    tree_tests!(
        use parser;

        fn test_single_expression() {
            let expr = "add(1, 2.5)";
            let tree_ok = "
                call add (1:1)
                  int 1 (1:5)
                  real 2.5 (1:8)
            ";
        }

        fn test_cast_binds_loosest() {
            let expr = "\\R a | f";
            let tree_ok = "
                cast R (1:1)
                  apply (1:4)
                    name a (1:4)
                  to
                    name f (1:8)
            ";
        }

        fn test_trailing_tokens() {
            let expr = "a b";
            let expected_errors = &["1:3: expected end of input, but got 'b'"];
        }
    );
}
