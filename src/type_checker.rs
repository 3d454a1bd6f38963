use std::{
    collections::{BTreeSet, HashMap},
    rc::Rc,
};

use tracing::debug;

use crate::{
    ast::{Expr, ExprKind, Function, Ident, Program, Term},
    builtins::Builtins,
    token::{Span, Spanned},
    types::{builtins, Comparable, Powerset, Type, TypeRegistry},
};

type Result<T, E = Spanned<Error>> = std::result::Result<T, E>;

/// Validates every function of `program`, in declaration order, stopping at
/// the first error.
pub fn check_program(
    program: &Program,
    registry: &TypeRegistry,
    builtins: &Builtins,
) -> Result<()> {
    let checker = Checker::new(registry, program, builtins)?;
    for function in &program.functions {
        checker.check_function(function)?;
    }
    Ok(())
}

/// A callable visible from every function body.
struct Global {
    params: Vec<(Rc<str>, Type)>,
    ret: Type,
    span: Span,
}

impl Global {
    /// The nameless powerset over the full signature, arguments first.
    fn as_value(&self) -> Type {
        let full = Type::join(self.params.iter().map(|(_, ty)| ty).chain([&self.ret]));
        Type::Powerset(Powerset::nameless(full))
    }
}

struct Checker<'r> {
    registry: &'r TypeRegistry,
    globals: HashMap<Rc<str>, Global>,
}

impl<'r> Checker<'r> {
    /// Collects the global function table: natives first, then every source
    /// function. Names must be unique across both.
    fn new(
        registry: &'r TypeRegistry,
        program: &Program,
        builtins: &Builtins,
    ) -> Result<Checker<'r>> {
        let mut globals = HashMap::with_capacity(builtins.len() + program.functions.len());
        for native in builtins.iter() {
            globals.insert(
                Rc::clone(&native.name),
                Global {
                    params: native.params.clone(),
                    ret: native.ret.clone(),
                    span: Span::builtin(),
                },
            );
        }
        for function in &program.functions {
            let name = &function.name;
            if let Some(other) = globals.get(&name.name) {
                return Err(name.span.clone().wrap(Error::DuplicateFunction {
                    name: Rc::clone(&name.name),
                    other_definition_span: other.span.clone(),
                }));
            }
            let global = Global {
                params: function
                    .params
                    .iter()
                    .map(|param| (Rc::clone(&param.name.name), param.ty.clone()))
                    .collect(),
                ret: function.ret.clone(),
                span: name.span.clone(),
            };
            globals.insert(Rc::clone(&name.name), global);
        }
        Ok(Checker { registry, globals })
    }

    fn check_function(&self, function: &Function) -> Result<()> {
        if function.body.is_empty() {
            return Err(function.name.span.clone().wrap(Error::EmptyBody));
        }
        let mut ctx = Context {
            locals: function
                .params
                .iter()
                .map(|param| (Rc::clone(&param.name.name), param.ty.clone()))
                .collect(),
            ret: &function.ret,
        };
        for stmt in &function.body {
            self.check_expr(&mut ctx, stmt)?;
        }
        debug!(function = %function.name.name, "validated");
        Ok(())
    }

    /// Checks an expression or statement, returning the type of the value it
    /// produces, if any.
    fn check_expr(&self, ctx: &mut Context<'_>, expr: &Expr) -> Result<Option<Type>> {
        match &expr.kind {
            ExprKind::Value(term) => self.check_term(ctx, term, &expr.span).map(Some),
            ExprKind::Call { callee, args } => self.check_call(ctx, callee, args).map(Some),
            ExprKind::Assign { target, values } => {
                let joined = self.check_values(ctx, values, &expr.span)?;
                match ctx.locals.get(&target.name) {
                    Some(previous) if previous.alias() != joined.alias() => {
                        return Err(target.span.clone().wrap(Error::Retyped {
                            name: Rc::clone(&target.name),
                            previous: previous.pretty(),
                            actual: joined.pretty(),
                        }));
                    }
                    Some(_) => {}
                    None => {
                        ctx.locals.insert(Rc::clone(&target.name), joined);
                    }
                }
                Ok(None)
            }
            ExprKind::Return { values } => {
                let joined = self.check_values(ctx, values, &expr.span)?;
                if joined.comparable() != ctx.ret.comparable() {
                    return Err(expr.span.clone().wrap(Error::ReturnMismatch {
                        expected: ctx.ret.pretty(),
                        actual: joined.pretty(),
                    }));
                }
                Ok(None)
            }
            ExprKind::If {
                test,
                then_body,
                else_body,
            } => {
                self.check_condition(ctx, test, "if")?;
                for stmt in then_body.iter().chain(else_body) {
                    self.check_expr(ctx, stmt)?;
                }
                Ok(None)
            }
            ExprKind::While { test, body } => {
                self.check_condition(ctx, test, "while")?;
                for stmt in body {
                    self.check_expr(ctx, stmt)?;
                }
                Ok(None)
            }
            ExprKind::Access { base, index } => self.check_access(ctx, base, index).map(Some),
            ExprKind::Cast { target, expr } => {
                let from = self.check_value(ctx, expr)?;
                let to = self
                    .registry
                    .lookup(target.as_str())
                    .ok_or_else(|| {
                        target.span.clone().wrap(Error::UndefinedPrimitive(Rc::clone(&target.name)))
                    })?;
                if from.comparable() != to.comparable() {
                    return Err(target.span.clone().wrap(Error::InvalidCast {
                        from: from.pretty(),
                        to: to.pretty(),
                    }));
                }
                Ok(Some(to))
            }
            ExprKind::LambdaApply { captured, callee } => {
                self.check_lambda_apply(ctx, captured, callee).map(Some)
            }
        }
    }

    /// Checks an expression that must produce a value.
    ///
    /// A local call that also fills the callee's return slots has the empty
    /// type and is only allowed as a statement.
    fn check_value(&self, ctx: &mut Context<'_>, expr: &Expr) -> Result<Type> {
        match self.check_expr(ctx, expr)? {
            Some(ty) if !ty.is_empty() => Ok(ty),
            _ => Err(expr.span.clone().wrap(Error::NoValue)),
        }
    }

    /// Checks the right-hand side of an assignment or return, joining the
    /// value types into one signature.
    fn check_values(&self, ctx: &mut Context<'_>, values: &[Expr], span: &Span) -> Result<Type> {
        let mut types = Vec::with_capacity(values.len());
        for value in values {
            let ty = self.check_value(ctx, value)?;
            if ty.is_nameless() {
                return Err(value.span.clone().wrap(Error::Nameless { ty: ty.pretty() }));
            }
            types.push(ty);
        }
        if types.is_empty() {
            return Err(span.clone().wrap(Error::NoValue));
        }
        Ok(Type::join(&types))
    }

    fn check_term(&self, ctx: &Context<'_>, term: &Term, span: &Span) -> Result<Type> {
        let alias = match term {
            Term::Int(_) => builtins::INTEGER,
            Term::Real(_) => builtins::REAL,
            Term::Bool(_) => builtins::BOOLEAN,
            Term::String(_) => builtins::STRING,
            Term::Name(ident) => {
                if let Some(local) = ctx.locals.get(&ident.name) {
                    return Ok(local.clone());
                }
                if let Some(global) = self.globals.get(&ident.name) {
                    return Ok(global.as_value());
                }
                return Err(span.clone().wrap(Error::UndefinedName(Rc::clone(&ident.name))));
            }
        };
        Ok(self.builtin(alias))
    }

    fn check_call(&self, ctx: &mut Context<'_>, callee: &Ident, args: &[Expr]) -> Result<Type> {
        let (params, ret) = if let Some(global) = self.globals.get(&callee.name) {
            (global.params.clone(), global.ret.clone())
        } else if let Some(local) = ctx.locals.get(&callee.name) {
            Checker::partial_signature(callee, local, args.len())?
        } else {
            return Err(callee.span.clone().wrap(Error::UndefinedFunction(Rc::clone(&callee.name))));
        };

        if args.len() != params.len() {
            return Err(callee.span.clone().wrap(Error::ArgumentCount {
                name: Rc::clone(&callee.name),
                expected: params.len(),
                actual: args.len(),
            }));
        }
        for (i, (arg, (param, expected))) in args.iter().zip(&params).enumerate() {
            let actual = self.check_value(ctx, arg)?;
            if actual.comparable() != expected.comparable() {
                return Err(arg.span.clone().wrap(Error::ArgumentMismatch {
                    index: i + 1,
                    param: Rc::clone(param),
                    expected: expected.pretty(),
                    actual: actual.pretty(),
                }));
            }
        }
        Ok(ret)
    }

    /// Treats a local powerset as a function taking the leading `argc` atoms
    /// of its base, returning the rest.
    fn partial_signature(
        callee: &Ident,
        local: &Type,
        argc: usize,
    ) -> Result<(Vec<(Rc<str>, Type)>, Type)> {
        let Type::Powerset(powerset) = local else {
            return Err(callee.span.clone().wrap(Error::NotCallable {
                name: Rc::clone(&callee.name),
                ty: local.pretty(),
            }));
        };
        let atoms = powerset.base().atoms();
        if argc > atoms.len() {
            return Err(callee.span.clone().wrap(Error::ArgumentCount {
                name: Rc::clone(&callee.name),
                expected: atoms.len(),
                actual: argc,
            }));
        }
        let params = atoms[..argc]
            .iter()
            .enumerate()
            .map(|(i, ty)| (Rc::from(format!("__arg{i}")), ty.clone()))
            .collect();
        let ret = Type::from_atoms(atoms[argc..].to_vec());
        Ok((params, ret))
    }

    fn check_condition(&self, ctx: &mut Context<'_>, test: &Expr, construct: &'static str) -> Result<()> {
        let ty = self.check_value(ctx, test)?;
        if ty.comparable() != Comparable::Primitive(builtins::BOOLEAN) {
            return Err(test.span.clone().wrap(Error::NonBooleanCondition {
                construct,
                actual: ty.pretty(),
            }));
        }
        Ok(())
    }

    fn check_access(&self, ctx: &mut Context<'_>, base: &Expr, index: &Expr) -> Result<Type> {
        let base_ty = self.check_value(ctx, base)?;
        let indexed = match &base_ty {
            Type::Primitive(_) => None,
            Type::Powerset(powerset) => Some(powerset.base().clone()),
            Type::Signature(_) => Some(base_ty.clone()),
        };
        let Some(indexed) = indexed.filter(Type::is_signature) else {
            return Err(base.span.clone().wrap(Error::NotIndexable {
                ty: base_ty.pretty(),
            }));
        };

        let index_ty = self.check_value(ctx, index)?;
        if index_ty.comparable() != Comparable::Primitive(builtins::INTEGER) {
            return Err(index.span.clone().wrap(Error::IndexNotInteger {
                actual: index_ty.pretty(),
            }));
        }

        let aliases: BTreeSet<String> = indexed.atoms().iter().map(Type::alias).collect();
        match indexed.atoms().first() {
            Some(first) if aliases.len() == 1 => Ok(first.clone()),
            _ => Err(base.span.clone().wrap(Error::Heterogeneous {
                aliases: aliases.into_iter().collect::<Vec<_>>().join(", "),
            })),
        }
    }

    fn check_lambda_apply(
        &self,
        ctx: &mut Context<'_>,
        captured: &[Expr],
        callee: &Expr,
    ) -> Result<Type> {
        let callee_ty = self.check_value(ctx, callee)?;
        let Type::Powerset(powerset) = &callee_ty else {
            return Err(callee.span.clone().wrap(Error::NotApplicable {
                ty: callee_ty.pretty(),
            }));
        };
        let atoms = powerset.base().atoms();
        if captured.len() >= atoms.len() {
            return Err(callee.span.clone().wrap(Error::TooManyCaptures {
                ty: callee_ty.pretty(),
                max: atoms.len().saturating_sub(1),
                actual: captured.len(),
            }));
        }
        for (i, (value, expected)) in captured.iter().zip(atoms).enumerate() {
            let actual = self.check_value(ctx, value)?;
            if actual.comparable() != expected.comparable() {
                return Err(value.span.clone().wrap(Error::CaptureMismatch {
                    index: i + 1,
                    expected: expected.pretty(),
                    actual: actual.pretty(),
                }));
            }
        }
        let rest = Type::from_atoms(atoms[captured.len()..].to_vec());
        Ok(Type::Powerset(Powerset::nameless(rest)))
    }

    fn builtin(&self, alias: char) -> Type {
        self.registry
            .get(alias)
            .expect("registries are always seeded with the built-in primitives")
    }
}

/// Per-function state: the locals bound so far and the declared return.
struct Context<'f> {
    locals: HashMap<Rc<str>, Type>,
    ret: &'f Type,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("function {name} already defined at {other_definition_span}")]
    DuplicateFunction {
        name: Rc<str>,
        other_definition_span: Span,
    },
    #[error("cannot validate a function with no statements")]
    EmptyBody,
    #[error("{0} is not defined")]
    UndefinedName(Rc<str>),
    #[error("function {0} is not defined")]
    UndefinedFunction(Rc<str>),
    #[error("primitive {0} is not defined")]
    UndefinedPrimitive(Rc<str>),
    #[error("{name} has type {ty}, which is not callable")]
    NotCallable { name: Rc<str>, ty: String },
    #[error("{name} takes {expected} arguments, but got {actual}")]
    ArgumentCount {
        name: Rc<str>,
        expected: usize,
        actual: usize,
    },
    #[error("expected {expected} but got {actual} at argument {index} ('{param}')")]
    ArgumentMismatch {
        index: usize,
        param: Rc<str>,
        expected: String,
        actual: String,
    },
    #[error("expression produces no value")]
    NoValue,
    #[error("cannot bind a nameless function type {ty}; cast it to a declared primitive first")]
    Nameless { ty: String },
    #[error("{name} was {previous}, cannot reassign it to {actual}")]
    Retyped {
        name: Rc<str>,
        previous: String,
        actual: String,
    },
    #[error("expected return type {expected}, but got {actual}")]
    ReturnMismatch { expected: String, actual: String },
    #[error("{construct} condition must be boolean, but got {actual}")]
    NonBooleanCondition {
        construct: &'static str,
        actual: String,
    },
    #[error("cannot index into {ty}")]
    NotIndexable { ty: String },
    #[error("index must be an integer, but got {actual}")]
    IndexNotInteger { actual: String },
    #[error("all primitives of an indexed value must have the same type, but found {aliases}")]
    Heterogeneous { aliases: String },
    #[error("cannot cast {from} to {to}")]
    InvalidCast { from: String, to: String },
    #[error("cannot partially apply {ty}, which is not a function")]
    NotApplicable { ty: String },
    #[error("{ty} accepts at most {max} captured values, but got {actual}")]
    TooManyCaptures {
        ty: String,
        max: usize,
        actual: usize,
    },
    #[error("expected {expected} but got {actual} at captured value {index}")]
    CaptureMismatch {
        index: usize,
        expected: String,
        actual: String,
    },
}

#[cfg(test)]
mod tests {
    use crate::util::test_utils::tree_tests;

    tree_tests!(
        use checker;

        fn test_arithmetic() {
            let program = "RRR add2(a, b) { return add(a, b) }";
            let expected_errors = &[];
        }

        fn test_locals_and_control_flow() {
            let program = "
RRB f(a, b) {
  x = add(a, b)
  if lt(x, 0.0) { return False }
  while gt(x, 10.0) { x = sub(x, 1.0) }
  return True
}";
            let expected_errors = &[];
        }

        fn test_undefined_name() {
            let program = "RR f(a) { return b }";
            let expected_errors = &["1:18: b is not defined"];
        }

        fn test_undefined_function() {
            let program = "RR f(a) { return g(a) }";
            let expected_errors = &["1:18: function g is not defined"];
        }

        fn test_argument_count() {
            let program = "RR f(a) { return add(a) }";
            let expected_errors = &["1:18: add takes 2 arguments, but got 1"];
        }

        fn test_argument_mismatch() {
            let program = "RR f(a) { return add(a, True) }";
            let expected_errors = &[
                "1:25: expected R: {\\real} but got B: {\\boolean} at argument 2 ('y')",
            ];
        }

        fn test_return_mismatch() {
            let program = "RR f(a) { return a, a }";
            let expected_errors = &["1:11: expected return type R: {\\real}, but got RR"];
        }

        fn test_retyping_a_local() {
            let program = "RR f(a) { x = a\n x = 1\n return x }";
            let expected_errors = &["2:2: x was R: {\\real}, cannot reassign it to N: {\\int}"];
        }

        fn test_retyping_requires_the_same_alias() {
            let program = "
X: {RR}
Y: {RR}
RXR f(a, g) {
  h = \\X g
  h = \\Y g
  return a
}";
            let expected_errors = &["6:3: h was X: {RR}, cannot reassign it to Y: {RR}"];
        }

        fn test_powersets_substitute_by_base() {
            let program = "
X: {RR}
Y: {RR}
RXR run(a, g) { return g(a) }
RYR f(a, h) { return run(a, h) }";
            let expected_errors = &[];
        }

        fn test_powersets_over_other_bases_do_not_substitute() {
            let program = "
X: {RR}
Z: {RN}
RXR run(a, g) { return g(a) }
RZR f(a, h) { return run(a, h) }";
            let expected_errors = &["5:29: expected X: {RR} but got Z: {RN} at argument 2 ('g')"];
        }

        fn test_returns_compare_powersets_by_base() {
            let program = "
X: {RR}
Y: {RR}
RYX f(a, h) { return h }";
            let expected_errors = &[];
        }

        fn test_returns_reject_powersets_over_other_bases() {
            let program = "
X: {RR}
Z: {RN}
RZX f(a, h) { return h }";
            let expected_errors = &["4:15: expected return type X: {RR}, but got Z: {RN}"];
        }

        fn test_cast_between_powersets_over_the_same_base() {
            let program = "
X: {RR}
Y: {RR}
RXR f(a, g) {
  h = \\Y g
  return h(a)
}";
            let expected_errors = &[];
        }

        fn test_non_boolean_condition() {
            let program = "RR f(a) { if a { return a } return a }";
            let expected_errors = &["1:14: if condition must be boolean, but got R: {\\real}"];
        }

        fn test_index_into_primitive() {
            let program = "RR f(a) { return a[0] }";
            let expected_errors = &["1:18: cannot index into R: {\\real}"];
        }

        fn test_index_must_be_integer() {
            let program = "RRR f(a, b) { x = a, b\n return x[1.0] }";
            let expected_errors = &["2:11: index must be an integer, but got R: {\\real}"];
        }

        fn test_homogeneous_index() {
            let program = "RRR f(a, b) { x = a, b\n return x[0] }";
            let expected_errors = &[];
        }

        fn test_heterogeneous_index() {
            let program = "RNR f(a, n) { x = a, n\n return x[0] }";
            let expected_errors = &[
                "2:9: all primitives of an indexed value must have the same type, but found N, R",
            ];
        }

        fn test_function_reference_is_nameless() {
            let program = "RRR add2(a, b) { return add(a, b) }\nRR f(a) { g = add2\n return a }";
            let expected_errors = &[
                "2:15: cannot bind a nameless function type {RRR}; cast it to a declared primitive first",
            ];
        }

        fn test_currying() {
            let program = "
X: {RRR}
RRRR sum3(a, b, c) { return add(add(a, b), c) }
RR f(a) {
  g = \\X 1.0 | sum3
  return g(a, 2.0)
}";
            let expected_errors = &[];
        }

        fn test_local_call_filling_the_return_slot() {
            let program = "
X: {RRR}
RRRR sum3(a, b, c) { return add(add(a, b), c) }
RR f(a) {
  g = \\X 1.0 | sum3
  g(a, 2.0, 3.0)
  return a
}";
            let expected_errors = &[];
        }

        fn test_local_call_filling_the_return_slot_has_no_value() {
            let program = "
X: {RRR}
RRRR sum3(a, b, c) { return add(add(a, b), c) }
RRR f(a, e) {
  g = \\X 1.0 | sum3
  y = g(a, 2.0, e)
  return a
}";
            let expected_errors = &["6:7: expression produces no value"];
        }

        fn test_returning_a_call_that_fills_the_return_slot() {
            let program = "
X: {RRR}
RRRR sum3(a, b, c) { return add(add(a, b), c) }
RRR f(a, e) {
  g = \\X 1.0 | sum3
  return a, g(a, 2.0, e)
}";
            let expected_errors = &["6:13: expression produces no value"];
        }

        fn test_local_call_beyond_its_slots() {
            let program = "
X: {RRR}
RRRR sum3(a, b, c) { return add(add(a, b), c) }
RR f(a) {
  g = \\X 1.0 | sum3
  return g(a, 2.0, 3.0, 4.0)
}";
            let expected_errors = &["6:10: g takes 3 arguments, but got 4"];
        }

        fn test_too_many_captures() {
            let program = "RRR add2(a, b) { return add(a, b) }\nRR f(a) { g = a | a | a | add2\n return a }";
            let expected_errors = &["2:27: {RRR} accepts at most 2 captured values, but got 3"];
        }

        fn test_capture_mismatch() {
            let program = "RRR add2(a, b) { return add(a, b) }\nRR f(a) { g = True | add2\n return a }";
            let expected_errors = &["2:15: expected R: {\\real} but got B: {\\boolean} at captured value 1"];
        }

        fn test_invalid_cast() {
            let program = "X: {RR}\nRRR add2(a, b) { return add(a, b) }\nRR f(a) { g = \\X add2\n return a }";
            let expected_errors = &["3:16: cannot cast {RRR} to X: {RR}"];
        }

        fn test_empty_body() {
            let program = "RR f(a) { }";
            let expected_errors = &["1:4: cannot validate a function with no statements"];
        }

        fn test_duplicate_function() {
            let program = "RR f(a) { return a }\nRR f(a) { return a }";
            let expected_errors = &["2:4: function f already defined at test.ss:1:4"];
        }

        fn test_shadowing_a_builtin() {
            let program = "RR abs(a) { return a }";
            let expected_errors = &["1:4: function abs already defined at <builtin>:0:0"];
        }

        fn test_local_that_is_not_callable() {
            let program = "RR f(a) { return a(a) }";
            let expected_errors = &["1:18: a has type R: {\\real}, which is not callable"];
        }

        fn test_order_of_resolution() {
            let program = "RR f(add) { return add(add, add) }";
            let expected_errors = &[];
        }
    );
}
