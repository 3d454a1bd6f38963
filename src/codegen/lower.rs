use std::{
    collections::{HashMap, HashSet},
    rc::Rc,
};

use tracing::debug;

use crate::{
    ast::{self, Expr, ExprKind, Program, Term},
    builtins::Builtins,
    codegen::module::{ImportEntry, Instr, Module, Unit},
    runtime::{
        slots::Shape,
        value::{Callable, Value},
    },
    types::{Repr, Type},
};

/// Lowers a validated program into a [`Module`].
pub fn lower(program: &Program, natives: Builtins) -> Module {
    let mut globals: HashMap<Rc<str>, Callable> = HashMap::new();
    for native in natives.iter() {
        let name = Rc::clone(&native.name);
        globals.insert(Rc::clone(&name), Callable::Native(name));
    }
    for function in &program.functions {
        let name = Rc::clone(&function.name.name);
        globals.insert(Rc::clone(&name), Callable::Unit(name));
    }

    let units = program
        .functions
        .iter()
        .map(|function| Lowerer::new(&globals, function).lower(function))
        .collect();
    let imports = program
        .imports
        .iter()
        .map(|import| ImportEntry {
            alias: import.alias.clone(),
            path: import.path.clone(),
        })
        .collect();
    Module::new(imports, natives, units)
}

/// Builds the runtime shape of a function from its declared types.
pub fn shape_of(function: &ast::Function) -> Shape {
    Shape {
        params: function
            .params
            .iter()
            .map(|param| (Rc::clone(&param.name.name), repr(&param.ty)))
            .collect(),
        returns: function.ret.atoms().iter().map(repr).collect(),
    }
}

fn repr(ty: &Type) -> Repr {
    ty.repr().unwrap_or(Repr::Pointer)
}

struct Lowerer<'g> {
    globals: &'g HashMap<Rc<str>, Callable>,
    /// Names bound so far, in textual order, mirroring the checker.
    locals: HashSet<Rc<str>>,
    code: Vec<Instr>,
}

impl<'g> Lowerer<'g> {
    fn new(globals: &'g HashMap<Rc<str>, Callable>, function: &ast::Function) -> Lowerer<'g> {
        Lowerer {
            globals,
            locals: function
                .params
                .iter()
                .map(|param| Rc::clone(&param.name.name))
                .collect(),
            code: Vec::with_capacity(32),
        }
    }

    fn lower(mut self, function: &ast::Function) -> Unit {
        for stmt in &function.body {
            self.g_stmt(stmt);
        }
        let signature = function
            .params
            .iter()
            .map(|param| &param.ty)
            .chain([&function.ret])
            .map(Type::alias)
            .collect();
        debug!(function = %function.name.name, instrs = self.code.len(), "lowered");
        Unit {
            name: Rc::clone(&function.name.name),
            signature,
            shape: shape_of(function),
            code: self.code,
        }
    }

    fn g_stmt(&mut self, stmt: &Expr) {
        match &stmt.kind {
            ExprKind::Assign { target, values } => {
                self.g_exprs(values);
                self.emit(Instr::Pack(values.len()));
                self.emit(Instr::Store(Rc::clone(&target.name)));
                self.locals.insert(Rc::clone(&target.name));
            }
            ExprKind::Return { values } => {
                self.g_exprs(values);
                self.emit(Instr::Return(values.len()));
            }
            ExprKind::If {
                test,
                then_body,
                else_body,
            } => {
                self.g_expr(test);
                let to_else = self.emit(Instr::JumpUnless(0));
                self.g_body(then_body);
                if else_body.is_empty() {
                    self.patch(to_else);
                } else {
                    let to_end = self.emit(Instr::Jump(0));
                    self.patch(to_else);
                    self.g_body(else_body);
                    self.patch(to_end);
                }
            }
            ExprKind::While { test, body } => {
                let top = self.code.len();
                self.g_expr(test);
                let to_end = self.emit(Instr::JumpUnless(0));
                self.g_body(body);
                self.emit(Instr::Jump(top));
                self.patch(to_end);
            }
            _ => {
                self.g_expr(stmt);
                self.emit(Instr::Pop);
            }
        }
    }

    fn g_body(&mut self, body: &[Expr]) {
        for stmt in body {
            self.g_stmt(stmt);
        }
    }

    fn g_exprs(&mut self, exprs: &[Expr]) {
        for expr in exprs {
            self.g_expr(expr);
        }
    }

    fn g_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Value(term) => self.g_term(term),
            ExprKind::Call { callee, args } => {
                self.g_exprs(args);
                let argc = args.len();
                let instr = match self.globals.get(&callee.name) {
                    Some(global) => Instr::Call {
                        callee: global.clone(),
                        argc,
                    },
                    None => Instr::CallLocal {
                        name: Rc::clone(&callee.name),
                        argc,
                    },
                };
                self.emit(instr);
            }
            ExprKind::Access { base, index } => {
                self.g_expr(base);
                self.g_expr(index);
                self.emit(Instr::Index);
            }
            // Casts only retag the static type.
            ExprKind::Cast { expr, .. } => self.g_expr(expr),
            ExprKind::LambdaApply { captured, callee } => {
                self.g_exprs(captured);
                self.g_expr(callee);
                self.emit(Instr::Apply {
                    captured: captured.len(),
                });
            }
            ExprKind::Assign { .. }
            | ExprKind::Return { .. }
            | ExprKind::If { .. }
            | ExprKind::While { .. } => {
                self.g_stmt(expr);
                self.emit(Instr::Const(Value::Tuple(Rc::from(Vec::new()))));
            }
        }
    }

    fn g_term(&mut self, term: &Term) {
        let instr = match term {
            Term::Int(i) => Instr::Const(Value::Int(*i)),
            Term::Real(r) => Instr::Const(Value::Real(*r)),
            Term::Bool(b) => Instr::Const(Value::Bool(*b)),
            Term::String(s) => Instr::Const(Value::Str(Rc::from(&**s))),
            Term::Name(ident) => {
                if self.locals.contains(&ident.name) {
                    Instr::Load(Rc::clone(&ident.name))
                } else if let Some(global) = self.globals.get(&ident.name) {
                    Instr::Global(global.clone())
                } else {
                    Instr::Load(Rc::clone(&ident.name))
                }
            }
        };
        self.emit(instr);
    }

    /// Appends an instruction, returning its position.
    fn emit(&mut self, instr: Instr) -> usize {
        self.code.push(instr);
        self.code.len() - 1
    }

    /// Points the jump at `at` to the next instruction.
    fn patch(&mut self, at: usize) {
        let here = self.code.len();
        match &mut self.code[at] {
            Instr::Jump(target) | Instr::JumpUnless(target) => *target = here,
            other => unreachable!("patched a non-jump instruction: {other}"),
        }
    }
}
