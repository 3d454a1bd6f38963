use std::io::Write;

use crate::ast::*;

const INDENT_WIDTH: usize = 2;

pub fn print_program_string(program: &Program) -> String {
    let mut buf = Vec::with_capacity(1024);
    print_program(&mut buf, program).expect("writing to a buffer cannot fail");
    String::from_utf8(buf).expect("tree output is valid UTF-8")
}

pub fn print_expr_string(expr: &Expr) -> String {
    let mut buf = Vec::with_capacity(512);
    print_expr(&mut buf, 0, expr).expect("writing to a buffer cannot fail");
    String::from_utf8(buf).expect("tree output is valid UTF-8")
}

pub fn print_program(w: &mut impl Write, program: &Program) -> std::io::Result<()> {
    for decl in &program.primitives {
        let span = &decl.span;
        writeln!(w, "primitive {} ({}:{})", decl.ty, span.row, span.col)?;
    }
    for import in &program.imports {
        let alias = import.alias.as_deref().unwrap_or("*");
        let span = &import.span;
        writeln!(
            w,
            "import {:?} as {alias} ({}:{})",
            import.path, span.row, span.col
        )?;
    }
    for function in &program.functions {
        print_function(w, 0, function)?;
    }
    Ok(())
}

fn print_function(w: &mut impl Write, i: usize, function: &Function) -> std::io::Result<()> {
    sp(w, i)?;
    write!(w, "function {}(", function.name.as_str())?;
    for (idx, param) in function.params.iter().enumerate() {
        if idx > 0 {
            write!(w, ", ")?;
        }
        write!(w, "{}: {}", param.name.as_str(), param.ty.alias())?;
    }
    let span = &function.name.span;
    writeln!(w, ") -> {} ({}:{})", function.ret.alias(), span.row, span.col)?;
    for stmt in &function.body {
        print_expr(w, i + 1, stmt)?;
    }
    Ok(())
}

pub fn print_expr(w: &mut impl Write, i: usize, expr: &Expr) -> std::io::Result<()> {
    sp(w, i)?;
    let span = format!("{}:{}", expr.span.row, expr.span.col);
    match &expr.kind {
        ExprKind::Value(term) => match term {
            Term::Int(val) => writeln!(w, "int {val} ({span})")?,
            Term::Real(val) => writeln!(w, "real {val:?} ({span})")?,
            Term::Bool(true) => writeln!(w, "bool True ({span})")?,
            Term::Bool(false) => writeln!(w, "bool False ({span})")?,
            Term::String(val) => writeln!(w, "string {val:?} ({span})")?,
            Term::Name(ident) => writeln!(w, "name {} ({span})", ident.as_str())?,
        },
        ExprKind::Call { callee, args } => {
            writeln!(w, "call {} ({span})", callee.as_str())?;
            print_list(w, i + 1, args)?;
        }
        ExprKind::Assign { target, values } => {
            writeln!(w, "assign {} ({span})", target.as_str())?;
            print_list(w, i + 1, values)?;
        }
        ExprKind::Return { values } => {
            writeln!(w, "return ({span})")?;
            print_list(w, i + 1, values)?;
        }
        ExprKind::If {
            test,
            then_body,
            else_body,
        } => {
            writeln!(w, "if ({span})")?;
            print_expr(w, i + 1, test)?;
            sp(w, i + 1)?;
            writeln!(w, "then")?;
            print_list(w, i + 2, then_body)?;
            if !else_body.is_empty() {
                sp(w, i + 1)?;
                writeln!(w, "else")?;
                print_list(w, i + 2, else_body)?;
            }
        }
        ExprKind::While { test, body } => {
            writeln!(w, "while ({span})")?;
            print_expr(w, i + 1, test)?;
            sp(w, i + 1)?;
            writeln!(w, "do")?;
            print_list(w, i + 2, body)?;
        }
        ExprKind::Access { base, index } => {
            writeln!(w, "access ({span})")?;
            print_expr(w, i + 1, base)?;
            print_expr(w, i + 1, index)?;
        }
        ExprKind::Cast { target, expr } => {
            writeln!(w, "cast {} ({span})", target.as_str())?;
            print_expr(w, i + 1, expr)?;
        }
        ExprKind::LambdaApply { captured, callee } => {
            writeln!(w, "apply ({span})")?;
            print_list(w, i + 1, captured)?;
            sp(w, i + 1)?;
            writeln!(w, "to")?;
            print_expr(w, i + 2, callee)?;
        }
    }
    Ok(())
}

fn print_list(w: &mut impl Write, i: usize, exprs: &[Expr]) -> std::io::Result<()> {
    for expr in exprs {
        print_expr(w, i, expr)?;
    }
    Ok(())
}

fn sp(w: &mut impl Write, i: usize) -> std::io::Result<()> {
    write!(w, "{:width$}", "", width = i * INDENT_WIDTH)
}
