use indoc::indoc;
use pretty_assertions::assert_eq;

use crate::{
    codegen::{listing, Instr},
    driver::{Compiler, Options},
    runtime::Callable,
};

fn compile(src: &str) -> crate::codegen::Module {
    let options = Options {
        prelude: false,
        ..Options::default()
    };
    Compiler::new(options)
        .compile_str("test.ss", src)
        .expect("failed to compile")
}

#[test]
fn test_listing_layout() {
    let module = compile(indoc! {r#"
        *: "ext"
        RRR add2(a, b) { return R__add(a, b) }
    "#});
    let listing = listing(&module);
    assert!(listing.starts_with(indoc! {"
        ; sigmastar module
        helper flatten
        helper assert_callable
        helper print_and_return

        import \"ext\" as *
        native R__add(x, y) RRR
    "}));
    assert!(listing.contains(indoc! {"
        unit add2(a, b) RRR
            0000 load a
            0001 load b
            0002 call native.R__add 2
            0003 ret 1
    "}));
}

#[test]
fn test_control_flow_jumps() {
    let module = compile(indoc! {r#"
        *: "ext"
        RR f(a) {
            while R__gt(a, 1.0) { a = R__sub(a, 1.0) }
            if R__lt(a, 0.0) { return 0.0 } else { return a }
        }
    "#});
    let unit = module.unit("f").unwrap();
    let code: Vec<String> = unit.code.iter().map(ToString::to_string).collect();
    assert_eq!(
        code,
        [
            "load a",
            "const 1.0",
            "call native.R__gt 2",
            "jump.unless 10",
            "load a",
            "const 1.0",
            "call native.R__sub 2",
            "pack 1",
            "store a",
            "jump 0",
            "load a",
            "const 0.0",
            "call native.R__lt 2",
            "jump.unless 17",
            "const 0.0",
            "ret 1",
            "jump 19",
            "load a",
            "ret 1",
        ]
    );
}

#[test]
fn test_locals_resolve_in_textual_order() {
    let module = compile(indoc! {"
        X: {RR}
        RR g(a) { return a }
        RXR f(a, h) {
            k = h
            x = k(a)
            return g(x)
        }
    "});
    let unit = module.unit("f").unwrap();
    assert!(unit.code.contains(&Instr::CallLocal {
        name: "k".into(),
        argc: 1
    }));
    assert!(unit.code.contains(&Instr::Call {
        callee: Callable::Unit("g".into()),
        argc: 1
    }));
}

#[test]
fn test_partial_application_lowering() {
    let module = compile(indoc! {"
        X: {RR}
        RRR first(a, b) { return a }
        RR f(a) {
            g = \\X a | first
            return g(a)
        }
    "});
    let code: Vec<String> = module
        .unit("f")
        .unwrap()
        .code
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        code,
        [
            "load a",
            "global first",
            "apply 1",
            "pack 1",
            "store g",
            "load a",
            "call.local g 1",
            "ret 1",
        ]
    );
}
