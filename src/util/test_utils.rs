use crate::{
    builtins::{Builtins, Libraries},
    lexer, parser,
    token::Spanned,
    type_checker,
    types::TypeRegistry,
    util::fmt::tree,
};

/// Path given to every lexed test input.
pub const TEST_PATH: &str = "test.ss";

pub fn format_errors<E: std::fmt::Display>(errors: &[Spanned<E>]) -> Vec<String> {
    errors.iter().map(|e| format!("{e:#}")).collect()
}

/// Each variant contains the input.
pub enum Test {
    ParserProgram(&'static str),
    ParserExpr(&'static str),
    CheckerProgram(&'static str),
}

pub enum Assertion {
    TreeOk(&'static str),
    ExpectedErrors(&'static [&'static str]),
}

#[track_caller]
pub fn run_pipeline(test: Test) -> (String, Vec<String>) {
    let registry = &mut TypeRegistry::with_builtins();
    let libraries = Libraries::default();

    match test {
        Test::ParserProgram(input) => {
            let tokens = lexer::lex_in_new(TEST_PATH, input);
            let builtins = &mut Builtins::prelude(registry);
            match parser::parse_program(&tokens, registry, builtins, &libraries) {
                Ok(prog) => (tree::print_program_string(&prog), vec![]),
                Err(error) => (String::new(), format_errors(&[error])),
            }
        }
        Test::ParserExpr(input) => {
            let tokens = lexer::lex_in_new(TEST_PATH, input);
            match parser::parse_expr(&tokens, registry) {
                Ok(expr) => (tree::print_expr_string(&expr), vec![]),
                Err(error) => (String::new(), format_errors(&[error])),
            }
        }
        Test::CheckerProgram(input) => {
            let tokens = lexer::lex_in_new(TEST_PATH, input);
            let builtins = &mut Builtins::prelude(registry);
            let prog = match parser::parse_program(&tokens, registry, builtins, &libraries) {
                Ok(prog) => prog,
                Err(error) => return (String::new(), format_errors(&[error])),
            };
            let tree = tree::print_program_string(&prog);
            match type_checker::check_program(&prog, registry, builtins) {
                Ok(()) => (tree, vec![]),
                Err(error) => (tree, format_errors(&[error])),
            }
        }
    }
}

#[track_caller]
pub fn run_assertion(
    assertion: Assertion,
    formatted_actual_tree: &str,
    formatted_actual_errors: &[String],
) {
    match assertion {
        Assertion::TreeOk(expected_tree) => {
            let expected_errors: &[&str] = &[];
            ::pretty_assertions::assert_eq!(formatted_actual_errors, expected_errors);
            ::pretty_assertions::assert_eq!(formatted_actual_tree.trim(), expected_tree.trim());
        }
        Assertion::ExpectedErrors(expected_errors) => {
            ::pretty_assertions::assert_eq!(formatted_actual_errors, expected_errors)
        }
    }
}

macro_rules! tree_tests {
    (
        use $test_kind:ident;

        $(
            fn $test_name:ident() {
                let $source_kind:ident = $source:expr;
                $($assertions_tt:tt)*
            }
        )*
    ) => {
        $(
            #[test]
            fn $test_name() {
                let test: crate::util::test_utils::Test =
                    tree_tests!(@@get_test($test_kind, $source_kind), $source);
                let (formatted_actual_tree, formatted_actual_errors) =
                    crate::util::test_utils::run_pipeline(test);
                let ctx = (&formatted_actual_tree, &formatted_actual_errors);
                tree_tests!(@@expand_assertions, ctx, [$($assertions_tt)*]);
            }
        )*
    };

    (@@expand_assertions, $ctx:expr, []) => {};
    (@@expand_assertions, $ctx:expr, [
        let $assertion:ident = $assertion_expected:expr;
        $($rest_assertions_tt:tt)*
    ]) => {
        crate::util::test_utils::run_assertion(
            tree_tests!(@@assertion, $assertion, $assertion_expected),
            $ctx.0,
            $ctx.1,
        );
        tree_tests!(@@expand_assertions, $ctx, [$($rest_assertions_tt)*]);
    };

    (@@assertion, tree_ok, $expected:expr) => {
        crate::util::test_utils::Assertion::TreeOk(::indoc::indoc! { $expected })
    };
    (@@assertion, expected_errors, $expected:expr) => {
        crate::util::test_utils::Assertion::ExpectedErrors($expected)
    };

    (@@get_test(parser, program), $source:expr) => {
        crate::util::test_utils::Test::ParserProgram($source)
    };
    (@@get_test(parser, expr), $source:expr) => {
        crate::util::test_utils::Test::ParserExpr($source)
    };
    (@@get_test(checker, program), $source:expr) => {
        crate::util::test_utils::Test::CheckerProgram($source)
    };
}
pub(crate) use tree_tests;
