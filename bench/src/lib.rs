//! Inputs shared by the benchmarks.

use std::fmt::Write;

/// Generates a program of `functions` units exercising calls, control flow,
/// partial application and indexing.
pub fn synthetic_program(functions: usize) -> String {
    let mut src = String::with_capacity(functions * 160);
    src.push_str("X: {RRR}\n*: \"ext\"\n");
    src.push_str("RRRR sum3(a, b, c) { return add(add(a, b), c) }\n");
    for i in 0..functions {
        _ = writeln!(
            src,
            "RRR f{i}(a, b) {{
    g = \\X a | sum3
    x = g(b, 1.0), b
    while R__gt(x[0], 100.0) {{ x = div(x[0], 2.0), b }}
    if lt(a, b) {{ return x[1] }} else {{ return x[0] }}
}}"
        );
    }
    src
}
