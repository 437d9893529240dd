//! Shared helpers for the integration tests: staged pipeline drivers and
//! the end-to-end scenario programs.
#![allow(dead_code)]

use nanocc_core::compiler::analysis::liveness;
use nanocc_core::compiler::ast::Program;
use nanocc_core::compiler::ir::optimizer;
use nanocc_core::compiler::{pipeline, regalloc};

/// Parse and lower; the result holds the freshly built CFGs.
pub fn lowered(source: &str) -> Program {
    pipeline::lower_to_ir("test.c", source).expect("test program should lower")
}

/// Parse, lower, promote scalars and run liveness.
pub fn analyzed(source: &str) -> Program {
    let mut program = lowered(source);
    optimizer::optimize(&mut program);
    liveness::analyze(&mut program);
    program
}

/// The full middle end: everything up to and including register allocation.
pub fn allocated(source: &str) -> Program {
    let mut program = analyzed(source);
    regalloc::allocate(&mut program);
    program
}

/// Compile all the way to assembly text.
pub fn compiled(source: &str) -> String {
    nanocc_core::compile("test.c", source).expect("test program should compile")
}

/// End-to-end scenario programs with their expected exit status. Each one
/// regression-tests a specific pipeline feature.
pub fn scenarios() -> Vec<(&'static str, &'static str, i32)> {
    vec![
        // Constant folding and call-free emission.
        ("const_fold", "int main(){ return 2+3*4; }", 14),
        // Control flow, calls, caller-save discipline.
        (
            "fib",
            "int fib(int n){ if(n<2) return n; return fib(n-1)+fib(n-2); } \
             int main(){ return fib(10); }",
            55,
        ),
        // Array decay and scaled addressing.
        (
            "array_sum",
            "int main(){ int a[4]; a[0]=1; a[1]=2; a[2]=3; a[3]=4; int s=0; \
             for(int i=0;i<4;i++) s+=a[i]; return s; }",
            10,
        ),
        // Loop with break.
        (
            "loop_break",
            "int main(){ int x=0; for(int i=0;i<5;i++){ if(i==3) break; x+=i; } return x; }",
            3,
        ),
        // Address-taken local defeats scalar replacement.
        (
            "pointer",
            "int main(){ int x=7; int *p=&x; *p = *p + 1; return x; }",
            8,
        ),
        // Ternary lowers through block parameters.
        ("ternary", "int main(){ int x=1; return (x==1)?42:0; }", 42),
    ]
}
