//! Compilation Pipeline
//!
//! Orchestrates the stages in order: parse (lexing is pulled on demand by
//! the parser), lower to IR, scalar replacement, liveness analysis, register
//! allocation, and x86-64 emission. Each stage runs to completion over the
//! whole program before the next begins; the only state shared across
//! functions is the label counter, so `.L<N>` labels never collide.

use crate::compiler::analysis::liveness;
use crate::compiler::ast::{LabelCounter, Program};
use crate::compiler::codegen::CodeGenerator;
use crate::compiler::error::CompileError;
use crate::compiler::ir::{lower, optimizer};
use crate::compiler::lexer::Lexer;
use crate::compiler::parser::Parser;
use crate::compiler::regalloc;

/// Compile one C translation unit to x86-64 assembly text.
///
/// `file` names the chunk in diagnostics; `source` is its full text. On
/// success the returned string is a complete GAS module in Intel syntax.
pub fn compile(file: &str, source: &str) -> Result<String, CompileError> {
    let mut labels = LabelCounter::new();

    log::info!("parsing {}", file);
    let lexer = Lexer::new(file, source);
    let mut program = Parser::new(lexer, &mut labels).parse_program()?;

    log::info!("lowering to IR");
    lower::lower(&mut program, &mut labels);

    log::info!("scalar replacement");
    optimizer::optimize(&mut program);

    log::info!("liveness analysis");
    liveness::analyze(&mut program);

    log::info!("register allocation");
    regalloc::allocate(&mut program);

    log::info!("emitting x86-64 assembly");
    Ok(CodeGenerator::new().generate(&mut program, &mut labels))
}

/// Front half of the pipeline: parse only. Used by tools and tests that
/// inspect the AST or drive the later stages one at a time.
pub fn parse(file: &str, source: &str) -> Result<Program, CompileError> {
    let mut labels = LabelCounter::new();
    let lexer = Lexer::new(file, source);
    Parser::new(lexer, &mut labels).parse_program()
}

/// Parse and lower, stopping before any optimization or allocation. The
/// returned program holds the freshly built CFG of every function.
pub fn lower_to_ir(file: &str, source: &str) -> Result<Program, CompileError> {
    let mut labels = LabelCounter::new();
    let lexer = Lexer::new(file, source);
    let mut program = Parser::new(lexer, &mut labels).parse_program()?;
    lower::lower(&mut program, &mut labels);
    Ok(program)
}
