//! Error Handling
//!
//! This module provides the error types for the compiler using `thiserror`.
//! Errors are partitioned into two classes:
//!
//! - **User errors**: lexical, syntax and semantic problems in the input
//!   program. They carry a source location and a caret-annotated excerpt and
//!   are reported to the user with exit status 1.
//! - **Internal invariants**: malformed IR, unknown opcodes during emission,
//!   empty basic blocks. Reaching one is a compiler bug, never
//!   input-conditioned, and panics.

use thiserror::Error;

/// Compiler error types.
///
/// Uses `thiserror` for error handling with detailed messages. The two
/// variants correspond to the two front-end stages that can reject a
/// program; everything downstream of parsing is total over well-formed
/// input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Lexical error (bad character, unterminated literal or comment,
    /// malformed macro directive).
    #[error("Lexical Error:\n{0}")]
    Lexical(Diagnostic),

    /// Syntax or semantic error raised by the parser (unexpected token,
    /// undefined variable, type mismatch, …).
    #[error("Syntax Error:\n{0}")]
    Syntax(Diagnostic),
}

/// A source-anchored diagnostic.
///
/// Rendering follows the classic caret format:
///
/// ```text
/// File: fib.c, Line: 3.
///
/// int x = ;
///         ^
/// primary expression expected.
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Name of the source file (chunk name).
    pub file: String,
    /// 1-based source line of the offending position.
    pub line: u32,
    /// 0-based column of the offending position within `source_line`.
    pub column: usize,
    /// The full text of the offending source line, without the newline.
    pub source_line: String,
    /// Human-readable message.
    pub message: String,
}

impl Diagnostic {
    /// Build a diagnostic from a byte offset into the source text.
    ///
    /// The line and column are recovered by scanning for the enclosing
    /// newline pair, so callers only need to remember where a token or
    /// character started.
    pub fn at_offset(file: &str, source: &str, offset: usize, message: String) -> Self {
        let bytes = source.as_bytes();
        let offset = offset.min(bytes.len());

        let mut start = offset;
        while start > 0 && bytes[start - 1] != b'\n' {
            start -= 1;
        }
        let mut end = offset;
        while end < bytes.len() && bytes[end] != b'\n' {
            end += 1;
        }

        let line = 1 + bytes[..offset].iter().filter(|&&b| b == b'\n').count() as u32;
        let source_line = String::from_utf8_lossy(&bytes[start..end]).into_owned();

        Diagnostic {
            file: file.to_string(),
            line,
            column: offset - start,
            source_line,
            message,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "File: {}, Line: {}.", self.file, self.line)?;
        writeln!(f)?;
        writeln!(f, "{}", self.source_line)?;
        writeln!(f, "{}^", " ".repeat(self.column))?;
        write!(f, "{}", self.message)
    }
}
