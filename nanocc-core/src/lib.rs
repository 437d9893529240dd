//! nanocc-core — a small C compiler targeting x86-64
//!
//! The library compiles one translation unit of a C subset (C89-flavored:
//! `void`/`char`/`int`, pointers, arrays, the full integer operator set,
//! control flow including `switch`, and up to six call arguments) into GNU
//! assembler text in Intel syntax.
//!
//! # Pipeline
//! 1. **Lexing** — byte-level scanner with a `#include`/`#define` shim
//! 2. **Parsing** — recursive descent producing a checked, constant-folded
//!    typed AST with array decay and `++`/`op=` desugaring done
//! 3. **Lowering** — AST to a CFG of three-address IR over virtual
//!    registers, with block-parameter merges instead of phi nodes
//! 4. **Scalar replacement** — address-not-taken `int` locals become pure
//!    registers
//! 5. **Liveness** — CFG edges, per-block defs, back-propagated live sets
//! 6. **Allocation** — two-address rewrite, then linear scan over seven
//!    physical registers with furthest-last-use spilling
//! 7. **Emission** — Intel-syntax x86-64 text, `.data`/`.bss` for globals
//!
//! The high-level entry point is [`compile`]:
//!
//! ```
//! let asm = nanocc_core::compile("three.c", "int main() { return 3; }")
//!     .expect("compilation failed");
//! assert!(asm.starts_with(".intel_syntax noprefix"));
//! ```

pub mod compiler;

pub use compiler::error::CompileError;
pub use compiler::pipeline::compile;
