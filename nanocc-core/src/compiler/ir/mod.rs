//! Intermediate representation: the IR model, the AST→IR lowering stage and
//! the scalar-replacement pass that runs directly on it.

pub mod instruction;
pub mod lower;
pub mod optimizer;
