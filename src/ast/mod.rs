// Toy AST Module
// Defines all nodes for the Abstract Syntax Tree

mod expr;
mod stmt;

pub use expr::*;
pub use stmt::*;
