// Toy Statement AST Nodes

use super::expr::Expr;
use crate::error::Span;
use std::rc::Rc;

/// Whether a declaration produces a plain function or a coroutine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Function,
    Coroutine,
}

/// Function or coroutine declaration
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub kind: FunctionKind,
    pub span: Span,
}

/// One `name = initializer` entry of a `var` statement
#[derive(Debug, Clone)]
pub struct VarBinding {
    pub name: String,
    pub initializer: Option<Expr>,
    pub span: Span,
}

/// Statement nodes
#[derive(Debug, Clone)]
pub enum Stmt {
    /// Variable declaration: var x = 5, y;
    Var { bindings: Vec<VarBinding>, span: Span },

    /// Expression statement: foo();
    Expression { expr: Expr, span: Span },

    /// Block: { statements }
    Block { statements: Vec<Stmt>, span: Span },

    /// If statement; `elif` chains nest in `else_branch`
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        span: Span,
    },

    /// While loop: while (cond) body
    While {
        condition: Expr,
        body: Box<Stmt>,
        span: Span,
    },

    /// C-style loop: for (init; cond; step) body
    For {
        initializer: Option<Box<Stmt>>,
        condition: Option<Expr>,
        increment: Option<Expr>,
        body: Box<Stmt>,
        span: Span,
    },

    /// Iteration: for (k, v in iterable) body
    ForIn {
        key: String,
        value: String,
        iterable: Expr,
        body: Box<Stmt>,
        span: Span,
    },

    /// Function or coroutine declaration
    Function { def: Rc<FunctionDef> },

    /// Return statement: return value;
    Return { value: Option<Expr>, span: Span },

    /// Break statement: break;
    Break { span: Span },

    /// Continue statement: continue;
    Continue { span: Span },

    /// Empty statement: ;
    Empty { span: Span },
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Function { def } => def.span,
            Stmt::Var { span, .. }
            | Stmt::Expression { span, .. }
            | Stmt::Block { span, .. }
            | Stmt::If { span, .. }
            | Stmt::While { span, .. }
            | Stmt::For { span, .. }
            | Stmt::ForIn { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::Break { span }
            | Stmt::Continue { span }
            | Stmt::Empty { span } => *span,
        }
    }
}

/// A parsed source file or REPL entry
#[derive(Debug, Clone)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

impl Program {
    pub fn new(statements: Vec<Stmt>) -> Self {
        Program { statements }
    }
}
