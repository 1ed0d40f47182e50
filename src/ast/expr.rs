// Toy Expression AST Nodes

use crate::error::Span;
use crate::lexer::TokenKind;

/// Binary operators that compile to a single instruction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Comparison
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

const BINARY_TOKENS: &[(TokenKind, BinaryOp)] = &[
    (TokenKind::Plus, BinaryOp::Add),
    (TokenKind::Minus, BinaryOp::Sub),
    (TokenKind::Star, BinaryOp::Mul),
    (TokenKind::Slash, BinaryOp::Div),
    (TokenKind::Percent, BinaryOp::Mod),
    (TokenKind::EqualEqual, BinaryOp::Equal),
    (TokenKind::BangEqual, BinaryOp::NotEqual),
    (TokenKind::Less, BinaryOp::Less),
    (TokenKind::LessEqual, BinaryOp::LessEqual),
    (TokenKind::Greater, BinaryOp::Greater),
    (TokenKind::GreaterEqual, BinaryOp::GreaterEqual),
];

impl BinaryOp {
    pub fn from_token(kind: &TokenKind) -> Option<Self> {
        BINARY_TOKENS
            .iter()
            .find(|(token, _)| token == kind)
            .map(|(_, op)| *op)
    }

    /// Source spelling, used in error messages and dumps
    pub fn symbol(&self) -> &'static str {
        BINARY_TOKENS
            .iter()
            .find(|(_, op)| op == self)
            .and_then(|(token, _)| token.spelling())
            .unwrap_or("?")
    }
}

/// Short-circuit operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogicalOp {
    And,
    Or,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Negate, // -
    Not,    // !
}

impl UnaryOp {
    pub fn from_token(kind: &TokenKind) -> Option<Self> {
        match kind {
            TokenKind::Minus => Some(UnaryOp::Negate),
            TokenKind::Bang => Some(UnaryOp::Not),
            _ => None,
        }
    }
}

/// `=` or one of the compound forms `+=` `-=` `*=` `/=` `%=`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
}

impl AssignOp {
    pub fn from_token(kind: &TokenKind) -> Option<Self> {
        let op = match kind {
            TokenKind::Equal => AssignOp::Assign,
            TokenKind::PlusEqual => AssignOp::AddAssign,
            TokenKind::MinusEqual => AssignOp::SubAssign,
            TokenKind::StarEqual => AssignOp::MulAssign,
            TokenKind::SlashEqual => AssignOp::DivAssign,
            TokenKind::PercentEqual => AssignOp::ModAssign,
            _ => return None,
        };
        Some(op)
    }

    /// The arithmetic applied before storing, `None` for plain `=`
    pub fn binary(&self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::AddAssign => Some(BinaryOp::Add),
            AssignOp::SubAssign => Some(BinaryOp::Sub),
            AssignOp::MulAssign => Some(BinaryOp::Mul),
            AssignOp::DivAssign => Some(BinaryOp::Div),
            AssignOp::ModAssign => Some(BinaryOp::Mod),
        }
    }
}

impl UpdateOp {
    pub fn from_token(kind: &TokenKind) -> Option<Self> {
        match kind {
            TokenKind::PlusPlus => Some(UpdateOp::Increment),
            TokenKind::MinusMinus => Some(UpdateOp::Decrement),
            _ => None,
        }
    }
}

/// `++` / `--`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

/// Literal values
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    String(String),
    Boolean(bool),
    Null,
}

/// Expression nodes
#[derive(Debug, Clone)]
pub enum Expr {
    Literal {
        value: Literal,
        span: Span,
    },

    Variable {
        name: String,
        span: Span,
    },

    /// Unary operation: -x, !x
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        span: Span,
    },

    /// Binary operation: a + b
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
        span: Span,
    },

    /// Short-circuit operation: a && b, a || b
    Logical {
        left: Box<Expr>,
        op: LogicalOp,
        right: Box<Expr>,
        span: Span,
    },

    /// Ternary: cond ? a : b
    Ternary {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
        span: Span,
    },

    /// Assignment: target = value, target += value
    Assignment {
        target: Box<Expr>,
        op: AssignOp,
        value: Box<Expr>,
        span: Span,
    },

    /// Increment / decrement: ++x, x--
    Update {
        target: Box<Expr>,
        op: UpdateOp,
        prefix: bool,
        span: Span,
    },

    /// Function call: f(a, b)
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },

    /// Index access: arr[i]
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },

    /// Member access: obj.name
    Get {
        object: Box<Expr>,
        property: String,
        span: Span,
    },

    /// `[1, 2, 3]`
    Array {
        elements: Vec<Expr>,
        span: Span,
    },

    /// Object literal: {a = 1, b: "x"}
    Object {
        entries: Vec<(String, Expr)>,
        span: Span,
    },

    /// yield(args)
    Yield { args: Vec<Expr>, span: Span },

    /// resume(co, args)
    Resume {
        coroutine: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Literal { span, .. }
            | Expr::Variable { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Logical { span, .. }
            | Expr::Ternary { span, .. }
            | Expr::Assignment { span, .. }
            | Expr::Update { span, .. }
            | Expr::Call { span, .. }
            | Expr::Index { span, .. }
            | Expr::Get { span, .. }
            | Expr::Array { span, .. }
            | Expr::Object { span, .. }
            | Expr::Yield { span, .. }
            | Expr::Resume { span, .. } => *span,
        }
    }

    /// Whether the expression denotes a storage location
    pub fn is_assignable(&self) -> bool {
        matches!(
            self,
            Expr::Variable { .. } | Expr::Index { .. } | Expr::Get { .. }
        )
    }
}
