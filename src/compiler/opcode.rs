// Toy Bytecode Instructions

use std::fmt;
use std::rc::Rc;

use crate::vm::Value;

/// Slots of a for-in frame: iterable, key cell, value cell, iterator, saved BP
pub const ITER_FRAME_SLOTS: usize = 5;

/// Fixed slots of a call frame: callee, argc, return address, saved scope,
/// saved BP. The arguments sit between the callee and argc.
pub const CALL_FRAME_SLOTS: usize = 5;

/// Return address used by host-initiated calls
pub const HOST_RETURN: usize = usize::MAX;

/// Bytecode instructions. Operands travel inside the variant.
#[derive(Debug, Clone)]
pub enum OpCode {
    // Stack
    Push(Value), // Push an immediate value
    Pop,         // Drop the top slot
    SLoad(usize), // Duplicate the slot n below the top (1 = top)
    Snapshot,     // [cell] -> [fresh copy of its value, cell]

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Rem,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Logic
    And,
    Or,
    Not,

    // Variables
    Load(Rc<str>),  // Push the variable's own cell
    Store(Rc<str>), // Bind a copy of the top value in the current scope
    Assign,         // [target, source] -> target := source, push target

    // Access and construction
    Index,           // [obj, key] -> element cell
    Dot(Rc<str>),    // [obj] -> member cell
    NewArray(usize), // n values -> array
    NewObj(usize),   // n key/value pairs -> object

    // Iteration
    Enum { key: Rc<str>, value: Rc<str> }, // [iterable, kcell, vcell] -> iteration frame
    Next(usize),                           // Advance or unwind and jump
    EndEnum,                               // Unwind without jumping

    // Scopes
    EnterScope,
    LeaveScope,

    // Control flow
    Jump(usize),  // Absolute jump
    NJump(usize), // Pop, jump if falsy
    Call,         // [callee, args.., argc, ret]
    Ret,
    Halt,

    // Builtins
    Print,
    Len,
    Clear, // Truncate the stack to BP

    // Coroutines
    CoYield,  // [args.., argc]
    CoResume, // [co, args.., argc]
    NewCo,    // [prototype] -> coroutine

    Nop,
}

impl OpCode {
    /// Jump target carried by the instruction, if any
    pub fn target(&self) -> Option<usize> {
        match self {
            OpCode::Jump(t) | OpCode::NJump(t) | OpCode::Next(t) => Some(*t),
            _ => None,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpCode::Push(Value::String(s)) => write!(f, "{:<14} {:?}", "push", s),
            OpCode::Push(v) => write!(f, "{:<14} {}", "push", v),
            OpCode::Pop => write!(f, "pop"),
            OpCode::SLoad(n) => write!(f, "{:<14} {}", "sload", n),
            OpCode::Snapshot => write!(f, "snapshot"),
            OpCode::Add => write!(f, "add"),
            OpCode::Sub => write!(f, "sub"),
            OpCode::Mul => write!(f, "mul"),
            OpCode::Div => write!(f, "div"),
            OpCode::Rem => write!(f, "rem"),
            OpCode::Eq => write!(f, "eq"),
            OpCode::Ne => write!(f, "ne"),
            OpCode::Lt => write!(f, "lt"),
            OpCode::Le => write!(f, "le"),
            OpCode::Gt => write!(f, "gt"),
            OpCode::Ge => write!(f, "ge"),
            OpCode::And => write!(f, "and"),
            OpCode::Or => write!(f, "or"),
            OpCode::Not => write!(f, "not"),
            OpCode::Load(name) => write!(f, "{:<14} {}", "load", name),
            OpCode::Store(name) => write!(f, "{:<14} {}", "store", name),
            OpCode::Assign => write!(f, "assign"),
            OpCode::Index => write!(f, "index"),
            OpCode::Dot(name) => write!(f, "{:<14} {}", "dot", name),
            OpCode::NewArray(n) => write!(f, "{:<14} {}", "new_array", n),
            OpCode::NewObj(n) => write!(f, "{:<14} {}", "new_obj", n),
            OpCode::Enum { key, value } => write!(f, "{:<14} {}, {}", "enum", key, value),
            OpCode::Next(t) => write!(f, "{:<14} -> {:04}", "next", t),
            OpCode::EndEnum => write!(f, "end_enum"),
            OpCode::EnterScope => write!(f, "enter_scope"),
            OpCode::LeaveScope => write!(f, "leave_scope"),
            OpCode::Jump(t) => write!(f, "{:<14} -> {:04}", "jump", t),
            OpCode::NJump(t) => write!(f, "{:<14} -> {:04}", "njump", t),
            OpCode::Call => write!(f, "call"),
            OpCode::Ret => write!(f, "ret"),
            OpCode::Halt => write!(f, "halt"),
            OpCode::Print => write!(f, "print"),
            OpCode::Len => write!(f, "len"),
            OpCode::Clear => write!(f, "clear"),
            OpCode::CoYield => write!(f, "co_yield"),
            OpCode::CoResume => write!(f, "co_resume"),
            OpCode::NewCo => write!(f, "new_co"),
            OpCode::Nop => write!(f, "nop"),
        }
    }
}
