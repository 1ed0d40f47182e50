// Toy Virtual Machine Module

pub mod context;
pub mod coroutine;
pub mod debugger;
pub mod native;
pub mod output;
pub mod scope;
pub mod value;
#[allow(clippy::module_inception)]
pub mod vm;

pub use context::Context;
pub use coroutine::{CoStatus, Coroutine, CoroutineHandle};
pub use debugger::Debugger;
pub use native::NativeCall;
pub use output::SharedBuffer;
pub use scope::{ScopeArena, ScopeId};
pub use value::{
    index_cell, length_of, member_cell, new_cell, new_object, pack, Cell, Function, IterState,
    NativeFunction, Value,
};
pub use vm::Vm;
