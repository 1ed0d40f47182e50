// Toy Coroutines
// A coroutine owns a Context; switching is a pointer swap in the Vm

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::context::Context;
use super::scope::ScopeId;

/// Lifecycle of a coroutine as reported by `costatus`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoStatus {
    Suspended,
    Running,
    Dead,
}

impl CoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoStatus::Suspended => "suspended",
            CoStatus::Running => "running",
            CoStatus::Dead => "dead",
        }
    }
}

impl fmt::Display for CoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug)]
pub struct Coroutine {
    pub context: Context,
    pub params: Vec<Rc<str>>,
    /// Entry address. While `ip == label` the coroutine has not started.
    pub label: usize,
    pub terminated: bool,
    /// The context that resumed this one, set while it runs
    pub resumer: Option<Rc<CoroutineHandle>>,
}

impl Coroutine {
    pub fn new(label: usize, params: Vec<Rc<str>>, global: ScopeId) -> Self {
        Self {
            context: Context::new(label, global),
            params,
            label,
            terminated: false,
            resumer: None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.context.ip == self.label
    }
}

/// Shared, named handle to a coroutine. Main is the coroutine named "main".
#[derive(Debug)]
pub struct CoroutineHandle {
    pub name: Rc<str>,
    pub state: RefCell<Coroutine>,
}

impl CoroutineHandle {
    pub fn new(name: Rc<str>, coroutine: Coroutine) -> Rc<Self> {
        Rc::new(Self {
            name,
            state: RefCell::new(coroutine),
        })
    }

    /// A coroutine is running while it executes or while it waits on a
    /// coroutine it resumed.
    pub fn status(&self) -> CoStatus {
        match self.state.try_borrow() {
            Err(_) => CoStatus::Running,
            Ok(state) if state.terminated => CoStatus::Dead,
            Ok(state) if state.resumer.is_some() => CoStatus::Running,
            Ok(_) => CoStatus::Suspended,
        }
    }
}
