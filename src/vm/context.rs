// Toy Execution Context
// Code pointer, operand stack and scope of one coroutine

use super::scope::ScopeId;
use super::value::{new_cell, Cell, Value};
use crate::error::{ToyError, ToyResult};

/// Per-coroutine execution state. The code itself is shared through the Vm.
#[derive(Debug)]
pub struct Context {
    pub ip: usize,
    /// Frame floor, `Clear` truncates the stack to it
    pub bp: usize,
    pub stack: Vec<Cell>,
    pub scope: ScopeId,
    pub global: ScopeId,
    /// Active script calls
    pub depth: usize,
}

impl Context {
    pub fn new(ip: usize, global: ScopeId) -> Self {
        Self {
            ip,
            bp: 0,
            stack: Vec::new(),
            scope: global,
            global,
            depth: 0,
        }
    }

    pub fn push(&mut self, cell: Cell, max_stack: usize) -> ToyResult<()> {
        if self.stack.len() >= max_stack {
            return Err(ToyError::runtime_error("Stack overflow"));
        }
        self.stack.push(cell);
        Ok(())
    }

    /// Push a computed value in a fresh cell
    pub fn push_value(&mut self, value: Value, max_stack: usize) -> ToyResult<()> {
        self.push(new_cell(value), max_stack)
    }

    pub fn pop(&mut self) -> ToyResult<Cell> {
        self.stack
            .pop()
            .ok_or_else(|| ToyError::protocol("Stack underflow"))
    }

    pub fn pop_value(&mut self) -> ToyResult<Value> {
        let cell = self.pop()?;
        let value = cell.borrow().clone();
        Ok(value)
    }

    /// Slot `distance` below the top, 0 being the top
    pub fn peek(&self, distance: usize) -> ToyResult<&Cell> {
        let idx = self
            .stack
            .len()
            .checked_sub(1 + distance)
            .ok_or_else(|| ToyError::protocol("Stack underflow"))?;
        Ok(&self.stack[idx])
    }

    /// Value stored at an absolute stack index
    pub fn slot(&self, index: usize) -> ToyResult<Value> {
        self.stack
            .get(index)
            .map(|cell| cell.borrow().clone())
            .ok_or_else(|| ToyError::protocol(format!("Frame slot {} is missing", index)))
    }

    /// Pop `n` cells, returned in push order
    pub fn pop_n(&mut self, n: usize) -> ToyResult<Vec<Cell>> {
        let at = self
            .stack
            .len()
            .checked_sub(n)
            .ok_or_else(|| ToyError::protocol("Stack underflow"))?;
        Ok(self.stack.split_off(at))
    }

    /// Pop an argument count pushed by the compiler as a number
    pub fn pop_count(&mut self) -> ToyResult<usize> {
        match self.pop_value()? {
            Value::Number(n) if n >= 0.0 && n.fract() == 0.0 => Ok(n as usize),
            other => Err(ToyError::protocol(format!(
                "Expected an argument count, found {}",
                other.type_name()
            ))),
        }
    }

    /// Height above the frame floor
    pub fn height(&self) -> usize {
        self.stack.len().saturating_sub(self.bp)
    }
}
