// Toy Native Call Interface
// View of the operand stack handed to host functions

use std::rc::Rc;

use super::value::{new_cell, ArrayRef, Cell, ObjectRef, Value};
use super::coroutine::CoroutineHandle;
use crate::error::{ToyError, ToyResult};

/// Arguments of a native call and a place to push results.
/// Arguments occupy `stack[base..base + argc]`, results go on top.
pub struct NativeCall<'a> {
    stack: &'a mut Vec<Cell>,
    base: usize,
    argc: usize,
    max_stack: usize,
}

impl<'a> NativeCall<'a> {
    pub fn new(stack: &'a mut Vec<Cell>, base: usize, argc: usize, max_stack: usize) -> Self {
        Self {
            stack,
            base,
            argc,
            max_stack,
        }
    }

    pub fn argc(&self) -> usize {
        self.argc
    }

    /// Argument `index`, null when it was not passed
    pub fn arg(&self, index: usize) -> Value {
        self.arg_cell(index)
            .map(|cell| cell.borrow().clone())
            .unwrap_or(Value::Null)
    }

    pub fn arg_cell(&self, index: usize) -> Option<&Cell> {
        if index < self.argc {
            self.stack.get(self.base + index)
        } else {
            None
        }
    }

    /// Fail unless at least `n` arguments were passed
    pub fn expect_args(&self, name: &str, n: usize) -> ToyResult<()> {
        if self.argc < n {
            return Err(ToyError::invalid_call(format!(
                "{}() expects {} argument(s), got {}",
                name, n, self.argc
            )));
        }
        Ok(())
    }

    pub fn number(&self, index: usize) -> ToyResult<f64> {
        self.arg(index).to_number()
    }

    pub fn string(&self, index: usize) -> ToyResult<Rc<str>> {
        self.arg(index).to_str()
    }

    pub fn boolean(&self, index: usize) -> ToyResult<bool> {
        self.arg(index).to_bool()
    }

    pub fn array(&self, index: usize) -> ToyResult<ArrayRef> {
        self.arg(index).to_array()
    }

    pub fn object(&self, index: usize) -> ToyResult<ObjectRef> {
        self.arg(index).to_object()
    }

    pub fn coroutine(&self, index: usize) -> ToyResult<Rc<CoroutineHandle>> {
        self.arg(index).to_coroutine()
    }

    /// Push one result
    pub fn push(&mut self, value: Value) -> ToyResult<()> {
        if self.stack.len() >= self.max_stack {
            return Err(ToyError::runtime_error("Stack overflow"));
        }
        self.stack.push(new_cell(value));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_arguments_and_results() {
        let mut stack = vec![
            new_cell(Value::string("callee")),
            new_cell(Value::Number(4.0)),
            new_cell(Value::string("x")),
        ];
        let mut call = NativeCall::new(&mut stack, 1, 2, 16);
        assert_eq!(call.number(0).unwrap(), 4.0);
        assert_eq!(&*call.string(1).unwrap(), "x");
        assert!(call.arg(2).is_null());
        assert_eq!(call.boolean(0).unwrap_err().kind, ErrorKind::CastError);
        call.push(Value::Boolean(true)).unwrap();
        assert_eq!(stack.len(), 4);
    }

    #[test]
    fn test_expect_args() {
        let mut stack = Vec::new();
        let call = NativeCall::new(&mut stack, 0, 0, 16);
        let err = call.expect_args("push", 2).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidCall);
    }
}
