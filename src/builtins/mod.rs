// Toy Built-in Natives
// Host functions bound in the global scope of every Vm and Interpreter

use std::rc::Rc;

use crate::error::{ToyError, ToyResult};
use crate::vm::{new_cell, Cell, NativeCall, NativeFunction, Value};

pub type NativeEntry = fn(&mut NativeCall) -> ToyResult<usize>;

/// Every builtin native by name
pub const NATIVES: &[(&str, NativeEntry)] = &[
    ("push", push),
    ("pop", pop),
    ("typeof", type_of),
    ("costatus", costatus),
];

/// Global bindings for every native, used to seed a fresh global scope.
/// Names in NATIVES are unique, so no binding shadows another.
pub fn bindings() -> impl Iterator<Item = (Rc<str>, Cell)> {
    NATIVES.iter().map(|(name, func)| {
        let native = NativeFunction {
            name: Rc::from(*name),
            func: Box::new(*func),
        };
        (Rc::from(*name), new_cell(Value::Native(Rc::new(native))))
    })
}

/// push(array, values...) appends in order
fn push(call: &mut NativeCall) -> ToyResult<usize> {
    call.expect_args("push", 2)?;
    let items = call.array(0)?;
    let mut items = items.borrow_mut();
    for i in 1..call.argc() {
        items.push(new_cell(call.arg(i)));
    }
    Ok(0)
}

/// pop(array) removes and returns the last element, null when empty
fn pop(call: &mut NativeCall) -> ToyResult<usize> {
    call.expect_args("pop", 1)?;
    let items = call.array(0)?;
    let last = items.borrow_mut().pop();
    let value = last.map(|cell| cell.borrow().clone()).unwrap_or(Value::Null);
    call.push(value)?;
    Ok(1)
}

fn type_of(call: &mut NativeCall) -> ToyResult<usize> {
    call.expect_args("typeof", 1)?;
    let name = call.arg(0).type_name();
    call.push(Value::string(name))?;
    Ok(1)
}

/// costatus(co) is "suspended", "running" or "dead"
fn costatus(call: &mut NativeCall) -> ToyResult<usize> {
    call.expect_args("costatus", 1)?;
    let co = call.coroutine(0).map_err(|_| {
        ToyError::type_error(format!(
            "costatus() expects a coroutine, got '{}'",
            call.arg(0).type_name()
        ))
    })?;
    call.push(Value::string(co.status().as_str()))?;
    Ok(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_push_and_pop() {
        let array = Value::array(vec![Value::Number(1.0)]);
        let mut stack = vec![
            new_cell(array.clone()),
            new_cell(Value::Number(2.0)),
            new_cell(Value::Number(3.0)),
        ];
        let mut call = NativeCall::new(&mut stack, 0, 3, 64);
        assert_eq!(push(&mut call).unwrap(), 0);
        assert_eq!(array.to_string(), "[1, 2, 3]");

        let mut stack = vec![new_cell(array.clone())];
        let mut call = NativeCall::new(&mut stack, 0, 1, 64);
        assert_eq!(pop(&mut call).unwrap(), 1);
        assert_eq!(*stack[1].borrow(), Value::Number(3.0));
        assert_eq!(array.to_string(), "[1, 2]");
    }

    #[test]
    fn test_push_requires_array() {
        let mut stack = vec![new_cell(Value::Null), new_cell(Value::Null)];
        let mut call = NativeCall::new(&mut stack, 0, 2, 64);
        assert_eq!(push(&mut call).unwrap_err().kind, ErrorKind::CastError);
    }

    #[test]
    fn test_native_names_are_unique() {
        let mut names: Vec<&str> = NATIVES.iter().map(|(name, _)| *name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), NATIVES.len());
    }

    #[test]
    fn test_bindings_cover_every_native() {
        let bound: Vec<Rc<str>> = bindings().map(|(name, _)| name).collect();
        assert_eq!(bound.len(), NATIVES.len());
        for (name, _) in NATIVES {
            assert!(bound.iter().any(|b| &**b == *name), "{} not bound", name);
        }
    }

    #[test]
    fn test_typeof() {
        let mut stack = vec![new_cell(Value::string("x"))];
        let mut call = NativeCall::new(&mut stack, 0, 1, 64);
        type_of(&mut call).unwrap();
        assert_eq!(*stack[1].borrow(), Value::string("String"));
    }
}
