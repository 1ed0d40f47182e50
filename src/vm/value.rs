// Toy Runtime Values
// Tagged union of every runtime value plus the operator semantics

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::coroutine::CoroutineHandle;
use super::native::NativeCall;
use super::scope::ScopeId;
use crate::ast::FunctionKind;
use crate::error::{ErrorKind, ToyError, ToyResult};

/// A storage location. Variables, array elements, object members and
/// operand stack slots are all cells.
pub type Cell = Rc<RefCell<Value>>;

pub type ArrayRef = Rc<RefCell<Vec<Cell>>>;
pub type ObjectRef = Rc<RefCell<IndexMap<Rc<str>, Cell>>>;

/// Wrap a value in a fresh cell
pub fn new_cell(value: Value) -> Cell {
    Rc::new(RefCell::new(value))
}

/// Runtime value types
#[derive(Clone)]
pub enum Value {
    Null,
    Number(f64),
    String(Rc<str>),
    Boolean(bool),
    Array(ArrayRef),
    Object(ObjectRef),
    Function(Rc<Function>),
    Native(Rc<NativeFunction>),
    Coroutine(Rc<CoroutineHandle>),
    /// Cursor of a running for-in loop
    Iterator(Rc<RefCell<IterState>>),
    /// Saved scope of a call frame
    Scope(ScopeId),
    /// Code address (return address, saved BP)
    Label(usize),
}

/// Script function or coroutine prototype
#[derive(Debug)]
pub struct Function {
    pub name: Rc<str>,
    pub params: Vec<Rc<str>>,
    /// Address of the first body instruction
    pub label: usize,
    pub kind: FunctionKind,
}

pub type NativeFn = dyn Fn(&mut NativeCall) -> ToyResult<usize>;

/// Host function callable from scripts
pub struct NativeFunction {
    pub name: Rc<str>,
    pub func: Box<NativeFn>,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native {}>", self.name)
    }
}

/// Position of a for-in loop over its iterable
#[derive(Debug)]
pub enum IterState {
    Array { items: ArrayRef, index: usize },
    Object { members: ObjectRef, index: usize },
}

impl IterState {
    pub fn over(iterable: &Value) -> ToyResult<Self> {
        match iterable {
            Value::Array(items) => Ok(IterState::Array {
                items: items.clone(),
                index: 0,
            }),
            Value::Object(members) => Ok(IterState::Object {
                members: members.clone(),
                index: 0,
            }),
            other => Err(ToyError::type_error(format!(
                "Cannot iterate over '{}'",
                other.type_name()
            ))),
        }
    }

    /// Advance to the next (key, value) pair. The collection is re-read on
    /// every step so pushes made by the loop body are visited.
    pub fn next_pair(&mut self) -> Option<(Value, Value)> {
        match self {
            IterState::Array { items, index } => {
                let items = items.borrow();
                let cell = items.get(*index)?;
                let pair = (Value::Number(*index as f64), cell.borrow().clone());
                *index += 1;
                Some(pair)
            }
            IterState::Object { members, index } => {
                let members = members.borrow();
                let (key, cell) = members.get_index(*index)?;
                let pair = (Value::String(key.clone()), cell.borrow().clone());
                *index += 1;
                Some(pair)
            }
        }
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Number(_) => "Number",
            Value::String(_) => "String",
            Value::Boolean(_) => "Boolean",
            Value::Array(_) => "Array",
            Value::Object(_) => "Object",
            Value::Function(_) => "Function",
            Value::Native(_) => "Native",
            Value::Coroutine(_) => "Coroutine",
            Value::Iterator(_) => "Iterator",
            Value::Scope(_) => "Scope",
            Value::Label(_) => "Label",
        }
    }

    pub fn string(s: &str) -> Self {
        Value::String(Rc::from(s))
    }

    pub fn array(values: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(
            values.into_iter().map(new_cell).collect(),
        )))
    }

    /// Only `true` and non-zero numbers are truthy
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0,
            _ => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Equality for `==` and `!=`. Different tags are unequal.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Number(a), Value::Number(b)) => a == b || (a - b).abs() < f64::EPSILON,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Coroutine(a), Value::Coroutine(b)) => Rc::ptr_eq(a, b),
            (Value::Iterator(a), Value::Iterator(b)) => Rc::ptr_eq(a, b),
            (Value::Scope(a), Value::Scope(b)) => a == b,
            (Value::Label(a), Value::Label(b)) => a == b,
            _ => false,
        }
    }

    // ==================== Arithmetic ====================

    pub fn add(&self, other: &Value) -> ToyResult<Value> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::String(a), Value::String(b)) => {
                let mut s = String::with_capacity(a.len() + b.len());
                s.push_str(a);
                s.push_str(b);
                Ok(Value::String(Rc::from(s)))
            }
            _ => Err(self.mismatch("add", other)),
        }
    }

    pub fn sub(&self, other: &Value) -> ToyResult<Value> {
        self.numeric(other, "subtract", |a, b| a - b)
    }

    pub fn mul(&self, other: &Value) -> ToyResult<Value> {
        self.numeric(other, "multiply", |a, b| a * b)
    }

    /// IEEE division, `x / 0` is an infinity or NaN
    pub fn div(&self, other: &Value) -> ToyResult<Value> {
        self.numeric(other, "divide", |a, b| a / b)
    }

    pub fn rem(&self, other: &Value) -> ToyResult<Value> {
        self.numeric(other, "take the remainder of", |a, b| a % b)
    }

    pub fn lt(&self, other: &Value) -> ToyResult<Value> {
        self.ordering(other, |a, b| a < b)
    }

    pub fn le(&self, other: &Value) -> ToyResult<Value> {
        self.ordering(other, |a, b| a <= b)
    }

    pub fn gt(&self, other: &Value) -> ToyResult<Value> {
        self.ordering(other, |a, b| a > b)
    }

    pub fn ge(&self, other: &Value) -> ToyResult<Value> {
        self.ordering(other, |a, b| a >= b)
    }

    fn numeric(&self, other: &Value, verb: &str, op: fn(f64, f64) -> f64) -> ToyResult<Value> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(op(*a, *b))),
            _ => Err(self.mismatch(verb, other)),
        }
    }

    fn ordering(&self, other: &Value, op: fn(f64, f64) -> bool) -> ToyResult<Value> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Boolean(op(*a, *b))),
            _ => Err(self.mismatch("compare", other)),
        }
    }

    fn mismatch(&self, verb: &str, other: &Value) -> ToyError {
        ToyError::type_error(format!(
            "Cannot {} '{}' and '{}'",
            verb,
            self.type_name(),
            other.type_name()
        ))
    }

    // ==================== Casts ====================

    pub fn to_number(&self) -> ToyResult<f64> {
        match self {
            Value::Number(n) => Ok(*n),
            other => Err(ToyError::cast_error("Number", other.type_name())),
        }
    }

    pub fn to_str(&self) -> ToyResult<Rc<str>> {
        match self {
            Value::String(s) => Ok(s.clone()),
            other => Err(ToyError::cast_error("String", other.type_name())),
        }
    }

    pub fn to_bool(&self) -> ToyResult<bool> {
        match self {
            Value::Boolean(b) => Ok(*b),
            other => Err(ToyError::cast_error("Boolean", other.type_name())),
        }
    }

    pub fn to_array(&self) -> ToyResult<ArrayRef> {
        match self {
            Value::Array(items) => Ok(items.clone()),
            other => Err(ToyError::cast_error("Array", other.type_name())),
        }
    }

    pub fn to_object(&self) -> ToyResult<ObjectRef> {
        match self {
            Value::Object(members) => Ok(members.clone()),
            other => Err(ToyError::cast_error("Object", other.type_name())),
        }
    }

    pub fn to_coroutine(&self) -> ToyResult<Rc<CoroutineHandle>> {
        match self {
            Value::Coroutine(co) => Ok(co.clone()),
            other => Err(ToyError::cast_error("Coroutine", other.type_name())),
        }
    }
}

/// Normalize a list of results to one value: none is null, one is itself,
/// several become an array.
pub fn pack(mut values: Vec<Value>) -> Value {
    match values.len() {
        0 => Value::Null,
        1 => values.pop().unwrap_or(Value::Null),
        _ => Value::array(values),
    }
}

// ==================== Access and construction ====================

pub fn length_of(value: &Value) -> ToyResult<usize> {
    match value {
        Value::Array(items) => Ok(items.borrow().len()),
        Value::Object(members) => Ok(members.borrow().len()),
        Value::String(s) => Ok(s.chars().count()),
        other => Err(ToyError::type_error(format!(
            "Cannot take the length of '{}'",
            other.type_name()
        ))),
    }
}

/// Storage cell for `object[key]`. Array reads out of range give a
/// detached null cell.
pub fn index_cell(object: &Value, key: &Value) -> ToyResult<Cell> {
    match (object, key) {
        (Value::Array(items), Value::Number(n)) => {
            let items = items.borrow();
            let in_range = *n >= 0.0 && n.fract() == 0.0 && (*n as usize) < items.len();
            Ok(if in_range {
                items[*n as usize].clone()
            } else {
                new_cell(Value::Null)
            })
        }
        (Value::Object(_), Value::String(name)) => member_cell(object, name),
        (Value::String(s), Value::Number(n)) => {
            let c = if *n >= 0.0 && n.fract() == 0.0 {
                s.chars().nth(*n as usize)
            } else {
                None
            };
            Ok(new_cell(match c {
                Some(c) => Value::String(Rc::from(c.to_string())),
                None => Value::Null,
            }))
        }
        (object, key) => Err(ToyError::type_error(format!(
            "Cannot index '{}' with '{}'",
            object.type_name(),
            key.type_name()
        ))),
    }
}

pub fn member_cell(object: &Value, name: &str) -> ToyResult<Cell> {
    match object {
        Value::Object(members) => members.borrow().get(name).cloned().ok_or_else(|| {
            ToyError::unlocated(
                ErrorKind::UndefinedVariable,
                format!("Undefined member '{}'", name),
            )
        }),
        other => Err(ToyError::type_error(format!(
            "Cannot read member '{}' of '{}'",
            name,
            other.type_name()
        ))),
    }
}

/// Build an object from key/value pairs in source order
pub fn new_object(pairs: impl IntoIterator<Item = (Value, Value)>) -> ToyResult<Value> {
    let mut members: IndexMap<Rc<str>, Cell> = IndexMap::new();
    for (key, value) in pairs {
        let key = key.to_str().map_err(|_| {
            ToyError::type_error(format!(
                "Object keys must be strings, found '{}'",
                key.type_name()
            ))
        })?;
        if members.contains_key(&key) {
            return Err(ToyError::duplicate(&key));
        }
        members.insert(key, new_cell(value));
    }
    Ok(Value::Object(Rc::new(RefCell::new(members))))
}

fn format_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Number(n) => format_number(f, *n),
            Value::String(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, cell) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", cell.borrow())?;
                }
                write!(f, "]")
            }
            Value::Object(members) => {
                write!(f, "{{")?;
                for (i, (key, cell)) in members.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", key, cell.borrow())?;
                }
                write!(f, "}}")
            }
            Value::Function(func) => match func.kind {
                FunctionKind::Function => write!(f, "<function {}>", func.name),
                FunctionKind::Coroutine => write!(f, "<coroutine prototype {}>", func.name),
            },
            Value::Native(native) => write!(f, "<native {}>", native.name),
            Value::Coroutine(co) => write!(f, "<coroutine {}>", co.name),
            Value::Iterator(_) => write!(f, "<iterator>"),
            Value::Scope(id) => write!(f, "<scope {}>", id.index()),
            Value::Label(at) => write!(f, "<label {}>", at),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            _ => write!(f, "{}", self),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(Value::Boolean(true).is_truthy());
        assert!(Value::Number(-2.0).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::string("yes").is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(!Value::array(vec![Value::Number(1.0)]).is_truthy());
    }

    #[test]
    fn test_mismatched_tags() {
        let err = Value::Number(1.0).add(&Value::string("a")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeError);
        assert_eq!(err.message, "Cannot add 'Number' and 'String'");
        assert!(!Value::Number(1.0).equals(&Value::string("1")));
        assert!(Value::string("a").lt(&Value::string("b")).is_err());
    }

    #[test]
    fn test_arithmetic_and_concat() {
        assert_eq!(Value::Number(7.0).rem(&Value::Number(3.0)).unwrap(), Value::Number(1.0));
        assert_eq!(
            Value::string("ab").add(&Value::string("cd")).unwrap(),
            Value::string("abcd")
        );
        let inf = Value::Number(1.0).div(&Value::Number(0.0)).unwrap();
        assert_eq!(inf.to_number().unwrap(), f64::INFINITY);
    }

    #[test]
    fn test_equality_tolerance_and_identity() {
        assert!(Value::Number(0.1 + 0.2).equals(&Value::Number(0.3)));
        let a = Value::array(vec![]);
        let b = Value::array(vec![]);
        assert!(a.equals(&a.clone()));
        assert!(!a.equals(&b));
    }

    #[test]
    fn test_equality_of_infinities() {
        let inf = Value::Number(f64::INFINITY);
        assert!(inf.equals(&Value::Number(f64::INFINITY)));
        assert!(!inf.equals(&Value::Number(f64::NEG_INFINITY)));
        assert!(!Value::Number(f64::NAN).equals(&Value::Number(f64::NAN)));
    }

    #[test]
    fn test_display() {
        let obj: ObjectRef = Rc::new(RefCell::new(IndexMap::new()));
        obj.borrow_mut().insert(Rc::from("a"), new_cell(Value::Number(1.0)));
        obj.borrow_mut().insert(Rc::from("b"), new_cell(Value::string("x")));
        assert_eq!(Value::Object(obj).to_string(), "{a=1, b=x}");
        assert_eq!(
            Value::array(vec![Value::Number(1.0), Value::Number(2.5)]).to_string(),
            "[1, 2.5]"
        );
    }

    #[test]
    fn test_pack() {
        assert!(pack(vec![]).is_null());
        assert_eq!(pack(vec![Value::Number(3.0)]), Value::Number(3.0));
        let packed = pack(vec![Value::Number(1.0), Value::Number(2.0)]);
        assert_eq!(packed.to_array().unwrap().borrow().len(), 2);
    }

    #[test]
    fn test_new_object_rejects_duplicates() {
        let pairs = vec![
            (Value::string("a"), Value::Number(1.0)),
            (Value::string("a"), Value::Number(2.0)),
        ];
        assert_eq!(new_object(pairs).unwrap_err().kind, ErrorKind::DuplicateBinding);
    }

    #[test]
    fn test_index_cell_aliases_elements() {
        let array = Value::array(vec![Value::Number(1.0)]);
        let cell = index_cell(&array, &Value::Number(0.0)).unwrap();
        *cell.borrow_mut() = Value::Number(5.0);
        assert_eq!(array.to_string(), "[5]");
        let missing = index_cell(&array, &Value::Number(3.0)).unwrap();
        assert!(missing.borrow().is_null());
    }

    #[test]
    fn test_cast_errors() {
        let err = Value::Null.to_number().unwrap_err();
        assert_eq!(err.kind, ErrorKind::CastError);
        assert_eq!(err.message, "Expected Number, found Null");
    }
}
