// Toy Tree-Walk Interpreter
// Executes a Program directly over the runtime values and scope arena.
// Coroutines need the suspension machinery of the Vm and are rejected here.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::ast::{
    BinaryOp, Expr, FunctionDef, FunctionKind, Literal, LogicalOp, Program, Stmt,
    UnaryOp, UpdateOp,
};
use crate::builtins;
use crate::config::VmConfig;
use crate::error::{Span, StackFrame, ToyError, ToyResult};
use crate::vm::{
    index_cell, length_of, member_cell, new_cell, new_object, pack, Cell, Function,
    IterState, NativeCall, NativeFunction, ScopeArena, ScopeId, Value,
};

const NO_COROUTINES: &str = "Coroutines require the bytecode VM";

/// How a statement finished
#[derive(Debug)]
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

type SharedOut = Rc<RefCell<Box<dyn Write>>>;

pub struct Interpreter {
    scopes: ScopeArena,
    global: ScopeId,
    scope: ScopeId,
    /// Declarations by `Function::label`
    functions: Vec<Rc<FunctionDef>>,
    declared: FxHashMap<usize, usize>,
    out: SharedOut,
    config: VmConfig,
    depth: usize,
    /// Active calls: callee name and call site
    frames: Vec<(Rc<str>, Span)>,
    file: String,
    source: String,
}

impl Interpreter {
    pub fn new() -> Self {
        let mut scopes = ScopeArena::new();
        let global = scopes.root();
        let mut interp = Self {
            scopes,
            global,
            scope: global,
            functions: Vec::new(),
            declared: FxHashMap::default(),
            out: Rc::new(RefCell::new(Box::new(io::stdout()))),
            config: VmConfig::default(),
            depth: 0,
            frames: Vec::new(),
            file: String::from("<script>"),
            source: String::new(),
        };
        interp.bind_natives();
        interp
    }

    pub fn with_output(self, out: impl Write + 'static) -> Self {
        *self.out.borrow_mut() = Box::new(out);
        self
    }

    pub fn with_config(mut self, config: VmConfig) -> Self {
        self.config = config;
        self
    }

    fn bind_natives(&mut self) {
        let out = self.out.clone();
        self.bind("print", move |call: &mut NativeCall| {
            let line = (0..call.argc())
                .map(|i| call.arg(i).to_string())
                .collect::<Vec<_>>()
                .join("\t");
            writeln!(out.borrow_mut(), "{}", line)
                .map_err(|e| ToyError::runtime_error(format!("Failed to print: {}", e)))?;
            Ok(0)
        });
        self.bind("len", |call: &mut NativeCall| {
            if call.argc() == 0 {
                return Err(ToyError::invalid_call("len() expects 1 argument, got 0"));
            }
            let length = length_of(&call.arg(0))?;
            call.push(Value::Number(length as f64))?;
            Ok(1)
        });
        for (name, func) in builtins::NATIVES {
            self.bind(name, *func);
        }
    }

    fn bind<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&mut NativeCall) -> ToyResult<usize> + 'static,
    {
        let native = NativeFunction {
            name: Rc::from(name),
            func: Box::new(func),
        };
        // The global scope is fresh, names cannot collide
        let _ = self.scopes.define(
            self.global,
            Rc::from(name),
            new_cell(Value::Native(Rc::new(native))),
        );
    }

    /// Run a whole program in the global scope
    pub fn interpret(
        &mut self,
        program: &Program,
        file: impl Into<String>,
        source: impl Into<String>,
    ) -> ToyResult<()> {
        self.file = file.into();
        self.source = source.into();
        check_control(&program.statements, false, false, &self.file)
            .map_err(|e| e.with_source(&self.source))?;

        let result = self.exec_block(&program.statements);
        // A failed run leaves nested scopes and frames behind
        self.scopes.release_until(self.scope, self.global);
        self.scope = self.global;
        self.frames.clear();
        self.depth = 0;
        result?;

        self.out
            .borrow_mut()
            .flush()
            .map_err(|e| ToyError::runtime_error(format!("Failed to flush output: {}", e)))
    }

    /// Value of a global binding
    pub fn global(&self, name: &str) -> Option<Value> {
        self.scopes
            .lookup(self.global, name)
            .map(|cell| cell.borrow().clone())
    }

    pub fn scopes(&self) -> &ScopeArena {
        &self.scopes
    }

    // ==================== Statements ====================

    fn exec_block(&mut self, statements: &[Stmt]) -> ToyResult<Flow> {
        for stmt in statements {
            match self.exec(stmt)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt) -> ToyResult<Flow> {
        match stmt {
            Stmt::Var { bindings, .. } => {
                for binding in bindings {
                    let value = match &binding.initializer {
                        Some(init) => self.eval(init)?,
                        None => Value::Null,
                    };
                    self.define(&binding.name, value, binding.span)?;
                }
                Ok(Flow::Normal)
            }
            Stmt::Expression { expr, .. } => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
            Stmt::Block { statements, .. } => self.scoped(|interp| interp.exec_block(statements)),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                if self.eval(condition)?.is_truthy() {
                    self.exec(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.exec(else_branch)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While {
                condition, body, ..
            } => {
                while self.eval(condition)?.is_truthy() {
                    match self.exec(body)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                initializer,
                condition,
                increment,
                body,
                ..
            } => self.scoped(|interp| {
                if let Some(init) = initializer {
                    interp.exec(init)?;
                }
                loop {
                    if let Some(condition) = condition {
                        if !interp.eval(condition)?.is_truthy() {
                            break;
                        }
                    }
                    match interp.exec(body)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                    if let Some(step) = increment {
                        interp.eval(step)?;
                    }
                }
                Ok(Flow::Normal)
            }),
            Stmt::ForIn {
                key,
                value,
                iterable,
                body,
                span,
            } => self.scoped(|interp| interp.exec_for_in(key, value, iterable, body, *span)),
            Stmt::Function { def } => {
                if def.kind == FunctionKind::Coroutine {
                    return Err(self.locate(ToyError::runtime_error(NO_COROUTINES), def.span));
                }
                let function = self.declare(def);
                self.define(&def.name, Value::Function(function), def.span)?;
                Ok(Flow::Normal)
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Break { .. } => Ok(Flow::Break),
            Stmt::Continue { .. } => Ok(Flow::Continue),
            Stmt::Empty { .. } => Ok(Flow::Normal),
        }
    }

    fn exec_for_in(
        &mut self,
        key: &str,
        value: &str,
        iterable: &Expr,
        body: &Stmt,
        span: Span,
    ) -> ToyResult<Flow> {
        let collection = self.eval(iterable)?;
        let mut iter = IterState::over(&collection).map_err(|e| self.locate(e, iterable.span()))?;

        let key_cell = new_cell(Value::Null);
        let value_cell = new_cell(Value::Null);
        self.scopes
            .define(self.scope, Rc::from(key), key_cell.clone())
            .map_err(|e| self.locate(e, span))?;
        self.scopes
            .define(self.scope, Rc::from(value), value_cell.clone())
            .map_err(|e| self.locate(e, span))?;

        while let Some((k, v)) = iter.next_pair() {
            *key_cell.borrow_mut() = k;
            *value_cell.borrow_mut() = v;
            match self.exec(body)? {
                Flow::Break => break,
                Flow::Normal | Flow::Continue => {}
                ret @ Flow::Return(_) => return Ok(ret),
            }
        }
        Ok(Flow::Normal)
    }

    /// Run `body` in a fresh child scope
    fn scoped<T>(&mut self, body: impl FnOnce(&mut Self) -> ToyResult<T>) -> ToyResult<T> {
        let outer = self.scope;
        self.scope = self.scopes.push(outer);
        let result = body(self);
        self.scopes.release_until(self.scope, outer);
        self.scope = outer;
        result
    }

    fn define(&mut self, name: &str, value: Value, span: Span) -> ToyResult<()> {
        self.scopes
            .define(self.scope, Rc::from(name), new_cell(value))
            .map_err(|e| self.locate(e, span))
    }

    /// Function value for a declaration, created once per declaration
    fn declare(&mut self, def: &Rc<FunctionDef>) -> Rc<Function> {
        let key = Rc::as_ptr(def) as usize;
        let label = match self.declared.get(&key) {
            Some(label) => *label,
            None => {
                self.functions.push(def.clone());
                let label = self.functions.len() - 1;
                self.declared.insert(key, label);
                label
            }
        };
        Rc::new(Function {
            name: Rc::from(def.name.as_str()),
            params: def.params.iter().map(|p| Rc::from(p.as_str())).collect(),
            label,
            kind: def.kind,
        })
    }

    // ==================== Expressions ====================
    // Expressions produce cells. Variables, elements and members evaluate to
    // their own storage, so operands are read when the operator runs.

    fn eval(&mut self, expr: &Expr) -> ToyResult<Value> {
        let cell = self.eval_cell(expr)?;
        let value = cell.borrow().clone();
        Ok(value)
    }

    fn eval_cell(&mut self, expr: &Expr) -> ToyResult<Cell> {
        self.eval_inner(expr).map_err(|e| self.locate(e, expr.span()))
    }

    fn eval_inner(&mut self, expr: &Expr) -> ToyResult<Cell> {
        match expr {
            Expr::Literal { value, .. } => Ok(new_cell(match value {
                Literal::Number(n) => Value::Number(*n),
                Literal::String(s) => Value::string(s),
                Literal::Boolean(b) => Value::Boolean(*b),
                Literal::Null => Value::Null,
            })),
            Expr::Variable { .. } | Expr::Index { .. } | Expr::Get { .. } => self.place(expr),
            Expr::Unary { op, operand, .. } => {
                let value = self.eval(operand)?;
                let result = match op {
                    UnaryOp::Negate => Value::Number(0.0).sub(&value)?,
                    UnaryOp::Not => Value::Boolean(!value.is_truthy()),
                };
                Ok(new_cell(result))
            }
            Expr::Binary {
                left, op, right, ..
            } => {
                let a = self.eval_cell(left)?;
                let b = self.eval_cell(right)?;
                let result = apply_binary(*op, &a.borrow(), &b.borrow())?;
                Ok(new_cell(result))
            }
            Expr::Logical {
                left, op, right, ..
            } => {
                let a = self.eval_cell(left)?;
                let short = match op {
                    LogicalOp::And => !a.borrow().is_truthy(),
                    LogicalOp::Or => a.borrow().is_truthy(),
                };
                if short {
                    return Ok(new_cell(Value::Boolean(*op == LogicalOp::Or)));
                }
                let b = self.eval_cell(right)?;
                let (a, b) = (a.borrow().is_truthy(), b.borrow().is_truthy());
                let result = match op {
                    LogicalOp::And => a && b,
                    LogicalOp::Or => a || b,
                };
                Ok(new_cell(Value::Boolean(result)))
            }
            Expr::Ternary {
                condition,
                then_expr,
                else_expr,
                ..
            } => {
                if self.eval(condition)?.is_truthy() {
                    self.eval_cell(then_expr)
                } else {
                    self.eval_cell(else_expr)
                }
            }
            Expr::Assignment {
                target, op, value, ..
            } => {
                let cell = self.place(target)?;
                let source = self.eval_cell(value)?;
                let result = match op.binary() {
                    Some(binary) => apply_binary(binary, &cell.borrow(), &source.borrow())?,
                    None => source.borrow().clone(),
                };
                *cell.borrow_mut() = result;
                Ok(cell)
            }
            Expr::Update {
                target, op, prefix, ..
            } => {
                let cell = self.place(target)?;
                let before = cell.borrow().clone();
                let one = Value::Number(1.0);
                let after = match op {
                    UpdateOp::Increment => before.add(&one)?,
                    UpdateOp::Decrement => before.sub(&one)?,
                };
                *cell.borrow_mut() = after;
                // Postfix yields the value before the update
                Ok(if *prefix { cell } else { new_cell(before) })
            }
            Expr::Call { callee, args, span } => {
                let callee = self.eval_cell(callee)?;
                let mut cells = Vec::with_capacity(args.len());
                for arg in args {
                    cells.push(self.eval_cell(arg)?);
                }
                let callee = callee.borrow().clone();
                let result = self.call(callee, cells, *span)?;
                Ok(new_cell(result))
            }
            Expr::Array { elements, .. } => {
                let mut cells = Vec::with_capacity(elements.len());
                for element in elements {
                    cells.push(self.eval_cell(element)?);
                }
                let values = cells.iter().map(|c| c.borrow().clone()).collect();
                Ok(new_cell(Value::array(values)))
            }
            Expr::Object { entries, .. } => {
                let mut cells = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    cells.push((Value::string(key), self.eval_cell(value)?));
                }
                let pairs = cells
                    .into_iter()
                    .map(|(key, cell)| (key, cell.borrow().clone()));
                Ok(new_cell(new_object(pairs)?))
            }
            Expr::Yield { .. } | Expr::Resume { .. } => {
                Err(ToyError::runtime_error(NO_COROUTINES))
            }
        }
    }

    /// Storage cell denoted by an assignable expression
    fn place(&mut self, expr: &Expr) -> ToyResult<Cell> {
        match expr {
            Expr::Variable { name, .. } => self
                .scopes
                .lookup(self.scope, name)
                .ok_or_else(|| ToyError::undefined(name)),
            Expr::Index { object, index, .. } => {
                let object = self.eval_cell(object)?;
                let key = self.eval_cell(index)?;
                let cell = index_cell(&object.borrow(), &key.borrow())?;
                Ok(cell)
            }
            Expr::Get {
                object, property, ..
            } => {
                let object = self.eval(object)?;
                member_cell(&object, property)
            }
            other => Err(ToyError::syntax_error(
                "Invalid assignment target",
                other.span(),
                &self.file,
            )),
        }
    }

    // ==================== Calls ====================

    /// Argument cells are read here, after every argument was evaluated
    fn call(&mut self, callee: Value, mut args: Vec<Cell>, span: Span) -> ToyResult<Value> {
        match callee {
            Value::Function(function) if function.kind == FunctionKind::Function => {
                let values = args.iter().map(|c| c.borrow().clone()).collect();
                self.call_function(&function, values, span)
            }
            Value::Function(_) | Value::Coroutine(_) => {
                Err(ToyError::runtime_error(NO_COROUTINES))
            }
            Value::Native(native) => {
                let argc = args.len();
                let mut call = NativeCall::new(&mut args, 0, argc, self.config.max_stack);
                let pushed = (native.func)(&mut call)?;
                let results: Vec<Value> = args
                    .split_off(argc)
                    .iter()
                    .map(|c| c.borrow().clone())
                    .collect();
                if results.len() != pushed {
                    return Err(ToyError::protocol(format!(
                        "Native '{}' reported {} result(s) but pushed {}",
                        native.name,
                        pushed,
                        results.len()
                    )));
                }
                Ok(pack(results))
            }
            other => Err(ToyError::invalid_call(format!(
                "'{}' is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_function(&mut self, function: &Function, args: Vec<Value>, span: Span) -> ToyResult<Value> {
        if self.depth >= self.config.max_call_depth {
            return Err(ToyError::runtime_error("Stack overflow").with_help(format!(
                "Call depth exceeded {}; check for unbounded recursion",
                self.config.max_call_depth
            )));
        }
        let def = self
            .functions
            .get(function.label)
            .cloned()
            .ok_or_else(|| ToyError::protocol(format!("No function at {}", function.label)))?;

        let scope = self.scopes.push(self.global);
        let mut args = args.into_iter();
        for param in &function.params {
            let value = args.next().unwrap_or(Value::Null);
            if let Err(e) = self.scopes.define(scope, param.clone(), new_cell(value)) {
                self.scopes.release(scope);
                return Err(e);
            }
        }
        debug!(function = %function.name, depth = self.depth, "call");

        let caller_scope = self.scope;
        self.scope = scope;
        self.depth += 1;
        self.frames.push((function.name.clone(), span));

        let result = self.exec_block(&def.body);

        self.frames.pop();
        self.depth -= 1;
        self.scopes.release_until(self.scope, self.global);
        self.scope = caller_scope;

        match result? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::Null),
        }
    }

    // ==================== Errors ====================

    /// Attach a span, source excerpt and call trace to an unlocated error
    fn locate(&self, error: ToyError, span: Span) -> ToyError {
        if error.is_located() {
            return error;
        }
        let error = error.locate(span, &self.file).with_source(&self.source);
        error.with_stack_trace(self.trace(span))
    }

    /// Frames innermost first, ending with the script
    fn trace(&self, span: Span) -> Vec<StackFrame> {
        let mut frames = Vec::with_capacity(self.frames.len() + 1);
        let mut location = span;
        for (name, call_site) in self.frames.iter().rev() {
            frames.push(StackFrame::new(
                name.to_string(),
                &self.file,
                location.start.line,
                location.start.column,
            ));
            location = *call_site;
        }
        frames.push(StackFrame::new(
            "<script>",
            &self.file,
            location.start.line,
            location.start.column,
        ));
        frames
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_binary(op: BinaryOp, a: &Value, b: &Value) -> ToyResult<Value> {
    match op {
        BinaryOp::Add => a.add(b),
        BinaryOp::Sub => a.sub(b),
        BinaryOp::Mul => a.mul(b),
        BinaryOp::Div => a.div(b),
        BinaryOp::Mod => a.rem(b),
        BinaryOp::Equal => Ok(Value::Boolean(a.equals(b))),
        BinaryOp::NotEqual => Ok(Value::Boolean(!a.equals(b))),
        BinaryOp::Less => a.lt(b),
        BinaryOp::LessEqual => a.le(b),
        BinaryOp::Greater => a.gt(b),
        BinaryOp::GreaterEqual => a.ge(b),
    }
}

/// Reject `break`/`continue` outside loops and `return` at top level
/// before anything runs
fn check_control(statements: &[Stmt], in_loop: bool, in_function: bool, file: &str) -> ToyResult<()> {
    for stmt in statements {
        check_stmt(stmt, in_loop, in_function, file)?;
    }
    Ok(())
}

fn check_stmt(stmt: &Stmt, in_loop: bool, in_function: bool, file: &str) -> ToyResult<()> {
    match stmt {
        Stmt::Block { statements, .. } => check_control(statements, in_loop, in_function, file),
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            check_stmt(then_branch, in_loop, in_function, file)?;
            match else_branch {
                Some(else_branch) => check_stmt(else_branch, in_loop, in_function, file),
                None => Ok(()),
            }
        }
        Stmt::While { body, .. } | Stmt::ForIn { body, .. } => {
            check_stmt(body, true, in_function, file)
        }
        Stmt::For {
            initializer, body, ..
        } => {
            if let Some(init) = initializer {
                check_stmt(init, in_loop, in_function, file)?;
            }
            check_stmt(body, true, in_function, file)
        }
        Stmt::Function { def } => check_control(&def.body, false, true, file),
        Stmt::Return { span, .. } if !in_function => Err(ToyError::syntax_error(
            "'return' outside of a function",
            *span,
            file,
        )
        .with_help("'return' can only be used inside a function or coroutine")),
        Stmt::Break { span } if !in_loop => {
            Err(ToyError::syntax_error("'break' outside of loop", *span, file))
        }
        Stmt::Continue { span } if !in_loop => {
            Err(ToyError::syntax_error("'continue' outside of loop", *span, file))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::lexer::Scanner;
    use crate::parser::Parser;
    use crate::vm::SharedBuffer;

    fn interpret(source: &str) -> ToyResult<String> {
        let tokens = Scanner::new(source, "test").scan_tokens()?;
        let program = Parser::new(tokens, "test", source).parse()?;
        let out = SharedBuffer::new();
        let mut interp = Interpreter::new().with_output(out.clone());
        interp.interpret(&program, "test", source)?;
        Ok(out.contents())
    }

    #[test]
    fn test_fib() {
        let source = "function fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); }
                      print(fib(10));";
        assert_eq!(interpret(source).unwrap(), "55\n");
    }

    #[test]
    fn test_loops_and_control() {
        let source = "var total = 0;
                      for (var i = 0; i < 10; i++) {
                          if (i == 2) continue;
                          if (i == 5) break;
                          total += i;
                      }
                      var n = 0;
                      while (n < 3) n++;
                      print(total, n);";
        assert_eq!(interpret(source).unwrap(), "8\t3\n");
    }

    #[test]
    fn test_for_in_order_and_builtins() {
        let source = "var xs = [10, 20]; push(xs, 30);
                      for (i, v in xs) print(i, v);
                      var o = {b = 1, a = 2};
                      for (k, v in o) print(k, v);
                      print(len(xs), len(o), typeof(o));";
        assert_eq!(
            interpret(source).unwrap(),
            "0\t10\n1\t20\n2\t30\nb\t1\na\t2\n3\t2\tObject\n"
        );
    }

    #[test]
    fn test_update_and_compound_assignment() {
        assert_eq!(
            interpret("var a = 1; var b = a++; var c = ++a; a *= 10; print(a, b, c);").unwrap(),
            "30\t1\t3\n"
        );
    }

    #[test]
    fn test_no_closures() {
        let err = interpret("function f() { return y; } function g() { var y = 1; return f(); } g();")
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UndefinedVariable);
        let names: Vec<_> = err.stack_trace.iter().map(|f| f.function_name.as_str()).collect();
        assert_eq!(names, ["f", "g", "<script>"]);
    }

    #[test]
    fn test_coroutines_rejected() {
        let err = interpret("coroutine g() { yield(1); }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::RuntimeError);
        assert_eq!(err.message, NO_COROUTINES);
    }

    #[test]
    fn test_control_outside_loop() {
        assert_eq!(interpret("break;").unwrap_err().kind, ErrorKind::SyntaxError);
        assert_eq!(interpret("return 1;").unwrap_err().kind, ErrorKind::SyntaxError);
        let err = interpret("while (false) { function f() { continue; } }").unwrap_err();
        assert_eq!(err.message, "'continue' outside of loop");
    }

    #[test]
    fn test_scopes_released() {
        let source = "function f(xs) { for (i, v in xs) { if (v > 1) return v; } }
                      { var inner = f([1, 2]); }";
        let tokens = Scanner::new(source, "test").scan_tokens().unwrap();
        let program = Parser::new(tokens, "test", source).parse().unwrap();
        let mut interp = Interpreter::new().with_output(SharedBuffer::new());
        interp.interpret(&program, "test", source).unwrap();
        assert_eq!(interp.scopes().live(), 1);
        assert!(interp.global("inner").is_none());
    }

    #[test]
    fn test_stack_overflow() {
        let source = "function f(n) { return f(n + 1); } f(0);";
        let tokens = Scanner::new(source, "test").scan_tokens().unwrap();
        let program = Parser::new(tokens, "test", source).parse().unwrap();
        let mut interp = Interpreter::new()
            .with_output(SharedBuffer::new())
            .with_config(VmConfig {
                max_call_depth: 40,
                ..VmConfig::default()
            });
        let err = interp.interpret(&program, "test", source).unwrap_err();
        assert_eq!(err.message, "Stack overflow");
    }
}
