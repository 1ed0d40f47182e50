// Toy Compiler
// Compiles AST to bytecode in a single post-order pass

use std::rc::Rc;

use tracing::debug;

use super::chunk::Chunk;
use super::opcode::OpCode;
use crate::ast::*;
use crate::error::{Span, ToyError, ToyResult};
use crate::vm::{Function, Value};

/// Pending jumps of one enclosing loop
#[derive(Debug, Default)]
struct LoopLabels {
    /// Known target for `continue`, or `None` while it is still ahead
    continue_target: Option<usize>,
    continue_jumps: Vec<usize>,
    break_jumps: Vec<usize>,
    /// Scope depth just inside the loop
    scope_depth: usize,
}

/// What kind of body is being compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Script,
    Function,
    Coroutine,
}

/// Compiler state for one function body
struct FunctionState {
    kind: BodyKind,
    loops: Vec<LoopLabels>,
    scope_depth: usize,
}

impl FunctionState {
    fn new(kind: BodyKind) -> Self {
        Self {
            kind,
            loops: Vec::new(),
            scope_depth: 0,
        }
    }
}

/// The Toy bytecode compiler
pub struct Compiler {
    chunk: Chunk,
    states: Vec<FunctionState>,
    file: String,
    source: String,
    prelude: bool,
}

impl Compiler {
    pub fn new(file: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            chunk: Chunk::new(),
            states: vec![FunctionState::new(BodyKind::Script)],
            file: file.into(),
            source: source.into(),
            prelude: true,
        }
    }

    /// Compiler for code appended at `base` to an already loaded chunk.
    /// No prelude is emitted since the builtins are already bound.
    pub fn continuing(file: impl Into<String>, source: impl Into<String>, base: usize) -> Self {
        Self {
            chunk: Chunk::starting_at(base),
            prelude: false,
            ..Self::new(file, source)
        }
    }

    /// Compile a program to bytecode
    pub fn compile(mut self, program: &Program) -> ToyResult<Chunk> {
        if self.prelude {
            self.emit_prelude();
        }

        for stmt in &program.statements {
            let start = self.chunk.end();
            self.chunk.statement_starts.push(start);
            self.compile_stmt(stmt)?;
        }

        let end_span = program
            .statements
            .last()
            .map(|s| s.span())
            .unwrap_or_default();
        self.emit(OpCode::Halt, end_span);

        debug!(
            file = %self.file,
            base = self.chunk.base,
            instructions = self.chunk.code.len(),
            "compiled chunk"
        );
        Ok(self.chunk)
    }

    /// `print` and `len` are ordinary script functions whose bodies are the
    /// matching instructions.
    fn emit_prelude(&mut self) {
        let span = Span::default();
        let over = self.emit_jump(OpCode::Jump(0), span);

        let print = self.emit(OpCode::Print, span);
        self.emit(OpCode::Push(Value::Null), span);
        self.emit(OpCode::Ret, span);

        let len = self.emit(OpCode::Len, span);
        self.emit(OpCode::Ret, span);

        self.patch_jump(over);
        for (name, label) in [("print", print), ("len", len)] {
            self.emit(
                OpCode::Push(Value::Function(Rc::new(Function {
                    name: Rc::from(name),
                    params: Vec::new(),
                    label,
                    kind: FunctionKind::Function,
                }))),
                span,
            );
            self.emit(OpCode::Store(Rc::from(name)), span);
        }
    }

    fn state(&self) -> &FunctionState {
        &self.states[self.states.len() - 1]
    }

    fn state_mut(&mut self) -> &mut FunctionState {
        let last = self.states.len() - 1;
        &mut self.states[last]
    }

    // ==================== Statements ====================

    fn compile_stmt(&mut self, stmt: &Stmt) -> ToyResult<()> {
        match stmt {
            Stmt::Var { bindings, .. } => {
                for binding in bindings {
                    match &binding.initializer {
                        Some(init) => self.compile_expr(init)?,
                        None => {
                            self.emit(OpCode::Push(Value::Null), binding.span);
                        }
                    }
                    self.emit(OpCode::Store(Rc::from(binding.name.as_str())), binding.span);
                }
            }
            Stmt::Expression { expr, span } => {
                self.compile_expr(expr)?;
                self.emit(OpCode::Clear, *span);
            }
            Stmt::Block { statements, span } => {
                self.begin_scope(*span);
                for stmt in statements {
                    self.compile_stmt(stmt)?;
                }
                self.end_scope(*span);
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                span,
            } => self.compile_if(condition, then_branch, else_branch.as_deref(), *span)?,
            Stmt::While {
                condition,
                body,
                span,
            } => self.compile_while(condition, body, *span)?,
            Stmt::For {
                initializer,
                condition,
                increment,
                body,
                span,
            } => self.compile_for(
                initializer.as_deref(),
                condition.as_ref(),
                increment.as_ref(),
                body,
                *span,
            )?,
            Stmt::ForIn {
                key,
                value,
                iterable,
                body,
                span,
            } => self.compile_for_in(key, value, iterable, body, *span)?,
            Stmt::Function { def } => self.compile_function(def)?,
            Stmt::Return { value, span } => self.compile_return(value.as_ref(), *span)?,
            Stmt::Break { span } => self.compile_break(*span)?,
            Stmt::Continue { span } => self.compile_continue(*span)?,
            Stmt::Empty { .. } => {}
        }
        Ok(())
    }

    fn compile_if(
        &mut self,
        condition: &Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
        span: Span,
    ) -> ToyResult<()> {
        self.compile_expr(condition)?;
        let then_jump = self.emit_jump(OpCode::NJump(0), span);

        self.compile_stmt(then_branch)?;

        match else_branch {
            Some(else_stmt) => {
                let else_jump = self.emit_jump(OpCode::Jump(0), span);
                self.patch_jump(then_jump);
                self.compile_stmt(else_stmt)?;
                self.patch_jump(else_jump);
            }
            None => self.patch_jump(then_jump),
        }

        Ok(())
    }

    fn compile_while(&mut self, condition: &Expr, body: &Stmt, span: Span) -> ToyResult<()> {
        let loop_start = self.chunk.end();
        self.begin_loop(Some(loop_start));

        self.compile_expr(condition)?;
        let exit_jump = self.emit_jump(OpCode::NJump(0), span);

        self.compile_stmt(body)?;
        self.emit(OpCode::Jump(loop_start), span);

        self.patch_jump(exit_jump);
        let exit = self.chunk.end();
        self.end_loop(exit, loop_start);

        Ok(())
    }

    /// ```text
    /// EnterScope; init; head: cond; NJump exit; body;
    /// cont: step; Clear; Jump head; exit: LeaveScope
    /// ```
    fn compile_for(
        &mut self,
        initializer: Option<&Stmt>,
        condition: Option<&Expr>,
        increment: Option<&Expr>,
        body: &Stmt,
        span: Span,
    ) -> ToyResult<()> {
        self.begin_scope(span);

        if let Some(init) = initializer {
            self.compile_stmt(init)?;
        }

        let loop_start = self.chunk.end();
        let exit_jump = match condition {
            Some(cond) => {
                self.compile_expr(cond)?;
                Some(self.emit_jump(OpCode::NJump(0), span))
            }
            None => None,
        };

        // The step is still ahead, continue jumps get patched
        self.begin_loop(None);
        self.compile_stmt(body)?;

        let continue_target = self.chunk.end();
        if let Some(step) = increment {
            self.compile_expr(step)?;
            self.emit(OpCode::Clear, step.span());
        }
        self.emit(OpCode::Jump(loop_start), span);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
        }
        let exit = self.chunk.end();
        self.end_loop(exit, continue_target);

        self.end_scope(span);
        Ok(())
    }

    /// ```text
    /// EnterScope; iterable; Push null; Push null; Enum{k,v};
    /// head: Next(exit); body; Jump head;
    /// pad: EndEnum;
    /// exit: LeaveScope
    /// ```
    fn compile_for_in(
        &mut self,
        key: &str,
        value: &str,
        iterable: &Expr,
        body: &Stmt,
        span: Span,
    ) -> ToyResult<()> {
        self.begin_scope(span);

        self.compile_expr(iterable)?;
        self.emit(OpCode::Push(Value::Null), span);
        self.emit(OpCode::Push(Value::Null), span);
        self.emit(
            OpCode::Enum {
                key: Rc::from(key),
                value: Rc::from(value),
            },
            span,
        );

        let head = self.emit_jump(OpCode::Next(0), span);
        self.begin_loop(Some(head));

        self.compile_stmt(body)?;
        self.emit(OpCode::Jump(head), span);

        // break lands here and unwinds the iteration frame
        let pad = self.emit(OpCode::EndEnum, span);
        self.end_loop(pad, head);

        self.patch_jump(head);
        self.end_scope(span);
        Ok(())
    }

    fn compile_function(&mut self, def: &FunctionDef) -> ToyResult<()> {
        let span = def.span;
        let guard = self.emit_jump(OpCode::Jump(0), span);
        let label = self.chunk.end();

        let kind = match def.kind {
            FunctionKind::Function => BodyKind::Function,
            FunctionKind::Coroutine => BodyKind::Coroutine,
        };
        self.states.push(FunctionState::new(kind));
        for stmt in &def.body {
            self.compile_stmt(stmt)?;
        }
        self.emit(OpCode::Push(Value::Null), span);
        self.emit_function_exit(kind, span);
        self.states.pop();

        self.patch_jump(guard);

        let function = Function {
            name: Rc::from(def.name.as_str()),
            params: def.params.iter().map(|p| Rc::from(p.as_str())).collect(),
            label,
            kind: def.kind,
        };
        self.emit(OpCode::Push(Value::Function(Rc::new(function))), span);
        if def.kind == FunctionKind::Coroutine {
            self.emit(OpCode::NewCo, span);
        }
        self.emit(OpCode::Store(Rc::from(def.name.as_str())), span);

        Ok(())
    }

    /// Leave a body with the value on top of the stack as its result.
    /// A coroutine hands its result to the resumer and halts.
    fn emit_function_exit(&mut self, kind: BodyKind, span: Span) {
        match kind {
            BodyKind::Coroutine => {
                self.emit(OpCode::Push(Value::Number(1.0)), span);
                self.emit(OpCode::CoYield, span);
                self.emit(OpCode::Halt, span);
            }
            _ => {
                self.emit(OpCode::Ret, span);
            }
        }
    }

    fn compile_return(&mut self, value: Option<&Expr>, span: Span) -> ToyResult<()> {
        let kind = self.state().kind;
        if kind == BodyKind::Script {
            return Err(self
                .error("'return' outside of a function", span)
                .with_help("'return' can only be used inside a function or coroutine"));
        }

        match value {
            Some(expr) => self.compile_expr(expr)?,
            None => {
                self.emit(OpCode::Push(Value::Null), span);
            }
        }
        self.emit_function_exit(kind, span);
        Ok(())
    }

    fn compile_break(&mut self, span: Span) -> ToyResult<()> {
        let Some(target_depth) = self.state().loops.last().map(|l| l.scope_depth) else {
            return Err(self.error("'break' outside of loop", span));
        };

        self.leave_scopes_to(target_depth, span);
        let jump = self.emit_jump(OpCode::Jump(0), span);
        if let Some(labels) = self.state_mut().loops.last_mut() {
            labels.break_jumps.push(jump);
        }
        Ok(())
    }

    fn compile_continue(&mut self, span: Span) -> ToyResult<()> {
        let Some((target_depth, target)) = self
            .state()
            .loops
            .last()
            .map(|l| (l.scope_depth, l.continue_target))
        else {
            return Err(self.error("'continue' outside of loop", span));
        };

        self.leave_scopes_to(target_depth, span);
        match target {
            Some(address) => {
                self.emit(OpCode::Jump(address), span);
            }
            None => {
                let jump = self.emit_jump(OpCode::Jump(0), span);
                if let Some(labels) = self.state_mut().loops.last_mut() {
                    labels.continue_jumps.push(jump);
                }
            }
        }
        Ok(())
    }

    // ==================== Expressions ====================

    fn compile_expr(&mut self, expr: &Expr) -> ToyResult<()> {
        match expr {
            Expr::Literal { value, span } => {
                let value = match value {
                    Literal::Number(n) => Value::Number(*n),
                    Literal::String(s) => Value::string(s),
                    Literal::Boolean(b) => Value::Boolean(*b),
                    Literal::Null => Value::Null,
                };
                self.emit(OpCode::Push(value), *span);
            }

            Expr::Variable { name, span } => {
                self.emit(OpCode::Load(Rc::from(name.as_str())), *span);
            }

            Expr::Unary { op, operand, span } => match op {
                UnaryOp::Negate => {
                    self.emit(OpCode::Push(Value::Number(0.0)), *span);
                    self.compile_expr(operand)?;
                    self.emit(OpCode::Sub, *span);
                }
                UnaryOp::Not => {
                    self.compile_expr(operand)?;
                    self.emit(OpCode::Not, *span);
                }
            },

            Expr::Binary {
                left,
                op,
                right,
                span,
            } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit(binary_opcode(*op), *span);
            }

            Expr::Logical {
                left,
                op,
                right,
                span,
            } => self.compile_logical(left, *op, right, *span)?,

            Expr::Ternary {
                condition,
                then_expr,
                else_expr,
                span,
            } => {
                self.compile_expr(condition)?;
                let else_jump = self.emit_jump(OpCode::NJump(0), *span);
                self.compile_expr(then_expr)?;
                let end_jump = self.emit_jump(OpCode::Jump(0), *span);
                self.patch_jump(else_jump);
                self.compile_expr(else_expr)?;
                self.patch_jump(end_jump);
            }

            Expr::Assignment {
                target,
                op,
                value,
                span,
            } => {
                self.compile_lvalue(target)?;
                match op.binary() {
                    Some(binary) => {
                        self.emit(OpCode::SLoad(1), *span);
                        self.compile_expr(value)?;
                        self.emit(binary_opcode(binary), *span);
                    }
                    None => self.compile_expr(value)?,
                }
                self.emit(OpCode::Assign, *span);
            }

            Expr::Update {
                target,
                op,
                prefix,
                span,
            } => {
                let apply = match op {
                    UpdateOp::Increment => OpCode::Add,
                    UpdateOp::Decrement => OpCode::Sub,
                };
                self.compile_lvalue(target)?;
                if !prefix {
                    // Postfix keeps a copy of the old value under the target
                    self.emit(OpCode::Snapshot, *span);
                }
                self.emit(OpCode::SLoad(1), *span);
                self.emit(OpCode::Push(Value::Number(1.0)), *span);
                self.emit(apply, *span);
                self.emit(OpCode::Assign, *span);
                if !prefix {
                    self.emit(OpCode::Pop, *span);
                }
            }

            Expr::Call { callee, args, span } => {
                self.compile_expr(callee)?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.emit(OpCode::Push(Value::Number(args.len() as f64)), *span);
                let ret = self.chunk.end() + 2;
                self.emit(OpCode::Push(Value::Label(ret)), *span);
                self.emit(OpCode::Call, *span);
            }

            Expr::Index { .. } | Expr::Get { .. } => self.compile_lvalue(expr)?,

            Expr::Array { elements, span } => {
                for element in elements {
                    self.compile_expr(element)?;
                }
                self.emit(OpCode::NewArray(elements.len()), *span);
            }

            Expr::Object { entries, span } => {
                for (key, value) in entries {
                    self.emit(OpCode::Push(Value::string(key)), value.span());
                    self.compile_expr(value)?;
                }
                self.emit(OpCode::NewObj(entries.len()), *span);
            }

            Expr::Yield { args, span } => {
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.emit(OpCode::Push(Value::Number(args.len() as f64)), *span);
                self.emit(OpCode::CoYield, *span);
            }

            Expr::Resume {
                coroutine,
                args,
                span,
            } => {
                self.compile_expr(coroutine)?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.emit(OpCode::Push(Value::Number(args.len() as f64)), *span);
                self.emit(OpCode::CoResume, *span);
            }
        }
        Ok(())
    }

    /// Leaves the storage cell of `expr` on the stack
    fn compile_lvalue(&mut self, expr: &Expr) -> ToyResult<()> {
        match expr {
            Expr::Variable { name, span } => {
                self.emit(OpCode::Load(Rc::from(name.as_str())), *span);
            }
            Expr::Index {
                object,
                index,
                span,
            } => {
                self.compile_expr(object)?;
                self.compile_expr(index)?;
                self.emit(OpCode::Index, *span);
            }
            Expr::Get {
                object,
                property,
                span,
            } => {
                self.compile_expr(object)?;
                self.emit(OpCode::Dot(Rc::from(property.as_str())), *span);
            }
            other => {
                return Err(self
                    .error("Invalid assignment target", other.span())
                    .with_help("Can only assign to variables, elements or members"));
            }
        }
        Ok(())
    }

    /// ```text
    /// &&: a; SLoad 1; NJump short; b; And; Jump end; short: Pop; Push false; end:
    /// ||: a; SLoad 1; Not; NJump short; b; Or; Jump end; short: Pop; Push true; end:
    /// ```
    fn compile_logical(
        &mut self,
        left: &Expr,
        op: LogicalOp,
        right: &Expr,
        span: Span,
    ) -> ToyResult<()> {
        self.compile_expr(left)?;
        self.emit(OpCode::SLoad(1), span);
        if op == LogicalOp::Or {
            self.emit(OpCode::Not, span);
        }
        let short = self.emit_jump(OpCode::NJump(0), span);

        self.compile_expr(right)?;
        let (combine, shortcut) = match op {
            LogicalOp::And => (OpCode::And, false),
            LogicalOp::Or => (OpCode::Or, true),
        };
        self.emit(combine, span);
        let end = self.emit_jump(OpCode::Jump(0), span);

        self.patch_jump(short);
        self.emit(OpCode::Pop, span);
        self.emit(OpCode::Push(Value::Boolean(shortcut)), span);
        self.patch_jump(end);
        Ok(())
    }

    // ==================== Scopes and loops ====================

    fn begin_scope(&mut self, span: Span) {
        self.emit(OpCode::EnterScope, span);
        self.state_mut().scope_depth += 1;
    }

    fn end_scope(&mut self, span: Span) {
        self.emit(OpCode::LeaveScope, span);
        self.state_mut().scope_depth -= 1;
    }

    fn leave_scopes_to(&mut self, depth: usize, span: Span) {
        let open = self.state().scope_depth.saturating_sub(depth);
        for _ in 0..open {
            self.emit(OpCode::LeaveScope, span);
        }
    }

    fn begin_loop(&mut self, continue_target: Option<usize>) {
        let scope_depth = self.state().scope_depth;
        self.state_mut().loops.push(LoopLabels {
            continue_target,
            scope_depth,
            ..LoopLabels::default()
        });
    }

    /// Pop the innermost loop, pointing its breaks at `break_target` and
    /// any forward continues at `continue_target`
    fn end_loop(&mut self, break_target: usize, continue_target: usize) {
        let Some(labels) = self.state_mut().loops.pop() else {
            return;
        };
        for jump in labels.break_jumps {
            self.chunk.patch_jump_to(jump, break_target);
        }
        for jump in labels.continue_jumps {
            self.chunk.patch_jump_to(jump, continue_target);
        }
    }

    // ==================== Emission ====================

    fn emit(&mut self, op: OpCode, span: Span) -> usize {
        self.chunk.write(op, span)
    }

    fn emit_jump(&mut self, op: OpCode, span: Span) -> usize {
        self.emit(op, span)
    }

    fn patch_jump(&mut self, address: usize) {
        self.chunk.patch_jump(address);
    }

    fn error(&self, message: &str, span: Span) -> ToyError {
        ToyError::syntax_error(message, span, &self.file).with_source(&self.source)
    }
}

fn binary_opcode(op: BinaryOp) -> OpCode {
    match op {
        BinaryOp::Add => OpCode::Add,
        BinaryOp::Sub => OpCode::Sub,
        BinaryOp::Mul => OpCode::Mul,
        BinaryOp::Div => OpCode::Div,
        BinaryOp::Mod => OpCode::Rem,
        BinaryOp::Equal => OpCode::Eq,
        BinaryOp::NotEqual => OpCode::Ne,
        BinaryOp::Less => OpCode::Lt,
        BinaryOp::LessEqual => OpCode::Le,
        BinaryOp::Greater => OpCode::Gt,
        BinaryOp::GreaterEqual => OpCode::Ge,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Scanner;
    use crate::parser::Parser;

    fn compile(source: &str) -> ToyResult<Chunk> {
        let tokens = Scanner::new(source, "test").scan_tokens()?;
        let program = Parser::new(tokens, "test", source).parse()?;
        Compiler::new("test", source).compile(&program)
    }

    fn user_code(chunk: &Chunk) -> &[OpCode] {
        let start = chunk.statement_starts[0] - chunk.base;
        &chunk.code[start..]
    }

    #[test]
    fn test_every_jump_is_patched() {
        let chunk = compile(
            "var i = 0; while (i < 3) { if (i == 1) break; i++; }
             for (var j = 0; j < 2; j++) { continue; }
             for (k, v in [1, 2]) { if (v) break; }
             var t = true && false || 1 > 2 ? 1 : 2;",
        )
        .unwrap();
        for op in &chunk.code {
            if let Some(target) = op.target() {
                assert!(target != 0 && target <= chunk.end(), "unpatched {}", op);
            }
        }
    }

    #[test]
    fn test_call_sequence() {
        let chunk = compile("f(1, 2);").unwrap();
        let code = user_code(&chunk);
        assert!(matches!(&code[0], OpCode::Load(name) if &**name == "f"));
        assert!(matches!(code[3], OpCode::Push(Value::Number(n)) if n == 2.0));
        let call_at = chunk.statement_starts[0] + 5;
        assert!(matches!(code[4], OpCode::Push(Value::Label(ret)) if ret == call_at + 1));
        assert!(matches!(code[5], OpCode::Call));
        assert!(matches!(code[6], OpCode::Clear));
    }

    #[test]
    fn test_break_leaves_nested_scopes() {
        let chunk = compile("while (true) { { break; } }").unwrap();
        let code = user_code(&chunk);
        let leaves = code
            .iter()
            .take_while(|op| !matches!(op, OpCode::Jump(_)))
            .filter(|op| matches!(op, OpCode::LeaveScope))
            .count();
        assert_eq!(leaves, 2);
    }

    #[test]
    fn test_for_in_break_targets_end_enum() {
        let chunk = compile("for (k, v in [1]) break;").unwrap();
        let pad = chunk
            .code
            .iter()
            .position(|op| matches!(op, OpCode::EndEnum))
            .unwrap()
            + chunk.base;
        let jumps: Vec<usize> = chunk
            .code
            .iter()
            .filter_map(|op| match op {
                OpCode::Jump(t) => Some(*t),
                _ => None,
            })
            .collect();
        assert!(jumps.contains(&pad));
    }

    #[test]
    fn test_loop_control_outside_loop_is_error() {
        for source in ["break;", "continue;", "while (true) { function f() { break; } }"] {
            let err = compile(source).unwrap_err();
            assert_eq!(err.kind, crate::error::ErrorKind::SyntaxError);
        }
    }

    #[test]
    fn test_top_level_return_is_error() {
        let err = compile("return 1;").unwrap_err();
        assert_eq!(err.message, "'return' outside of a function");
    }

    #[test]
    fn test_coroutine_body_ends_with_yield_then_halt() {
        let chunk = compile("coroutine g() { }").unwrap();
        let code = user_code(&chunk);
        assert!(matches!(code[1], OpCode::Push(Value::Null)));
        assert!(matches!(code[3], OpCode::CoYield));
        assert!(matches!(code[4], OpCode::Halt));
        assert!(matches!(code[6], OpCode::NewCo));
    }

    #[test]
    fn test_continuation_chunk_has_no_prelude() {
        let source = "var x = 1;";
        let tokens = Scanner::new(source, "repl").scan_tokens().unwrap();
        let program = Parser::new(tokens, "repl", source).parse().unwrap();
        let chunk = Compiler::continuing("repl", source, 40)
            .compile(&program)
            .unwrap();
        assert_eq!(chunk.base, 40);
        assert_eq!(chunk.statement_starts, vec![40]);
        assert_eq!(chunk.code.len(), 3);
    }
}
