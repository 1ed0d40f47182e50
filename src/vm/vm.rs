// Toy Virtual Machine
// Stack-based executor with per-coroutine contexts
// Switching coroutines swaps the `current` handle, stacks are never copied

use std::io::{self, Write};
use std::rc::Rc;

use tracing::{debug, trace};

use super::context::Context;
use super::coroutine::{CoStatus, Coroutine, CoroutineHandle};
use super::native::NativeCall;
use super::scope::{ScopeArena, ScopeId};
use super::value::{
    index_cell, length_of, member_cell, new_cell, new_object, pack, Cell, Function, IterState,
    NativeFunction, Value,
};
use crate::ast::FunctionKind;
use crate::builtins;
use crate::compiler::{Chunk, OpCode, CALL_FRAME_SLOTS, HOST_RETURN, ITER_FRAME_SLOTS};
use crate::config::VmConfig;
use crate::error::{StackFrame, ToyError, ToyResult};

/// The Toy virtual machine
pub struct Vm {
    chunk: Rc<Chunk>,
    scopes: ScopeArena,
    global: ScopeId,
    main: Rc<CoroutineHandle>,
    /// Coroutine whose context executes next
    current: Rc<CoroutineHandle>,
    config: VmConfig,
    out: Box<dyn Write>,
    file: String,
    source: String,
}

impl Vm {
    pub fn new() -> Self {
        let mut scopes = ScopeArena::new();
        let global = scopes.root_with(builtins::bindings());
        let main = CoroutineHandle::new(Rc::from("main"), Coroutine::new(0, Vec::new(), global));
        // Nothing to run until a chunk is loaded
        main.state.borrow_mut().terminated = true;

        Self {
            chunk: Rc::new(Chunk::new()),
            scopes,
            global,
            current: main.clone(),
            main,
            config: VmConfig::default(),
            out: Box::new(io::stdout()),
            file: String::from("<script>"),
            source: String::new(),
        }
    }

    pub fn with_output(mut self, out: impl Write + 'static) -> Self {
        self.out = Box::new(out);
        self
    }

    pub fn with_config(mut self, config: VmConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Replace the program. Main restarts at the chunk's first instruction.
    pub fn load(&mut self, chunk: Chunk, file: impl Into<String>, source: impl Into<String>) {
        let base = chunk.base;
        self.chunk = Rc::new(chunk);
        self.file = file.into();
        self.source = source.into();
        self.reset_main(base);
    }

    /// Append a continuation chunk compiled at [`Vm::code_end`] and point
    /// main at it. Earlier declarations stay bound.
    pub fn append(&mut self, chunk: Chunk, source: impl Into<String>) -> ToyResult<()> {
        let base = chunk.base;
        if base != self.code_end() {
            return Err(ToyError::protocol(format!(
                "Chunk compiled at {} cannot be appended at {}",
                base,
                self.code_end()
            )));
        }
        let code = Rc::make_mut(&mut self.chunk);
        code.pop_halt();
        code.extend(chunk);
        self.source = source.into();
        self.reset_main(base);
        Ok(())
    }

    /// Address where the next continuation chunk starts
    pub fn code_end(&self) -> usize {
        let end = self.chunk.end();
        match self.chunk.code.last() {
            Some(OpCode::Halt) => end - 1,
            _ => end,
        }
    }

    /// Put main back at `ip` with an empty stack, dropping any state left
    /// behind by a failed run
    fn reset_main(&mut self, ip: usize) {
        let mut state = self.main.state.borrow_mut();
        self.scopes.release_until(state.context.scope, self.global);
        state.context = Context::new(ip, self.global);
        state.terminated = false;
        state.resumer = None;
        drop(state);
        self.current = self.main.clone();
    }

    /// Run until main halts
    pub fn run(&mut self) -> ToyResult<()> {
        while !self.is_finished() {
            self.step()?;
        }
        self.out
            .flush()
            .map_err(|e| ToyError::runtime_error(format!("Failed to flush output: {}", e)))
    }

    pub fn is_finished(&self) -> bool {
        self.main
            .state
            .try_borrow()
            .map(|s| s.terminated)
            .unwrap_or(false)
    }

    /// Execute one instruction of the current coroutine
    pub fn step(&mut self) -> ToyResult<()> {
        let handle = self.current.clone();
        let chunk = self.chunk.clone();
        let mut state = handle.state.borrow_mut();
        let ip = state.context.ip;
        let result = self.execute(&chunk, &handle, &mut state);
        drop(state);
        result.map_err(|error| self.decorate(error, &chunk, &handle, ip))
    }

    fn execute(
        &mut self,
        chunk: &Chunk,
        handle: &Rc<CoroutineHandle>,
        co: &mut Coroutine,
    ) -> ToyResult<()> {
        let max = self.config.max_stack;
        let ip = co.context.ip;
        // Falling past the end behaves like Halt
        let Some(op) = chunk.get(ip) else {
            return self.halt(handle, co);
        };
        if self.config.trace {
            trace!(coroutine = %handle.name, ip, height = co.context.stack.len(), "{}", op);
        }
        co.context.ip = ip + 1;

        let ctx = &mut co.context;
        match op {
            OpCode::Push(value) => ctx.push_value(value.clone(), max)?,
            OpCode::Pop => {
                ctx.pop()?;
            }
            OpCode::SLoad(n) => {
                let distance = n
                    .checked_sub(1)
                    .ok_or_else(|| ToyError::protocol("SLoad offset must be at least 1"))?;
                let cell = ctx.peek(distance)?.clone();
                ctx.push(cell, max)?;
            }
            OpCode::Snapshot => {
                let cell = ctx.pop()?;
                let value = cell.borrow().clone();
                ctx.push_value(value, max)?;
                ctx.push(cell, max)?;
            }

            OpCode::Add => binary(ctx, max, Value::add)?,
            OpCode::Sub => binary(ctx, max, Value::sub)?,
            OpCode::Mul => binary(ctx, max, Value::mul)?,
            OpCode::Div => binary(ctx, max, Value::div)?,
            OpCode::Rem => binary(ctx, max, Value::rem)?,
            OpCode::Lt => binary(ctx, max, Value::lt)?,
            OpCode::Le => binary(ctx, max, Value::le)?,
            OpCode::Gt => binary(ctx, max, Value::gt)?,
            OpCode::Ge => binary(ctx, max, Value::ge)?,
            OpCode::Eq => binary(ctx, max, |a, b| Ok(Value::Boolean(a.equals(b))))?,
            OpCode::Ne => binary(ctx, max, |a, b| Ok(Value::Boolean(!a.equals(b))))?,
            OpCode::And => binary(ctx, max, |a, b| {
                Ok(Value::Boolean(a.is_truthy() && b.is_truthy()))
            })?,
            OpCode::Or => binary(ctx, max, |a, b| {
                Ok(Value::Boolean(a.is_truthy() || b.is_truthy()))
            })?,
            OpCode::Not => {
                let value = ctx.pop_value()?;
                ctx.push_value(Value::Boolean(!value.is_truthy()), max)?;
            }

            OpCode::Load(name) => {
                let cell = self
                    .scopes
                    .lookup(ctx.scope, name)
                    .ok_or_else(|| ToyError::undefined(name))?;
                ctx.push(cell, max)?;
            }
            OpCode::Store(name) => {
                let value = ctx.pop_value()?;
                self.scopes.define(ctx.scope, name.clone(), new_cell(value))?;
            }
            OpCode::Assign => {
                let source = ctx.pop()?;
                let target = ctx.pop()?;
                let value = source.borrow().clone();
                *target.borrow_mut() = value;
                ctx.push(target, max)?;
            }

            OpCode::Index => {
                let key = ctx.pop_value()?;
                let object = ctx.pop_value()?;
                ctx.push(index_cell(&object, &key)?, max)?;
            }
            OpCode::Dot(name) => {
                let object = ctx.pop_value()?;
                ctx.push(member_cell(&object, name)?, max)?;
            }
            OpCode::NewArray(n) => {
                let cells = ctx.pop_n(*n)?;
                let items = cells.iter().map(|c| c.borrow().clone()).collect();
                ctx.push_value(Value::array(items), max)?;
            }
            OpCode::NewObj(n) => {
                let cells = ctx.pop_n(n * 2)?;
                let pairs = cells
                    .chunks(2)
                    .map(|pair| (pair[0].borrow().clone(), pair[1].borrow().clone()));
                ctx.push_value(new_object(pairs)?, max)?;
            }

            OpCode::Enum { key, value } => {
                let iterable = ctx.peek(2)?.borrow().clone();
                let iter = IterState::over(&iterable)?;
                let key_cell = ctx.peek(1)?.clone();
                let value_cell = ctx.peek(0)?.clone();
                self.scopes.define(ctx.scope, key.clone(), key_cell)?;
                self.scopes.define(ctx.scope, value.clone(), value_cell)?;
                ctx.push_value(Value::Iterator(Rc::new(std::cell::RefCell::new(iter))), max)?;
                ctx.push_value(Value::Label(ctx.bp), max)?;
                ctx.bp = ctx.stack.len();
            }
            OpCode::Next(exit) => {
                let bp = ctx.bp;
                if !is_iteration_frame(ctx) {
                    return Err(ToyError::protocol("Next outside of an iteration frame"));
                }
                let Value::Iterator(iter) = ctx.slot(bp - 2)? else {
                    return Err(ToyError::protocol("Next outside of an iteration frame"));
                };
                let pair = iter.borrow_mut().next_pair();
                match pair {
                    Some((k, v)) => {
                        *ctx.stack[bp - 4].borrow_mut() = k;
                        *ctx.stack[bp - 3].borrow_mut() = v;
                    }
                    None => {
                        unwind_iteration(ctx)?;
                        ctx.ip = *exit;
                    }
                }
            }
            OpCode::EndEnum => unwind_iteration(ctx)?,

            OpCode::EnterScope => {
                ctx.scope = self.scopes.push(ctx.scope);
            }
            OpCode::LeaveScope => {
                if ctx.scope == ctx.global {
                    return Err(ToyError::protocol("LeaveScope at the global scope"));
                }
                ctx.scope = self
                    .scopes
                    .release(ctx.scope)
                    .ok_or_else(|| ToyError::protocol("LeaveScope without a parent scope"))?;
            }

            OpCode::Jump(target) => ctx.ip = *target,
            OpCode::NJump(target) => {
                if !ctx.pop_value()?.is_truthy() {
                    ctx.ip = *target;
                }
            }
            OpCode::Call => self.call_value(ctx)?,
            OpCode::Ret => self.ret(ctx)?,
            OpCode::Halt => self.halt(handle, co)?,

            OpCode::Print => {
                let args = frame_args(ctx)?;
                let line = args
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join("\t");
                writeln!(self.out, "{}", line)
                    .map_err(|e| ToyError::runtime_error(format!("Failed to print: {}", e)))?;
            }
            OpCode::Len => {
                let args = frame_args(ctx)?;
                let Some(value) = args.first() else {
                    return Err(ToyError::invalid_call("len() expects 1 argument, got 0"));
                };
                ctx.push_value(Value::Number(length_of(value)? as f64), max)?;
            }
            OpCode::Clear => {
                let bp = ctx.bp;
                ctx.stack.truncate(bp);
            }

            OpCode::CoYield => self.co_yield(chunk, handle, co)?,
            OpCode::CoResume => self.co_resume(handle, co)?,
            OpCode::NewCo => {
                let prototype = ctx.pop_value()?;
                let function = match prototype {
                    Value::Function(f) if f.kind == FunctionKind::Coroutine => f,
                    other => {
                        return Err(ToyError::type_error(format!(
                            "Cannot create a coroutine from '{}'",
                            other.type_name()
                        )))
                    }
                };
                let coroutine = CoroutineHandle::new(
                    function.name.clone(),
                    Coroutine::new(function.label, function.params.clone(), self.global),
                );
                debug!(name = %function.name, label = function.label, "created coroutine");
                ctx.push_value(Value::Coroutine(coroutine), max)?;
            }

            OpCode::Nop => {}
        }
        Ok(())
    }

    // ==================== Calls ====================

    /// Stack: `callee, args.., argc, ret`
    fn call_value(&mut self, ctx: &mut Context) -> ToyResult<()> {
        let len = ctx.stack.len();
        let ret = as_label(&ctx.slot(len.saturating_sub(1))?)?;
        let argc = as_count(&ctx.slot(len.saturating_sub(2))?)?;
        let callee_index = len
            .checked_sub(3 + argc)
            .ok_or_else(|| ToyError::protocol("Call frame is missing its callee"))?;
        let callee = ctx.slot(callee_index)?;

        match callee {
            Value::Function(function) if function.kind == FunctionKind::Function => {
                self.enter_function(ctx, &function, argc)
            }
            Value::Function(function) => Err(ToyError::invalid_call(format!(
                "Coroutine '{}' must be resumed, not called",
                function.name
            ))),
            Value::Native(native) => {
                ctx.stack.truncate(len - 2);
                let results = self.invoke_native(&native, &mut ctx.stack, callee_index + 1, argc)?;
                ctx.stack.truncate(callee_index);
                ctx.push_value(results, self.config.max_stack)?;
                ctx.ip = ret;
                Ok(())
            }
            other => Err(ToyError::invalid_call(format!(
                "'{}' is not callable",
                other.type_name()
            ))),
        }
    }

    /// Run a native over `stack[base..base + argc]` and pack what it pushed
    fn invoke_native(
        &self,
        native: &NativeFunction,
        stack: &mut Vec<Cell>,
        base: usize,
        argc: usize,
    ) -> ToyResult<Value> {
        let results_from = stack.len();
        let mut call = NativeCall::new(stack, base, argc, self.config.max_stack);
        let pushed = (native.func)(&mut call)?;
        let results: Vec<Value> = stack
            .split_off(results_from)
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

    /// Complete a script call frame. The stack already holds
    /// `callee, args.., argc, ret`.
    fn enter_function(&mut self, ctx: &mut Context, function: &Function, argc: usize) -> ToyResult<()> {
        if ctx.depth >= self.config.max_call_depth {
            return Err(ToyError::runtime_error("Stack overflow").with_help(format!(
                "Call depth exceeded {}; check for unbounded recursion",
                self.config.max_call_depth
            )));
        }
        let args_start = ctx.stack.len() - 2 - argc;

        let scope = self.scopes.push(ctx.global);
        for (i, param) in function.params.iter().enumerate() {
            let value = if i < argc {
                ctx.stack[args_start + i].borrow().clone()
            } else {
                Value::Null
            };
            if let Err(e) = self.scopes.define(scope, param.clone(), new_cell(value)) {
                self.scopes.release(scope);
                return Err(e);
            }
        }

        let max = self.config.max_stack;
        ctx.push_value(Value::Scope(ctx.scope), max)?;
        ctx.push_value(Value::Label(ctx.bp), max)?;
        ctx.bp = ctx.stack.len();
        ctx.scope = scope;
        ctx.ip = function.label;
        ctx.depth += 1;
        Ok(())
    }

    fn ret(&mut self, ctx: &mut Context) -> ToyResult<()> {
        if ctx.bp > ctx.stack.len() {
            return Err(ToyError::protocol("Frame floor above the stack top"));
        }
        let results = ctx.stack.split_off(ctx.bp);

        // A return inside for-in leaves iteration frames above the call frame
        while is_iteration_frame(ctx) {
            unwind_iteration(ctx)?;
        }

        let bp = ctx.bp;
        if bp < CALL_FRAME_SLOTS {
            return Err(ToyError::protocol("Ret outside of a call frame"));
        }
        let saved_bp = as_label(&ctx.slot(bp - 1)?)?;
        let saved_scope = match ctx.slot(bp - 2)? {
            Value::Scope(scope) => scope,
            other => {
                return Err(ToyError::protocol(format!(
                    "Expected a saved scope in the call frame, found {}",
                    other.type_name()
                )))
            }
        };
        let ret = as_label(&ctx.slot(bp - 3)?)?;
        let argc = as_count(&ctx.slot(bp - 4)?)?;
        let callee_index = bp
            .checked_sub(CALL_FRAME_SLOTS + argc)
            .ok_or_else(|| ToyError::protocol("Call frame is missing its callee"))?;

        self.scopes.release_until(ctx.scope, ctx.global);
        ctx.scope = saved_scope;
        ctx.bp = saved_bp;
        ctx.ip = ret;
        ctx.depth = ctx.depth.saturating_sub(1);
        ctx.stack.truncate(callee_index);

        let values = results.iter().map(|c| c.borrow().clone()).collect();
        ctx.push_value(pack(values), self.config.max_stack)
    }

    fn halt(&mut self, handle: &Rc<CoroutineHandle>, co: &mut Coroutine) -> ToyResult<()> {
        co.terminated = true;
        self.scopes.release_until(co.context.scope, co.context.global);
        co.context.scope = co.context.global;
        if Rc::ptr_eq(handle, &self.main) {
            debug!("main halted");
            return Ok(());
        }

        debug!(name = %handle.name, "coroutine finished");
        let resumer = co
            .resumer
            .take()
            .ok_or_else(|| ToyError::protocol("Coroutine halted without a resumer"))?;
        resumer
            .state
            .try_borrow_mut()
            .map_err(|_| ToyError::protocol("Resumer is busy"))?
            .context
            .push_value(Value::Null, self.config.max_stack)?;
        self.current = resumer;
        Ok(())
    }

    // ==================== Coroutines ====================

    /// Stack: `args.., argc`
    fn co_yield(
        &mut self,
        chunk: &Chunk,
        handle: &Rc<CoroutineHandle>,
        co: &mut Coroutine,
    ) -> ToyResult<()> {
        let argc = co.context.pop_count()?;
        let args: Vec<Value> = co
            .context
            .pop_n(argc)?
            .iter()
            .map(|c| c.borrow().clone())
            .collect();
        let resumer = co
            .resumer
            .take()
            .ok_or_else(|| ToyError::runtime_error("yield outside of a coroutine"))?;

        resumer
            .state
            .try_borrow_mut()
            .map_err(|_| ToyError::protocol("Resumer is busy"))?
            .context
            .push_value(pack(args), self.config.max_stack)?;

        // A yield right before Halt is the coroutine's final result
        if matches!(chunk.get(co.context.ip), None | Some(OpCode::Halt)) {
            co.terminated = true;
            self.scopes.release_until(co.context.scope, co.context.global);
            co.context.scope = co.context.global;
        }

        debug!(from = %handle.name, to = %resumer.name, "yield");
        self.current = resumer;
        Ok(())
    }

    /// Stack: `co, args.., argc`
    fn co_resume(&mut self, handle: &Rc<CoroutineHandle>, co: &mut Coroutine) -> ToyResult<()> {
        let argc = co.context.pop_count()?;
        let args: Vec<Value> = co
            .context
            .pop_n(argc)?
            .iter()
            .map(|c| c.borrow().clone())
            .collect();
        let target = match co.context.pop_value()? {
            Value::Coroutine(target) => target,
            other => {
                return Err(ToyError::invalid_call(format!(
                    "Cannot resume '{}'",
                    other.type_name()
                )))
            }
        };

        match target.status() {
            CoStatus::Suspended => {}
            status => {
                return Err(ToyError::runtime_error(format!(
                    "Cannot resume {} coroutine '{}'",
                    status, target.name
                )))
            }
        }

        let mut state = target
            .state
            .try_borrow_mut()
            .map_err(|_| ToyError::protocol("Coroutine is busy"))?;
        if state.is_fresh() {
            let scope = self.scopes.push(state.context.global);
            for (i, param) in state.params.iter().enumerate() {
                let value = args.get(i).cloned().unwrap_or(Value::Null);
                self.scopes.define(scope, param.clone(), new_cell(value))?;
            }
            state.context.scope = scope;
        } else {
            state.context.push_value(pack(args), self.config.max_stack)?;
        }
        state.resumer = Some(handle.clone());
        drop(state);

        debug!(from = %handle.name, to = %target.name, "resume");
        self.current = target;
        Ok(())
    }

    // ==================== Host bridge ====================

    /// Bind a host function in the global scope
    pub fn register_native<F>(&mut self, name: &str, func: F) -> ToyResult<()>
    where
        F: Fn(&mut NativeCall) -> ToyResult<usize> + 'static,
    {
        let native = NativeFunction {
            name: Rc::from(name),
            func: Box::new(func),
        };
        self.scopes.define(
            self.global,
            Rc::from(name),
            new_cell(Value::Native(Rc::new(native))),
        )
    }

    /// Value of a global binding
    pub fn global(&self, name: &str) -> Option<Value> {
        self.scopes
            .lookup(self.global, name)
            .map(|cell| cell.borrow().clone())
    }

    /// Call a global function from the host and wait for its result
    pub fn call(&mut self, name: &str, args: &[Value]) -> ToyResult<Value> {
        let callee = self.global(name).ok_or_else(|| ToyError::undefined(name))?;
        self.call_value_from_host(callee, args)
    }

    pub fn call_value_from_host(&mut self, callee: Value, args: &[Value]) -> ToyResult<Value> {
        debug!(callee = %callee, argc = args.len(), "host call");
        match callee {
            Value::Native(native) => {
                let mut stack: Vec<Cell> = args.iter().cloned().map(new_cell).collect();
                self.invoke_native(&native, &mut stack, 0, args.len())
            }
            Value::Function(function) if function.kind == FunctionKind::Function => {
                self.call_script_from_host(function, args)
            }
            other => Err(ToyError::invalid_call(format!(
                "'{}' is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_script_from_host(&mut self, function: Rc<Function>, args: &[Value]) -> ToyResult<Value> {
        let origin = self.current.clone();
        let saved = HostFrame::of(&origin.state.borrow().context);
        match self.run_host_call(&origin, &function, args) {
            Ok(result) => {
                origin.state.borrow_mut().context.ip = saved.ip;
                Ok(result)
            }
            Err(error) => {
                self.abandon_host_call(&origin, &saved);
                Err(error)
            }
        }
    }

    fn run_host_call(
        &mut self,
        origin: &Rc<CoroutineHandle>,
        function: &Rc<Function>,
        args: &[Value],
    ) -> ToyResult<Value> {
        let max = self.config.max_stack;
        {
            let mut state = origin.state.borrow_mut();
            let ctx = &mut state.context;
            ctx.push_value(Value::Function(function.clone()), max)?;
            for arg in args {
                ctx.push_value(arg.clone(), max)?;
            }
            ctx.push_value(Value::Number(args.len() as f64), max)?;
            ctx.push_value(Value::Label(HOST_RETURN), max)?;
            self.enter_function(ctx, function, args.len())?;
        }

        loop {
            let returned = Rc::ptr_eq(&self.current, origin)
                && origin.state.borrow().context.ip == HOST_RETURN;
            if returned {
                break;
            }
            self.step()?;
        }

        origin.state.borrow_mut().context.pop_value()
    }

    /// Drop everything a failed host call left behind. Coroutines it
    /// resumed are dead and `origin` is put back as it was before the call.
    fn abandon_host_call(&mut self, origin: &Rc<CoroutineHandle>, saved: &HostFrame) {
        let mut handle = self.current.clone();
        while !Rc::ptr_eq(&handle, origin) {
            let Ok(mut state) = handle.state.try_borrow_mut() else {
                break;
            };
            let global = state.context.global;
            self.release_frames(&state.context, 0, global);
            state.context.scope = global;
            state.context.stack.clear();
            state.terminated = true;
            let resumer = state.resumer.take();
            drop(state);
            debug!(name = %handle.name, "coroutine abandoned by failed host call");
            match resumer {
                Some(resumer) => handle = resumer,
                None => break,
            }
        }

        if let Ok(mut state) = origin.state.try_borrow_mut() {
            let ctx = &mut state.context;
            self.release_frames(ctx, saved.height, saved.scope);
            ctx.stack.truncate(saved.height);
            ctx.ip = saved.ip;
            ctx.bp = saved.bp;
            ctx.scope = saved.scope;
            ctx.depth = saved.depth;
        }
        self.current = origin.clone();
    }

    /// Release the active scope chain of `ctx` and of every call frame
    /// above `floor`, leaving `keep` alive
    fn release_frames(&mut self, ctx: &Context, floor: usize, keep: ScopeId) {
        if ctx.scope != keep {
            self.scopes.release_until(ctx.scope, ctx.global);
        }
        for cell in ctx.stack.iter().skip(floor) {
            if let Value::Scope(scope) = *cell.borrow() {
                if scope != keep {
                    self.scopes.release_until(scope, ctx.global);
                }
            }
        }
    }

    // ==================== Introspection ====================

    pub fn chunk(&self) -> &Chunk {
        &self.chunk
    }

    pub fn scopes(&self) -> &ScopeArena {
        &self.scopes
    }

    pub fn global_scope(&self) -> ScopeId {
        self.global
    }

    /// Next instruction address of the running coroutine
    pub fn ip(&self) -> usize {
        self.current.state.borrow().context.ip
    }

    pub fn current_name(&self) -> Rc<str> {
        self.current.name.clone()
    }

    pub fn is_main_current(&self) -> bool {
        Rc::ptr_eq(&self.current, &self.main)
    }

    /// Next instruction address of main
    pub fn main_ip(&self) -> usize {
        self.main.state.borrow().context.ip
    }

    /// Operand stack height of main
    pub fn main_stack_len(&self) -> usize {
        self.main.state.borrow().context.stack.len()
    }

    /// Operand stack of the running coroutine, bottom first
    pub fn stack_values(&self) -> Vec<Value> {
        self.current
            .state
            .borrow()
            .context
            .stack
            .iter()
            .map(|c| c.borrow().clone())
            .collect()
    }

    /// Variable visible from the running coroutine's scope
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let scope = self.current.state.borrow().context.scope;
        self.scopes.lookup(scope, name).map(|c| c.borrow().clone())
    }

    /// Scope chain of the running coroutine, innermost first
    pub fn scope_chain(&self) -> Vec<(ScopeId, Vec<(Rc<str>, Value)>)> {
        let mut chain = Vec::new();
        let mut current = Some(self.current.state.borrow().context.scope);
        while let Some(scope) = current {
            let bindings = self
                .scopes
                .bindings(scope)
                .into_iter()
                .map(|(name, cell)| (name, cell.borrow().clone()))
                .collect();
            chain.push((scope, bindings));
            current = self.scopes.parent(scope);
        }
        chain
    }

    /// Call frames of the running coroutine, innermost first
    pub fn backtrace(&self) -> Vec<StackFrame> {
        let ip = self.ip();
        self.backtrace_of(&self.chunk, &self.current, ip)
    }

    fn backtrace_of(&self, chunk: &Chunk, handle: &CoroutineHandle, ip: usize) -> Vec<StackFrame> {
        let Ok(state) = handle.state.try_borrow() else {
            return Vec::new();
        };
        let ctx = &state.context;
        let mut frames = Vec::new();
        let mut location = ip;
        let mut bp = ctx.bp;

        loop {
            while is_iteration_frame_at(ctx, bp) {
                match ctx.slot(bp - 1).and_then(|v| as_label(&v)) {
                    Ok(saved) if saved < bp => bp = saved,
                    _ => return frames,
                }
            }

            let span = chunk.get_span(location);
            let is_call_frame =
                bp >= CALL_FRAME_SLOTS && matches!(ctx.slot(bp - 2), Ok(Value::Scope(_)));
            if !is_call_frame {
                let name = if std::ptr::eq(handle, &*self.main) {
                    "<script>".to_string()
                } else {
                    handle.name.to_string()
                };
                frames.push(StackFrame::new(name, &self.file, span.start.line, span.start.column));
                return frames;
            }

            let argc = ctx.slot(bp - 4).and_then(|v| as_count(&v)).unwrap_or(0);
            let name = match bp
                .checked_sub(CALL_FRAME_SLOTS + argc)
                .map(|i| ctx.slot(i))
            {
                Some(Ok(Value::Function(f))) => f.name.to_string(),
                _ => "<unknown>".to_string(),
            };
            frames.push(StackFrame::new(name, &self.file, span.start.line, span.start.column));

            let ret = ctx.slot(bp - 3).and_then(|v| as_label(&v));
            let saved = ctx.slot(bp - 1).and_then(|v| as_label(&v));
            match (ret, saved) {
                (Ok(HOST_RETURN), _) => {
                    frames.push(StackFrame::new("<host>", &self.file, 0, 0));
                    return frames;
                }
                (Ok(ret), Ok(saved)) if saved < bp => {
                    location = ret.saturating_sub(1);
                    bp = saved;
                }
                _ => return frames,
            }
        }
    }

    /// Attach the failing instruction's location and a backtrace
    fn decorate(&self, error: ToyError, chunk: &Chunk, handle: &CoroutineHandle, ip: usize) -> ToyError {
        if !error.stack_trace.is_empty() {
            return error;
        }
        let mut error = if error.is_located() {
            error
        } else {
            error.locate(chunk.get_span(ip), &self.file)
        };
        if !self.source.is_empty() {
            error = error.with_source(&self.source);
        }
        let trace = self.backtrace_of(chunk, handle, ip);
        error.with_stack_trace(trace)
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

// ==================== Frame helpers ====================

/// Pop two operands, push `op(a, b)` in a fresh cell
fn binary(
    ctx: &mut Context,
    max: usize,
    op: impl FnOnce(&Value, &Value) -> ToyResult<Value>,
) -> ToyResult<()> {
    let b = ctx.pop_value()?;
    let a = ctx.pop_value()?;
    ctx.push_value(op(&a, &b)?, max)
}

fn as_label(value: &Value) -> ToyResult<usize> {
    match value {
        Value::Label(at) => Ok(*at),
        other => Err(ToyError::protocol(format!(
            "Expected a label in the frame, found {}",
            other.type_name()
        ))),
    }
}

fn as_count(value: &Value) -> ToyResult<usize> {
    match value {
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 => Ok(*n as usize),
        other => Err(ToyError::protocol(format!(
            "Expected an argument count in the frame, found {}",
            other.type_name()
        ))),
    }
}

fn is_iteration_frame_at(ctx: &Context, bp: usize) -> bool {
    bp >= ITER_FRAME_SLOTS
        && ctx
            .stack
            .get(bp - 2)
            .map(|c| matches!(*c.borrow(), Value::Iterator(_)))
            .unwrap_or(false)
}

fn is_iteration_frame(ctx: &Context) -> bool {
    is_iteration_frame_at(ctx, ctx.bp)
}

/// Drop the innermost iteration frame and restore the outer BP
fn unwind_iteration(ctx: &mut Context) -> ToyResult<()> {
    if !is_iteration_frame(ctx) {
        return Err(ToyError::protocol("No iteration frame to unwind"));
    }
    let bp = ctx.bp;
    let saved = as_label(&ctx.slot(bp - 1)?)?;
    ctx.stack.truncate(bp - ITER_FRAME_SLOTS);
    ctx.bp = saved;
    Ok(())
}

/// Registers of a context saved across a host call
struct HostFrame {
    height: usize,
    ip: usize,
    bp: usize,
    scope: ScopeId,
    depth: usize,
}

impl HostFrame {
    fn of(ctx: &Context) -> Self {
        Self {
            height: ctx.stack.len(),
            ip: ctx.ip,
            bp: ctx.bp,
            scope: ctx.scope,
            depth: ctx.depth,
        }
    }
}

/// Arguments of the innermost script call frame
fn frame_args(ctx: &Context) -> ToyResult<Vec<Value>> {
    let bp = ctx.bp;
    if bp < CALL_FRAME_SLOTS {
        return Err(ToyError::protocol("Builtin executed outside of a call frame"));
    }
    let argc = as_count(&ctx.slot(bp - 4)?)?;
    let start = (bp - 4)
        .checked_sub(argc)
        .ok_or_else(|| ToyError::protocol("Call frame is missing its arguments"))?;
    (start..bp - 4).map(|i| ctx.slot(i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::compiler::Compiler;
    use crate::lexer::Scanner;
    use crate::parser::Parser;
    use crate::vm::SharedBuffer;

    fn vm_for(source: &str) -> (Vm, SharedBuffer) {
        let tokens = Scanner::new(source, "test").scan_tokens().unwrap();
        let program = Parser::new(tokens, "test", source).parse().unwrap();
        let chunk = Compiler::new("test", source).compile(&program).unwrap();
        let out = SharedBuffer::new();
        let mut vm = Vm::new().with_output(out.clone());
        vm.load(chunk, "test", source);
        (vm, out)
    }

    fn run(source: &str) -> String {
        let (mut vm, out) = vm_for(source);
        vm.run().unwrap();
        out.contents()
    }

    fn run_err(source: &str) -> ToyError {
        let (mut vm, _) = vm_for(source);
        vm.run().unwrap_err()
    }

    #[test]
    fn test_fresh_vm_binds_every_builtin() {
        let mut vm = Vm::new();
        for (name, _) in builtins::NATIVES {
            assert!(matches!(vm.global(name), Some(Value::Native(_))), "{} missing", name);
        }
        let err = vm.register_native("push", |_: &mut NativeCall| Ok(0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DuplicateBinding);
    }

    #[test]
    fn test_print_is_variadic() {
        assert_eq!(run("print(1, \"a\", true, null);"), "1\ta\ttrue\tnull\n");
        assert_eq!(run("print();"), "\n");
    }

    #[test]
    fn test_call_returns_one_value_and_balances() {
        let (mut vm, out) = vm_for("function add(a, b) { return a + b; } print(add(2, 3));");
        vm.run().unwrap();
        assert_eq!(out.contents(), "5\n");
        assert_eq!(vm.main_stack_len(), 0);
    }

    #[test]
    fn test_missing_params_bind_null_and_extras_are_ignored() {
        assert_eq!(
            run("function f(a, b) { print(a, b); } f(1); f(1, 2, 3);"),
            "1\tnull\n1\t2\n"
        );
    }

    #[test]
    fn test_params_are_copies() {
        assert_eq!(
            run("var x = 1; function f(a) { a = 5; return a; } print(f(x), x);"),
            "5\t1\n"
        );
    }

    #[test]
    fn test_no_closures_over_caller_locals() {
        let err = run_err("function f() { return y; } function g() { var y = 1; return f(); } g();");
        assert_eq!(err.kind, ErrorKind::UndefinedVariable);
        assert_eq!(err.stack_trace[0].function_name, "f");
        assert_eq!(err.stack_trace[1].function_name, "g");
        assert_eq!(err.stack_trace[2].function_name, "<script>");
    }

    #[test]
    fn test_return_inside_for_in_unwinds() {
        let (mut vm, out) = vm_for(
            "function first(xs) { for (i, v in xs) { if (v > 1) return v; } return null; }
             print(first([1, 5, 7]));",
        );
        vm.run().unwrap();
        assert_eq!(out.contents(), "5\n");
        assert_eq!(vm.scopes().live(), 1);
    }

    #[test]
    fn test_index_rules() {
        assert_eq!(run("var a = [1, 2]; print(a[5], a[1.5], \"hey\"[1]);"), "null\tnull\te\n");
        assert_eq!(run_err("var o = {a = 1}; print(o.b);").kind, ErrorKind::UndefinedVariable);
        assert_eq!(run_err("var o = {a = 1, a = 2};").kind, ErrorKind::DuplicateBinding);
    }

    #[test]
    fn test_element_assignment_aliases() {
        assert_eq!(
            run("var a = [1, 2]; var b = a; b[0] = 9; var o = {n = 1}; o.n += 4; print(a, o.n);"),
            "[9, 2]\t5\n"
        );
    }

    #[test]
    fn test_stack_overflow_is_runtime_error() {
        let (vm, _) = vm_for("function f(n) { return f(n + 1); } f(0);");
        let mut vm = vm.with_config(VmConfig {
            max_call_depth: 50,
            ..VmConfig::default()
        });
        let err = vm.run().unwrap_err();
        assert_eq!(err.kind, ErrorKind::RuntimeError);
        assert_eq!(err.message, "Stack overflow");
    }

    #[test]
    fn test_calling_non_function() {
        let err = run_err("var x = 3; x();");
        assert_eq!(err.kind, ErrorKind::InvalidCall);
        assert_eq!(err.span.start.line, 1);
    }

    #[test]
    fn test_yield_in_main_is_error() {
        let err = run_err("yield(1);");
        assert_eq!(err.message, "yield outside of a coroutine");
    }

    #[test]
    fn test_host_call() {
        let (mut vm, _) = vm_for("function twice(x) { return x * 2; }");
        vm.run().unwrap();
        let result = vm.call("twice", &[Value::Number(21.0)]).unwrap();
        assert_eq!(result, Value::Number(42.0));
        assert_eq!(vm.main_stack_len(), 0);
    }

    #[test]
    fn test_append_keeps_bindings() {
        let (mut vm, out) = vm_for("var x = 40;");
        vm.run().unwrap();
        let source = "print(x + 2);";
        let tokens = Scanner::new(source, "repl").scan_tokens().unwrap();
        let program = Parser::new(tokens, "repl", source).parse().unwrap();
        let chunk = Compiler::continuing("repl", source, vm.code_end())
            .compile(&program)
            .unwrap();
        vm.append(chunk, source).unwrap();
        vm.run().unwrap();
        assert_eq!(out.contents(), "42\n");
    }
}
