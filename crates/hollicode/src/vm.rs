//! The stack-based virtual machine.
//!
//! This module executes [`Program`]s produced by the loader. All runtime
//! state lives here: the operand stack, the traceback stack, the pending
//! option registry, variables, and the instruction pointer.
//!
//! Execution is single-threaded and cooperative: `run` dispatches one
//! instruction at a time until the yield flag is set, either explicitly by
//! `WAIT`, implicitly by running off the end of the program, or by the host
//! from inside a callback. Handlers advance the instruction pointer
//! themselves; the loop never auto-advances.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::bytecode::{Op, Program};
use crate::callback::Callbacks;
use crate::diagnostic::Diagnostic;
use crate::error::{Error, Result};
use crate::loader::{Format, Loader};
use crate::operators::apply_binop;
use crate::value::{HostFn, Value};

/// A pending choice recorded by `OPT`, awaiting host selection.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionRecord {
    /// Instruction index of the `OPT` that recorded this option.
    pub ip: usize,
    /// The option's arguments, in pop order (first popped is index 0).
    pub args: Vec<Value>,
}

/// The Hollicode bytecode interpreter.
///
/// A fresh interpreter is empty; load a single program into it with
/// [`load_file`](Interpreter::load_file), [`load`](Interpreter::load), or
/// the format-specific variants. Variables, host functions, callbacks, and
/// policy flags may be set any time between construction and the first
/// [`run`](Interpreter::run); between runs the host may also
/// [`push`](Interpreter::push) values or select a pending option with
/// [`go_to_option`](Interpreter::go_to_option).
///
/// # Example
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use hollicode::Interpreter;
///
/// let mut interpreter = Interpreter::new();
/// interpreter
///     .load_text("{\"bytecodeVersion\":\"0.1.0\"}\nSTR Hello, world!\nECHO\n")
///     .unwrap();
///
/// let lines = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&lines);
/// interpreter.on_echo(move |_, value| sink.lock().unwrap().push(value.to_string()));
///
/// interpreter.run().unwrap();
/// assert_eq!(lines.lock().unwrap().as_slice(), ["Hello, world!"]);
/// ```
#[derive(Clone, Default)]
pub struct Interpreter {
    program: Program,
    /// Index of the next instruction to dispatch. `instructions.len()`
    /// means the program has finished.
    ip: usize,
    /// The operand stack.
    stack: Vec<Value>,
    /// Saved instruction indices for subroutine return.
    traceback: Vec<usize>,
    /// Pending options, in emission order.
    options: Vec<OptionRecord>,
    /// Named variables readable by `GETV`, writable by the host.
    variables: HashMap<String, Value>,
    /// Host functions reachable through `GETV` when no variable shadows
    /// the name.
    functions: HashMap<String, HostFn>,
    /// The four optional host hooks.
    pub callbacks: Callbacks,
    yielded: bool,
    yield_at_function_call: bool,
    ignore_text_bytecode_header: bool,
    instruction_limit: Option<u64>,
    instruction_count: u64,
    warnings: Vec<Diagnostic>,
}

impl Interpreter {
    /// Create a new, empty interpreter.
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Host configuration
    // -----------------------------------------------------------------------

    /// Set a variable visible to `GETV`.
    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Look up a variable by name.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Mutable access to the whole variable table.
    pub fn variables_mut(&mut self) -> &mut HashMap<String, Value> {
        &mut self.variables
    }

    /// Register a host function callable from bytecode.
    ///
    /// `GETV name` resolves to the function when no variable shadows it,
    /// and `CALL` invokes it, pushing its return value.
    ///
    /// # Example
    ///
    /// ```
    /// use hollicode::{Interpreter, Value};
    ///
    /// let mut interpreter = Interpreter::new();
    /// interpreter.register_function("roll", |_args| Value::Number(4.0));
    /// interpreter
    ///     .load_text("{\"bytecodeVersion\":\"0.1.0\"}\nGETV roll\nCALL 0\n")
    ///     .unwrap();
    ///
    /// interpreter.run().unwrap();
    /// assert_eq!(interpreter.stack(), &[Value::Number(4.0)]);
    /// ```
    pub fn register_function<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(Vec<Value>) -> Value + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(f));
    }

    /// Set the `echo` callback, invoked with the value popped by `ECHO`.
    pub fn on_echo<F>(&mut self, f: F)
    where
        F: Fn(&mut Interpreter, Value) + Send + Sync + 'static,
    {
        self.callbacks.echo = Some(Arc::new(f));
    }

    /// Set the `option` callback, invoked with each recorded option's
    /// arguments.
    pub fn on_option<F>(&mut self, f: F)
    where
        F: Fn(&mut Interpreter, Vec<Value>) + Send + Sync + 'static,
    {
        self.callbacks.option = Some(Arc::new(f));
    }

    /// Set the `wait` callback, invoked when `WAIT` suspends execution.
    pub fn on_wait<F>(&mut self, f: F)
    where
        F: Fn(&mut Interpreter) + Send + Sync + 'static,
    {
        self.callbacks.wait = Some(Arc::new(f));
    }

    /// Set the `functionCall` callback. When present it replaces direct
    /// invocation: `CALL` hands it the popped method value and arguments
    /// instead of calling a [`Value::Function`] itself.
    pub fn on_function_call<F>(&mut self, f: F)
    where
        F: Fn(&mut Interpreter, Value, Vec<Value>) + Send + Sync + 'static,
    {
        self.callbacks.function_call = Some(Arc::new(f));
    }

    /// When set, every `CALL` suspends execution after being handled.
    pub fn set_yield_at_function_call(&mut self, yield_at_function_call: bool) {
        self.yield_at_function_call = yield_at_function_call;
    }

    /// When set, the text loader consumes the header line without parsing
    /// or validating it.
    pub fn set_ignore_text_bytecode_header(&mut self, ignore: bool) {
        self.ignore_text_bytecode_header = ignore;
    }

    /// Cap the number of instructions a single [`run`](Interpreter::run)
    /// may dispatch. `None` (the default) is unlimited. Exceeding the
    /// budget fails the run with [`Error::InstructionLimitExceeded`].
    pub fn set_instruction_limit(&mut self, limit: Option<u64>) {
        self.instruction_limit = limit;
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Load a bytecode file, inferring the format from its extension
    /// (`.hlcj` is structured, anything else is text).
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        self.load(&source, Format::from_path(path))
    }

    /// Load bytecode in the given format.
    pub fn load(&mut self, source: &str, format: Format) -> Result<()> {
        let mut loader = Loader::new();
        loader.ignore_text_header = self.ignore_text_bytecode_header;
        let result = loader.load(source, format);
        self.warnings.extend(loader.take_warnings());
        self.program = result?;
        self.reset();
        Ok(())
    }

    /// Load text-format bytecode.
    pub fn load_text(&mut self, source: &str) -> Result<()> {
        self.load(source, Format::Text)
    }

    /// Load structured-format bytecode.
    pub fn load_structured(&mut self, source: &str) -> Result<()> {
        self.load(source, Format::Structured)
    }

    /// Discard execution state, keeping the program and host configuration.
    fn reset(&mut self) {
        self.ip = 0;
        self.stack.clear();
        self.traceback.clear();
        self.options.clear();
        self.yielded = false;
        self.instruction_count = 0;
    }

    // -----------------------------------------------------------------------
    // Stack
    // -----------------------------------------------------------------------

    /// Push a value onto the operand stack. Hosts use this to seed
    /// arguments before `run`, or to supply a result from inside a
    /// `functionCall` callback.
    pub fn push(&mut self, value: impl Into<Value>) {
        self.stack.push(value.into());
    }

    /// Pop the top of the operand stack.
    ///
    /// Popping an empty stack is not fatal (host code may probe), but it
    /// records a warning and returns [`Value::Nil`].
    pub fn pop(&mut self) -> Value {
        match self.stack.pop() {
            Some(value) => value,
            None => {
                self.warn(Diagnostic::new("popped an empty operand stack"));
                Value::Nil
            }
        }
    }

    /// The top of the operand stack without removing it, or nil when the
    /// stack is empty.
    pub fn peek(&self) -> Value {
        self.stack.last().cloned().unwrap_or(Value::Nil)
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Execute until the interpreter yields.
    ///
    /// The yield flag is cleared on entry, so calling `run` again after a
    /// `WAIT` resumes where the script left off. Errors raised by handlers
    /// or callbacks propagate unchanged; on propagation the interpreter
    /// state is left as-is and [`ip`](Interpreter::ip) points at the
    /// failing instruction's successor-to-be for diagnostics.
    pub fn run(&mut self) -> Result<()> {
        self.yielded = false;
        self.instruction_count = 0;
        while !self.yielded {
            self.step()?;
        }
        Ok(())
    }

    /// Dispatch a single instruction.
    ///
    /// Running past the end of the program sets the yield flag instead of
    /// failing; a zero-instruction program yields immediately.
    pub fn step(&mut self) -> Result<()> {
        if self.ip >= self.program.instructions.len() {
            self.yielded = true;
            return Ok(());
        }

        self.instruction_count += 1;
        if let Some(limit) = self.instruction_limit
            && self.instruction_count > limit
        {
            return Err(Error::InstructionLimitExceeded(limit));
        }

        let op = self.program.instructions[self.ip].clone();
        self.exec(op)
    }

    /// Set `ip` relative to the current instruction. A target before the
    /// start of the program is fatal; a target past the end is fine and
    /// yields on the next dispatch.
    fn jump(&mut self, distance: i64) -> Result<()> {
        let target = self.ip as i64 + distance;
        if target < 0 {
            return Err(Error::InstructionPointerOutOfRange { target });
        }
        self.ip = target as usize;
        Ok(())
    }

    fn exec(&mut self, op: Op) -> Result<()> {
        match op {
            // --- Control flow ---
            Op::Return => match self.traceback.pop() {
                Some(saved) => {
                    // Resume just past the saved position; TJMP and
                    // go_to_option both save the index they were at.
                    self.ip = saved + 1;
                    if self.ip >= self.program.instructions.len() {
                        self.yielded = true;
                    }
                }
                None => self.yielded = true,
            },
            Op::Jump(distance) => self.jump(distance)?,
            Op::JumpIfFalse(distance) => {
                if self.peek().is_truthy() {
                    self.ip += 1;
                } else {
                    self.jump(distance)?;
                }
            }
            Op::TracedJump(distance) => {
                self.traceback.push(self.ip);
                self.jump(distance)?;
            }

            // --- Stack ---
            Op::Pop => {
                self.pop();
                self.ip += 1;
            }
            Op::PushString(s) => {
                self.stack.push(Value::String(s));
                self.ip += 1;
            }
            Op::PushNumber(n) => {
                self.stack.push(Value::Number(n));
                self.ip += 1;
            }
            Op::PushBool(b) => {
                self.stack.push(Value::Bool(b));
                self.ip += 1;
            }
            Op::PushNil => {
                self.stack.push(Value::Nil);
                self.ip += 1;
            }

            // --- Values ---
            Op::GetVariable(name) => {
                let value = if let Some(value) = self.variables.get(&name) {
                    value.clone()
                } else if let Some(f) = self.functions.get(&name) {
                    Value::Function(f.clone())
                } else {
                    Value::Nil
                };
                self.stack.push(value);
                self.ip += 1;
            }
            Op::Lookup => {
                let parent = self.pop();
                let child = self.pop();
                let value = match (&parent, &child) {
                    (Value::Object(fields), Value::String(key)) => {
                        fields.get(key).cloned().unwrap_or(Value::Nil)
                    }
                    (Value::Object(_), _) => {
                        return Err(Error::Type {
                            expected: "a string key".to_string(),
                            got: child.type_name().to_string(),
                        });
                    }
                    _ => {
                        return Err(Error::Type {
                            expected: "an object".to_string(),
                            got: parent.type_name().to_string(),
                        });
                    }
                };
                self.stack.push(value);
                self.ip += 1;
            }
            Op::Not => {
                let value = self.pop();
                self.stack.push(Value::Bool(!value.is_truthy()));
                self.ip += 1;
            }
            Op::Negate => {
                let value = self.pop();
                match value {
                    Value::Number(n) => self.stack.push(Value::Number(-n)),
                    other => {
                        return Err(Error::Type {
                            expected: "a number".to_string(),
                            got: other.type_name().to_string(),
                        });
                    }
                }
                self.ip += 1;
            }
            Op::BinaryOp(binop) => {
                let left = self.pop();
                let right = self.pop();
                let result = apply_binop(binop, &left, &right)?;
                self.stack.push(result);
                self.ip += 1;
            }

            // --- Host interface ---
            Op::Call(count) => {
                let method = self.pop();
                let mut args = Vec::with_capacity(count);
                for _ in 0..count {
                    args.push(self.pop());
                }
                if self.yield_at_function_call {
                    self.yielded = true;
                }
                match self.callbacks.function_call.clone() {
                    Some(callback) => callback(self, method, args),
                    None => match method {
                        Value::Function(f) => {
                            let result = f(args);
                            self.stack.push(result);
                        }
                        Value::Nil => return Err(Error::CalledNil),
                        other => {
                            return Err(Error::NotCallable {
                                type_name: other.type_name(),
                            });
                        }
                    },
                }
                self.ip += 1;
            }
            Op::Echo => {
                let value = self.pop();
                if let Some(callback) = self.callbacks.echo.clone() {
                    callback(self, value);
                }
                self.ip += 1;
            }
            Op::Option(count) => {
                let mut args = Vec::with_capacity(count);
                for _ in 0..count {
                    args.push(self.pop());
                }
                self.options.push(OptionRecord {
                    ip: self.ip,
                    args: args.clone(),
                });
                if let Some(callback) = self.callbacks.option.clone() {
                    callback(self, args);
                }
                self.ip += 1;
            }
            Op::Wait => {
                self.yielded = true;
                if let Some(callback) = self.callbacks.wait.clone() {
                    callback(self);
                }
                self.ip += 1;
            }
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Options and resumption
    // -----------------------------------------------------------------------

    /// Jump into the body of a pending option and clear the registry.
    ///
    /// `index` is 1-based, matching the emission order of the `option`
    /// callback. The current instruction pointer is saved on the traceback
    /// so the option body's `RET` resumes where execution stopped; the
    /// target skips past the `OPT` and the guard `JMP` the compiler emits
    /// immediately after it. Call [`run`](Interpreter::run) afterwards to
    /// resume execution.
    ///
    /// # Example
    ///
    /// ```
    /// use hollicode::Interpreter;
    ///
    /// let mut interpreter = Interpreter::new();
    /// interpreter
    ///     .load_text(concat!(
    ///         "{\"bytecodeVersion\":\"0.1.0\"}\n",
    ///         "STR Go left\n",
    ///         "OPT 1\n",
    ///         "JMP 3\n",
    ///         "STR You went left.\n",
    ///         "ECHO\n",
    ///         "RET\n",
    ///         "WAIT\n",
    ///     ))
    ///     .unwrap();
    ///
    /// interpreter.run().unwrap();
    /// assert_eq!(interpreter.options().len(), 1);
    ///
    /// interpreter.go_to_option(1).unwrap();
    /// interpreter.run().unwrap();
    /// assert!(interpreter.options().is_empty());
    /// ```
    pub fn go_to_option(&mut self, index: usize) -> Result<()> {
        if index < 1 || index > self.options.len() {
            return Err(Error::OptionOutOfRange {
                index,
                available: self.options.len(),
            });
        }
        let target = self.options[index - 1].ip + 2;
        self.traceback.push(self.ip);
        self.ip = target;
        self.options.clear();
        Ok(())
    }

    /// Request a yield: `run` returns after the current handler finishes.
    /// Callable from inside a callback to pause or cancel execution.
    pub fn request_yield(&mut self) {
        self.yielded = true;
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Whether the interpreter is currently yielded to the host.
    pub fn yielded(&self) -> bool {
        self.yielded
    }

    /// The instruction pointer: the index of the next instruction to
    /// dispatch. Useful for diagnostics after an error.
    pub fn ip(&self) -> usize {
        self.ip
    }

    /// The operand stack, bottom first.
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    /// Pending options, in emission order. `go_to_option` takes the
    /// 1-based position in this slice.
    pub fn options(&self) -> &[OptionRecord] {
        &self.options
    }

    /// The loaded program.
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Warnings accumulated by loading and execution.
    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    /// Drain the accumulated warnings.
    pub fn take_warnings(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.warnings)
    }

    fn warn(&mut self, diagnostic: Diagnostic) {
        log::warn!("{}", diagnostic);
        self.warnings.push(diagnostic);
    }
}
