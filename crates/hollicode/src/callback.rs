//! Host callback hooks.
//!
//! The interpreter is presentation-agnostic: emitting a line of text,
//! showing a choice, or pausing for input all surface as callbacks the
//! host populates before `run`. Every callback is synchronous and runs to
//! completion before the interpreter advances; host code must not re-enter
//! `run` from inside one. A callback receives the interpreter mutably so
//! it can push values, mutate variables, or request a yield.

use std::sync::Arc;

use crate::value::Value;
use crate::vm::Interpreter;

/// Invoked by `ECHO` with the popped value.
pub type EchoFn = Arc<dyn Fn(&mut Interpreter, Value) + Send + Sync>;

/// Invoked by `OPT` with the option's arguments, in pop order.
pub type OptionFn = Arc<dyn Fn(&mut Interpreter, Vec<Value>) + Send + Sync>;

/// Invoked by `WAIT` after the yield flag is set.
pub type WaitFn = Arc<dyn Fn(&mut Interpreter) + Send + Sync>;

/// Invoked by `CALL` with the popped method value and arguments. When set,
/// it replaces direct invocation entirely; push a result through the
/// interpreter if the script expects one.
pub type FunctionCallFn = Arc<dyn Fn(&mut Interpreter, Value, Vec<Value>) + Send + Sync>;

/// The four optional host hooks.
///
/// Absent callbacks are silently skipped, with one exception: `CALL` with
/// no `function_call` callback and a nil method is fatal.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub echo: Option<EchoFn>,
    pub option: Option<OptionFn>,
    pub wait: Option<WaitFn>,
    pub function_call: Option<FunctionCallFn>,
}
