//! A bytecode interpreter for the Hollicode narrative scripting language.
//!
//! Hollicode scripts are compiled to bytecode by an external compiler;
//! this crate executes that bytecode. The interpreter is a small
//! stack-based virtual machine that drives interactive-fiction
//! presentation: it emits lines of text, presents choices, suspends for
//! player input, and resumes in a chosen branch. Everything
//! presentation-related happens in host code through callbacks; the
//! interpreter draws nothing and reads no input itself.
//!
//! # Features
//!
//! - **Two bytecode formats**: line-oriented text (`.hlct`) and JSON
//!   (`.hlcj`), sharing a header schema
//! - **Cooperative execution**: `run` executes until the script waits for
//!   input or finishes; the host resumes it at will
//! - **Choice handling**: pending options are recorded in emission order
//!   and selected by index
//! - **Host interface**: named variables, registered Rust functions, and
//!   four optional callbacks (`echo`, `option`, `wait`, `functionCall`)
//! - **Tolerant loading**: unknown opcodes and bytecode versions are
//!   warnings, so partially incompatible scripts still run
//!
//! # Quick Start
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use hollicode::Interpreter;
//!
//! let mut interpreter = Interpreter::new();
//! interpreter
//!     .load_text(concat!(
//!         "{\"bytecodeVersion\":\"0.1.0\"}\n",
//!         "STR You step into the clearing.\n",
//!         "ECHO\n",
//!         "WAIT\n",
//!     ))
//!     .unwrap();
//!
//! let lines = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&lines);
//! interpreter.on_echo(move |_, value| sink.lock().unwrap().push(value.to_string()));
//!
//! // Runs until the WAIT, emitting one line through the echo callback.
//! interpreter.run().unwrap();
//! assert_eq!(
//!     lines.lock().unwrap().as_slice(),
//!     ["You step into the clearing."]
//! );
//! ```
//!
//! # Execution model
//!
//! One interpreter executes one program, serially, on one thread. There
//! are exactly two suspension points: the `WAIT` instruction and the end
//! of the program (plus, optionally, every function call; see
//! [`Interpreter::set_yield_at_function_call`]). Callbacks run
//! synchronously inside instruction handlers and must not re-enter
//! [`run`](Interpreter::run); they may freely push values, mutate
//! variables, or [`request_yield`](Interpreter::request_yield).
//!
//! Between runs the host selects a pending choice with
//! [`go_to_option`](Interpreter::go_to_option), then calls `run` again to
//! execute the chosen branch.
//!
//! # Not supported
//!
//! - Sandboxed isolation from host code
//! - Parallel or preemptive script execution
//! - Compiling Hollicode source (this crate only consumes bytecode)

mod bytecode;
mod callback;
mod diagnostic;
mod error;
mod loader;
mod operators;
mod value;
mod vm;

pub use bytecode::{BinOp, COMPATIBLE_VERSIONS, Header, Op, Program};
pub use callback::{Callbacks, EchoFn, FunctionCallFn, OptionFn, WaitFn};
pub use diagnostic::{Diagnostic, SourceLine};
pub use error::{Error, Result};
pub use loader::{Format, Loader};
pub use value::{HostFn, Value};
pub use vm::{Interpreter, OptionRecord};
