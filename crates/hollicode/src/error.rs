//! Error types for loading and executing bytecode.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while loading or running a script.
///
/// Loader errors are fatal to the load call; execution errors are fatal to
/// the current `run`. Recoverable conditions (unknown opcodes at load time,
/// popping an empty stack, unknown bytecode versions) are not errors; they
/// are reported as [`Diagnostic`](crate::Diagnostic) warnings instead.
#[derive(Debug, Error)]
pub enum Error {
    // --- Load errors ---
    /// The bytecode file could not be read.
    #[error("failed to read bytecode: {0}")]
    Io(#[from] std::io::Error),

    /// Structured bytecode that is not well-formed JSON.
    #[error("malformed structured bytecode: {0}")]
    MalformedStructured(#[from] serde_json::Error),

    /// The header is absent, or carries no `bytecodeVersion` string.
    #[error("bytecode header is missing or malformed")]
    MissingHeader,

    /// Structured bytecode without an `instructions` array.
    #[error("bytecode has no instructions array")]
    MissingInstructions,

    /// A structured instruction element that is neither an opcode string
    /// nor an `[opcode, operand]` pair.
    #[error("instruction {index} is neither an opcode string nor an [opcode, operand] pair")]
    MalformedElement { index: usize },

    /// An opcode that requires an operand appeared without one.
    #[error("missing operand for {opcode} on line {line}")]
    MissingOperand { opcode: String, line: usize },

    /// An operand that cannot be parsed for its opcode.
    #[error("invalid operand for {opcode} on line {line}: `{operand}`")]
    InvalidOperand {
        opcode: String,
        operand: String,
        line: usize,
    },

    // --- Execution errors ---
    /// A jump whose target would land before the start of the program.
    #[error("jump target out of range: instruction pointer would be {target}")]
    InstructionPointerOutOfRange { target: i64 },

    /// `CALL` popped a nil method and no `functionCall` callback is set.
    #[error("attempted to call a nil value")]
    CalledNil,

    /// `CALL` popped something that is neither a function nor nil.
    #[error("cannot call a value of type {type_name}")]
    NotCallable { type_name: &'static str },

    /// `goToOption` with an index outside the pending option registry.
    #[error("option index {index} out of range (1..={available})")]
    OptionOutOfRange { index: usize, available: usize },

    /// An operator applied to values it is not defined over.
    #[error("type mismatch: expected {expected}, got {got}")]
    Type { expected: String, got: String },

    /// The host-configured instruction budget was exhausted.
    #[error("instruction limit of {0} exceeded")]
    InstructionLimitExceeded(u64),
}
