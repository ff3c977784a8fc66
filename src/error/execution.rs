//! This module contains errors pertaining to the execution of guest bytecode.
//!
//! Every error in here is engine-fatal: the virtual machine cannot continue
//! once one of them occurs. Faults the guest program can observe (and catch)
//! are modelled as guest exceptions instead.

use thiserror::Error;

use crate::error::container::{self, Location};

/// Errors that occur during the execution of bytecode by the
/// [`crate::vm::VirtualMachine`].
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("Instruction pointer {requested:?} is out of bounds in code of length {available:?}")]
    InstructionPointerOutOfBounds { requested: usize, available: usize },

    #[error("The byte at {pc:?} is not the start of an instruction")]
    NotAnInstruction { pc: u32 },

    #[error("Tried to pop from an empty operand stack")]
    OperandStackUnderflow,

    #[error("Operand stack depth {requested:?} exceeds the method's maximum of {limit:?}")]
    OperandStackOverflow { requested: usize, limit: usize },

    #[error("The operand stack has no item at depth {depth:?}")]
    NoSuchOperand { depth: usize },

    #[error("Local variable index {index:?} is out of bounds for {available:?} locals")]
    LocalIndexOutOfBounds { index: usize, available: usize },

    #[error("Local variable {index:?} was read before being assigned")]
    UndefinedLocal { index: usize },

    #[error("Expected a value of type {expected} but found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Call depth exceeded the maximum of {limit:?} frames")]
    StackOverflow { limit: usize },

    #[error("Heap exhausted after allocating {limit:?} objects")]
    OutOfMemory { limit: usize },

    #[error("Invalid heap reference {reference:?}")]
    InvalidReference { reference: usize },

    #[error("Invocation of {method} requires {required:?} operands but only {available:?} are available")]
    InsufficientArguments {
        method:    String,
        required:  usize,
        available: usize,
    },

    #[error("No class named {name} could be resolved")]
    NoSuchClass { name: String },

    #[error("No method {class}.{name}{descriptor} could be resolved")]
    NoSuchMethod {
        class:      String,
        name:       String,
        descriptor: String,
    },

    #[error("No field {class}.{name} could be resolved")]
    NoSuchField { class: String, name: String },

    #[error("Method {method} has no code")]
    MissingCode { method: String },

    #[error("Malformed descriptor {descriptor:?}")]
    MalformedDescriptor { descriptor: String },

    #[error("Constant pool index {index:?} does not hold a {expected}")]
    InvalidConstant { index: u16, expected: String },

    #[error("Jump target {target:?} is outside of the method's code")]
    InvalidJumpTarget { target: i64 },

    #[error("The instruction {mnemonic} cannot be executed: {reason}")]
    MalformedInstruction { mnemonic: String, reason: String },

    #[error("The instruction {mnemonic} does not support the symbolic operand {term}")]
    UnsupportedSymbolicOperand { mnemonic: String, term: String },

    #[error("Array type code {code:?} is not valid")]
    InvalidArrayType { code: i32 },

    #[error("There is no current frame to execute")]
    NoCurrentFrame,

    #[error("A return value was found where a frame was expected on the call stack")]
    UnexpectedReturnValue,

    #[error("The entry point {method} received {provided:?} arguments but expects {expected:?}")]
    EntryArgumentMismatch {
        method:   String,
        expected: usize,
        provided: usize,
    },

    #[error("The solver could not restore its constraints: {reason}")]
    SolverFailed { reason: String },
}

/// An execution error with an associated location in the guest program.
pub type LocatedError = container::Located<Error>;

/// A container of execution errors used for aggregation of errors during
/// execution.
pub type Errors = container::Errors<LocatedError>;

/// The result type for methods that may have unlocated execution errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Make it possible to attach locations to these errors.
impl container::Locatable for Error {
    type Located = LocatedError;

    fn locate(self, location: impl Into<Location>) -> Self::Located {
        container::Located {
            location: location.into(),
            payload:  self,
        }
    }
}
