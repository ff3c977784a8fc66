//! This module contains the error type that pertains to the decoding of method
//! code into an [`crate::disassembly::InstructionTable`].

use thiserror::Error;

use crate::error::container::{self, Location};

/// Errors that occur while decoding the code of a method.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("Code cannot be empty")]
    EmptyCode,

    #[error("{_0:#04x} is not a valid opcode")]
    InvalidOpcode(u8),

    #[error("The `{_0}` instruction is not supported")]
    UnsupportedInstruction(&'static str),

    #[error("The operands of `{_0}` run past the end of the code")]
    TruncatedOperands(&'static str),

    #[error("{_0:#04x} cannot be modified by `wide`")]
    InvalidWideTarget(u8),

    #[error("Switch has invalid bounds low {low:?} and high {high:?}")]
    InvalidSwitchBounds { low: i32, high: i32 },

    #[error("Switch has a negative number of pairs {_0:?}")]
    InvalidSwitchPairs(i32),

    #[error("The provided hexadecimal input had an odd length")]
    InvalidHexLength,

    #[error("Encountered invalid hex char {_0:?} at index {_1:?}")]
    InvalidHexCharacter(char, usize),

    #[error("The length of the code exceeded {}", u32::MAX)]
    CodeTooLarge,
}

/// A disassembly error with an associated location in the code.
pub type LocatedError = container::Located<Error>;

/// The result type for functions that may return disassembly errors.
pub type Result<T> = std::result::Result<T, LocatedError>;

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
