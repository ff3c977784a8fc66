//! This module contains the primary error type for the engine's interface. It
//! also re-exports the more specific error types that are subsystem-specific.

pub mod container;
pub mod disassembly;
pub mod execution;
pub mod solver;

use thiserror::Error;

use crate::error::container::Location;

/// The interface result type for the library.
///
/// Any function considered to be part of the public interface of the library
/// should return this result type. Subsystems return the more-specific child
/// error types as appropriate.
pub type Result<T> = std::result::Result<T, LocatedError>;

/// The interface error type for the library.
///
/// All errors returned from the library interface (and hence encountered by the
/// clients of the library) should be members of this enum.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// Errors that come from decoding method code.
    #[error(transparent)]
    Disassembly(#[from] disassembly::Error),

    /// Errors from the virtual machine subsystem of the library.
    #[error(transparent)]
    Execution(#[from] execution::Error),

    /// Errors reported by a constraint solver.
    #[error(transparent)]
    Solver(#[from] solver::Error),

    /// An unknown error, represented as a string.
    #[error("Unknown Error: {_0:?}")]
    Other(String),
}

impl Error {
    /// Constructs an unknown error with the provided `message`.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

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

/// A library error with an associated location in the guest program.
pub type LocatedError = container::Located<Error>;

/// A container of errors that may occur in the engine.
pub type Errors = container::Errors<LocatedError>;

/// Allow simple conversions from located disassembly errors by re-wrapping the
/// located error around the more general payload.
impl From<disassembly::LocatedError> for LocatedError {
    fn from(value: disassembly::LocatedError) -> Self {
        let location = value.location;
        let payload = Error::from(value.payload);
        Self { location, payload }
    }
}

/// Allow simple conversions from located execution errors by re-wrapping the
/// located error around the more general payload.
impl From<execution::LocatedError> for LocatedError {
    fn from(value: execution::LocatedError) -> Self {
        let location = value.location;
        let payload = Error::from(value.payload);
        Self { location, payload }
    }
}

/// Allow simple conversions from located solver errors by re-wrapping the
/// located error around the more general payload.
impl From<solver::LocatedError> for LocatedError {
    fn from(value: solver::LocatedError) -> Self {
        let location = value.location;
        let payload = Error::from(value.payload);
        Self { location, payload }
    }
}

/// Allow conversion from the solver errors container to the general errors
/// container.
impl From<solver::Errors> for Errors {
    fn from(value: solver::Errors) -> Self {
        let mut errors = Errors::new();
        let payloads: Vec<solver::LocatedError> = value.into();
        payloads.into_iter().for_each(|e| errors.add(e.into()));
        errors
    }
}
