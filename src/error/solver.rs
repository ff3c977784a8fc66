//! This module contains the errors reported by a
//! [`crate::solver::SolverManager`].
//!
//! None of these are fatal to execution: the search engine treats a branch
//! whose feasibility could not be decided as infeasible and moves on.

use thiserror::Error;

use crate::error::container::{self, Location};

/// Errors that a constraint solver may report.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("The solver gave up after {evaluations:?} evaluations")]
    Timeout { evaluations: usize },

    #[error("The solver is unavailable: {_0}")]
    Unavailable(String),

    #[error("The solver cannot reason about {_0}")]
    UnsupportedTerm(String),

    #[error("Cannot reset the solver to level {requested:?} from level {current:?}")]
    InvalidLevel { requested: usize, current: usize },
}

/// A solver error with the location of the choice point that asked for it.
pub type LocatedError = container::Located<Error>;

/// A container of solver errors buffered during a search.
pub type Errors = container::Errors<LocatedError>;

/// The result type for solver queries.
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
