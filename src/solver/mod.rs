//! This module contains the interface between the search engine and the
//! constraint solver that decides which symbolic branches are feasible.
//!
//! The engine only ever talks to a [`SolverManager`]. The solver keeps an
//! incremental stack of asserted constraints; a choice point remembers the
//! [`SolverManager::level`] at which it was created and resets the solver to it
//! before asserting each of its alternatives.

pub mod bounded;

use std::fmt::Debug;

pub use bounded::BoundedSolver;
use serde::{Deserialize, Serialize};

use crate::{
    error::solver::Result,
    vm::value::{Assignment, Constraint, Variable},
};

/// Counters describing the work a solver has done.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct SolverStatistics {
    /// The number of satisfiability queries.
    pub queries: usize,

    pub satisfiable: usize,

    pub unsatisfiable: usize,

    /// The number of queries that ended in an error, such as a timeout.
    pub errors: usize,

    /// The number of constraint evaluations, for solvers that evaluate.
    pub evaluations: usize,
}

/// The interface to a constraint solver.
///
/// # Levels
///
/// The constraints asserted with [`Self::add_constraint`] form a stack. Its
/// height is the solver's level, and [`Self::reset_to`] pops back down to an
/// earlier level.
pub trait SolverManager
where
    Self: Debug + Send,
{
    /// Asserts `constraint` on top of the current constraints.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the solver cannot accept the constraint.
    fn add_constraint(&mut self, constraint: Constraint) -> Result<()>;

    /// Gets the current level.
    #[must_use]
    fn level(&self) -> usize;

    /// Drops every constraint asserted since the solver was at `level`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `level` is above the current level.
    fn reset_to(&mut self, level: usize) -> Result<()>;

    /// Checks if the asserted constraints have a common solution.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the solver could not decide, such as on a timeout.
    fn is_satisfiable(&mut self) -> Result<bool>;

    /// Gets a witness assignment for `variables` that satisfies the asserted
    /// constraints. Variables the constraints leave free are given a default
    /// value.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the constraints are unsatisfiable or undecided.
    fn solution(&mut self, variables: &[Variable]) -> Result<Assignment>;

    /// Resets the statistics counters.
    fn reset_counters(&mut self);

    #[must_use]
    fn statistics(&self) -> SolverStatistics;
}

/// A function that creates a fresh solver, one per worker of the multi-worker
/// search mode.
pub type SolverFactory = dyn Fn() -> Box<dyn SolverManager> + Send + Sync;
