//! This module contains the ways in which the execution of an instruction can
//! stop short of completing normally.
//!
//! Instruction behaviours return a [`Flow`]. Guest exceptions, engine-fatal
//! errors, the end of a symbolic path and a request to abort the whole run are
//! all carried on the error side, and each is routed to a different place by
//! the main loop: guest exceptions to the exception tables, path ends to the
//! search, and the rest out of the virtual machine.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{error::execution, vm::state::heap::HeapRef};

/// The result of executing an instruction.
pub type Flow = Result<(), Fault>;

/// A reason for an instruction not to complete normally.
#[derive(Clone, Debug, PartialEq)]
pub enum Fault {
    /// A guest exception is being thrown.
    Throw(Throwable),

    /// An engine-fatal error occurred.
    Fatal(execution::Error),

    /// The current symbolic path cannot or should not be explored further.
    PathEnd(PathEnd),

    /// The whole run has to stop.
    Abort(AbortReason),
}

impl Fault {
    /// Creates a fault raising a new guest exception of class `class`.
    #[must_use]
    pub fn raise(class: impl Into<String>, message: Option<String>) -> Self {
        Fault::Throw(Throwable::Raise {
            class: class.into(),
            message,
        })
    }
}

impl From<execution::Error> for Fault {
    fn from(value: execution::Error) -> Self {
        Fault::Fatal(value)
    }
}

/// A guest exception in flight.
#[derive(Clone, Debug, PartialEq)]
pub enum Throwable {
    /// An exception object that already exists in the heap, as thrown by
    /// `athrow`.
    Object(HeapRef),

    /// An exception raised by the engine that still has to be allocated.
    Raise {
        class:   String,
        message: Option<String>,
    },
}

/// The reasons for ending a symbolic path without a solution.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum PathEnd {
    /// No alternative of a new choice point is satisfiable.
    Infeasible,

    /// An instruction was executed more often than the loop limit allows.
    LoopLimit,

    /// The path belongs to another worker of the multi-worker mode.
    Partitioned,

    /// The path goes deeper than the current iterative deepening bound.
    DepthLimit,
}

/// The reasons for stopping a run before it finished.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum AbortReason {
    /// The host interrupted the run.
    Interrupted,

    /// The watchdog asked for the run to stop.
    Watchdog,

    /// The wall-clock limit of the search was reached.
    WallClock,

    /// Too many instructions were executed without finding a new solution.
    InstructionBudget,

    /// The coverage target of the search was reached.
    CoverageReached,
}

impl Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            AbortReason::Interrupted => "interrupted by the host",
            AbortReason::Watchdog => "stopped by the watchdog",
            AbortReason::WallClock => "wall-clock limit reached",
            AbortReason::InstructionBudget => "too many instructions without a new solution",
            AbortReason::CoverageReached => "coverage target reached",
        };
        write!(f, "{reason}")
    }
}
