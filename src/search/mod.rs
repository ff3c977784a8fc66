//! This module contains the search engine that drives the virtual machine in
//! symbolic mode.
//!
//! # Choice Points and the Trail
//!
//! An instruction whose outcome depends on symbolic inputs opens a
//! [`choice::ChoicePoint`] with one alternative per possible outcome, each
//! guarded by a constraint. The engine takes the first satisfiable one and
//! records every mutation it makes from then on in the choice point's
//! [`trail::Trail`]. When the path ends, the engine backtracks: it replays the
//! trail to undo those mutations, restores the control state the choice point
//! snapshotted, and takes the next satisfiable alternative.
//!
//! # Solutions
//!
//! Every path that returns from the entry method, or throws out of it, is a
//! [`Solution`]. Its inputs are the witness assignment the solver produces
//! for the constraints of the path.

pub mod choice;
pub mod parallel;
pub mod trail;

use std::{collections::HashSet, sync::Arc, time::Instant};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    error::{execution, solver},
    search::{choice::ChoicePoint, parallel::Partition, trail::TrailEntry},
    solver::SolverStatistics,
    vm::{
        data::{Coverage, VisitedInstructions},
        entry::{EntryPoint, Outcome, ReturnedValue},
        exception::Handled,
        fault::{AbortReason, Fault, Flow, PathEnd},
        state::{StackElement, State},
        value::{Primitive, Variable},
        Config,
        ExecutionMode,
        Termination,
        VirtualMachine,
    },
};

/// The order in which the search explores paths.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum SearchStrategy {
    /// Explore every path in depth-first order in a single round.
    #[default]
    DepthFirst,

    /// Explore in rounds of increasing choice-point depth, restarting from the
    /// entry method each round, until a round is no longer cut short by its
    /// depth bound.
    IterativeDeepening,
}

/// How a path through the entry method ended.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum PathOutcome {
    /// The entry method returned.
    Returned(ReturnedValue),

    /// An exception propagated out of the entry method.
    Exception {
        class:   String,
        message: Option<String>,
    },
}

/// One path through the entry method, along with inputs that drive execution
/// down it.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Solution {
    /// The index of the alternative taken at each choice point of the path.
    pub path: Vec<usize>,

    /// The value of each symbolic input, by input name, in creation order.
    pub inputs: IndexMap<String, Primitive>,

    /// The length chosen for each symbolic input array that the path used.
    pub array_lengths: IndexMap<String, usize>,

    pub outcome: PathOutcome,
}

/// Counters describing the work done by a search.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct SearchStatistics {
    pub choice_points: usize,
    pub backtracks:    usize,

    /// The number of paths that ended because no alternative of a choice
    /// point was satisfiable.
    pub pruned_infeasible: usize,
    pub pruned_loop_limit: usize,
    pub pruned_depth:      usize,
    pub pruned_partition:  usize,

    /// The number of instructions executed in symbolic mode.
    pub instructions: usize,

    /// The number of rounds; always one unless iterative deepening is used.
    pub rounds: usize,

    pub solver: SolverStatistics,

    pub covered_instructions: usize,
    pub total_instructions:   usize,
}

impl SearchStatistics {
    /// Adds the counters of `other` to these.
    ///
    /// Coverage cannot be summed across searches that share instructions, so
    /// the larger of the two counts is kept.
    pub fn absorb(&mut self, other: &SearchStatistics) {
        self.choice_points += other.choice_points;
        self.backtracks += other.backtracks;
        self.pruned_infeasible += other.pruned_infeasible;
        self.pruned_loop_limit += other.pruned_loop_limit;
        self.pruned_depth += other.pruned_depth;
        self.pruned_partition += other.pruned_partition;
        self.instructions += other.instructions;
        self.rounds = self.rounds.max(other.rounds);
        self.solver.queries += other.solver.queries;
        self.solver.satisfiable += other.solver.satisfiable;
        self.solver.unsatisfiable += other.solver.unsatisfiable;
        self.solver.errors += other.solver.errors;
        self.solver.evaluations += other.solver.evaluations;
        self.covered_instructions = self.covered_instructions.max(other.covered_instructions);
        self.total_instructions = self.total_instructions.max(other.total_instructions);
    }
}

/// The result of a symbolic run.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct SearchReport {
    /// The solutions found, in the order in which they were found.
    pub solutions: Vec<Solution>,

    /// Why the search stopped early, if it did.
    pub aborted: Option<AbortReason>,

    pub statistics: SearchStatistics,

    /// Errors reported by the solver while deciding feasibility. The search
    /// treats the alternatives they concern as infeasible.
    #[serde(skip)]
    pub solver_errors: solver::Errors,
}

impl SearchReport {
    /// Checks if the search explored every path it was allowed to.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.aborted.is_none()
    }
}

/// The bookkeeping of the search that lives alongside the machine state.
#[derive(Debug)]
pub(crate) struct SearchState {
    pub(crate) choice_points: Vec<ChoicePoint>,

    pub(crate) visits: VisitedInstructions,

    pub(crate) coverage: Coverage,

    /// The symbolic inputs of the current path, in creation order.
    pub(crate) inputs: Vec<Variable>,

    /// The name and length of every symbolic input array given a length on
    /// the current path.
    pub(crate) generated: Vec<(Arc<str>, usize)>,

    pub(crate) statistics: SearchStatistics,

    pub(crate) instructions_since_solution: usize,

    pub(crate) started: Option<Instant>,

    /// The maximum number of open choice points in the current round.
    pub(crate) depth_bound: Option<usize>,

    /// Set when the depth bound cut a path short in the current round.
    pub(crate) depth_cut: bool,

    pub(crate) solver_errors: solver::Errors,

    pub(crate) solutions: Vec<Solution>,

    /// The paths for which a solution has been recorded.
    seen: HashSet<Vec<usize>>,

    pub(crate) partition: Option<Partition>,
}

impl SearchState {
    pub(crate) fn new(config: &Config) -> Self {
        Self {
            choice_points:               vec![],
            visits:                      VisitedInstructions::new(config.iterations_per_instruction),
            coverage:                    Coverage::new(),
            inputs:                      vec![],
            generated:                   vec![],
            statistics:                  SearchStatistics::default(),
            instructions_since_solution: 0,
            started:                     None,
            depth_bound:                 None,
            depth_cut:                   false,
            solver_errors:               solver::Errors::new(),
            solutions:                   vec![],
            seen:                        HashSet::new(),
            partition:                   None,
        }
    }

    /// Gets the number of frames that must stay in the frame arena because
    /// the innermost choice point may restore them.
    pub(crate) fn frame_floor(&self) -> usize {
        self.choice_points.last().map_or(0, |point| point.frame_watermark)
    }

    /// Records `entry` in the trail of the innermost choice point.
    ///
    /// Mutations of frames and heap objects created after that choice point
    /// are not recorded, as backtracking discards those targets wholesale.
    pub(crate) fn record(&mut self, entry: TrailEntry) {
        let Some(point) = self.choice_points.last_mut() else {
            return;
        };
        let predates_point = match &entry {
            TrailEntry::Local { frame, .. } => frame.index() < point.frame_watermark,
            TrailEntry::ArrayElement { array: object, .. }
            | TrailEntry::Field { object, .. }
            | TrailEntry::Object { object, .. } => object.index() < point.heap_watermark,
            TrailEntry::Static { .. } | TrailEntry::ClassInitialized { .. } => true,
        };
        if predates_point {
            point.trail.push(entry);
        }
    }

    /// Gets the alternatives taken at every open choice point.
    pub(crate) fn path(&self) -> Vec<usize> {
        self.choice_points.iter().map(|point| point.current).collect()
    }

    /// Counts a path that ended without a solution.
    pub(crate) fn note_path_end(&mut self, end: PathEnd) {
        debug!(?end, depth = self.choice_points.len(), "path ended");
        let counter = match end {
            PathEnd::Infeasible => &mut self.statistics.pruned_infeasible,
            PathEnd::LoopLimit => &mut self.statistics.pruned_loop_limit,
            PathEnd::DepthLimit => &mut self.statistics.pruned_depth,
            PathEnd::Partitioned => &mut self.statistics.pruned_partition,
        };
        *counter += 1;
    }
}

/// The machine state at the start of the first round, restored at the start
/// of every later round of iterative deepening.
struct RoundStart {
    state:      State,
    call_stack: Vec<StackElement>,
    inputs:     Vec<Variable>,
    generated:  Vec<(Arc<str>, usize)>,
    level:      usize,
}

impl VirtualMachine {
    /// Explores the paths through the method described by `entry`.
    pub(crate) fn explore(&mut self, entry: &EntryPoint) -> Outcome {
        self.mode = ExecutionMode::Symbolic;
        self.search.started = Some(Instant::now());
        if let Err(fault) = self.genesis().and_then(|()| self.enter(entry)) {
            return self.outcome_of_fault(fault);
        }

        let start = RoundStart {
            state:      self.state.clone(),
            call_stack: self.call_stack.clone(),
            inputs:     self.search.inputs.clone(),
            generated:  self.search.generated.clone(),
            level:      self.solver.level(),
        };
        let mut bound = match self.config.search_strategy {
            SearchStrategy::DepthFirst => None,
            SearchStrategy::IterativeDeepening => Some(self.config.iterative_deepening_initial_depth),
        };

        let aborted = loop {
            self.search.depth_bound = bound;
            self.search.depth_cut = false;
            self.search.statistics.rounds += 1;
            debug!(round = self.search.statistics.rounds, ?bound, "starting round");

            match self.explore_round() {
                Ok(()) => (),
                Err(Fault::Abort(reason)) => {
                    info!(%reason, "search aborted");
                    break Some(reason);
                }
                Err(fault) => return Outcome::Error(self.fault_error(fault)),
            }
            if !self.search.depth_cut {
                break None;
            }

            bound = bound.map(|depth| depth + self.config.iterative_deepening_increment.max(1));
            if let Err(error) = self.restart(&start) {
                return Outcome::Error(self.fault_error(error.into()));
            }
        };

        Outcome::Explored(self.report(aborted))
    }

    /// Puts the machine back into the state it was in at the start of the
    /// first round.
    fn restart(&mut self, start: &RoundStart) -> execution::Result<()> {
        self.state = start.state.clone();
        self.call_stack = start.call_stack.clone();
        self.search.inputs = start.inputs.clone();
        self.search.generated = start.generated.clone();
        self.search.choice_points.clear();
        self.search.visits.clear();
        self.current = None;
        self.preloaded = None;
        self.solver
            .reset_to(start.level)
            .map_err(|error| execution::Error::SolverFailed {
                reason: error.to_string(),
            })
    }

    /// Explores every path of one round, backtracking until no choice point
    /// has an alternative left.
    fn explore_round(&mut self) -> Flow {
        let mut result = self.run_main_loop(0);
        loop {
            match result {
                Ok(termination) => self.record_solution(&termination),
                Err(Fault::PathEnd(end)) => {
                    if end == PathEnd::DepthLimit {
                        self.search.depth_cut = true;
                    }
                    self.search.note_path_end(end);
                }
                Err(fault) => return Err(fault),
            }
            if let Some(target) = self.config.coverage_target {
                if self.search.coverage.reached(target) {
                    return Err(Fault::Abort(AbortReason::CoverageReached));
                }
            }

            result = match self.backtrack() {
                None => return Ok(()),
                Some(Ok(())) => self.run_main_loop(0),
                Some(Err(Fault::Throw(throwable))) => match self.handle_exception(throwable, 0) {
                    Ok(Handled::Resume(frame)) => {
                        self.preloaded = Some(frame);
                        self.run_main_loop(0)
                    }
                    Ok(Handled::Uncaught(exception)) => Ok(Termination::Uncaught(exception)),
                    Err(fault) => Err(fault),
                },
                Some(Err(fault)) => Err(fault),
            };
        }
    }

    /// Records the path that just ended in `termination` as a solution, unless
    /// it belongs to another worker or was already recorded.
    fn record_solution(&mut self, termination: &Termination) {
        let path = self.search.path();
        if let Some(partition) = &self.search.partition {
            if !partition.owns(&path) {
                self.search.statistics.pruned_partition += 1;
                return;
            }
        }
        if !self.search.seen.insert(path.clone()) {
            return;
        }

        let witness = match self.solver.solution(&self.search.inputs) {
            Ok(witness) => Some(witness),
            Err(error) => {
                warn!(%error, "no witness for a finished path");
                let location = self.location();
                self.search.solver_errors.add_located(location, error);
                None
            }
        };
        let outcome = match termination {
            Termination::Returned(value) => PathOutcome::Returned(
                value
                    .as_ref()
                    .map_or(ReturnedValue::Void, |v| self.describe(v, witness.as_ref())),
            ),
            Termination::Uncaught(exception) => {
                let (class, message) = self.describe_exception(*exception);
                PathOutcome::Exception { class, message }
            }
        };
        let inputs = match &witness {
            Some(witness) => self
                .search
                .inputs
                .iter()
                .filter_map(|input| witness.get(input).map(|value| (input.name().to_string(), value)))
                .collect(),
            None => IndexMap::new(),
        };
        let array_lengths = self
            .search
            .generated
            .iter()
            .map(|(name, length)| (name.to_string(), *length))
            .collect();

        debug!(?path, ?outcome, "found solution");
        self.search.instructions_since_solution = 0;
        self.search.solutions.push(Solution {
            path,
            inputs,
            array_lengths,
            outcome,
        });
    }

    /// Builds the report of the search, moving the solutions out of the
    /// search state.
    fn report(&mut self, aborted: Option<AbortReason>) -> SearchReport {
        let mut statistics = self.search.statistics.clone();
        statistics.solver = self.solver.statistics();
        statistics.covered_instructions = self.search.coverage.covered();
        statistics.total_instructions = self.search.coverage.total();
        info!(
            solutions = self.search.solutions.len(),
            choice_points = statistics.choice_points,
            backtracks = statistics.backtracks,
            "search finished"
        );

        SearchReport {
            solutions: std::mem::take(&mut self.search.solutions),
            aborted,
            statistics,
            solver_errors: std::mem::take(&mut self.search.solver_errors),
        }
    }
}
