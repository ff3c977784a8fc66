//! This module contains the multi-worker search mode, in which several
//! virtual machines explore disjoint shares of the paths through the same
//! entry method in parallel.
//!
//! # Partitioning
//!
//! Every worker explores the choice points shallower than the split depth in
//! full. At the split depth, each path prefix is owned by exactly one worker,
//! and the other workers skip it. Paths that end before reaching the split
//! depth are recorded only by the owner of their (shorter) prefix.

use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    class::MetadataProvider,
    constant::{DEFAULT_PARALLEL_SPLIT_DEPTH, DEFAULT_PARALLEL_WORKERS},
    search::SearchReport,
    solver::SolverFactory,
    vm::{Config, EntryPoint, ExecutionMode, Outcome, VirtualMachine},
    watchdog::DynWatchdog,
};

/// The configuration of the multi-worker search mode.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ParallelConfig {
    /// The number of workers.
    ///
    /// Defaults to [`DEFAULT_PARALLEL_WORKERS`].
    pub workers: usize,

    /// The choice-point depth at which paths are divided between workers.
    ///
    /// Defaults to [`DEFAULT_PARALLEL_SPLIT_DEPTH`].
    pub split_depth: usize,
}

impl ParallelConfig {
    /// Sets the `workers` config parameter to `value`, at least one.
    #[must_use]
    pub fn with_workers(mut self, value: usize) -> Self {
        self.workers = value.max(1);
        self
    }

    /// Sets the `split_depth` config parameter to `value`, at least one.
    #[must_use]
    pub fn with_split_depth(mut self, value: usize) -> Self {
        self.split_depth = value.max(1);
        self
    }
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            workers:     DEFAULT_PARALLEL_WORKERS,
            split_depth: DEFAULT_PARALLEL_SPLIT_DEPTH,
        }
    }
}

/// The share of the paths that one worker explores.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Partition {
    pub worker:      usize,
    pub workers:     usize,
    pub split_depth: usize,
}

impl Partition {
    /// Checks if the path starting with `path` belongs to this worker. Only
    /// the first `split_depth` alternatives of the path are considered.
    #[must_use]
    pub fn owns(&self, path: &[usize]) -> bool {
        let prefix = &path[..path.len().min(self.split_depth)];
        let ordinal = prefix
            .iter()
            .fold(prefix.len(), |ordinal, &alternative| {
                ordinal.wrapping_mul(31).wrapping_add(alternative + 1)
            });
        ordinal % self.workers.max(1) == self.worker
    }
}

/// Explores the paths through `entry` with `parallel.workers` virtual
/// machines at once, each with a solver made by `solver`.
///
/// The solutions of all workers are merged into one report, ordered by path.
/// If any worker fails, the first failure is returned instead. The `watchdog`,
/// if given, is shared by all workers.
pub fn explore_in_parallel(
    metadata: &Arc<dyn MetadataProvider>,
    config: &Config,
    parallel: &ParallelConfig,
    entry: &EntryPoint,
    solver: &SolverFactory,
    watchdog: Option<&DynWatchdog>,
) -> Outcome {
    let workers = parallel.workers.max(1);
    let config = config.clone().with_mode(ExecutionMode::Symbolic);
    info!(workers, split_depth = parallel.split_depth, "starting parallel search");

    let outcomes: Vec<Outcome> = (0..workers)
        .into_par_iter()
        .map(|worker| {
            let partition = Partition {
                worker,
                workers,
                split_depth: parallel.split_depth.max(1),
            };
            let mut vm = VirtualMachine::new(metadata.clone(), config.clone())
                .with_solver(solver())
                .with_partition(partition);
            if let Some(watchdog) = watchdog {
                vm = vm.with_watchdog(watchdog.clone());
            }
            let outcome = vm.run(entry);
            debug!(worker, %outcome, "worker finished");
            outcome
        })
        .collect();

    merge(outcomes)
}

/// Merges the outcomes of the workers of one parallel search.
fn merge(outcomes: Vec<Outcome>) -> Outcome {
    let mut merged = SearchReport::default();
    for outcome in outcomes {
        let Outcome::Explored(report) = outcome else {
            return outcome;
        };
        merged.solutions.extend(report.solutions);
        merged.aborted = merged.aborted.or(report.aborted);
        merged.statistics.absorb(&report.statistics);
        merged.solver_errors.absorb(report.solver_errors);
    }
    merged.solutions.sort_by(|l, r| l.path.cmp(&r.path));
    merged.solutions.dedup_by(|l, r| l.path == r.path);

    Outcome::Explored(merged)
}

#[cfg(test)]
mod test {
    use itertools::Itertools;
    use proptest::prelude::*;

    use crate::search::parallel::Partition;

    proptest! {
        #[test]
        fn every_path_has_exactly_one_owner(
            path in prop::collection::vec(0usize..4, 0..6),
            workers in 1usize..6,
            split_depth in 1usize..4,
        ) {
            let owners = (0..workers)
                .filter(|&worker| Partition { worker, workers, split_depth }.owns(&path))
                .collect_vec();
            prop_assert_eq!(owners.len(), 1);
        }
    }

    #[test]
    fn ownership_only_depends_on_the_prefix() {
        let partition = Partition {
            worker:      1,
            workers:     3,
            split_depth: 2,
        };
        assert_eq!(partition.owns(&[1, 0, 0]), partition.owns(&[1, 0, 1, 1]));
    }
}
