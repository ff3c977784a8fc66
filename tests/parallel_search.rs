//! This module is an integration test that checks that the multi-worker search
//! mode finds exactly the paths that a single worker finds.
#![cfg(test)]

use std::sync::{atomic::AtomicBool, Arc};

use symbex_vm::{
    bytecode,
    class::MetadataProvider,
    opcode::code::*,
    search::parallel::{explore_in_parallel, ParallelConfig},
    solver::{BoundedSolver, SolverManager},
    vm::{fault::AbortReason, Config},
    watchdog::{DynWatchdog, FlagWatchdog},
};

mod common;

/// `r = 0; if (a > 0) r += 1; if (b > 0) r += 2; if (c > 0) r += 4; return r;`
fn flags() -> Vec<u8> {
    bytecode![
        ICONST_0,
        ISTORE_3,
        ILOAD_0,
        IFLE,
        branch(6),
        IINC,
        [3, 1],
        ILOAD_1,
        IFLE,
        branch(6),
        IINC,
        [3, 2],
        ILOAD_2,
        IFLE,
        branch(6),
        IINC,
        [3, 4],
        ILOAD_3,
        IRETURN
    ]
}

fn bounded_solver() -> Box<dyn SolverManager> {
    Box::new(BoundedSolver::new())
}

#[test]
fn workers_together_find_every_path_once() -> anyhow::Result<()> {
    let library = common::single_method("(III)I", flags())?;
    let entry = common::run_entry("(III)I");
    let sequential = common::explore(&library, Config::default(), &entry)?;
    assert_eq!(sequential.solutions.len(), 8);

    let metadata: Arc<dyn MetadataProvider> = library;
    for workers in [1, 2, 3, 5] {
        let parallel = ParallelConfig::default().with_workers(workers).with_split_depth(2);
        let outcome = explore_in_parallel(&metadata, &Config::default(), &parallel, &entry, &bounded_solver, None);
        let report = common::into_report(outcome)?;

        assert!(report.is_complete());
        let found = report
            .solutions
            .iter()
            .map(|s| (s.path.clone(), s.outcome.clone()))
            .collect::<Vec<_>>();
        let expected = sequential
            .solutions
            .iter()
            .map(|s| (s.path.clone(), s.outcome.clone()))
            .collect::<Vec<_>>();
        assert_eq!(found, expected, "with {workers} workers");
        if workers > 1 {
            assert!(report.statistics.pruned_partition > 0);
        }
    }

    Ok(())
}

#[test]
fn a_shared_watchdog_stops_every_worker() -> anyhow::Result<()> {
    let library = common::single_method("(III)I", flags())?;
    let metadata: Arc<dyn MetadataProvider> = library;
    let watchdog: DynWatchdog = FlagWatchdog::new(Arc::new(AtomicBool::new(true)))
        .polling_every(1)
        .in_arc();

    let outcome = explore_in_parallel(
        &metadata,
        &Config::default(),
        &ParallelConfig::default(),
        &common::run_entry("(III)I"),
        &bounded_solver,
        Some(&watchdog),
    );
    let report = common::into_report(outcome)?;
    assert_eq!(report.aborted, Some(AbortReason::Watchdog));
    assert!(report.solutions.is_empty());

    Ok(())
}
