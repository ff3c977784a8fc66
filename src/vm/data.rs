//! This module contains miscellaneous small data-types that are used throughout
//! the virtual machine.

use std::{collections::HashMap, sync::Arc};

use indexmap::{IndexMap, IndexSet};

/// A location of an instruction: the qualified method name and the offset.
pub type InstructionKey = (Arc<str>, u32);

/// A container that tracks how often each instruction has been executed on the
/// current symbolic path.
///
/// This ensures that we visit every instruction at most
/// `iterations_per_instruction` times on one path, which cuts off paths that
/// would otherwise go around a loop with a symbolic bound forever.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VisitedInstructions {
    iterations_per_instruction: usize,
    data:                       HashMap<InstructionKey, usize>,
}

impl VisitedInstructions {
    /// Constructs a new tracker allowing `iterations_per_instruction` visits of
    /// each instruction.
    #[must_use]
    pub fn new(iterations_per_instruction: usize) -> Self {
        let data = HashMap::default();

        Self {
            iterations_per_instruction,
            data,
        }
    }

    /// Marks the instruction at `pc` in `method` as having been visited once
    /// more, returning the number of visits so far.
    pub fn mark_visited(&mut self, method: &Arc<str>, pc: u32) -> usize {
        let count = self.data.entry((method.clone(), pc)).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Un-marks one visit of the instruction at `pc` in `method`.
    ///
    /// This is used when an instruction is executed again without making
    /// progress, such as when a choice point refines one of its operands.
    pub fn unmark_visited(&mut self, method: &Arc<str>, pc: u32) {
        if let Some(count) = self.data.get_mut(&(method.clone(), pc)) {
            *count = count.saturating_sub(1);
        }
    }

    /// Checks if the instruction at `pc` in `method` has been visited more
    /// often than allowed.
    #[must_use]
    pub fn over_visit_limit(&self, method: &Arc<str>, pc: u32) -> bool {
        self.data
            .get(&(method.clone(), pc))
            .is_some_and(|count| *count > self.iterations_per_instruction)
    }

    /// Forgets all visits.
    pub fn clear(&mut self) {
        self.data.clear();
    }
}

/// The instruction coverage of a symbolic exploration.
///
/// Coverage is measured against all instructions of the methods that the
/// exploration entered, as those are the only methods it knows to exist.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Coverage {
    covered: IndexSet<InstructionKey>,
    methods: IndexMap<Arc<str>, usize>,
}

impl Coverage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `method`, which has `instruction_count` instructions, has
    /// been entered.
    pub fn enter_method(&mut self, method: &Arc<str>, instruction_count: usize) {
        if !self.methods.contains_key(method) {
            self.methods.insert(method.clone(), instruction_count);
        }
    }

    /// Records the execution of the instruction at `pc` in `method`.
    pub fn record(&mut self, method: &Arc<str>, pc: u32) {
        if !self.covered.contains(&(method.clone(), pc)) {
            self.covered.insert((method.clone(), pc));
        }
    }

    /// Gets the number of distinct instructions executed.
    #[must_use]
    pub fn covered(&self) -> usize {
        self.covered.len()
    }

    /// Gets the number of instructions in the methods entered.
    #[must_use]
    pub fn total(&self) -> usize {
        self.methods.values().sum()
    }

    /// Checks if at least `percent` percent of the known instructions have
    /// been executed.
    #[must_use]
    pub fn reached(&self, percent: u8) -> bool {
        let total = self.total();
        total > 0 && self.covered() * 100 >= total * usize::from(percent)
    }
}

#[cfg(test)]
mod test {
    mod visited_instructions {
        use std::sync::Arc;

        use crate::vm::data::VisitedInstructions;

        #[test]
        fn can_visit_instructions_up_to_the_limit() {
            let method = Arc::<str>::from("A.m()V");
            let mut tracker = VisitedInstructions::new(3);
            for _ in 0..3 {
                tracker.mark_visited(&method, 17);
            }
            assert!(!tracker.over_visit_limit(&method, 17));

            tracker.mark_visited(&method, 17);
            assert!(tracker.over_visit_limit(&method, 17));
        }

        #[test]
        fn can_unmark_instructions_as_visited() {
            let method = Arc::<str>::from("A.m()V");
            let mut tracker = VisitedInstructions::new(0);
            tracker.mark_visited(&method, 4);
            tracker.unmark_visited(&method, 4);

            assert!(!tracker.over_visit_limit(&method, 4));
        }

        #[test]
        fn visits_are_counted_per_method() {
            let mut tracker = VisitedInstructions::new(1);
            tracker.mark_visited(&Arc::from("A.m()V"), 0);
            assert_eq!(tracker.mark_visited(&Arc::from("B.m()V"), 0), 1);
        }
    }

    mod coverage {
        use std::sync::Arc;

        use crate::vm::data::Coverage;

        #[test]
        fn measures_against_entered_methods() {
            let method = Arc::<str>::from("A.m()V");
            let mut coverage = Coverage::new();
            assert!(!coverage.reached(0));

            coverage.enter_method(&method, 4);
            coverage.record(&method, 0);
            coverage.record(&method, 0);
            coverage.record(&method, 3);
            assert_eq!((coverage.covered(), coverage.total()), (2, 4));
            assert!(coverage.reached(50));
            assert!(!coverage.reached(51));
        }
    }
}
