//! This module contains choice points: the places where a symbolic path
//! forks, and the machinery for taking and revisiting their alternatives.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{trace, warn};

use crate::{
    disassembly::Decoded,
    error::{
        container::Location,
        execution::{Error, Result},
        solver,
    },
    search::trail::Trail,
    vm::{
        data::VisitedInstructions,
        fault::{Fault, Flow, PathEnd},
        state::{
            frame::{Frame, FrameControl, Monitor, PcUpdate},
            heap::HeapRef,
            FrameId,
            StackElement,
        },
        value::{Constraint, Value},
        VirtualMachine,
    },
};

/// What taking an alternative does to the state of the machine.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Pop `pops` items and continue at the absolute pc `target`.
    Jump { pops: usize, target: i64 },

    /// Pop `pops` items, push `value` and continue after the instruction.
    Push { pops: usize, value: Value },

    /// Replace the stack item at `depth` with `value` and execute the
    /// instruction again.
    Refine { depth: usize, value: Value },

    /// Pop `pops` items and raise an exception of class `class`.
    Throw {
        pops:    usize,
        class:   &'static str,
        message: Option<String>,
    },

    /// Give the symbolic input array `array` the length `length` and execute
    /// the instruction again.
    Materialize { array: HeapRef, length: usize },
}

/// One way of continuing from a choice point, taken only if its constraint is
/// satisfiable together with the constraints of the path so far.
#[derive(Clone, Debug, PartialEq)]
pub struct Alternative {
    /// The constraint under which the alternative is taken, or [`None`] if it
    /// places no constraint on the inputs.
    pub constraint: Option<Constraint>,

    pub action: Action,
}

impl Alternative {
    #[must_use]
    pub fn new(constraint: Constraint, action: Action) -> Self {
        Self {
            constraint: Some(constraint),
            action,
        }
    }

    #[must_use]
    pub fn unconstrained(action: Action) -> Self {
        Self {
            constraint: None,
            action,
        }
    }
}

/// The control state of the machine at the time a choice point was created.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlSnapshot {
    pub call_stack: Vec<StackElement>,
    pub current:    FrameId,
    pub frames:     Vec<FrameControl>,
    pub monitors:   IndexMap<Monitor, usize>,
}

/// A place where a symbolic path forks.
#[derive(Clone, Debug)]
pub struct ChoicePoint {
    pub location: Location,

    pub alternatives: Vec<Alternative>,

    /// The index of the alternative currently being explored.
    pub current: usize,

    /// The mutations made since the current alternative was taken, for
    /// targets that existed when the choice point was created.
    pub trail: Trail,

    pub solver_level: usize,

    pub instruction_pc: u32,
    pub next_pc:        u32,
    pub frame:          FrameId,
    pub method:         Arc<str>,

    pub snapshot: ControlSnapshot,

    /// The number of frames in the arena at creation.
    pub frame_watermark: usize,

    /// The number of heap slots at creation.
    pub heap_watermark: usize,

    pub input_mark:     usize,
    pub generated_mark: usize,

    pub visits: VisitedInstructions,
}

impl VirtualMachine {
    /// Opens a choice point for the instruction `decoded` and takes the first
    /// of `alternatives` that is feasible.
    ///
    /// Behaviours call this before they modify the operand stack, as the
    /// choice point snapshots it.
    ///
    /// # Errors
    ///
    /// Returns a path end if the depth bound of the round is reached or no
    /// alternative is feasible, and otherwise whatever the alternative taken
    /// returns.
    pub(crate) fn choose(&mut self, decoded: &Decoded, alternatives: Vec<Alternative>) -> Flow {
        if let Some(bound) = self.search.depth_bound {
            if self.search.choice_points.len() >= bound {
                return Err(Fault::PathEnd(PathEnd::DepthLimit));
            }
        }

        let frame = self.current_frame_id()?;
        let method = self.frame()?.method().qualified_name().clone();
        let snapshot = ControlSnapshot {
            call_stack: self.call_stack.clone(),
            current:    frame,
            frames:     self.state.frames().map(Frame::control).collect(),
            monitors:   self.state.monitors(),
        };
        let point = ChoicePoint {
            location: Location::new(method.clone(), decoded.pc),
            alternatives,
            current: 0,
            trail: Trail::new(),
            solver_level: self.solver.level(),
            instruction_pc: decoded.pc,
            next_pc: decoded.next_pc(),
            frame,
            method,
            snapshot,
            frame_watermark: self.state.frame_count(),
            heap_watermark: self.state.heap().len(),
            input_mark: self.search.inputs.len(),
            generated_mark: self.search.generated.len(),
            visits: self.search.visits.clone(),
        };

        trace!(
            location = %point.location,
            alternatives = point.alternatives.len(),
            depth = self.search.choice_points.len(),
            "opened choice point"
        );
        self.search.statistics.choice_points += 1;
        self.search.choice_points.push(point);
        self.resume_at(0)
    }

    /// Takes the first feasible alternative of the innermost choice point,
    /// starting at the alternative `start`.
    fn resume_at(&mut self, start: usize) -> Flow {
        let Some(depth) = self.search.choice_points.len().checked_sub(1) else {
            return Err(Fault::PathEnd(PathEnd::Infeasible));
        };
        let count = self.search.choice_points[depth].alternatives.len();

        for index in start..count {
            self.search.choice_points[depth].current = index;
            if !self.owns_prefix(depth) {
                self.search.statistics.pruned_partition += 1;
                continue;
            }

            let point = &self.search.choice_points[depth];
            let level = point.solver_level;
            let alternative = point.alternatives[index].clone();
            if !self.is_feasible(level, alternative.constraint) {
                continue;
            }
            trace!(depth, alternative = index, "taking alternative");
            return self.apply(alternative.action);
        }

        self.search.choice_points[depth].current = count;
        Err(Fault::PathEnd(PathEnd::Infeasible))
    }

    /// Checks if the path up to and including the choice point at `depth`
    /// belongs to this worker. Only the choice point at the split depth of a
    /// partitioned search decides this.
    fn owns_prefix(&self, depth: usize) -> bool {
        match &self.search.partition {
            Some(partition) if depth + 1 == partition.split_depth => partition.owns(&self.search.path()),
            _ => true,
        }
    }

    /// Checks if `constraint` can hold together with the constraints asserted
    /// up to solver level `level`, leaving it asserted if it can.
    ///
    /// A solver failure is recorded and the alternative treated as
    /// infeasible.
    fn is_feasible(&mut self, level: usize, constraint: Option<Constraint>) -> bool {
        match self.check_constraint(level, constraint) {
            Ok(feasible) => feasible,
            Err(error) => {
                warn!(%error, "treating an undecided alternative as infeasible");
                let location = self
                    .search
                    .choice_points
                    .last()
                    .map(|point| point.location.clone())
                    .unwrap_or_default();
                self.search.solver_errors.add_located(location, error);
                false
            }
        }
    }

    fn check_constraint(&mut self, level: usize, constraint: Option<Constraint>) -> solver::Result<bool> {
        self.solver.reset_to(level)?;
        let Some(constraint) = constraint else {
            return Ok(true);
        };
        if let Some(holds) = constraint.as_constant() {
            return Ok(holds);
        }
        self.solver.add_constraint(constraint)?;
        self.solver.is_satisfiable()
    }

    /// Performs `action` in the frame of the innermost choice point.
    fn apply(&mut self, action: Action) -> Flow {
        let Some(point) = self.search.choice_points.last() else {
            return Err(Error::NoCurrentFrame.into());
        };
        let (instruction_pc, next_pc, method) = (point.instruction_pc, point.next_pc, point.method.clone());

        match action {
            Action::Jump { pops, target } => {
                self.pop_many(pops)?;
                self.frame_mut()?.jump(target)?;
            }
            Action::Push { pops, value } => {
                self.pop_many(pops)?;
                self.push(value)?;
                let frame = self.frame_mut()?;
                frame.set_pc(next_pc);
                frame.set_pc_update(PcUpdate::Jumped);
            }
            Action::Refine { depth, value } => {
                self.frame_mut()?.stack_mut().replace(depth, value)?;
                self.repeat(&method, instruction_pc)?;
            }
            Action::Throw { pops, class, message } => {
                self.pop_many(pops)?;
                return Err(Fault::raise(class, message));
            }
            Action::Materialize { array, length } => {
                self.materialize_array(array, length)?;
                self.repeat(&method, instruction_pc)?;
            }
        }
        Ok(())
    }

    /// Arranges for the instruction at `pc` to execute again without counting
    /// as another visit.
    fn repeat(&mut self, method: &Arc<str>, pc: u32) -> Result<()> {
        self.search.visits.unmark_visited(method, pc);
        let frame = self.frame_mut()?;
        frame.set_pc(pc);
        frame.set_pc_update(PcUpdate::Repeat);
        Ok(())
    }

    /// Returns to the innermost choice point with an alternative left and
    /// takes the next feasible one, discarding exhausted choice points.
    ///
    /// Returns [`None`] once every choice point is exhausted, and otherwise
    /// the result of taking the alternative. On success the machine resumes in
    /// the frame of the choice point.
    pub(crate) fn backtrack(&mut self) -> Option<Flow> {
        loop {
            let mut point = self.search.choice_points.pop()?;
            if let Err(error) = self.restore(&mut point) {
                return Some(Err(error.into()));
            }

            let next = point.current + 1;
            if next >= point.alternatives.len() {
                trace!(location = %point.location, "choice point exhausted");
                continue;
            }
            self.search.statistics.backtracks += 1;
            self.search.choice_points.push(point);
            match self.resume_at(next) {
                Err(Fault::PathEnd(end)) => self.search.note_path_end(end),
                flow => return Some(flow),
            }
        }
    }

    /// Puts the machine back into the state it was in when `point` was
    /// created.
    fn restore(&mut self, point: &mut ChoicePoint) -> Result<()> {
        point.trail.replay(&mut self.state)?;
        self.state.truncate_frames(point.frame_watermark);
        self.state.heap_mut().truncate(point.heap_watermark);
        self.state.forget_interned_above(point.heap_watermark);
        self.search.inputs.truncate(point.input_mark);
        self.search.generated.truncate(point.generated_mark);

        for (index, control) in point.snapshot.frames.iter().enumerate() {
            self.state.frame_mut(FrameId(index))?.restore_control(control.clone());
        }
        self.state.restore_monitors(point.snapshot.monitors.clone());
        self.call_stack.clone_from(&point.snapshot.call_stack);
        self.current = Some(point.snapshot.current);
        self.preloaded = Some(point.snapshot.current);
        self.frame_switch = false;
        self.search.visits.clone_from(&point.visits);

        self.solver
            .reset_to(point.solver_level)
            .map_err(|error| Error::SolverFailed {
                reason: error.to_string(),
            })
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::{
        bytecode,
        class::{ClassBuilder, ClassLibrary, MethodBuilder},
        opcode::code::{branch, GOTO, ICONST_0, ICONST_1, IFEQ, IINC, ILOAD_0, IRETURN},
        search::PathOutcome,
        vm::{value::Primitive, Config, EntryPoint, ExecutionMode, ReturnedValue, VirtualMachine},
    };

    fn symbolic(code: Vec<u8>, descriptor: &str) -> anyhow::Result<VirtualMachine> {
        let class = ClassBuilder::new("Main")
            .method(
                MethodBuilder::new("run", descriptor)
                    .static_method()
                    .code(code)
                    .max_stack(2)
                    .max_locals(1),
            )
            .build()?;
        let library = ClassLibrary::with_core_classes()?.with(class);
        let config = Config::default().with_mode(ExecutionMode::Symbolic);
        Ok(VirtualMachine::new(Arc::new(library), config))
    }

    #[test]
    fn both_sides_of_a_branch_are_explored() -> anyhow::Result<()> {
        // 0: iload_0, 1: ifeq +5, 4: iconst_0, 5: ireturn, 6: iconst_1, 7: ireturn
        let code = bytecode![ILOAD_0, IFEQ, branch(5), ICONST_0, IRETURN, ICONST_1, IRETURN];
        let mut vm = symbolic(code, "(I)I")?;
        let outcome = vm.run(&EntryPoint::new("Main", "run", "(I)I"));
        let report = outcome.report().ok_or_else(|| anyhow::anyhow!("no report: {outcome}"))?;

        assert_eq!(report.solutions.len(), 2);
        assert_eq!(report.solutions[0].path, vec![0]);
        assert_eq!(report.solutions[1].path, vec![1]);
        assert_eq!(report.solutions[0].inputs.get("arg0"), Some(&Primitive::Int(0)));
        assert_ne!(report.solutions[1].inputs.get("arg0"), Some(&Primitive::Int(0)));
        assert_eq!(
            report.solutions[0].outcome,
            PathOutcome::Returned(ReturnedValue::Primitive(Primitive::Int(1)))
        );
        assert_eq!(report.statistics.choice_points, 1);
        assert_eq!(report.statistics.backtracks, 1);
        assert!(vm.search.choice_points.is_empty());

        Ok(())
    }

    #[test]
    fn backtracking_undoes_local_writes() -> anyhow::Result<()> {
        // 0: iload_0, 1: ifeq +9, 4: iinc 0 1, 7: goto +3, 10: iload_0, 11: ireturn
        let code = bytecode![ILOAD_0, IFEQ, branch(9), IINC, 0u8, 1u8, GOTO, branch(3), ILOAD_0, IRETURN];
        let mut vm = symbolic(code, "(I)I")?;
        let outcome = vm.run(&EntryPoint::new("Main", "run", "(I)I"));
        let report = outcome.report().ok_or_else(|| anyhow::anyhow!("no report: {outcome}"))?;

        assert_eq!(report.solutions.len(), 2);
        // The taken branch returns the untouched input; the other adds one.
        assert_eq!(
            report.solutions[0].outcome,
            PathOutcome::Returned(ReturnedValue::Primitive(Primitive::Int(0)))
        );
        let PathOutcome::Returned(ReturnedValue::Primitive(Primitive::Int(result))) = report.solutions[1].outcome
        else {
            anyhow::bail!("Unexpected outcome {:?}", report.solutions[1].outcome);
        };
        let Some(Primitive::Int(input)) = report.solutions[1].inputs.get("arg0").copied() else {
            anyhow::bail!("Missing input");
        };
        assert_eq!(result, input.wrapping_add(1));

        Ok(())
    }
}
