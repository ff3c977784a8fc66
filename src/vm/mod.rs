//! This module contains the dual-mode virtual machine.
//!
//! The same interpreter loop drives both execution modes. In
//! [`ExecutionMode::Concrete`] every operand is a concrete value and a run
//! ends with the single result of the entry method. In
//! [`ExecutionMode::Symbolic`] the inputs are symbolic terms, instructions
//! whose outcome depends on a term open choice points, and the run explores
//! every feasible path through the entry method (see [`crate::search`]).

pub mod control;
pub mod data;
pub mod entry;
pub mod exception;
pub mod fault;
pub mod invoke;
pub mod objects;
pub mod state;
pub mod value;

use std::{sync::Arc, time::Duration};

pub use entry::{Argument, EntryPoint, Outcome, ReturnedValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::{
    class::MetadataProvider,
    constant::{
        DEFAULT_GC_THRESHOLD,
        DEFAULT_ITERATIONS_PER_INSTRUCTION,
        DEFAULT_ITERATIVE_DEEPENING_INCREMENT,
        DEFAULT_ITERATIVE_DEEPENING_INITIAL_DEPTH,
        DEFAULT_MAX_CALL_DEPTH,
        DEFAULT_MAX_GENERATED_ARRAY_LENGTH,
        DEFAULT_MAX_HEAP_OBJECTS,
        DEFAULT_MAX_INSTRUCTIONS_WITHOUT_NEW_SOLUTION,
        JAVA_LANG_CLASS,
        JAVA_LANG_OBJECT,
        JAVA_LANG_STRING,
    },
    error::{
        self,
        container::{Locatable, Location},
        execution::{Error, Result},
    },
    native::{NativeForwarder, StandardForwarder},
    search::{parallel::Partition, SearchState, SearchStrategy},
    solver::{BoundedSolver, SolverManager, SolverStatistics},
    vm::{
        control::ExecutionControl,
        fault::{AbortReason, Fault, Flow, PathEnd},
        state::{
            frame::{Frame, PcUpdate},
            heap::HeapRef,
            FrameId,
            StackElement,
            State,
        },
        value::Value,
    },
    watchdog::{DynWatchdog, LazyWatchdog},
};

/// The ways in which the virtual machine can execute instructions.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum ExecutionMode {
    /// Operands are concrete values and there is exactly one path.
    #[default]
    Concrete,

    /// Inputs are symbolic and every feasible path is explored.
    Symbolic,
}

/// How the main loop stopped executing frames.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Termination {
    /// The outermost frame of the run returned, with a value unless it was
    /// `void`.
    Returned(Option<Value>),

    /// An exception propagated out of the outermost frame of the run.
    Uncaught(HeapRef),
}

/// The virtual machine that executes methods in either execution mode.
///
/// # State
///
/// All state that a path of execution builds up lives in [`State`]: frames are
/// kept in an arena and referred to by [`FrameId`], and objects live in the
/// heap and are referred to by [`HeapRef`]. The call stack holds the frames
/// that are waiting for a callee, along with values returned by frames that
/// have not yet been delivered to their invoker.
///
/// # Collaborators
///
/// Classes are resolved through a [`MetadataProvider`], branch feasibility is
/// decided by a [`SolverManager`], and native methods are handed to a
/// [`NativeForwarder`].
#[derive(Debug)]
pub struct VirtualMachine {
    pub(crate) metadata: Arc<dyn MetadataProvider>,

    pub(crate) config: Config,

    /// The mode in which instructions are currently executed. This is forced
    /// to [`ExecutionMode::Concrete`] while running class initialisers.
    pub(crate) mode: ExecutionMode,

    pub(crate) state: State,

    pub(crate) call_stack: Vec<StackElement>,

    /// The frame that is currently executing.
    pub(crate) current: Option<FrameId>,

    /// A frame to resume in place of popping the call stack, as after an
    /// exception was caught or the search backtracked.
    pub(crate) preloaded: Option<FrameId>,

    /// Set by instructions that leave the current frame, so that the main loop
    /// picks the next frame from the call stack.
    pub(crate) frame_switch: bool,

    pub(crate) solver: Box<dyn SolverManager>,

    pub(crate) native: Arc<dyn NativeForwarder>,

    /// A watchdog that gets polled at intervals to check whether execution
    /// needs to stop.
    watchdog: DynWatchdog,

    control: Arc<ExecutionControl>,

    pub(crate) search: SearchState,

    genesis_complete: bool,

    /// The number of instructions executed over the lifetime of the machine.
    executed: usize,
}

impl VirtualMachine {
    /// Constructs a new virtual machine that resolves classes through
    /// `metadata`.
    ///
    /// It uses a [`BoundedSolver`], the [`StandardForwarder`] for native
    /// methods, and a watchdog that never asks it to stop. Use the `with_*`
    /// methods to replace them.
    #[must_use]
    pub fn new(metadata: Arc<dyn MetadataProvider>, config: Config) -> Self {
        let control = Arc::new(ExecutionControl::new(config.single_step));
        let search = SearchState::new(&config);
        let state = State::new(config.max_heap_objects);

        Self {
            metadata,
            mode: config.mode,
            state,
            call_stack: vec![],
            current: None,
            preloaded: None,
            frame_switch: false,
            solver: Box::new(BoundedSolver::new()),
            native: Arc::new(StandardForwarder),
            watchdog: LazyWatchdog.in_arc(),
            control,
            search,
            genesis_complete: false,
            executed: 0,
            config,
        }
    }

    /// Replaces the constraint solver.
    #[must_use]
    pub fn with_solver(mut self, solver: Box<dyn SolverManager>) -> Self {
        self.solver = solver;
        self
    }

    /// Replaces the forwarder for native methods.
    #[must_use]
    pub fn with_native(mut self, native: Arc<dyn NativeForwarder>) -> Self {
        self.native = native;
        self
    }

    /// Replaces the watchdog.
    #[must_use]
    pub fn with_watchdog(mut self, watchdog: DynWatchdog) -> Self {
        self.watchdog = watchdog;
        self
    }

    /// Replaces the control handle, such as with one shared with a host.
    #[must_use]
    pub fn with_control(mut self, control: Arc<ExecutionControl>) -> Self {
        self.control = control;
        self
    }

    /// Restricts a symbolic exploration to one worker's share of the paths.
    #[must_use]
    pub fn with_partition(mut self, partition: Partition) -> Self {
        self.search.partition = Some(partition);
        self
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Gets the mode in which instructions are currently executed.
    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    #[must_use]
    pub fn state(&self) -> &State {
        &self.state
    }

    #[must_use]
    pub fn call_stack(&self) -> &[StackElement] {
        &self.call_stack
    }

    #[must_use]
    pub fn metadata(&self) -> &Arc<dyn MetadataProvider> {
        &self.metadata
    }

    /// Gets the control handle through which the machine can be paused,
    /// stepped or interrupted.
    #[must_use]
    pub fn control(&self) -> &Arc<ExecutionControl> {
        &self.control
    }

    #[must_use]
    pub fn solver_statistics(&self) -> SolverStatistics {
        self.solver.statistics()
    }

    /// Gets the number of instructions the machine has executed.
    #[must_use]
    pub fn instructions_executed(&self) -> usize {
        self.executed
    }

    /// Gets the frame that is currently executing, if any.
    #[must_use]
    pub fn current_frame(&self) -> Option<&Frame> {
        self.current.and_then(|id| self.state.frame(id).ok())
    }

    /// Initialises the configured bootstrap classes, if that has not been done
    /// yet.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if a bootstrap class cannot be resolved or its
    /// initialiser fails.
    pub fn perform_universe_genesis(&mut self) -> error::Result<()> {
        self.genesis().map_err(|fault| self.fault_error(fault))
    }

    /// Runs the method described by `entry` in the configured execution mode.
    ///
    /// In concrete mode the outcome is that of the single execution of the
    /// method. In symbolic mode it is [`Outcome::Explored`], carrying every
    /// path found by the search.
    pub fn run(&mut self, entry: &EntryPoint) -> Outcome {
        info!(
            class = %entry.class,
            method = %entry.name,
            descriptor = %entry.descriptor,
            mode = ?self.config.mode,
            "starting run"
        );
        self.mode = self.config.mode;
        let outcome = match self.config.mode {
            ExecutionMode::Concrete => self.run_concrete(entry),
            ExecutionMode::Symbolic => self.explore(entry),
        };
        info!(outcome = %outcome, instructions = self.executed, "run finished");
        outcome
    }

    fn run_concrete(&mut self, entry: &EntryPoint) -> Outcome {
        let result = self
            .genesis()
            .and_then(|()| self.enter(entry))
            .and_then(|()| self.run_main_loop(0));
        match result {
            Ok(Termination::Returned(value)) => {
                let returned = value.map_or(ReturnedValue::Void, |v| self.describe(&v, None));
                Outcome::Success(returned)
            }
            Ok(Termination::Uncaught(exception)) => {
                let (class, message) = self.describe_exception(exception);
                Outcome::UncaughtException { class, message }
            }
            Err(fault) => self.outcome_of_fault(fault),
        }
    }

    /// Initialises the bootstrap classes once.
    pub(crate) fn genesis(&mut self) -> Flow {
        if self.genesis_complete {
            return Ok(());
        }
        for class in self.config.bootstrap_classes.clone() {
            self.ensure_initialized(&class)?;
        }
        self.genesis_complete = true;
        debug!(classes = self.config.bootstrap_classes.len(), "performed universe genesis");
        Ok(())
    }

    /// Executes frames from the call stack until the stack shrinks to `base`
    /// elements.
    ///
    /// Nested runs (class initialisers) pass the height of the call stack at
    /// the time they start, so that they stop once their own outermost frame
    /// has finished.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] for every fault other than a caught guest exception.
    pub(crate) fn run_main_loop(&mut self, base: usize) -> std::result::Result<Termination, Fault> {
        loop {
            let id = match self.preloaded.take() {
                Some(id) => id,
                None => {
                    if self.call_stack.len() <= base {
                        return Ok(Termination::Returned(None));
                    }
                    match self.call_stack.pop() {
                        Some(StackElement::Frame(id)) => id,
                        Some(StackElement::ReturnValue(value)) => {
                            if self.call_stack.len() <= base {
                                return Ok(Termination::Returned(Some(value)));
                            }
                            let Some(StackElement::Frame(invoker)) = self.call_stack.pop() else {
                                return Err(Error::UnexpectedReturnValue.into());
                            };
                            self.state.frame_mut(invoker)?.stack_mut().push(value)?;
                            invoker
                        }
                        None => return Err(Error::NoCurrentFrame.into()),
                    }
                }
            };

            self.current = Some(id);
            match self.execute_frame(id) {
                Ok(()) => (),
                Err(Fault::Throw(throwable)) => match self.handle_exception(throwable, base)? {
                    exception::Handled::Resume(frame) => self.preloaded = Some(frame),
                    exception::Handled::Uncaught(exception) => {
                        self.current = None;
                        return Ok(Termination::Uncaught(exception));
                    }
                },
                Err(fault) => return Err(fault),
            }
            self.state.release_frames(self.search.frame_floor());
        }
    }

    /// Executes instructions of the frame `id` until it becomes inactive or
    /// control moves to another frame.
    fn execute_frame(&mut self, id: FrameId) -> Flow {
        self.frame_switch = false;
        let method = self.state.frame(id)?.method().clone();
        let code = method.instructions()?.clone();
        let qualified = method.qualified_name().clone();
        if self.mode == ExecutionMode::Symbolic {
            self.search.coverage.enter_method(&qualified, code.instruction_count());
        }
        let poll_every = self.watchdog.poll_every().max(1);

        while self.state.frame(id)?.is_active() {
            let pc = self.state.frame(id)?.pc();
            let Some(decoded) = code.instruction(pc) else {
                return Err(if (pc as usize) < code.len() {
                    Error::NotAnInstruction { pc }
                } else {
                    Error::InstructionPointerOutOfBounds {
                        requested: pc as usize,
                        available: code.len(),
                    }
                }
                .into());
            };

            self.control.checkpoint().map_err(Fault::Abort)?;
            self.executed += 1;
            if self.executed % poll_every == 0 && self.watchdog.should_stop() {
                return Err(Fault::Abort(AbortReason::Watchdog));
            }
            self.collect_garbage_if_due();
            if self.mode == ExecutionMode::Symbolic {
                self.before_symbolic_instruction(&qualified, pc)?;
            }

            trace!(method = %qualified, pc, mnemonic = decoded.mnemonic(), "executing");
            {
                let frame = self.state.frame_mut(id)?;
                frame.set_last_pc(pc);
                frame.set_pc_update(PcUpdate::Advance);
            }
            let execute = decoded.instruction.behavior_for(self.mode);
            execute(self, decoded)?;

            let frame = self.state.frame_mut(id)?;
            if frame.pc_update() == PcUpdate::Advance {
                frame.set_pc(decoded.next_pc());
            }
            if self.frame_switch {
                self.frame_switch = false;
                return Ok(());
            }
        }

        Ok(())
    }

    /// Runs the per-instruction bookkeeping of symbolic mode: the loop limit,
    /// coverage and the search limits.
    fn before_symbolic_instruction(&mut self, method: &Arc<str>, pc: u32) -> Flow {
        let search = &mut self.search;
        search.visits.mark_visited(method, pc);
        if search.visits.over_visit_limit(method, pc) {
            return Err(Fault::PathEnd(PathEnd::LoopLimit));
        }
        search.coverage.record(method, pc);
        search.statistics.instructions += 1;
        search.instructions_since_solution += 1;

        if search.instructions_since_solution > self.config.max_instructions_without_new_solution {
            return Err(Fault::Abort(AbortReason::InstructionBudget));
        }
        if let (Some(limit), Some(started)) = (self.config.time_limit, search.started) {
            if started.elapsed() > limit {
                return Err(Fault::Abort(AbortReason::WallClock));
            }
        }
        Ok(())
    }

    /// Reclaims unreachable heap objects once enough allocations have
    /// happened, unless a choice point might still need them.
    fn collect_garbage_if_due(&mut self) {
        if !self.search.choice_points.is_empty()
            || self.state.heap().allocations_since_collection() < self.config.gc_threshold
        {
            return;
        }

        let mut roots = self.state.roots();
        roots.extend(self.call_stack.iter().filter_map(|element| match element {
            StackElement::ReturnValue(Value::Reference(r)) => Some(*r),
            _ => None,
        }));
        let freed = self.state.heap_mut().collect(roots);
        debug!(freed, live = self.state.heap().live(), "collected garbage");
    }

    /// Gets the id of the frame that is currently executing.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if no frame is executing.
    pub(crate) fn current_frame_id(&self) -> Result<FrameId> {
        self.current.ok_or(Error::NoCurrentFrame)
    }

    /// Gets the frame that is currently executing.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if no frame is executing.
    pub(crate) fn frame(&self) -> Result<&Frame> {
        self.state.frame(self.current_frame_id()?)
    }

    /// Gets the frame that is currently executing for modification.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if no frame is executing.
    pub(crate) fn frame_mut(&mut self) -> Result<&mut Frame> {
        let id = self.current_frame_id()?;
        self.state.frame_mut(id)
    }

    /// Pops the top of the current operand stack.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the stack is empty.
    pub(crate) fn pop(&mut self) -> Result<Value> {
        self.frame_mut()?.stack_mut().pop()
    }

    /// Pops `count` items off the current operand stack, deepest first.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the stack holds fewer than `count` items.
    pub(crate) fn pop_many(&mut self, count: usize) -> Result<Vec<Value>> {
        self.frame_mut()?.stack_mut().pop_many(count)
    }

    /// Pushes `value` onto the current operand stack.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the stack is full.
    pub(crate) fn push(&mut self, value: impl Into<Value>) -> Result<()> {
        self.frame_mut()?.stack_mut().push(value.into())
    }

    /// Reads the item at `depth` of the current operand stack.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if there is no such item.
    pub(crate) fn peek(&self, depth: usize) -> Result<&Value> {
        self.frame()?.stack().read(depth)
    }

    /// Gets the location of the instruction executing in the current frame.
    #[must_use]
    pub(crate) fn location(&self) -> Location {
        match self.frame() {
            Ok(frame) => Location::new(frame.method().qualified_name().clone(), frame.last_pc()),
            Err(_) => Location::default(),
        }
    }

    /// Converts a fault that ended a run into the library error describing it.
    pub(crate) fn fault_error(&mut self, fault: Fault) -> error::LocatedError {
        let location = self.location();
        match fault {
            Fault::Fatal(error) => error::Error::from(error).locate(location),
            Fault::Throw(throwable) => {
                let description = match self.materialize_throwable(throwable) {
                    Ok(exception) => self.describe_exception(exception).0,
                    Err(error) => error.to_string(),
                };
                error::Error::other(format!("Uncaught exception {description}")).locate(location)
            }
            Fault::PathEnd(end) => {
                error::Error::other(format!("Path ended outside of a search: {end:?}")).locate(location)
            }
            Fault::Abort(reason) => error::Error::other(reason.to_string()).locate(location),
        }
    }

    /// Converts a fault that ended a concrete run into its outcome.
    pub(crate) fn outcome_of_fault(&mut self, fault: Fault) -> Outcome {
        match fault {
            Fault::Abort(reason) => {
                info!(%reason, "run aborted");
                Outcome::Aborted(reason)
            }
            Fault::Throw(throwable) => match self.materialize_throwable(throwable) {
                Ok(exception) => {
                    let (class, message) = self.describe_exception(exception);
                    Outcome::UncaughtException { class, message }
                }
                Err(error) => Outcome::Error(self.fault_error(error.into())),
            },
            fault => Outcome::Error(self.fault_error(fault)),
        }
    }
}

/// The configuration for the virtual machine instance.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Config {
    /// The mode in which the entry method is run.
    ///
    /// Defaults to [`ExecutionMode::Concrete`].
    pub mode: ExecutionMode,

    /// The maximum number of frames that may be live at once.
    ///
    /// Defaults to [`DEFAULT_MAX_CALL_DEPTH`].
    pub max_call_depth: usize,

    /// The maximum number of live heap objects.
    ///
    /// Defaults to [`DEFAULT_MAX_HEAP_OBJECTS`].
    pub max_heap_objects: usize,

    /// The number of allocations between two garbage collections.
    ///
    /// Defaults to [`DEFAULT_GC_THRESHOLD`].
    pub gc_threshold: usize,

    /// The maximum number of times that one instruction may be executed on a
    /// single symbolic path.
    ///
    /// Defaults to [`DEFAULT_ITERATIONS_PER_INSTRUCTION`].
    pub iterations_per_instruction: usize,

    /// The number of instructions that the search may execute without finding
    /// a new solution before it gives up.
    ///
    /// Defaults to [`DEFAULT_MAX_INSTRUCTIONS_WITHOUT_NEW_SOLUTION`].
    pub max_instructions_without_new_solution: usize,

    /// The wall-clock time after which the search gives up, if any.
    pub time_limit: Option<Duration>,

    /// The percentage of instruction coverage at which the search stops, if
    /// any.
    pub coverage_target: Option<u8>,

    /// The largest length considered for arrays generated for symbolic array
    /// inputs.
    ///
    /// Defaults to [`DEFAULT_MAX_GENERATED_ARRAY_LENGTH`].
    pub max_generated_array_length: usize,

    /// The order in which the search explores paths.
    pub search_strategy: SearchStrategy,

    /// The choice-point depth explored by the first round of iterative
    /// deepening.
    ///
    /// Defaults to [`DEFAULT_ITERATIVE_DEEPENING_INITIAL_DEPTH`].
    pub iterative_deepening_initial_depth: usize,

    /// The depth added between two rounds of iterative deepening.
    ///
    /// Defaults to [`DEFAULT_ITERATIVE_DEEPENING_INCREMENT`].
    pub iterative_deepening_increment: usize,

    /// Whether the machine starts in single-step mode.
    pub single_step: bool,

    /// The classes that are initialised before the entry method runs.
    pub bootstrap_classes: Vec<String>,
}

impl Config {
    /// Sets the `mode` config parameter to `value`.
    #[must_use]
    pub fn with_mode(mut self, value: ExecutionMode) -> Self {
        self.mode = value;
        self
    }

    /// Sets the `max_call_depth` config parameter to `value`.
    #[must_use]
    pub fn with_max_call_depth(mut self, value: usize) -> Self {
        self.max_call_depth = value;
        self
    }

    /// Sets the `max_heap_objects` config parameter to `value`.
    #[must_use]
    pub fn with_max_heap_objects(mut self, value: usize) -> Self {
        self.max_heap_objects = value;
        self
    }

    /// Sets the `gc_threshold` config parameter to `value`.
    #[must_use]
    pub fn with_gc_threshold(mut self, value: usize) -> Self {
        self.gc_threshold = value;
        self
    }

    /// Sets the `iterations_per_instruction` config parameter to `value`.
    #[must_use]
    pub fn with_iterations_per_instruction(mut self, value: usize) -> Self {
        self.iterations_per_instruction = value;
        self
    }

    /// Sets the `max_instructions_without_new_solution` config parameter to
    /// `value`.
    #[must_use]
    pub fn with_max_instructions_without_new_solution(mut self, value: usize) -> Self {
        self.max_instructions_without_new_solution = value;
        self
    }

    /// Sets the `time_limit` config parameter to `value`.
    #[must_use]
    pub fn with_time_limit(mut self, value: Duration) -> Self {
        self.time_limit = Some(value);
        self
    }

    /// Sets the `coverage_target` config parameter to `percent`, capped at 100.
    #[must_use]
    pub fn with_coverage_target(mut self, percent: u8) -> Self {
        self.coverage_target = Some(percent.min(100));
        self
    }

    /// Sets the `max_generated_array_length` config parameter to `value`.
    #[must_use]
    pub fn with_max_generated_array_length(mut self, value: usize) -> Self {
        self.max_generated_array_length = value;
        self
    }

    /// Sets the `search_strategy` config parameter to `value`.
    #[must_use]
    pub fn with_search_strategy(mut self, value: SearchStrategy) -> Self {
        self.search_strategy = value;
        self
    }

    /// Sets the iterative deepening depths to `initial` and `increment`.
    #[must_use]
    pub fn with_iterative_deepening(mut self, initial: usize, increment: usize) -> Self {
        self.iterative_deepening_initial_depth = initial;
        self.iterative_deepening_increment = increment.max(1);
        self
    }

    /// Sets the `single_step` config parameter to `value`.
    #[must_use]
    pub fn with_single_step(mut self, value: bool) -> Self {
        self.single_step = value;
        self
    }

    /// Sets the `bootstrap_classes` config parameter to `classes`.
    #[must_use]
    pub fn with_bootstrap_classes(mut self, classes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.bootstrap_classes = classes.into_iter().map(Into::into).collect();
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        let mode = ExecutionMode::default();
        let max_call_depth = DEFAULT_MAX_CALL_DEPTH;
        let max_heap_objects = DEFAULT_MAX_HEAP_OBJECTS;
        let gc_threshold = DEFAULT_GC_THRESHOLD;
        let iterations_per_instruction = DEFAULT_ITERATIONS_PER_INSTRUCTION;
        let max_instructions_without_new_solution = DEFAULT_MAX_INSTRUCTIONS_WITHOUT_NEW_SOLUTION;
        let max_generated_array_length = DEFAULT_MAX_GENERATED_ARRAY_LENGTH;
        let iterative_deepening_initial_depth = DEFAULT_ITERATIVE_DEEPENING_INITIAL_DEPTH;
        let iterative_deepening_increment = DEFAULT_ITERATIVE_DEEPENING_INCREMENT;
        let bootstrap_classes = [JAVA_LANG_OBJECT, JAVA_LANG_STRING, JAVA_LANG_CLASS]
            .map(String::from)
            .to_vec();
        Self {
            mode,
            max_call_depth,
            max_heap_objects,
            gc_threshold,
            iterations_per_instruction,
            max_instructions_without_new_solution,
            time_limit: None,
            coverage_target: None,
            max_generated_array_length,
            search_strategy: SearchStrategy::default(),
            iterative_deepening_initial_depth,
            iterative_deepening_increment,
            single_step: false,
            bootstrap_classes,
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::{
        bytecode,
        class::{ClassBuilder, ClassLibrary, MethodBuilder},
        error::execution::Error,
        opcode::code::{branch, GOTO, ICONST_3, ICONST_4, IADD, IRETURN, NOP},
        vm::{
            fault::AbortReason,
            Config,
            EntryPoint,
            Outcome,
            ReturnedValue,
            VirtualMachine,
        },
        watchdog::FlagWatchdog,
    };

    fn library(code: Vec<u8>) -> anyhow::Result<Arc<ClassLibrary>> {
        let class = ClassBuilder::new("Main")
            .method(
                MethodBuilder::new("run", "()I")
                    .static_method()
                    .code(code)
                    .max_stack(2),
            )
            .build()?;
        Ok(Arc::new(ClassLibrary::with_core_classes()?.with(class)))
    }

    #[test]
    fn runs_a_method_to_completion() -> anyhow::Result<()> {
        let library = library(bytecode![ICONST_3, ICONST_4, IADD, IRETURN])?;
        let mut vm = VirtualMachine::new(library, Config::default());
        let outcome = vm.run(&EntryPoint::new("Main", "run", "()I"));

        assert!(matches!(outcome, Outcome::Success(ReturnedValue::Primitive(p)) if p.as_int() == Some(7)));
        assert!(vm.instructions_executed() >= 4);
        assert!(vm.call_stack().is_empty());

        Ok(())
    }

    #[test]
    fn genesis_only_happens_once() -> anyhow::Result<()> {
        let library = library(bytecode![ICONST_3, IRETURN])?;
        let mut vm = VirtualMachine::new(library, Config::default());
        vm.perform_universe_genesis()?;
        let initialised = vm.state().frame_count();
        vm.perform_universe_genesis()?;
        assert_eq!(vm.state().frame_count(), initialised);
        assert!(vm.state().is_initialized("java/lang/Object"));

        Ok(())
    }

    #[test]
    fn the_watchdog_aborts_endless_loops() -> anyhow::Result<()> {
        let library = library(bytecode![NOP, GOTO, branch(-1)])?;
        let flag = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let watchdog = FlagWatchdog::new(flag).polling_every(10).in_arc();
        let mut vm = VirtualMachine::new(library, Config::default()).with_watchdog(watchdog);

        let outcome = vm.run(&EntryPoint::new("Main", "run", "()I"));
        assert!(matches!(outcome, Outcome::Aborted(AbortReason::Watchdog)));

        Ok(())
    }

    #[test]
    fn unknown_entry_classes_are_fatal() -> anyhow::Result<()> {
        let library = library(bytecode![ICONST_3, IRETURN])?;
        let mut vm = VirtualMachine::new(library, Config::default());
        let outcome = vm.run(&EntryPoint::new("Missing", "run", "()I"));

        let Outcome::Error(error) = outcome else {
            anyhow::bail!("Expected an error but got {outcome:?}");
        };
        assert_eq!(
            error.payload.to_string(),
            Error::NoSuchClass {
                name: "Missing".to_string(),
            }
            .to_string()
        );

        Ok(())
    }
}
