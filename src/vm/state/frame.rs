//! This module contains the activation record of a single method invocation.

use std::sync::Arc;

use crate::{
    class::Method,
    error::execution::{Error, Result},
    vm::{
        state::{heap::HeapRef, stack::OperandStack, FrameId},
        value::{LocalSlot, Value},
    },
};

/// How the program counter of a frame moves once the current instruction has
/// completed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PcUpdate {
    /// Move on to the instruction that follows.
    #[default]
    Advance,

    /// The instruction already set the program counter.
    Jumped,

    /// Execute the same instruction again.
    Repeat,
}

/// The monitor held by a synchronized method for the duration of its
/// execution.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Monitor {
    /// The monitor of an object, for instance methods.
    Object(HeapRef),

    /// The monitor of a class, for static methods.
    Class(Arc<str>),
}

/// The parts of a frame that a choice point snapshots and restores wholesale.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameControl {
    pub pc:      u32,
    pub last_pc: u32,
    pub active:  bool,
    pub stack:   OperandStack,
    pub monitor: Option<Monitor>,
}

/// A frame: the operand stack, local variables and program counter of one
/// invocation of a method.
///
/// # Locals
///
/// Local variable slots start out [`LocalSlot::Undefined`]. A `long` or
/// `double` occupies its own slot plus an [`LocalSlot::Upper`] marker in the
/// slot above it, and overwriting either half of such a value invalidates the
/// other half.
#[derive(Clone, Debug)]
pub struct Frame {
    method:    Arc<Method>,
    stack:     OperandStack,
    locals:    Vec<LocalSlot>,
    pc:        u32,
    last_pc:   u32,
    invoker:   Option<FrameId>,
    active:    bool,
    monitor:   Option<Monitor>,
    pc_update: PcUpdate,
}

impl Frame {
    /// Creates the frame for an invocation of `method` by the frame `invoker`,
    /// binding `receiver` (for instance methods) to slot 0 and the `arguments`
    /// after it.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the arguments do not fit in the method's locals.
    pub fn new(
        method: Arc<Method>,
        invoker: Option<FrameId>,
        receiver: Option<Value>,
        arguments: Vec<Value>,
    ) -> Result<Self> {
        let mut frame = Self {
            stack: OperandStack::new(method.max_stack()),
            locals: vec![LocalSlot::Undefined; method.max_locals()],
            pc: 0,
            last_pc: 0,
            invoker,
            active: true,
            monitor: None,
            pc_update: PcUpdate::Advance,
            method,
        };

        let mut index = 0;
        for value in receiver.into_iter().chain(arguments) {
            let width = value.category();
            frame.set_local(index, value)?;
            index += width;
        }

        Ok(frame)
    }

    /// Gets the method that the frame executes.
    #[must_use]
    pub fn method(&self) -> &Arc<Method> {
        &self.method
    }

    #[must_use]
    pub fn stack(&self) -> &OperandStack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut OperandStack {
        &mut self.stack
    }

    /// Gets the offset of the next instruction to execute.
    #[must_use]
    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
    }

    /// Gets the offset of the instruction that executed most recently, which
    /// is where the frame looks for exception handlers.
    #[must_use]
    pub fn last_pc(&self) -> u32 {
        self.last_pc
    }

    pub fn set_last_pc(&mut self, last_pc: u32) {
        self.last_pc = last_pc;
    }

    /// Gets the frame that invoked this one, if any.
    #[must_use]
    pub fn invoker(&self) -> Option<FrameId> {
        self.invoker
    }

    /// Checks if the frame is still executing.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    #[must_use]
    pub fn monitor(&self) -> Option<&Monitor> {
        self.monitor.as_ref()
    }

    pub fn set_monitor(&mut self, monitor: Option<Monitor>) {
        self.monitor = monitor;
    }

    /// Removes the monitor from the frame, returning it.
    pub fn take_monitor(&mut self) -> Option<Monitor> {
        self.monitor.take()
    }

    #[must_use]
    pub fn pc_update(&self) -> PcUpdate {
        self.pc_update
    }

    pub fn set_pc_update(&mut self, update: PcUpdate) {
        self.pc_update = update;
    }

    /// Continues execution at `target`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `target` is not the start of an instruction of the
    /// frame's method.
    pub fn jump(&mut self, target: i64) -> Result<()> {
        let code = self.method.instructions()?;
        let pc = u32::try_from(target)
            .ok()
            .filter(|pc| code.is_instruction_start(*pc))
            .ok_or(Error::InvalidJumpTarget { target })?;
        self.pc = pc;
        self.pc_update = PcUpdate::Jumped;
        Ok(())
    }

    /// Gets the number of local variable slots.
    #[must_use]
    pub fn local_count(&self) -> usize {
        self.locals.len()
    }

    /// Reads the local variable at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `index` is out of bounds or the slot does not hold a
    /// value.
    pub fn local(&self, index: usize) -> Result<&Value> {
        match self.locals.get(index) {
            Some(LocalSlot::Bound(value)) => Ok(value),
            Some(_) => Err(Error::UndefinedLocal { index }),
            None => Err(self.out_of_bounds(index)),
        }
    }

    /// Gets the raw slot at `index`.
    #[must_use]
    pub fn slot(&self, index: usize) -> Option<&LocalSlot> {
        self.locals.get(index)
    }

    /// Writes `value` to the local variable at `index`, returning the previous
    /// content of every slot that changed.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the value does not fit within the locals, in which
    /// case nothing is written.
    pub fn set_local(&mut self, index: usize, value: Value) -> Result<Vec<(usize, LocalSlot)>> {
        let width = value.category();
        if index + width > self.locals.len() {
            return Err(self.out_of_bounds(index + width - 1));
        }

        let written = index..index + width;
        let mut touched = vec![];
        for slot in written.clone() {
            match &self.locals[slot] {
                LocalSlot::Upper if slot > 0 && !written.contains(&(slot - 1)) => {
                    touched.push(slot - 1);
                }
                LocalSlot::Bound(old) if old.category() == 2 && !written.contains(&(slot + 1)) => {
                    touched.push(slot + 1);
                }
                _ => (),
            }
        }

        let mut previous = vec![];
        for slot in touched {
            let old = std::mem::take(&mut self.locals[slot]);
            previous.push((slot, old));
        }
        previous.push((index, std::mem::replace(&mut self.locals[index], LocalSlot::Bound(value))));
        if width == 2 {
            previous.push((index + 1, std::mem::replace(&mut self.locals[index + 1], LocalSlot::Upper)));
        }

        Ok(previous)
    }

    /// Puts `slot` back at `index`, as when undoing a [`Self::set_local`].
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `index` is out of bounds.
    pub fn restore_local(&mut self, index: usize, slot: LocalSlot) -> Result<()> {
        let available = self.locals.len();
        let target = self
            .locals
            .get_mut(index)
            .ok_or(Error::LocalIndexOutOfBounds { index, available })?;
        *target = slot;
        Ok(())
    }

    /// Iterates over every value held by the frame, on its operand stack and
    /// in its locals.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.stack.iter().chain(self.locals.iter().filter_map(|slot| match slot {
            LocalSlot::Bound(value) => Some(value),
            _ => None,
        }))
    }

    /// Captures the control state of the frame.
    #[must_use]
    pub fn control(&self) -> FrameControl {
        FrameControl {
            pc:      self.pc,
            last_pc: self.last_pc,
            active:  self.active,
            stack:   self.stack.clone(),
            monitor: self.monitor.clone(),
        }
    }

    /// Restores control state captured by [`Self::control`].
    pub fn restore_control(&mut self, control: FrameControl) {
        self.pc = control.pc;
        self.last_pc = control.last_pc;
        self.active = control.active;
        self.stack = control.stack;
        self.monitor = control.monitor;
        self.pc_update = PcUpdate::Jumped;
    }

    fn out_of_bounds(&self, index: usize) -> Error {
        Error::LocalIndexOutOfBounds {
            index,
            available: self.locals.len(),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::{
        bytecode,
        class::{ClassBuilder, Method, MethodBuilder},
        error::execution::Error,
        opcode::code::{GOTO, NOP, RETURN, branch},
        vm::{
            state::frame::{Frame, PcUpdate},
            value::{LocalSlot, Value},
        },
    };

    fn method(max_locals: u16) -> anyhow::Result<Arc<Method>> {
        let class = ClassBuilder::new("F")
            .method(
                MethodBuilder::new("m", "()V")
                    .static_method()
                    .code(bytecode![NOP, GOTO, branch(-1), RETURN])
                    .max_stack(2)
                    .max_locals(max_locals),
            )
            .build()?;
        Ok(class.methods()[0].clone())
    }

    #[test]
    fn binds_receiver_and_wide_arguments() -> anyhow::Result<()> {
        let frame = Frame::new(
            method(4)?,
            None,
            Some(Value::Null),
            vec![Value::long(7), Value::int(1)],
        )?;
        assert_eq!(frame.local(0)?, &Value::Null);
        assert_eq!(frame.local(1)?, &Value::long(7));
        assert_eq!(frame.slot(2), Some(&LocalSlot::Upper));
        assert_eq!(frame.local(3)?, &Value::int(1));

        Ok(())
    }

    #[test]
    fn rejects_arguments_that_do_not_fit() -> anyhow::Result<()> {
        let error = Frame::new(method(1)?, None, None, vec![Value::double(1.0)])
            .expect_err("A double fit in a single slot");
        assert_eq!(error, Error::LocalIndexOutOfBounds {
            index:     1,
            available: 1,
        });

        Ok(())
    }

    #[test]
    fn undefined_locals_cannot_be_read() -> anyhow::Result<()> {
        let frame = Frame::new(method(2)?, None, None, vec![])?;
        assert_eq!(
            frame.local(1).expect_err("Read an unassigned local"),
            Error::UndefinedLocal { index: 1 }
        );
        assert_eq!(
            frame.local(2).expect_err("Read past the locals"),
            Error::LocalIndexOutOfBounds {
                index:     2,
                available: 2,
            }
        );

        Ok(())
    }

    #[test]
    fn overwriting_half_of_a_wide_value_invalidates_it() -> anyhow::Result<()> {
        let mut frame = Frame::new(method(3)?, None, None, vec![Value::double(2.0)])?;
        let previous = frame.set_local(1, Value::int(5))?;
        assert_eq!(frame.slot(0), Some(&LocalSlot::Undefined));
        assert_eq!(frame.local(1)?, &Value::int(5));

        for (index, slot) in previous.into_iter().rev() {
            frame.restore_local(index, slot)?;
        }
        assert_eq!(frame.local(0)?, &Value::double(2.0));
        assert_eq!(frame.slot(1), Some(&LocalSlot::Upper));

        Ok(())
    }

    #[test]
    fn jumps_only_to_instruction_starts() -> anyhow::Result<()> {
        let mut frame = Frame::new(method(0)?, None, None, vec![])?;
        frame.jump(4)?;
        assert_eq!((frame.pc(), frame.pc_update()), (4, PcUpdate::Jumped));
        assert_eq!(
            frame.jump(2).expect_err("Jumped into operand bytes"),
            Error::InvalidJumpTarget { target: 2 }
        );
        frame.jump(-1).expect_err("Jumped before the code");

        Ok(())
    }
}
