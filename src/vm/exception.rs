//! This module contains the propagation of guest exceptions through the
//! exception tables of the frames on the call stack.

use tracing::debug;

use crate::{
    constant::THROWABLE_MESSAGE_FIELD,
    error::execution::{Error, Result},
    vm::{
        fault::{Fault, Throwable},
        state::{heap::HeapRef, FrameId, StackElement},
        value::Value,
        VirtualMachine,
    },
};

/// Where an exception ended up after propagating.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Handled {
    /// A handler caught it; execution resumes in the given frame.
    Resume(FrameId),

    /// It propagated out of the outermost frame of the run.
    Uncaught(HeapRef),
}

impl VirtualMachine {
    /// Turns `throwable` into an exception object in the heap, allocating one
    /// for exceptions raised by the engine.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the heap is full.
    pub(crate) fn materialize_throwable(&mut self, throwable: Throwable) -> Result<HeapRef> {
        match throwable {
            Throwable::Object(exception) => Ok(exception),
            Throwable::Raise { class, message } => {
                let exception = self.new_instance(&class)?;
                let message = match message {
                    Some(text) => Value::Reference(self.intern_string(&text)?),
                    None => Value::Null,
                };
                self.write_field(exception, THROWABLE_MESSAGE_FIELD.into(), message)?;
                Ok(exception)
            }
        }
    }

    /// Propagates `throwable`, thrown by the instruction last executed in the
    /// current frame, to the innermost handler that catches it.
    ///
    /// Frames without a matching handler are discarded, releasing the monitor
    /// they hold. Propagation stops at the frame at height `base` of the call
    /// stack, which is the outermost frame of the current run.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the exception cannot be allocated or the call stack
    /// is corrupt.
    pub(crate) fn handle_exception(&mut self, throwable: Throwable, base: usize) -> std::result::Result<Handled, Fault> {
        let exception = self.materialize_throwable(throwable)?;
        let class = self.state.heap().get(exception)?.class_name();
        let mut id = self.current_frame_id()?;

        loop {
            let frame = self.state.frame(id)?;
            let method = frame.method().clone();
            let handler = method
                .find_handler(frame.last_pc(), |catch| self.metadata.is_subclass_of(&class, catch))
                .map(|handler| handler.handler_pc);

            if let Some(handler_pc) = handler {
                debug!(exception = %class, method = %method.qualified_name(), handler_pc, "caught exception");
                let frame = self.state.frame_mut(id)?;
                frame.stack_mut().clear();
                frame.stack_mut().push(Value::Reference(exception))?;
                frame.jump(i64::from(handler_pc))?;
                self.current = Some(id);
                return Ok(Handled::Resume(id));
            }

            self.leave_frame(id)?;
            if self.call_stack.len() <= base {
                debug!(exception = %class, "exception left the run");
                return Ok(Handled::Uncaught(exception));
            }
            match self.call_stack.pop() {
                Some(StackElement::Frame(invoker)) => {
                    id = invoker;
                    self.current = Some(id);
                }
                _ => return Err(Error::UnexpectedReturnValue.into()),
            }
        }
    }

    /// Deactivates the frame `id`, clearing its operand stack and releasing
    /// the monitor it holds.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if there is no such frame.
    pub(crate) fn leave_frame(&mut self, id: FrameId) -> Result<()> {
        let frame = self.state.frame_mut(id)?;
        frame.set_active(false);
        frame.stack_mut().clear();
        if let Some(monitor) = frame.take_monitor() {
            self.state.exit_monitor(&monitor);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::{
        bytecode,
        class::{ClassBuilder, ClassLibrary, ConstantPool, MethodBuilder},
        opcode::code::{
            index,
            ACONST_NULL,
            ARRAYLENGTH,
            ASTORE_0,
            ATHROW,
            DUP,
            ICONST_1,
            ICONST_2,
            INVOKESPECIAL,
            INVOKESTATIC,
            IRETURN,
            NEW,
            POP,
        },
        vm::{entry::EntryPoint, value::Primitive, Config, Outcome, ReturnedValue, VirtualMachine},
    };

    #[test]
    fn handlers_catch_exceptions_from_callees() -> anyhow::Result<()> {
        let mut pool = ConstantPool::new();
        let callee = pool.method("Main", "fail", "()I");
        let class = ClassBuilder::new("Main")
            .method(
                MethodBuilder::new("fail", "()I")
                    .static_method()
                    .code(bytecode![ACONST_NULL, ARRAYLENGTH, IRETURN])
                    .max_stack(1),
            )
            .method(
                MethodBuilder::new("run", "()I")
                    .static_method()
                    // 0: invokestatic, 3: ireturn, 4: astore_0, 5: iconst_2, 6: ireturn
                    .code(bytecode![INVOKESTATIC, index(callee), IRETURN, ASTORE_0, ICONST_2, IRETURN])
                    .handler(0, 4, 4, Some("java/lang/NullPointerException"))
                    .max_stack(1)
                    .max_locals(1),
            )
            .pool(pool)
            .build()?;
        let library = ClassLibrary::with_core_classes()?.with(class);

        let mut vm = VirtualMachine::new(Arc::new(library), Config::default());
        let outcome = vm.run(&EntryPoint::new("Main", "run", "()I"));
        assert_eq!(outcome.returned_value(), Some(&ReturnedValue::Primitive(Primitive::Int(2))));

        Ok(())
    }

    #[test]
    fn uncaught_exceptions_end_the_run() -> anyhow::Result<()> {
        let mut pool = ConstantPool::new();
        let class_index = pool.class("java/lang/IllegalArgumentException");
        let constructor = pool.method("java/lang/IllegalArgumentException", "<init>", "()V");
        let class = ClassBuilder::new("Main")
            .method(
                MethodBuilder::new("run", "()I")
                    .static_method()
                    .code(bytecode![
                        NEW,
                        index(class_index),
                        DUP,
                        INVOKESPECIAL,
                        index(constructor),
                        ATHROW,
                        POP,
                        ICONST_1,
                        IRETURN
                    ])
                    .max_stack(2),
            )
            .pool(pool)
            .build()?;
        let library = ClassLibrary::with_core_classes()?.with(class);

        let mut vm = VirtualMachine::new(Arc::new(library), Config::default());
        match vm.run(&EntryPoint::new("Main", "run", "()I")) {
            Outcome::UncaughtException { class, message } => {
                assert_eq!(class, "java/lang/IllegalArgumentException");
                assert_eq!(message, None);
            }
            other => anyhow::bail!("Unexpected outcome {other}"),
        }

        Ok(())
    }
}
