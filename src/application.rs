//! This module contains the [`Application`], the host-facing handle that runs
//! one virtual machine on a thread of its own.
//!
//! # Lifecycle
//!
//! An application is created ready to run, is started exactly once, and is
//! finished once its thread has been joined. While it runs, the host steers
//! it through the shared [`ExecutionControl`]: it can pause, resume and
//! single-step it, or abort it at the next instruction boundary.

use std::{
    any::Any,
    sync::Arc,
    thread::{self, JoinHandle},
};

use tracing::{debug, info, warn};

use crate::{
    class::MetadataProvider,
    error::{self, container::Locatable, Error},
    vm::{control::ExecutionControl, Config, EntryPoint, Outcome, ReturnedValue, VirtualMachine},
};

/// The name of the threads applications run on.
pub const THREAD_NAME: &str = "symbex-vm";

/// Where an application is in its lifecycle.
#[derive(Debug)]
enum Status {
    /// Created but not started.
    Ready(Box<VirtualMachine>),

    /// Running on its own thread.
    Running(JoinHandle<(VirtualMachine, Outcome)>),

    /// Joined. The virtual machine is gone if its thread panicked.
    Finished {
        virtual_machine: Option<Box<VirtualMachine>>,
        outcome:         Outcome,
    },

    /// Transient state while moving between the others.
    Poisoned,
}

/// A virtual machine running an entry point on a dedicated thread.
#[derive(Debug)]
pub struct Application {
    entry:   EntryPoint,
    control: Arc<ExecutionControl>,
    status:  Status,
}

impl Application {
    /// Creates an application that runs `entry` on a new virtual machine
    /// resolving classes through `metadata`.
    #[must_use]
    pub fn new(metadata: Arc<dyn MetadataProvider>, config: Config, entry: EntryPoint) -> Self {
        Self::with_virtual_machine(VirtualMachine::new(metadata, config), entry)
    }

    /// Creates an application that runs `entry` on `virtual_machine`, such as
    /// one with a custom solver or native forwarder.
    #[must_use]
    pub fn with_virtual_machine(virtual_machine: VirtualMachine, entry: EntryPoint) -> Self {
        let control = virtual_machine.control().clone();
        Self {
            entry,
            control,
            status: Status::Ready(Box::new(virtual_machine)),
        }
    }

    /// Starts running the entry point on a new thread.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the application was already started or the thread
    /// could not be spawned.
    pub fn start(&mut self) -> error::Result<()> {
        let virtual_machine = match std::mem::replace(&mut self.status, Status::Poisoned) {
            Status::Ready(virtual_machine) => virtual_machine,
            other => {
                self.status = other;
                return Err(Error::other("The application was already started").locate(0));
            }
        };
        info!(
            class = %self.entry.class,
            method = %self.entry.name,
            mode = ?virtual_machine.mode(),
            "starting application"
        );

        let entry = self.entry.clone();
        let mut virtual_machine = *virtual_machine;
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                let outcome = virtual_machine.run(&entry);
                (virtual_machine, outcome)
            })
            .map_err(|e| Error::other(format!("Could not spawn the execution thread: {e}")).locate(0))?;

        self.status = Status::Running(handle);
        Ok(())
    }

    /// Asks the running virtual machine to stop at the next instruction
    /// boundary. A blocked single-step or pause wait is woken up.
    pub fn abort(&self) {
        debug!("aborting application");
        self.control.interrupt();
    }

    /// Waits for the application to finish and returns its outcome. Joining
    /// a finished application returns the same outcome again.
    ///
    /// A panic on the execution thread becomes an [`Outcome::Error`].
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the application was never started.
    pub fn join(&mut self) -> error::Result<&Outcome> {
        match std::mem::replace(&mut self.status, Status::Poisoned) {
            Status::Running(handle) => {
                self.status = match handle.join() {
                    Ok((virtual_machine, outcome)) => {
                        debug!(%outcome, "application finished");
                        Status::Finished {
                            virtual_machine: Some(Box::new(virtual_machine)),
                            outcome,
                        }
                    }
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        warn!(%message, "execution thread panicked");
                        Status::Finished {
                            virtual_machine: None,
                            outcome:         Outcome::Error(
                                Error::other(format!("The execution thread panicked: {message}")).locate(0),
                            ),
                        }
                    }
                };
            }
            status @ Status::Finished { .. } => self.status = status,
            status => {
                self.status = status;
                return Err(Error::other("The application was never started").locate(0));
            }
        }

        match &self.status {
            Status::Finished { outcome, .. } => Ok(outcome),
            _ => Err(Error::other("The application did not finish").locate(0)),
        }
    }

    /// Checks if the application has finished running. It may still have to
    /// be joined to get its outcome.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        match &self.status {
            Status::Running(handle) => handle.is_finished(),
            Status::Finished { .. } => true,
            Status::Ready(_) | Status::Poisoned => false,
        }
    }

    /// Gets the outcome of a joined application.
    #[must_use]
    pub fn outcome(&self) -> Option<&Outcome> {
        match &self.status {
            Status::Finished { outcome, .. } => Some(outcome),
            _ => None,
        }
    }

    /// Gets the value returned by the entry method of a joined application
    /// that completed successfully.
    #[must_use]
    pub fn returned_object(&self) -> Option<&ReturnedValue> {
        self.outcome().and_then(Outcome::returned_value)
    }

    /// Checks if a joined application ended with an engine error or an
    /// uncaught exception.
    #[must_use]
    pub fn error_occurred(&self) -> bool {
        matches!(
            self.outcome(),
            Some(Outcome::Error(_) | Outcome::UncaughtException { .. })
        )
    }

    /// Describes the error or uncaught exception a joined application ended
    /// with.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        match self.outcome()? {
            Outcome::Error(error) => Some(error.to_string()),
            Outcome::UncaughtException { class, message } => Some(match message {
                Some(message) => format!("{class}: {message}"),
                None => class.clone(),
            }),
            _ => None,
        }
    }

    /// Gets the virtual machine while it is not running.
    #[must_use]
    pub fn virtual_machine(&self) -> Option<&VirtualMachine> {
        match &self.status {
            Status::Ready(virtual_machine) => Some(virtual_machine),
            Status::Finished { virtual_machine, .. } => virtual_machine.as_deref(),
            Status::Running(_) | Status::Poisoned => None,
        }
    }

    /// Gets the handle through which the host steers the virtual machine.
    #[must_use]
    pub fn control(&self) -> &Arc<ExecutionControl> {
        &self.control
    }

    #[must_use]
    pub fn entry(&self) -> &EntryPoint {
        &self.entry
    }
}

/// Extracts the message of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::{
        application::Application,
        bytecode,
        class::{ClassBuilder, ClassLibrary, MethodBuilder},
        opcode::code::*,
        vm::{value::Primitive, Config, EntryPoint, Outcome, ReturnedValue},
    };

    fn library(code: Vec<u8>, descriptor: &str) -> anyhow::Result<Arc<ClassLibrary>> {
        let class = ClassBuilder::new("Main")
            .method(
                MethodBuilder::new("run", descriptor)
                    .static_method()
                    .code(code)
                    .max_stack(2)
                    .max_locals(1),
            )
            .build()?;
        Ok(Arc::new(ClassLibrary::with_core_classes()?.with(class)))
    }

    #[test]
    fn runs_to_completion_on_its_own_thread() -> anyhow::Result<()> {
        let library = library(bytecode![ILOAD_0, ICONST_2, IMUL, IRETURN], "(I)I")?;
        let entry = EntryPoint::new("Main", "run", "(I)I").with_argument(21.into());
        let mut application = Application::new(library, Config::default(), entry);

        assert!(application.virtual_machine().is_some());
        application.start()?;
        assert!(application.start().is_err());
        application.join()?;

        assert!(application.is_finished());
        assert!(!application.error_occurred());
        assert_eq!(
            application.returned_object(),
            Some(&ReturnedValue::Primitive(Primitive::Int(42)))
        );
        assert!(application.virtual_machine().is_some());

        Ok(())
    }

    #[test]
    fn starting_twice_keeps_the_first_run_joinable() -> anyhow::Result<()> {
        // 0: goto +0
        let library = library(bytecode![GOTO, branch(0)], "()V")?;
        let mut application = Application::new(library, Config::default(), EntryPoint::new("Main", "run", "()V"));
        application.start()?;
        assert!(application.start().is_err());
        assert!(application.virtual_machine().is_none());

        application.abort();
        assert!(matches!(application.join()?, Outcome::Aborted(_)));
        assert!(application.is_finished());
        assert!(application.start().is_err());
        assert!(application.is_finished());

        Ok(())
    }

    #[test]
    fn joining_before_starting_fails() -> anyhow::Result<()> {
        let library = library(bytecode![RETURN], "()V")?;
        let mut application = Application::new(library, Config::default(), EntryPoint::new("Main", "run", "()V"));
        assert!(application.join().is_err());
        assert!(!application.is_finished());

        Ok(())
    }

    #[test]
    fn aborting_stops_an_endless_loop() -> anyhow::Result<()> {
        // 0: goto +0
        let library = library(bytecode![GOTO, branch(0)], "()V")?;
        let mut application = Application::new(library, Config::default(), EntryPoint::new("Main", "run", "()V"));
        application.start()?;
        application.abort();

        assert!(application.join()?.is_aborted());
        assert!(matches!(application.outcome(), Some(Outcome::Aborted(_))));
        assert_eq!(application.error_message(), None);

        Ok(())
    }

    #[test]
    fn uncaught_exceptions_are_reported_as_errors() -> anyhow::Result<()> {
        let library = library(bytecode![ICONST_1, ICONST_0, IDIV, IRETURN], "()I")?;
        let mut application = Application::new(library, Config::default(), EntryPoint::new("Main", "run", "()I"));
        application.start()?;
        application.join()?;

        assert!(application.error_occurred());
        assert_eq!(
            application.error_message().as_deref(),
            Some("java/lang/ArithmeticException: / by zero")
        );

        Ok(())
    }
}
