//! This module contains the handle through which a host steers a running
//! virtual machine: interruption, pausing and single-stepping.
//!
//! The virtual machine calls [`ExecutionControl::checkpoint`] at every
//! instruction boundary. All waiting happens there, and an interruption wakes
//! any waiting checkpoint.

use parking_lot::{Condvar, Mutex};

use crate::vm::fault::AbortReason;

#[derive(Debug, Default)]
struct ControlState {
    stepping:    bool,
    permits:     usize,
    paused:      bool,
    interrupted: bool,
}

/// A control handle shared between a virtual machine and its host.
#[derive(Debug, Default)]
pub struct ExecutionControl {
    state:   Mutex<ControlState>,
    changed: Condvar,
}

impl ExecutionControl {
    /// Creates a control handle, starting in single-step mode if `stepping`
    /// is set.
    #[must_use]
    pub fn new(stepping: bool) -> Self {
        let state = Mutex::new(ControlState {
            stepping,
            ..ControlState::default()
        });
        Self {
            state,
            changed: Condvar::new(),
        }
    }

    /// Turns single-step mode on or off. Turning it off lets a waiting
    /// checkpoint continue.
    pub fn set_single_step(&self, stepping: bool) {
        let mut state = self.state.lock();
        state.stepping = stepping;
        state.permits = 0;
        self.changed.notify_all();
    }

    /// Allows one more instruction to execute in single-step mode.
    pub fn step(&self) {
        self.state.lock().permits += 1;
        self.changed.notify_all();
    }

    /// Suspends execution at the next instruction boundary.
    pub fn pause(&self) {
        self.state.lock().paused = true;
    }

    pub fn resume(&self) {
        self.state.lock().paused = false;
        self.changed.notify_all();
    }

    /// Asks the virtual machine to stop at the next instruction boundary.
    pub fn interrupt(&self) {
        self.state.lock().interrupted = true;
        self.changed.notify_all();
    }

    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.state.lock().interrupted
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    #[must_use]
    pub fn is_single_stepping(&self) -> bool {
        self.state.lock().stepping
    }

    /// Waits until the next instruction may execute.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if execution was interrupted, including while waiting.
    pub fn checkpoint(&self) -> Result<(), AbortReason> {
        let mut state = self.state.lock();
        loop {
            if state.interrupted {
                return Err(AbortReason::Interrupted);
            }
            if state.paused || (state.stepping && state.permits == 0) {
                self.changed.wait(&mut state);
                continue;
            }
            if state.stepping {
                state.permits -= 1;
            }
            return Ok(());
        }
    }
}
