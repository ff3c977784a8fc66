//! This library implements a virtual machine for JVM bytecode that executes a
//! method either concretely, on real values, or symbolically, exploring every
//! feasible path through it and reporting inputs that drive execution down
//! each one.
//!
//! Note that this library does not parse class files, and does not verify the
//! code it runs. Classes are supplied by the host through a
//! [`class::MetadataProvider`].
//!
//! # How it Works
//!
//! From a very high level, a run proceeds as follows:
//!
//! 1. The code of each method is decoded on first use into an
//!    [`disassembly::InstructionTable`], mapping every instruction's offset to
//!    its entry in the [`opcode::InstructionSet`].
//! 2. The [`vm::VirtualMachine`] initialises the bootstrap classes and then
//!    invokes the entry method with the provided arguments, or with symbolic
//!    inputs in [`vm::ExecutionMode::Symbolic`].
//! 3. In symbolic mode, instructions whose outcome depends on a symbolic input
//!    open a choice point. Every change to the machine state is recorded on a
//!    trail, so that the search can backtrack to the most recent choice point
//!    and try its next alternative.
//! 4. Alternatives are filtered through a [`solver::SolverManager`], and every
//!    path that ends is reported as a [`search::Solution`].
//!
//! # Basic Usage
//!
//! ```
//! use std::sync::Arc;
//!
//! use symbex_vm::{
//!     bytecode,
//!     class::{ClassBuilder, ClassLibrary, MethodBuilder},
//!     opcode::code::*,
//!     vm::{value::Primitive, Config, EntryPoint, ExecutionMode, ReturnedValue, VirtualMachine},
//! };
//!
//! // static int sign(int x) { return x < 0 ? -1 : 1; }
//! let code = bytecode![ILOAD_0, IFGE, branch(5), ICONST_M1, IRETURN, ICONST_1, IRETURN];
//! let class = ClassBuilder::new("Main")
//!     .method(
//!         MethodBuilder::new("sign", "(I)I")
//!             .static_method()
//!             .code(code)
//!             .max_stack(1)
//!             .max_locals(1),
//!     )
//!     .build()
//!     .unwrap();
//! let library = Arc::new(ClassLibrary::with_core_classes().unwrap().with(class));
//!
//! // Run it on a concrete argument.
//! let entry = EntryPoint::new("Main", "sign", "(I)I");
//! let mut vm = VirtualMachine::new(library.clone(), Config::default());
//! let outcome = vm.run(&entry.clone().with_argument((-5).into()));
//! assert_eq!(outcome.returned_value(), Some(&ReturnedValue::Primitive(Primitive::Int(-1))));
//!
//! // Explore both of its paths.
//! let config = Config::default().with_mode(ExecutionMode::Symbolic);
//! let mut vm = VirtualMachine::new(library, config);
//! let outcome = vm.run(&entry);
//! assert_eq!(outcome.report().unwrap().solutions.len(), 2);
//! ```

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming

pub mod application;
pub mod class;
pub mod constant;
pub mod disassembly;
pub mod error;
pub mod native;
pub mod opcode;
pub mod search;
pub mod solver;
pub mod vm;
pub mod watchdog;

// Re-exports to provide the library interface.
pub use application::Application;
pub use vm::VirtualMachine;
