//! This module contains common utilities for simplifying the writing of
//! integration tests for this library.

#![cfg(test)]

use std::sync::Arc;

use anyhow::anyhow;
use symbex_vm::{
    class::{Class, ClassBuilder, ClassLibrary, MethodBuilder},
    search::SearchReport,
    vm::{Config, EntryPoint, ExecutionMode, Outcome, VirtualMachine},
};

/// The name of the class that [`single_method`] puts its method in.
#[allow(unused)] // It is actually
pub const MAIN: &str = "Main";

/// Builds a library containing the core classes and `classes`.
#[allow(unused)] // It is actually
pub fn library(classes: Vec<Class>) -> anyhow::Result<Arc<ClassLibrary>> {
    let library = classes
        .into_iter()
        .fold(ClassLibrary::with_core_classes()?, ClassLibrary::with);
    Ok(Arc::new(library))
}

/// Builds a library whose class [`MAIN`] has the single static method `run`
/// with the provided `descriptor` and `code`.
///
/// The method is given plenty of room on its operand stack and in its locals.
#[allow(unused)] // It is actually
pub fn single_method(descriptor: &str, code: Vec<u8>) -> anyhow::Result<Arc<ClassLibrary>> {
    let class = ClassBuilder::new(MAIN)
        .method(
            MethodBuilder::new("run", descriptor)
                .static_method()
                .code(code)
                .max_stack(8)
                .max_locals(8),
        )
        .build()?;
    library(vec![class])
}

/// Gets the entry point of the method built by [`single_method`].
#[allow(unused)] // It is actually
pub fn run_entry(descriptor: &str) -> EntryPoint {
    EntryPoint::new(MAIN, "run", descriptor)
}

/// Constructs a virtual machine in `mode` over `library`, using the default
/// configuration otherwise.
#[allow(unused)] // It is actually
pub fn new_vm(library: &Arc<ClassLibrary>, mode: ExecutionMode) -> VirtualMachine {
    VirtualMachine::new(library.clone(), Config::default().with_mode(mode))
}

/// Explores `entry` symbolically with the provided `config`, returning the
/// report of the search.
#[allow(unused)] // It is actually
pub fn explore(library: &Arc<ClassLibrary>, config: Config, entry: &EntryPoint) -> anyhow::Result<SearchReport> {
    let mut vm = VirtualMachine::new(library.clone(), config.with_mode(ExecutionMode::Symbolic));
    into_report(vm.run(entry))
}

/// Gets the report out of the `outcome` of a symbolic run.
#[allow(unused)] // It is actually
pub fn into_report(outcome: Outcome) -> anyhow::Result<SearchReport> {
    match outcome {
        Outcome::Explored(report) => Ok(report),
        other => Err(anyhow!("Expected an exploration report but got {other}")),
    }
}

/// Gets the method code from the provided hex-encoded string `code`.
///
/// This hex-encoded string may or may not start with the `0x` prefix. Both
/// cases will be handled.
#[allow(unused)] // It is actually
pub fn get_bytecode_from_string(code: impl Into<String>) -> anyhow::Result<Vec<u8>> {
    let code_string = code.into();
    let no_0x_prefix = code_string.strip_prefix("0x").unwrap_or(&code_string);

    let bytecode = hex::decode(no_0x_prefix).map_err(|_| anyhow!("Could not decode hex"))?;
    Ok(bytecode)
}
