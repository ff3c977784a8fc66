//! This module contains the description of the method a run starts in, the
//! arguments a host passes to it, and the outcome of the run.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{
    class::{FieldType, Method},
    constant::{JAVA_LANG_OBJECT, JAVA_LANG_STRING, THROWABLE_MESSAGE_FIELD},
    error::{
        execution::{Error, Result},
        LocatedError,
    },
    search::SearchReport,
    vm::{
        fault::{AbortReason, Flow},
        state::{
            frame::Frame,
            heap::{HeapObject, HeapRef},
            StackElement,
        },
        value::{Assignment, Primitive, Value},
        ExecutionMode,
        VirtualMachine,
    },
};

/// The method a run starts in.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct EntryPoint {
    pub class:      String,
    pub name:       String,
    pub descriptor: String,

    /// The arguments of a concrete run. Symbolic runs ignore them and make up
    /// symbolic inputs instead.
    pub arguments: Vec<Argument>,
}

impl EntryPoint {
    /// Creates an entry point for the method `class.name descriptor` with no
    /// arguments.
    #[must_use]
    pub fn new(class: &str, name: &str, descriptor: &str) -> Self {
        Self {
            class:      class.to_string(),
            name:       name.to_string(),
            descriptor: descriptor.to_string(),
            arguments:  vec![],
        }
    }

    /// Adds `argument` after the existing arguments.
    #[must_use]
    pub fn with_argument(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    /// Replaces the arguments with `arguments`.
    #[must_use]
    pub fn with_arguments(mut self, arguments: Vec<Argument>) -> Self {
        self.arguments = arguments;
        self
    }
}

/// An argument passed by a host to the entry method of a concrete run.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum Argument {
    Primitive(Primitive),
    Null,
    Str(String),

    /// An array with elements of the type described by the field descriptor
    /// `component`.
    Array {
        component: String,
        elements:  Vec<Argument>,
    },
}

impl From<Primitive> for Argument {
    fn from(value: Primitive) -> Self {
        Argument::Primitive(value)
    }
}

impl From<i32> for Argument {
    fn from(value: i32) -> Self {
        Argument::Primitive(Primitive::Int(value))
    }
}

/// A description of a value that the guest program produced, detached from
/// the heap it lives in.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum ReturnedValue {
    /// The method returned no value.
    Void,
    Primitive(Primitive),
    Null,
    Object { class: String },
    Array { component: String, length: usize },
    Str(String),

    /// A value that depends on inputs for which no assignment was available.
    Symbolic(String),
}

impl Display for ReturnedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReturnedValue::Void => write!(f, "void"),
            ReturnedValue::Primitive(p) => write!(f, "{p}"),
            ReturnedValue::Null => write!(f, "null"),
            ReturnedValue::Object { class } => write!(f, "instance of {class}"),
            ReturnedValue::Array { component, length } => write!(f, "{component}[{length}]"),
            ReturnedValue::Str(text) => write!(f, "{text:?}"),
            ReturnedValue::Symbolic(term) => write!(f, "{term}"),
        }
    }
}

/// The result of a run of the virtual machine.
#[derive(Clone, Debug)]
pub enum Outcome {
    /// The entry method returned normally.
    Success(ReturnedValue),

    /// An exception propagated out of the entry method.
    UncaughtException {
        class:   String,
        message: Option<String>,
    },

    /// The engine hit a fatal error.
    Error(LocatedError),

    /// The run was stopped before it finished.
    Aborted(AbortReason),

    /// A symbolic run explored the paths through the entry method.
    Explored(SearchReport),
}

impl Outcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Checks if the run was stopped before it finished. A symbolic run that
    /// stopped early still carries the report of what it explored.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        match self {
            Outcome::Aborted(_) => true,
            Outcome::Explored(report) => !report.is_complete(),
            _ => false,
        }
    }

    /// Gets the value returned by a successful run.
    #[must_use]
    pub fn returned_value(&self) -> Option<&ReturnedValue> {
        match self {
            Outcome::Success(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&LocatedError> {
        match self {
            Outcome::Error(error) => Some(error),
            _ => None,
        }
    }

    /// Gets the report of a symbolic run.
    #[must_use]
    pub fn report(&self) -> Option<&SearchReport> {
        match self {
            Outcome::Explored(report) => Some(report),
            _ => None,
        }
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Success(value) => write!(f, "returned {value}"),
            Outcome::UncaughtException { class, message } => match message {
                Some(message) => write!(f, "uncaught {class}: {message}"),
                None => write!(f, "uncaught {class}"),
            },
            Outcome::Error(error) => write!(f, "error {error}"),
            Outcome::Aborted(reason) => write!(f, "aborted: {reason}"),
            Outcome::Explored(report) => write!(
                f,
                "explored {} solutions{}",
                report.solutions.len(),
                report.aborted.map(|r| format!(" (aborted: {r})")).unwrap_or_default()
            ),
        }
    }
}

impl VirtualMachine {
    /// Pushes the frame for the entry method of a run onto the call stack.
    pub(crate) fn enter(&mut self, entry: &EntryPoint) -> Flow {
        let method = self
            .metadata
            .resolve_method(&entry.class, &entry.name, &entry.descriptor)?;
        if method.is_abstract() || method.is_native() {
            return Err(Error::MissingCode {
                method: method.qualified_name().to_string(),
            }
            .into());
        }
        self.ensure_initialized(method.class())?;

        let (receiver, arguments) = match self.mode {
            ExecutionMode::Concrete => self.concrete_arguments(&method, &entry.arguments)?,
            ExecutionMode::Symbolic => self.symbolic_arguments(&method)?,
        };
        let frame = Frame::new(method, None, receiver, arguments)?;
        let id = self.state.push_frame(frame);
        self.call_stack.push(StackElement::Frame(id));
        Ok(())
    }

    /// Materialises the host-provided `arguments` of `method` in the heap.
    ///
    /// Instance methods receive a fresh instance of their class as the
    /// receiver; no constructor runs for it.
    fn concrete_arguments(
        &mut self,
        method: &Method,
        arguments: &[Argument],
    ) -> Result<(Option<Value>, Vec<Value>)> {
        let parameters = method.descriptor().parameters();
        if parameters.len() != arguments.len() {
            return Err(Error::EntryArgumentMismatch {
                method:   method.qualified_name().to_string(),
                expected: parameters.len(),
                provided: arguments.len(),
            });
        }

        let receiver = if method.is_static() {
            None
        } else {
            Some(Value::Reference(self.new_instance(method.class())?))
        };
        let values = parameters
            .iter()
            .zip(arguments)
            .map(|(parameter, argument)| self.materialize_argument(argument, parameter))
            .collect::<Result<Vec<_>>>()?;
        Ok((receiver, values))
    }

    fn materialize_argument(&mut self, argument: &Argument, expected: &FieldType) -> Result<Value> {
        match argument {
            Argument::Primitive(p) => match expected.kind() {
                Some(kind) if kind == p.kind() => Ok(Value::Primitive(*p)),
                _ => Err(Value::Primitive(*p).mismatch(expected)),
            },
            Argument::Null if expected.is_reference() => Ok(Value::Null),
            Argument::Str(text) if Self::accepts_strings(expected) => {
                Ok(Value::Reference(self.intern_string(text)?))
            }
            Argument::Array { component, elements } => {
                let component: FieldType = component.parse()?;
                if *expected != FieldType::Array(Box::new(component.clone())) {
                    return Err(Error::TypeMismatch {
                        expected: expected.to_string(),
                        found:    format!("[{component}"),
                    });
                }
                let elements = elements
                    .iter()
                    .map(|element| self.materialize_argument(element, &component))
                    .collect::<Result<Vec<_>>>()?;
                let array = self.allocate(HeapObject::Array { component, elements })?;
                Ok(Value::Reference(array))
            }
            Argument::Null | Argument::Str(_) => Err(Error::TypeMismatch {
                expected: expected.to_string(),
                found:    "reference".to_string(),
            }),
        }
    }

    fn accepts_strings(expected: &FieldType) -> bool {
        matches!(expected, FieldType::Object(name) if [JAVA_LANG_STRING, JAVA_LANG_OBJECT].contains(&name.as_ref()))
    }

    /// Makes up symbolic inputs for the receiver and parameters of `method`.
    fn symbolic_arguments(&mut self, method: &Method) -> Result<(Option<Value>, Vec<Value>)> {
        let receiver = if method.is_static() {
            None
        } else {
            let class = FieldType::Object(method.class().clone());
            Some(self.fresh_input("this", &class)?)
        };
        let values = method
            .descriptor()
            .parameters()
            .iter()
            .enumerate()
            .map(|(index, parameter)| self.fresh_input(&format!("arg{index}"), parameter))
            .collect::<Result<Vec<_>>>()?;
        Ok((receiver, values))
    }

    /// Describes `value`, evaluating symbolic terms under `witness` if one is
    /// given.
    pub(crate) fn describe(&self, value: &Value, witness: Option<&Assignment>) -> ReturnedValue {
        match value {
            Value::Primitive(p) => ReturnedValue::Primitive(*p),
            Value::Null => ReturnedValue::Null,
            Value::Term(term) => witness
                .and_then(|w| term.evaluate(w).ok())
                .map_or_else(|| ReturnedValue::Symbolic(term.to_string()), ReturnedValue::Primitive),
            Value::Reference(r) => match self.state.heap().get(*r) {
                Ok(HeapObject::Str(text)) => ReturnedValue::Str(text.to_string()),
                Ok(HeapObject::Array { component, elements }) => ReturnedValue::Array {
                    component: component.to_string(),
                    length:    elements.len(),
                },
                Ok(HeapObject::Unresolved { name, .. }) => ReturnedValue::Symbolic(name.to_string()),
                Ok(object) => ReturnedValue::Object {
                    class: object.class_name(),
                },
                Err(_) => ReturnedValue::Symbolic(r.to_string()),
            },
        }
    }

    /// Gets the class name and message of the exception object `exception`.
    pub(crate) fn describe_exception(&self, exception: HeapRef) -> (String, Option<String>) {
        match self.state.heap().get(exception) {
            Ok(object) => {
                let message = match object {
                    HeapObject::Instance { fields, .. } => match fields.get(THROWABLE_MESSAGE_FIELD) {
                        Some(Value::Reference(text)) => {
                            self.state.heap().string(*text).map(ToString::to_string)
                        }
                        _ => None,
                    },
                    _ => None,
                };
                (object.class_name(), message)
            }
            Err(_) => (exception.to_string(), None),
        }
    }
}
