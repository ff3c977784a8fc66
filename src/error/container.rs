//! This module contains the generic containers used to attach code locations
//! to errors and to aggregate errors.

use std::{
    fmt::{Display, Formatter},
    sync::Arc,
};

use thiserror::Error;

/// A position in the guest program: an optional method and a byte offset into
/// its code.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Location {
    /// The qualified name of the method (`Class.name(descriptor)`), if known.
    pub method: Option<Arc<str>>,

    /// The byte offset of the instruction within the method's code.
    pub pc: u32,
}

impl Location {
    /// Constructs a location at `pc` inside `method`.
    #[must_use]
    pub fn new(method: Arc<str>, pc: u32) -> Self {
        let method = Some(method);
        Self { method, pc }
    }
}

/// A bare byte offset is a location in an unknown method.
impl From<u32> for Location {
    fn from(pc: u32) -> Self {
        Self { method: None, pc }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.method {
            Some(method) => write!(f, "{method}@{:#06x}", self.pc),
            None => write!(f, "{:#06x}", self.pc),
        }
    }
}

/// An error that is localised to a particular instruction in the guest program.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub struct Located<E>
where
    E: Clone,
{
    /// The location of the instruction where the error occurred.
    pub location: Location,

    /// The error data
    pub payload: E,
}

/// Displays the error prefixed by the location where it occurred.
impl<E> Display for Located<E>
where
    E: Display + Clone,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.location, self.payload)
    }
}

/// A trait for types that can have a code location attached to them.
pub trait Locatable
where
    Self: Sized,
{
    /// The return type with the attached location.
    type Located;

    /// Attach the provided `location` to the error.
    fn locate(self, location: impl Into<Location>) -> Self::Located;
}

/// A blanket implementation that allows for attaching a location to any result.
impl<T, E> Locatable for Result<T, E>
where
    E: std::error::Error + Clone,
{
    type Located = Result<T, Located<E>>;

    fn locate(self, location: impl Into<Location>) -> Self::Located {
        self.map_err(|e| Located {
            location: location.into(),
            payload:  e,
        })
    }
}

/// An error that is a collection of errors.
///
/// The order of the errors in the container is dependent on the contained type
/// `E`, but defaults to the order in which the errors were added to the
/// container.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub struct Errors<E> {
    payloads: Vec<E>,
}

impl<E> Errors<E> {
    /// Creates a new container for errors.
    #[must_use]
    pub fn new() -> Self {
        let payloads = vec![];
        Self { payloads }
    }

    /// Gets the errors contained within this error.
    #[must_use]
    pub fn payloads(&self) -> &[E] {
        self.payloads.as_slice()
    }

    /// Gets the length of the errors container.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    /// Checks if the errors container is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E> Errors<E>
where
    E: std::error::Error,
{
    /// Adds the provided `error` to the container.
    pub fn add(&mut self, error: E) {
        self.payloads.push(error);
    }

    /// Moves all of the errors from `other` into this container.
    pub fn absorb(&mut self, other: Errors<E>) {
        self.payloads.extend(other.payloads);
    }
}

/// Where the locations are known, the container keeps the errors sorted by
/// location, preserving insertion order between errors at the same location.
impl<E> Errors<Located<E>>
where
    E: std::error::Error + Clone,
{
    /// Adds an error `payload` at the specified `location`.
    pub fn add_located(&mut self, location: impl Into<Location>, payload: E) {
        let error = Located {
            location: location.into(),
            payload,
        };
        self.payloads.push(error);
        self.sort();
    }

    /// Sorts the errors based on their location.
    fn sort(&mut self) {
        self.payloads.sort_by(|l, r| l.location.cmp(&r.location));
    }
}

/// The default errors container is one containing no errors.
impl<E> Default for Errors<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Allow conversion from any error type to a container of errors.
impl<E> From<E> for Errors<E>
where
    E: std::error::Error,
{
    fn from(value: E) -> Self {
        let mut errors = Self::default();
        errors.add(value);
        errors
    }
}

/// Allow conversion from the errors container to a vector of errors.
impl<E> From<Errors<E>> for Vec<E>
where
    E: std::error::Error,
{
    fn from(value: Errors<E>) -> Self {
        value.payloads
    }
}

/// Displays the errors in the sequence in which they occur in the container.
///
/// It has a header specifying how many errors occurred, and then prints one
/// error per line after that.
impl<E> Display for Errors<E>
where
    E: Display,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.payloads.is_empty() {
            write!(f, "Encountered no errors")?;
        } else {
            writeln!(f, "Encountered {} errors:", self.payloads.len())?;
            for error in &self.payloads {
                writeln!(f, "{error}")?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::error::{
        container::{Locatable, Location},
        execution,
    };

    #[test]
    fn displays_method_and_pc() {
        let error = execution::Error::OperandStackUnderflow
            .locate(Location::new(Arc::from("Foo.bar()V"), 4));
        assert_eq!(
            error.to_string(),
            "[Foo.bar()V@0x0004]: Tried to pop from an empty operand stack"
        );
    }

    #[test]
    fn keeps_located_errors_sorted() {
        let mut errors = execution::Errors::new();
        errors.add_located(9, execution::Error::OperandStackUnderflow);
        errors.add_located(2, execution::Error::NoCurrentFrame);
        let locations: Vec<u32> = errors.payloads().iter().map(|e| e.location.pc).collect();
        assert_eq!(locations, vec![2, 9]);
    }
}
