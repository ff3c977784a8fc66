//! This module contains the values manipulated by the virtual machine.
//!
//! A [`Value`] is one of a concrete primitive, the null reference, a handle to
//! a heap object, or (in symbolic mode only) a symbolic [`Term`].

pub mod constraint;
pub mod primitive;
pub mod term;

use std::fmt::Display;

pub use constraint::Constraint;
pub use primitive::{BinaryOp, Comparison, Conversion, EvalError, Kind, Primitive, UnaryOp};
pub use term::{Assignment, Term, Variable};

use crate::{error::execution, vm::state::heap::HeapRef};

/// A value held on an operand stack, in a local variable, or in the heap.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Primitive(Primitive),
    Null,
    Reference(HeapRef),
    Term(Term),
}

impl Value {
    /// Creates an `int` value.
    #[must_use]
    pub fn int(value: i32) -> Self {
        Value::Primitive(Primitive::Int(value))
    }

    /// Creates a `long` value.
    #[must_use]
    pub fn long(value: i64) -> Self {
        Value::Primitive(Primitive::Long(value))
    }

    /// Creates a `float` value.
    #[must_use]
    pub fn float(value: f32) -> Self {
        Value::Primitive(Primitive::Float(value))
    }

    /// Creates a `double` value.
    #[must_use]
    pub fn double(value: f64) -> Self {
        Value::Primitive(Primitive::Double(value))
    }

    /// Gets the primitive kind of the value, if it is a primitive or a term.
    #[must_use]
    pub fn kind(&self) -> Option<Kind> {
        match self {
            Value::Primitive(p) => Some(p.kind()),
            Value::Term(t) => Some(t.kind()),
            Value::Null | Value::Reference(_) => None,
        }
    }

    /// Gets the number of stack or local slots that the value occupies.
    #[must_use]
    pub fn category(&self) -> usize {
        self.kind().map_or(1, Kind::category)
    }

    /// Checks if the value is a reference (possibly null).
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self, Value::Null | Value::Reference(_))
    }

    /// Gets the concrete primitive value, folding constant terms.
    #[must_use]
    pub fn as_primitive(&self) -> Option<Primitive> {
        match self {
            Value::Primitive(p) => Some(*p),
            Value::Term(t) => t.as_constant(),
            Value::Null | Value::Reference(_) => None,
        }
    }

    /// Gets the value as a term of the given `kind`, lifting primitives into
    /// constants.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the value is not of kind `kind`.
    pub fn into_term(self, kind: Kind) -> execution::Result<Term> {
        match self {
            Value::Primitive(p) if p.kind() == kind => Ok(Term::Constant(p)),
            Value::Term(t) if t.kind() == kind => Ok(t),
            other => Err(other.mismatch(kind)),
        }
    }

    /// Gets the concrete primitive value of the given `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the value is not a concrete primitive of `kind`.
    pub fn into_primitive(self, kind: Kind) -> execution::Result<Primitive> {
        match self.as_primitive() {
            Some(p) if p.kind() == kind => Ok(p),
            _ => Err(self.mismatch(kind)),
        }
    }

    /// Builds the error for a value that was expected to be of `expected`.
    #[must_use]
    pub fn mismatch(&self, expected: impl Display) -> execution::Error {
        execution::Error::TypeMismatch {
            expected: expected.to_string(),
            found:    self.type_name(),
        }
    }

    /// Describes the type of the value for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> String {
        match self {
            Value::Primitive(p) => p.kind().to_string(),
            Value::Null => "null".to_string(),
            Value::Reference(_) => "reference".to_string(),
            Value::Term(t) => format!("symbolic {}", t.kind()),
        }
    }
}

impl From<Primitive> for Value {
    fn from(value: Primitive) -> Self {
        Value::Primitive(value)
    }
}

impl From<Term> for Value {
    /// Constant terms are stored as plain primitives.
    fn from(value: Term) -> Self {
        match value {
            Term::Constant(p) => Value::Primitive(p),
            other => Value::Term(other),
        }
    }
}

impl From<HeapRef> for Value {
    fn from(value: HeapRef) -> Self {
        Value::Reference(value)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Primitive(p) => write!(f, "{p}"),
            Value::Null => write!(f, "null"),
            Value::Reference(r) => write!(f, "{r}"),
            Value::Term(t) => write!(f, "{t}"),
        }
    }
}

/// The content of a local variable slot.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum LocalSlot {
    /// The slot has never been written.
    #[default]
    Undefined,

    /// The slot holds a value.
    Bound(Value),

    /// The slot holds the upper half of the category-2 value in the slot below.
    Upper,
}

impl LocalSlot {
    /// Checks if the slot has been bound to a value.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        matches!(self, LocalSlot::Bound(_))
    }
}

#[cfg(test)]
mod test {
    use crate::vm::value::{Kind, Primitive, Term, Value, Variable};

    #[test]
    fn constant_terms_become_primitives() {
        let value = Value::from(Term::from(Primitive::Int(3)));
        assert_eq!(value, Value::int(3));
    }

    #[test]
    fn categories_follow_kinds() {
        assert_eq!(Value::long(1).category(), 2);
        assert_eq!(Value::Null.category(), 1);
        let d = Value::Term(Term::variable(Variable::fresh("d", Kind::Double)));
        assert_eq!(d.category(), 2);
    }

    #[test]
    fn primitives_are_lifted_into_terms() -> anyhow::Result<()> {
        let term = Value::int(5).into_term(Kind::Int)?;
        assert_eq!(term.as_constant(), Some(Primitive::Int(5)));
        Value::int(5)
            .into_term(Kind::Long)
            .expect_err("An int was accepted as a long");

        Ok(())
    }
}
