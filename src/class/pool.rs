//! This module contains the constant pool shared by the methods of a class.

use std::sync::Arc;

use crate::error::execution::{Error, Result};

/// A symbolic reference to a field or method.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct MemberRef {
    pub class:      Arc<str>,
    pub name:       Arc<str>,
    pub descriptor: Arc<str>,
}

/// An entry of the constant pool.
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(Arc<str>),
    Class(Arc<str>),
    Field(MemberRef),
    Method(MemberRef),
    InterfaceMethod(MemberRef),
}

impl Constant {
    /// Describes the kind of the entry for diagnostics.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Constant::Integer(_) => "integer",
            Constant::Float(_) => "float",
            Constant::Long(_) => "long",
            Constant::Double(_) => "double",
            Constant::String(_) => "string",
            Constant::Class(_) => "class reference",
            Constant::Field(_) => "field reference",
            Constant::Method(_) => "method reference",
            Constant::InterfaceMethod(_) => "interface method reference",
        }
    }
}

/// The constant pool of a class.
///
/// Indices start at 1, and every entry (including `long` and `double`
/// constants) occupies exactly one index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    /// Creates an empty constant pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `constant` to the pool, returning its index. Adding an entry equal
    /// to an existing one returns the existing index.
    ///
    /// # Panics
    ///
    /// Panics if the pool grows beyond `u16::MAX` entries.
    pub fn add(&mut self, constant: Constant) -> u16 {
        let position = self.entries.iter().position(|c| *c == constant).unwrap_or_else(|| {
            self.entries.push(constant);
            self.entries.len() - 1
        });
        u16::try_from(position + 1).expect("Constant pool exceeds u16::MAX entries")
    }

    /// Adds a reference to the method `class.name descriptor`.
    pub fn method(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.add(Constant::Method(member(class, name, descriptor)))
    }

    /// Adds a reference to the interface method `class.name descriptor`.
    pub fn interface_method(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.add(Constant::InterfaceMethod(member(class, name, descriptor)))
    }

    /// Adds a reference to the field `class.name` of type `descriptor`.
    pub fn field(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.add(Constant::Field(member(class, name, descriptor)))
    }

    /// Adds a reference to the class `name`.
    pub fn class(&mut self, name: &str) -> u16 {
        self.add(Constant::Class(Arc::from(name)))
    }

    /// Adds a string literal.
    pub fn string(&mut self, value: &str) -> u16 {
        self.add(Constant::String(Arc::from(value)))
    }

    /// Gets the entry at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if there is no entry at `index`.
    pub fn get(&self, index: u16) -> Result<&Constant> {
        usize::from(index)
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .ok_or_else(|| Error::InvalidConstant {
                index,
                expected: "constant".to_string(),
            })
    }

    /// Gets the method reference at `index`, accepting both class and
    /// interface method references.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the entry at `index` is not a method reference.
    pub fn method_ref(&self, index: u16) -> Result<&MemberRef> {
        match self.get(index)? {
            Constant::Method(member) | Constant::InterfaceMethod(member) => Ok(member),
            _ => Err(invalid(index, "method reference")),
        }
    }

    /// Gets the field reference at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the entry at `index` is not a field reference.
    pub fn field_ref(&self, index: u16) -> Result<&MemberRef> {
        match self.get(index)? {
            Constant::Field(member) => Ok(member),
            _ => Err(invalid(index, "field reference")),
        }
    }

    /// Gets the class name at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the entry at `index` is not a class reference.
    pub fn class_name(&self, index: u16) -> Result<&Arc<str>> {
        match self.get(index)? {
            Constant::Class(name) => Ok(name),
            _ => Err(invalid(index, "class reference")),
        }
    }

    /// Gets the number of entries in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks if the pool has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn member(class: &str, name: &str, descriptor: &str) -> MemberRef {
    MemberRef {
        class:      Arc::from(class),
        name:       Arc::from(name),
        descriptor: Arc::from(descriptor),
    }
}

fn invalid(index: u16, expected: &str) -> Error {
    Error::InvalidConstant {
        index,
        expected: expected.to_string(),
    }
}

#[cfg(test)]
mod test {
    use crate::class::pool::{Constant, ConstantPool};

    #[test]
    fn indices_start_at_one_and_are_shared() -> anyhow::Result<()> {
        let mut pool = ConstantPool::new();
        let first = pool.method("A", "f", "()V");
        let second = pool.add(Constant::Integer(7));
        let again = pool.method("A", "f", "()V");
        assert_eq!((first, second, again), (1, 2, 1));
        assert_eq!(pool.method_ref(first)?.name.as_ref(), "f");

        Ok(())
    }

    #[test]
    fn rejects_wrong_entry_kinds() {
        let mut pool = ConstantPool::new();
        let index = pool.class("A");
        pool.field_ref(index).expect_err("A class was read as a field");
        pool.get(0).expect_err("Index zero was accepted");
    }
}
