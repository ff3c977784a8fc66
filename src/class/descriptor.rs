//! This module contains the parsers for field and method descriptors.

use std::{fmt::Display, str::FromStr, sync::Arc};

use crate::{
    error::execution::{Error, Result},
    vm::value::{Kind, Value},
};

/// The type of a field, parameter, array component or return value.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum FieldType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Object(Arc<str>),
    Array(Box<FieldType>),
}

impl FieldType {
    /// Parses one field type from the start of `input`, returning it and the
    /// number of bytes consumed.
    fn parse_prefix(input: &str) -> Option<(FieldType, usize)> {
        let first = input.chars().next()?;
        let simple = match first {
            'Z' => FieldType::Boolean,
            'B' => FieldType::Byte,
            'C' => FieldType::Char,
            'S' => FieldType::Short,
            'I' => FieldType::Int,
            'J' => FieldType::Long,
            'F' => FieldType::Float,
            'D' => FieldType::Double,
            'L' => {
                let end = input.find(';')?;
                if end < 2 {
                    return None;
                }
                return Some((FieldType::Object(Arc::from(&input[1..end])), end + 1));
            }
            '[' => {
                let (component, used) = Self::parse_prefix(&input[1..])?;
                return Some((FieldType::Array(Box::new(component)), used + 1));
            }
            _ => return None,
        };
        Some((simple, 1))
    }

    /// Gets the kind of the value on the operand stack, or [`None`] for
    /// references.
    #[must_use]
    pub fn kind(&self) -> Option<Kind> {
        match self {
            FieldType::Boolean
            | FieldType::Byte
            | FieldType::Char
            | FieldType::Short
            | FieldType::Int => Some(Kind::Int),
            FieldType::Long => Some(Kind::Long),
            FieldType::Float => Some(Kind::Float),
            FieldType::Double => Some(Kind::Double),
            FieldType::Object(_) | FieldType::Array(_) => None,
        }
    }

    /// Gets the number of local slots a value of this type occupies.
    #[must_use]
    pub fn category(&self) -> usize {
        self.kind().map_or(1, Kind::category)
    }

    /// Checks if the type is a reference type.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        self.kind().is_none()
    }

    /// Gets the default value of fields and array elements of this type.
    #[must_use]
    pub fn default_value(&self) -> Value {
        self.kind().map_or(Value::Null, |kind| Value::Primitive(kind.zero()))
    }

    /// Gets the name of the class of objects of this type: the class name for
    /// object types and the descriptor for array types.
    #[must_use]
    pub fn class_name(&self) -> Option<String> {
        match self {
            FieldType::Object(name) => Some(name.to_string()),
            FieldType::Array(_) => Some(self.to_string()),
            _ => None,
        }
    }

    /// Gets the type described by a class name as used by `anewarray`,
    /// `checkcast` and friends, where array classes are named by descriptor.
    #[must_use]
    pub fn from_class_name(name: &str) -> FieldType {
        if name.starts_with('[') {
            if let Ok(array) = name.parse() {
                return array;
            }
        }
        FieldType::Object(Arc::from(name))
    }
}

impl FromStr for FieldType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match Self::parse_prefix(s) {
            Some((field_type, used)) if used == s.len() => Ok(field_type),
            _ => Err(Error::MalformedDescriptor {
                descriptor: s.to_string(),
            }),
        }
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Boolean => write!(f, "Z"),
            FieldType::Byte => write!(f, "B"),
            FieldType::Char => write!(f, "C"),
            FieldType::Short => write!(f, "S"),
            FieldType::Int => write!(f, "I"),
            FieldType::Long => write!(f, "J"),
            FieldType::Float => write!(f, "F"),
            FieldType::Double => write!(f, "D"),
            FieldType::Object(name) => write!(f, "L{name};"),
            FieldType::Array(component) => write!(f, "[{component}"),
        }
    }
}

/// The parameter and return types of a method.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct MethodDescriptor {
    parameters: Vec<FieldType>,
    returns:    Option<FieldType>,
    raw:        Arc<str>,
}

impl MethodDescriptor {
    /// Gets the parameter types in declaration order.
    #[must_use]
    pub fn parameters(&self) -> &[FieldType] {
        &self.parameters
    }

    /// Gets the return type, or [`None`] for `void` methods.
    #[must_use]
    pub fn returns(&self) -> Option<&FieldType> {
        self.returns.as_ref()
    }

    /// Gets the number of local slots the parameters occupy.
    #[must_use]
    pub fn parameter_slots(&self) -> usize {
        self.parameters.iter().map(FieldType::category).sum()
    }

    /// Gets the descriptor text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for MethodDescriptor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || Error::MalformedDescriptor {
            descriptor: s.to_string(),
        };
        let rest = s.strip_prefix('(').ok_or_else(malformed)?;
        let close = rest.find(')').ok_or_else(malformed)?;
        let (mut params, returns) = (&rest[..close], &rest[close + 1..]);

        let mut parameters = Vec::new();
        while !params.is_empty() {
            let (parameter, used) = FieldType::parse_prefix(params).ok_or_else(malformed)?;
            parameters.push(parameter);
            params = &params[used..];
        }

        let returns = if returns == "V" {
            None
        } else {
            Some(returns.parse().map_err(|_| malformed())?)
        };

        Ok(Self {
            parameters,
            returns,
            raw: Arc::from(s),
        })
    }
}

impl Display for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[cfg(test)]
mod test {
    use crate::class::descriptor::{FieldType, MethodDescriptor};

    #[test]
    fn parses_method_descriptors() -> anyhow::Result<()> {
        let descriptor: MethodDescriptor = "(IJ[Ljava/lang/String;D)V".parse()?;
        assert_eq!(descriptor.parameters().len(), 4);
        assert_eq!(descriptor.parameter_slots(), 6);
        assert_eq!(descriptor.returns(), None);
        assert_eq!(descriptor.parameters()[2].to_string(), "[Ljava/lang/String;");

        Ok(())
    }

    #[test]
    fn rejects_malformed_descriptors() {
        "(I".parse::<MethodDescriptor>().expect_err("Unclosed descriptor parsed");
        "(Q)V".parse::<MethodDescriptor>().expect_err("Unknown type parsed");
        "L;".parse::<FieldType>().expect_err("Empty class name parsed");
        "II".parse::<FieldType>().expect_err("Trailing input parsed");
    }

    #[test]
    fn array_class_names_are_descriptors() {
        let array = FieldType::from_class_name("[I");
        assert_eq!(array, FieldType::Array(Box::new(FieldType::Int)));
        assert_eq!(array.class_name().as_deref(), Some("[I"));

        let object = FieldType::from_class_name("java/lang/Object");
        assert_eq!(object.class_name().as_deref(), Some("java/lang/Object"));
    }
}
