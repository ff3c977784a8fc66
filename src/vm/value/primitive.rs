//! This module contains the concrete primitive values of the guest machine and
//! the arithmetic on them.
//!
//! All integer arithmetic wraps, shift distances are masked to the width of the
//! shifted value, and float-to-integer conversions saturate with `NaN`
//! converting to zero.

use std::{cmp::Ordering, fmt::Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The kinds of primitive value the operand stack can hold.
///
/// Sub-integer types (`boolean`, `byte`, `char`, `short`) are widened to
/// [`Kind::Int`] on the stack.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Kind {
    Int,
    Long,
    Float,
    Double,
}

impl Kind {
    /// Gets the number of local variable slots a value of this kind occupies.
    #[must_use]
    pub fn category(self) -> usize {
        match self {
            Kind::Int | Kind::Float => 1,
            Kind::Long | Kind::Double => 2,
        }
    }

    /// Checks if this is an integral kind.
    #[must_use]
    pub fn is_integral(self) -> bool {
        matches!(self, Kind::Int | Kind::Long)
    }

    /// Gets the zero value of this kind.
    #[must_use]
    pub fn zero(self) -> Primitive {
        match self {
            Kind::Int => Primitive::Int(0),
            Kind::Long => Primitive::Long(0),
            Kind::Float => Primitive::Float(0.0),
            Kind::Double => Primitive::Double(0.0),
        }
    }
}

impl Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Kind::Int => "int",
            Kind::Long => "long",
            Kind::Float => "float",
            Kind::Double => "double",
        };
        write!(f, "{name}")
    }
}

/// A concrete primitive value.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub enum Primitive {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

/// Binary operators shared by the arithmetic instructions and symbolic terms.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    /// Checks if the operator is a shift, whose right operand is always an
    /// `int` distance.
    #[must_use]
    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr)
    }

    /// Checks if the operator can fault on a zero right operand.
    #[must_use]
    pub fn is_division(self) -> bool {
        matches!(self, BinaryOp::Div | BinaryOp::Rem)
    }

    /// Gets the textual symbol of the operator.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Ushr => ">>>",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
        }
    }
}

/// Unary operators.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum UnaryOp {
    Neg,
}

impl UnaryOp {
    /// Gets the symbol for the operator, as used in source code.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
        }
    }
}

/// The primitive conversions of the instruction set.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Conversion {
    ToInt,
    ToLong,
    ToFloat,
    ToDouble,
    ToByte,
    ToChar,
    ToShort,
}

impl Conversion {
    /// Gets the kind of the converted value.
    #[must_use]
    pub fn target(self) -> Kind {
        match self {
            Conversion::ToInt | Conversion::ToByte | Conversion::ToChar | Conversion::ToShort => {
                Kind::Int
            }
            Conversion::ToLong => Kind::Long,
            Conversion::ToFloat => Kind::Float,
            Conversion::ToDouble => Kind::Double,
        }
    }

    /// Gets the name of the target type as written in a cast.
    #[must_use]
    pub fn type_name(self) -> &'static str {
        match self {
            Conversion::ToInt => "int",
            Conversion::ToLong => "long",
            Conversion::ToFloat => "float",
            Conversion::ToDouble => "double",
            Conversion::ToByte => "byte",
            Conversion::ToChar => "char",
            Conversion::ToShort => "short",
        }
    }
}

/// Relational comparisons used by branches and constraints.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    /// Gets the comparison that holds exactly when `self` does not, for
    /// ordered operands.
    #[must_use]
    pub fn inverse(self) -> Self {
        match self {
            Comparison::Eq => Comparison::Ne,
            Comparison::Ne => Comparison::Eq,
            Comparison::Lt => Comparison::Ge,
            Comparison::Le => Comparison::Gt,
            Comparison::Gt => Comparison::Le,
            Comparison::Ge => Comparison::Lt,
        }
    }

    /// Checks if the comparison holds between `left` and `right`.
    ///
    /// Unordered operands (a `NaN` on either side) satisfy only
    /// [`Comparison::Ne`].
    #[must_use]
    pub fn holds(self, left: &Primitive, right: &Primitive) -> bool {
        match left.partial_compare(right) {
            None => self == Comparison::Ne,
            Some(ordering) => match self {
                Comparison::Eq => ordering == Ordering::Equal,
                Comparison::Ne => ordering != Ordering::Equal,
                Comparison::Lt => ordering == Ordering::Less,
                Comparison::Le => ordering != Ordering::Greater,
                Comparison::Gt => ordering == Ordering::Greater,
                Comparison::Ge => ordering != Ordering::Less,
            },
        }
    }

    /// Gets the textual symbol of the comparison.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }
}

/// Failures of evaluating primitive arithmetic.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum EvalError {
    #[error("Integral division by zero")]
    DivisionByZero,

    #[error("Operator {op} cannot combine {left} and {right}")]
    KindMismatch {
        op:    &'static str,
        left:  Kind,
        right: Kind,
    },

    #[error("Variable {_0} has no assigned value")]
    Unbound(String),
}

impl Primitive {
    /// Gets the kind of the value.
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Primitive::Int(_) => Kind::Int,
            Primitive::Long(_) => Kind::Long,
            Primitive::Float(_) => Kind::Float,
            Primitive::Double(_) => Kind::Double,
        }
    }

    /// Checks if the value is a (positive or negative) zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        match *self {
            Primitive::Int(v) => v == 0,
            Primitive::Long(v) => v == 0,
            Primitive::Float(v) => v == 0.0,
            Primitive::Double(v) => v == 0.0,
        }
    }

    /// Gets the value as an `int` if it is one.
    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match *self {
            Primitive::Int(v) => Some(v),
            _ => None,
        }
    }

    /// Orders two values of the same kind, returning [`None`] if they are
    /// unordered or of different kinds.
    #[must_use]
    pub fn partial_compare(&self, other: &Primitive) -> Option<Ordering> {
        match (self, other) {
            (Primitive::Int(l), Primitive::Int(r)) => Some(l.cmp(r)),
            (Primitive::Long(l), Primitive::Long(r)) => Some(l.cmp(r)),
            (Primitive::Float(l), Primitive::Float(r)) => l.partial_cmp(r),
            (Primitive::Double(l), Primitive::Double(r)) => l.partial_cmp(r),
            _ => None,
        }
    }

    /// Implements the three-way comparison instructions, producing `-1`, `0`
    /// or `1`, and `nan_result` if the operands are unordered.
    #[must_use]
    pub fn compare(&self, other: &Primitive, nan_result: i32) -> i32 {
        match self.partial_compare(other) {
            Some(Ordering::Less) => -1,
            Some(Ordering::Equal) => 0,
            Some(Ordering::Greater) => 1,
            None => nan_result,
        }
    }

    /// Applies the binary operator `op` to `left` and `right`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] on integral division by zero or if the kinds of the
    /// operands cannot be combined by `op`.
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)] // Bit-level shifts
    pub fn binary(op: BinaryOp, left: Primitive, right: Primitive) -> Result<Primitive, EvalError> {
        let mismatch = || EvalError::KindMismatch {
            op:    op.symbol(),
            left:  left.kind(),
            right: right.kind(),
        };
        let result = match (left, right) {
            (Primitive::Int(l), Primitive::Int(r)) => Primitive::Int(match op {
                BinaryOp::Add => l.wrapping_add(r),
                BinaryOp::Sub => l.wrapping_sub(r),
                BinaryOp::Mul => l.wrapping_mul(r),
                BinaryOp::Div if r == 0 => return Err(EvalError::DivisionByZero),
                BinaryOp::Div => l.wrapping_div(r),
                BinaryOp::Rem if r == 0 => return Err(EvalError::DivisionByZero),
                BinaryOp::Rem => l.wrapping_rem(r),
                BinaryOp::Shl => l.wrapping_shl(r as u32 & 0x1f),
                BinaryOp::Shr => l.wrapping_shr(r as u32 & 0x1f),
                BinaryOp::Ushr => ((l as u32) >> (r as u32 & 0x1f)) as i32,
                BinaryOp::And => l & r,
                BinaryOp::Or => l | r,
                BinaryOp::Xor => l ^ r,
            }),
            (Primitive::Long(l), Primitive::Int(r)) if op.is_shift() => Primitive::Long(match op {
                BinaryOp::Shl => l.wrapping_shl(r as u32 & 0x3f),
                BinaryOp::Shr => l.wrapping_shr(r as u32 & 0x3f),
                _ => ((l as u64) >> (r as u32 & 0x3f)) as i64,
            }),
            (Primitive::Long(l), Primitive::Long(r)) if !op.is_shift() => Primitive::Long(match op {
                BinaryOp::Add => l.wrapping_add(r),
                BinaryOp::Sub => l.wrapping_sub(r),
                BinaryOp::Mul => l.wrapping_mul(r),
                BinaryOp::Div if r == 0 => return Err(EvalError::DivisionByZero),
                BinaryOp::Div => l.wrapping_div(r),
                BinaryOp::Rem if r == 0 => return Err(EvalError::DivisionByZero),
                BinaryOp::Rem => l.wrapping_rem(r),
                BinaryOp::And => l & r,
                BinaryOp::Or => l | r,
                _ => l ^ r,
            }),
            (Primitive::Float(l), Primitive::Float(r)) => Primitive::Float(match op {
                BinaryOp::Add => l + r,
                BinaryOp::Sub => l - r,
                BinaryOp::Mul => l * r,
                BinaryOp::Div => l / r,
                BinaryOp::Rem => l % r,
                _ => return Err(mismatch()),
            }),
            (Primitive::Double(l), Primitive::Double(r)) => Primitive::Double(match op {
                BinaryOp::Add => l + r,
                BinaryOp::Sub => l - r,
                BinaryOp::Mul => l * r,
                BinaryOp::Div => l / r,
                BinaryOp::Rem => l % r,
                _ => return Err(mismatch()),
            }),
            _ => return Err(mismatch()),
        };

        Ok(result)
    }

    /// Applies the unary operator `op` to the value.
    #[must_use]
    pub fn unary(op: UnaryOp, operand: Primitive) -> Primitive {
        match op {
            UnaryOp::Neg => match operand {
                Primitive::Int(v) => Primitive::Int(v.wrapping_neg()),
                Primitive::Long(v) => Primitive::Long(v.wrapping_neg()),
                Primitive::Float(v) => Primitive::Float(-v),
                Primitive::Double(v) => Primitive::Double(-v),
            },
        }
    }

    /// Converts the value as the conversion instructions do.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss,
        clippy::cast_lossless
    )]
    #[must_use]
    pub fn convert(conversion: Conversion, operand: Primitive) -> Primitive {
        // Rust's float-to-integer `as` casts saturate and map NaN to zero.
        match conversion {
            Conversion::ToInt => Primitive::Int(match operand {
                Primitive::Int(v) => v,
                Primitive::Long(v) => v as i32,
                Primitive::Float(v) => v as i32,
                Primitive::Double(v) => v as i32,
            }),
            Conversion::ToLong => Primitive::Long(match operand {
                Primitive::Int(v) => i64::from(v),
                Primitive::Long(v) => v,
                Primitive::Float(v) => v as i64,
                Primitive::Double(v) => v as i64,
            }),
            Conversion::ToFloat => Primitive::Float(match operand {
                Primitive::Int(v) => v as f32,
                Primitive::Long(v) => v as f32,
                Primitive::Float(v) => v,
                Primitive::Double(v) => v as f32,
            }),
            Conversion::ToDouble => Primitive::Double(match operand {
                Primitive::Int(v) => f64::from(v),
                Primitive::Long(v) => v as f64,
                Primitive::Float(v) => f64::from(v),
                Primitive::Double(v) => v,
            }),
            Conversion::ToByte | Conversion::ToChar | Conversion::ToShort => {
                let Primitive::Int(value) = Self::convert(Conversion::ToInt, operand) else {
                    unreachable!("ToInt always produces an int")
                };
                Primitive::Int(match conversion {
                    Conversion::ToByte => value as i8 as i32,
                    Conversion::ToChar => value as u16 as i32,
                    _ => value as i16 as i32,
                })
            }
        }
    }
}

impl Display for Primitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Primitive::Int(v) => write!(f, "{v}"),
            Primitive::Long(v) => write!(f, "{v}L"),
            Primitive::Float(v) => write!(f, "{v:?}f"),
            Primitive::Double(v) => write!(f, "{v:?}d"),
        }
    }
}
