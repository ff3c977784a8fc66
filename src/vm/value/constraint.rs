//! This module contains the constraints that choice points assert on the
//! symbolic inputs of a path.

use std::fmt::Display;

use itertools::Itertools;

use crate::vm::value::{
    primitive::{Comparison, EvalError},
    term::{Assignment, Term, Variable},
};

/// A boolean condition over terms.
#[derive(Clone, Debug, PartialEq)]
pub enum Constraint {
    /// `left comparison right`; false for unordered operands unless the
    /// comparison is [`Comparison::Ne`].
    Compare {
        comparison: Comparison,
        left:       Term,
        right:      Term,
    },

    /// Holds when either operand is `NaN`.
    Unordered { left: Term, right: Term },

    Not(Box<Constraint>),

    All(Vec<Constraint>),

    Any(Vec<Constraint>),
}

impl Constraint {
    /// Creates the comparison `left comparison right`.
    #[must_use]
    pub fn compare(comparison: Comparison, left: Term, right: Term) -> Self {
        Constraint::Compare {
            comparison,
            left,
            right,
        }
    }

    /// Creates the constraint that holds exactly when `self` does not.
    ///
    /// Comparisons between integral terms are inverted directly; comparisons
    /// between floating-point terms are wrapped in [`Constraint::Not`] so that
    /// `NaN` operands keep their meaning.
    #[must_use]
    pub fn negate(self) -> Self {
        match self {
            Constraint::Compare {
                comparison,
                left,
                right,
            } if left.kind().is_integral() => Constraint::Compare {
                comparison: comparison.inverse(),
                left,
                right,
            },
            Constraint::Not(inner) => *inner,
            Constraint::All(parts) => Constraint::Any(parts.into_iter().map(Self::negate).collect()),
            Constraint::Any(parts) => Constraint::All(parts.into_iter().map(Self::negate).collect()),
            other => Constraint::Not(Box::new(other)),
        }
    }

    /// Evaluates the constraint under `assignment`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if a term cannot be evaluated.
    pub fn evaluate(&self, assignment: &Assignment) -> Result<bool, EvalError> {
        match self {
            Constraint::Compare {
                comparison,
                left,
                right,
            } => Ok(comparison.holds(&left.evaluate(assignment)?, &right.evaluate(assignment)?)),
            Constraint::Unordered { left, right } => {
                let left = left.evaluate(assignment)?;
                let right = right.evaluate(assignment)?;
                Ok(left.partial_compare(&right).is_none())
            }
            Constraint::Not(inner) => Ok(!inner.evaluate(assignment)?),
            Constraint::All(parts) => {
                for part in parts {
                    if !part.evaluate(assignment)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Constraint::Any(parts) => {
                for part in parts {
                    if part.evaluate(assignment)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    /// Gets the truth value of a constraint that mentions no variables.
    #[must_use]
    pub fn as_constant(&self) -> Option<bool> {
        if self.variables().is_empty() {
            self.evaluate(&Assignment::new()).ok()
        } else {
            None
        }
    }

    /// Gets the distinct variables of the constraint.
    #[must_use]
    pub fn variables(&self) -> Vec<Variable> {
        let mut found = Vec::new();
        self.collect_variables(&mut found);
        found.into_iter().unique().collect()
    }

    fn collect_variables(&self, found: &mut Vec<Variable>) {
        match self {
            Constraint::Compare { left, right, .. } | Constraint::Unordered { left, right } => {
                left.collect_variables(found);
                right.collect_variables(found);
            }
            Constraint::Not(inner) => inner.collect_variables(found),
            Constraint::All(parts) | Constraint::Any(parts) => {
                parts.iter().for_each(|p| p.collect_variables(found));
            }
        }
    }
}

impl Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constraint::Compare {
                comparison,
                left,
                right,
            } => write!(f, "{left} {} {right}", comparison.symbol()),
            Constraint::Unordered { left, right } => write!(f, "unordered({left}, {right})"),
            Constraint::Not(inner) => write!(f, "!({inner})"),
            Constraint::All(parts) => write!(f, "({})", parts.iter().join(" && ")),
            Constraint::Any(parts) => write!(f, "({})", parts.iter().join(" || ")),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::vm::value::{
        constraint::Constraint,
        primitive::{Comparison, Kind, Primitive},
        term::{Assignment, Term, Variable},
    };

    #[test]
    fn negation_inverts_integral_comparisons() -> anyhow::Result<()> {
        let x = Variable::fresh("x", Kind::Int);
        let constraint = Constraint::compare(
            Comparison::Lt,
            Term::variable(x.clone()),
            Term::from(Primitive::Int(0)),
        );
        let negated = constraint.clone().negate();
        assert_eq!(negated.to_string(), "x >= 0");

        for value in [-1, 0, 1] {
            let mut assignment = Assignment::new();
            assignment.bind(x.clone(), Primitive::Int(value));
            assert_ne!(constraint.evaluate(&assignment)?, negated.evaluate(&assignment)?);
        }

        Ok(())
    }

    #[test]
    fn negation_of_float_comparisons_keeps_nan_meaning() -> anyhow::Result<()> {
        let x = Variable::fresh("x", Kind::Float);
        let constraint = Constraint::compare(
            Comparison::Lt,
            Term::variable(x.clone()),
            Term::from(Primitive::Float(0.0)),
        );
        let negated = constraint.clone().negate();

        let mut assignment = Assignment::new();
        assignment.bind(x, Primitive::Float(f32::NAN));
        assert!(!constraint.evaluate(&assignment)?);
        assert!(negated.evaluate(&assignment)?);

        Ok(())
    }

    #[test]
    fn constant_constraints_are_decided() {
        let constraint = Constraint::compare(
            Comparison::Eq,
            Term::from(Primitive::Int(1)),
            Term::from(Primitive::Int(1)),
        );
        assert_eq!(constraint.as_constant(), Some(true));
    }
}
