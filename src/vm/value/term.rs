//! This module contains the symbolic terms manipulated in symbolic mode.
//!
//! Terms are trees over constants and input variables. Every constructor folds
//! operations whose operands are all constants, so a term with no variables is
//! always a [`Term::Constant`].

use std::{fmt::Display, sync::Arc};

use derivative::Derivative;
use indexmap::IndexMap;
use itertools::Itertools;
use uuid::Uuid;

use crate::vm::value::primitive::{
    BinaryOp,
    Conversion,
    EvalError,
    Kind,
    Primitive,
    UnaryOp,
};

/// A symbolic input to the program.
///
/// Variables are identified by a unique identifier; the name is only used for
/// display and reporting.
#[derive(Clone, Debug, Derivative)]
#[derivative(Eq, Hash, PartialEq)]
pub struct Variable {
    id: Uuid,

    #[derivative(Hash = "ignore", PartialEq = "ignore")]
    name: Arc<str>,

    #[derivative(Hash = "ignore", PartialEq = "ignore")]
    kind: Kind,
}

impl Variable {
    /// Creates a fresh variable of the given `kind`.
    #[must_use]
    pub fn fresh(name: impl Into<Arc<str>>, kind: Kind) -> Self {
        let id = Uuid::new_v4();
        let name = name.into();
        Self { id, name, kind }
    }

    /// Gets the unique identifier of the variable.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Gets the name of the variable.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the kind of value the variable ranges over.
    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }
}

/// An assignment of concrete values to variables.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Assignment {
    values: IndexMap<Variable, Primitive>,
}

impl Assignment {
    /// Creates an empty assignment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `variable` to `value`, replacing any previous binding.
    pub fn bind(&mut self, variable: Variable, value: Primitive) {
        self.values.insert(variable, value);
    }

    /// Removes the binding of `variable`.
    pub fn unbind(&mut self, variable: &Variable) {
        self.values.shift_remove(variable);
    }

    /// Gets the value bound to `variable`.
    #[must_use]
    pub fn get(&self, variable: &Variable) -> Option<Primitive> {
        self.values.get(variable).copied()
    }

    /// Gets the value bound to the first variable named `name`.
    #[must_use]
    pub fn get_named(&self, name: &str) -> Option<Primitive> {
        self.values.iter().find(|(v, _)| v.name() == name).map(|(_, p)| *p)
    }

    /// Iterates over the bindings in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &Primitive)> {
        self.values.iter()
    }

    /// Gets the number of bound variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Checks if no variable is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Gets the bindings keyed by variable name.
    #[must_use]
    pub fn by_name(&self) -> IndexMap<String, Primitive> {
        self.values.iter().map(|(v, p)| (v.name().to_string(), *p)).collect()
    }
}

/// A symbolic term.
#[derive(Clone, Debug, PartialEq)]
pub enum Term {
    Constant(Primitive),
    Variable(Variable),
    Unary {
        op:      UnaryOp,
        operand: Box<Term>,
    },
    Binary {
        op:    BinaryOp,
        left:  Box<Term>,
        right: Box<Term>,
    },
    Convert {
        conversion: Conversion,
        operand:    Box<Term>,
    },
}

impl Term {
    /// Creates a term for a fresh variable.
    #[must_use]
    pub fn variable(variable: Variable) -> Self {
        Term::Variable(variable)
    }

    /// Creates `left op right`, folding constant operands.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the operand kinds do not fit the operator, or if a
    /// constant integral division by zero is folded.
    pub fn binary(op: BinaryOp, left: Term, right: Term) -> Result<Term, EvalError> {
        let (left_kind, right_kind) = (left.kind(), right.kind());
        let fits = if op.is_shift() {
            left_kind.is_integral() && right_kind == Kind::Int
        } else {
            left_kind == right_kind
        };
        if !fits {
            return Err(EvalError::KindMismatch {
                op:    op.symbol(),
                left:  left_kind,
                right: right_kind,
            });
        }

        if let (Term::Constant(l), Term::Constant(r)) = (&left, &right) {
            return Primitive::binary(op, *l, *r).map(Term::Constant);
        }

        Ok(Term::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    /// Creates `op operand`, folding a constant operand.
    #[must_use]
    pub fn unary(op: UnaryOp, operand: Term) -> Term {
        match operand {
            Term::Constant(value) => Term::Constant(Primitive::unary(op, value)),
            operand => Term::Unary {
                op,
                operand: Box::new(operand),
            },
        }
    }

    /// Creates a conversion of `operand`, folding a constant operand and
    /// dropping conversions to the operand's own kind.
    #[must_use]
    pub fn convert(conversion: Conversion, operand: Term) -> Term {
        match operand {
            Term::Constant(value) => Term::Constant(Primitive::convert(conversion, value)),
            operand
                if operand.kind() == conversion.target()
                    && matches!(
                        conversion,
                        Conversion::ToInt
                            | Conversion::ToLong
                            | Conversion::ToFloat
                            | Conversion::ToDouble
                    ) =>
            {
                operand
            }
            operand => Term::Convert {
                conversion,
                operand: Box::new(operand),
            },
        }
    }

    /// Gets the kind of value the term evaluates to.
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Term::Constant(value) => value.kind(),
            Term::Variable(variable) => variable.kind(),
            Term::Unary { operand, .. } => operand.kind(),
            Term::Binary { left, .. } => left.kind(),
            Term::Convert { conversion, .. } => conversion.target(),
        }
    }

    /// Gets the constant value of the term, if it has one.
    #[must_use]
    pub fn as_constant(&self) -> Option<Primitive> {
        match self {
            Term::Constant(value) => Some(*value),
            _ => None,
        }
    }

    /// Evaluates the term under `assignment`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if a variable is unbound or the evaluation divides an
    /// integral value by zero.
    pub fn evaluate(&self, assignment: &Assignment) -> Result<Primitive, EvalError> {
        match self {
            Term::Constant(value) => Ok(*value),
            Term::Variable(variable) => assignment
                .get(variable)
                .ok_or_else(|| EvalError::Unbound(variable.name().to_string())),
            Term::Unary { op, operand } => Ok(Primitive::unary(*op, operand.evaluate(assignment)?)),
            Term::Binary { op, left, right } => {
                Primitive::binary(*op, left.evaluate(assignment)?, right.evaluate(assignment)?)
            }
            Term::Convert {
                conversion,
                operand,
            } => Ok(Primitive::convert(*conversion, operand.evaluate(assignment)?)),
        }
    }

    /// Gets the distinct variables of the term in order of first occurrence.
    #[must_use]
    pub fn variables(&self) -> Vec<Variable> {
        let mut found = Vec::new();
        self.collect_variables(&mut found);
        found.into_iter().unique().collect()
    }

    /// Appends the variables of the term to `found`.
    pub(crate) fn collect_variables(&self, found: &mut Vec<Variable>) {
        match self {
            Term::Constant(_) => {}
            Term::Variable(variable) => found.push(variable.clone()),
            Term::Unary { operand, .. } | Term::Convert { operand, .. } => {
                operand.collect_variables(found);
            }
            Term::Binary { left, right, .. } => {
                left.collect_variables(found);
                right.collect_variables(found);
            }
        }
    }
}

impl From<Primitive> for Term {
    fn from(value: Primitive) -> Self {
        Term::Constant(value)
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Term::Constant(value) => write!(f, "{value}"),
            Term::Variable(variable) => write!(f, "{}", variable.name()),
            Term::Unary { op, operand } => write!(f, "{}{operand}", op.symbol()),
            Term::Binary { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            Term::Convert {
                conversion,
                operand,
            } => write!(f, "({}) {operand}", conversion.type_name()),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::vm::value::{
        primitive::{BinaryOp, Conversion, EvalError, Kind, Primitive, UnaryOp},
        term::{Assignment, Term, Variable},
    };

    #[test]
    fn folds_constant_operands() -> anyhow::Result<()> {
        let term = Term::binary(
            BinaryOp::Mul,
            Term::from(Primitive::Int(6)),
            Term::from(Primitive::Int(7)),
        )?;
        assert_eq!(term.as_constant(), Some(Primitive::Int(42)));

        Ok(())
    }

    #[test]
    fn keeps_variables_symbolic_and_evaluates_them() -> anyhow::Result<()> {
        let x = Variable::fresh("x", Kind::Int);
        let term = Term::binary(
            BinaryOp::Add,
            Term::variable(x.clone()),
            Term::from(Primitive::Int(1)),
        )?;
        assert_eq!(term.as_constant(), None);
        assert_eq!(term.to_string(), "(x + 1)");

        let mut assignment = Assignment::new();
        assignment.bind(x, Primitive::Int(41));
        assert_eq!(term.evaluate(&assignment)?, Primitive::Int(42));

        Ok(())
    }

    #[test]
    fn rejects_mismatched_kinds() {
        let x = Variable::fresh("x", Kind::Long);
        let result = Term::binary(
            BinaryOp::Add,
            Term::variable(x),
            Term::from(Primitive::Int(1)),
        );
        assert!(matches!(result, Err(EvalError::KindMismatch { .. })));
    }

    #[test]
    fn drops_identity_conversions() {
        let x = Variable::fresh("x", Kind::Int);
        let converted = Term::convert(Conversion::ToInt, Term::variable(x.clone()));
        assert_eq!(converted, Term::variable(x.clone()));

        let narrowed = Term::convert(Conversion::ToByte, Term::variable(x));
        assert_eq!(narrowed.kind(), Kind::Int);
        assert!(narrowed.as_constant().is_none());
    }

    #[test]
    fn variables_are_distinct_by_identity() {
        let a = Variable::fresh("a", Kind::Int);
        let b = Variable::fresh("a", Kind::Int);
        assert_ne!(a, b);

        let term = Term::binary(BinaryOp::Sub, Term::variable(a.clone()), Term::variable(a))
            .expect("kinds match");
        assert_eq!(term.variables().len(), 1);
    }

    #[test]
    fn displays_unary_terms_with_their_operator() {
        let x = Variable::fresh("x", Kind::Int);
        let negated = Term::unary(UnaryOp::Neg, Term::variable(x));
        assert_eq!(negated.to_string(), format!("{}x", UnaryOp::Neg.symbol()));
        assert_eq!(negated.to_string(), "-x");
    }
}
