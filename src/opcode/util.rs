//! This file contains utilities for implementing the behaviours of the
//! instruction families in both execution modes.

use crate::{
    constant::{ARITHMETIC_EXCEPTION, NULL_POINTER_EXCEPTION},
    disassembly::{Decoded, Operands},
    error::execution::{Error, Result},
    opcode::{Arity, StackType},
    search::choice::{Action, Alternative},
    vm::{
        fault::Fault,
        state::heap::HeapRef,
        value::{Comparison, Constraint, EvalError, Kind, Primitive, Term, Value},
        VirtualMachine,
    },
};

/// Builds the error for an instruction whose operands do not fit its
/// behaviour.
#[must_use]
pub fn malformed(decoded: &Decoded, reason: &str) -> Error {
    Error::MalformedInstruction {
        mnemonic: decoded.mnemonic().to_string(),
        reason:   reason.to_string(),
    }
}

/// Builds the error for a symbolic operand that an instruction cannot work
/// with.
#[must_use]
pub fn unsupported(decoded: &Decoded, operand: &Value) -> Error {
    Error::UnsupportedSymbolicOperand {
        mnemonic: decoded.mnemonic().to_string(),
        term:     operand.to_string(),
    }
}

/// Gets the local variable index operand of `decoded`.
///
/// # Errors
///
/// Returns [`Err`] if the instruction has no such operand.
pub fn local_index(decoded: &Decoded) -> Result<usize> {
    match decoded.operands {
        Operands::Local(index) | Operands::Increment { index, .. } => Ok(usize::from(index)),
        _ => Err(malformed(decoded, "missing local variable index")),
    }
}

/// Gets the constant pool index operand of `decoded`.
///
/// # Errors
///
/// Returns [`Err`] if the instruction has no such operand.
pub fn constant_index(decoded: &Decoded) -> Result<u16> {
    match decoded.operands {
        Operands::Constant(index)
        | Operands::Interface { index, .. }
        | Operands::MultiArray { index, .. } => Ok(index),
        _ => Err(malformed(decoded, "missing constant pool index")),
    }
}

/// Gets the immediate operand of `decoded`.
///
/// # Errors
///
/// Returns [`Err`] if the instruction has no such operand.
pub fn immediate(decoded: &Decoded) -> Result<i32> {
    match decoded.operands {
        Operands::Immediate(value) => Ok(value),
        _ => Err(malformed(decoded, "missing immediate")),
    }
}

/// Gets the absolute target of the branch instruction `decoded`.
///
/// # Errors
///
/// Returns [`Err`] if the instruction has no branch offset.
pub fn branch_target(decoded: &Decoded) -> Result<i64> {
    match decoded.operands {
        Operands::Branch(offset) => Ok(decoded.target(offset)),
        _ => Err(malformed(decoded, "missing branch offset")),
    }
}

/// Gets the arity of a single stack item of type `item`.
#[must_use]
pub fn single(item: StackType) -> Arity {
    Arity::Exact(match item {
        StackType::Int => &[StackType::Int],
        StackType::Long => &[StackType::Long],
        StackType::Float => &[StackType::Float],
        StackType::Double => &[StackType::Double],
        StackType::Reference => &[StackType::Reference],
        StackType::Any => &[StackType::Any],
    })
}

/// Gets the arity of two stack items of type `item`.
#[must_use]
pub fn pair(item: StackType) -> Arity {
    Arity::Exact(match item {
        StackType::Int => &[StackType::Int, StackType::Int],
        StackType::Long => &[StackType::Long, StackType::Long],
        StackType::Float => &[StackType::Float, StackType::Float],
        StackType::Double => &[StackType::Double, StackType::Double],
        StackType::Reference => &[StackType::Reference, StackType::Reference],
        StackType::Any => &[StackType::Any, StackType::Any],
    })
}

/// Checks if `value` can be held in a stack slot declared as `expected`.
#[must_use]
pub fn fits(value: &Value, expected: StackType) -> bool {
    match expected {
        StackType::Reference => value.is_reference(),
        StackType::Any => true,
        other => value.kind() == other.kind(),
    }
}

/// Checks that `value` fits `expected`, returning it if so.
///
/// # Errors
///
/// Returns [`Err`] if the value is of a different type.
pub fn expect(value: Value, expected: StackType) -> Result<Value> {
    if fits(&value, expected) {
        Ok(value)
    } else {
        Err(value.mismatch(format!("{expected:?}").to_lowercase()))
    }
}

/// Pops a value of `kind` off the current stack as a term.
///
/// # Errors
///
/// Returns [`Err`] if the stack is empty or the value is of another kind.
pub fn pop_term(vm: &mut VirtualMachine, kind: Kind) -> Result<Term> {
    vm.pop()?.into_term(kind)
}

/// Turns a failure of evaluating arithmetic into the fault it stands for.
#[must_use]
pub fn arithmetic_fault(error: EvalError) -> Fault {
    match error {
        EvalError::DivisionByZero => Fault::raise(ARITHMETIC_EXCEPTION, Some("/ by zero".to_string())),
        other => Error::TypeMismatch {
            expected: "operands of matching kinds".to_string(),
            found:    other.to_string(),
        }
        .into(),
    }
}

/// Checks if `value` is a term that is not a constant.
#[must_use]
pub fn is_symbolic(value: &Value) -> bool {
    matches!(value, Value::Term(term) if term.as_constant().is_none())
}

/// Gets the term of `value` if it is a non-constant `int` term.
#[must_use]
pub fn symbolic_int(value: &Value) -> Option<&Term> {
    match value {
        Value::Term(term) if term.as_constant().is_none() && term.kind() == Kind::Int => Some(term),
        _ => None,
    }
}

/// Builds the constraint `term comparison constant`.
#[must_use]
pub fn compare_int(comparison: Comparison, term: &Term, constant: i32) -> Constraint {
    Constraint::compare(comparison, term.clone(), Term::Constant(Primitive::Int(constant)))
}

/// Builds the alternatives of a two-way branch: continuing at `target` when
/// `condition` holds, and at `next` when it does not.
#[must_use]
pub fn two_way(condition: Constraint, pops: usize, target: i64, next: u32) -> Vec<Alternative> {
    let negated = condition.clone().negate();
    vec![
        Alternative::new(condition, Action::Jump { pops, target }),
        Alternative::new(negated, Action::Jump {
            pops,
            target: i64::from(next),
        }),
    ]
}

/// Builds the alternatives that fix the symbolic `int` operand `term` at stack
/// depth `depth` to each of `candidates`, followed by an alternative raising
/// `class` when `failure` holds.
#[must_use]
pub fn refinements(
    term: &Term,
    depth: usize,
    candidates: impl IntoIterator<Item = i32>,
    failure: Constraint,
    pops: usize,
    class: &'static str,
) -> Vec<Alternative> {
    let mut alternatives: Vec<Alternative> = candidates
        .into_iter()
        .map(|candidate| {
            Alternative::new(compare_int(Comparison::Eq, term, candidate), Action::Refine {
                depth,
                value: Value::int(candidate),
            })
        })
        .collect();
    alternatives.push(Alternative::new(failure, Action::Throw {
        pops,
        class,
        message: None,
    }));
    alternatives
}

/// Builds one alternative per candidate length of the unresolved symbolic
/// array `array`, from zero up to and including `max`.
#[must_use]
pub fn materializations(array: HeapRef, max: usize) -> Vec<Alternative> {
    (0..=max)
        .map(|length| Alternative::unconstrained(Action::Materialize { array, length }))
        .collect()
}

/// Gets the concrete `int` held by `value`.
///
/// # Errors
///
/// Returns [`Err`] if the value is not a concrete `int`.
pub fn int_operand(value: &Value) -> Result<i32> {
    match value.as_primitive() {
        Some(Primitive::Int(v)) => Ok(v),
        _ => Err(value.mismatch(Kind::Int)),
    }
}

/// Gets the object referenced by `value`, raising a `NullPointerException`
/// for `null`.
///
/// # Errors
///
/// Returns [`Err`] if the value is `null` or not a reference.
pub fn non_null(value: Value) -> std::result::Result<HeapRef, Fault> {
    match value {
        Value::Reference(object) => Ok(object),
        Value::Null => Err(Fault::raise(NULL_POINTER_EXCEPTION, None)),
        other => Err(other.mismatch("reference").into()),
    }
}

/// Gets the candidate lengths for symbolic array sizes, from zero up to and
/// including `max`.
#[must_use]
pub fn candidate_lengths(max: usize) -> impl Iterator<Item = i32> {
    (0..=max).filter_map(|length| i32::try_from(length).ok())
}

#[cfg(test)]
mod test {
    use crate::{
        opcode::{
            util::{candidate_lengths, fits, two_way},
            StackType,
        },
        search::choice::Action,
        vm::value::{Comparison, Constraint, Kind, Primitive, Term, Value, Variable},
    };

    #[test]
    fn stack_types_accept_matching_values() {
        assert!(fits(&Value::int(1), StackType::Int));
        assert!(!fits(&Value::long(1), StackType::Int));
        assert!(fits(&Value::Null, StackType::Reference));
        assert!(fits(&Value::double(1.0), StackType::Any));
        let term = Value::Term(Term::variable(Variable::fresh("x", Kind::Float)));
        assert!(fits(&term, StackType::Float));
    }

    #[test]
    fn two_way_branches_take_the_condition_first() {
        let x = Term::variable(Variable::fresh("x", Kind::Int));
        let condition = Constraint::compare(Comparison::Lt, x, Term::from(Primitive::Int(3)));
        let alternatives = two_way(condition.clone(), 1, 10, 4);

        assert_eq!(alternatives[0].constraint, Some(condition.clone()));
        assert_eq!(alternatives[0].action, Action::Jump { pops: 1, target: 10 });
        assert_eq!(alternatives[1].constraint, Some(condition.negate()));
        assert_eq!(alternatives[1].action, Action::Jump { pops: 1, target: 4 });
    }

    #[test]
    fn candidate_lengths_include_the_maximum() {
        assert_eq!(candidate_lengths(3).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert_eq!(candidate_lengths(0).collect::<Vec<_>>(), vec![0]);
    }
}
