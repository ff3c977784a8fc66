//! Instructions that perform arithmetic on primitive values, and the
//! conversions between primitive kinds.
//!
//! The same behaviour serves both execution modes, as terms over constants
//! fold to constants. Only division by a symbolic divisor needs a symbolic
//! behaviour of its own, as whether it raises depends on the inputs.

use crate::{
    constant::ARITHMETIC_EXCEPTION,
    disassembly::Decoded,
    opcode::{
        code::*,
        util::{arithmetic_fault, is_symbolic, malformed, pair, pop_term, single},
        Arity,
        Behavior,
        Instruction,
        InstructionSet,
        Operation,
        StackType,
    },
    search::choice::{Action, Alternative},
    vm::{
        fault::{Fault, Flow},
        value::{BinaryOp, Comparison, Constraint, Conversion, Kind, Term, UnaryOp, Value},
        VirtualMachine,
    },
};

const DIVISION: &[&str] = &[ARITHMETIC_EXCEPTION];

const DIVISION_BY_ZERO: &str = "/ by zero";

/// Registers the instructions of this family in `set`.
pub fn register(set: &mut InstructionSet) {
    let binaries = [
        (IADD, "iadd", BinaryOp::Add, Kind::Int),
        (LADD, "ladd", BinaryOp::Add, Kind::Long),
        (FADD, "fadd", BinaryOp::Add, Kind::Float),
        (DADD, "dadd", BinaryOp::Add, Kind::Double),
        (ISUB, "isub", BinaryOp::Sub, Kind::Int),
        (LSUB, "lsub", BinaryOp::Sub, Kind::Long),
        (FSUB, "fsub", BinaryOp::Sub, Kind::Float),
        (DSUB, "dsub", BinaryOp::Sub, Kind::Double),
        (IMUL, "imul", BinaryOp::Mul, Kind::Int),
        (LMUL, "lmul", BinaryOp::Mul, Kind::Long),
        (FMUL, "fmul", BinaryOp::Mul, Kind::Float),
        (DMUL, "dmul", BinaryOp::Mul, Kind::Double),
        (IDIV, "idiv", BinaryOp::Div, Kind::Int),
        (LDIV, "ldiv", BinaryOp::Div, Kind::Long),
        (FDIV, "fdiv", BinaryOp::Div, Kind::Float),
        (DDIV, "ddiv", BinaryOp::Div, Kind::Double),
        (IREM, "irem", BinaryOp::Rem, Kind::Int),
        (LREM, "lrem", BinaryOp::Rem, Kind::Long),
        (FREM, "frem", BinaryOp::Rem, Kind::Float),
        (DREM, "drem", BinaryOp::Rem, Kind::Double),
        (ISHL, "ishl", BinaryOp::Shl, Kind::Int),
        (LSHL, "lshl", BinaryOp::Shl, Kind::Long),
        (ISHR, "ishr", BinaryOp::Shr, Kind::Int),
        (LSHR, "lshr", BinaryOp::Shr, Kind::Long),
        (IUSHR, "iushr", BinaryOp::Ushr, Kind::Int),
        (LUSHR, "lushr", BinaryOp::Ushr, Kind::Long),
        (IAND, "iand", BinaryOp::And, Kind::Int),
        (LAND, "land", BinaryOp::And, Kind::Long),
        (IOR, "ior", BinaryOp::Or, Kind::Int),
        (LOR, "lor", BinaryOp::Or, Kind::Long),
        (IXOR, "ixor", BinaryOp::Xor, Kind::Int),
        (LXOR, "lxor", BinaryOp::Xor, Kind::Long),
    ];
    for (opcode, mnemonic, op, kind) in binaries {
        let item = StackType::of(kind);
        let pops = if op.is_shift() {
            match kind {
                Kind::Long => Arity::Exact(&[StackType::Long, StackType::Int]),
                _ => pair(StackType::Int),
            }
        } else {
            pair(item)
        };
        let mut instruction = Instruction::new(
            opcode,
            mnemonic,
            Operation::Binary(op, kind),
            Behavior::dual(binary, symbolic_binary),
        )
        .pops(pops)
        .pushes(single(item));
        if faults_on_zero(op, kind) {
            instruction = instruction.throws(DIVISION);
        }
        set.register(instruction);
    }

    for (opcode, mnemonic, kind) in [
        (INEG, "ineg", Kind::Int),
        (LNEG, "lneg", Kind::Long),
        (FNEG, "fneg", Kind::Float),
        (DNEG, "dneg", Kind::Double),
    ] {
        let item = StackType::of(kind);
        set.register(
            Instruction::new(
                opcode,
                mnemonic,
                Operation::Unary(UnaryOp::Neg, kind),
                Behavior::shared(unary),
            )
            .pops(single(item))
            .pushes(single(item)),
        );
    }

    let conversions = [
        (I2L, "i2l", Kind::Int, Conversion::ToLong),
        (I2F, "i2f", Kind::Int, Conversion::ToFloat),
        (I2D, "i2d", Kind::Int, Conversion::ToDouble),
        (L2I, "l2i", Kind::Long, Conversion::ToInt),
        (L2F, "l2f", Kind::Long, Conversion::ToFloat),
        (L2D, "l2d", Kind::Long, Conversion::ToDouble),
        (F2I, "f2i", Kind::Float, Conversion::ToInt),
        (F2L, "f2l", Kind::Float, Conversion::ToLong),
        (F2D, "f2d", Kind::Float, Conversion::ToDouble),
        (D2I, "d2i", Kind::Double, Conversion::ToInt),
        (D2L, "d2l", Kind::Double, Conversion::ToLong),
        (D2F, "d2f", Kind::Double, Conversion::ToFloat),
        (I2B, "i2b", Kind::Int, Conversion::ToByte),
        (I2C, "i2c", Kind::Int, Conversion::ToChar),
        (I2S, "i2s", Kind::Int, Conversion::ToShort),
    ];
    for (opcode, mnemonic, from, conversion) in conversions {
        set.register(
            Instruction::new(
                opcode,
                mnemonic,
                Operation::Convert(from, conversion),
                Behavior::shared(convert),
            )
            .pops(single(StackType::of(from)))
            .pushes(single(StackType::of(conversion.target()))),
        );
    }
}

/// Checks if `op` on operands of `kind` raises an `ArithmeticException` when
/// its divisor is zero. Division does for every kind, remainder only for the
/// integral kinds.
fn faults_on_zero(op: BinaryOp, kind: Kind) -> bool {
    op == BinaryOp::Div || (op == BinaryOp::Rem && kind.is_integral())
}

/// Applies a binary operator to the two topmost stack items.
///
/// # Semantics
///
/// | Stack Index | Input | Output        |
/// | :---------: | :---: | :-----------: |
/// | 0           | `b`   | `a op b`      |
/// | 1           | `a`   |               |
///
/// Shift distances are always `int`s. Division by a zero divisor, and
/// integral remainder by one, raise an `ArithmeticException` before anything
/// is pushed.
fn binary(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let Operation::Binary(op, kind) = decoded.instruction.operation else {
        return Err(malformed(decoded, "missing operator").into());
    };
    let right_kind = if op.is_shift() { Kind::Int } else { kind };
    let right = pop_term(vm, right_kind)?;
    let left = pop_term(vm, kind)?;
    if faults_on_zero(op, kind) && right.as_constant() == Some(kind.zero()) {
        return Err(Fault::raise(ARITHMETIC_EXCEPTION, Some(DIVISION_BY_ZERO.to_string())));
    }
    let result = Term::binary(op, left, right).map_err(arithmetic_fault)?;
    vm.push(Value::from(result))?;
    Ok(())
}

/// Splits division by a symbolic divisor into the path on which the divisor
/// is non-zero and the path on which the division raises.
fn symbolic_binary(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let Operation::Binary(op, kind) = decoded.instruction.operation else {
        return Err(malformed(decoded, "missing operator").into());
    };
    if !(faults_on_zero(op, kind) && is_symbolic(vm.peek(0)?)) {
        return binary(vm, decoded);
    }

    let divisor = vm.peek(0)?.clone().into_term(kind)?;
    let dividend = vm.peek(1)?.clone().into_term(kind)?;
    let quotient = Term::binary(op, dividend, divisor.clone()).map_err(arithmetic_fault)?;
    let zero = Term::Constant(kind.zero());

    vm.choose(decoded, vec![
        Alternative::new(
            Constraint::compare(Comparison::Ne, divisor.clone(), zero.clone()),
            Action::Push {
                pops:  2,
                value: Value::from(quotient),
            },
        ),
        Alternative::new(Constraint::compare(Comparison::Eq, divisor, zero), Action::Throw {
            pops:    2,
            class:   ARITHMETIC_EXCEPTION,
            message: Some(DIVISION_BY_ZERO.to_string()),
        }),
    ])
}

fn unary(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let Operation::Unary(op, kind) = decoded.instruction.operation else {
        return Err(malformed(decoded, "missing operator").into());
    };
    let operand = pop_term(vm, kind)?;
    vm.push(Value::from(Term::unary(op, operand)))?;
    Ok(())
}

fn convert(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let Operation::Convert(from, conversion) = decoded.instruction.operation else {
        return Err(malformed(decoded, "missing conversion").into());
    };
    let operand = pop_term(vm, from)?;
    vm.push(Value::from(Term::convert(conversion, operand)))?;
    Ok(())
}
