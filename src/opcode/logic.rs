//! Instructions that compare values, either pushing the result of the
//! comparison or branching on it.

use crate::{
    disassembly::Decoded,
    opcode::{
        code::*,
        util::{branch_target, is_symbolic, malformed, pair, single, two_way},
        Against,
        Behavior,
        Instruction,
        InstructionSet,
        JumpKind,
        Layout,
        Operation,
        StackType,
    },
    search::choice::{Action, Alternative},
    vm::{
        fault::Flow,
        value::{Comparison, Constraint, Kind, Primitive, Value},
        VirtualMachine,
    },
};

/// Registers the instructions of this family in `set`.
pub fn register(set: &mut InstructionSet) {
    for (opcode, mnemonic, kind, nan) in [
        (LCMP, "lcmp", Kind::Long, 0),
        (FCMPL, "fcmpl", Kind::Float, -1),
        (FCMPG, "fcmpg", Kind::Float, 1),
        (DCMPL, "dcmpl", Kind::Double, -1),
        (DCMPG, "dcmpg", Kind::Double, 1),
    ] {
        set.register(
            Instruction::new(
                opcode,
                mnemonic,
                Operation::Compare { kind, nan },
                Behavior::dual(compare, symbolic_compare),
            )
            .pops(pair(StackType::of(kind)))
            .pushes(single(StackType::Int)),
        );
    }

    let branches = [
        (IFEQ, "ifeq", Comparison::Eq, Against::Zero),
        (IFNE, "ifne", Comparison::Ne, Against::Zero),
        (IFLT, "iflt", Comparison::Lt, Against::Zero),
        (IFGE, "ifge", Comparison::Ge, Against::Zero),
        (IFGT, "ifgt", Comparison::Gt, Against::Zero),
        (IFLE, "ifle", Comparison::Le, Against::Zero),
        (IF_ICMPEQ, "if_icmpeq", Comparison::Eq, Against::Operand),
        (IF_ICMPNE, "if_icmpne", Comparison::Ne, Against::Operand),
        (IF_ICMPLT, "if_icmplt", Comparison::Lt, Against::Operand),
        (IF_ICMPGE, "if_icmpge", Comparison::Ge, Against::Operand),
        (IF_ICMPGT, "if_icmpgt", Comparison::Gt, Against::Operand),
        (IF_ICMPLE, "if_icmple", Comparison::Le, Against::Operand),
        (IF_ACMPEQ, "if_acmpeq", Comparison::Eq, Against::Reference),
        (IF_ACMPNE, "if_acmpne", Comparison::Ne, Against::Reference),
        (IFNULL, "ifnull", Comparison::Eq, Against::Null),
        (IFNONNULL, "ifnonnull", Comparison::Ne, Against::Null),
    ];
    for (opcode, mnemonic, comparison, against) in branches {
        let pops = match against {
            Against::Zero => single(StackType::Int),
            Against::Operand => pair(StackType::Int),
            Against::Null => single(StackType::Reference),
            Against::Reference => pair(StackType::Reference),
        };
        set.register(
            Instruction::new(
                opcode,
                mnemonic,
                Operation::If(comparison, against),
                Behavior::dual(branch_if, symbolic_branch_if),
            )
            .pops(pops)
            .layout(Layout::Branch16)
            .jump(JumpKind::Conditional),
        );
    }
}

/// Compares two values of the same kind, pushing `-1`, `0` or `1`. If either
/// operand is NaN, the instruction's NaN result is pushed instead.
///
/// # Semantics
///
/// | Stack Index | Input | Output            |
/// | :---------: | :---: | :---------------: |
/// | 0           | `b`   | `compare(a, b)`   |
/// | 1           | `a`   |                   |
fn compare(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let Operation::Compare { kind, nan } = decoded.instruction.operation else {
        return Err(malformed(decoded, "missing comparison kind").into());
    };
    let right = vm.pop()?.into_primitive(kind)?;
    let left = vm.pop()?.into_primitive(kind)?;
    vm.push(Value::int(left.compare(&right, nan)))?;
    Ok(())
}

fn symbolic_compare(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let Operation::Compare { kind, nan } = decoded.instruction.operation else {
        return Err(malformed(decoded, "missing comparison kind").into());
    };
    if !is_symbolic(vm.peek(0)?) && !is_symbolic(vm.peek(1)?) {
        return compare(vm, decoded);
    }

    let right = vm.peek(0)?.clone().into_term(kind)?;
    let left = vm.peek(1)?.clone().into_term(kind)?;
    let mut alternatives: Vec<Alternative> = [(Comparison::Lt, -1), (Comparison::Eq, 0), (Comparison::Gt, 1)]
        .into_iter()
        .map(|(comparison, result)| {
            Alternative::new(
                Constraint::compare(comparison, left.clone(), right.clone()),
                Action::Push {
                    pops:  2,
                    value: Value::int(result),
                },
            )
        })
        .collect();
    if !kind.is_integral() {
        alternatives.push(Alternative::new(Constraint::Unordered { left, right }, Action::Push {
            pops:  2,
            value: Value::int(nan),
        }));
    }
    vm.choose(decoded, alternatives)
}

/// Jumps to the branch target if the comparison holds, and continues with the
/// next instruction otherwise.
fn branch_if(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let Operation::If(comparison, against) = decoded.instruction.operation else {
        return Err(malformed(decoded, "missing condition").into());
    };
    let target = branch_target(decoded)?;

    let taken = match against {
        Against::Zero => {
            let value = vm.pop()?.into_primitive(Kind::Int)?;
            comparison.holds(&value, &Primitive::Int(0))
        }
        Against::Operand => {
            let right = vm.pop()?.into_primitive(Kind::Int)?;
            let left = vm.pop()?.into_primitive(Kind::Int)?;
            comparison.holds(&left, &right)
        }
        Against::Null => {
            let value = vm.pop()?;
            if !value.is_reference() {
                return Err(value.mismatch("reference").into());
            }
            (comparison == Comparison::Eq) == (value == Value::Null)
        }
        Against::Reference => {
            let right = vm.pop()?;
            let left = vm.pop()?;
            if let Some(other) = [&left, &right].into_iter().find(|v| !v.is_reference()) {
                return Err(other.mismatch("reference").into());
            }
            (comparison == Comparison::Eq) == (left == right)
        }
    };

    if taken {
        vm.frame_mut()?.jump(target)?;
    }
    Ok(())
}

/// Branches on `int` comparisons that depend on symbolic inputs by choosing
/// between the target and the next instruction. References are never
/// symbolic, so comparisons of references are always decided directly.
fn symbolic_branch_if(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let Operation::If(comparison, against) = decoded.instruction.operation else {
        return Err(malformed(decoded, "missing condition").into());
    };
    let (condition, pops) = match against {
        Against::Zero if is_symbolic(vm.peek(0)?) => {
            let value = vm.peek(0)?.clone().into_term(Kind::Int)?;
            (Constraint::compare(comparison, value, Primitive::Int(0).into()), 1)
        }
        Against::Operand if is_symbolic(vm.peek(0)?) || is_symbolic(vm.peek(1)?) => {
            let right = vm.peek(0)?.clone().into_term(Kind::Int)?;
            let left = vm.peek(1)?.clone().into_term(Kind::Int)?;
            (Constraint::compare(comparison, left, right), 2)
        }
        _ => return branch_if(vm, decoded),
    };
    let target = branch_target(decoded)?;
    vm.choose(decoded, two_way(condition, pops, target, decoded.next_pc()))
}
