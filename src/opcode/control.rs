//! Instructions that transfer control unconditionally: jumps, switches,
//! returns and `athrow`.

use crate::{
    constant::{JAVA_LANG_THROWABLE, NULL_POINTER_EXCEPTION},
    disassembly::{Decoded, Operands},
    error::execution::Error,
    opcode::{
        code::*,
        util::{branch_target, compare_int, expect, int_operand, malformed, non_null, single, symbolic_int},
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
        fault::{Fault, Flow, Throwable},
        value::{Comparison, Constraint},
        VirtualMachine,
    },
};

const THROW: &[&str] = &[NULL_POINTER_EXCEPTION];

/// Registers the instructions of this family in `set`.
pub fn register(set: &mut InstructionSet) {
    for (opcode, mnemonic, layout) in [(GOTO, "goto", Layout::Branch16), (GOTO_W, "goto_w", Layout::Branch32)] {
        set.register(
            Instruction::new(opcode, mnemonic, Operation::Goto, Behavior::shared(goto))
                .layout(layout)
                .jump(JumpKind::Always),
        );
    }

    set.register(
        Instruction::new(
            TABLESWITCH,
            "tableswitch",
            Operation::TableSwitch,
            Behavior::dual(switch, symbolic_switch),
        )
        .pops(single(StackType::Int))
        .layout(Layout::TableSwitch)
        .jump(JumpKind::Switch),
    );
    set.register(
        Instruction::new(
            LOOKUPSWITCH,
            "lookupswitch",
            Operation::LookupSwitch,
            Behavior::dual(switch, symbolic_switch),
        )
        .pops(single(StackType::Int))
        .layout(Layout::LookupSwitch)
        .jump(JumpKind::Switch),
    );

    let returns = [
        (IRETURN, "ireturn", Some(StackType::Int)),
        (LRETURN, "lreturn", Some(StackType::Long)),
        (FRETURN, "freturn", Some(StackType::Float)),
        (DRETURN, "dreturn", Some(StackType::Double)),
        (ARETURN, "areturn", Some(StackType::Reference)),
        (RETURN, "return", None),
    ];
    for (opcode, mnemonic, item) in returns {
        let mut instruction = Instruction::new(opcode, mnemonic, Operation::Return(item), Behavior::shared(ret))
            .jump(JumpKind::Return);
        if let Some(item) = item {
            instruction = instruction.pops(single(item));
        }
        set.register(instruction);
    }

    set.register(
        Instruction::new(ATHROW, "athrow", Operation::Throw, Behavior::shared(athrow))
            .pops(single(StackType::Reference))
            .jump(JumpKind::Exception)
            .throws(THROW),
    );
}

fn goto(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let target = branch_target(decoded)?;
    vm.frame_mut()?.jump(target)?;
    Ok(())
}

/// Gets the targets of a switch as `(key, target)` pairs in ascending key
/// order, along with the default target.
fn switch_targets(decoded: &Decoded) -> Result<(Vec<(i32, i64)>, i64), Error> {
    match &decoded.operands {
        Operands::Table { default, low, offsets } => {
            let cases = (*low..)
                .zip(offsets)
                .map(|(key, offset)| (key, decoded.target(*offset)))
                .collect();
            Ok((cases, decoded.target(*default)))
        }
        Operands::Lookup { default, pairs } => {
            let mut cases: Vec<(i32, i64)> = pairs
                .iter()
                .map(|(key, offset)| (*key, decoded.target(*offset)))
                .collect();
            cases.sort_by_key(|(key, _)| *key);
            Ok((cases, decoded.target(*default)))
        }
        _ => Err(malformed(decoded, "missing switch table")),
    }
}

/// Jumps to the target of the case matching the key on top of the stack, or
/// to the default target if no case matches.
fn switch(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let key = int_operand(&vm.pop()?)?;
    let (cases, default) = switch_targets(decoded)?;
    let target = cases
        .iter()
        .find(|(case, _)| *case == key)
        .map_or(default, |(_, target)| *target);
    vm.frame_mut()?.jump(target)?;
    Ok(())
}

/// Chooses between every case of a switch on a symbolic key, in ascending key
/// order, followed by the default.
fn symbolic_switch(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let Some(key) = symbolic_int(vm.peek(0)?).cloned() else {
        return switch(vm, decoded);
    };
    let (cases, default) = switch_targets(decoded)?;

    let default_condition = match (&decoded.operands, cases.first(), cases.last()) {
        (Operands::Table { .. }, Some((low, _)), Some((high, _))) => Some(Constraint::Any(vec![
            compare_int(Comparison::Lt, &key, *low),
            compare_int(Comparison::Gt, &key, *high),
        ])),
        (_, Some(_), _) => Some(Constraint::All(
            cases
                .iter()
                .map(|(case, _)| compare_int(Comparison::Ne, &key, *case))
                .collect(),
        )),
        _ => None,
    };

    let mut alternatives: Vec<Alternative> = cases
        .iter()
        .map(|(case, target)| {
            Alternative::new(compare_int(Comparison::Eq, &key, *case), Action::Jump {
                pops:   1,
                target: *target,
            })
        })
        .collect();
    let fallback = Action::Jump {
        pops:   1,
        target: default,
    };
    alternatives.push(match default_condition {
        Some(condition) => Alternative::new(condition, fallback),
        None => Alternative::unconstrained(fallback),
    });
    vm.choose(decoded, alternatives)
}

fn ret(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let Operation::Return(item) = decoded.instruction.operation else {
        return Err(malformed(decoded, "missing return type").into());
    };
    let value = match item {
        Some(item) => Some(expect(vm.pop()?, item)?),
        None => None,
    };
    vm.return_from_method(value)
}

/// Throws the exception object on top of the stack.
///
/// # Semantics
///
/// | Stack Index | Input       | Output |
/// | :---------: | :---------: | :----: |
/// | 0           | `throwable` |        |
///
/// Throwing `null` raises a `NullPointerException` instead.
fn athrow(vm: &mut VirtualMachine, _decoded: &Decoded) -> Flow {
    let exception = non_null(vm.pop()?)?;
    let class = vm.state.heap().get(exception)?.class_name();
    if !vm.metadata.is_subclass_of(&class, JAVA_LANG_THROWABLE) {
        return Err(Error::TypeMismatch {
            expected: JAVA_LANG_THROWABLE.to_string(),
            found:    class,
        }
        .into());
    }
    Err(Fault::Throw(Throwable::Object(exception)))
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::{
        bytecode,
        class::{ClassBuilder, ClassLibrary, MethodBuilder},
        opcode::code::*,
        vm::{value::Primitive, Config, EntryPoint, ExecutionMode, Outcome, ReturnedValue, VirtualMachine},
    };

    fn machine(code: Vec<u8>, descriptor: &str, mode: ExecutionMode) -> anyhow::Result<VirtualMachine> {
        let class = ClassBuilder::new("Main")
            .method(
                MethodBuilder::new("run", descriptor)
                    .static_method()
                    .code(code)
                    .max_stack(4)
                    .max_locals(2),
            )
            .build()?;
        let library = ClassLibrary::with_core_classes()?.with(class);
        Ok(VirtualMachine::new(Arc::new(library), Config::default().with_mode(mode)))
    }

    /// `switch (x) { case 1: return 10; case 2: return 20; default: return 0; }`
    fn table_switch_code() -> Vec<u8> {
        // 0: iload_0, 1: tableswitch (padded to 4), 24: bipush 10, 26: ireturn,
        // 27: bipush 20, 29: ireturn, 30: iconst_0, 31: ireturn
        bytecode![
            ILOAD_0,
            table_switch(1, 29, 1, &[23, 26]),
            BIPUSH,
            [10],
            IRETURN,
            BIPUSH,
            [20],
            IRETURN,
            ICONST_0,
            IRETURN
        ]
    }

    #[test]
    fn table_switches_select_their_case() -> anyhow::Result<()> {
        let entry = |x: i32| EntryPoint::new("Main", "run", "(I)I").with_argument(x.into());
        for (x, expected) in [(1, 10), (2, 20), (3, 0), (-7, 0)] {
            let mut vm = machine(table_switch_code(), "(I)I", ExecutionMode::Concrete)?;
            assert_eq!(
                vm.run(&entry(x)).returned_value(),
                Some(&ReturnedValue::Primitive(Primitive::Int(expected)))
            );
        }

        Ok(())
    }

    #[test]
    fn symbolic_switches_try_every_case_and_the_default() -> anyhow::Result<()> {
        let mut vm = machine(table_switch_code(), "(I)I", ExecutionMode::Symbolic)?;
        let outcome = vm.run(&EntryPoint::new("Main", "run", "(I)I"));
        let report = outcome.report().ok_or_else(|| anyhow::anyhow!("no report: {outcome}"))?;

        assert_eq!(report.solutions.len(), 3);
        assert_eq!(report.solutions[0].inputs.get("arg0"), Some(&Primitive::Int(1)));
        assert_eq!(report.solutions[1].inputs.get("arg0"), Some(&Primitive::Int(2)));
        assert!(!matches!(
            report.solutions[2].inputs.get("arg0"),
            Some(Primitive::Int(1 | 2))
        ));

        Ok(())
    }

    #[test]
    fn throwing_null_raises_a_null_pointer_exception() -> anyhow::Result<()> {
        let code = bytecode![ACONST_NULL, ATHROW];
        let mut vm = machine(code, "()V", ExecutionMode::Concrete)?;
        match vm.run(&EntryPoint::new("Main", "run", "()V")) {
            Outcome::UncaughtException { class, .. } => assert_eq!(class, "java/lang/NullPointerException"),
            other => anyhow::bail!("Unexpected outcome {other}"),
        }

        Ok(())
    }
}
