//! Instructions that move values between the operand stack, the constant
//! pool, local variables and array elements, along with the stack
//! manipulation instructions.

use crate::{
    class::{Constant, FieldType},
    constant::{ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION, ARRAY_STORE_EXCEPTION, NULL_POINTER_EXCEPTION},
    disassembly::{Decoded, Operands},
    error::execution::Error,
    opcode::{
        code::*,
        util::{
            arithmetic_fault,
            compare_int,
            constant_index,
            expect,
            immediate,
            int_operand,
            local_index,
            malformed,
            materializations,
            non_null,
            refinements,
            single,
            symbolic_int,
        },
        Arity,
        ArrayKind,
        Behavior,
        DupForm,
        Instruction,
        InstructionSet,
        Layout,
        Operation,
        StackType,
    },
    search::choice::Alternative,
    vm::{
        fault::{Fault, Flow},
        state::heap::HeapObject,
        value::{BinaryOp, Comparison, Constraint, Kind, Primitive, Term, Value},
        VirtualMachine,
    },
};

const ARRAY_ACCESS: &[&str] = &[NULL_POINTER_EXCEPTION, ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION];
const REFERENCE_ARRAY_STORE: &[&str] = &[
    NULL_POINTER_EXCEPTION,
    ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION,
    ARRAY_STORE_EXCEPTION,
];

/// Registers the instructions of this family in `set`.
pub fn register(set: &mut InstructionSet) {
    register_constants(set);
    register_locals(set);
    register_arrays(set);
    register_stack(set);

    set.register(
        Instruction::new(IINC, "iinc", Operation::Increment, Behavior::shared(increment))
            .layout(Layout::Increment),
    );
    set.register(
        Instruction::new(WIDE, "wide", Operation::Nop, Behavior::shared(wide)).layout(Layout::Wide),
    );
}

fn register_constants(set: &mut InstructionSet) {
    set.register(Instruction::new(NOP, "nop", Operation::Nop, Behavior::shared(nop)));
    set.register(
        Instruction::new(ACONST_NULL, "aconst_null", Operation::PushNull, Behavior::shared(push_null))
            .pushes(single(StackType::Reference)),
    );

    let constants = [
        (ICONST_M1, "iconst_m1", Primitive::Int(-1)),
        (ICONST_0, "iconst_0", Primitive::Int(0)),
        (ICONST_1, "iconst_1", Primitive::Int(1)),
        (ICONST_2, "iconst_2", Primitive::Int(2)),
        (ICONST_3, "iconst_3", Primitive::Int(3)),
        (ICONST_4, "iconst_4", Primitive::Int(4)),
        (ICONST_5, "iconst_5", Primitive::Int(5)),
        (LCONST_0, "lconst_0", Primitive::Long(0)),
        (LCONST_1, "lconst_1", Primitive::Long(1)),
        (FCONST_0, "fconst_0", Primitive::Float(0.0)),
        (FCONST_1, "fconst_1", Primitive::Float(1.0)),
        (FCONST_2, "fconst_2", Primitive::Float(2.0)),
        (DCONST_0, "dconst_0", Primitive::Double(0.0)),
        (DCONST_1, "dconst_1", Primitive::Double(1.0)),
    ];
    for (opcode, mnemonic, value) in constants {
        set.register(
            Instruction::new(opcode, mnemonic, Operation::PushConstant(value), Behavior::shared(push_constant))
                .pushes(single(StackType::of(value.kind()))),
        );
    }

    for (opcode, mnemonic, layout) in [
        (BIPUSH, "bipush", Layout::Immediate8),
        (SIPUSH, "sipush", Layout::Immediate16),
    ] {
        set.register(
            Instruction::new(opcode, mnemonic, Operation::PushImmediate, Behavior::shared(push_immediate))
                .pushes(single(StackType::Int))
                .layout(layout),
        );
    }

    for (opcode, mnemonic, layout) in [
        (LDC, "ldc", Layout::Constant8),
        (LDC_W, "ldc_w", Layout::Constant16),
        (LDC2_W, "ldc2_w", Layout::Constant16),
    ] {
        set.register(
            Instruction::new(opcode, mnemonic, Operation::LoadConstant, Behavior::shared(load_constant))
                .pushes(single(StackType::Any))
                .layout(layout),
        );
    }
}

fn register_locals(set: &mut InstructionSet) {
    let explicit = [
        (ILOAD, "iload", ISTORE, "istore", StackType::Int),
        (LLOAD, "lload", LSTORE, "lstore", StackType::Long),
        (FLOAD, "fload", FSTORE, "fstore", StackType::Float),
        (DLOAD, "dload", DSTORE, "dstore", StackType::Double),
        (ALOAD, "aload", ASTORE, "astore", StackType::Reference),
    ];
    for (load_op, load_name, store_op, store_name, item) in explicit {
        set.register(
            Instruction::new(load_op, load_name, Operation::Load(item), Behavior::shared(load))
                .pushes(single(item))
                .layout(Layout::Local8),
        );
        set.register(
            Instruction::new(store_op, store_name, Operation::Store(item), Behavior::shared(store))
                .pops(single(item))
                .layout(Layout::Local8),
        );
    }

    let loads: [(u8, [&'static str; 4], StackType); 5] = [
        (ILOAD_0, ["iload_0", "iload_1", "iload_2", "iload_3"], StackType::Int),
        (LLOAD_0, ["lload_0", "lload_1", "lload_2", "lload_3"], StackType::Long),
        (FLOAD_0, ["fload_0", "fload_1", "fload_2", "fload_3"], StackType::Float),
        (DLOAD_0, ["dload_0", "dload_1", "dload_2", "dload_3"], StackType::Double),
        (ALOAD_0, ["aload_0", "aload_1", "aload_2", "aload_3"], StackType::Reference),
    ];
    for (first, mnemonics, item) in loads {
        for (index, mnemonic) in (0u8..).zip(mnemonics) {
            set.register(
                Instruction::new(first + index, mnemonic, Operation::Load(item), Behavior::shared(load))
                    .pushes(single(item))
                    .implicit_local(u16::from(index)),
            );
        }
    }

    let stores: [(u8, [&'static str; 4], StackType); 5] = [
        (ISTORE_0, ["istore_0", "istore_1", "istore_2", "istore_3"], StackType::Int),
        (LSTORE_0, ["lstore_0", "lstore_1", "lstore_2", "lstore_3"], StackType::Long),
        (FSTORE_0, ["fstore_0", "fstore_1", "fstore_2", "fstore_3"], StackType::Float),
        (DSTORE_0, ["dstore_0", "dstore_1", "dstore_2", "dstore_3"], StackType::Double),
        (ASTORE_0, ["astore_0", "astore_1", "astore_2", "astore_3"], StackType::Reference),
    ];
    for (first, mnemonics, item) in stores {
        for (index, mnemonic) in (0u8..).zip(mnemonics) {
            set.register(
                Instruction::new(first + index, mnemonic, Operation::Store(item), Behavior::shared(store))
                    .pops(single(item))
                    .implicit_local(u16::from(index)),
            );
        }
    }
}

fn register_arrays(set: &mut InstructionSet) {
    let kinds = [
        (IALOAD, "iaload", IASTORE, "iastore", ArrayKind::Int),
        (LALOAD, "laload", LASTORE, "lastore", ArrayKind::Long),
        (FALOAD, "faload", FASTORE, "fastore", ArrayKind::Float),
        (DALOAD, "daload", DASTORE, "dastore", ArrayKind::Double),
        (AALOAD, "aaload", AASTORE, "aastore", ArrayKind::Reference),
        (BALOAD, "baload", BASTORE, "bastore", ArrayKind::Byte),
        (CALOAD, "caload", CASTORE, "castore", ArrayKind::Char),
        (SALOAD, "saload", SASTORE, "sastore", ArrayKind::Short),
    ];
    for (load_op, load_name, store_op, store_name, kind) in kinds {
        let item = kind.stack_kind().map_or(StackType::Reference, StackType::of);
        set.register(
            Instruction::new(
                load_op,
                load_name,
                Operation::ArrayLoad(kind),
                Behavior::dual(array_load, symbolic_array_load),
            )
            .pops(Arity::Exact(&[StackType::Reference, StackType::Int]))
            .pushes(single(item))
            .throws(ARRAY_ACCESS),
        );

        let throws = if kind == ArrayKind::Reference {
            REFERENCE_ARRAY_STORE
        } else {
            ARRAY_ACCESS
        };
        set.register(
            Instruction::new(
                store_op,
                store_name,
                Operation::ArrayStore(kind),
                Behavior::dual(array_store, symbolic_array_store),
            )
            .pops(array_store_pops(item))
            .throws(throws),
        );
    }
}

fn array_store_pops(item: StackType) -> Arity {
    Arity::Exact(match item {
        StackType::Int => &[StackType::Reference, StackType::Int, StackType::Int],
        StackType::Long => &[StackType::Reference, StackType::Int, StackType::Long],
        StackType::Float => &[StackType::Reference, StackType::Int, StackType::Float],
        StackType::Double => &[StackType::Reference, StackType::Int, StackType::Double],
        StackType::Reference | StackType::Any => &[StackType::Reference, StackType::Int, StackType::Reference],
    })
}

fn register_stack(set: &mut InstructionSet) {
    set.register(
        Instruction::new(POP, "pop", Operation::Pop { slots: 1 }, Behavior::shared(pop))
            .pops(single(StackType::Any)),
    );
    set.register(
        Instruction::new(POP2, "pop2", Operation::Pop { slots: 2 }, Behavior::shared(pop))
            .pops(Arity::Unknown),
    );
    set.register(
        Instruction::new(DUP, "dup", Operation::Dup(DupForm::Dup), Behavior::shared(dup))
            .pops(single(StackType::Any))
            .pushes(Arity::Exact(&[StackType::Any, StackType::Any])),
    );
    set.register(
        Instruction::new(DUP_X1, "dup_x1", Operation::Dup(DupForm::DupX1), Behavior::shared(dup))
            .pops(Arity::Exact(&[StackType::Any, StackType::Any]))
            .pushes(Arity::Exact(&[StackType::Any, StackType::Any, StackType::Any])),
    );
    for (opcode, mnemonic, form) in [
        (DUP_X2, "dup_x2", DupForm::DupX2),
        (DUP2, "dup2", DupForm::Dup2),
        (DUP2_X1, "dup2_x1", DupForm::Dup2X1),
        (DUP2_X2, "dup2_x2", DupForm::Dup2X2),
    ] {
        set.register(
            Instruction::new(opcode, mnemonic, Operation::Dup(form), Behavior::shared(dup))
                .pops(Arity::Unknown)
                .pushes(Arity::Unknown),
        );
    }
    set.register(
        Instruction::new(SWAP, "swap", Operation::Swap, Behavior::shared(swap))
            .pops(Arity::Exact(&[StackType::Any, StackType::Any]))
            .pushes(Arity::Exact(&[StackType::Any, StackType::Any])),
    );
}

fn nop(_vm: &mut VirtualMachine, _decoded: &Decoded) -> Flow {
    Ok(())
}

fn push_null(vm: &mut VirtualMachine, _decoded: &Decoded) -> Flow {
    vm.push(Value::Null)?;
    Ok(())
}

fn push_constant(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let Operation::PushConstant(value) = decoded.instruction.operation else {
        return Err(malformed(decoded, "missing constant").into());
    };
    vm.push(value)?;
    Ok(())
}

fn push_immediate(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    vm.push(Value::int(immediate(decoded)?))?;
    Ok(())
}

/// Pushes a constant from the constant pool: numbers as they are, strings as
/// interned string objects and classes as their mirrors.
fn load_constant(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let index = constant_index(decoded)?;
    let constant = vm.frame()?.method().constant_pool().get(index)?.clone();
    let value = match constant {
        Constant::Integer(v) => Value::int(v),
        Constant::Float(v) => Value::float(v),
        Constant::Long(v) => Value::long(v),
        Constant::Double(v) => Value::double(v),
        Constant::String(text) => Value::Reference(vm.intern_string(&text)?),
        Constant::Class(name) => Value::Reference(vm.class_mirror(&name)?),
        _ => {
            return Err(Error::InvalidConstant {
                index,
                expected: "loadable constant".to_string(),
            }
            .into())
        }
    };

    let wide = decoded.instruction.opcode == LDC2_W;
    if wide != (value.category() == 2) {
        let expected = if wide { "long or double" } else { "single-slot constant" };
        return Err(Error::InvalidConstant {
            index,
            expected: expected.to_string(),
        }
        .into());
    }
    vm.push(value)?;
    Ok(())
}

fn load(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let Operation::Load(item) = decoded.instruction.operation else {
        return Err(malformed(decoded, "missing load type").into());
    };
    let value = expect(vm.load_local(local_index(decoded)?)?, item)?;
    vm.push(value)?;
    Ok(())
}

fn store(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let Operation::Store(item) = decoded.instruction.operation else {
        return Err(malformed(decoded, "missing store type").into());
    };
    let value = expect(vm.pop()?, item)?;
    vm.store_local(local_index(decoded)?, value)?;
    Ok(())
}

fn out_of_bounds(index: i32, length: usize) -> Fault {
    Fault::raise(
        ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION,
        Some(format!("Index {index} out of bounds for length {length}")),
    )
}

/// Loads an element from an array.
///
/// # Semantics
///
/// | Stack Index | Input      | Output          |
/// | :---------: | :--------: | :-------------: |
/// | 0           | `index`    | `array[index]`  |
/// | 1           | `arrayref` |                 |
fn array_load(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let Operation::ArrayLoad(kind) = decoded.instruction.operation else {
        return Err(malformed(decoded, "missing array kind").into());
    };
    let index = int_operand(&vm.pop()?)?;
    let array = non_null(vm.pop()?)?;

    let value = match vm.state.heap().get(array)? {
        HeapObject::Array { elements, .. } => match usize::try_from(index).ok().and_then(|i| elements.get(i)) {
            Some(value) => value.clone(),
            None => return Err(out_of_bounds(index, elements.len())),
        },
        other => {
            return Err(Error::TypeMismatch {
                expected: "array".to_string(),
                found:    other.class_name(),
            }
            .into())
        }
    };
    let item = kind.stack_kind().map_or(StackType::Reference, StackType::of);
    vm.push(expect(value, item)?)?;
    Ok(())
}

fn symbolic_array_load(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    match array_choices(vm, 1, 0, 2)? {
        Some(alternatives) => vm.choose(decoded, alternatives),
        None => array_load(vm, decoded),
    }
}

/// Stores a value into an array. Values stored into `byte`, `char` and
/// `short` arrays are narrowed, and values stored into `boolean` arrays keep
/// only their lowest bit.
///
/// # Semantics
///
/// | Stack Index | Input      | Output |
/// | :---------: | :--------: | :----: |
/// | 0           | `value`    |        |
/// | 1           | `index`    |        |
/// | 2           | `arrayref` |        |
fn array_store(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let Operation::ArrayStore(kind) = decoded.instruction.operation else {
        return Err(malformed(decoded, "missing array kind").into());
    };
    let value = vm.pop()?;
    let index = int_operand(&vm.pop()?)?;
    let array = non_null(vm.pop()?)?;

    let (component, length) = match vm.state.heap().get(array)? {
        HeapObject::Array { component, elements } => (component.clone(), elements.len()),
        other => {
            return Err(Error::TypeMismatch {
                expected: "array".to_string(),
                found:    other.class_name(),
            }
            .into())
        }
    };
    let Some(position) = usize::try_from(index).ok().filter(|i| *i < length) else {
        return Err(out_of_bounds(index, length));
    };

    let value = match kind.stack_kind() {
        Some(stack_kind) => {
            let term = value.into_term(stack_kind)?;
            narrow(kind, &component, term)?
        }
        None => {
            let value = expect(value, StackType::Reference)?;
            if let (Value::Reference(object), Some(target)) = (&value, component.class_name()) {
                let class = vm.state.heap().get(*object)?.class_name();
                if !vm.metadata.is_assignable(&class, &target) {
                    return Err(Fault::raise(ARRAY_STORE_EXCEPTION, Some(class)));
                }
            }
            value
        }
    };
    vm.write_element(array, position, value)?;
    Ok(())
}

fn narrow(kind: ArrayKind, component: &FieldType, term: Term) -> Result<Value, Fault> {
    if *component == FieldType::Boolean {
        let bit = Term::binary(BinaryOp::And, term, Term::Constant(Primitive::Int(1))).map_err(arithmetic_fault)?;
        return Ok(Value::from(bit));
    }
    Ok(Value::from(match kind.narrowing() {
        Some(conversion) => Term::convert(conversion, term),
        None => term,
    }))
}

fn symbolic_array_store(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    match array_choices(vm, 2, 1, 3)? {
        Some(alternatives) => vm.choose(decoded, alternatives),
        None => array_store(vm, decoded),
    }
}

/// Builds the alternatives of an array access whose array reference is at
/// stack depth `array_depth` and whose index is at `index_depth`, or returns
/// [`None`] if the access does not depend on symbolic inputs.
///
/// Arrays whose length is not chosen yet are given each candidate length. A
/// symbolic index is fixed to each valid index in turn, with a final
/// alternative for an index out of bounds.
fn array_choices(
    vm: &VirtualMachine,
    array_depth: usize,
    index_depth: usize,
    pops: usize,
) -> Result<Option<Vec<Alternative>>, Fault> {
    let Value::Reference(array) = vm.peek(array_depth)? else {
        return Ok(None);
    };
    let length = match vm.state.heap().get(*array)? {
        HeapObject::Unresolved { .. } => {
            return Ok(Some(materializations(*array, vm.config.max_generated_array_length)));
        }
        HeapObject::Array { elements, .. } => elements.len(),
        _ => return Ok(None),
    };
    let Some(index) = symbolic_int(vm.peek(index_depth)?) else {
        return Ok(None);
    };

    let length = i32::try_from(length).unwrap_or(i32::MAX);
    let failure = Constraint::Any(vec![
        compare_int(Comparison::Lt, index, 0),
        compare_int(Comparison::Ge, index, length),
    ]);
    Ok(Some(refinements(
        index,
        index_depth,
        0..length,
        failure,
        pops,
        ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION,
    )))
}

fn pop(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let Operation::Pop { slots } = decoded.instruction.operation else {
        return Err(malformed(decoded, "missing slot count").into());
    };
    let top = vm.pop()?;
    match (slots, top.category()) {
        (1, 1) | (2, 2) => (),
        (2, 1) => {
            let second = vm.pop()?;
            if second.category() != 1 {
                return Err(second.mismatch("single-slot value").into());
            }
        }
        _ => return Err(top.mismatch("single-slot value").into()),
    }
    Ok(())
}

/// Duplicates the top one or two slots of the stack, optionally inserting the
/// copy below further slots. Category 2 values count as two slots.
fn dup(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let Operation::Dup(form) = decoded.instruction.operation else {
        return Err(malformed(decoded, "missing dup form").into());
    };
    let wide = |value: &Value| value.category() == 2;

    let v1 = vm.pop()?;
    let pushed = match form {
        DupForm::Dup => vec![v1.clone(), v1],
        DupForm::DupX1 => {
            let v2 = vm.pop()?;
            vec![v1.clone(), v2, v1]
        }
        DupForm::DupX2 => {
            let v2 = vm.pop()?;
            if wide(&v2) {
                vec![v1.clone(), v2, v1]
            } else {
                let v3 = vm.pop()?;
                vec![v1.clone(), v3, v2, v1]
            }
        }
        DupForm::Dup2 => {
            if wide(&v1) {
                vec![v1.clone(), v1]
            } else {
                let v2 = vm.pop()?;
                vec![v2.clone(), v1.clone(), v2, v1]
            }
        }
        DupForm::Dup2X1 => {
            let v2 = vm.pop()?;
            if wide(&v1) {
                vec![v1.clone(), v2, v1]
            } else {
                let v3 = vm.pop()?;
                vec![v2.clone(), v1.clone(), v3, v2, v1]
            }
        }
        DupForm::Dup2X2 => {
            let v2 = vm.pop()?;
            match (wide(&v1), wide(&v2)) {
                (true, true) => vec![v1.clone(), v2, v1],
                (true, false) => {
                    let v3 = vm.pop()?;
                    vec![v1.clone(), v3, v2, v1]
                }
                (false, _) => {
                    let v3 = vm.pop()?;
                    if wide(&v3) {
                        vec![v2.clone(), v1.clone(), v3, v2, v1]
                    } else {
                        let v4 = vm.pop()?;
                        vec![v2.clone(), v1.clone(), v4, v3, v2, v1]
                    }
                }
            }
        }
    };

    for value in pushed {
        vm.push(value)?;
    }
    Ok(())
}

fn swap(vm: &mut VirtualMachine, _decoded: &Decoded) -> Flow {
    let v1 = vm.pop()?;
    let v2 = vm.pop()?;
    vm.push(v1)?;
    vm.push(v2)?;
    Ok(())
}

fn increment(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let Operands::Increment { delta, .. } = decoded.operands else {
        return Err(malformed(decoded, "missing increment").into());
    };
    let index = local_index(decoded)?;
    let current = vm.load_local(index)?.into_term(Kind::Int)?;
    let result = Term::binary(BinaryOp::Add, current, Term::Constant(Primitive::Int(i32::from(delta))))
        .map_err(arithmetic_fault)?;
    vm.store_local(index, Value::from(result))?;
    Ok(())
}

fn wide(_vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    Err(malformed(decoded, "must be decoded together with the instruction it widens").into())
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::{
        bytecode,
        class::{ClassBuilder, ClassLibrary, ConstantPool, MethodBuilder},
        opcode::code::*,
        vm::{value::Primitive, Config, EntryPoint, Outcome, ReturnedValue, VirtualMachine},
    };

    fn run(code: Vec<u8>, pool: ConstantPool, descriptor: &str) -> anyhow::Result<Outcome> {
        let class = ClassBuilder::new("Main")
            .method(
                MethodBuilder::new("run", descriptor)
                    .static_method()
                    .code(code)
                    .max_stack(6)
                    .max_locals(4),
            )
            .pool(pool)
            .build()?;
        let library = ClassLibrary::with_core_classes()?.with(class);
        let mut vm = VirtualMachine::new(Arc::new(library), Config::default());
        Ok(vm.run(&EntryPoint::new("Main", "run", descriptor)))
    }

    #[test]
    fn locals_round_trip_through_the_stack() -> anyhow::Result<()> {
        let code = bytecode![BIPUSH, [0x2a], ISTORE_1, ILOAD_1, ILOAD_1, IADD, IRETURN];
        let outcome = run(code, ConstantPool::new(), "()I")?;
        assert_eq!(outcome.returned_value(), Some(&ReturnedValue::Primitive(Primitive::Int(84))));

        Ok(())
    }

    #[test]
    fn ldc_interns_strings() -> anyhow::Result<()> {
        let mut pool = ConstantPool::new();
        let hello = pool.string("hello");
        let code = bytecode![LDC, [u8::try_from(hello)?], ARETURN];
        let outcome = run(code, pool, "()Ljava/lang/String;")?;
        assert_eq!(outcome.returned_value(), Some(&ReturnedValue::Str("hello".to_string())));

        Ok(())
    }

    #[test]
    fn byte_arrays_narrow_stored_values() -> anyhow::Result<()> {
        // new byte[1]; a[0] = 200; return a[0]
        let code = bytecode![
            ICONST_1,
            NEWARRAY,
            [T_BYTE],
            DUP,
            ICONST_0,
            SIPUSH,
            [0x00, 0xc8],
            BASTORE,
            ICONST_0,
            BALOAD,
            IRETURN
        ];
        let outcome = run(code, ConstantPool::new(), "()I")?;
        assert_eq!(outcome.returned_value(), Some(&ReturnedValue::Primitive(Primitive::Int(-56))));

        Ok(())
    }

    #[test]
    fn out_of_bounds_loads_raise() -> anyhow::Result<()> {
        let code = bytecode![ICONST_2, NEWARRAY, [T_INT], ICONST_2, IALOAD, IRETURN];
        match run(code, ConstantPool::new(), "()I")? {
            Outcome::UncaughtException { class, message } => {
                assert_eq!(class, "java/lang/ArrayIndexOutOfBoundsException");
                assert_eq!(message.as_deref(), Some("Index 2 out of bounds for length 2"));
            }
            other => anyhow::bail!("Unexpected outcome {other}"),
        }

        Ok(())
    }

    #[test]
    fn dup_forms_respect_categories() -> anyhow::Result<()> {
        // [3, 5L] -> dup2_x1 -> [5L, 3, 5L] -> pop2 -> [5L, 3]
        let code = bytecode![ICONST_3, ICONST_5, I2L, DUP2_X1, POP2, ISTORE_1, L2I, ILOAD_1, IADD, IRETURN];
        let outcome = run(code, ConstantPool::new(), "()I")?;
        assert_eq!(outcome.returned_value(), Some(&ReturnedValue::Primitive(Primitive::Int(8))));

        Ok(())
    }
}
