//! Instructions that interact with the object model: fields, method
//! invocation, object and array creation, type checks and monitors.

use std::sync::Arc;

use crate::{
    class::FieldType,
    constant::{
        ABSTRACT_METHOD_ERROR,
        CLASS_CAST_EXCEPTION,
        ILLEGAL_MONITOR_STATE_EXCEPTION,
        INCOMPATIBLE_CLASS_CHANGE_ERROR,
        INSTANTIATION_ERROR,
        NEGATIVE_ARRAY_SIZE_EXCEPTION,
        NULL_POINTER_EXCEPTION,
        UNSATISFIED_LINK_ERROR,
    },
    disassembly::{Decoded, Operands},
    error::execution::{Error, Result},
    opcode::{
        code::*,
        util::{
            candidate_lengths,
            compare_int,
            constant_index,
            expect,
            immediate,
            int_operand,
            malformed,
            materializations,
            non_null,
            refinements,
            single,
            symbolic_int,
        },
        Arity,
        Behavior,
        InvokeKind,
        Instruction,
        InstructionSet,
        JumpKind,
        Layout,
        Operation,
        StackType,
    },
    search::choice::Alternative,
    vm::{
        fault::{Fault, Flow},
        state::{
            frame::Monitor,
            heap::{HeapObject, HeapRef},
        },
        value::{Comparison, Value},
        VirtualMachine,
    },
};

const STATIC_ACCESS: &[&str] = &[INCOMPATIBLE_CLASS_CHANGE_ERROR];
const FIELD_ACCESS: &[&str] = &[NULL_POINTER_EXCEPTION, INCOMPATIBLE_CLASS_CHANGE_ERROR];
const INVOCATION: &[&str] = &[NULL_POINTER_EXCEPTION, ABSTRACT_METHOD_ERROR, UNSATISFIED_LINK_ERROR];
const INSTANTIATION: &[&str] = &[INSTANTIATION_ERROR];
const ARRAY_CREATION: &[&str] = &[NEGATIVE_ARRAY_SIZE_EXCEPTION];
const NULL_CHECK: &[&str] = &[NULL_POINTER_EXCEPTION];
const CAST: &[&str] = &[CLASS_CAST_EXCEPTION];
const MONITOR_EXIT: &[&str] = &[NULL_POINTER_EXCEPTION, ILLEGAL_MONITOR_STATE_EXCEPTION];

/// Registers the instructions of this family in `set`.
pub fn register(set: &mut InstructionSet) {
    register_fields(set);
    register_invocations(set);
    register_objects(set);
}

fn register_fields(set: &mut InstructionSet) {
    set.register(
        Instruction::new(GETSTATIC, "getstatic", Operation::GetStatic, Behavior::shared(get_static))
            .pushes(single(StackType::Any))
            .layout(Layout::Constant16)
            .throws(STATIC_ACCESS),
    );
    set.register(
        Instruction::new(PUTSTATIC, "putstatic", Operation::PutStatic, Behavior::shared(put_static))
            .pops(single(StackType::Any))
            .layout(Layout::Constant16)
            .throws(STATIC_ACCESS),
    );
    set.register(
        Instruction::new(GETFIELD, "getfield", Operation::GetField, Behavior::shared(get_field))
            .pops(single(StackType::Reference))
            .pushes(single(StackType::Any))
            .layout(Layout::Constant16)
            .throws(FIELD_ACCESS),
    );
    set.register(
        Instruction::new(PUTFIELD, "putfield", Operation::PutField, Behavior::shared(put_field))
            .pops(Arity::Exact(&[StackType::Reference, StackType::Any]))
            .layout(Layout::Constant16)
            .throws(FIELD_ACCESS),
    );
}

fn register_invocations(set: &mut InstructionSet) {
    let invocations = [
        (INVOKEVIRTUAL, "invokevirtual", InvokeKind::Virtual, Layout::Constant16),
        (INVOKESPECIAL, "invokespecial", InvokeKind::Special, Layout::Constant16),
        (INVOKESTATIC, "invokestatic", InvokeKind::Static, Layout::Constant16),
        (INVOKEINTERFACE, "invokeinterface", InvokeKind::Interface, Layout::Interface),
    ];
    for (opcode, mnemonic, kind, layout) in invocations {
        set.register(
            Instruction::new(opcode, mnemonic, Operation::Invoke(kind), Behavior::shared(invoke))
                .pops(Arity::Unknown)
                .pushes(Arity::Unknown)
                .layout(layout)
                .jump(JumpKind::Invocation)
                .throws(INVOCATION),
        );
    }
}

fn register_objects(set: &mut InstructionSet) {
    set.register(
        Instruction::new(NEW, "new", Operation::New, Behavior::shared(new))
            .pushes(single(StackType::Reference))
            .layout(Layout::Constant16)
            .throws(INSTANTIATION),
    );
    set.register(
        Instruction::new(
            NEWARRAY,
            "newarray",
            Operation::NewArray,
            Behavior::dual(new_array, symbolic_new_array),
        )
        .pops(single(StackType::Int))
        .pushes(single(StackType::Reference))
        .layout(Layout::Immediate8)
        .throws(ARRAY_CREATION),
    );
    set.register(
        Instruction::new(
            ANEWARRAY,
            "anewarray",
            Operation::ANewArray,
            Behavior::dual(new_array, symbolic_new_array),
        )
        .pops(single(StackType::Int))
        .pushes(single(StackType::Reference))
        .layout(Layout::Constant16)
        .throws(ARRAY_CREATION),
    );
    set.register(
        Instruction::new(
            MULTIANEWARRAY,
            "multianewarray",
            Operation::MultiANewArray,
            Behavior::dual(multi_new_array, symbolic_multi_new_array),
        )
        .pops(Arity::Unknown)
        .pushes(single(StackType::Reference))
        .layout(Layout::MultiArray)
        .throws(ARRAY_CREATION),
    );
    set.register(
        Instruction::new(
            ARRAYLENGTH,
            "arraylength",
            Operation::ArrayLength,
            Behavior::dual(array_length, symbolic_array_length),
        )
        .pops(single(StackType::Reference))
        .pushes(single(StackType::Int))
        .throws(NULL_CHECK),
    );
    set.register(
        Instruction::new(CHECKCAST, "checkcast", Operation::CheckCast, Behavior::shared(check_cast))
            .pops(single(StackType::Reference))
            .pushes(single(StackType::Reference))
            .layout(Layout::Constant16)
            .throws(CAST),
    );
    set.register(
        Instruction::new(INSTANCEOF, "instanceof", Operation::InstanceOf, Behavior::shared(instance_of))
            .pops(single(StackType::Reference))
            .pushes(single(StackType::Int))
            .layout(Layout::Constant16),
    );
    set.register(
        Instruction::new(
            MONITORENTER,
            "monitorenter",
            Operation::MonitorEnter,
            Behavior::shared(monitor_enter),
        )
        .pops(single(StackType::Reference))
        .throws(NULL_CHECK),
    );
    set.register(
        Instruction::new(MONITOREXIT, "monitorexit", Operation::MonitorExit, Behavior::shared(monitor_exit))
            .pops(single(StackType::Reference))
            .throws(MONITOR_EXIT),
    );
}

/// Resolves the field referenced by the constant at `index`, returning the
/// name of its declaring class, its name and its type.
///
/// A field that is static when `expect_static` is not, or the other way
/// around, raises an `IncompatibleClassChangeError`.
fn resolve_field(
    vm: &VirtualMachine,
    decoded: &Decoded,
    expect_static: bool,
) -> std::result::Result<(Arc<str>, Arc<str>, FieldType), Fault> {
    let index = constant_index(decoded)?;
    let reference = vm.frame()?.method().constant_pool().field_ref(index)?.clone();
    let (declaring, field) = vm.metadata.resolve_field(&reference.class, &reference.name)?;
    if field.is_static() != expect_static {
        return Err(Fault::raise(
            INCOMPATIBLE_CLASS_CHANGE_ERROR,
            Some(format!("{}.{}", declaring.name(), field.name)),
        ));
    }
    Ok((declaring.name().clone(), field.name, field.descriptor))
}

/// Checks that `value` can be stored in a field of type `field_type`.
fn coerce(value: Value, field_type: &FieldType) -> Result<Value> {
    match field_type.kind() {
        Some(kind) => Ok(Value::from(value.into_term(kind)?)),
        None => expect(value, StackType::Reference),
    }
}

fn get_static(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let (class, name, field_type) = resolve_field(vm, decoded, true)?;
    vm.ensure_initialized(&class)?;
    let value = vm.static_field(&class, &name, &field_type);
    vm.push(value)?;
    Ok(())
}

fn put_static(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let (class, name, field_type) = resolve_field(vm, decoded, true)?;
    vm.ensure_initialized(&class)?;
    let value = coerce(vm.pop()?, &field_type)?;
    vm.write_static(class, name, value);
    Ok(())
}

fn get_field(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let (_, name, field_type) = resolve_field(vm, decoded, false)?;
    let object = non_null(vm.pop()?)?;
    let value = vm.field_value(object, &name, &field_type)?;
    vm.push(value)?;
    Ok(())
}

fn put_field(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let (_, name, field_type) = resolve_field(vm, decoded, false)?;
    let value = coerce(vm.pop()?, &field_type)?;
    let object = non_null(vm.pop()?)?;
    vm.write_field(object, name, value)?;
    Ok(())
}

fn invoke(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let Operation::Invoke(kind) = decoded.instruction.operation else {
        return Err(malformed(decoded, "missing invocation kind").into());
    };
    vm.invoke(decoded, kind)
}

/// Creates a new instance of a class, initialising the class first.
///
/// # Semantics
///
/// | Stack Index | Input | Output     |
/// | :---------: | :---: | :--------: |
/// | 0           |       | `objectref` |
///
/// Interfaces and abstract classes raise an `InstantiationError`.
fn new(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let index = constant_index(decoded)?;
    let name = vm.frame()?.method().constant_pool().class_name(index)?.clone();
    let class = vm.metadata.resolve_class(&name)?;
    if class.is_interface() || class.is_abstract() {
        return Err(Fault::raise(INSTANTIATION_ERROR, Some(name.to_string())));
    }
    vm.ensure_initialized(&name)?;
    let object = vm.new_instance(&name)?;
    vm.push(object)?;
    Ok(())
}

/// Gets the component type of the array created by the `newarray` or
/// `anewarray` instruction `decoded`.
fn component_type(vm: &VirtualMachine, decoded: &Decoded) -> Result<FieldType> {
    if decoded.instruction.opcode == ANEWARRAY {
        let index = constant_index(decoded)?;
        let name = vm.frame()?.method().constant_pool().class_name(index)?.clone();
        return Ok(FieldType::from_class_name(&name));
    }
    let code = immediate(decoded)?;
    Ok(match u8::try_from(code).unwrap_or(0) {
        T_BOOLEAN => FieldType::Boolean,
        T_CHAR => FieldType::Char,
        T_FLOAT => FieldType::Float,
        T_DOUBLE => FieldType::Double,
        T_BYTE => FieldType::Byte,
        T_SHORT => FieldType::Short,
        T_INT => FieldType::Int,
        T_LONG => FieldType::Long,
        _ => return Err(Error::InvalidArrayType { code }),
    })
}

/// Gets the length of an array to create from its requested element count,
/// raising a `NegativeArraySizeException` for negative counts.
fn array_size(count: i32) -> std::result::Result<usize, Fault> {
    usize::try_from(count).map_err(|_| Fault::raise(NEGATIVE_ARRAY_SIZE_EXCEPTION, Some(count.to_string())))
}

fn allocate_array(vm: &mut VirtualMachine, component: FieldType, length: usize) -> Result<HeapRef> {
    let elements = vec![component.default_value(); length];
    vm.allocate(HeapObject::Array { component, elements })
}

fn new_array(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let component = component_type(vm, decoded)?;
    let length = array_size(int_operand(&vm.pop()?)?)?;
    let array = allocate_array(vm, component, length)?;
    vm.push(array)?;
    Ok(())
}

/// Builds the alternatives for creating an array whose element count at
/// stack depth `depth` is symbolic: each candidate length, then a negative
/// count.
fn count_refinements(vm: &VirtualMachine, depth: usize, pops: usize) -> Result<Option<Vec<Alternative>>> {
    let Some(count) = symbolic_int(vm.peek(depth)?) else {
        return Ok(None);
    };
    Ok(Some(refinements(
        count,
        depth,
        candidate_lengths(vm.config.max_generated_array_length),
        compare_int(Comparison::Lt, count, 0),
        pops,
        NEGATIVE_ARRAY_SIZE_EXCEPTION,
    )))
}

fn symbolic_new_array(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    match count_refinements(vm, 0, 1)? {
        Some(alternatives) => vm.choose(decoded, alternatives),
        None => new_array(vm, decoded),
    }
}

/// Creates the nested arrays of a `multianewarray` of type `array_type`, one
/// dimension per entry of `lengths`. Dimensions beyond `lengths` are left
/// `null`.
fn build_array(vm: &mut VirtualMachine, array_type: &FieldType, lengths: &[usize]) -> Result<HeapRef> {
    let FieldType::Array(component) = array_type else {
        return Err(Error::TypeMismatch {
            expected: "array type".to_string(),
            found:    array_type.to_string(),
        });
    };
    let Some((&length, rest)) = lengths.split_first() else {
        return allocate_array(vm, (**component).clone(), 0);
    };
    if rest.is_empty() {
        return allocate_array(vm, (**component).clone(), length);
    }

    let elements = (0..length)
        .map(|_| build_array(vm, component, rest).map(Value::Reference))
        .collect::<Result<Vec<_>>>()?;
    vm.allocate(HeapObject::Array {
        component: (**component).clone(),
        elements,
    })
}

fn multi_new_array(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let Operands::MultiArray { index, dimensions } = decoded.operands else {
        return Err(malformed(decoded, "missing dimensions").into());
    };
    let name = vm.frame()?.method().constant_pool().class_name(index)?.clone();
    let array_type = FieldType::from_class_name(&name);

    let counts = vm.pop_many(usize::from(dimensions))?;
    let lengths = counts
        .iter()
        .map(|count| int_operand(count).map_err(Fault::from).and_then(array_size))
        .collect::<std::result::Result<Vec<_>, Fault>>()?;
    let array = build_array(vm, &array_type, &lengths)?;
    vm.push(array)?;
    Ok(())
}

fn symbolic_multi_new_array(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let Operands::MultiArray { dimensions, .. } = decoded.operands else {
        return Err(malformed(decoded, "missing dimensions").into());
    };
    let dimensions = usize::from(dimensions);
    for depth in 0..dimensions {
        if let Some(alternatives) = count_refinements(vm, depth, dimensions)? {
            return vm.choose(decoded, alternatives);
        }
    }
    multi_new_array(vm, decoded)
}

fn array_length(vm: &mut VirtualMachine, _decoded: &Decoded) -> Flow {
    let array = non_null(vm.pop()?)?;
    let length = match vm.state.heap().get(array)? {
        HeapObject::Array { elements, .. } => elements.len(),
        other => {
            return Err(Error::TypeMismatch {
                expected: "array".to_string(),
                found:    other.class_name(),
            }
            .into())
        }
    };
    let length = i32::try_from(length).map_err(|_| Error::TypeMismatch {
        expected: "array length".to_string(),
        found:    length.to_string(),
    })?;
    vm.push(Value::int(length))?;
    Ok(())
}

/// Chooses the length of a symbolic input array when it is first asked for.
fn symbolic_array_length(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    if let Value::Reference(array) = vm.peek(0)? {
        let array = *array;
        if let HeapObject::Unresolved { .. } = vm.state.heap().get(array)? {
            let alternatives = materializations(array, vm.config.max_generated_array_length);
            return vm.choose(decoded, alternatives);
        }
    }
    array_length(vm, decoded)
}

/// Gets the class named by the constant operand of `decoded` along with the
/// runtime class of the object on top of the stack, or [`None`] if it is
/// `null`.
fn type_check_operands(vm: &VirtualMachine, decoded: &Decoded) -> Result<(Arc<str>, Option<String>)> {
    let index = constant_index(decoded)?;
    let target = vm.frame()?.method().constant_pool().class_name(index)?.clone();
    let runtime = match vm.peek(0)? {
        Value::Null => None,
        Value::Reference(object) => Some(vm.state.heap().get(*object)?.class_name()),
        other => return Err(other.mismatch("reference")),
    };
    Ok((target, runtime))
}

fn check_cast(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let (target, runtime) = type_check_operands(vm, decoded)?;
    match runtime {
        Some(class) if !vm.metadata.is_assignable(&class, &target) => Err(Fault::raise(
            CLASS_CAST_EXCEPTION,
            Some(format!(
                "class {} cannot be cast to class {}",
                class.replace('/', "."),
                target.replace('/', ".")
            )),
        )),
        _ => Ok(()),
    }
}

fn instance_of(vm: &mut VirtualMachine, decoded: &Decoded) -> Flow {
    let (target, runtime) = type_check_operands(vm, decoded)?;
    let is_instance = runtime.is_some_and(|class| vm.metadata.is_assignable(&class, &target));
    vm.pop()?;
    vm.push(Value::int(i32::from(is_instance)))?;
    Ok(())
}

fn monitor_enter(vm: &mut VirtualMachine, _decoded: &Decoded) -> Flow {
    let object = non_null(vm.pop()?)?;
    vm.state.enter_monitor(Monitor::Object(object));
    Ok(())
}

fn monitor_exit(vm: &mut VirtualMachine, _decoded: &Decoded) -> Flow {
    let object = non_null(vm.pop()?)?;
    if vm.state.exit_monitor(&Monitor::Object(object)) {
        Ok(())
    } else {
        Err(Fault::raise(ILLEGAL_MONITOR_STATE_EXCEPTION, None))
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::{
        bytecode,
        class::{ClassBuilder, ClassLibrary, ConstantPool, Field, MethodBuilder},
        opcode::code::*,
        vm::{value::Primitive, Config, EntryPoint, ExecutionMode, Outcome, ReturnedValue, VirtualMachine},
    };

    fn machine(
        code: Vec<u8>,
        pool: ConstantPool,
        descriptor: &str,
        mode: ExecutionMode,
    ) -> anyhow::Result<VirtualMachine> {
        let class = ClassBuilder::new("Main")
            .field(Field::static_field("counter", "I")?)
            .field(Field::instance("value", "J")?)
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
        Ok(VirtualMachine::new(Arc::new(library), Config::default().with_mode(mode)))
    }

    #[test]
    fn static_fields_keep_their_values() -> anyhow::Result<()> {
        let mut pool = ConstantPool::new();
        let counter = pool.field("Main", "counter", "I");
        let code = bytecode![
            BIPUSH,
            [7],
            PUTSTATIC,
            index(counter),
            GETSTATIC,
            index(counter),
            ICONST_1,
            IADD,
            IRETURN
        ];
        let mut vm = machine(code, pool, "()I", ExecutionMode::Concrete)?;
        let outcome = vm.run(&EntryPoint::new("Main", "run", "()I"));
        assert_eq!(outcome.returned_value(), Some(&ReturnedValue::Primitive(Primitive::Int(8))));

        Ok(())
    }

    #[test]
    fn instance_fields_start_at_their_default() -> anyhow::Result<()> {
        let mut pool = ConstantPool::new();
        let main = pool.class("Main");
        let value = pool.field("Main", "value", "J");
        let code = bytecode![NEW, index(main), GETFIELD, index(value), LRETURN];
        let mut vm = machine(code, pool, "()J", ExecutionMode::Concrete)?;
        let outcome = vm.run(&EntryPoint::new("Main", "run", "()J"));
        assert_eq!(outcome.returned_value(), Some(&ReturnedValue::Primitive(Primitive::Long(0))));

        Ok(())
    }

    #[test]
    fn accessing_a_static_field_as_an_instance_field_raises() -> anyhow::Result<()> {
        let mut pool = ConstantPool::new();
        let main = pool.class("Main");
        let counter = pool.field("Main", "counter", "I");
        let code = bytecode![NEW, index(main), GETFIELD, index(counter), IRETURN];
        let mut vm = machine(code, pool, "()I", ExecutionMode::Concrete)?;
        match vm.run(&EntryPoint::new("Main", "run", "()I")) {
            Outcome::UncaughtException { class, .. } => {
                assert_eq!(class, "java/lang/IncompatibleClassChangeError");
            }
            other => anyhow::bail!("Unexpected outcome {other}"),
        }

        Ok(())
    }

    #[test]
    fn negative_array_sizes_raise() -> anyhow::Result<()> {
        let code = bytecode![ICONST_M1, NEWARRAY, [T_INT], ARRAYLENGTH, IRETURN];
        let mut vm = machine(code, ConstantPool::new(), "()I", ExecutionMode::Concrete)?;
        match vm.run(&EntryPoint::new("Main", "run", "()I")) {
            Outcome::UncaughtException { class, message } => {
                assert_eq!(class, "java/lang/NegativeArraySizeException");
                assert_eq!(message.as_deref(), Some("-1"));
            }
            other => anyhow::bail!("Unexpected outcome {other}"),
        }

        Ok(())
    }

    #[test]
    fn multi_dimensional_arrays_nest() -> anyhow::Result<()> {
        let mut pool = ConstantPool::new();
        let matrix = pool.class("[[I");
        // (new int[2][3])[1].length
        let code = bytecode![
            ICONST_2,
            ICONST_3,
            MULTIANEWARRAY,
            index(matrix),
            [2],
            ICONST_1,
            AALOAD,
            ARRAYLENGTH,
            IRETURN
        ];
        let mut vm = machine(code, pool, "()I", ExecutionMode::Concrete)?;
        let outcome = vm.run(&EntryPoint::new("Main", "run", "()I"));
        assert_eq!(outcome.returned_value(), Some(&ReturnedValue::Primitive(Primitive::Int(3))));

        Ok(())
    }

    #[test]
    fn failed_casts_name_both_classes() -> anyhow::Result<()> {
        let mut pool = ConstantPool::new();
        let object = pool.class("java/lang/Object");
        let string = pool.class("java/lang/String");
        let code = bytecode![NEW, index(object), CHECKCAST, index(string), ARETURN];
        let mut vm = machine(code, pool, "()Ljava/lang/Object;", ExecutionMode::Concrete)?;
        match vm.run(&EntryPoint::new("Main", "run", "()Ljava/lang/Object;")) {
            Outcome::UncaughtException { class, message } => {
                assert_eq!(class, "java/lang/ClassCastException");
                assert_eq!(
                    message.as_deref(),
                    Some("class java.lang.Object cannot be cast to class java.lang.String")
                );
            }
            other => anyhow::bail!("Unexpected outcome {other}"),
        }

        Ok(())
    }

    #[test]
    fn symbolic_array_lengths_are_enumerated() -> anyhow::Result<()> {
        let code = bytecode![ALOAD_0, ARRAYLENGTH, IRETURN];
        let mut vm = machine(code, ConstantPool::new(), "([I)I", ExecutionMode::Symbolic)?;
        let outcome = vm.run(&EntryPoint::new("Main", "run", "([I)I"));
        let report = outcome.report().ok_or_else(|| anyhow::anyhow!("no report: {outcome}"))?;

        let lengths = report
            .solutions
            .iter()
            .map(|solution| solution.array_lengths.get("arg0").copied())
            .collect::<Vec<_>>();
        assert_eq!(lengths, vec![Some(0), Some(1), Some(2), Some(3)]);

        Ok(())
    }
}
