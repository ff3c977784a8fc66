//! This module is an integration test that runs small hand-assembled programs
//! on concrete inputs, across calls, classes and exceptions.
#![cfg(test)]

use std::sync::{atomic::AtomicBool, Arc};

use symbex_vm::{
    bytecode,
    class::{ClassBuilder, ConstantPool, Field, MethodBuilder},
    opcode::code::*,
    vm::{fault::AbortReason, value::Primitive, Config, EntryPoint, ExecutionMode, Outcome, ReturnedValue, VirtualMachine},
    watchdog::FlagWatchdog,
};

mod common;

fn int(value: i32) -> Option<ReturnedValue> {
    Some(ReturnedValue::Primitive(Primitive::Int(value)))
}

#[test]
fn computes_a_recursive_factorial() -> anyhow::Result<()> {
    let mut pool = ConstantPool::new();
    let fact = pool.method("Main", "fact", "(I)I");
    // if (n <= 1) return 1; return n * fact(n - 1);
    let code = bytecode![
        ILOAD_0,
        ICONST_1,
        IF_ICMPGT,
        branch(5),
        ICONST_1,
        IRETURN,
        ILOAD_0,
        ILOAD_0,
        ICONST_1,
        ISUB,
        INVOKESTATIC,
        index(fact),
        IMUL,
        IRETURN
    ];
    let class = ClassBuilder::new("Main")
        .pool(pool)
        .method(
            MethodBuilder::new("fact", "(I)I")
                .static_method()
                .code(code)
                .max_stack(3)
                .max_locals(1),
        )
        .build()?;
    let library = common::library(vec![class])?;

    let mut vm = common::new_vm(&library, ExecutionMode::Concrete);
    let outcome = vm.run(&EntryPoint::new("Main", "fact", "(I)I").with_argument(10.into()));
    assert_eq!(outcome.returned_value().cloned(), int(3_628_800));

    Ok(())
}

#[test]
fn dispatches_virtual_calls_to_the_override() -> anyhow::Result<()> {
    let shape = ClassBuilder::new("Shape")
        .method(
            MethodBuilder::new("area", "()I")
                .code(bytecode![ICONST_0, IRETURN])
                .max_stack(1)
                .max_locals(1),
        )
        .build()?;

    let mut pool = ConstantPool::new();
    let object_init = pool.method("java/lang/Object", "<init>", "()V");
    let side = pool.field("Square", "side", "I");
    let square = ClassBuilder::new("Square")
        .superclass(Some("Shape"))
        .pool(pool)
        .field(Field::instance("side", "I")?)
        .method(
            MethodBuilder::new("<init>", "()V")
                .code(bytecode![ALOAD_0, INVOKESPECIAL, index(object_init), RETURN])
                .max_stack(1)
                .max_locals(1),
        )
        .method(
            MethodBuilder::new("area", "()I")
                .code(bytecode![ALOAD_0, GETFIELD, index(side), ALOAD_0, GETFIELD, index(side), IMUL, IRETURN])
                .max_stack(2)
                .max_locals(1),
        )
        .build()?;

    let mut pool = ConstantPool::new();
    let square_class = pool.class("Square");
    let square_init = pool.method("Square", "<init>", "()V");
    let side = pool.field("Square", "side", "I");
    let area = pool.method("Shape", "area", "()I");
    // Shape shape = new Square(); shape.side = 7; return shape.area();
    let code = bytecode![
        NEW,
        index(square_class),
        DUP,
        INVOKESPECIAL,
        index(square_init),
        ASTORE_0,
        ALOAD_0,
        BIPUSH,
        [7],
        PUTFIELD,
        index(side),
        ALOAD_0,
        INVOKEVIRTUAL,
        index(area),
        IRETURN
    ];
    let main = ClassBuilder::new("Main")
        .pool(pool)
        .method(
            MethodBuilder::new("run", "()I")
                .static_method()
                .code(code)
                .max_stack(2)
                .max_locals(1),
        )
        .build()?;
    let library = common::library(vec![shape, square, main])?;

    let mut vm = common::new_vm(&library, ExecutionMode::Concrete);
    assert_eq!(vm.run(&common::run_entry("()I")).returned_value().cloned(), int(49));

    Ok(())
}

#[test]
fn runs_static_initialisers_on_first_access() -> anyhow::Result<()> {
    let mut pool = ConstantPool::new();
    let start = pool.field("Counter", "start", "I");
    let counter = ClassBuilder::new("Counter")
        .pool(pool)
        .field(Field::static_field("start", "I")?)
        .method(
            MethodBuilder::new("<clinit>", "()V")
                .static_method()
                .code(bytecode![BIPUSH, [40], PUTSTATIC, index(start), RETURN])
                .max_stack(1),
        )
        .build()?;

    let mut pool = ConstantPool::new();
    let start = pool.field("Counter", "start", "I");
    let code = bytecode![
        GETSTATIC,
        index(start),
        ICONST_2,
        IADD,
        DUP,
        PUTSTATIC,
        index(start),
        IRETURN
    ];
    let main = ClassBuilder::new("Main")
        .pool(pool)
        .method(
            MethodBuilder::new("run", "()I")
                .static_method()
                .code(code)
                .max_stack(2),
        )
        .build()?;
    let library = common::library(vec![counter, main])?;

    let mut vm = common::new_vm(&library, ExecutionMode::Concrete);
    assert_eq!(vm.run(&common::run_entry("()I")).returned_value().cloned(), int(42));

    Ok(())
}

#[test]
fn catches_exceptions_thrown_by_a_callee() -> anyhow::Result<()> {
    let mut pool = ConstantPool::new();
    let exception = pool.class("java/lang/IllegalArgumentException");
    let exception_init = pool.method("java/lang/IllegalArgumentException", "<init>", "(Ljava/lang/String;)V");
    let message = u8::try_from(pool.string("bad input"))?;
    let fail = pool.method("Main", "fail", "()V");
    let get_message = pool.method("java/lang/Throwable", "getMessage", "()Ljava/lang/String;");

    // throw new IllegalArgumentException("bad input");
    let fail_code = bytecode![
        NEW,
        index(exception),
        DUP,
        LDC,
        [message],
        INVOKESPECIAL,
        index(exception_init),
        ATHROW
    ];
    // try { fail(); return null; } catch (RuntimeException e) { return e.getMessage(); }
    let run_code = bytecode![INVOKESTATIC, index(fail), ACONST_NULL, ARETURN, INVOKEVIRTUAL, index(get_message), ARETURN];

    let main = ClassBuilder::new("Main")
        .pool(pool)
        .method(
            MethodBuilder::new("fail", "()V")
                .static_method()
                .code(fail_code)
                .max_stack(3),
        )
        .method(
            MethodBuilder::new("run", "()Ljava/lang/String;")
                .static_method()
                .code(run_code)
                .max_stack(1)
                .handler(0, 3, 5, Some("java/lang/RuntimeException")),
        )
        .build()?;
    let library = common::library(vec![main])?;

    let mut vm = common::new_vm(&library, ExecutionMode::Concrete);
    let outcome = vm.run(&common::run_entry("()Ljava/lang/String;"));
    assert_eq!(
        outcome.returned_value(),
        Some(&ReturnedValue::Str("bad input".to_string()))
    );

    Ok(())
}

#[test]
fn reports_uncaught_engine_exceptions_with_their_message() -> anyhow::Result<()> {
    // int[] a = new int[2]; return a[5];
    let code = bytecode![ICONST_2, NEWARRAY, [10], ICONST_5, IALOAD, IRETURN];
    let library = common::single_method("()I", code)?;

    let mut vm = common::new_vm(&library, ExecutionMode::Concrete);
    match vm.run(&common::run_entry("()I")) {
        Outcome::UncaughtException { class, message } => {
            assert_eq!(class, "java/lang/ArrayIndexOutOfBoundsException");
            assert_eq!(message.as_deref(), Some("Index 5 out of bounds for length 2"));
        }
        other => anyhow::bail!("Unexpected outcome {other}"),
    }

    Ok(())
}

#[test]
fn runs_code_given_as_hex() -> anyhow::Result<()> {
    // iload_0, iload_1, iadd, ireturn
    let code = common::get_bytecode_from_string("0x1a1b60ac")?;
    let library = common::single_method("(II)I", code)?;

    let mut vm = common::new_vm(&library, ExecutionMode::Concrete);
    let entry = common::run_entry("(II)I").with_arguments(vec![40.into(), 2.into()]);
    assert_eq!(vm.run(&entry).returned_value().cloned(), int(42));

    Ok(())
}

#[test]
fn forwards_native_methods_to_the_host() -> anyhow::Result<()> {
    let mut pool = ConstantPool::new();
    let abs = pool.method("java/lang/Math", "abs", "(I)I");
    let main = ClassBuilder::new("Main")
        .pool(pool)
        .method(
            MethodBuilder::new("run", "()I")
                .static_method()
                .code(bytecode![BIPUSH, [0xf7], INVOKESTATIC, index(abs), IRETURN])
                .max_stack(1),
        )
        .build()?;
    let library = common::library(vec![main])?;

    let mut vm = common::new_vm(&library, ExecutionMode::Concrete);
    assert_eq!(vm.run(&common::run_entry("()I")).returned_value().cloned(), int(9));

    Ok(())
}

#[test]
fn unbounded_recursion_overflows_the_call_stack() -> anyhow::Result<()> {
    let mut pool = ConstantPool::new();
    let run = pool.method("Main", "run", "()V");
    let main = ClassBuilder::new("Main")
        .pool(pool)
        .method(
            MethodBuilder::new("run", "()V")
                .static_method()
                .code(bytecode![INVOKESTATIC, index(run), RETURN]),
        )
        .build()?;
    let library = common::library(vec![main])?;

    let config = Config::default().with_max_call_depth(64);
    let mut vm = VirtualMachine::new(library, config);
    let outcome = vm.run(&common::run_entry("()V"));
    let error = outcome.error().ok_or_else(|| anyhow::anyhow!("Expected an error but got {outcome}"))?;
    assert_eq!(
        error.payload.to_string(),
        "Call depth exceeded the maximum of 64 frames"
    );

    Ok(())
}

#[test]
fn the_watchdog_stops_an_endless_loop() -> anyhow::Result<()> {
    let library = common::single_method("()V", bytecode![GOTO, branch(0)])?;
    let stop = Arc::new(AtomicBool::new(true));

    let mut vm = common::new_vm(&library, ExecutionMode::Concrete)
        .with_watchdog(FlagWatchdog::new(stop).polling_every(1).in_arc());
    match vm.run(&common::run_entry("()V")) {
        Outcome::Aborted(reason) => assert_eq!(reason, AbortReason::Watchdog),
        other => anyhow::bail!("Unexpected outcome {other}"),
    }

    Ok(())
}
