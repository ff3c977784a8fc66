//! This module contains the core classes that every program executed by the
//! virtual machine relies on: the root of the class hierarchy, strings, the
//! exceptions that instructions raise, and the holders of the native methods
//! understood by [`crate::native::StandardForwarder`].

use crate::{
    bytecode,
    class::{AccessFlags, Class, ClassBuilder, ConstantPool, Field, MethodBuilder},
    constant::{
        ABSTRACT_METHOD_ERROR,
        ARITHMETIC_EXCEPTION,
        ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION,
        ARRAY_STORE_EXCEPTION,
        CLASS_CAST_EXCEPTION,
        CONSTRUCTOR,
        EXCEPTION_IN_INITIALIZER_ERROR,
        ILLEGAL_MONITOR_STATE_EXCEPTION,
        INCOMPATIBLE_CLASS_CHANGE_ERROR,
        INSTANTIATION_ERROR,
        JAVA_LANG_CLASS,
        JAVA_LANG_OBJECT,
        JAVA_LANG_STRING,
        JAVA_LANG_THROWABLE,
        NEGATIVE_ARRAY_SIZE_EXCEPTION,
        NULL_POINTER_EXCEPTION,
        THROWABLE_MESSAGE_FIELD,
        UNSATISFIED_LINK_ERROR,
    },
    error::{self, container::Locatable},
    opcode::code::{
        branch,
        index,
        ALOAD_0,
        ALOAD_1,
        ARETURN,
        GETFIELD,
        ICONST_0,
        ICONST_1,
        IF_ACMPNE,
        INVOKESPECIAL,
        IRETURN,
        PUTFIELD,
        RETURN,
    },
};

/// The throwable classes below [`JAVA_LANG_THROWABLE`], each with its
/// superclass, in an order where superclasses come first.
const THROWABLES: &[(&str, &str)] = &[
    ("java/lang/Exception", JAVA_LANG_THROWABLE),
    ("java/lang/Error", JAVA_LANG_THROWABLE),
    ("java/lang/RuntimeException", "java/lang/Exception"),
    (ARITHMETIC_EXCEPTION, "java/lang/RuntimeException"),
    (NULL_POINTER_EXCEPTION, "java/lang/RuntimeException"),
    ("java/lang/IndexOutOfBoundsException", "java/lang/RuntimeException"),
    (ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION, "java/lang/IndexOutOfBoundsException"),
    (NEGATIVE_ARRAY_SIZE_EXCEPTION, "java/lang/RuntimeException"),
    (CLASS_CAST_EXCEPTION, "java/lang/RuntimeException"),
    (ARRAY_STORE_EXCEPTION, "java/lang/RuntimeException"),
    (ILLEGAL_MONITOR_STATE_EXCEPTION, "java/lang/RuntimeException"),
    ("java/lang/IllegalArgumentException", "java/lang/RuntimeException"),
    ("java/lang/LinkageError", "java/lang/Error"),
    (UNSATISFIED_LINK_ERROR, "java/lang/LinkageError"),
    (EXCEPTION_IN_INITIALIZER_ERROR, "java/lang/LinkageError"),
    (INCOMPATIBLE_CLASS_CHANGE_ERROR, "java/lang/LinkageError"),
    (ABSTRACT_METHOD_ERROR, INCOMPATIBLE_CLASS_CHANGE_ERROR),
    (INSTANTIATION_ERROR, INCOMPATIBLE_CLASS_CHANGE_ERROR),
];

/// Builds all of the core classes.
///
/// # Errors
///
/// Returns [`Err`] if any of the classes fails to build.
pub fn classes() -> error::Result<Vec<Class>> {
    let mut classes = vec![object()?, string()?, class_mirror()?, throwable()?];
    for (name, superclass) in THROWABLES {
        classes.push(throwable_subclass(name, superclass)?);
    }
    classes.push(natives("java/lang/Math", &[
        ("abs", "(I)I"),
        ("abs", "(J)J"),
        ("abs", "(F)F"),
        ("abs", "(D)D"),
        ("min", "(II)I"),
        ("min", "(JJ)J"),
        ("max", "(II)I"),
        ("max", "(JJ)J"),
        ("sqrt", "(D)D"),
    ])?);
    classes.push(natives("java/lang/Float", &[
        ("floatToRawIntBits", "(F)I"),
        ("intBitsToFloat", "(I)F"),
    ])?);
    classes.push(natives("java/lang/Double", &[
        ("doubleToRawLongBits", "(D)J"),
        ("longBitsToDouble", "(J)D"),
    ])?);
    classes.push(natives("java/lang/System", &[(
        "identityHashCode",
        "(Ljava/lang/Object;)I",
    )])?);
    Ok(classes)
}

fn object() -> error::Result<Class> {
    ClassBuilder::new(JAVA_LANG_OBJECT)
        .superclass(None)
        .method(MethodBuilder::new(CONSTRUCTOR, "()V").code(bytecode![RETURN]).max_locals(1))
        .method(MethodBuilder::new("hashCode", "()I").flag(AccessFlags::NATIVE))
        .method(
            MethodBuilder::new("equals", "(Ljava/lang/Object;)Z")
                .code(bytecode![
                    ALOAD_0,
                    ALOAD_1,
                    IF_ACMPNE,
                    branch(5),
                    ICONST_1,
                    IRETURN,
                    ICONST_0,
                    IRETURN
                ])
                .max_stack(2)
                .max_locals(2),
        )
        .build()
}

fn string() -> error::Result<Class> {
    ClassBuilder::new(JAVA_LANG_STRING)
        .flag(AccessFlags::FINAL)
        .method(MethodBuilder::new("length", "()I").flag(AccessFlags::NATIVE))
        .method(MethodBuilder::new("charAt", "(I)C").flag(AccessFlags::NATIVE))
        .build()
}

fn class_mirror() -> error::Result<Class> {
    ClassBuilder::new(JAVA_LANG_CLASS)
        .flag(AccessFlags::FINAL)
        .build()
}

fn throwable() -> error::Result<Class> {
    let mut pool = ConstantPool::new();
    let object_init = pool.method(JAVA_LANG_OBJECT, CONSTRUCTOR, "()V");
    let message = pool.field(JAVA_LANG_THROWABLE, THROWABLE_MESSAGE_FIELD, "Ljava/lang/String;");

    ClassBuilder::new(JAVA_LANG_THROWABLE)
        .pool(pool)
        .field(Field::instance(THROWABLE_MESSAGE_FIELD, "Ljava/lang/String;").locate(0)?)
        .method(
            MethodBuilder::new(CONSTRUCTOR, "()V")
                .code(bytecode![ALOAD_0, INVOKESPECIAL, index(object_init), RETURN])
                .max_stack(1)
                .max_locals(1),
        )
        .method(
            MethodBuilder::new(CONSTRUCTOR, "(Ljava/lang/String;)V")
                .code(bytecode![
                    ALOAD_0,
                    INVOKESPECIAL,
                    index(object_init),
                    ALOAD_0,
                    ALOAD_1,
                    PUTFIELD,
                    index(message),
                    RETURN
                ])
                .max_stack(2)
                .max_locals(2),
        )
        .method(
            MethodBuilder::new("getMessage", "()Ljava/lang/String;")
                .code(bytecode![ALOAD_0, GETFIELD, index(message), ARETURN])
                .max_stack(1)
                .max_locals(1),
        )
        .build()
}

/// Builds a throwable class whose constructors delegate to those of
/// `superclass`.
fn throwable_subclass(name: &str, superclass: &str) -> error::Result<Class> {
    let mut pool = ConstantPool::new();
    let plain = pool.method(superclass, CONSTRUCTOR, "()V");
    let with_message = pool.method(superclass, CONSTRUCTOR, "(Ljava/lang/String;)V");

    ClassBuilder::new(name)
        .superclass(Some(superclass))
        .pool(pool)
        .method(
            MethodBuilder::new(CONSTRUCTOR, "()V")
                .code(bytecode![ALOAD_0, INVOKESPECIAL, index(plain), RETURN])
                .max_stack(1)
                .max_locals(1),
        )
        .method(
            MethodBuilder::new(CONSTRUCTOR, "(Ljava/lang/String;)V")
                .code(bytecode![ALOAD_0, ALOAD_1, INVOKESPECIAL, index(with_message), RETURN])
                .max_stack(2)
                .max_locals(2),
        )
        .build()
}

/// Builds a final class holding only static native methods.
fn natives(name: &str, methods: &[(&str, &str)]) -> error::Result<Class> {
    methods
        .iter()
        .fold(ClassBuilder::new(name).flag(AccessFlags::FINAL), |class, (method, descriptor)| {
            class.method(
                MethodBuilder::new(method, descriptor)
                    .static_method()
                    .flag(AccessFlags::NATIVE),
            )
        })
        .build()
}
