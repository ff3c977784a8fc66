//! This module contains the interface through which the virtual machine
//! executes native methods, which have no bytecode of their own.

use std::fmt::Debug;

use crate::{
    class::Method,
    constant::{JAVA_LANG_OBJECT, JAVA_LANG_STRING},
    vm::{
        state::heap::Heap,
        value::{Primitive, Value},
    },
};

/// The result of forwarding a native method call to the host.
#[derive(Clone, Debug, PartialEq)]
pub enum Forwarding {
    /// The host executed the method, which returned the given value (or
    /// nothing, for `void` methods).
    Forwarded(Option<Value>),

    /// The host does not know how to execute the method with these arguments.
    Unsuccessful,
}

/// The interface to the host's implementation of native methods.
///
/// Forwarders see the arguments as they are, including symbolic terms in
/// symbolic mode; a forwarder that cannot deal with a term should answer
/// [`Forwarding::Unsuccessful`].
pub trait NativeForwarder
where
    Self: Debug + Send + Sync,
{
    /// Executes `method` on `arguments`, the receiver first for instance
    /// methods.
    fn forward(&self, method: &Method, arguments: &[Value], heap: &Heap) -> Forwarding;
}

/// A forwarder that implements no native methods at all.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct NoNatives;

impl NativeForwarder for NoNatives {
    fn forward(&self, _: &Method, _: &[Value], _: &Heap) -> Forwarding {
        Forwarding::Unsuccessful
    }
}

/// A forwarder for the native methods of the core classes: common `Math`
/// functions, the bit conversions of `Float` and `Double`, identity hash codes,
/// and the length and characters of strings.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StandardForwarder;

impl StandardForwarder {
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn identity_hash(value: &Value) -> Option<Value> {
        match value {
            Value::Null => Some(Value::int(0)),
            Value::Reference(r) => Some(Value::int(r.index() as i32)),
            _ => None,
        }
    }

    fn math(name: &str, arguments: &[Primitive]) -> Option<Primitive> {
        use Primitive::{Double, Float, Int, Long};
        let result = match (name, arguments) {
            ("abs", [Int(v)]) => Int(v.wrapping_abs()),
            ("abs", [Long(v)]) => Long(v.wrapping_abs()),
            ("abs", [Float(v)]) => Float(v.abs()),
            ("abs", [Double(v)]) => Double(v.abs()),
            ("min", [Int(l), Int(r)]) => Int(*l.min(r)),
            ("min", [Long(l), Long(r)]) => Long(*l.min(r)),
            ("max", [Int(l), Int(r)]) => Int(*l.max(r)),
            ("max", [Long(l), Long(r)]) => Long(*l.max(r)),
            ("sqrt", [Double(v)]) => Double(v.sqrt()),
            _ => return None,
        };
        Some(result)
    }

    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    fn bits(name: &str, arguments: &[Primitive]) -> Option<Primitive> {
        let result = match (name, arguments) {
            ("floatToRawIntBits", [Primitive::Float(v)]) => Primitive::Int(v.to_bits() as i32),
            ("intBitsToFloat", [Primitive::Int(v)]) => Primitive::Float(f32::from_bits(*v as u32)),
            ("doubleToRawLongBits", [Primitive::Double(v)]) => Primitive::Long(v.to_bits() as i64),
            ("longBitsToDouble", [Primitive::Long(v)]) => {
                Primitive::Double(f64::from_bits(*v as u64))
            }
            _ => return None,
        };
        Some(result)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn string(name: &str, arguments: &[Value], heap: &Heap) -> Option<Value> {
        let Some(Value::Reference(receiver)) = arguments.first() else {
            return None;
        };
        let text = heap.string(*receiver)?;
        let units: Vec<u16> = text.encode_utf16().collect();
        match (name, &arguments[1..]) {
            ("length", []) => Some(Value::int(units.len() as i32)),
            ("charAt", [index]) => {
                let index = usize::try_from(index.as_primitive()?.as_int()?).ok()?;
                units.get(index).map(|unit| Value::int(i32::from(*unit)))
            }
            _ => None,
        }
    }
}

impl NativeForwarder for StandardForwarder {
    fn forward(&self, method: &Method, arguments: &[Value], heap: &Heap) -> Forwarding {
        let name = method.name();
        let result = match method.class().as_ref() {
            "java/lang/Math" | "java/lang/Float" | "java/lang/Double" => {
                let Some(primitives) = arguments.iter().map(Value::as_primitive).collect::<Option<Vec<_>>>()
                else {
                    return Forwarding::Unsuccessful;
                };
                Self::math(name, &primitives)
                    .or_else(|| Self::bits(name, &primitives))
                    .map(Value::Primitive)
            }
            "java/lang/System" if name == "identityHashCode" => {
                arguments.first().and_then(Self::identity_hash)
            }
            JAVA_LANG_OBJECT if name == "hashCode" => arguments.first().and_then(Self::identity_hash),
            JAVA_LANG_STRING => Self::string(name, arguments, heap),
            _ => None,
        };

        match result {
            Some(value) => Forwarding::Forwarded(Some(value)),
            None => Forwarding::Unsuccessful,
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::{
        class::{ClassLibrary, MetadataProvider},
        native::{Forwarding, NativeForwarder, NoNatives, StandardForwarder},
        vm::{
            state::heap::{Heap, HeapObject},
            value::{Kind, Term, Value, Variable},
        },
    };

    #[test]
    fn forwards_math_on_concrete_arguments() -> anyhow::Result<()> {
        let library = ClassLibrary::with_core_classes()?;
        let max = library.resolve_method("java/lang/Math", "max", "(II)I")?;
        let result = StandardForwarder.forward(&max, &[Value::int(3), Value::int(8)], &Heap::new(1));
        assert_eq!(result, Forwarding::Forwarded(Some(Value::int(8))));

        Ok(())
    }

    #[test]
    fn refuses_symbolic_arguments() -> anyhow::Result<()> {
        let library = ClassLibrary::with_core_classes()?;
        let abs = library.resolve_method("java/lang/Math", "abs", "(I)I")?;
        let symbolic = Value::Term(Term::variable(Variable::fresh("x", Kind::Int)));
        assert_eq!(StandardForwarder.forward(&abs, &[symbolic], &Heap::new(1)), Forwarding::Unsuccessful);
        assert_eq!(NoNatives.forward(&abs, &[Value::int(1)], &Heap::new(1)), Forwarding::Unsuccessful);

        Ok(())
    }

    #[test]
    fn reads_strings_from_the_heap() -> anyhow::Result<()> {
        let library = ClassLibrary::with_core_classes()?;
        let mut heap = Heap::new(2);
        let text = heap.allocate(HeapObject::Str(Arc::from("héllo")), false)?;

        let length = library.resolve_method("java/lang/String", "length", "()I")?;
        let result = StandardForwarder.forward(&length, &[Value::Reference(text)], &heap);
        assert_eq!(result, Forwarding::Forwarded(Some(Value::int(5))));

        let char_at = library.resolve_method("java/lang/String", "charAt", "(I)C")?;
        let result = StandardForwarder.forward(&char_at, &[Value::Reference(text), Value::int(1)], &heap);
        assert_eq!(result, Forwarding::Forwarded(Some(Value::int(0xe9))));

        Ok(())
    }
}
