//! This module contains method invocation and return, class initialisation,
//! and the nested runs of the main loop that class initialisers execute in.

use std::sync::Arc;

use tracing::debug;

use crate::{
    class::{Method, MethodDescriptor},
    constant::{
        ABSTRACT_METHOD_ERROR,
        CLASS_INITIALIZER,
        EXCEPTION_IN_INITIALIZER_ERROR,
        JAVA_LANG_OBJECT,
        NULL_POINTER_EXCEPTION,
        UNSATISFIED_LINK_ERROR,
    },
    disassembly::{Decoded, Operands},
    error::execution::{Error, Result},
    native::Forwarding,
    opcode::InvokeKind,
    search::trail::TrailEntry,
    vm::{
        fault::{Fault, Flow},
        state::{
            frame::{Frame, Monitor},
            heap::HeapObject,
            FrameId,
            StackElement,
        },
        value::Value,
        ExecutionMode,
        Termination,
        VirtualMachine,
    },
};

impl VirtualMachine {
    /// Invokes the method referenced by the invocation instruction `decoded`.
    ///
    /// The arguments are checked against the operand stack before anything is
    /// popped, so a malformed invocation fails without touching the stack.
    /// Methods with code get a new frame that the main loop switches to;
    /// native methods are forwarded to the host and complete in place.
    pub(crate) fn invoke(&mut self, decoded: &Decoded, kind: InvokeKind) -> Flow {
        let index = match decoded.operands {
            Operands::Constant(index) | Operands::Interface { index, .. } => index,
            _ => {
                return Err(Error::MalformedInstruction {
                    mnemonic: decoded.mnemonic().to_string(),
                    reason:   "missing method reference".to_string(),
                }
                .into())
            }
        };
        let caller = self.current_frame_id()?;
        let reference = self.state.frame(caller)?.method().constant_pool().method_ref(index)?.clone();
        let descriptor: MethodDescriptor = reference.descriptor.parse()?;

        let has_receiver = kind != InvokeKind::Static;
        let required = descriptor.parameters().len() + usize::from(has_receiver);
        let available = self.frame()?.stack().size();
        if available < required {
            return Err(Error::InsufficientArguments {
                method: format!("{}.{}{}", reference.class, reference.name, reference.descriptor),
                required,
                available,
            }
            .into());
        }

        if kind == InvokeKind::Static {
            self.ensure_initialized(&reference.class)?;
        }

        let mut arguments = self.pop_many(required)?;
        let receiver = if has_receiver {
            Some(arguments.remove(0))
        } else {
            None
        };

        let method = match (&receiver, kind) {
            (Some(Value::Null), _) => return Err(Fault::raise(NULL_POINTER_EXCEPTION, None)),
            (Some(Value::Reference(object)), InvokeKind::Virtual | InvokeKind::Interface) => {
                let runtime_class = match self.state.heap().get(*object)? {
                    HeapObject::Array { .. } | HeapObject::Unresolved { .. } => JAVA_LANG_OBJECT.to_string(),
                    other => other.class_name(),
                };
                self.metadata
                    .select_virtual(&runtime_class, &reference.name, &reference.descriptor)?
            }
            (Some(other @ (Value::Primitive(_) | Value::Term(_))), _) => {
                return Err(other.mismatch("reference").into());
            }
            _ => self
                .metadata
                .resolve_method(&reference.class, &reference.name, &reference.descriptor)?,
        };

        if method.is_abstract() {
            return Err(Fault::raise(ABSTRACT_METHOD_ERROR, Some(method.qualified_name().to_string())));
        }
        if method.is_native() {
            return self.invoke_native(&method, receiver, arguments);
        }

        let frames = self
            .call_stack
            .iter()
            .filter(|element| matches!(element, StackElement::Frame(_)))
            .count();
        if frames + 2 > self.config.max_call_depth {
            return Err(Error::StackOverflow {
                limit: self.config.max_call_depth,
            }
            .into());
        }

        let monitor = method.is_synchronized().then(|| match &receiver {
            Some(Value::Reference(object)) => Monitor::Object(*object),
            _ => Monitor::Class(method.class().clone()),
        });
        let mut frame = Frame::new(method, Some(caller), receiver, arguments)?;
        if let Some(monitor) = monitor {
            self.state.enter_monitor(monitor.clone());
            frame.set_monitor(Some(monitor));
        }

        let callee = self.state.push_frame(frame);
        self.call_stack.push(StackElement::Frame(caller));
        self.call_stack.push(StackElement::Frame(callee));
        self.frame_switch = true;
        Ok(())
    }

    fn invoke_native(&mut self, method: &Method, receiver: Option<Value>, arguments: Vec<Value>) -> Flow {
        let arguments: Vec<Value> = receiver.into_iter().chain(arguments).collect();
        match self.native.forward(method, &arguments, self.state.heap()) {
            Forwarding::Forwarded(Some(value)) => Ok(self.push(value)?),
            Forwarding::Forwarded(None) => Ok(()),
            Forwarding::Unsuccessful => Err(Fault::raise(
                UNSATISFIED_LINK_ERROR,
                Some(method.qualified_name().to_string()),
            )),
        }
    }

    /// Leaves the current method, handing `value` to the invoker through the
    /// call stack.
    pub(crate) fn return_from_method(&mut self, value: Option<Value>) -> Flow {
        let id = self.current_frame_id()?;
        self.leave_frame(id)?;
        if let Some(value) = value {
            self.call_stack.push(StackElement::ReturnValue(value));
        }
        self.frame_switch = true;
        Ok(())
    }

    /// Initialises the class `name` on the current path if that has not
    /// happened yet: its superclass first, then its static fields, then its
    /// `<clinit>` in a nested concrete run.
    pub(crate) fn ensure_initialized(&mut self, name: &str) -> Flow {
        if self.state.is_initialized(name) {
            return Ok(());
        }
        let class = self.metadata.resolve_class(name)?;
        if let Some(superclass) = class.superclass() {
            self.ensure_initialized(superclass)?;
        }

        if !self.state.mark_initialized(class.name().clone()) {
            return Ok(());
        }
        self.search.record(TrailEntry::ClassInitialized {
            class: class.name().clone(),
        });
        debug!(class = %class.name(), "initialising class");

        for field in class.fields().iter().filter(|f| f.is_static()) {
            let value = field
                .constant_value
                .map_or_else(|| field.descriptor.default_value(), Value::Primitive);
            self.write_static(class.name().clone(), field.name.clone(), value);
        }

        let Some(initializer) = class.declared_method(CLASS_INITIALIZER, "()V").cloned() else {
            return Ok(());
        };
        match self.run_nested(initializer, None, vec![])? {
            Termination::Returned(_) => Ok(()),
            Termination::Uncaught(exception) => {
                let (cause, message) = self.describe_exception(exception);
                debug!(class = %name, %cause, "class initialiser failed");
                let description = match message {
                    Some(message) => format!("{cause}: {message}"),
                    None => cause,
                };
                Err(Fault::raise(EXCEPTION_IN_INITIALIZER_ERROR, Some(description)))
            }
        }
    }

    /// Runs `method` to completion in a nested concrete run of the main loop
    /// on top of the current call stack, then puts the interrupted run back
    /// the way it was.
    pub(crate) fn run_nested(
        &mut self,
        method: Arc<Method>,
        receiver: Option<Value>,
        arguments: Vec<Value>,
    ) -> std::result::Result<Termination, Fault> {
        let saved_mode = self.mode;
        let saved_current = self.current;
        let saved_preloaded = self.preloaded.take();
        let saved_switch = self.frame_switch;

        self.mode = ExecutionMode::Concrete;
        let base = self.call_stack.len();
        let result = match self.push_nested_frame(method, saved_current, receiver, arguments) {
            Ok(()) => self.run_main_loop(base),
            Err(error) => Err(error.into()),
        };

        self.mode = saved_mode;
        self.current = saved_current;
        self.preloaded = saved_preloaded;
        self.frame_switch = saved_switch;
        result
    }

    fn push_nested_frame(
        &mut self,
        method: Arc<Method>,
        invoker: Option<FrameId>,
        receiver: Option<Value>,
        arguments: Vec<Value>,
    ) -> Result<()> {
        if method.is_abstract() || method.is_native() {
            return Err(Error::MissingCode {
                method: method.qualified_name().to_string(),
            });
        }
        let frame = Frame::new(method, invoker, receiver, arguments)?;
        let id = self.state.push_frame(frame);
        self.call_stack.push(StackElement::Frame(id));
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::{
        bytecode,
        class::{ClassBuilder, ClassLibrary, ConstantPool, Field, MethodBuilder},
        error::{self, execution::Error},
        constant::{ARITHMETIC_EXCEPTION, EXCEPTION_IN_INITIALIZER_ERROR},
        opcode::code::{
            index,
            BIPUSH,
            GETSTATIC,
            ICONST_0,
            ICONST_1,
            ICONST_5,
            IDIV,
            IADD,
            ILOAD_0,
            INVOKESTATIC,
            IRETURN,
            POP,
            PUTSTATIC,
            RETURN,
        },
        vm::{entry::EntryPoint, value::Primitive, Config, Outcome, ReturnedValue, VirtualMachine},
    };

    #[test]
    fn class_initialisers_run_before_static_access() -> anyhow::Result<()> {
        let mut pool = ConstantPool::new();
        let counter = pool.field("Main", "counter", "I");
        let class = ClassBuilder::new("Main")
            .field(Field::static_field("counter", "I")?)
            .method(
                MethodBuilder::new("<clinit>", "()V")
                    .static_method()
                    .code(bytecode![ICONST_5, PUTSTATIC, index(counter), RETURN])
                    .max_stack(1),
            )
            .method(
                MethodBuilder::new("read", "()I")
                    .static_method()
                    .code(bytecode![GETSTATIC, index(counter), IRETURN])
                    .max_stack(1),
            )
            .pool(pool)
            .build()?;
        let library = ClassLibrary::with_core_classes()?.with(class);

        let mut vm = VirtualMachine::new(Arc::new(library), Config::default());
        let outcome = vm.run(&EntryPoint::new("Main", "read", "()I"));
        assert_eq!(outcome.returned_value(), Some(&ReturnedValue::Primitive(Primitive::Int(5))));

        Ok(())
    }

    /// `Broken.<clinit>` divides by zero. `Main.run` reads `Broken.value`,
    /// returning 7 if `handled` and the read raises.
    fn failing_initialiser(handled: bool) -> anyhow::Result<ClassLibrary> {
        let mut pool = ConstantPool::new();
        let value = pool.field("Broken", "value", "I");
        let broken = ClassBuilder::new("Broken")
            .field(Field::static_field("value", "I")?)
            .method(
                MethodBuilder::new("<clinit>", "()V")
                    .static_method()
                    .code(bytecode![ICONST_1, ICONST_0, IDIV, PUTSTATIC, index(value), RETURN])
                    .max_stack(2),
            )
            .pool(pool)
            .build()?;

        let mut pool = ConstantPool::new();
        let value = pool.field("Broken", "value", "I");
        // 0: getstatic, 3: ireturn, 4: pop, 5: bipush 7, 7: ireturn
        let mut run = MethodBuilder::new("run", "()I")
            .static_method()
            .code(bytecode![GETSTATIC, index(value), IRETURN, POP, BIPUSH, [7], IRETURN])
            .max_stack(1);
        if handled {
            run = run.handler(0, 3, 4, Some(EXCEPTION_IN_INITIALIZER_ERROR));
        }
        let main = ClassBuilder::new("Main").pool(pool).method(run).build()?;

        Ok(ClassLibrary::with_core_classes()?.with(broken).with(main))
    }

    #[test]
    fn failing_initialisers_raise_a_catchable_error() -> anyhow::Result<()> {
        let entry = EntryPoint::new("Main", "run", "()I");

        let mut vm = VirtualMachine::new(Arc::new(failing_initialiser(true)?), Config::default());
        let outcome = vm.run(&entry);
        assert_eq!(outcome.returned_value(), Some(&ReturnedValue::Primitive(Primitive::Int(7))));

        let mut vm = VirtualMachine::new(Arc::new(failing_initialiser(false)?), Config::default());
        match vm.run(&entry) {
            Outcome::UncaughtException { class, message } => {
                assert_eq!(class, EXCEPTION_IN_INITIALIZER_ERROR);
                assert_eq!(message, Some(format!("{ARITHMETIC_EXCEPTION}: / by zero")));
            }
            other => anyhow::bail!("Expected an uncaught exception, got {other}"),
        }

        Ok(())
    }

    #[test]
    fn deep_recursion_overflows_the_call_stack() -> anyhow::Result<()> {
        let mut pool = ConstantPool::new();
        let recurse = pool.method("Main", "recurse", "(I)I");
        let class = ClassBuilder::new("Main")
            .method(
                MethodBuilder::new("recurse", "(I)I")
                    .static_method()
                    .code(bytecode![ILOAD_0, ICONST_1, IADD, INVOKESTATIC, index(recurse), IRETURN])
                    .max_stack(2)
                    .max_locals(1),
            )
            .pool(pool)
            .build()?;
        let library = ClassLibrary::with_core_classes()?.with(class);

        let config = Config::default().with_max_call_depth(16);
        let mut vm = VirtualMachine::new(Arc::new(library), config);
        let outcome = vm.run(&EntryPoint::new("Main", "recurse", "(I)I").with_argument(0.into()));
        let Outcome::Error(error) = outcome else {
            anyhow::bail!("Expected a fatal error, got {outcome}");
        };
        assert!(matches!(
            error.payload,
            error::Error::Execution(Error::StackOverflow { limit: 16 })
        ));

        Ok(())
    }

    #[test]
    fn missing_arguments_fail_before_a_frame_is_pushed() -> anyhow::Result<()> {
        let mut pool = ConstantPool::new();
        let add = pool.method("Main", "add", "(II)I");
        let class = ClassBuilder::new("Main")
            .method(
                MethodBuilder::new("add", "(II)I")
                    .static_method()
                    .code(bytecode![ILOAD_0, IRETURN])
                    .max_stack(1)
                    .max_locals(2),
            )
            .method(
                MethodBuilder::new("run", "()I")
                    .static_method()
                    .code(bytecode![ICONST_1, INVOKESTATIC, index(add), IRETURN])
                    .max_stack(2),
            )
            .pool(pool)
            .build()?;
        let library = ClassLibrary::with_core_classes()?.with(class);

        let mut vm = VirtualMachine::new(Arc::new(library), Config::default());
        let outcome = vm.run(&EntryPoint::new("Main", "run", "()I"));
        let Outcome::Error(error) = outcome else {
            anyhow::bail!("Expected a fatal error, got {outcome}");
        };
        let error::Error::Execution(payload) = error.payload else {
            anyhow::bail!("Expected an execution error");
        };
        assert_eq!(
            payload,
            Error::InsufficientArguments {
                method:    "Main.add(II)I".to_string(),
                required:  2,
                available: 1,
            }
        );
        assert_eq!(error.location.pc, 1);
        assert!(vm.state().frames().all(|frame| frame.method().name() != "add"));

        Ok(())
    }
}
