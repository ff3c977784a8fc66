//! This module contains the class metadata consumed by the virtual machine,
//! and the [`MetadataProvider`] interface through which it is resolved.
//!
//! Parsing binary class files is not the business of this crate. Hosts either
//! implement [`MetadataProvider`] over their own class loading, or build
//! classes in memory with [`ClassBuilder`] and serve them from a
//! [`ClassLibrary`].

pub mod core;
pub mod descriptor;
pub mod library;
pub mod pool;

use std::{fmt::Debug, sync::Arc};

pub use descriptor::{FieldType, MethodDescriptor};
pub use library::ClassLibrary;
pub use pool::{Constant, ConstantPool, MemberRef};

use crate::{
    constant::JAVA_LANG_OBJECT,
    disassembly::InstructionTable,
    error::{
        self,
        container::{Locatable, Location},
        execution::{Error, Result},
    },
    vm::value::Primitive,
};

/// The access flags of classes, fields and methods.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct AccessFlags(pub u16);

impl AccessFlags {
    pub const ABSTRACT: u16 = 0x0400;
    pub const FINAL: u16 = 0x0010;
    pub const INTERFACE: u16 = 0x0200;
    pub const NATIVE: u16 = 0x0100;
    pub const PUBLIC: u16 = 0x0001;
    pub const STATIC: u16 = 0x0008;
    pub const SYNCHRONIZED: u16 = 0x0020;

    /// Checks if all of the bits in `flag` are set.
    #[must_use]
    pub fn has(self, flag: u16) -> bool {
        self.0 & flag == flag
    }

    /// Gets the flags with the bits in `flag` set.
    #[must_use]
    pub fn with(self, flag: u16) -> Self {
        Self(self.0 | flag)
    }
}

/// One entry of a method's exception table.
///
/// The entry covers the instructions whose byte offsets lie in
/// `start_pc..end_pc`; a `catch_type` of [`None`] catches everything.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ExceptionHandler {
    pub start_pc:   u32,
    pub end_pc:     u32,
    pub handler_pc: u32,
    pub catch_type: Option<Arc<str>>,
}

impl ExceptionHandler {
    /// Checks if the entry covers the instruction at `pc`.
    #[must_use]
    pub fn covers(&self, pc: u32) -> bool {
        (self.start_pc..self.end_pc).contains(&pc)
    }
}

/// A method of a class.
#[derive(Clone, Debug)]
pub struct Method {
    class:           Arc<str>,
    name:            Arc<str>,
    descriptor:      MethodDescriptor,
    access:          AccessFlags,
    max_stack:       u16,
    max_locals:      u16,
    code:            Option<InstructionTable>,
    exception_table: Vec<ExceptionHandler>,
    constant_pool:   Arc<ConstantPool>,
    qualified_name:  Arc<str>,
}

impl Method {
    /// Gets the name of the declaring class.
    #[must_use]
    pub fn class(&self) -> &Arc<str> {
        &self.class
    }

    /// Gets the name of the method.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn access(&self) -> AccessFlags {
        self.access
    }

    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access.has(AccessFlags::STATIC)
    }

    #[must_use]
    pub fn is_native(&self) -> bool {
        self.access.has(AccessFlags::NATIVE)
    }

    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.access.has(AccessFlags::ABSTRACT)
    }

    #[must_use]
    pub fn is_synchronized(&self) -> bool {
        self.access.has(AccessFlags::SYNCHRONIZED)
    }

    /// Gets the maximum depth of the operand stack.
    #[must_use]
    pub fn max_stack(&self) -> usize {
        usize::from(self.max_stack)
    }

    /// Gets the number of local variable slots.
    #[must_use]
    pub fn max_locals(&self) -> usize {
        usize::from(self.max_locals)
    }

    /// Gets the decoded code of the method.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the method is abstract or native.
    pub fn instructions(&self) -> Result<&InstructionTable> {
        self.code.as_ref().ok_or_else(|| Error::MissingCode {
            method: self.qualified_name.to_string(),
        })
    }

    /// Gets the exception table in declaration order.
    #[must_use]
    pub fn exception_table(&self) -> &[ExceptionHandler] {
        &self.exception_table
    }

    /// Gets the constant pool of the declaring class.
    #[must_use]
    pub fn constant_pool(&self) -> &Arc<ConstantPool> {
        &self.constant_pool
    }

    /// Gets the name of the method in the form `Class.name(descriptor)`.
    #[must_use]
    pub fn qualified_name(&self) -> &Arc<str> {
        &self.qualified_name
    }

    /// Finds the first exception table entry, in declaration order, that
    /// covers `pc` and whose catch type is accepted by `catches`.
    pub fn find_handler(
        &self,
        pc: u32,
        mut catches: impl FnMut(&str) -> bool,
    ) -> Option<&ExceptionHandler> {
        self.exception_table.iter().find(|handler| {
            handler.covers(pc) && handler.catch_type.as_deref().map_or(true, &mut catches)
        })
    }
}

/// A field of a class.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name:           Arc<str>,
    pub descriptor:     FieldType,
    pub access:         AccessFlags,
    pub constant_value: Option<Primitive>,
}

impl Field {
    /// Creates an instance field.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `descriptor` is malformed.
    pub fn instance(name: &str, descriptor: &str) -> Result<Self> {
        Ok(Self {
            name:           Arc::from(name),
            descriptor:     descriptor.parse()?,
            access:         AccessFlags::default(),
            constant_value: None,
        })
    }

    /// Creates a static field.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `descriptor` is malformed.
    pub fn static_field(name: &str, descriptor: &str) -> Result<Self> {
        let mut field = Self::instance(name, descriptor)?;
        field.access = field.access.with(AccessFlags::STATIC);
        Ok(field)
    }

    /// Gives the field an initial constant value.
    #[must_use]
    pub fn with_constant(mut self, value: Primitive) -> Self {
        self.constant_value = Some(value);
        self
    }

    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access.has(AccessFlags::STATIC)
    }
}

/// A class or interface.
#[derive(Clone, Debug)]
pub struct Class {
    name:          Arc<str>,
    superclass:    Option<Arc<str>>,
    interfaces:    Vec<Arc<str>>,
    access:        AccessFlags,
    fields:        Vec<Field>,
    methods:       Vec<Arc<Method>>,
    constant_pool: Arc<ConstantPool>,
}

impl Class {
    #[must_use]
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Gets the direct superclass, which is [`None`] only for the root class.
    #[must_use]
    pub fn superclass(&self) -> Option<&Arc<str>> {
        self.superclass.as_ref()
    }

    #[must_use]
    pub fn interfaces(&self) -> &[Arc<str>] {
        &self.interfaces
    }

    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.access.has(AccessFlags::INTERFACE)
    }

    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.access.has(AccessFlags::ABSTRACT)
    }

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[must_use]
    pub fn methods(&self) -> &[Arc<Method>] {
        &self.methods
    }

    #[must_use]
    pub fn constant_pool(&self) -> &Arc<ConstantPool> {
        &self.constant_pool
    }

    /// Gets the method declared by this class with the given `name` and
    /// `descriptor`.
    #[must_use]
    pub fn declared_method(&self, name: &str, descriptor: &str) -> Option<&Arc<Method>> {
        self.methods
            .iter()
            .find(|m| m.name() == name && m.descriptor().as_str() == descriptor)
    }

    /// Gets the field declared by this class with the given `name`.
    #[must_use]
    pub fn declared_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name.as_ref() == name)
    }
}

/// A builder for the methods of a [`ClassBuilder`].
#[derive(Clone, Debug)]
pub struct MethodBuilder {
    name:            String,
    descriptor:      String,
    access:          AccessFlags,
    max_stack:       u16,
    max_locals:      u16,
    code:            Option<Vec<u8>>,
    exception_table: Vec<ExceptionHandler>,
}

impl MethodBuilder {
    /// Starts a public instance method with no code.
    #[must_use]
    pub fn new(name: &str, descriptor: &str) -> Self {
        Self {
            name:            name.to_string(),
            descriptor:      descriptor.to_string(),
            access:          AccessFlags(AccessFlags::PUBLIC),
            max_stack:       0,
            max_locals:      0,
            code:            None,
            exception_table: Vec::new(),
        }
    }

    /// Marks the method as static.
    #[must_use]
    pub fn static_method(mut self) -> Self {
        self.access = self.access.with(AccessFlags::STATIC);
        self
    }

    /// Adds the flags in `flag` to the method.
    #[must_use]
    pub fn flag(mut self, flag: u16) -> Self {
        self.access = self.access.with(flag);
        self
    }

    /// Sets the maximum operand stack depth.
    #[must_use]
    pub fn max_stack(mut self, max_stack: u16) -> Self {
        self.max_stack = max_stack;
        self
    }

    /// Sets the number of local variable slots.
    #[must_use]
    pub fn max_locals(mut self, max_locals: u16) -> Self {
        self.max_locals = max_locals;
        self
    }

    /// Sets the code of the method.
    #[must_use]
    pub fn code(mut self, code: Vec<u8>) -> Self {
        self.code = Some(code);
        self
    }

    /// Appends an exception table entry.
    #[must_use]
    pub fn handler(mut self, start_pc: u32, end_pc: u32, handler_pc: u32, catch_type: Option<&str>) -> Self {
        self.exception_table.push(ExceptionHandler {
            start_pc,
            end_pc,
            handler_pc,
            catch_type: catch_type.map(Arc::from),
        });
        self
    }

    fn build(self, class: &Arc<str>, constant_pool: &Arc<ConstantPool>) -> error::Result<Method> {
        let qualified_name: Arc<str> = Arc::from(format!("{class}.{}{}", self.name, self.descriptor));
        let descriptor = self
            .descriptor
            .parse::<MethodDescriptor>()
            .locate(Location::new(qualified_name.clone(), 0))?;
        let code = match self.code {
            Some(bytes) => Some(InstructionTable::decode(&bytes).map_err(|e| {
                e.payload
                    .locate(Location::new(qualified_name.clone(), e.location.pc))
            })?),
            None => None,
        };
        Ok(Method {
            class: class.clone(),
            name: Arc::from(self.name.as_str()),
            descriptor,
            access: self.access,
            max_stack: self.max_stack,
            max_locals: self.max_locals,
            code,
            exception_table: self.exception_table,
            constant_pool: constant_pool.clone(),
            qualified_name,
        })
    }
}

/// A builder for [`Class`]es held in memory.
#[derive(Clone, Debug)]
pub struct ClassBuilder {
    name:       String,
    superclass: Option<String>,
    interfaces: Vec<String>,
    access:     AccessFlags,
    fields:     Vec<Field>,
    methods:    Vec<MethodBuilder>,
    pool:       ConstantPool,
}

impl ClassBuilder {
    /// Starts a public class extending [`JAVA_LANG_OBJECT`].
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name:       name.to_string(),
            superclass: Some(JAVA_LANG_OBJECT.to_string()),
            interfaces: Vec::new(),
            access:     AccessFlags(AccessFlags::PUBLIC),
            fields:     Vec::new(),
            methods:    Vec::new(),
            pool:       ConstantPool::new(),
        }
    }

    /// Sets the superclass; [`None`] is only valid for the root class.
    #[must_use]
    pub fn superclass(mut self, superclass: Option<&str>) -> Self {
        self.superclass = superclass.map(str::to_string);
        self
    }

    /// Adds a direct superinterface.
    #[must_use]
    pub fn interface(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }

    /// Adds the flags in `flag` to the class.
    #[must_use]
    pub fn flag(mut self, flag: u16) -> Self {
        self.access = self.access.with(flag);
        self
    }

    /// Sets the constant pool of the class.
    #[must_use]
    pub fn pool(mut self, pool: ConstantPool) -> Self {
        self.pool = pool;
        self
    }

    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn method(mut self, method: MethodBuilder) -> Self {
        self.methods.push(method);
        self
    }

    /// Builds the class, decoding the code of every method.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if a descriptor is malformed or any code fails to
    /// decode.
    pub fn build(self) -> error::Result<Class> {
        let name: Arc<str> = Arc::from(self.name.as_str());
        let constant_pool = Arc::new(self.pool);
        let methods = self
            .methods
            .into_iter()
            .map(|m| m.build(&name, &constant_pool).map(Arc::new))
            .collect::<error::Result<Vec<_>>>()?;

        Ok(Class {
            name,
            superclass: self.superclass.map(|s| Arc::from(s.as_str())),
            interfaces: self.interfaces.iter().map(|s| Arc::from(s.as_str())).collect(),
            access: self.access,
            fields: self.fields,
            methods,
            constant_pool,
        })
    }
}

/// The interface through which the virtual machine obtains class metadata.
///
/// Only [`MetadataProvider::class`] must be implemented; the resolution
/// algorithms are provided on top of it and may be overridden, for example to
/// memoise their results.
///
/// # Thread Safety
///
/// Providers are shared read-only between the workers of the multi-worker
/// search mode and must therefore be [`Send`] and [`Sync`].
pub trait MetadataProvider
where
    Self: Debug + Send + Sync,
{
    /// Gets the class named `name`, if it is known.
    fn class(&self, name: &str) -> Option<Arc<Class>>;

    /// Gets the class named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the class is not known.
    fn resolve_class(&self, name: &str) -> Result<Arc<Class>> {
        self.class(name).ok_or_else(|| Error::NoSuchClass {
            name: name.to_string(),
        })
    }

    /// Resolves the method `name descriptor` as seen from `class`: the class
    /// itself, then its superclasses, then its superinterfaces.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if no such method exists.
    fn resolve_method(&self, class: &str, name: &str, descriptor: &str) -> Result<Arc<Method>> {
        resolve_in_hierarchy(self, class, name, descriptor)
    }

    /// Selects the implementation of `name descriptor` that an invocation on an
    /// object of class `runtime_class` executes, preferring concrete methods
    /// over abstract declarations.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if no such method exists.
    fn select_virtual(&self, runtime_class: &str, name: &str, descriptor: &str) -> Result<Arc<Method>> {
        let mut current = Some(Arc::<str>::from(runtime_class));
        while let Some(class_name) = current {
            let found = self.resolve_class(&class_name)?;
            if let Some(method) = found.declared_method(name, descriptor) {
                if !method.is_abstract() {
                    return Ok(method.clone());
                }
            }
            current = found.superclass().cloned();
        }
        self.resolve_method(runtime_class, name, descriptor)
    }

    /// Resolves the field `name` as seen from `class`, returning the declaring
    /// class and the field.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if no such field exists.
    fn resolve_field(&self, class: &str, name: &str) -> Result<(Arc<Class>, Field)> {
        let mut pending = vec![Arc::<str>::from(class)];
        while let Some(class_name) = pending.pop() {
            let found = self.resolve_class(&class_name)?;
            if let Some(field) = found.declared_field(name) {
                return Ok((found.clone(), field.clone()));
            }
            if let Some(superclass) = found.superclass() {
                pending.insert(0, superclass.clone());
            }
            pending.extend(found.interfaces().iter().cloned());
        }

        Err(Error::NoSuchField {
            class: class.to_string(),
            name:  name.to_string(),
        })
    }

    /// Checks if `class` is `ancestor` or inherits from it through its
    /// superclasses or superinterfaces.
    fn is_subclass_of(&self, class: &str, ancestor: &str) -> bool {
        if class == ancestor || ancestor == JAVA_LANG_OBJECT {
            return true;
        }
        let Some(found) = self.class(class) else {
            return false;
        };
        found
            .superclass()
            .is_some_and(|s| self.is_subclass_of(s, ancestor))
            || found.interfaces().iter().any(|i| self.is_subclass_of(i, ancestor))
    }

    /// Checks if a value whose runtime class is `from` may be used where a
    /// `to` is expected. Array classes are named by their descriptors.
    fn is_assignable(&self, from: &str, to: &str) -> bool {
        if from == to || to == JAVA_LANG_OBJECT {
            return true;
        }
        match (from.strip_prefix('['), to.strip_prefix('[')) {
            (Some(from_component), Some(to_component)) => {
                match (
                    from_component.parse::<FieldType>(),
                    to_component.parse::<FieldType>(),
                ) {
                    (Ok(f), Ok(t)) if f.is_reference() && t.is_reference() => {
                        match (f.class_name(), t.class_name()) {
                            (Some(f), Some(t)) => self.is_assignable(&f, &t),
                            _ => false,
                        }
                    }
                    (Ok(f), Ok(t)) => f == t,
                    _ => false,
                }
            }
            (Some(_), None) => matches!(to, "java/lang/Cloneable" | "java/io/Serializable"),
            (None, Some(_)) => false,
            (None, None) => self.is_subclass_of(from, to),
        }
    }
}

/// Resolves the method `name descriptor` by searching `class` and its
/// superclasses, then its superinterfaces.
///
/// # Errors
///
/// Returns [`Err`] if no such method exists.
pub fn resolve_in_hierarchy<P>(
    provider: &P,
    class: &str,
    name: &str,
    descriptor: &str,
) -> Result<Arc<Method>>
where
    P: MetadataProvider + ?Sized,
{
    let mut current = Some(Arc::<str>::from(class));
    while let Some(class_name) = current {
        let found = provider.resolve_class(&class_name)?;
        if let Some(method) = found.declared_method(name, descriptor) {
            return Ok(method.clone());
        }
        current = found.superclass().cloned();
    }

    let mut pending = vec![Arc::<str>::from(class)];
    while let Some(class_name) = pending.pop() {
        let Some(found) = provider.class(&class_name) else {
            continue;
        };
        for interface in found.interfaces() {
            if let Some(method) = provider
                .class(interface)
                .and_then(|i| i.declared_method(name, descriptor).cloned())
            {
                return Ok(method);
            }
            pending.push(interface.clone());
        }
        if let Some(superclass) = found.superclass() {
            pending.push(superclass.clone());
        }
    }

    Err(Error::NoSuchMethod {
        class:      class.to_string(),
        name:       name.to_string(),
        descriptor: descriptor.to_string(),
    })
}
