//! This module contains the in-memory [`MetadataProvider`] implementation.

use std::{collections::HashMap, sync::Arc};

use derivative::Derivative;
use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::{
    class::{core, resolve_in_hierarchy, Class, MetadataProvider, Method},
    error,
    error::execution::Result,
};

/// The key of a memoised method resolution: class, name and descriptor.
type MethodKey = (Arc<str>, Arc<str>, Arc<str>);

/// A set of classes held in memory.
///
/// Method resolution results are memoised, as the same call sites are resolved
/// over and over again during symbolic exploration. The memo is behind a lock
/// so that a library can be shared between the workers of the multi-worker
/// search mode.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ClassLibrary {
    classes: IndexMap<Arc<str>, Arc<Class>>,

    #[derivative(Debug = "ignore")]
    method_cache: RwLock<HashMap<MethodKey, Arc<Method>>>,
}

impl ClassLibrary {
    /// Creates a library containing no classes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            classes:      IndexMap::new(),
            method_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a library containing the core classes that the virtual machine
    /// itself relies on, such as [`crate::constant::JAVA_LANG_OBJECT`] and the
    /// exceptions raised by instructions.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the core classes fail to build.
    pub fn with_core_classes() -> error::Result<Self> {
        let mut library = Self::new();
        for class in core::classes()? {
            library.add(class);
        }
        Ok(library)
    }

    /// Adds `class` to the library, replacing any class of the same name.
    pub fn add(&mut self, class: Class) {
        self.method_cache.write().clear();
        self.classes.insert(class.name().clone(), Arc::new(class));
    }

    /// Adds `class` to the library and returns the library.
    #[must_use]
    pub fn with(mut self, class: Class) -> Self {
        self.add(class);
        self
    }

    /// Gets the number of classes in the library.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Checks if the library contains no classes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Iterates over the names of the classes in insertion order.
    pub fn class_names(&self) -> impl Iterator<Item = &Arc<str>> {
        self.classes.keys()
    }
}

impl Default for ClassLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataProvider for ClassLibrary {
    fn class(&self, name: &str) -> Option<Arc<Class>> {
        self.classes.get(name).cloned()
    }

    fn resolve_method(&self, class: &str, name: &str, descriptor: &str) -> Result<Arc<Method>> {
        let key: MethodKey = (Arc::from(class), Arc::from(name), Arc::from(descriptor));
        if let Some(method) = self.method_cache.read().get(&key) {
            return Ok(method.clone());
        }

        let method = resolve_in_hierarchy(self, class, name, descriptor)?;
        self.method_cache.write().insert(key, method.clone());
        Ok(method)
    }
}

#[cfg(test)]
mod test {
    use crate::{
        bytecode,
        class::{ClassBuilder, ClassLibrary, MetadataProvider, MethodBuilder},
        constant::{ARITHMETIC_EXCEPTION, JAVA_LANG_OBJECT, JAVA_LANG_THROWABLE},
        opcode::code::RETURN,
    };

    #[test]
    fn core_classes_form_a_hierarchy() -> anyhow::Result<()> {
        let library = ClassLibrary::with_core_classes()?;
        assert!(library.class(JAVA_LANG_OBJECT).is_some());
        assert!(library.is_subclass_of(ARITHMETIC_EXCEPTION, JAVA_LANG_THROWABLE));
        assert!(!library.is_subclass_of(JAVA_LANG_THROWABLE, ARITHMETIC_EXCEPTION));

        Ok(())
    }

    #[test]
    fn replacing_a_class_invalidates_resolutions() -> anyhow::Result<()> {
        let mut library = ClassLibrary::with_core_classes()?;
        library.add(
            ClassBuilder::new("A")
                .method(MethodBuilder::new("m", "()V").code(bytecode![RETURN]).max_locals(1))
                .build()?,
        );
        assert_eq!(library.resolve_method("A", "m", "()V")?.class().as_ref(), "A");

        library.add(ClassBuilder::new("A").build()?);
        library
            .resolve_method("A", "m", "()V")
            .expect_err("A stale resolution was served");

        Ok(())
    }
}
