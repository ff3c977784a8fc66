//! This module contains the heap of the virtual machine: an arena of objects
//! addressed by [`HeapRef`] handles.
//!
//! Frames, operand stacks and other objects only ever hold handles. Objects
//! are reclaimed by a mark-and-sweep pass from the roots that the virtual
//! machine provides, which only happens while no choice point is open so that
//! handles stay stable across backtracking.

use std::{fmt::Display, sync::Arc};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    class::FieldType,
    constant::{JAVA_LANG_CLASS, JAVA_LANG_STRING},
    error::execution::{Error, Result},
    vm::value::Value,
};

/// A handle to an object in the [`Heap`].
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct HeapRef(pub(crate) usize);

impl HeapRef {
    /// Gets the position of the object in the heap arena.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for HeapRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// An object in the heap.
#[derive(Clone, Debug, PartialEq)]
pub enum HeapObject {
    /// An instance of a class.
    Instance {
        class:  Arc<str>,
        fields: IndexMap<Arc<str>, Value>,

        /// Set for objects that stand for symbolic inputs. Their fields are
        /// created lazily as fresh variables when first read.
        symbolic: Option<Arc<str>>,
    },

    /// An array with known elements.
    Array {
        component: FieldType,
        elements:  Vec<Value>,
    },

    /// A symbolic input array whose length has not been chosen yet.
    Unresolved { component: FieldType, name: Arc<str> },

    /// A string.
    Str(Arc<str>),

    /// The mirror of the class with the given name.
    ClassMirror(Arc<str>),
}

impl HeapObject {
    /// Gets the runtime class name of the object, naming array classes by
    /// their descriptors.
    #[must_use]
    pub fn class_name(&self) -> String {
        match self {
            HeapObject::Instance { class, .. } => class.to_string(),
            HeapObject::Array { component, .. } | HeapObject::Unresolved { component, .. } => {
                format!("[{component}")
            }
            HeapObject::Str(_) => JAVA_LANG_STRING.to_string(),
            HeapObject::ClassMirror(_) => JAVA_LANG_CLASS.to_string(),
        }
    }

    /// Iterates over the values held by the object.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        let (fields, elements): (Option<&IndexMap<Arc<str>, Value>>, &[Value]) = match self {
            HeapObject::Instance { fields, .. } => (Some(fields), &[]),
            HeapObject::Array { elements, .. } => (None, elements.as_slice()),
            _ => (None, &[]),
        };
        fields.into_iter().flat_map(IndexMap::values).chain(elements.iter())
    }
}

/// The heap arena.
#[derive(Clone, Debug, Default)]
pub struct Heap {
    objects:     Vec<Option<HeapObject>>,
    free:        Vec<usize>,
    live:        usize,
    limit:       usize,
    allocations: usize,
}

impl Heap {
    /// Creates an empty heap that holds at most `limit` live objects.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Allocates `object`, returning its handle.
    ///
    /// Freed slots are only reused if `reuse` is set; otherwise the object is
    /// appended to the arena, keeping the handles of every existing object
    /// below the current [`Self::len`].
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the heap is full.
    pub fn allocate(&mut self, object: HeapObject, reuse: bool) -> Result<HeapRef> {
        if self.live >= self.limit {
            return Err(Error::OutOfMemory { limit: self.limit });
        }
        self.live += 1;
        self.allocations += 1;

        if reuse {
            if let Some(index) = self.free.pop() {
                self.objects[index] = Some(object);
                return Ok(HeapRef(index));
            }
        }
        self.objects.push(Some(object));
        Ok(HeapRef(self.objects.len() - 1))
    }

    /// Gets the object behind `reference`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `reference` does not point to a live object.
    pub fn get(&self, reference: HeapRef) -> Result<&HeapObject> {
        self.objects
            .get(reference.0)
            .and_then(Option::as_ref)
            .ok_or(Error::InvalidReference {
                reference: reference.0,
            })
    }

    /// Gets the object behind `reference` for modification.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `reference` does not point to a live object.
    pub fn get_mut(&mut self, reference: HeapRef) -> Result<&mut HeapObject> {
        self.objects
            .get_mut(reference.0)
            .and_then(Option::as_mut)
            .ok_or(Error::InvalidReference {
                reference: reference.0,
            })
    }

    /// Replaces the object behind `reference`, returning the previous object.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `reference` does not point to a live object.
    pub fn replace(&mut self, reference: HeapRef, object: HeapObject) -> Result<HeapObject> {
        Ok(std::mem::replace(self.get_mut(reference)?, object))
    }

    /// Gets the text of the string object behind `reference`.
    #[must_use]
    pub fn string(&self, reference: HeapRef) -> Option<&Arc<str>> {
        match self.get(reference) {
            Ok(HeapObject::Str(text)) => Some(text),
            _ => None,
        }
    }

    /// Gets the length of the arena, which is one more than the largest handle
    /// ever handed out.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Checks if the arena is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Gets the number of live objects.
    #[must_use]
    pub fn live(&self) -> usize {
        self.live
    }

    /// Gets the number of allocations since the last collection.
    #[must_use]
    pub fn allocations_since_collection(&self) -> usize {
        self.allocations
    }

    /// Discards every object whose handle is `len` or above.
    pub fn truncate(&mut self, len: usize) {
        let removed = self.objects.drain(len.min(self.objects.len())..);
        self.live -= removed.filter(Option::is_some).count();
        self.free.retain(|&index| index < len);
    }

    /// Reclaims every object that is not reachable from `roots`, returning the
    /// number of objects reclaimed.
    pub fn collect(&mut self, roots: impl IntoIterator<Item = HeapRef>) -> usize {
        let mut marked = vec![false; self.objects.len()];
        let mut pending: Vec<HeapRef> = roots.into_iter().collect();
        while let Some(reference) = pending.pop() {
            let Some(mark) = marked.get_mut(reference.0) else {
                continue;
            };
            if *mark {
                continue;
            }
            *mark = true;
            if let Some(Some(object)) = self.objects.get(reference.0) {
                pending.extend(object.values().filter_map(|value| match value {
                    Value::Reference(r) => Some(*r),
                    _ => None,
                }));
            }
        }

        let mut reclaimed = 0;
        for (index, slot) in self.objects.iter_mut().enumerate() {
            if slot.is_some() && !marked[index] {
                *slot = None;
                self.free.push(index);
                reclaimed += 1;
            }
        }
        self.live -= reclaimed;
        self.allocations = 0;
        reclaimed
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use indexmap::IndexMap;

    use crate::{
        class::FieldType,
        error::execution::Error,
        vm::{
            state::heap::{Heap, HeapObject},
            value::Value,
        },
    };

    fn string(text: &str) -> HeapObject {
        HeapObject::Str(Arc::from(text))
    }

    #[test]
    fn refuses_to_grow_beyond_its_limit() -> anyhow::Result<()> {
        let mut heap = Heap::new(1);
        heap.allocate(string("a"), true)?;
        let error = heap.allocate(string("b"), true).expect_err("Allocated past the limit");
        assert_eq!(error, Error::OutOfMemory { limit: 1 });

        Ok(())
    }

    #[test]
    fn collects_unreachable_objects() -> anyhow::Result<()> {
        let mut heap = Heap::new(10);
        let kept = heap.allocate(string("kept"), true)?;
        let holder = heap.allocate(
            HeapObject::Array {
                component: FieldType::Object(Arc::from("java/lang/String")),
                elements:  vec![Value::Reference(kept)],
            },
            true,
        )?;
        let dropped = heap.allocate(string("dropped"), true)?;

        assert_eq!(heap.collect([holder]), 1);
        assert_eq!(heap.live(), 2);
        heap.get(dropped).expect_err("A collected object is still reachable");

        let reused = heap.allocate(string("new"), true)?;
        assert_eq!(reused, dropped);

        Ok(())
    }

    #[test]
    fn truncation_discards_newer_objects() -> anyhow::Result<()> {
        let mut heap = Heap::new(10);
        let old = heap.allocate(
            HeapObject::Instance {
                class:    Arc::from("A"),
                fields:   IndexMap::new(),
                symbolic: None,
            },
            false,
        )?;
        let mark = heap.len();
        let new = heap.allocate(string("x"), false)?;
        heap.truncate(mark);

        assert!(heap.get(old).is_ok());
        assert!(heap.get(new).is_err());
        assert_eq!(heap.live(), 1);

        Ok(())
    }
}
