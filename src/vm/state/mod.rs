//! The state representation for the virtual machine, and utilities for dealing
//! with said representation.
//!
//! All of the mutable state that a path of execution builds up lives in
//! [`State`]: the frame arena, the heap, the static fields and the set of
//! initialised classes. The call stack refers to frames by [`FrameId`] and
//! frames refer to objects by [`HeapRef`], so the arenas can be rolled back to
//! a watermark when the search backtracks.

pub mod frame;
pub mod heap;
pub mod stack;

use std::{fmt::Display, sync::Arc};

use indexmap::{IndexMap, IndexSet};

use crate::{
    error::execution::{Error, Result},
    search::trail::{TrailEntry, TrailTarget},
    vm::{
        state::{
            frame::{Frame, Monitor},
            heap::{Heap, HeapObject, HeapRef},
        },
        value::Value,
    },
};

/// A handle to a frame in the frame arena of a [`State`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FrameId(pub(crate) usize);

impl FrameId {
    /// Gets the position of the frame in the arena.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An element of the call stack.
#[derive(Clone, Debug, PartialEq)]
pub enum StackElement {
    /// A frame that is waiting for a callee to return, or that is about to be
    /// executed.
    Frame(FrameId),

    /// A value returned by the frame above, waiting to be delivered to its
    /// invoker.
    ReturnValue(Value),
}

/// The key of a static field: the declaring class and the field name.
pub type StaticKey = (Arc<str>, Arc<str>);

/// The mutable state of one path of execution.
#[derive(Clone, Debug, Default)]
pub struct State {
    frames:      Vec<Frame>,
    heap:        Heap,
    statics:     IndexMap<StaticKey, Value>,
    initialized: IndexSet<Arc<str>>,
    strings:     IndexMap<Arc<str>, HeapRef>,
    mirrors:     IndexMap<Arc<str>, HeapRef>,
    monitors:    IndexMap<Monitor, usize>,
}

impl State {
    /// Creates an empty state whose heap holds at most `heap_limit` objects.
    #[must_use]
    pub fn new(heap_limit: usize) -> Self {
        Self {
            heap: Heap::new(heap_limit),
            ..Self::default()
        }
    }

    /// Adds `frame` to the frame arena.
    pub fn push_frame(&mut self, frame: Frame) -> FrameId {
        self.frames.push(frame);
        FrameId(self.frames.len() - 1)
    }

    /// Gets the frame `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if there is no such frame.
    pub fn frame(&self, id: FrameId) -> Result<&Frame> {
        self.frames.get(id.0).ok_or(Error::NoCurrentFrame)
    }

    /// Gets the frame `id` for modification.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if there is no such frame.
    pub fn frame_mut(&mut self, id: FrameId) -> Result<&mut Frame> {
        self.frames.get_mut(id.0).ok_or(Error::NoCurrentFrame)
    }

    /// Gets the number of frames in the arena.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Iterates over the frames in the arena.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    /// Releases the frames at the top of the arena that are no longer active,
    /// never going below `floor`.
    pub fn release_frames(&mut self, floor: usize) {
        while self.frames.len() > floor && self.frames.last().is_some_and(|f| !f.is_active()) {
            self.frames.pop();
        }
    }

    /// Discards every frame whose id is `len` or above.
    pub fn truncate_frames(&mut self, len: usize) {
        self.frames.truncate(len);
    }

    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Gets the value of a static field, if it has been given one.
    #[must_use]
    pub fn static_value(&self, key: &StaticKey) -> Option<&Value> {
        self.statics.get(key)
    }

    /// Sets a static field, returning its previous value.
    pub fn set_static(&mut self, class: Arc<str>, field: Arc<str>, value: Value) -> Option<Value> {
        self.statics.insert((class, field), value)
    }

    /// Checks if the class `name` has been initialised on this path.
    #[must_use]
    pub fn is_initialized(&self, name: &str) -> bool {
        self.initialized.contains(name)
    }

    /// Marks the class `name` as initialised, returning `false` if it already
    /// was.
    pub fn mark_initialized(&mut self, name: Arc<str>) -> bool {
        self.initialized.insert(name)
    }

    /// Gets the interned string object with the text `text`.
    #[must_use]
    pub fn interned_string(&self, text: &str) -> Option<HeapRef> {
        self.strings.get(text).copied()
    }

    pub fn intern_string(&mut self, text: Arc<str>, reference: HeapRef) {
        self.strings.insert(text, reference);
    }

    /// Gets the mirror object of the class `name`.
    #[must_use]
    pub fn mirror(&self, name: &str) -> Option<HeapRef> {
        self.mirrors.get(name).copied()
    }

    pub fn intern_mirror(&mut self, name: Arc<str>, reference: HeapRef) {
        self.mirrors.insert(name, reference);
    }

    /// Forgets every interned object whose handle is `heap_len` or above.
    pub fn forget_interned_above(&mut self, heap_len: usize) {
        self.strings.retain(|_, r| r.0 < heap_len);
        self.mirrors.retain(|_, r| r.0 < heap_len);
    }

    /// Enters `monitor`, returning the new entry count.
    pub fn enter_monitor(&mut self, monitor: Monitor) -> usize {
        let count = self.monitors.entry(monitor).or_insert(0);
        *count += 1;
        *count
    }

    /// Exits `monitor`, returning `false` if it was not held.
    pub fn exit_monitor(&mut self, monitor: &Monitor) -> bool {
        match self.monitors.get_mut(monitor) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.monitors.shift_remove(monitor);
                true
            }
            None => false,
        }
    }

    /// Gets a copy of the monitor entry counts.
    #[must_use]
    pub fn monitors(&self) -> IndexMap<Monitor, usize> {
        self.monitors.clone()
    }

    pub fn restore_monitors(&mut self, monitors: IndexMap<Monitor, usize>) {
        self.monitors = monitors;
    }

    /// Gets the handles that keep heap objects alive, apart from those held on
    /// the call stack.
    #[must_use]
    pub fn roots(&self) -> Vec<HeapRef> {
        let held = self
            .frames
            .iter()
            .flat_map(Frame::values)
            .chain(self.statics.values())
            .filter_map(|value| match value {
                Value::Reference(r) => Some(*r),
                _ => None,
            });
        let monitors = self.monitors.keys().filter_map(|monitor| match monitor {
            Monitor::Object(r) => Some(*r),
            Monitor::Class(_) => None,
        });
        held.chain(monitors)
            .chain(self.strings.values().copied())
            .chain(self.mirrors.values().copied())
            .collect()
    }
}

impl TrailTarget for State {
    fn undo(&mut self, entry: TrailEntry) -> Result<()> {
        match entry {
            TrailEntry::Local {
                frame,
                index,
                previous,
            } => self.frame_mut(frame)?.restore_local(index, previous),
            TrailEntry::ArrayElement {
                array,
                index,
                previous,
            } => match self.heap.get_mut(array)? {
                HeapObject::Array { elements, .. } if index < elements.len() => {
                    elements[index] = previous;
                    Ok(())
                }
                _ => Err(Error::InvalidReference {
                    reference: array.index(),
                }),
            },
            TrailEntry::Field {
                object,
                field,
                previous,
            } => match self.heap.get_mut(object)? {
                HeapObject::Instance { fields, .. } => {
                    match previous {
                        Some(value) => fields.insert(field, value),
                        None => fields.shift_remove(&field),
                    };
                    Ok(())
                }
                _ => Err(Error::InvalidReference {
                    reference: object.index(),
                }),
            },
            TrailEntry::Static {
                class,
                field,
                previous,
            } => {
                let key = (class, field);
                match previous {
                    Some(value) => self.statics.insert(key, value),
                    None => self.statics.shift_remove(&key),
                };
                Ok(())
            }
            TrailEntry::Object { object, previous } => {
                self.heap.replace(object, previous)?;
                Ok(())
            }
            TrailEntry::ClassInitialized { class } => {
                self.initialized.shift_remove(&class);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::{
        search::trail::{TrailEntry, TrailTarget},
        vm::{
            state::{heap::HeapObject, State},
            value::Value,
        },
    };

    #[test]
    fn undoing_a_static_write_restores_absence() -> anyhow::Result<()> {
        let mut state = State::new(8);
        let (class, field) = (Arc::<str>::from("C"), Arc::<str>::from("x"));
        let previous = state.set_static(class.clone(), field.clone(), Value::int(1));
        state.undo(TrailEntry::Static {
            class:    class.clone(),
            field:    field.clone(),
            previous,
        })?;
        assert!(state.static_value(&(class, field)).is_none());

        Ok(())
    }

    #[test]
    fn interned_objects_above_a_watermark_are_forgotten() -> anyhow::Result<()> {
        let mut state = State::new(8);
        let old = state.heap_mut().allocate(HeapObject::Str(Arc::from("a")), false)?;
        state.intern_string(Arc::from("a"), old);
        let mark = state.heap().len();
        let new = state.heap_mut().allocate(HeapObject::Str(Arc::from("b")), false)?;
        state.intern_string(Arc::from("b"), new);

        state.forget_interned_above(mark);
        assert_eq!(state.interned_string("a"), Some(old));
        assert_eq!(state.interned_string("b"), None);

        Ok(())
    }
}
