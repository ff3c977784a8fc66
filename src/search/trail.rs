//! This module contains the trail: the log of inverse operations through which
//! the search undoes the mutations made since a choice point was created.

use std::sync::Arc;

use crate::{
    error::execution::Result,
    vm::{
        state::{
            heap::{HeapObject, HeapRef},
            FrameId,
        },
        value::{LocalSlot, Value},
    },
};

/// One undoable mutation: the target that changed and its previous content.
#[derive(Clone, Debug, PartialEq)]
pub enum TrailEntry {
    Local {
        frame:    FrameId,
        index:    usize,
        previous: LocalSlot,
    },
    ArrayElement {
        array:    HeapRef,
        index:    usize,
        previous: Value,
    },

    /// An instance field; a `previous` of [`None`] means that the field did not
    /// exist yet, as for the lazily created fields of symbolic objects.
    Field {
        object:   HeapRef,
        field:    Arc<str>,
        previous: Option<Value>,
    },
    Static {
        class:    Arc<str>,
        field:    Arc<str>,
        previous: Option<Value>,
    },

    /// A whole heap object, as replaced when a symbolic input array is given
    /// its length.
    Object {
        object:   HeapRef,
        previous: HeapObject,
    },
    ClassInitialized {
        class: Arc<str>,
    },
}

/// Something whose mutations can be undone by replaying [`TrailEntry`]s.
pub trait TrailTarget {
    /// Puts the target of `entry` back to its previous content.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the target of `entry` no longer exists.
    fn undo(&mut self, entry: TrailEntry) -> Result<()>;
}

/// The trail segment owned by one choice point.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Trail {
    entries: Vec<TrailEntry>,
}

impl Trail {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `entry` as the most recent mutation.
    pub fn push(&mut self, entry: TrailEntry) {
        self.entries.push(entry);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Undoes every recorded mutation on `target`, most recent first, leaving
    /// the trail empty.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if an entry cannot be undone.
    pub fn replay(&mut self, target: &mut impl TrailTarget) -> Result<()> {
        while let Some(entry) = self.entries.pop() {
            target.undo(entry)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use proptest::prelude::*;

    use crate::{
        bytecode,
        class::{ClassBuilder, FieldType, MethodBuilder},
        opcode::code::RETURN,
        search::trail::{Trail, TrailEntry},
        vm::{
            state::{frame::Frame, heap::HeapObject, State},
            value::Value,
        },
    };

    /// A mutation applied to the state under test.
    #[derive(Clone, Debug)]
    enum Mutation {
        Local(usize, i64, bool),
        Element(usize, i32),
        Static(u8, i32),
    }

    fn mutation() -> impl Strategy<Value = Mutation> {
        prop_oneof![
            (0..4_usize, any::<i64>(), any::<bool>()).prop_map(|(i, v, w)| Mutation::Local(i, v, w)),
            (0..3_usize, any::<i32>()).prop_map(|(i, v)| Mutation::Element(i, v)),
            (0..3_u8, any::<i32>()).prop_map(|(f, v)| Mutation::Static(f, v)),
        ]
    }

    fn apply(state: &mut State, trail: &mut Trail, mutation: &Mutation) -> anyhow::Result<()> {
        match *mutation {
            Mutation::Local(index, value, wide) => {
                let value = if wide {
                    Value::long(value)
                } else {
                    Value::int(value as i32)
                };
                let frame = crate::vm::state::FrameId(0);
                if let Ok(previous) = state.frame_mut(frame)?.set_local(index, value) {
                    for (index, previous) in previous {
                        trail.push(TrailEntry::Local {
                            frame,
                            index,
                            previous,
                        });
                    }
                }
            }
            Mutation::Element(index, value) => {
                let array = crate::vm::state::heap::HeapRef(0);
                if let HeapObject::Array { elements, .. } = state.heap_mut().get_mut(array)? {
                    let previous = std::mem::replace(&mut elements[index], Value::int(value));
                    trail.push(TrailEntry::ArrayElement {
                        array,
                        index,
                        previous,
                    });
                }
            }
            Mutation::Static(field, value) => {
                let class = Arc::<str>::from("S");
                let field = Arc::<str>::from(format!("f{field}"));
                let previous = state.set_static(class.clone(), field.clone(), Value::int(value));
                trail.push(TrailEntry::Static {
                    class,
                    field,
                    previous,
                });
            }
        }
        Ok(())
    }

    fn fixture() -> anyhow::Result<State> {
        let class = ClassBuilder::new("S")
            .method(
                MethodBuilder::new("m", "()V")
                    .static_method()
                    .code(bytecode![RETURN])
                    .max_locals(4),
            )
            .build()?;
        let mut state = State::new(4);
        state.push_frame(Frame::new(class.methods()[0].clone(), None, None, vec![Value::int(9)])?);
        state.heap_mut().allocate(
            HeapObject::Array {
                component: FieldType::Int,
                elements:  vec![Value::int(0); 3],
            },
            false,
        )?;
        Ok(state)
    }

    /// Captures what the mutations can touch.
    fn observe(state: &State) -> anyhow::Result<(Vec<Option<String>>, HeapObject, Vec<Option<Value>>)> {
        let frame = state.frame(crate::vm::state::FrameId(0))?;
        let locals = (0..4).map(|i| frame.slot(i).map(|s| format!("{s:?}"))).collect();
        let array = state.heap().get(crate::vm::state::heap::HeapRef(0))?.clone();
        let statics = (0..3)
            .map(|f| {
                state
                    .static_value(&(Arc::from("S"), Arc::from(format!("f{f}"))))
                    .cloned()
            })
            .collect();
        Ok((locals, array, statics))
    }

    proptest! {
        #[test]
        fn replaying_the_trail_restores_the_state(
            mutations in proptest::collection::vec(mutation(), 0..24)
        ) {
            let mut state = fixture().expect("The fixture builds");
            let before = observe(&state).expect("The fixture is observable");

            let mut trail = Trail::new();
            for mutation in &mutations {
                apply(&mut state, &mut trail, mutation).expect("Mutations apply");
            }
            trail.replay(&mut state).expect("The trail replays");

            prop_assert!(trail.is_empty());
            prop_assert_eq!(observe(&state).expect("The state is observable"), before);
        }
    }

    #[test]
    fn replaying_an_empty_trail_changes_nothing() -> anyhow::Result<()> {
        let mut state = fixture()?;
        let before = observe(&state)?;
        Trail::new().replay(&mut state)?;
        assert_eq!(observe(&state)?, before);

        Ok(())
    }
}
