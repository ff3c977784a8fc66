//! This module contains the operations of the virtual machine on heap objects,
//! static fields and local variables.
//!
//! Every mutation of state that existed before the most recent choice point
//! is recorded on the trail here, so that instruction behaviours never have to
//! think about backtracking.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::{
    class::FieldType,
    constant::JAVA_LANG_STRING,
    error::execution::{Error, Result},
    search::trail::TrailEntry,
    vm::{
        state::heap::{HeapObject, HeapRef},
        value::{Comparison, Constraint, LocalSlot, Primitive, Term, Value, Variable},
        VirtualMachine,
    },
};

impl VirtualMachine {
    /// Allocates `object` in the heap.
    ///
    /// Freed heap slots are only reused while no choice point is open, so
    /// that every object created after a choice point lies above its heap
    /// watermark.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the heap is full.
    pub(crate) fn allocate(&mut self, object: HeapObject) -> Result<HeapRef> {
        let reuse = self.search.choice_points.is_empty();
        self.state.heap_mut().allocate(object, reuse)
    }

    /// Gets the default values of the instance fields of `class` and its
    /// superclasses, those of the superclasses first.
    fn instance_fields(&self, class: &str) -> IndexMap<Arc<str>, Value> {
        let mut hierarchy = vec![];
        let mut current = self.metadata.class(class);
        while let Some(found) = current {
            current = found.superclass().and_then(|s| self.metadata.class(s));
            hierarchy.push(found);
        }

        hierarchy
            .iter()
            .rev()
            .flat_map(|c| c.fields().iter().filter(|f| !f.is_static()))
            .map(|field| (field.name.clone(), field.descriptor.default_value()))
            .collect()
    }

    /// Allocates an instance of `class` with every field at its default value.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the heap is full.
    pub(crate) fn new_instance(&mut self, class: &str) -> Result<HeapRef> {
        let fields = self.instance_fields(class);
        self.allocate(HeapObject::Instance {
            class: Arc::from(class),
            fields,
            symbolic: None,
        })
    }

    /// Makes up the symbolic input `name` of type `field_type`.
    ///
    /// Primitive inputs become fresh variables, constrained to the range of
    /// their type where that is narrower than `int`. Arrays become unresolved
    /// arrays whose length is chosen when they are first used. Objects of
    /// concrete classes become symbolic instances whose fields are made up
    /// when first read, and every other reference is `null`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the heap is full.
    pub(crate) fn fresh_input(&mut self, name: &str, field_type: &FieldType) -> Result<Value> {
        if let Some(kind) = field_type.kind() {
            let variable = Variable::fresh(name, kind);
            self.search.inputs.push(variable.clone());
            let term = Term::variable(variable);
            if let Some((min, max)) = Self::input_range(field_type) {
                self.constrain_input(&term, Comparison::Ge, min);
                self.constrain_input(&term, Comparison::Le, max);
            }
            return Ok(Value::Term(term));
        }

        match field_type {
            FieldType::Array(component) => {
                let array = self.allocate(HeapObject::Unresolved {
                    component: (**component).clone(),
                    name:      Arc::from(name),
                })?;
                Ok(Value::Reference(array))
            }
            FieldType::Object(class) => {
                let concrete = self.metadata.class(class).is_some_and(|found| {
                    !found.is_interface() && !found.is_abstract() && class.as_ref() != JAVA_LANG_STRING
                });
                if !concrete {
                    return Ok(Value::Null);
                }
                let object = self.allocate(HeapObject::Instance {
                    class:    class.clone(),
                    fields:   IndexMap::new(),
                    symbolic: Some(Arc::from(name)),
                })?;
                Ok(Value::Reference(object))
            }
            _ => Ok(Value::Null),
        }
    }

    fn input_range(field_type: &FieldType) -> Option<(i32, i32)> {
        match field_type {
            FieldType::Boolean => Some((0, 1)),
            FieldType::Byte => Some((i32::from(i8::MIN), i32::from(i8::MAX))),
            FieldType::Char => Some((0, i32::from(u16::MAX))),
            FieldType::Short => Some((i32::from(i16::MIN), i32::from(i16::MAX))),
            _ => None,
        }
    }

    /// Asserts `input comparison bound` on the solver. Failures are buffered
    /// like every other solver error of the search.
    fn constrain_input(&mut self, input: &Term, comparison: Comparison, bound: i32) {
        let constraint = Constraint::compare(comparison, input.clone(), Term::from(Primitive::Int(bound)));
        if let Err(error) = self.solver.add_constraint(constraint) {
            let location = self.location();
            self.search.solver_errors.add_located(location, error);
        }
    }

    /// Reads the field `name` of type `field_type` from `object`.
    ///
    /// Fields of symbolic instances that have never been written are made up
    /// as fresh inputs named after the object.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `object` is not an instance.
    pub(crate) fn field_value(&mut self, object: HeapRef, name: &Arc<str>, field_type: &FieldType) -> Result<Value> {
        let prefix = match self.state.heap().get(object)? {
            HeapObject::Instance { fields, symbolic, .. } => match fields.get(name) {
                Some(value) => return Ok(value.clone()),
                None => symbolic.clone(),
            },
            other => {
                return Err(Error::TypeMismatch {
                    expected: "object instance".to_string(),
                    found:    other.class_name(),
                })
            }
        };

        let Some(prefix) = prefix else {
            return Ok(field_type.default_value());
        };
        let value = self.fresh_input(&format!("{prefix}.{name}"), field_type)?;
        self.write_field(object, name.clone(), value.clone())?;
        Ok(value)
    }

    /// Writes `value` to the field `name` of `object`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `object` is not an instance.
    pub(crate) fn write_field(&mut self, object: HeapRef, name: Arc<str>, value: Value) -> Result<()> {
        let previous = match self.state.heap_mut().get_mut(object)? {
            HeapObject::Instance { fields, .. } => fields.insert(name.clone(), value),
            other => {
                return Err(Error::TypeMismatch {
                    expected: "object instance".to_string(),
                    found:    other.class_name(),
                })
            }
        };
        self.search.record(TrailEntry::Field {
            object,
            field: name,
            previous,
        });
        Ok(())
    }

    /// Reads the static field `name` declared by `class`, which must already
    /// be initialised.
    #[must_use]
    pub(crate) fn static_field(&self, class: &Arc<str>, name: &Arc<str>, field_type: &FieldType) -> Value {
        self.state
            .static_value(&(class.clone(), name.clone()))
            .cloned()
            .unwrap_or_else(|| field_type.default_value())
    }

    /// Writes `value` to the static field `name` declared by `class`.
    pub(crate) fn write_static(&mut self, class: Arc<str>, name: Arc<str>, value: Value) {
        let previous = self.state.set_static(class.clone(), name.clone(), value);
        self.search.record(TrailEntry::Static {
            class,
            field: name,
            previous,
        });
    }

    /// Writes `value` to the element `index` of `array`, which must be in
    /// bounds.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `array` is not an array with such an element.
    pub(crate) fn write_element(&mut self, array: HeapRef, index: usize, value: Value) -> Result<()> {
        let previous = match self.state.heap_mut().get_mut(array)? {
            HeapObject::Array { elements, .. } if index < elements.len() => {
                std::mem::replace(&mut elements[index], value)
            }
            _ => {
                return Err(Error::InvalidReference {
                    reference: array.index(),
                })
            }
        };
        self.search.record(TrailEntry::ArrayElement {
            array,
            index,
            previous,
        });
        Ok(())
    }

    /// Gives the unresolved symbolic array `array` the length `length`, with
    /// a fresh input for every element.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `array` is not an unresolved array.
    pub(crate) fn materialize_array(&mut self, array: HeapRef, length: usize) -> Result<()> {
        let (component, name) = match self.state.heap().get(array)? {
            HeapObject::Unresolved { component, name } => (component.clone(), name.clone()),
            other => {
                return Err(Error::TypeMismatch {
                    expected: "unresolved array".to_string(),
                    found:    other.class_name(),
                })
            }
        };

        let elements = (0..length)
            .map(|index| self.fresh_input(&format!("{name}[{index}]"), &component))
            .collect::<Result<Vec<_>>>()?;
        let previous = self.state.heap_mut().replace(array, HeapObject::Array { component, elements })?;
        self.search.record(TrailEntry::Object {
            object: array,
            previous,
        });
        self.search.generated.push((name, length));
        Ok(())
    }

    /// Gets the interned string object with the text `text`, allocating it on
    /// first use.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the heap is full.
    pub(crate) fn intern_string(&mut self, text: &str) -> Result<HeapRef> {
        if let Some(existing) = self.state.interned_string(text) {
            return Ok(existing);
        }
        let text: Arc<str> = Arc::from(text);
        let reference = self.allocate(HeapObject::Str(text.clone()))?;
        self.state.intern_string(text, reference);
        Ok(reference)
    }

    /// Gets the mirror object of the class `name`, allocating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the heap is full.
    pub(crate) fn class_mirror(&mut self, name: &str) -> Result<HeapRef> {
        if let Some(existing) = self.state.mirror(name) {
            return Ok(existing);
        }
        let name: Arc<str> = Arc::from(name);
        let reference = self.allocate(HeapObject::ClassMirror(name.clone()))?;
        self.state.intern_mirror(name, reference);
        Ok(reference)
    }

    /// Reads the local variable `index` of the current frame.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the slot is out of bounds or holds no value.
    pub(crate) fn load_local(&self, index: usize) -> Result<Value> {
        self.frame()?.local(index).cloned()
    }

    /// Writes `value` to the local variable `index` of the current frame.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the value does not fit within the locals.
    pub(crate) fn store_local(&mut self, index: usize, value: Value) -> Result<()> {
        let frame = self.current_frame_id()?;
        let previous: Vec<(usize, LocalSlot)> = self.state.frame_mut(frame)?.set_local(index, value)?;
        for (index, previous) in previous {
            self.search.record(TrailEntry::Local {
                frame,
                index,
                previous,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::{
        class::{ClassBuilder, ClassLibrary, Field, FieldType},
        vm::{
            state::heap::HeapObject,
            value::{Kind, Value},
            Config,
            VirtualMachine,
        },
    };

    fn machine() -> anyhow::Result<VirtualMachine> {
        let base = ClassBuilder::new("Base").field(Field::instance("x", "I")?).build()?;
        let derived = ClassBuilder::new("Derived")
            .superclass(Some("Base"))
            .field(Field::instance("next", "LDerived;")?)
            .field(Field::static_field("count", "I")?)
            .build()?;
        let library = ClassLibrary::with_core_classes()?.with(base).with(derived);
        Ok(VirtualMachine::new(Arc::new(library), Config::default()))
    }

    #[test]
    fn instances_get_inherited_fields_first() -> anyhow::Result<()> {
        let mut vm = machine()?;
        let object = vm.new_instance("Derived")?;
        let HeapObject::Instance { fields, .. } = vm.state.heap().get(object)? else {
            anyhow::bail!("Not an instance");
        };
        let names: Vec<&str> = fields.keys().map(AsRef::as_ref).collect();
        assert_eq!(names, vec!["x", "next"]);
        assert_eq!(fields.get("next"), Some(&Value::Null));

        Ok(())
    }

    #[test]
    fn symbolic_fields_are_made_up_once() -> anyhow::Result<()> {
        let mut vm = machine()?;
        let this = vm.fresh_input("this", &FieldType::Object(Arc::from("Derived")))?;
        let Value::Reference(this) = this else {
            anyhow::bail!("Symbolic receivers are instances");
        };

        let x: Arc<str> = Arc::from("x");
        let first = vm.field_value(this, &x, &FieldType::Int)?;
        let second = vm.field_value(this, &x, &FieldType::Int)?;
        assert_eq!(first, second);
        assert_eq!(first.kind(), Some(Kind::Int));
        assert_eq!(first.to_string(), "this.x");
        assert_eq!(vm.search.inputs.len(), 1);

        Ok(())
    }

    #[test]
    fn narrow_inputs_are_constrained() -> anyhow::Result<()> {
        let mut vm = machine()?;
        let level = vm.solver.level();
        vm.fresh_input("flag", &FieldType::Boolean)?;
        vm.fresh_input("wide", &FieldType::Long)?;
        assert_eq!(vm.solver.level(), level + 2);

        Ok(())
    }

    #[test]
    fn interfaces_and_strings_are_null_inputs() -> anyhow::Result<()> {
        let mut vm = machine()?;
        let text = vm.fresh_input("s", &FieldType::Object(Arc::from("java/lang/String")))?;
        let unknown = vm.fresh_input("u", &FieldType::Object(Arc::from("Nowhere")))?;
        assert_eq!(text, Value::Null);
        assert_eq!(unknown, Value::Null);

        Ok(())
    }

    #[test]
    fn strings_are_interned() -> anyhow::Result<()> {
        let mut vm = machine()?;
        let first = vm.intern_string("hello")?;
        let second = vm.intern_string("hello")?;
        assert_eq!(first, second);
        assert_ne!(vm.class_mirror("Base")?, vm.class_mirror("Derived")?);

        Ok(())
    }
}
