//! This module contains the implementation of a frame's operand stack.

use crate::{
    error::execution::{Error, Result},
    vm::value::Value,
};

/// The operand stack of a single frame.
///
/// # Indexing
///
/// Indexing into this stack is zero-based, where depth 0 is the item on top
/// of the stack.
///
/// # Depth
///
/// The limit is expressed in slots, as for the `max_stack` attribute of a
/// method: `long` and `double` values occupy two slots and all other values
/// occupy one. The stack itself stores one [`Value`] per item regardless of
/// its category.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OperandStack {
    data:  Vec<Value>,
    slots: usize,
    limit: usize,
}

impl OperandStack {
    /// Creates a new stack holding at most `limit` slots.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        let data = Vec::with_capacity(limit);
        Self {
            data,
            slots: 0,
            limit,
        }
    }

    /// Pushes the provided value onto the top of the stack.
    ///
    /// # Errors
    ///
    /// If the stack cannot grow to accommodate the requested `value`.
    pub fn push(&mut self, value: Value) -> Result<()> {
        let requested = self.slots + value.category();
        if requested > self.limit {
            return Err(Error::OperandStackOverflow {
                requested,
                limit: self.limit,
            });
        }
        self.slots = requested;
        self.data.push(value);
        Ok(())
    }

    /// Pops the top value from the stack.
    ///
    /// # Errors
    ///
    /// If the stack has no item to pop.
    pub fn pop(&mut self) -> Result<Value> {
        let value = self.data.pop().ok_or(Error::OperandStackUnderflow)?;
        self.slots -= value.category();
        Ok(value)
    }

    /// Pops the top `count` values from the stack, returning them deepest
    /// first.
    ///
    /// # Errors
    ///
    /// If the stack holds fewer than `count` items, in which case it is left
    /// unchanged.
    pub fn pop_many(&mut self, count: usize) -> Result<Vec<Value>> {
        if count > self.data.len() {
            return Err(Error::OperandStackUnderflow);
        }
        let values = self.data.split_off(self.data.len() - count);
        self.slots -= values.iter().map(Value::category).sum::<usize>();
        Ok(values)
    }

    /// Reads the item at the provided `depth`.
    ///
    /// # Errors
    ///
    /// If `depth` does not exist in the stack.
    pub fn read(&self, depth: usize) -> Result<&Value> {
        self.check_item_at(depth)?;

        // Guarded by `check_item_at`.
        Ok(&self.data[self.data.len() - 1 - depth])
    }

    /// Replaces the item at the provided `depth` with `value`.
    ///
    /// # Errors
    ///
    /// If `depth` does not exist in the stack, or the replacement would
    /// exceed the limit.
    pub fn replace(&mut self, depth: usize, value: Value) -> Result<()> {
        self.check_item_at(depth)?;
        let index = self.data.len() - 1 - depth;
        let requested = self.slots - self.data[index].category() + value.category();
        if requested > self.limit {
            return Err(Error::OperandStackOverflow {
                requested,
                limit: self.limit,
            });
        }
        self.slots = requested;
        self.data[index] = value;
        Ok(())
    }

    /// Removes all items from the stack.
    pub fn clear(&mut self) {
        self.data.clear();
        self.slots = 0;
    }

    /// Gets the number of items on the stack.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Gets the number of slots occupied by the items on the stack.
    #[must_use]
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Checks if the stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Iterates over the items from the bottom of the stack to the top.
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.data.iter()
    }

    /// Checks if an item exists at the provided `depth`.
    ///
    /// # Errors
    ///
    /// If there is no such item.
    pub fn check_item_at(&self, depth: usize) -> Result<()> {
        if depth >= self.data.len() {
            return Err(Error::NoSuchOperand { depth });
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::{
        error::execution::Error,
        vm::{state::stack::OperandStack, value::Value},
    };

    /// Constructs a new stack with `item_count` ints pushed onto it.
    fn new_stack_with_items(item_count: usize) -> anyhow::Result<OperandStack> {
        let mut stack = OperandStack::new(16);
        for i in 0..item_count {
            stack.push(Value::int(i32::try_from(i)?))?;
        }

        Ok(stack)
    }

    #[test]
    fn can_construct_new_stack() {
        let stack = OperandStack::new(4);
        assert_eq!(stack.size(), 0);
        assert!(stack.is_empty());
    }

    #[test]
    fn cannot_push_outside_of_capacity() -> anyhow::Result<()> {
        let mut stack = OperandStack::new(3);
        stack.push(Value::long(1))?;
        stack.push(Value::int(0))?;
        let error = stack
            .push(Value::int(0))
            .expect_err("Pushing onto a full stack did not error");
        assert_eq!(error, Error::OperandStackOverflow {
            requested: 4,
            limit:     3,
        });

        Ok(())
    }

    #[test]
    fn wide_values_take_two_slots() -> anyhow::Result<()> {
        let mut stack = OperandStack::new(4);
        stack.push(Value::double(1.0))?;
        stack.push(Value::int(1))?;
        assert_eq!((stack.size(), stack.slots()), (2, 3));
        stack.pop()?;
        assert_eq!(stack.slots(), 2);

        Ok(())
    }

    #[test]
    fn cannot_pop_item_when_empty() {
        let mut stack = OperandStack::default();
        let error = stack.pop().expect_err("Did not error when popping empty stack");
        assert_eq!(error, Error::OperandStackUnderflow);
    }

    #[test]
    fn can_read_item_at_depth() -> anyhow::Result<()> {
        let stack = new_stack_with_items(10)?;
        assert_eq!(stack.read(7)?, &Value::int(2));
        stack
            .read(10)
            .expect_err("Read an item at a depth that doesn't exist");

        Ok(())
    }

    #[test]
    fn pop_many_returns_deepest_first() -> anyhow::Result<()> {
        let mut stack = new_stack_with_items(4)?;
        let values = stack.pop_many(2)?;
        assert_eq!(values, vec![Value::int(2), Value::int(3)]);
        assert_eq!(stack.size(), 2);

        stack.pop_many(3).expect_err("Popped more items than exist");
        assert_eq!(stack.size(), 2);

        Ok(())
    }

    #[test]
    fn can_replace_items() -> anyhow::Result<()> {
        let mut stack = new_stack_with_items(3)?;
        stack.replace(1, Value::long(9))?;
        assert_eq!(stack.read(1)?, &Value::long(9));
        assert_eq!(stack.slots(), 4);

        Ok(())
    }
}
