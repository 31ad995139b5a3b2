//! Frame-indexed stack shared by operands and pending instructions
//!
//! A `FrameStack` is a flat vector plus a stack of frame-start indices.
//! Indices are absolute: `cur_top_idx()` is the index the next push lands
//! at, and stays meaningful for the lifetime of the stack, which is what lets
//! continuations name a resume point with a plain `usize`.
//!
//! ## Layout Example
//!
//! ```text
//! items:       [a][b] | [c][d][e] | [f]
//! frame_bases:         2           5
//! ```
//!
//! `pop_frame_all_values` on the stack above returns `[f]` and leaves
//! `frame_bases = [2]`.

use crate::value::RuntimeError;

/// A LIFO of `T` partitioned into frames
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStack<T> {
    items: Vec<T>,
    frame_bases: Vec<usize>,
}

impl<T> Default for FrameStack<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            frame_bases: Vec::new(),
        }
    }
}

impl<T: Clone> FrameStack<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a value on top of the current frame
    pub fn push_value(&mut self, value: T) {
        self.items.push(value);
    }

    /// Pop the top value of the current frame
    ///
    /// Popping never crosses into an enclosing frame; an empty frame is a
    /// stack underflow.
    pub fn pop_value(&mut self) -> Result<T, RuntimeError> {
        if self.items.len() <= self.current_base() {
            return Err(RuntimeError::StackUnderflow);
        }
        self.items.pop().ok_or(RuntimeError::StackUnderflow)
    }

    pub fn peek_top(&self) -> Option<&T> {
        self.items.last()
    }

    /// Open a new frame at the current top
    pub fn push_frame(&mut self) {
        self.frame_bases.push(self.items.len());
    }

    /// Pop every value of the latest frame and close it
    ///
    /// Values come back in push order.
    pub fn pop_frame_all_values(&mut self) -> Result<Vec<T>, RuntimeError> {
        let base = self.frame_bases.pop().ok_or(RuntimeError::StackUnderflow)?;
        if base > self.items.len() {
            return Err(RuntimeError::StackUnderflow);
        }
        Ok(self.items.split_off(base))
    }

    /// Pop every value of the latest frame, then reopen an empty frame at the
    /// same base
    pub fn peek_and_clear_frame_all_values(&mut self) -> Result<Vec<T>, RuntimeError> {
        let values = self.pop_frame_all_values()?;
        self.push_frame();
        Ok(values)
    }

    /// Close the latest frame keeping only its last value
    ///
    /// Returns `false` when the frame was empty and nothing was re-pushed.
    pub fn pop_frame_and_push_top_val(&mut self) -> Result<bool, RuntimeError> {
        let mut values = self.pop_frame_all_values()?;
        match values.pop() {
            Some(top) => {
                self.items.push(top);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Truncate to an absolute index, discarding frames opened above it
    pub fn jump_to(&mut self, index: usize) -> Result<(), RuntimeError> {
        if index > self.items.len() {
            return Err(RuntimeError::StackUnderflow);
        }
        self.items.truncate(index);
        while self.frame_bases.last().is_some_and(|&base| base > index) {
            self.frame_bases.pop();
        }
        Ok(())
    }

    /// Deep copy of the whole stack
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Deep copy truncated to an absolute index
    pub fn snapshot_to(&self, index: usize) -> Self {
        let index = index.min(self.items.len());
        Self {
            items: self.items[..index].to_vec(),
            frame_bases: self
                .frame_bases
                .iter()
                .copied()
                .filter(|&base| base <= index)
                .collect(),
        }
    }

    /// Replace this stack's contents with a copy of `other`
    pub fn restore(&mut self, other: &Self) {
        self.items.clone_from(&other.items);
        self.frame_bases.clone_from(&other.frame_bases);
    }

    /// Absolute index of the next push
    pub fn cur_top_idx(&self) -> usize {
        self.items.len()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of open frames
    pub fn frame_depth(&self) -> usize {
        self.frame_bases.len()
    }

    /// Number of values in the latest frame (the whole stack if none is open)
    pub fn frame_len(&self) -> usize {
        self.items.len() - self.current_base().min(self.items.len())
    }

    /// Items from the bottom up
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.items.iter()
    }

    fn current_base(&self) -> usize {
        self.frame_bases.last().copied().unwrap_or(0)
    }
}
