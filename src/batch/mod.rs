//! Batch session bookkeeping for multi-file ingestion.
//!
//! The controller owns the queue and a cursor. Advancing is a two-step
//! handshake: a save arms the advance, and `advance` consumes it. This
//! keeps a retried save from skipping items and makes stray advance
//! calls harmless.

use crate::model::RawInput;

pub struct BatchController {
    inputs: Vec<RawInput>,
    current_index: usize,
    saved_count: usize,
    advance_armed: bool,
}

impl BatchController {
    pub fn new(inputs: Vec<RawInput>) -> Self {
        Self {
            inputs,
            current_index: 0,
            saved_count: 0,
            advance_armed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// The item under the cursor, if the queue is not exhausted.
    pub fn current(&self) -> Option<&RawInput> {
        if self.is_exhausted() {
            None
        } else {
            self.inputs.get(self.current_index)
        }
    }

    /// Zero-based position of the cursor, clamped to the queue length.
    pub fn position(&self) -> usize {
        self.current_index
    }

    pub fn saved_count(&self) -> usize {
        self.saved_count
    }

    /// Items not yet passed by the cursor, including the current one.
    pub fn remaining(&self) -> usize {
        self.inputs.len().saturating_sub(self.current_index)
    }

    pub fn is_exhausted(&self) -> bool {
        self.current_index >= self.inputs.len()
    }

    /// Record a successful save of the current item and arm the advance.
    /// Calling this twice without advancing counts one save only.
    pub fn mark_saved(&mut self) {
        if !self.advance_armed && !self.is_exhausted() {
            self.saved_count += 1;
            self.advance_armed = true;
        }
    }

    /// Move the cursor to the next item. A no-op unless a save armed it,
    /// so repeated calls cannot skip items.
    ///
    /// Returns the new current item, or `None` when the queue is done.
    pub fn advance(&mut self) -> Option<&RawInput> {
        if !self.advance_armed {
            return self.current();
        }
        self.advance_armed = false;
        self.current_index += 1;
        self.current()
    }
}
