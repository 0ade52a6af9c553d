//! Recording buffer shared between the capture callback and the session
//!
//! The capture side only ever holds a [`Sender`]; records reach the ordered
//! `Vec` when the owning context drains the channel, so there is exactly one
//! writer of the sequence itself.

use crate::events::EventRecord;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;

pub struct RecordingBuffer {
    records: Vec<EventRecord>,
    tx: Sender<EventRecord>,
    rx: Receiver<EventRecord>,
}

impl RecordingBuffer {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { records: Vec::new(), tx, rx }
    }

    /// Drop every record and detach any producer still holding the old sender
    pub fn clear(&mut self) {
        self.records.clear();
        let (tx, rx) = unbounded();
        self.tx = tx;
        self.rx = rx;
    }

    /// Producer handle for the capture callback
    pub fn sender(&self) -> Sender<EventRecord> {
        self.tx.clone()
    }

    /// Move handed-off records into the sequence, in arrival order
    pub fn drain(&mut self) -> usize {
        let before = self.records.len();
        self.records.extend(self.rx.try_iter());
        self.records.len() - before
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Immutable copy for a replay worker
    pub fn snapshot(&self) -> Arc<[EventRecord]> {
        Arc::from(self.records.as_slice())
    }
}

impl Default for RecordingBuffer {
    fn default() -> Self {
        Self::new()
    }
}
