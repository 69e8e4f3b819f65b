use crate::queue::entry::{QueueEntry, SequenceNo};
use crate::queue::list::{EntryList, InsertOutcome};
use std::collections::BTreeMap;
use std::ops::Bound;

/// Strict FIFO list, delivery order equals insertion order. Sequence numbers
/// are monotonic so the seq-keyed map iterates in insertion order.
pub struct FifoList {
    entries: BTreeMap<SequenceNo, QueueEntry>,
    byte_size: u64,
}

impl FifoList {
    pub fn new() -> FifoList {
        FifoList {
            entries: BTreeMap::new(),
            byte_size: 0,
        }
    }
}

impl Default for FifoList {
    fn default() -> Self {
        Self::new()
    }
}

impl EntryList for FifoList {
    fn insert(&mut self, entry: QueueEntry) -> InsertOutcome {
        self.byte_size += entry.byte_size();
        self.entries.insert(entry.sequence, entry);

        InsertOutcome {
            position: self.entries.len() - 1,
            superseded: None,
        }
    }

    fn next_available(&self, after: Option<SequenceNo>) -> Option<SequenceNo> {
        let range = match after {
            None => self.entries.range(..),
            Some(seq) => self.entries.range((Bound::Excluded(seq), Bound::Unbounded)),
        };

        range.filter(|(_, e)| e.is_available()).map(|(seq, _)| *seq).next()
    }

    fn entry(&self, sequence: SequenceNo) -> Option<&QueueEntry> {
        self.entries.get(&sequence)
    }

    fn entry_mut(&mut self, sequence: SequenceNo) -> Option<&mut QueueEntry> {
        self.entries.get_mut(&sequence)
    }

    fn remove(&mut self, sequence: SequenceNo) -> Option<QueueEntry> {
        let removed = self.entries.remove(&sequence);

        if let Some(e) = &removed {
            self.byte_size -= e.byte_size();
        }

        removed
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn byte_size(&self) -> u64 {
        self.byte_size
    }

    fn sequences(&self) -> Vec<SequenceNo> {
        self.entries.keys().copied().collect()
    }
}
