use crate::message::PropertyValue;
use crate::queue::entry::{QueueEntry, SequenceNo};
use crate::queue::list::{EntryList, InsertOutcome};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

/// Last-value queue. At most one entry per conflation key is visible at a
/// time: inserting a newer entry for a key supersedes the still-available
/// older one before the new entry becomes visible. An older entry already
/// acquired completes its in-flight ack cycle untouched, the supersession
/// only affects future availability.
///
/// Messages without the key are not conflated and behave FIFO.
pub struct ConflatingList {
    key_property: String,
    entries: BTreeMap<SequenceNo, QueueEntry>,
    latest: HashMap<PropertyValue, SequenceNo>,
    byte_size: u64,
}

impl ConflatingList {
    pub fn new(key_property: &str) -> ConflatingList {
        ConflatingList {
            key_property: key_property.to_owned(),
            entries: BTreeMap::new(),
            latest: HashMap::new(),
            byte_size: 0,
        }
    }

    fn conflation_key(&self, entry: &QueueEntry) -> Option<PropertyValue> {
        entry.message.property(&self.key_property).cloned()
    }
}

impl EntryList for ConflatingList {
    fn insert(&mut self, entry: QueueEntry) -> InsertOutcome {
        let mut superseded = None;

        if let Some(key) = self.conflation_key(&entry) {
            if let Some(prior_seq) = self.latest.get(&key).copied() {
                // an acquired prior entry finishes its delivery cycle, only
                // an available one is superseded
                let marked = match self.entries.get_mut(&prior_seq) {
                    Some(prior) => prior.supersede(),
                    None => false,
                };

                if marked {
                    if let Some(removed) = self.entries.remove(&prior_seq) {
                        self.byte_size -= removed.byte_size();
                        superseded = Some(removed);
                    }
                }
            }

            self.latest.insert(key, entry.sequence);
        }

        self.byte_size += entry.byte_size();
        self.entries.insert(entry.sequence, entry);

        InsertOutcome {
            position: self.entries.len() - 1,
            superseded,
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

            if let Some(key) = self.conflation_key(e) {
                // drop the key mapping only when it still points at this entry
                if self.latest.get(&key) == Some(&sequence) {
                    self.latest.remove(&key);
                }
            }
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
