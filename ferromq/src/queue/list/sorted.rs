use crate::message::PropertyValue;
use crate::queue::entry::{QueueEntry, SequenceNo};
use crate::queue::list::{EntryList, InsertOutcome};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

/// Key of the sorted map: the configured property value first, the sequence
/// number as tie-break among equal keys. Entries without the property sort
/// before all valued keys.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct SortKey {
    key: Option<PropertyValue>,
    sequence: SequenceNo,
}

/// List ordered by the value of a configured message property. Insertion
/// locates the ordinal position in the current contents, which is why sorted
/// queues serialize their enqueues on the owning queue task.
pub struct SortedList {
    property: String,
    entries: BTreeMap<SortKey, QueueEntry>,
    key_of: HashMap<SequenceNo, SortKey>,
    byte_size: u64,
}

impl SortedList {
    pub fn new(property: &str) -> SortedList {
        SortedList {
            property: property.to_owned(),
            entries: BTreeMap::new(),
            key_of: HashMap::new(),
            byte_size: 0,
        }
    }

    fn sort_key(&self, entry: &QueueEntry) -> SortKey {
        SortKey {
            key: entry.message.property(&self.property).cloned(),
            sequence: entry.sequence,
        }
    }
}

impl EntryList for SortedList {
    fn insert(&mut self, entry: QueueEntry) -> InsertOutcome {
        let key = self.sort_key(&entry);
        let position = self.entries.range(..key.clone()).count();

        self.byte_size += entry.byte_size();
        self.key_of.insert(entry.sequence, key.clone());
        self.entries.insert(key, entry);

        InsertOutcome {
            position,
            superseded: None,
        }
    }

    fn next_available(&self, after: Option<SequenceNo>) -> Option<SequenceNo> {
        let range = match after {
            None => self.entries.range(..),
            Some(seq) => {
                let key = self.key_of.get(&seq)?;

                self.entries.range((Bound::Excluded(key.clone()), Bound::Unbounded))
            }
        };

        range
            .filter(|(_, e)| e.is_available())
            .map(|(_, e)| e.sequence)
            .next()
    }

    fn entry(&self, sequence: SequenceNo) -> Option<&QueueEntry> {
        let key = self.key_of.get(&sequence)?;

        self.entries.get(key)
    }

    fn entry_mut(&mut self, sequence: SequenceNo) -> Option<&mut QueueEntry> {
        let key = self.key_of.get(&sequence)?;

        self.entries.get_mut(key)
    }

    fn remove(&mut self, sequence: SequenceNo) -> Option<QueueEntry> {
        let key = self.key_of.remove(&sequence)?;
        let removed = self.entries.remove(&key);

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
        self.entries.values().map(|e| e.sequence).collect()
    }
}
