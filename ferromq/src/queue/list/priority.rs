use crate::queue::entry::{QueueEntry, SequenceNo};
use crate::queue::list::{EntryList, InsertOutcome};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

pub const PRIORITY_LEVELS: u8 = 10;
const DEFAULT_PRIORITY: u8 = 4;

/// Priority list bucketed by the message priority. The highest non-empty
/// bucket delivers first, FIFO within a bucket with the sequence number as
/// tie-break. Messages without a priority land on the default level.
pub struct PriorityList {
    buckets: Vec<BTreeMap<SequenceNo, QueueEntry>>,
    bucket_of: HashMap<SequenceNo, u8>,
    byte_size: u64,
    len: usize,
}

impl PriorityList {
    pub fn new() -> PriorityList {
        PriorityList {
            buckets: (0..PRIORITY_LEVELS).map(|_| BTreeMap::new()).collect(),
            bucket_of: HashMap::new(),
            byte_size: 0,
            len: 0,
        }
    }

    fn bucket_index(entry: &QueueEntry) -> u8 {
        entry.message.priority.unwrap_or(DEFAULT_PRIORITY).min(PRIORITY_LEVELS - 1)
    }
}

impl Default for PriorityList {
    fn default() -> Self {
        Self::new()
    }
}

impl EntryList for PriorityList {
    fn insert(&mut self, entry: QueueEntry) -> InsertOutcome {
        let bucket = Self::bucket_index(&entry);
        let seq = entry.sequence;

        // ordinal position: everything in higher buckets plus the earlier
        // part of the own bucket
        let position = self.buckets[bucket as usize + 1..].iter().map(|b| b.len()).sum::<usize>()
            + self.buckets[bucket as usize].range(..seq).count();

        self.byte_size += entry.byte_size();
        self.len += 1;
        self.bucket_of.insert(seq, bucket);
        self.buckets[bucket as usize].insert(seq, entry);

        InsertOutcome {
            position,
            superseded: None,
        }
    }

    fn next_available(&self, after: Option<SequenceNo>) -> Option<SequenceNo> {
        let (start_bucket, skip_until) = match after {
            None => (PRIORITY_LEVELS - 1, None),
            Some(seq) => (*self.bucket_of.get(&seq)?, Some(seq)),
        };

        for bucket in (0..=start_bucket).rev() {
            let range = match skip_until {
                Some(seq) if bucket == start_bucket => {
                    self.buckets[bucket as usize].range((Bound::Excluded(seq), Bound::Unbounded))
                }
                _ => self.buckets[bucket as usize].range(..),
            };

            if let Some(seq) = range.filter(|(_, e)| e.is_available()).map(|(seq, _)| *seq).next() {
                return Some(seq);
            }
        }

        None
    }

    fn entry(&self, sequence: SequenceNo) -> Option<&QueueEntry> {
        let bucket = self.bucket_of.get(&sequence)?;

        self.buckets[*bucket as usize].get(&sequence)
    }

    fn entry_mut(&mut self, sequence: SequenceNo) -> Option<&mut QueueEntry> {
        let bucket = self.bucket_of.get(&sequence)?;

        self.buckets[*bucket as usize].get_mut(&sequence)
    }

    fn remove(&mut self, sequence: SequenceNo) -> Option<QueueEntry> {
        let bucket = self.bucket_of.remove(&sequence)?;
        let removed = self.buckets[bucket as usize].remove(&sequence);

        if let Some(e) = &removed {
            self.byte_size -= e.byte_size();
            self.len -= 1;
        }

        removed
    }

    fn len(&self) -> usize {
        self.len
    }

    fn byte_size(&self) -> u64 {
        self.byte_size
    }

    fn sequences(&self) -> Vec<SequenceNo> {
        self.buckets
            .iter()
            .rev()
            .flat_map(|bucket| bucket.keys().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::tests::message_with_priority;
    use crate::queue::list::tests::{drain_in_order, entry_of};

    #[test]
    fn higher_priority_delivers_first_sequence_breaks_ties() {
        let mut list = PriorityList::new();

        list.insert(entry_of(1, message_with_priority("first-5", 5)));
        list.insert(entry_of(2, message_with_priority("the-1", 1)));
        list.insert(entry_of(3, message_with_priority("third-5", 5)));

        assert_eq!(drain_in_order(&mut list), vec!["first-5", "third-5", "the-1"]);
    }

    #[test]
    fn priority_above_the_top_level_is_clamped() {
        let mut list = PriorityList::new();

        list.insert(entry_of(1, message_with_priority("nine", 9)));
        list.insert(entry_of(2, message_with_priority("clamped", 200)));

        // both land on level 9, FIFO among them
        assert_eq!(drain_in_order(&mut list), vec!["nine", "clamped"]);
    }

    #[test]
    fn cursor_continues_across_buckets() {
        let mut list = PriorityList::new();

        list.insert(entry_of(1, message_with_priority("low", 1)));
        list.insert(entry_of(2, message_with_priority("high", 8)));

        let first = list.next_available(None).unwrap();
        assert_eq!(first, 2);

        let second = list.next_available(Some(first)).unwrap();
        assert_eq!(second, 1);

        assert_eq!(list.next_available(Some(second)), None);
    }

    #[test]
    fn insert_reports_the_ordinal_position() {
        let mut list = PriorityList::new();

        assert_eq!(list.insert(entry_of(1, message_with_priority("a", 5))).position, 0);
        // lower priority goes after the existing entry
        assert_eq!(list.insert(entry_of(2, message_with_priority("b", 1))).position, 1);
        // higher priority goes to the front
        assert_eq!(list.insert(entry_of(3, message_with_priority("c", 9))).position, 0);
    }
}
