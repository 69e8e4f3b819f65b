//! Ordered entry containers, one per ordering policy. The queue and the
//! delivery coordinator stay policy-agnostic behind the [`EntryList`] trait;
//! only the list implementation changes per queue type.
//!
//! Depth counters are maintained inside insert and remove only, there is no
//! separate counter update path which could drift from the content.
mod conflating;
mod fifo;
mod priority;
mod sorted;

pub use conflating::ConflatingList;
pub use fifo::FifoList;
pub use priority::PriorityList;
pub use sorted::SortedList;

use crate::queue::entry::{QueueEntry, SequenceNo};
use crate::queue::OrderingPolicy;

/// Result of an insertion: the ordinal position the entry landed on, and for
/// conflating lists the entry the insertion superseded, already marked and
/// unlinked.
#[derive(Debug)]
pub struct InsertOutcome {
    pub position: usize,
    pub superseded: Option<QueueEntry>,
}

/// Ordering-policy seam of a queue.
///
/// The list is exclusively owned by its queue task, which is the per-queue
/// serialization boundary. Position-dependent insertion (sorted lists) relies
/// on that single ownership instead of a dedicated enqueue lock.
pub trait EntryList: Send {
    fn insert(&mut self, entry: QueueEntry) -> InsertOutcome;

    /// Next available entry in policy order, strictly after the entry
    /// `after` refers to. `None` cursor starts from the head. Used by the
    /// delivery coordinator to walk candidates while consumers reject them.
    fn next_available(&self, after: Option<SequenceNo>) -> Option<SequenceNo>;

    fn entry(&self, sequence: SequenceNo) -> Option<&QueueEntry>;

    fn entry_mut(&mut self, sequence: SequenceNo) -> Option<&mut QueueEntry>;

    fn remove(&mut self, sequence: SequenceNo) -> Option<QueueEntry>;

    /// Number of entries in the list, available and acquired ones.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of the body sizes of the contained entries.
    fn byte_size(&self) -> u64;

    /// Sequence numbers in policy order, used by expiry sweeps and purge.
    fn sequences(&self) -> Vec<SequenceNo>;
}

/// Constructs the entry list variant for the queue's configured policy.
pub fn for_policy(policy: &OrderingPolicy) -> Box<dyn EntryList> {
    match policy {
        OrderingPolicy::Fifo => Box::new(FifoList::new()),
        OrderingPolicy::Priority => Box::new(PriorityList::new()),
        OrderingPolicy::SortedBy { property } => Box::new(SortedList::new(property)),
        OrderingPolicy::Conflating { key } => Box::new(ConflatingList::new(key)),
    }
}
