//! A queue entry wraps one message together with its delivery state. The
//! state machine is `Available -> Acquired -> {Dequeued, requeue back to
//! Available}`, with `Expired`, `Superseded` and `DeadLettered` as terminal
//! states. Terminal entries are removed from the entry list right after the
//! transition, so a list only ever holds available and acquired entries.
use crate::message::Message;
use std::sync::Arc;
use std::time::Instant;

/// Monotonic per-queue sequence number, assigned at enqueue. It is the
/// tie-break of every ordering policy and identifies the entry in the list.
pub type SequenceNo = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryState {
    Available,
    Acquired,
    Dequeued,
    Expired,
    Superseded,
    DeadLettered,
}

/// Outcome of an acquisition attempt. Losing the race is the expected,
/// high-frequency outcome under competing deliveries, not an error.
#[derive(Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired,
    RaceLost,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RequeueOutcome {
    Requeued,
    DeadLettered,
}

#[derive(Debug)]
pub struct QueueEntry {
    pub sequence: SequenceNo,
    pub message: Arc<Message>,
    state: EntryState,
    redelivery_count: u32,
    acquired_by: Option<String>,
    expires_at: Option<Instant>,
}

impl QueueEntry {
    pub fn new(sequence: SequenceNo, message: Arc<Message>, expires_at: Option<Instant>) -> QueueEntry {
        QueueEntry {
            sequence,
            message,
            state: EntryState::Available,
            redelivery_count: 0,
            acquired_by: None,
            expires_at,
        }
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    pub fn is_available(&self) -> bool {
        self.state == EntryState::Available
    }

    pub fn is_acquired_by(&self, consumer_tag: &str) -> bool {
        self.state == EntryState::Acquired && self.acquired_by.as_deref() == Some(consumer_tag)
    }

    pub fn redelivery_count(&self) -> u32 {
        self.redelivery_count
    }

    pub fn redelivered(&self) -> bool {
        self.redelivery_count > 0
    }

    pub fn byte_size(&self) -> u64 {
        self.message.body_size()
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }

    /// The exclusive claim a consumer takes before delivery. Exactly one
    /// attempt succeeds per available entry, every competing attempt loses
    /// the race and moves on to another candidate.
    pub fn try_acquire(&mut self, consumer_tag: &str) -> AcquireOutcome {
        if self.state == EntryState::Available {
            self.state = EntryState::Acquired;
            self.acquired_by = Some(consumer_tag.to_owned());

            AcquireOutcome::Acquired
        } else {
            AcquireOutcome::RaceLost
        }
    }

    /// Consumer acknowledgement, the entry becomes eligible for removal.
    pub fn ack(&mut self) -> bool {
        if self.state == EntryState::Acquired {
            self.state = EntryState::Dequeued;
            self.acquired_by = None;

            true
        } else {
            false
        }
    }

    /// Puts an acquired entry back without counting a redelivery. Used when
    /// the delivery never reached the consumer, e.g. its sink went away
    /// between acquisition and send.
    pub fn release(&mut self) {
        if self.state == EntryState::Acquired {
            self.state = EntryState::Available;
            self.acquired_by = None;
        }
    }

    /// Explicit reject or consumer disconnect. The entry
    /// returns to available with the redelivery count incremented, or is
    /// dead-lettered once the count would exceed `max_redeliveries`.
    pub fn requeue(&mut self, max_redeliveries: u32) -> RequeueOutcome {
        debug_assert_eq!(self.state, EntryState::Acquired);

        self.acquired_by = None;

        if self.redelivery_count >= max_redeliveries {
            self.state = EntryState::DeadLettered;

            RequeueOutcome::DeadLettered
        } else {
            self.redelivery_count += 1;
            self.state = EntryState::Available;

            RequeueOutcome::Requeued
        }
    }

    /// Terminal outcome of a reject without requeue. The redelivery-limit
    /// breach goes through [`QueueEntry::requeue`] instead.
    pub fn dead_letter(&mut self) -> bool {
        if self.state == EntryState::Acquired {
            self.state = EntryState::DeadLettered;
            self.acquired_by = None;

            true
        } else {
            false
        }
    }

    /// TTL expiry, reachable from available only. Acquired entries finish
    /// their delivery cycle and settle via ack or requeue.
    pub fn expire(&mut self) -> bool {
        if self.state == EntryState::Available {
            self.state = EntryState::Expired;

            true
        } else {
            false
        }
    }

    /// Conflation supersession by a newer entry with the same key, reachable
    /// from available only.
    pub fn supersede(&mut self) -> bool {
        if self.state == EntryState::Available {
            self.state = EntryState::Superseded;

            true
        } else {
            false
        }
    }
}
