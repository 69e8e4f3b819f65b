//! Outbound collaborator hooks. Durable queues report enqueued and dequeued
//! entries to a [`QueueStore`] synchronously inside the publish and ack paths
//! so persistence and in-memory state never diverge in observable order.
//! Dead-lettered messages leave the core through a [`DeadLetterSink`] towards
//! the routing collaborator.
use crate::message::Message;
use crate::queue::entry::SequenceNo;
use crate::Result;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Persistence collaborator of a durable queue.
///
/// A failure fails the single enqueue or ack operation which triggered the
/// call, it is surfaced to the caller and never swallowed.
pub trait QueueStore: Send + Sync {
    fn entry_enqueued(&mut self, queue: &str, sequence: SequenceNo, message: &Message) -> Result<()>;

    fn entry_dequeued(&mut self, queue: &str, sequence: SequenceNo) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterReason {
    RedeliveryLimitExceeded,
    Rejected,
}

/// A message which left the queue without successful delivery and is handed
/// over to the routing collaborator.
#[derive(Debug)]
pub struct DeadLetter {
    pub queue: String,
    pub sequence: SequenceNo,
    pub redelivery_count: u32,
    pub reason: DeadLetterReason,
    pub message: Arc<Message>,
}

pub type DeadLetterSink = mpsc::Sender<DeadLetter>;
