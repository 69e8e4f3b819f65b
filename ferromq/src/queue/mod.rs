pub mod consumer;
pub mod delivery;
pub mod entry;
pub mod handler;
pub mod list;
pub mod manager;
pub(crate) mod tx;

use std::time::Duration;

/// Ordering policy of a queue, it selects the entry list implementation the
/// queue owns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderingPolicy {
    /// Insertion order is delivery order.
    Fifo,
    /// Higher message priority delivers first, FIFO within a priority level.
    Priority,
    /// Total order by the value of a message property.
    SortedBy { property: String },
    /// Last-value queue, a newer message for the same key supersedes the
    /// undelivered older one.
    Conflating { key: String },
}

/// Flow control and redelivery thresholds of one queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueLimits {
    /// Producer-side flow control engages when depth reaches this count.
    pub high_watermark_count: usize,
    /// Flow control releases when depth falls back to this count.
    pub low_watermark_count: usize,
    pub high_watermark_bytes: u64,
    pub low_watermark_bytes: u64,
    /// Requeues past this count dead-letter the entry instead.
    pub max_redeliveries: u32,
    /// Queue level TTL, overridden by a per-message TTL.
    pub default_ttl: Option<Duration>,
}

impl Default for QueueLimits {
    fn default() -> QueueLimits {
        QueueLimits {
            high_watermark_count: 10_000,
            low_watermark_count: 8_000,
            high_watermark_bytes: 64 * 1024 * 1024,
            low_watermark_bytes: 48 * 1024 * 1024,
            max_redeliveries: 3,
            default_ttl: None,
        }
    }
}

/// Representation of a queue.
#[derive(Clone, Debug)]
pub struct Queue {
    /// The name aka the identifier of the queue.
    pub name: String,
    pub policy: OrderingPolicy,
    /// Durable queues report enqueued and dequeued entries to the store.
    pub durable: bool,
    /// Queue is deleted when all consumers cancelled on it.
    pub auto_delete: bool,
    pub limits: QueueLimits,
}

impl Default for Queue {
    fn default() -> Queue {
        Queue {
            name: "default".to_string(),
            policy: OrderingPolicy::Fifo,
            durable: false,
            auto_delete: false,
            limits: QueueLimits::default(),
        }
    }
}
