//! A consumer is one subscription on a queue, modeled as plain data: an
//! acquisition mode, an optional filter predicate, a credit counter and the
//! delivery sink of the protocol/session layer.
use crate::message::Message;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Selector predicate of a subscription. Rejecting a message advances the
/// delivery scan to the next candidate without consuming credit.
pub type FilterPredicate = Box<dyn Fn(&Message) -> bool + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquisitionMode {
    Shared,
    /// The only consumer ever matched by the queue while registered.
    Exclusive,
}

/// A message handed to a consumer, pushed into its delivery sink.
#[derive(Debug)]
pub struct Delivery {
    pub consumer_tag: String,
    /// Channel of the subscription, the protocol layer routes the frame by it.
    pub channel: u16,
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub message: Arc<Message>,
}

pub type DeliverySink = mpsc::Sender<Delivery>;

/// Registration request of the protocol/session layer. An empty consumer tag
/// asks the queue to generate one.
pub struct ConsumerSpec {
    pub consumer_tag: String,
    pub channel: u16,
    pub mode: AcquisitionMode,
    /// Consumer doesn't ack, sent-out messages are dequeued promptly.
    pub no_ack: bool,
    /// Initial credit aka prefetch window.
    pub credit: u32,
    pub filter: Option<FilterPredicate>,
    pub sink: DeliverySink,
}

impl fmt::Debug for ConsumerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerSpec")
            .field("consumer_tag", &self.consumer_tag)
            .field("channel", &self.channel)
            .field("mode", &self.mode)
            .field("no_ack", &self.no_ack)
            .field("credit", &self.credit)
            .field("filter", &self.filter.as_ref().map(|_| "<predicate>"))
            .finish()
    }
}

pub(crate) struct Consumer {
    /// Consumer tag, identifies the consumer
    pub consumer_tag: String,
    /// The channel the consumer uses
    pub channel: u16,
    pub mode: AcquisitionMode,
    pub no_ack: bool,
    pub filter: Option<FilterPredicate>,
    /// Remaining credit, decremented on delivery, restored on settle
    pub credit: u32,
    pub suspended: bool,
    /// Consumer network socket abstraction
    pub sink: DeliverySink,
    /// The next delivery tag it needs to send out
    pub delivery_tag_counter: u64,
}

impl Consumer {
    pub fn from_spec(spec: ConsumerSpec) -> Consumer {
        Consumer {
            consumer_tag: spec.consumer_tag,
            channel: spec.channel,
            mode: spec.mode,
            no_ack: spec.no_ack,
            filter: spec.filter,
            credit: spec.credit,
            suspended: false,
            sink: spec.sink,
            delivery_tag_counter: 1u64,
        }
    }

    /// Whether the consumer can take another delivery at all. No-ack
    /// consumers are not limited by credit.
    pub fn is_eligible(&self) -> bool {
        !self.suspended && (self.no_ack || self.credit > 0)
    }

    pub fn accepts(&self, message: &Message) -> bool {
        match &self.filter {
            Some(predicate) => predicate(message),
            None => true,
        }
    }

    pub fn next_delivery_tag(&mut self) -> u64 {
        let tag = self.delivery_tag_counter;
        self.delivery_tag_counter += 1;

        tag
    }
}
