//! Consumer matching. The coordinator walks the entry list in policy order
//! and selects the receiving consumer round-robin. Round-robin runs across
//! consumers, not across entries: the list order still decides which entry is
//! offered first, the rotation only balances subscriptions sharing the queue.
use crate::message::Message;
use crate::queue::consumer::{AcquisitionMode, Consumer, Delivery};
use crate::queue::entry::{AcquireOutcome, SequenceNo};
use crate::queue::handler::Tag;
use crate::send;
use log::{error, trace};
use std::time::Instant;

/// A successful hand-over to a consumer sink.
#[derive(Debug)]
pub(crate) struct Delivered {
    pub sequence: SequenceNo,
    pub tag: Tag,
    pub no_ack: bool,
}

/// One step of the delivery walk.
#[derive(Debug)]
pub(crate) enum DeliveryRound {
    Delivered(Delivered),
    /// A candidate hit its TTL during the scan; already marked and removed.
    Expired(SequenceNo),
    /// A consumer sink went away, the consumer is gone and its acquired
    /// entry was released. The queue has to requeue its other unacked ones.
    ConsumerFailed(String),
    /// Nothing deliverable: no eligible consumer, or every eligible filter
    /// rejected every available entry.
    Idle,
}

enum Selection {
    Consumer(usize),
    NoneEligible,
    AllRejected,
}

pub(crate) struct DeliveryCoordinator {
    consumers: Vec<Consumer>,
    next_consumer: usize,
}

impl DeliveryCoordinator {
    pub fn new() -> DeliveryCoordinator {
        DeliveryCoordinator {
            consumers: vec![],
            next_consumer: 0,
        }
    }

    pub fn register(&mut self, consumer: Consumer) {
        self.consumers.push(consumer);
    }

    pub fn cancel(&mut self, consumer_tag: &str) -> Option<Consumer> {
        let p = self.consumers.iter().position(|c| c.consumer_tag == consumer_tag)?;
        self.next_consumer = 0;

        Some(self.consumers.remove(p))
    }

    pub fn get_mut(&mut self, consumer_tag: &str) -> Option<&mut Consumer> {
        self.consumers.iter_mut().find(|c| c.consumer_tag == consumer_tag)
    }

    pub fn has_consumers(&self) -> bool {
        !self.consumers.is_empty()
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    pub fn has_exclusive(&self) -> bool {
        self.consumers.iter().any(|c| c.mode == AcquisitionMode::Exclusive)
    }

    /// Restores one credit after a delivery settled via ack or reject.
    pub fn restore_credit(&mut self, consumer_tag: &str) {
        if let Some(c) = self.get_mut(consumer_tag) {
            if !c.no_ack {
                c.credit += 1;
            }
        }
    }

    /// Picks the consumer for the candidate message, or reports why none
    /// took it. An exclusive consumer bypasses the round-robin, all entries
    /// are offered to it only.
    fn select(&self, message: &Message) -> Selection {
        if let Some(p) = self.consumers.iter().position(|c| c.mode == AcquisitionMode::Exclusive) {
            let c = &self.consumers[p];

            return match (c.is_eligible(), c.accepts(message)) {
                (false, _) => Selection::NoneEligible,
                (true, false) => Selection::AllRejected,
                (true, true) => Selection::Consumer(p),
            };
        }

        let mut any_eligible = false;

        for offset in 0..self.consumers.len() {
            let p = (self.next_consumer + offset) % self.consumers.len();
            let c = &self.consumers[p];

            if !c.is_eligible() {
                continue;
            }

            any_eligible = true;

            if c.accepts(message) {
                return Selection::Consumer(p);
            }
        }

        if any_eligible {
            Selection::AllRejected
        } else {
            Selection::NoneEligible
        }
    }

    /// Delivers at most one entry. Walks available candidates in list order;
    /// a candidate is passed over only when it expired or when every
    /// currently eligible consumer's filter rejected it, which keeps the
    /// ordering guarantee.
    pub async fn deliver_next(&mut self, list: &mut dyn crate::queue::list::EntryList, now: Instant) -> DeliveryRound {
        if self.consumers.is_empty() {
            return DeliveryRound::Idle;
        }

        let mut cursor = None;

        loop {
            let seq = match list.next_available(cursor) {
                Some(seq) => seq,
                None => return DeliveryRound::Idle,
            };

            let message = match list.entry(seq) {
                Some(e) if e.is_expired(now) => {
                    if let Some(e) = list.entry_mut(seq) {
                        e.expire();
                    }
                    list.remove(seq);

                    return DeliveryRound::Expired(seq);
                }
                Some(e) => e.message.clone(),
                None => return DeliveryRound::Idle,
            };

            let p = match self.select(&message) {
                Selection::NoneEligible => return DeliveryRound::Idle,
                Selection::AllRejected => {
                    cursor = Some(seq);
                    continue;
                }
                Selection::Consumer(p) => p,
            };

            let consumer_tag = self.consumers[p].consumer_tag.clone();

            match list.entry_mut(seq) {
                Some(entry) => {
                    if entry.try_acquire(&consumer_tag) == AcquireOutcome::RaceLost {
                        // expected under competing attempts, move on
                        cursor = Some(seq);
                        continue;
                    }
                }
                None => return DeliveryRound::Idle,
            }

            let redelivered = list.entry(seq).map(|e| e.redelivered()).unwrap_or(false);
            let consumer = &mut self.consumers[p];
            let no_ack = consumer.no_ack;
            let channel = consumer.channel;
            let delivery_tag = consumer.next_delivery_tag();

            let delivery = Delivery {
                consumer_tag: consumer_tag.clone(),
                channel,
                delivery_tag,
                redelivered,
                message,
            };

            return match send!(consumer.sink, delivery) {
                Ok(()) => {
                    trace!("Delivered seq {} to {}", seq, consumer_tag);

                    if !no_ack {
                        consumer.credit -= 1;
                    }
                    self.next_consumer = (p + 1) % self.consumers.len();

                    DeliveryRound::Delivered(Delivered {
                        sequence: seq,
                        tag: Tag {
                            consumer_tag,
                            delivery_tag,
                        },
                        no_ack,
                    })
                }
                Err(e) => {
                    error!("Consumer sink seems to be invalid {:?}", e);

                    if let Some(entry) = list.entry_mut(seq) {
                        entry.release();
                    }
                    self.consumers.remove(p);
                    self.next_consumer = 0;

                    DeliveryRound::ConsumerFailed(consumer_tag)
                }
            };
        }
    }
}
