//! The per-queue actor. One tokio task owns the entry list, the consumer set
//! and the flow-control state, and processes commands from a single channel.
//! That single-owner task is the serialization boundary of the queue: it
//! makes entry acquisition and position-dependent (sorted) insertion safe
//! without a dedicated lock, while different queues run fully concurrently.
#[cfg(test)]
mod tests;

use crate::error::QueueError;
use crate::message::Message;
use crate::queue::consumer::{AcquisitionMode, Consumer, ConsumerSpec};
use crate::queue::delivery::{DeliveryCoordinator, DeliveryRound};
use crate::queue::entry::{QueueEntry, RequeueOutcome, SequenceNo};
use crate::queue::list::{self, EntryList};
use crate::queue::tx::{StagedOp, TxBuffer};
use crate::queue::Queue;
use crate::store::{DeadLetter, DeadLetterReason, DeadLetterSink, QueueStore};
use crate::{logerr, send, Result};
use log::{error, info, trace, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::task::Poll;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

pub type QueueCommandSink = mpsc::Sender<QueueCommand>;

#[derive(Clone, Debug)]
pub struct Tag {
    pub consumer_tag: String,
    pub delivery_tag: u64,
}

#[derive(Debug)]
pub struct QueueInfo {
    pub name: String,
    pub message_count: usize,
    pub byte_size: u64,
    pub consumer_count: usize,
}

#[allow(clippy::large_enum_variant)]
#[derive(Debug)]
pub enum QueueCommand {
    PublishMessage {
        message: Arc<Message>,
        result: oneshot::Sender<Result<()>>,
    },
    AckMessage {
        consumer_tag: String,
        delivery_tag: u64,
        result: oneshot::Sender<Result<()>>,
    },
    RejectMessage {
        consumer_tag: String,
        delivery_tag: u64,
        requeue: bool,
        result: oneshot::Sender<Result<()>>,
    },
    RegisterConsumer {
        spec: ConsumerSpec,
        result: oneshot::Sender<Result<String>>,
    },
    CancelConsumer {
        consumer_tag: String,
        result: oneshot::Sender<bool>,
    },
    SetCredit {
        consumer_tag: String,
        credit: u32,
    },
    SuspendConsumer {
        consumer_tag: String,
    },
    ResumeConsumer {
        consumer_tag: String,
    },
    SweepExpired {
        result: oneshot::Sender<usize>,
    },
    Purge {
        result: oneshot::Sender<Result<u32>>,
    },
    GetInfo {
        result: oneshot::Sender<QueueInfo>,
    },
    DeleteQueue {
        if_unused: bool,
        if_empty: bool,
        result: oneshot::Sender<Result<u32>>,
    },
    TxEnqueue {
        tx_id: String,
        message: Arc<Message>,
    },
    TxAck {
        tx_id: String,
        consumer_tag: String,
        delivery_tag: u64,
    },
    TxCommit {
        tx_id: String,
        result: oneshot::Sender<Result<()>>,
    },
    TxRollback {
        tx_id: String,
        result: oneshot::Sender<Result<()>>,
    },
}

/// Information about the queue instance
pub(crate) struct QueueState {
    queue: Queue,
    entries: Box<dyn EntryList>,
    coordinator: DeliveryCoordinator,
    /// Sent-out deliveries waiting for their ack or reject.
    outbox: Outbox,
    next_sequence: SequenceNo,
    store: Option<Box<dyn QueueStore>>,
    dead_letters: Option<DeadLetterSink>,
    flow: FlowControl,
    transactions: HashMap<String, TxBuffer>,
    /// Set when a delivery round made no progress; cleared by any command
    /// which can change eligibility, so the loop never spins idle.
    delivery_idle: bool,
}

pub async fn start(
    queue: Queue,
    store: Option<Box<dyn QueueStore>>,
    dead_letters: Option<DeadLetterSink>,
    commands: &mut mpsc::Receiver<QueueCommand>,
) {
    QueueState::new(queue, store, dead_letters).queue_loop(commands).await;
}

impl QueueState {
    pub(crate) fn new(
        queue: Queue,
        store: Option<Box<dyn QueueStore>>,
        dead_letters: Option<DeadLetterSink>,
    ) -> QueueState {
        // only durable queues keep the store collaborator
        let store = if queue.durable { store } else { None };

        QueueState {
            entries: list::for_policy(&queue.policy),
            coordinator: DeliveryCoordinator::new(),
            outbox: Outbox {
                outgoing_messages: vec![],
            },
            next_sequence: 1,
            store,
            dead_letters,
            flow: FlowControl {
                engaged: false,
                parked: vec![],
            },
            transactions: HashMap::new(),
            delivery_idle: true,
            queue,
        }
    }

    pub(crate) async fn queue_loop(&mut self, commands: &mut mpsc::Receiver<QueueCommand>) {
        loop {
            if !self.delivery_idle {
                self.delivery_round().await;

                match poll_command_chan(commands) {
                    Poll::Pending => (), // no commands, so we can keep sending out messages
                    Poll::Ready(Some(command)) => {
                        if let Ok(false) = self.handle_command(command).await {
                            break;
                        }
                    }
                    Poll::Ready(None) => {
                        // Command channel is closed, let us exit from the command queue loop.
                        break;
                    }
                }
            } else {
                match commands.recv().await {
                    Some(command) => {
                        if let Ok(false) = self.handle_command(command).await {
                            break;
                        }
                    }
                    None => {
                        break;
                    }
                }
            }
        }
    }

    async fn delivery_round(&mut self) {
        match self.coordinator.deliver_next(self.entries.as_mut(), Instant::now()).await {
            DeliveryRound::Delivered(delivered) => {
                if delivered.no_ack {
                    logerr!(self.finalize_dequeue(delivered.sequence));
                } else {
                    self.outbox.on_sent_out(OutgoingEntry {
                        sequence: delivered.sequence,
                        tag: delivered.tag,
                    });
                }
            }
            DeliveryRound::Expired(sequence) => {
                trace!("Entry {} expired on queue {}", sequence, self.queue.name);

                self.notify_store_discard(sequence);
                self.maybe_release_flow();
            }
            DeliveryRound::ConsumerFailed(consumer_tag) => {
                self.requeue_unacked_of(&consumer_tag).await;
            }
            DeliveryRound::Idle => {
                self.delivery_idle = true;
            }
        }
    }

    pub(crate) async fn handle_command(&mut self, command: QueueCommand) -> Result<bool> {
        match command {
            QueueCommand::PublishMessage { message, result } => {
                match self.enqueue(message) {
                    Ok(()) => {
                        self.delivery_idle = false;

                        if self.above_high_watermark() {
                            trace!("Queue {} reached its high watermark, parking producer", self.queue.name);

                            self.flow.engaged = true;
                            self.flow.parked.push(result);
                        } else {
                            logerr!(result.send(Ok(())));
                        }
                    }
                    Err(e) => {
                        logerr!(result.send(Err(e)));
                    }
                }

                Ok(true)
            }
            QueueCommand::AckMessage {
                consumer_tag,
                delivery_tag,
                result,
            } => {
                let res = self.handle_ack(&consumer_tag, delivery_tag);
                logerr!(result.send(res));

                Ok(true)
            }
            QueueCommand::RejectMessage {
                consumer_tag,
                delivery_tag,
                requeue,
                result,
            } => {
                self.handle_reject(&consumer_tag, delivery_tag, requeue).await;
                logerr!(result.send(Ok(())));

                Ok(true)
            }
            QueueCommand::RegisterConsumer { mut spec, result } => {
                if self.coordinator.has_exclusive() {
                    logerr!(result.send(QueueError::ExclusiveConsumerConflict.into_result(
                        &self.queue.name,
                        "Queue is held by an exclusive consumer"
                    )));
                } else if spec.mode == AcquisitionMode::Exclusive && self.coordinator.has_consumers() {
                    logerr!(result.send(QueueError::ExclusiveConsumerConflict.into_result(
                        &self.queue.name,
                        "Queue is already consumed, cannot consume exclusively"
                    )));
                } else {
                    if spec.consumer_tag.is_empty() {
                        spec.consumer_tag = format!("ctag-{}", Uuid::new_v4());
                    }

                    let consumer_tag = spec.consumer_tag.clone();

                    info!("Queue {} is consumed by ctag {}", self.queue.name, consumer_tag);

                    self.coordinator.register(Consumer::from_spec(spec));
                    self.delivery_idle = false;

                    logerr!(result.send(Ok(consumer_tag)));
                }

                Ok(true)
            }
            QueueCommand::CancelConsumer { consumer_tag, result } => {
                info!("Queue {} is stopped consuming by ctag {}", self.queue.name, consumer_tag);

                // An ack which arrived before the cancel has already settled
                // its entry, everything still in the outbox is requeued.
                if self.coordinator.cancel(&consumer_tag).is_some() {
                    self.requeue_unacked_of(&consumer_tag).await;
                }

                if self.queue.auto_delete && !self.coordinator.has_consumers() {
                    logerr!(result.send(false));
                    self.shutdown();

                    Ok(false)
                } else {
                    logerr!(result.send(true));

                    Ok(true)
                }
            }
            QueueCommand::SetCredit { consumer_tag, credit } => {
                if let Some(c) = self.coordinator.get_mut(&consumer_tag) {
                    c.credit = credit;
                    self.delivery_idle = false;
                }

                Ok(true)
            }
            QueueCommand::SuspendConsumer { consumer_tag } => {
                if let Some(c) = self.coordinator.get_mut(&consumer_tag) {
                    c.suspended = true;
                }

                Ok(true)
            }
            QueueCommand::ResumeConsumer { consumer_tag } => {
                if let Some(c) = self.coordinator.get_mut(&consumer_tag) {
                    c.suspended = false;
                    self.delivery_idle = false;
                }

                Ok(true)
            }
            QueueCommand::SweepExpired { result } => {
                let count = self.sweep_expired();
                logerr!(result.send(count));

                Ok(true)
            }
            QueueCommand::Purge { result } => {
                let count = self.purge();
                logerr!(result.send(Ok(count)));

                Ok(true)
            }
            QueueCommand::GetInfo { result } => {
                logerr!(result.send(QueueInfo {
                    name: self.queue.name.clone(),
                    message_count: self.entries.len(),
                    byte_size: self.entries.byte_size(),
                    consumer_count: self.coordinator.consumer_count(),
                }));

                Ok(true)
            }
            QueueCommand::DeleteQueue {
                if_unused,
                if_empty,
                result,
            } => {
                if if_unused && self.coordinator.has_consumers() {
                    logerr!(result.send(QueueError::PreconditionFailed.into_result(&self.queue.name, "Queue is consumed")));

                    Ok(true)
                } else if if_empty && !self.entries.is_empty() {
                    logerr!(result.send(QueueError::PreconditionFailed.into_result(&self.queue.name, "Queue is not empty")));

                    Ok(true)
                } else {
                    info!("Queue {} is deleted", self.queue.name);

                    // parked producers get the deleted error before the purge
                    // can release them with success
                    self.shutdown();
                    let count = self.purge();
                    logerr!(result.send(Ok(count)));

                    Ok(false)
                }
            }
            QueueCommand::TxEnqueue { tx_id, message } => {
                self.transactions.entry(tx_id).or_default().stage(StagedOp::Enqueue(message));

                Ok(true)
            }
            QueueCommand::TxAck {
                tx_id,
                consumer_tag,
                delivery_tag,
            } => {
                self.transactions.entry(tx_id).or_default().stage(StagedOp::Ack {
                    consumer_tag,
                    delivery_tag,
                });

                Ok(true)
            }
            QueueCommand::TxCommit { tx_id, result } => {
                let res = self.commit_transaction(&tx_id);
                logerr!(result.send(res));

                Ok(true)
            }
            QueueCommand::TxRollback { tx_id, result } => {
                // Staged acks never transitioned their entries, the
                // consumers still hold them acquired, so discarding the
                // buffer is the whole rollback.
                self.transactions.remove(&tx_id);
                logerr!(result.send(Ok(())));

                Ok(true)
            }
        }
    }

    /// Notifies the store of durable queues and inserts the entry under the
    /// queue's ordering policy. Depth moves exactly once per successfully
    /// inserted entry.
    fn enqueue(&mut self, message: Arc<Message>) -> Result<()> {
        if let Some(store) = &mut self.store {
            store.entry_enqueued(&self.queue.name, self.next_sequence, &message)?;
        }

        self.insert_entry(message);

        Ok(())
    }

    /// Assigns the next sequence number and inserts. The store was already
    /// notified by the caller.
    fn insert_entry(&mut self, message: Arc<Message>) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let expires_at = message
            .ttl
            .or(self.queue.limits.default_ttl)
            .map(|ttl| Instant::now() + ttl);

        let outcome = self.entries.insert(QueueEntry::new(sequence, message, expires_at));

        if let Some(superseded) = outcome.superseded {
            trace!(
                "Entry {} superseded by {} on queue {}",
                superseded.sequence,
                sequence,
                self.queue.name
            );

            self.notify_store_discard(superseded.sequence);
        }
    }

    fn handle_ack(&mut self, consumer_tag: &str, delivery_tag: u64) -> Result<()> {
        let sequence = match self.outbox.find(consumer_tag, delivery_tag) {
            Some(sequence) => sequence,
            None => {
                trace!("Ack of unknown delivery tag {} from {}", delivery_tag, consumer_tag);

                return Ok(());
            }
        };

        // store first; on failure the entry stays acquired and the outbox
        // record stays, the consumer may retry the ack
        self.finalize_dequeue(sequence)?;
        self.outbox.on_ack_arrive(consumer_tag, delivery_tag);
        self.coordinator.restore_credit(consumer_tag);
        self.delivery_idle = false;

        Ok(())
    }

    async fn handle_reject(&mut self, consumer_tag: &str, delivery_tag: u64, requeue: bool) {
        let sequence = match self.outbox.find(consumer_tag, delivery_tag) {
            Some(sequence) => sequence,
            None => {
                trace!("Reject of unknown delivery tag {} from {}", delivery_tag, consumer_tag);

                return;
            }
        };

        self.outbox.on_ack_arrive(consumer_tag, delivery_tag);
        self.coordinator.restore_credit(consumer_tag);

        if requeue {
            self.requeue_entry(sequence).await;
        } else {
            self.dead_letter_entry(sequence, DeadLetterReason::Rejected).await;
        }
    }

    /// Ack or no-ack settle of an acquired entry: dequeue notification to
    /// the store, then removal from the list.
    fn finalize_dequeue(&mut self, sequence: SequenceNo) -> Result<()> {
        if let Some(store) = &mut self.store {
            store.entry_dequeued(&self.queue.name, sequence)?;
        }

        self.settle_dequeue(sequence);

        Ok(())
    }

    fn settle_dequeue(&mut self, sequence: SequenceNo) {
        if let Some(entry) = self.entries.entry_mut(sequence) {
            entry.ack();
        }
        self.entries.remove(sequence);
        self.maybe_release_flow();
    }

    /// Expired, superseded, dead-lettered and purged entries leave a durable
    /// queue like a dequeue does. These paths have no caller to surface a
    /// store failure to, it is logged and the removal stands.
    fn notify_store_discard(&mut self, sequence: SequenceNo) {
        if let Some(store) = &mut self.store {
            logerr!(store.entry_dequeued(&self.queue.name, sequence));
        }
    }

    async fn requeue_entry(&mut self, sequence: SequenceNo) {
        let outcome = match self.entries.entry_mut(sequence) {
            Some(entry) => entry.requeue(self.queue.limits.max_redeliveries),
            None => return,
        };

        match outcome {
            RequeueOutcome::Requeued => {
                self.delivery_idle = false;
            }
            RequeueOutcome::DeadLettered => {
                if let Some(entry) = self.entries.remove(sequence) {
                    self.notify_store_discard(sequence);
                    self.send_dead_letter(entry, DeadLetterReason::RedeliveryLimitExceeded).await;
                }
                self.maybe_release_flow();
            }
        }
    }

    async fn dead_letter_entry(&mut self, sequence: SequenceNo, reason: DeadLetterReason) {
        let marked = match self.entries.entry_mut(sequence) {
            Some(entry) => entry.dead_letter(),
            None => false,
        };

        if marked {
            if let Some(entry) = self.entries.remove(sequence) {
                self.notify_store_discard(sequence);
                self.send_dead_letter(entry, reason).await;
            }
            self.maybe_release_flow();
        }
    }

    async fn send_dead_letter(&mut self, entry: QueueEntry, reason: DeadLetterReason) {
        match &self.dead_letters {
            Some(sink) => {
                logerr!(send!(
                    sink,
                    DeadLetter {
                        queue: self.queue.name.clone(),
                        sequence: entry.sequence,
                        redelivery_count: entry.redelivery_count(),
                        reason,
                        message: entry.message.clone(),
                    }
                ));
            }
            None => {
                warn!(
                    "No dead letter route on queue {}, dropping entry {}",
                    self.queue.name, entry.sequence
                );
            }
        }
    }

    async fn requeue_unacked_of(&mut self, consumer_tag: &str) {
        for sequence in self.outbox.take_for_consumer(consumer_tag) {
            self.requeue_entry(sequence).await;
        }
    }

    fn sweep_expired(&mut self) -> usize {
        let now = Instant::now();
        let mut count = 0;

        for sequence in self.entries.sequences() {
            let expired = match self.entries.entry_mut(sequence) {
                Some(entry) if entry.is_available() && entry.is_expired(now) => entry.expire(),
                _ => false,
            };

            if expired {
                self.entries.remove(sequence);
                self.notify_store_discard(sequence);
                count += 1;
            }
        }

        if count > 0 {
            trace!("Expired {} entries on queue {}", count, self.queue.name);

            self.maybe_release_flow();
        }

        count
    }

    fn purge(&mut self) -> u32 {
        let mut count = 0u32;

        for sequence in self.entries.sequences() {
            if self.entries.entry(sequence).map(|e| e.is_available()).unwrap_or(false) {
                self.entries.remove(sequence);
                self.notify_store_discard(sequence);
                count += 1;
            }
        }

        self.maybe_release_flow();

        count
    }

    fn commit_transaction(&mut self, tx_id: &str) -> Result<()> {
        let buffer = match self.transactions.remove(tx_id) {
            Some(buffer) => buffer,
            None => return Ok(()),
        };

        // Store writes go first: a failing store leaves the queue untouched
        // and the staged operations in place, the commit may be retried.
        if let Err(e) = self.stage_to_store(&buffer) {
            self.transactions.insert(tx_id.to_owned(), buffer);

            return Err(e);
        }

        for op in buffer.take_ops() {
            match op {
                StagedOp::Enqueue(message) => {
                    self.insert_entry(message);
                    self.delivery_idle = false;
                }
                StagedOp::Ack {
                    consumer_tag,
                    delivery_tag,
                } => {
                    self.apply_ack(&consumer_tag, delivery_tag);
                }
            }
        }

        Ok(())
    }

    /// Dry-runs a commit against the store of a durable queue. Enqueues are
    /// written under the sequence numbers the apply phase will assign.
    fn stage_to_store(&mut self, buffer: &TxBuffer) -> Result<()> {
        if self.store.is_none() {
            return Ok(());
        }

        let mut sequence = self.next_sequence;

        for op in buffer.ops() {
            match op {
                StagedOp::Enqueue(message) => {
                    if let Some(store) = &mut self.store {
                        store.entry_enqueued(&self.queue.name, sequence, message)?;
                    }

                    sequence += 1;
                }
                StagedOp::Ack {
                    consumer_tag,
                    delivery_tag,
                } => {
                    let settled = self.outbox.find(consumer_tag, *delivery_tag);

                    if let Some(seq) = settled {
                        if let Some(store) = &mut self.store {
                            store.entry_dequeued(&self.queue.name, seq)?;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Settles a staged ack without the store notification, the commit
    /// already wrote it in the staging phase.
    fn apply_ack(&mut self, consumer_tag: &str, delivery_tag: u64) {
        if let Some(sequence) = self.outbox.find(consumer_tag, delivery_tag) {
            self.settle_dequeue(sequence);
            self.outbox.on_ack_arrive(consumer_tag, delivery_tag);
            self.coordinator.restore_credit(consumer_tag);
            self.delivery_idle = false;
        }
    }

    fn above_high_watermark(&self) -> bool {
        self.entries.len() >= self.queue.limits.high_watermark_count
            || self.entries.byte_size() >= self.queue.limits.high_watermark_bytes
    }

    /// Flow control releases with hysteresis: producers parked at the high
    /// watermark resume only once depth fell back to the low watermark.
    fn maybe_release_flow(&mut self) {
        if self.flow.engaged
            && self.entries.len() <= self.queue.limits.low_watermark_count
            && self.entries.byte_size() <= self.queue.limits.low_watermark_bytes
        {
            trace!("Queue {} dropped to its low watermark, resuming producers", self.queue.name);

            self.flow.engaged = false;
            for parked in self.flow.parked.drain(..) {
                logerr!(parked.send(Ok(())));
            }
        }
    }

    /// Answers every parked producer with the deleted error before the task
    /// stops, nobody is left waiting on a dead queue.
    fn shutdown(&mut self) {
        self.flow.engaged = false;

        for parked in self.flow.parked.drain(..) {
            logerr!(parked.send(QueueError::QueueDeleted.into_result(&self.queue.name, "Queue has been deleted")));
        }
    }
}

struct FlowControl {
    engaged: bool,
    /// Producers waiting for the enqueue confirmation while above the
    /// watermark. Dropping the receiving end cancels the wait.
    parked: Vec<oneshot::Sender<Result<()>>>,
}

#[derive(Debug)]
struct OutgoingEntry {
    sequence: SequenceNo,
    tag: Tag,
}

#[derive(Debug)]
struct Outbox {
    outgoing_messages: Vec<OutgoingEntry>,
}

impl Outbox {
    fn find(&self, consumer_tag: &str, delivery_tag: u64) -> Option<SequenceNo> {
        self.outgoing_messages
            .iter()
            .find(|om| om.tag.delivery_tag == delivery_tag && om.tag.consumer_tag == consumer_tag)
            .map(|om| om.sequence)
    }

    fn on_ack_arrive(&mut self, consumer_tag: &str, delivery_tag: u64) {
        self.outgoing_messages
            .retain(|om| om.tag.delivery_tag != delivery_tag || om.tag.consumer_tag != consumer_tag);
    }

    fn on_sent_out(&mut self, outgoing_message: OutgoingEntry) {
        self.outgoing_messages.push(outgoing_message);
    }

    /// Unsettled deliveries of a consumer in sequence order, used to requeue
    /// on cancel or sink failure.
    fn take_for_consumer(&mut self, consumer_tag: &str) -> Vec<SequenceNo> {
        let mut sequences: Vec<SequenceNo> = self
            .outgoing_messages
            .iter()
            .filter(|om| om.tag.consumer_tag == consumer_tag)
            .map(|om| om.sequence)
            .collect();

        self.outgoing_messages.retain(|om| om.tag.consumer_tag != consumer_tag);
        sequences.sort_unstable();

        sequences
    }
}

fn poll_command_chan(commands: &mut mpsc::Receiver<QueueCommand>) -> Poll<Option<QueueCommand>> {
    use futures::task::noop_waker_ref;
    use std::task::Context;

    let mut cx = Context::from_waker(noop_waker_ref());
    commands.poll_recv(&mut cx)
}

/// Publishes a message and awaits the confirmation. The await is the
/// producer-side suspension point of flow control; a closed queue surfaces
/// as `QueueDeleted`.
pub async fn publish_message(sink: &QueueCommandSink, message: Arc<Message>) -> Result<()> {
    let (tx, rx) = oneshot::channel();

    if send!(sink, QueueCommand::PublishMessage { message, result: tx }).is_err() {
        return QueueError::QueueDeleted.into_result("", "Queue has been deleted");
    }

    match rx.await {
        Ok(res) => res,
        Err(_) => QueueError::QueueDeleted.into_result("", "Queue has been deleted"),
    }
}

pub async fn acknowledge(sink: &QueueCommandSink, consumer_tag: &str, delivery_tag: u64) -> Result<()> {
    let (tx, rx) = oneshot::channel();

    if send!(
        sink,
        QueueCommand::AckMessage {
            consumer_tag: consumer_tag.to_owned(),
            delivery_tag,
            result: tx,
        }
    )
    .is_err()
    {
        return QueueError::QueueDeleted.into_result("", "Queue has been deleted");
    }

    match rx.await {
        Ok(res) => res,
        Err(_) => QueueError::QueueDeleted.into_result("", "Queue has been deleted"),
    }
}

pub async fn reject(sink: &QueueCommandSink, consumer_tag: &str, delivery_tag: u64, requeue: bool) -> Result<()> {
    let (tx, rx) = oneshot::channel();

    if send!(
        sink,
        QueueCommand::RejectMessage {
            consumer_tag: consumer_tag.to_owned(),
            delivery_tag,
            requeue,
            result: tx,
        }
    )
    .is_err()
    {
        return QueueError::QueueDeleted.into_result("", "Queue has been deleted");
    }

    match rx.await {
        Ok(res) => res,
        Err(_) => QueueError::QueueDeleted.into_result("", "Queue has been deleted"),
    }
}

pub async fn set_credit(sink: &QueueCommandSink, consumer_tag: &str, credit: u32) -> Result<()> {
    send!(
        sink,
        QueueCommand::SetCredit {
            consumer_tag: consumer_tag.to_owned(),
            credit,
        }
    )
    .map_err(|e| e.into())
}

pub async fn get_info(sink: &QueueCommandSink) -> Result<QueueInfo> {
    let (tx, rx) = oneshot::channel();

    send!(sink, QueueCommand::GetInfo { result: tx })?;

    Ok(rx.await?)
}
