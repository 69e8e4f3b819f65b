use super::*;
use crate::error::to_runtime_error;
use crate::message::tests::{message_with_property, text_message};
use crate::message::PropertyValue;
use crate::queue::consumer::Delivery;
use crate::queue::{OrderingPolicy, QueueLimits};
use crate::store::tests::{StoreEvent, TestStore};
use crate::store::DeadLetterReason;
use std::time::Duration;

struct TestCase {
    queue_name: String,
    policy: OrderingPolicy,
    limits: QueueLimits,
    auto_delete: bool,
    store: Option<Box<dyn QueueStore>>,
    dead_letters: Option<DeadLetterSink>,
}

impl Default for TestCase {
    fn default() -> Self {
        TestCase {
            queue_name: "my-queue".to_owned(),
            policy: OrderingPolicy::Fifo,
            limits: QueueLimits::default(),
            auto_delete: false,
            store: None,
            dead_letters: None,
        }
    }
}

impl TestCase {
    fn with_policy(self, policy: OrderingPolicy) -> Self {
        Self { policy, ..self }
    }

    fn with_limits(self, limits: QueueLimits) -> Self {
        Self { limits, ..self }
    }

    fn auto_delete(self) -> Self {
        Self {
            auto_delete: true,
            ..self
        }
    }

    fn with_store(self, store: Box<dyn QueueStore>) -> Self {
        Self {
            store: Some(store),
            ..self
        }
    }

    fn with_dead_letters(self) -> (Self, mpsc::Receiver<DeadLetter>) {
        let (tx, rx) = mpsc::channel(16);

        (
            Self {
                dead_letters: Some(tx),
                ..self
            },
            rx,
        )
    }

    fn build(self) -> QueueStateTester {
        let queue = Queue {
            name: self.queue_name,
            policy: self.policy,
            durable: self.store.is_some(),
            auto_delete: self.auto_delete,
            limits: self.limits,
        };

        QueueStateTester {
            state: QueueState::new(queue, self.store, self.dead_letters),
        }
    }
}

struct QueueStateTester {
    state: QueueState,
}

impl QueueStateTester {
    /// Runs delivery rounds the way the queue loop would between commands.
    async fn run_delivery(&mut self) {
        while !self.state.delivery_idle {
            self.state.delivery_round().await;
        }
    }

    async fn publish(&mut self, message: Message) -> oneshot::Receiver<Result<()>> {
        let (tx, rx) = oneshot::channel();

        self.state
            .handle_command(QueueCommand::PublishMessage {
                message: Arc::new(message),
                result: tx,
            })
            .await
            .unwrap();

        rx
    }

    async fn publish_ok(&mut self, body: &str) {
        let rx = self.publish(text_message(body)).await;

        rx.await.unwrap().unwrap();
    }

    async fn try_consume(
        &mut self,
        ctag: &str,
        credit: u32,
        no_ack: bool,
        mode: AcquisitionMode,
        filter: Option<crate::queue::consumer::FilterPredicate>,
    ) -> Result<mpsc::Receiver<Delivery>> {
        let (dtx, drx) = mpsc::channel(16);
        let (rtx, rrx) = oneshot::channel();

        self.state
            .handle_command(QueueCommand::RegisterConsumer {
                spec: ConsumerSpec {
                    consumer_tag: ctag.to_owned(),
                    channel: 1,
                    mode,
                    no_ack,
                    credit,
                    filter,
                    sink: dtx,
                },
                result: rtx,
            })
            .await
            .unwrap();

        rrx.await.unwrap()?;

        self.run_delivery().await;

        Ok(drx)
    }

    async fn consume(&mut self, ctag: &str, credit: u32) -> mpsc::Receiver<Delivery> {
        self.try_consume(ctag, credit, false, AcquisitionMode::Shared, None)
            .await
            .unwrap()
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<()> {
        let (tx, rx) = oneshot::channel();

        self.state
            .handle_command(QueueCommand::AckMessage {
                consumer_tag: delivery.consumer_tag.clone(),
                delivery_tag: delivery.delivery_tag,
                result: tx,
            })
            .await
            .unwrap();

        let res = rx.await.unwrap();
        self.run_delivery().await;

        res
    }

    async fn reject(&mut self, delivery: &Delivery, requeue: bool) {
        let (tx, rx) = oneshot::channel();

        self.state
            .handle_command(QueueCommand::RejectMessage {
                consumer_tag: delivery.consumer_tag.clone(),
                delivery_tag: delivery.delivery_tag,
                requeue,
                result: tx,
            })
            .await
            .unwrap();

        rx.await.unwrap().unwrap();
        self.run_delivery().await;
    }

    async fn cancel(&mut self, ctag: &str) -> bool {
        let (tx, rx) = oneshot::channel();

        self.state
            .handle_command(QueueCommand::CancelConsumer {
                consumer_tag: ctag.to_owned(),
                result: tx,
            })
            .await
            .unwrap();

        rx.await.unwrap()
    }

    async fn info(&mut self) -> QueueInfo {
        let (tx, rx) = oneshot::channel();

        self.state
            .handle_command(QueueCommand::GetInfo { result: tx })
            .await
            .unwrap();

        rx.await.unwrap()
    }

    async fn sweep(&mut self) -> usize {
        let (tx, rx) = oneshot::channel();

        self.state
            .handle_command(QueueCommand::SweepExpired { result: tx })
            .await
            .unwrap();

        rx.await.unwrap()
    }
}

async fn recv_timeout(rx: &mut mpsc::Receiver<Delivery>) -> Option<Delivery> {
    tokio::time::timeout(Duration::from_millis(100), rx.recv())
        .await
        .ok()
        .flatten()
}

fn body_of(delivery: &Delivery) -> String {
    String::from_utf8_lossy(&delivery.message.body).to_string()
}

/// If messages are published to a queue and there are no consumers, the
/// queue should store the message.
#[tokio::test]
async fn publish_to_queue_without_consumers() {
    let mut tester = TestCase::default().build();

    tester.publish_ok("Hey, man").await;
    tester.run_delivery().await;

    assert_eq!(tester.state.entries.len(), 1);

    let seq = tester.state.entries.next_available(None).unwrap();
    let entry = tester.state.entries.entry(seq).unwrap();
    assert_eq!(entry.message.body.as_ref(), b"Hey, man");
}

/// If message is published to a queue and there is a consumer, the message
/// is passed to the consumer sink.
#[tokio::test]
async fn publish_to_queue_with_one_consumer() {
    let mut tester = TestCase::default().build();
    let mut frx = tester.consume("myctag", 10).await;

    tester.publish_ok("Hey, man").await;
    tester.run_delivery().await;

    let delivery = recv_timeout(&mut frx).await.unwrap();
    assert_eq!(delivery.consumer_tag, "myctag");
    assert_eq!(delivery.delivery_tag, 1);
    assert!(!delivery.redelivered);
    assert_eq!(body_of(&delivery), "Hey, man");

    assert_eq!(tester.state.outbox.outgoing_messages.len(), 1);
}

#[tokio::test]
async fn fifo_delivery_order_matches_enqueue_order() {
    let mut tester = TestCase::default().build();
    let mut frx = tester.consume("ctag-1", 10).await;

    for body in ["1st", "2nd", "3rd"] {
        tester.publish_ok(body).await;
    }
    tester.run_delivery().await;

    for expected in ["1st", "2nd", "3rd"] {
        let delivery = recv_timeout(&mut frx).await.unwrap();
        assert_eq!(body_of(&delivery), expected);
    }
}

#[tokio::test]
async fn ack_dequeues_the_entry() {
    let mut tester = TestCase::default().build();
    let mut frx = tester.consume("ctag-1", 10).await;

    tester.publish_ok("Acked message").await;
    tester.run_delivery().await;

    let delivery = recv_timeout(&mut frx).await.unwrap();
    tester.ack(&delivery).await.unwrap();

    assert_eq!(tester.state.entries.len(), 0);
    assert!(tester.state.outbox.outgoing_messages.is_empty());
}

#[tokio::test]
async fn empty_consumer_tag_is_generated() {
    let mut tester = TestCase::default().build();

    let (dtx, _drx) = mpsc::channel(16);
    let (rtx, rrx) = oneshot::channel();
    tester
        .state
        .handle_command(QueueCommand::RegisterConsumer {
            spec: ConsumerSpec {
                consumer_tag: "".to_owned(),
                channel: 1,
                mode: AcquisitionMode::Shared,
                no_ack: false,
                credit: 1,
                filter: None,
                sink: dtx,
            },
            result: rtx,
        })
        .await
        .unwrap();

    let consumer_tag = rrx.await.unwrap().unwrap();
    assert!(consumer_tag.starts_with("ctag-"));
}

#[tokio::test]
async fn reject_with_requeue_redelivers_with_incremented_count() {
    let mut tester = TestCase::default().build();
    let mut frx = tester.consume("ctag-1", 10).await;

    tester.publish_ok("try me").await;
    tester.run_delivery().await;

    let first = recv_timeout(&mut frx).await.unwrap();
    assert!(!first.redelivered);

    tester.reject(&first, true).await;

    let second = recv_timeout(&mut frx).await.unwrap();
    assert!(second.redelivered);
    assert_eq!(body_of(&second), "try me");
}

#[tokio::test]
async fn rejection_past_the_redelivery_limit_dead_letters() {
    let (case, mut dlq) = TestCase::default()
        .with_limits(QueueLimits {
            max_redeliveries: 3,
            ..Default::default()
        })
        .with_dead_letters();
    let mut tester = case.build();
    let mut frx = tester.consume("ctag-1", 10).await;

    tester.publish_ok("poison").await;
    tester.run_delivery().await;

    // the 4th rejection breaches max_redeliveries = 3
    for _ in 0..4 {
        let delivery = recv_timeout(&mut frx).await.unwrap();
        tester.reject(&delivery, true).await;
    }

    let dead = dlq.recv().await.unwrap();
    assert_eq!(dead.queue, "my-queue");
    assert_eq!(dead.reason, DeadLetterReason::RedeliveryLimitExceeded);
    assert_eq!(dead.redelivery_count, 3);

    // never again available
    assert_eq!(tester.state.entries.len(), 0);
    assert!(recv_timeout(&mut frx).await.is_none());
}

#[tokio::test]
async fn reject_without_requeue_dead_letters_immediately() {
    let (case, mut dlq) = TestCase::default().with_dead_letters();
    let mut tester = case.build();
    let mut frx = tester.consume("ctag-1", 10).await;

    tester.publish_ok("unwanted").await;
    tester.run_delivery().await;

    let delivery = recv_timeout(&mut frx).await.unwrap();
    tester.reject(&delivery, false).await;

    let dead = dlq.recv().await.unwrap();
    assert_eq!(dead.reason, DeadLetterReason::Rejected);
    assert_eq!(dead.redelivery_count, 0);
    assert_eq!(tester.state.entries.len(), 0);
}

#[tokio::test]
async fn exclusive_consumer_registration_conflicts() {
    let mut tester = TestCase::default().build();

    let _frx = tester.consume("ctag-1", 10).await;

    // exclusive onto a consumed queue
    let res = tester
        .try_consume("ctag-2", 10, false, AcquisitionMode::Exclusive, None)
        .await;
    let err = to_runtime_error(res.err().unwrap());
    assert_eq!(err.code, QueueError::ExclusiveConsumerConflict as u16);

    let mut tester = TestCase::default().build();
    let _frx = tester
        .try_consume("ctag-1", 10, false, AcquisitionMode::Exclusive, None)
        .await
        .unwrap();

    // anybody onto an exclusively held queue
    let res = tester.try_consume("ctag-2", 10, false, AcquisitionMode::Shared, None).await;
    let err = to_runtime_error(res.err().unwrap());
    assert_eq!(err.code, QueueError::ExclusiveConsumerConflict as u16);
}

#[tokio::test]
async fn filter_rejected_entry_waits_for_a_matching_consumer() {
    let mut tester = TestCase::default().build();

    let mut picky = tester
        .try_consume(
            "ctag-picky",
            10,
            false,
            AcquisitionMode::Shared,
            Some(Box::new(|m: &Message| m.body.as_ref() != b"skip")),
        )
        .await
        .unwrap();

    tester.publish_ok("skip").await;
    tester.publish_ok("take").await;
    tester.run_delivery().await;

    // the earlier entry was rejected by the only filter, the later one got
    // through without violating the ordering guarantee
    let delivery = recv_timeout(&mut picky).await.unwrap();
    assert_eq!(body_of(&delivery), "take");
    assert_eq!(tester.state.entries.len(), 2);

    let mut anybody = tester.consume("ctag-any", 10).await;
    let delivery = recv_timeout(&mut anybody).await.unwrap();
    assert_eq!(body_of(&delivery), "skip");
}

#[tokio::test]
async fn credit_limits_outstanding_deliveries() {
    let mut tester = TestCase::default().build();
    let mut frx = tester.consume("ctag-1", 1).await;

    tester.publish_ok("first").await;
    tester.publish_ok("second").await;
    tester.run_delivery().await;

    let first = recv_timeout(&mut frx).await.unwrap();
    assert_eq!(body_of(&first), "first");
    assert!(recv_timeout(&mut frx).await.is_none());

    // settling the first restores the credit
    tester.ack(&first).await.unwrap();

    let second = recv_timeout(&mut frx).await.unwrap();
    assert_eq!(body_of(&second), "second");
}

#[tokio::test]
async fn set_credit_resumes_a_starved_consumer() {
    let mut tester = TestCase::default().build();
    let mut frx = tester.consume("ctag-1", 0).await;

    tester.publish_ok("waiting").await;
    tester.run_delivery().await;
    assert!(recv_timeout(&mut frx).await.is_none());

    tester
        .state
        .handle_command(QueueCommand::SetCredit {
            consumer_tag: "ctag-1".to_owned(),
            credit: 5,
        })
        .await
        .unwrap();
    tester.run_delivery().await;

    assert!(recv_timeout(&mut frx).await.is_some());
}

#[tokio::test]
async fn suspended_consumer_is_skipped_until_resume() {
    let mut tester = TestCase::default().build();
    let mut frx = tester.consume("ctag-1", 10).await;

    tester
        .state
        .handle_command(QueueCommand::SuspendConsumer {
            consumer_tag: "ctag-1".to_owned(),
        })
        .await
        .unwrap();

    tester.publish_ok("later").await;
    tester.run_delivery().await;
    assert!(recv_timeout(&mut frx).await.is_none());

    tester
        .state
        .handle_command(QueueCommand::ResumeConsumer {
            consumer_tag: "ctag-1".to_owned(),
        })
        .await
        .unwrap();
    tester.run_delivery().await;

    assert!(recv_timeout(&mut frx).await.is_some());
}

#[tokio::test]
async fn unacked_messages_are_requeued_in_order_on_cancel() {
    let mut tester = TestCase::default().build();
    let mut frx = tester.consume("ctag-2", 10).await;

    tester.publish_ok("1st").await;
    tester.publish_ok("2nd").await;
    tester.run_delivery().await;

    recv_timeout(&mut frx).await.unwrap();
    recv_timeout(&mut frx).await.unwrap();
    assert_eq!(tester.state.entries.len(), 2);

    tester.cancel("ctag-2").await;

    // both entries are available again, original order kept
    let mut bodies = vec![];
    let mut cursor = None;
    while let Some(seq) = tester.state.entries.next_available(cursor) {
        let e = tester.state.entries.entry(seq).unwrap();
        bodies.push(String::from_utf8_lossy(&e.message.body).to_string());
        assert_eq!(e.redelivery_count(), 1);
        cursor = Some(seq);
    }
    assert_eq!(bodies, vec!["1st", "2nd"]);
}

#[tokio::test]
async fn ack_observed_before_cancel_wins() {
    let mut tester = TestCase::default().build();
    let mut frx = tester.consume("ctag-1", 10).await;

    tester.publish_ok("settle me").await;
    tester.run_delivery().await;

    let delivery = recv_timeout(&mut frx).await.unwrap();
    tester.ack(&delivery).await.unwrap();
    tester.cancel("ctag-1").await;

    // nothing to requeue, the ack already dequeued the entry
    assert_eq!(tester.state.entries.len(), 0);
}

#[tokio::test]
async fn depth_counts_available_and_acquired_entries() {
    let mut tester = TestCase::default().build();
    let mut frx = tester.consume("ctag-1", 2).await;

    for body in ["a", "b", "c"] {
        tester.publish_ok(body).await;
    }
    tester.run_delivery().await;

    // two delivered (acquired), one available
    let info = tester.info().await;
    assert_eq!(info.message_count, 3);

    let first = recv_timeout(&mut frx).await.unwrap();
    tester.ack(&first).await.unwrap();

    let info = tester.info().await;
    assert_eq!(info.message_count, 2);

    let second = recv_timeout(&mut frx).await.unwrap();
    tester.reject(&second, true).await;

    // requeued entries still count
    let info = tester.info().await;
    assert_eq!(info.message_count, 2);
}

#[tokio::test]
async fn flow_control_parks_producers_and_resumes_at_the_low_watermark() {
    let mut tester = TestCase::default()
        .with_limits(QueueLimits {
            high_watermark_count: 4,
            low_watermark_count: 2,
            ..Default::default()
        })
        .build();

    for n in 0..3 {
        tester.publish_ok(&format!("m{n}")).await;
    }

    // the publish reaching the watermark is parked
    let mut parked = tester.publish(text_message("m3")).await;
    assert!(parked.try_recv().is_err());
    assert!(tester.state.flow.engaged);

    let mut frx = tester.consume("ctag-1", 10).await;
    tester.run_delivery().await;

    let d1 = recv_timeout(&mut frx).await.unwrap();
    let d2 = recv_timeout(&mut frx).await.unwrap();
    tester.ack(&d1).await.unwrap();

    // depth 3, still above the low watermark
    assert!(parked.try_recv().is_err());

    tester.ack(&d2).await.unwrap();

    // depth 2 == low watermark, the producer resumes
    parked.await.unwrap().unwrap();
    assert!(!tester.state.flow.engaged);
}

#[tokio::test]
async fn delete_answers_parked_producers_with_queue_deleted() {
    let mut tester = TestCase::default()
        .with_limits(QueueLimits {
            high_watermark_count: 1,
            low_watermark_count: 0,
            ..Default::default()
        })
        .build();

    let parked = tester.publish(text_message("m0")).await;

    let (tx, rx) = oneshot::channel();
    let keep_running = tester
        .state
        .handle_command(QueueCommand::DeleteQueue {
            if_unused: false,
            if_empty: false,
            result: tx,
        })
        .await
        .unwrap();

    assert!(!keep_running);
    rx.await.unwrap().unwrap();

    let err = to_runtime_error(parked.await.unwrap().err().unwrap());
    assert_eq!(err.code, QueueError::QueueDeleted as u16);
}

#[tokio::test]
async fn cannot_delete_non_empty_queue_if_empty_true() {
    let mut tester = TestCase::default().build();

    tester.publish_ok("Hey, man").await;

    let (tx, rx) = oneshot::channel();
    let keep_running = tester
        .state
        .handle_command(QueueCommand::DeleteQueue {
            if_unused: false,
            if_empty: true,
            result: tx,
        })
        .await
        .unwrap();

    assert!(keep_running);

    let err = to_runtime_error(rx.await.unwrap().err().unwrap());
    assert_eq!(err.code, QueueError::PreconditionFailed as u16);
    assert_eq!(err.text, "Queue is not empty".to_string());
}

#[tokio::test]
async fn auto_delete_queue_stops_after_the_last_cancel() {
    let mut tester = TestCase::default().auto_delete().build();
    let _frx = tester.consume("ctag-1", 10).await;

    let (tx, rx) = oneshot::channel();
    let keep_running = tester
        .state
        .handle_command(QueueCommand::CancelConsumer {
            consumer_tag: "ctag-1".to_owned(),
            result: tx,
        })
        .await
        .unwrap();

    assert!(!keep_running);
    assert!(!rx.await.unwrap());
}

#[tokio::test]
async fn purge_removes_available_but_not_acquired_entries() {
    let mut tester = TestCase::default().build();
    let mut frx = tester.consume("ctag-1", 1).await;

    for body in ["a", "b", "c"] {
        tester.publish_ok(body).await;
    }
    tester.run_delivery().await;
    let delivery = recv_timeout(&mut frx).await.unwrap();

    let (tx, rx) = oneshot::channel();
    tester.state.handle_command(QueueCommand::Purge { result: tx }).await.unwrap();
    assert_eq!(rx.await.unwrap().unwrap(), 2);

    // the in-flight entry settles through its ack
    assert_eq!(tester.state.entries.len(), 1);
    tester.ack(&delivery).await.unwrap();
    assert_eq!(tester.state.entries.len(), 0);
}

#[tokio::test]
async fn sweep_removes_expired_available_entries_only() {
    let mut tester = TestCase::default().build();
    let mut frx = tester.consume("ctag-1", 1).await;

    let expiring = Message {
        ttl: Some(Duration::from_millis(20)),
        ..text_message("gone soon")
    };

    // the first expiring message is delivered (acquired) before its deadline
    let rx = tester.publish(expiring.clone()).await;
    rx.await.unwrap().unwrap();
    tester.run_delivery().await;
    let delivery = recv_timeout(&mut frx).await.unwrap();

    let rx = tester.publish(expiring).await;
    rx.await.unwrap().unwrap();
    tester.publish_ok("stays").await;

    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(tester.sweep().await, 1);
    assert_eq!(tester.state.entries.len(), 2);

    // acquired entry settles normally even though its deadline passed
    tester.ack(&delivery).await.unwrap();
    assert_eq!(tester.state.entries.len(), 1);
}

#[tokio::test]
async fn conflating_queue_delivers_only_the_latest_generation() {
    let mut tester = TestCase::default()
        .with_policy(OrderingPolicy::Conflating {
            key: "ticker".to_owned(),
        })
        .build();

    let rx = tester
        .publish(message_with_property("A", "ticker", PropertyValue::Int(5)))
        .await;
    rx.await.unwrap().unwrap();
    let rx = tester
        .publish(message_with_property("B", "ticker", PropertyValue::Int(5)))
        .await;
    rx.await.unwrap().unwrap();

    let mut frx = tester.consume("ctag-1", 10).await;
    tester.run_delivery().await;

    let delivery = recv_timeout(&mut frx).await.unwrap();
    assert_eq!(body_of(&delivery), "B");
    assert!(recv_timeout(&mut frx).await.is_none());
}

#[tokio::test]
async fn durable_queue_notifies_the_store_in_observable_order() {
    let (store, events) = TestStore::new();
    let mut tester = TestCase::default().with_store(Box::new(store)).build();
    let mut frx = tester.consume("ctag-1", 10).await;

    tester.publish_ok("persist me").await;
    tester.run_delivery().await;

    let delivery = recv_timeout(&mut frx).await.unwrap();
    tester.ack(&delivery).await.unwrap();

    let events = events.lock().unwrap();
    assert_eq!(
        *events,
        vec![
            StoreEvent::Enqueued("my-queue".to_owned(), 1),
            StoreEvent::Dequeued("my-queue".to_owned(), 1),
        ]
    );
}

#[tokio::test]
async fn store_failure_fails_the_publish() {
    let (mut store, events) = TestStore::new();
    store.fail_enqueue = true;

    let mut tester = TestCase::default().with_store(Box::new(store)).build();

    let rx = tester.publish(text_message("lost?")).await;
    assert!(rx.await.unwrap().is_err());

    // nothing was inserted, nothing was recorded
    assert_eq!(tester.state.entries.len(), 0);
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn durable_queue_reports_discarded_entries_to_the_store() {
    let (store, events) = TestStore::new();
    let mut tester = TestCase::default().with_store(Box::new(store)).build();

    let rx = tester
        .publish(Message {
            ttl: Some(Duration::from_millis(5)),
            ..text_message("expires")
        })
        .await;
    rx.await.unwrap().unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(tester.sweep().await, 1);

    tester.publish_ok("purged").await;

    let (tx, rx) = oneshot::channel();
    tester.state.handle_command(QueueCommand::Purge { result: tx }).await.unwrap();
    assert_eq!(rx.await.unwrap().unwrap(), 1);

    // expired and purged entries leave the store like a dequeue
    let events = events.lock().unwrap();
    assert_eq!(
        *events,
        vec![
            StoreEvent::Enqueued("my-queue".to_owned(), 1),
            StoreEvent::Dequeued("my-queue".to_owned(), 1),
            StoreEvent::Enqueued("my-queue".to_owned(), 2),
            StoreEvent::Dequeued("my-queue".to_owned(), 2),
        ]
    );
}

#[tokio::test]
async fn dead_lettered_entries_are_dequeued_from_the_store() {
    let (store, events) = TestStore::new();
    let (case, mut dlq) = TestCase::default().with_store(Box::new(store)).with_dead_letters();
    let mut tester = case.build();
    let mut frx = tester.consume("ctag-1", 10).await;

    tester.publish_ok("unwanted").await;
    tester.run_delivery().await;

    let delivery = recv_timeout(&mut frx).await.unwrap();
    tester.reject(&delivery, false).await;

    assert!(dlq.recv().await.is_some());

    let events = events.lock().unwrap();
    assert_eq!(
        *events,
        vec![
            StoreEvent::Enqueued("my-queue".to_owned(), 1),
            StoreEvent::Dequeued("my-queue".to_owned(), 1),
        ]
    );
}

#[tokio::test]
async fn superseded_entries_are_dequeued_from_the_store() {
    let (store, events) = TestStore::new();
    let mut tester = TestCase::default()
        .with_policy(OrderingPolicy::Conflating {
            key: "ticker".to_owned(),
        })
        .with_store(Box::new(store))
        .build();

    for body in ["A", "B"] {
        let rx = tester
            .publish(message_with_property(body, "ticker", PropertyValue::Int(5)))
            .await;
        rx.await.unwrap().unwrap();
    }

    let events = events.lock().unwrap();
    assert_eq!(
        *events,
        vec![
            StoreEvent::Enqueued("my-queue".to_owned(), 1),
            StoreEvent::Enqueued("my-queue".to_owned(), 2),
            StoreEvent::Dequeued("my-queue".to_owned(), 1),
        ]
    );
}

#[tokio::test]
async fn transient_queue_ignores_a_store() {
    let (store, events) = TestStore::new();
    let queue = Queue {
        durable: false,
        ..Default::default()
    };

    let mut state = QueueState::new(queue, Some(Box::new(store)), None);

    let (tx, rx) = oneshot::channel();
    state
        .handle_command(QueueCommand::PublishMessage {
            message: Arc::new(text_message("transient")),
            result: tx,
        })
        .await
        .unwrap();
    rx.await.unwrap().unwrap();

    assert_eq!(state.entries.len(), 1);
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn no_ack_consumer_dequeues_promptly() {
    let mut tester = TestCase::default().build();
    let mut frx = tester
        .try_consume("ctag-1", 0, true, AcquisitionMode::Shared, None)
        .await
        .unwrap();

    tester.publish_ok("fire and forget").await;
    tester.run_delivery().await;

    assert!(recv_timeout(&mut frx).await.is_some());
    assert_eq!(tester.state.entries.len(), 0);
    assert!(tester.state.outbox.outgoing_messages.is_empty());
}

#[tokio::test]
async fn tx_enqueue_is_invisible_until_commit() {
    let mut tester = TestCase::default().build();

    tester
        .state
        .handle_command(QueueCommand::TxEnqueue {
            tx_id: "tx-1".to_owned(),
            message: Arc::new(text_message("staged")),
        })
        .await
        .unwrap();

    assert_eq!(tester.state.entries.len(), 0);

    let (tx, rx) = oneshot::channel();
    tester
        .state
        .handle_command(QueueCommand::TxCommit {
            tx_id: "tx-1".to_owned(),
            result: tx,
        })
        .await
        .unwrap();
    rx.await.unwrap().unwrap();

    assert_eq!(tester.state.entries.len(), 1);
}

#[tokio::test]
async fn tx_commit_with_a_failing_store_applies_nothing() {
    let (mut store, _events) = TestStore::new();
    store.fail_enqueue_at = Some(2);

    let mut tester = TestCase::default().with_store(Box::new(store)).build();

    for body in ["first", "second"] {
        tester
            .state
            .handle_command(QueueCommand::TxEnqueue {
                tx_id: "tx-1".to_owned(),
                message: Arc::new(text_message(body)),
            })
            .await
            .unwrap();
    }

    let (tx, rx) = oneshot::channel();
    tester
        .state
        .handle_command(QueueCommand::TxCommit {
            tx_id: "tx-1".to_owned(),
            result: tx,
        })
        .await
        .unwrap();
    assert!(rx.await.unwrap().is_err());

    // nothing was applied and the staged operations are kept for a retry
    assert_eq!(tester.state.entries.len(), 0);
    assert_eq!(tester.state.transactions.len(), 1);

    // the store recovered, the retried commit applies both
    let (tx, rx) = oneshot::channel();
    tester
        .state
        .handle_command(QueueCommand::TxCommit {
            tx_id: "tx-1".to_owned(),
            result: tx,
        })
        .await
        .unwrap();
    rx.await.unwrap().unwrap();

    assert_eq!(tester.state.entries.len(), 2);
    assert!(tester.state.transactions.is_empty());
}

#[tokio::test]
async fn tx_rollback_discards_staged_operations() {
    let mut tester = TestCase::default().build();
    let mut frx = tester.consume("ctag-1", 10).await;

    tester.publish_ok("held").await;
    tester.run_delivery().await;
    let delivery = recv_timeout(&mut frx).await.unwrap();

    tester
        .state
        .handle_command(QueueCommand::TxEnqueue {
            tx_id: "tx-1".to_owned(),
            message: Arc::new(text_message("staged")),
        })
        .await
        .unwrap();
    tester
        .state
        .handle_command(QueueCommand::TxAck {
            tx_id: "tx-1".to_owned(),
            consumer_tag: delivery.consumer_tag.clone(),
            delivery_tag: delivery.delivery_tag,
        })
        .await
        .unwrap();

    let (tx, rx) = oneshot::channel();
    tester
        .state
        .handle_command(QueueCommand::TxRollback {
            tx_id: "tx-1".to_owned(),
            result: tx,
        })
        .await
        .unwrap();
    rx.await.unwrap().unwrap();

    // the staged enqueue never happened and the consumer still holds the
    // delivered entry, a plain ack settles it
    assert_eq!(tester.state.entries.len(), 1);
    tester.ack(&delivery).await.unwrap();
    assert_eq!(tester.state.entries.len(), 0);
}

#[tokio::test]
async fn tx_commit_applies_enqueue_and_ack_atomically() {
    let mut tester = TestCase::default().build();
    let mut frx = tester.consume("ctag-1", 10).await;

    tester.publish_ok("old").await;
    tester.run_delivery().await;
    let delivery = recv_timeout(&mut frx).await.unwrap();

    tester
        .state
        .handle_command(QueueCommand::TxAck {
            tx_id: "tx-1".to_owned(),
            consumer_tag: delivery.consumer_tag.clone(),
            delivery_tag: delivery.delivery_tag,
        })
        .await
        .unwrap();
    tester
        .state
        .handle_command(QueueCommand::TxEnqueue {
            tx_id: "tx-1".to_owned(),
            message: Arc::new(text_message("new")),
        })
        .await
        .unwrap();

    let (tx, rx) = oneshot::channel();
    tester
        .state
        .handle_command(QueueCommand::TxCommit {
            tx_id: "tx-1".to_owned(),
            result: tx,
        })
        .await
        .unwrap();
    rx.await.unwrap().unwrap();
    tester.run_delivery().await;

    // old was dequeued, new was enqueued and delivered
    let delivery = recv_timeout(&mut frx).await.unwrap();
    assert_eq!(body_of(&delivery), "new");
    assert_eq!(tester.state.entries.len(), 1);
}

#[test]
fn commands_are_shareable_across_tasks() {
    fn assert_send_sync<T: Send + Sync>() {}

    assert_send_sync::<QueueCommand>();
    assert_send_sync::<crate::queue::manager::QueueManagerCommand>();
}

/// Concurrent-looking interleaving at the command level: many producers,
/// two competing consumers, every entry is delivered exactly once.
#[tokio::test]
async fn interleaved_publish_and_settle_neither_loses_nor_duplicates() {
    let mut tester = TestCase::default().build();
    let mut frx1 = tester.consume("ctag-1", 100).await;
    let mut frx2 = tester.consume("ctag-2", 100).await;

    for n in 0..20 {
        tester.publish_ok(&format!("m{n}")).await;
    }
    tester.run_delivery().await;

    let mut seen = Vec::<String>::new();
    while let Some(d) = recv_timeout(&mut frx1).await {
        seen.push(body_of(&d));
        tester.ack(&d).await.unwrap();
    }
    while let Some(d) = recv_timeout(&mut frx2).await {
        seen.push(body_of(&d));
        tester.ack(&d).await.unwrap();
    }

    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 20);
    assert_eq!(tester.state.entries.len(), 0);
}
