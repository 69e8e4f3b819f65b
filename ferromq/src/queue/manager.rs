//! The queue registry of a virtual host. It maps queue names to the command
//! sinks of their running tasks and fans the periodic housekeeping sweep out
//! to every queue. It is deliberately thin: all queue semantics live in the
//! per-queue handler.
use crate::error::QueueError;
use crate::queue::consumer::ConsumerSpec;
use crate::queue::handler::{self, QueueCommand, QueueCommandSink};
use crate::queue::Queue;
use crate::store::{DeadLetterSink, QueueStore};
use crate::{chk, logerr, send, Result};
use log::error;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::{mpsc, oneshot};

struct QueueHandle {
    queue: Queue,
    command_sink: QueueCommandSink,
}

pub struct QueueDeclareCommand {
    pub queue: Queue,
    /// Persistence collaborator of a durable queue.
    pub store: Option<Box<dyn QueueStore>>,
    pub dead_letters: Option<DeadLetterSink>,
}

impl fmt::Debug for QueueDeclareCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueDeclareCommand")
            .field("queue", &self.queue)
            .field("store", &self.store.as_ref().map(|_| "<store>"))
            .finish()
    }
}

#[derive(Debug)]
pub struct RegisterConsumerCommand {
    pub queue_name: String,
    pub spec: ConsumerSpec,
}

#[derive(Debug)]
pub struct QueueCancelConsume {
    pub queue_name: String,
    pub consumer_tag: String,
}

#[derive(Debug)]
pub struct QueueDeleteCommand {
    pub queue_name: String,
    pub if_unused: bool,
    pub if_empty: bool,
}

#[derive(Debug)]
pub enum QueueManagerCommand {
    Declare(QueueDeclareCommand, oneshot::Sender<Result<()>>),
    Consume(RegisterConsumerCommand, oneshot::Sender<Result<(String, QueueCommandSink)>>),
    CancelConsume(QueueCancelConsume, oneshot::Sender<Result<()>>),
    Delete(QueueDeleteCommand, oneshot::Sender<Result<u32>>),
    GetQueueSink(String, oneshot::Sender<Result<QueueCommandSink>>),
    GetQueues(oneshot::Sender<Vec<Queue>>),
    SweepExpired(oneshot::Sender<usize>),
}

pub type QueueManagerSink = mpsc::Sender<QueueManagerCommand>;

pub fn start() -> QueueManagerSink {
    let (sink, stream) = mpsc::channel(1);

    tokio::spawn(async move {
        let mut manager = QueueManagerState {
            command_stream: stream,
            queues: HashMap::new(),
        };

        if let Err(e) = manager.command_loop().await {
            error!("Queue manager exited {:?}", e);
        }
    });

    sink
}

pub async fn declare_queue(mgr: &QueueManagerSink, cmd: QueueDeclareCommand) -> Result<()> {
    let (tx, rx) = oneshot::channel();

    send!(mgr, QueueManagerCommand::Declare(cmd, tx))?;

    rx.await?
}

pub async fn delete_queue(mgr: &QueueManagerSink, cmd: QueueDeleteCommand) -> Result<u32> {
    let (tx, rx) = oneshot::channel();

    send!(mgr, QueueManagerCommand::Delete(cmd, tx))?;

    rx.await?
}

/// Registers a consumer and gives back the generated consumer tag together
/// with the queue command sink for the ack and reject calls.
pub async fn register_consumer(mgr: &QueueManagerSink, cmd: RegisterConsumerCommand) -> Result<(String, QueueCommandSink)> {
    let (tx, rx) = oneshot::channel();

    send!(mgr, QueueManagerCommand::Consume(cmd, tx))?;

    rx.await?
}

pub async fn cancel_consumer(mgr: &QueueManagerSink, cmd: QueueCancelConsume) -> Result<()> {
    let (tx, rx) = oneshot::channel();

    chk!(send!(mgr, QueueManagerCommand::CancelConsume(cmd, tx)))?;

    rx.await?
}

pub async fn get_command_sink(mgr: &QueueManagerSink, queue_name: &str) -> Result<QueueCommandSink> {
    let (tx, rx) = oneshot::channel();

    send!(mgr, QueueManagerCommand::GetQueueSink(queue_name.to_owned(), tx))?;

    rx.await?
}

pub async fn get_queues(mgr: &QueueManagerSink) -> Vec<Queue> {
    let (tx, rx) = oneshot::channel();

    logerr!(mgr.send(QueueManagerCommand::GetQueues(tx)).await);

    match rx.await {
        Ok(queues) => queues,
        Err(_) => vec![],
    }
}

/// Entry point of the housekeeping collaborator, expires entries on every
/// queue and reports the total count.
pub async fn sweep_expired(mgr: &QueueManagerSink) -> Result<usize> {
    let (tx, rx) = oneshot::channel();

    send!(mgr, QueueManagerCommand::SweepExpired(tx))?;

    Ok(rx.await?)
}

struct QueueManagerState {
    command_stream: mpsc::Receiver<QueueManagerCommand>,
    queues: HashMap<String, QueueHandle>,
}

impl QueueManagerState {
    async fn command_loop(&mut self) -> Result<()> {
        use QueueManagerCommand::*;

        while let Some(command) = self.command_stream.recv().await {
            match command {
                Declare(cmd, tx) => {
                    logerr!(tx.send(self.handle_declare(cmd)));
                }
                Delete(cmd, tx) => {
                    logerr!(tx.send(self.handle_delete(cmd).await));
                }
                Consume(cmd, tx) => {
                    logerr!(tx.send(self.handle_consume(cmd).await));
                }
                CancelConsume(cmd, tx) => match self.handle_cancel(cmd).await {
                    Ok((queue_name, still_alive)) => {
                        logerr!(tx.send(Ok(())));

                        if !still_alive {
                            // auto-delete queue lost its last consumer
                            self.queues.remove(&queue_name);
                        }
                    }
                    Err(e) => {
                        error!("Error {:?}", e);

                        logerr!(tx.send(Ok(())));
                    }
                },
                GetQueueSink(queue_name, tx) => {
                    logerr!(tx.send(self.handle_get_command_sink(&queue_name)));
                }
                GetQueues(tx) => {
                    let qs = self.queues.values().map(|handle| handle.queue.clone()).collect();

                    logerr!(tx.send(qs));
                }
                SweepExpired(tx) => {
                    logerr!(tx.send(self.handle_sweep().await));
                }
            }
        }

        Ok(())
    }

    /// Declare queue with the given parameters. Declare means if the queue
    /// hasn't existed yet, it creates that.
    fn handle_declare(&mut self, command: QueueDeclareCommand) -> Result<()> {
        match self.queues.get(&command.queue.name) {
            Some(_) => Ok(()),
            None => {
                let (cmd_tx, mut cmd_rx) = mpsc::channel(1);
                let queue_name = command.queue.name.clone();
                let handle = QueueHandle {
                    queue: command.queue.clone(),
                    command_sink: cmd_tx,
                };

                tokio::spawn(async move {
                    handler::start(command.queue, command.store, command.dead_letters, &mut cmd_rx).await;
                });

                self.queues.insert(queue_name, handle);

                Ok(())
            }
        }
    }

    async fn handle_delete(&mut self, command: QueueDeleteCommand) -> Result<u32> {
        match self.queues.get(&command.queue_name) {
            Some(handle) => {
                let (tx, rx) = oneshot::channel();

                send!(
                    handle.command_sink,
                    QueueCommand::DeleteQueue {
                        if_unused: command.if_unused,
                        if_empty: command.if_empty,
                        result: tx,
                    }
                )?;

                let res = rx.await?;

                if res.is_ok() {
                    self.queues.remove(&command.queue_name);
                }

                res
            }
            None => QueueError::NotFound.into_result(&command.queue_name, "Not found"),
        }
    }

    async fn handle_consume(&self, command: RegisterConsumerCommand) -> Result<(String, QueueCommandSink)> {
        match self.queues.get(&command.queue_name) {
            Some(handle) => {
                let (tx, rx) = oneshot::channel();

                send!(
                    handle.command_sink,
                    QueueCommand::RegisterConsumer {
                        spec: command.spec,
                        result: tx,
                    }
                )?;

                match rx.await? {
                    Ok(consumer_tag) => Ok((consumer_tag, handle.command_sink.clone())),
                    Err(e) => {
                        error!("Error on queue {} {:?}", command.queue_name, e);

                        Err(e)
                    }
                }
            }
            None => QueueError::NotFound.into_result(&command.queue_name, "Not found"),
        }
    }

    async fn handle_cancel(&self, command: QueueCancelConsume) -> Result<(String, bool)> {
        match self.queues.get(&command.queue_name) {
            Some(handle) => {
                let (tx, rx) = oneshot::channel();

                send!(
                    handle.command_sink,
                    QueueCommand::CancelConsumer {
                        consumer_tag: command.consumer_tag,
                        result: tx,
                    }
                )?;

                Ok((command.queue_name, rx.await?))
            }
            None => Ok((command.queue_name, true)),
        }
    }

    fn handle_get_command_sink(&self, queue_name: &str) -> Result<QueueCommandSink> {
        match self.queues.get(queue_name) {
            Some(handle) => Ok(handle.command_sink.clone()),
            None => QueueError::NotFound.into_result(queue_name, "Not found"),
        }
    }

    async fn handle_sweep(&self) -> usize {
        let mut total = 0;

        for handle in self.queues.values() {
            let (tx, rx) = oneshot::channel();

            if send!(handle.command_sink, QueueCommand::SweepExpired { result: tx }).is_err() {
                continue;
            }

            if let Ok(count) = rx.await {
                total += count;
            }
        }

        total
    }
}
