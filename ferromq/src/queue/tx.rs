//! Staged queue operations of the transaction collaborator (DTX). Operations
//! are buffered per transaction id and applied in staging order on commit, or
//! discarded on rollback. A staged ack leaves its entry acquired by the
//! consumer until the transaction settles.
use crate::message::Message;
use std::sync::Arc;

#[derive(Debug)]
pub(crate) enum StagedOp {
    Enqueue(Arc<Message>),
    Ack { consumer_tag: String, delivery_tag: u64 },
}

#[derive(Debug, Default)]
pub(crate) struct TxBuffer {
    ops: Vec<StagedOp>,
}

impl TxBuffer {
    pub fn stage(&mut self, op: StagedOp) {
        self.ops.push(op);
    }

    pub fn ops(&self) -> &[StagedOp] {
        &self.ops
    }

    pub fn take_ops(self) -> Vec<StagedOp> {
        self.ops
    }
}
