//! Messages are routed to queues by the exchange collaborator. The queue core
//! treats the payload as opaque, it only looks at the properties which drive
//! the ordering policies: priority, the sort property and the conflation key.
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// A typed message property value.
///
/// Ordering is total: integers order numerically and sort before strings,
/// strings order lexicographically. Equal values are tie-broken by the entry
/// sequence number in the entry lists.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PropertyValue {
    Int(i64),
    Str(String),
}

#[derive(Clone, Default)]
pub struct Message {
    /// Id of the connection which published this message.
    pub source_connection: String,
    pub body: Bytes,
    /// Priority used by priority queues, clamped to the supported levels.
    pub priority: Option<u8>,
    /// Per-message expiration, overrides the queue level default.
    pub ttl: Option<Duration>,
    pub properties: HashMap<String, PropertyValue>,
}

impl Message {
    pub fn body_size(&self) -> u64 {
        self.body.len() as u64
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = String::from_utf8_lossy(&self.body[..std::cmp::min(64usize, self.body.len())]);

        f.debug_struct("Message")
            .field("connection", &self.source_connection)
            .field("body", &body.to_string())
            .field("priority", &self.priority)
            .finish()
    }
}
