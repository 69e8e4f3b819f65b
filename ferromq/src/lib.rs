//! ferromq is the in-memory queue core of an AMQP-style message broker. It
//! holds the messages routed to a queue, orders them according to the queue's
//! policy (FIFO, priority, sorted or last-value conflation), and delivers
//! them to registered consumers under acknowledgement and exclusivity rules.
//!
//! Wire protocol framing, exchange routing, persistence formats and the
//! housekeeping scheduler are external collaborators; this crate exposes the
//! command surface they call into.
pub mod config;
pub mod error;
pub mod message;
pub mod queue;
pub mod store;

pub use error::{Error, Result};

#[macro_export]
macro_rules! chk {
    ($val:expr) => {
        match $val {
            ok @ Ok(_) => ok,
            Err(e) => {
                log::error!("Error {:?}", e);

                Err(e)
            }
        }
    };
}

#[macro_export]
macro_rules! logerr {
    ($val:expr) => {
        if let Err(e) = $val {
            error!("Error {:?}", e);
        }
    };
}

#[macro_export]
macro_rules! send {
    ($channel:expr, $message:expr) => {
        $channel
            .send_timeout($message, tokio::time::Duration::from_secs(1))
            .await
    };
}
