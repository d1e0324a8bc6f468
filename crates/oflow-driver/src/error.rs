use std::{path::PathBuf, time::Duration};

use oflow_proto::{Message, Xid};
use thiserror::Error;

/// Errors surfaced by the driver transport, correlator, and facade.
///
/// Maps directly onto the taxonomy in the framework's error-handling design:
/// transport failure, request timeout, request error (RPC), and the
/// argument-validation rule on caller-supplied xids.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver binary `{binary}` could not be spawned: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to wait for driver process: {source}")]
    Wait {
        #[source]
        source: std::io::Error,
    },
    #[error("driver connection closed")]
    ChannelClosed,
    #[error("request {xid} timed out after {waited:?}")]
    Timeout { xid: Xid, waited: Duration },
    #[error("driver returned an error for request {xid}: {message:?}")]
    Request { xid: Xid, message: Box<Message> },
    #[error("xid {0} is reserved for driver use; caller-supplied xids must be > 255")]
    ReservedXid(Xid),
    #[error("failed to serialize outgoing record: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl DriverError {
    pub fn request(xid: Xid, message: Message) -> Self {
        Self::Request {
            xid,
            message: Box::new(message),
        }
    }
}
