#![forbid(unsafe_code)]
//! Wire-level types shared between the driver transport and the controller runtime.
//!
//! The driver subprocess speaks a dynamically-shaped JSON protocol: every
//! record is an object with a handful of well-known keys and an opaque
//! payload. Rather than modelling every OpenFlow message type, this crate
//! exposes a tagged [`Message`] that inspects only the fields the framework
//! itself needs (`type`, `xid`, `conn_id`, `datapath_id`, `flags`, `msg`,
//! ...) and forwards everything else untouched.

mod message;
mod port;
mod xid;

pub use message::{Message, MessageKind, ASYNC_NOTIFICATION_TYPES};
pub use port::{Port, PortChange};
pub use xid::{Xid, XID_RESERVED_MAX, XID_WRAP_START};
