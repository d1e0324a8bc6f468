#![forbid(unsafe_code)]
//! Framed-pipe transport, request/reply correlator, and typed facade over the
//! `oftr` driver subprocess.
//!
//! This crate owns the boundary between the controller framework and the
//! driver binary: it spawns `oftr jsonrpc`, frames records on its stdio with
//! NUL terminators, matches replies to outstanding requests by `xid`/`id`,
//! merges multi-part (`MORE`-flagged) replies, and exposes a typed surface
//! for the handful of control RPCs the driver supports (`OFP.LISTEN`,
//! `OFP.CONNECT`, `OFP.CLOSE`, `OFP.ADD_IDENTITY`, `OFP.DESCRIPTION`) plus
//! raw OpenFlow message send/request.
//!
//! ```no_run
//! use oflow_driver::{Driver, DriverConfig};
//! use tokio::sync::mpsc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (unsolicited_tx, mut unsolicited_rx) = mpsc::channel(64);
//! let driver = Driver::open(&DriverConfig::default(), unsolicited_tx).await?;
//! let conn_id = driver.listen("tcp:6653", &[], &[1, 4], 0).await?;
//! println!("listening, conn_id={conn_id}");
//! # let _ = unsolicited_rx.try_recv();
//! # Ok(()) }
//! ```

mod correlator;
mod error;
mod facade;
mod process;
mod transport;

pub use correlator::{Correlator, DEFAULT_REQUEST_TIMEOUT};
pub use error::DriverError;
pub use facade::Driver;
pub use transport::{DriverConfig, Transport};
