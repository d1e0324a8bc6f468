#![forbid(unsafe_code)]
//! Event queue, datapath registry, task scopes, and the controller/dispatcher
//! engine that sits on top of `oflow-driver`'s framed-pipe transport.
//!
//! A [`Controller`] owns the driver, the bounded event queue fed by
//! unsolicited driver notifications, the [`Registry`] of live datapaths, and
//! the process-wide [`TaskScope`]. Embedders implement [`App`] and hand a
//! `Vec<Box<dyn App>>` plus a [`ControllerConfig`] to [`Controller::new`].
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use oflow_runtime::{Controller, ControllerConfig};
//!
//! let config = ControllerConfig::default();
//! let mut controller = Controller::new(config, Vec::new());
//! controller.run().await?;
//! # Ok(())
//! # }
//! ```

mod app;
mod config;
mod controller;
mod error;
mod lifecycle;
mod pkt;
mod queue;
mod registry;
mod tasks;

pub use app::{App, HandlerError};
pub use config::{ConfigError, ControllerConfig, ListenEndpoint, TlsMaterial};
pub use controller::Controller;
pub use error::ControllerError;
pub use lifecycle::{Phase, Signals};
pub use pkt::transform_packet_in;
pub use queue::{EventQueue, EventSender, DEFAULT_CAPACITY};
pub use registry::{Datapath, Registry};
pub use tasks::{TaskId, TaskScope};
