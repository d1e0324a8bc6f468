use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the registry, task scopes, and controller/dispatcher.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("driver transport failed: {0}")]
    Transport(#[from] oflow_driver::DriverError),
    #[error("failed to install signal handlers: {0}")]
    SignalInstall(#[from] std::io::Error),
    #[error("channel up for already-registered conn_id={conn_id}")]
    ConnIdAlreadyRegistered { conn_id: u32 },
    #[error("channel up for already-registered datapath_id={datapath_id}")]
    DatapathIdAlreadyRegistered { datapath_id: String },
    #[error("channel up event is missing a datapath_id")]
    MissingDatapathId,
    #[error("{remaining} task(s) in scope {scope} did not exit within {deadline:?}")]
    TasksDidNotExit { scope: String, remaining: usize, deadline: Duration },
}
