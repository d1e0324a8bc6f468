use oflow_proto::Message;
use oflow_runtime::{App, Datapath, HandlerError};
use tracing::info;

/// An `App` that does nothing but log every event it receives, wired up by
/// `ofctl run` so the command is useful without any user-supplied logic.
pub struct LoggingApp;

#[async_trait::async_trait]
impl App for LoggingApp {
    fn name(&self) -> &str {
        "logging-app"
    }

    fn event_types(&self) -> &[&'static str] {
        &[
            "CHANNEL_UP",
            "CHANNEL_DOWN",
            "CHANNEL_ALERT",
            "PACKET_IN",
            "PORT_STATUS",
            "FLOW_REMOVED",
        ]
    }

    fn handle(&self, datapath: Option<&Datapath>, event_type: &str, _event: &Message) -> Result<(), HandlerError> {
        match datapath {
            Some(dp) => info!(event_type, datapath_id = %dp.datapath_id, "event"),
            None => info!(event_type, "event"),
        }
        Ok(())
    }
}
