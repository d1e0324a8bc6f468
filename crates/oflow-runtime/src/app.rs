use async_trait::async_trait;
use oflow_proto::Message;

use crate::registry::Datapath;

/// The error type a handler or lifecycle hook returns; carried into
/// [`App::on_exception`] or the built-in fallback logger.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// User-written controller logic. Apps register the event-type tags they
/// care about up front; the dispatcher resolves and caches, per event type,
/// which registered apps should be invoked (§9 DESIGN NOTES — a lookup
/// table populated at init, never method-name reflection at dispatch time).
#[async_trait]
pub trait App: Send + Sync {
    /// Stable name used in logs and panic/exception attribution.
    fn name(&self) -> &str;

    /// Event-type tags (`CHANNEL_UP`, `PACKET_IN`, ...) this app wants
    /// delivered. Called once per app at startup; the result is not
    /// expected to change afterward.
    fn event_types(&self) -> &[&'static str];

    /// Invoked once during the startup sequence, in app registration order.
    async fn on_start(&self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Invoked once during the shutdown sequence, in app registration order.
    async fn on_stop(&self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Receives a handler's error or caught panic. The default does
    /// nothing; the dispatcher already logs at CRITICAL before calling
    /// this, matching "delivered to the first app exposing OnException;
    /// else logged and swallowed" (an app opts in by overriding this).
    fn on_exception(&self, event_type: &str, error: &HandlerError) {
        let _ = (event_type, error);
    }

    /// Synchronous handler body. `datapath` is `None` for events that
    /// precede registry creation or that aren't datapath-scoped (e.g. a
    /// `CHANNEL_ALERT` with no resolvable `conn_id`). Background work must
    /// be spawned via the Datapath's (or the process-wide) task scope
    /// rather than awaited here.
    fn handle(&self, datapath: Option<&Datapath>, event_type: &str, event: &Message) -> Result<(), HandlerError>;
}
