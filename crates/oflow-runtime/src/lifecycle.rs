use tracing::info;

/// The controller's lifecycle phase (§4.H). Transitions only forward;
/// no OpenFlow events are dispatched outside `Start..Stop`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    Init,
    Start,
    Running,
    Stop,
}

impl Phase {
    pub fn can_dispatch_events(self) -> bool {
        matches!(self, Phase::Running)
    }
}

/// Waits for the configured exit signals and reports first-signal vs.
/// escalation (a second signal during shutdown), grounded on
/// `build_signals_fut`'s unix `SignalKind` trio — extended with a second
/// wait for the escalate case `spec.md` §4.H requires.
pub struct Signals {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    quit: tokio::signal::unix::Signal,
}

impl Signals {
    #[cfg(unix)]
    pub fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {})
    }

    /// Waits for any one exit signal. Used twice: once to trigger graceful
    /// shutdown, and a second time (raced against shutdown completing) to
    /// detect escalation.
    #[cfg(unix)]
    pub async fn wait_one(&mut self) {
        tokio::select! {
            _ = self.terminate.recv() => info!("received SIGTERM"),
            _ = self.interrupt.recv() => info!("received SIGINT"),
            _ = self.quit.recv() => info!("received SIGQUIT"),
        }
    }

    #[cfg(not(unix))]
    pub async fn wait_one(&mut self) {
        let _ = tokio::signal::ctrl_c().await;
        info!("received ctrl-c");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_running_dispatches_events() {
        assert!(!Phase::Init.can_dispatch_events());
        assert!(!Phase::Start.can_dispatch_events());
        assert!(Phase::Running.can_dispatch_events());
        assert!(!Phase::Stop.can_dispatch_events());
    }
}
