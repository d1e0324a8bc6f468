use std::{collections::HashMap, time::Duration};

use oflow_driver::{Driver, DriverConfig};
use oflow_proto::Message;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::{
    app::{App, HandlerError},
    config::ControllerConfig,
    lifecycle::{Phase, Signals},
    pkt::transform_packet_in,
    queue::{EventQueue, DEFAULT_CAPACITY},
    registry::{Datapath, Registry},
    tasks::TaskScope,
    ControllerError,
};

/// Shutdown task-drain deadline (§5).
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(3);

/// The top-level engine: owns the driver, the event queue, the registry,
/// the process-wide task scope, and the set of registered apps (§4.G).
pub struct Controller {
    config: ControllerConfig,
    apps: Vec<Box<dyn App>>,
    registry: Registry,
    global_scope: TaskScope,
    handler_cache: HashMap<String, Vec<usize>>,
    phase: Phase,
}

impl Controller {
    pub fn new(config: ControllerConfig, apps: Vec<Box<dyn App>>) -> Self {
        Self {
            config,
            apps,
            registry: Registry::new(),
            global_scope: TaskScope::new("global"),
            handler_cache: HashMap::new(),
            phase: Phase::Init,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Runs the full startup → event loop → shutdown lifecycle. Returns once
    /// an exit signal has been handled and shutdown has completed.
    pub async fn run(&mut self) -> Result<(), ControllerError> {
        self.phase = Phase::Start;
        let mut signals = Signals::install()?;

        let (unsolicited_tx, mut queue) = EventQueue::bounded(DEFAULT_CAPACITY);
        let driver_config = DriverConfig {
            binary: self.config.driver_path.clone(),
            debug: self.config.debug,
            rpc_socket: None,
        };
        let driver = Driver::open(&driver_config, unsolicited_tx).await?;

        for app in &self.apps {
            if let Err(err) = app.on_start().await {
                error!(app = app.name(), %err, "on_start failed");
            }
        }

        let tls_id = if let Some(tls) = &self.config.tls {
            driver
                .add_identity(
                    &tls.cert.to_string_lossy(),
                    &tls.cacert.to_string_lossy(),
                    &tls.privkey.to_string_lossy(),
                )
                .await?
        } else {
            0
        };
        for listen in &self.config.listen {
            let options: Vec<&str> = listen.options.iter().map(String::as_str).collect();
            let conn_id = driver.listen(&listen.endpoint, &options, &listen.versions, tls_id).await?;
            info!(endpoint = %listen.endpoint, conn_id, "listening");
        }

        self.phase = Phase::Running;

        loop {
            tokio::select! {
                biased;
                _ = signals.wait_one() => {
                    info!("exit signal received, starting graceful shutdown");
                    break;
                }
                event = queue.recv() => {
                    match event {
                        Some(event) => {
                            self.dispatch_event(event)?;
                            tokio::task::yield_now().await;
                        }
                        None => {
                            warn!("event queue closed unexpectedly; shutting down");
                            break;
                        }
                    }
                }
            }
        }

        self.shutdown(&driver, &mut queue, &mut signals).await
    }

    fn dispatch_event(&mut self, mut event: Message) -> Result<(), ControllerError> {
        let Some(event_type) = event.type_tag().map(str::to_string) else {
            warn!("event has no type tag; dropping");
            return Ok(());
        };
        let conn_id = event.conn_id();

        match event_type.as_str() {
            "CHANNEL_UP" => {
                self.registry.channel_up(&event)?;
            }
            "CHANNEL_DOWN" => {
                let Some(conn_id) = conn_id else { return Ok(()) };
                let Some(mut dp) = self.registry.channel_down(conn_id) else {
                    return Ok(());
                };
                dp.scope.cancel();
                let indices = self.resolve_handlers(&event_type);
                invoke_handlers(&self.apps, &indices, Some(&dp), &event_type, &event);
                return Ok(());
            }
            _ => {
                if let Some(conn_id) = conn_id {
                    if matches!(self.registry.by_conn_id(conn_id), Some(dp) if dp.closed) {
                        return Ok(());
                    }
                }
            }
        }

        match event_type.as_str() {
            "PACKET_IN" => transform_packet_in(&mut event),
            "PORT_STATUS" => {
                if let Some(conn_id) = conn_id {
                    self.registry.port_status(conn_id, &event);
                }
            }
            _ => {}
        }

        let indices = self.resolve_handlers(&event_type);
        if indices.is_empty() && event_type == "CHANNEL_ALERT" {
            warn!(?event, "unhandled CHANNEL_ALERT");
            return Ok(());
        }
        let dp = conn_id.and_then(|id| self.registry.by_conn_id(id));
        invoke_handlers(&self.apps, &indices, dp, &event_type, &event);
        Ok(())
    }

    fn resolve_handlers(&mut self, event_type: &str) -> Vec<usize> {
        if let Some(cached) = self.handler_cache.get(event_type) {
            return cached.clone();
        }
        let resolved: Vec<usize> = self
            .apps
            .iter()
            .enumerate()
            .filter(|(_, app)| app.event_types().contains(&event_type))
            .map(|(i, _)| i)
            .collect();
        self.handler_cache.insert(event_type.to_string(), resolved.clone());
        resolved
    }

    async fn shutdown(
        &mut self,
        driver: &Driver,
        queue: &mut EventQueue,
        signals: &mut Signals,
    ) -> Result<(), ControllerError> {
        self.phase = Phase::Stop;

        for conn_id in self.registry.live_conn_ids() {
            let Some(mut dp) = self.registry.take_for_shutdown(conn_id) else {
                continue;
            };
            dp.closed = true;
            dp.scope.cancel();
            let mut synthetic = Message::openflow("CHANNEL_DOWN", Value::Object(Default::default()));
            synthetic.insert("conn_id", json!(conn_id));
            let indices = self.resolve_handlers("CHANNEL_DOWN");
            invoke_handlers(&self.apps, &indices, Some(&dp), "CHANNEL_DOWN", &synthetic);
        }

        // Escalate to killing the driver immediately on a second signal
        // while the rest of shutdown is still in flight.
        let escalate = signals.wait_one();
        tokio::pin!(escalate);

        self.global_scope.cancel();
        tokio::select! {
            biased;
            _ = &mut escalate => {
                warn!("second exit signal received; force-closing driver");
                let _ = driver.shutdown().await;
            }
            result = self.global_scope.wait_cancelled(SHUTDOWN_DRAIN) => {
                if let Err(err) = result {
                    warn!(%err, "task scope did not drain within the shutdown deadline");
                }
            }
        }

        let residual = queue.drain();
        if residual > 0 {
            info!(residual, "discarded residual events at shutdown");
        }

        for app in &self.apps {
            if let Err(err) = app.on_stop().await {
                error!(app = app.name(), %err, "on_stop failed");
            }
        }

        driver.shutdown().await?;
        Ok(())
    }
}

fn invoke_handlers(
    apps: &[Box<dyn App>],
    indices: &[usize],
    dp: Option<&Datapath>,
    event_type: &str,
    event: &Message,
) {
    for &idx in indices {
        let app = &apps[idx];
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| app.handle(dp, event_type, event)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(app = app.name(), event_type, %err, "handler failed");
                app.on_exception(event_type, &err);
            }
            Err(panic) => {
                let message = panic_message(&panic);
                error!(app = app.name(), event_type, %message, "handler panicked");
                let boxed: HandlerError = message.into();
                app.on_exception(event_type, &boxed);
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
