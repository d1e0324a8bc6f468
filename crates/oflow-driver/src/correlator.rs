use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use oflow_proto::{Message, MessageKind, Xid, XID_RESERVED_MAX, XID_WRAP_START};
use serde_json::Value;
use tokio::{
    sync::{mpsc, oneshot, Mutex},
    task::JoinHandle,
    time,
};
use tracing::warn;

use crate::{DriverError, Transport};

/// Default timeout applied to a [`Correlator::request`] call that doesn't
/// specify one (§5).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);
const IDLE_CHECK_PERIOD: Duration = Duration::from_millis(500);

struct Accumulator {
    type_tag: String,
    items: Vec<Value>,
}

struct PendingEntry {
    created: Instant,
    deadline: Instant,
    accumulator: Option<Accumulator>,
    reply_tx: oneshot::Sender<Result<Message, DriverError>>,
}

type PendingMap = Arc<Mutex<HashMap<Xid, PendingEntry>>>;

/// Pairs outbound requests with inbound replies, enforces timeouts, merges
/// multi-part replies, and forwards unsolicited messages onward (§4.B).
pub struct Correlator {
    transport: Arc<Transport>,
    pending: PendingMap,
    next_xid: AtomicU32,
    tasks: Vec<JoinHandle<()>>,
}

impl Correlator {
    /// Takes ownership of the transport's record stream and starts the
    /// reply-dispatch and idle-timeout background tasks. Unsolicited
    /// messages (notifications with no matching pending request) are
    /// forwarded to `unsolicited_tx` — typically the sending half of an
    /// [`crate`]-external event queue.
    pub async fn start(
        transport: Arc<Transport>,
        unsolicited_tx: mpsc::Sender<Message>,
    ) -> Result<Self, DriverError> {
        let records_rx = transport
            .take_records()
            .await
            .ok_or(DriverError::ChannelClosed)?;
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let dispatch_handle = tokio::spawn(dispatch_task(records_rx, pending.clone(), unsolicited_tx));
        let idle_handle = tokio::spawn(idle_sweep_task(pending.clone()));

        Ok(Self {
            transport,
            pending,
            next_xid: AtomicU32::new(XID_WRAP_START),
            tasks: vec![dispatch_handle, idle_handle],
        })
    }

    /// Monotonic counter with wraparound; stays within the dynamic
    /// `(255, 2^32-256]` range reserved for caller-assignable xids.
    pub fn assign_xid(&self) -> Xid {
        loop {
            let current = self.next_xid.load(Ordering::SeqCst);
            let next = next_dynamic_xid(current);
            if self
                .next_xid
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return current;
            }
        }
    }

    /// Hands `record` to the transport without tracking a reply.
    pub fn send(&self, record: Message) -> Result<(), DriverError> {
        self.transport.write(record)
    }

    /// Terminates the driver subprocess and waits for it to exit (§4.A
    /// `Close`).
    pub async fn close(&self) -> Result<std::process::ExitStatus, DriverError> {
        self.transport.close().await
    }

    /// Registers a pending request at `xid` with the given timeout, sends
    /// `record`, and waits for the matched reply (or failure).
    pub async fn request(
        &self,
        record: Message,
        xid: Xid,
        timeout: Duration,
    ) -> Result<Message, DriverError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let now = Instant::now();
        {
            let mut guard = self.pending.lock().await;
            guard.insert(
                xid,
                PendingEntry {
                    created: now,
                    deadline: now + timeout,
                    accumulator: None,
                    reply_tx,
                },
            );
        }

        if let Err(err) = self.transport.write(record) {
            self.pending.lock().await.remove(&xid);
            return Err(err);
        }

        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(DriverError::ChannelClosed),
        }
    }
}

impl Drop for Correlator {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn dispatch_task(
    mut records_rx: mpsc::UnboundedReceiver<Message>,
    pending: PendingMap,
    unsolicited_tx: mpsc::Sender<Message>,
) {
    while let Some(message) = records_rx.recv().await {
        handle_message(message, &pending, &unsolicited_tx).await;
    }

    let mut guard = pending.lock().await;
    for (_, entry) in guard.drain() {
        let _ = entry.reply_tx.send(Err(DriverError::ChannelClosed));
    }
}

async fn handle_message(message: Message, pending: &PendingMap, unsolicited_tx: &mpsc::Sender<Message>) {
    let Some(correlation_id) = message.correlation_id() else {
        warn!("driver record has neither xid nor id; dropping");
        return;
    };
    let xid = correlation_id as Xid;

    let mut guard = pending.lock().await;
    if !guard.contains_key(&xid) {
        drop(guard);
        if matches!(message.kind(), MessageKind::OpenFlow) && !message.is_async_notification() {
            warn!(xid, "unmatched reply with no pending request; dropping");
        } else {
            let _ = unsolicited_tx.send(message).await;
        }
        return;
    }

    if message.is_error() {
        let entry = guard.remove(&xid).expect("checked above");
        let _ = entry.reply_tx.send(Err(DriverError::request(xid, message)));
        return;
    }

    if message.is_more() {
        let entry = guard.get_mut(&xid).expect("checked above");
        let type_tag = message.type_tag().unwrap_or_default().to_string();
        let items = message_items(&message);
        match entry.accumulator.as_mut() {
            Some(acc) => {
                if acc.type_tag != type_tag {
                    warn!(
                        xid,
                        expected = %acc.type_tag,
                        got = %type_tag,
                        "multi-part reply type changed mid-sequence; appending anyway"
                    );
                }
                acc.items.extend(items);
            }
            None => entry.accumulator = Some(Accumulator { type_tag, items }),
        }
        return;
    }

    let entry = guard.remove(&xid).expect("checked above");
    resolve(entry, message);
}

fn message_items(message: &Message) -> Vec<Value> {
    match message.msg() {
        Some(Value::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
        None => Vec::new(),
    }
}

fn resolve(entry: PendingEntry, terminal: Message) {
    let merged = match entry.accumulator {
        Some(mut acc) => {
            acc.items.extend(message_items(&terminal));
            let mut merged = terminal;
            merged.insert("msg".to_string(), Value::Array(acc.items));
            merged
        }
        None => terminal,
    };

    match merged.kind() {
        MessageKind::RpcResponse => {
            if merged.error().is_some() {
                let _ = entry.reply_tx.send(Err(DriverError::request(
                    merged.rpc_id().unwrap_or_default() as Xid,
                    merged,
                )));
            } else {
                let result = merged.result().cloned().unwrap_or(Value::Object(Default::default()));
                let resolved = Message::from_value(result)
                    .unwrap_or_else(|| Message::from_value(Value::Object(Default::default())).unwrap());
                let _ = entry.reply_tx.send(Ok(resolved));
            }
        }
        _ => {
            let _ = entry.reply_tx.send(Ok(merged));
        }
    }
}

/// The highest xid `assign_xid` may hand out before wrapping back to
/// `XID_WRAP_START`.
const XID_DYNAMIC_MAX: Xid = u32::MAX - XID_RESERVED_MAX;

fn next_dynamic_xid(current: Xid) -> Xid {
    if current >= XID_DYNAMIC_MAX {
        XID_WRAP_START
    } else {
        current + 1
    }
}

async fn idle_sweep_task(pending: PendingMap) {
    let mut ticker = time::interval(IDLE_CHECK_PERIOD);
    loop {
        ticker.tick().await;
        let now = Instant::now();
        let expired: Vec<Xid> = {
            let guard = pending.lock().await;
            guard
                .iter()
                .filter(|(_, entry)| entry.deadline <= now)
                .map(|(xid, _)| *xid)
                .collect()
        };
        if expired.is_empty() {
            continue;
        }
        let mut guard = pending.lock().await;
        for xid in expired {
            if let Some(entry) = guard.remove(&xid) {
                let waited = now.duration_since(entry.created);
                let _ = entry.reply_tx.send(Err(DriverError::Timeout { xid, waited }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop_message(xid: Xid) -> Message {
        Message::openflow("BARRIER_REQUEST", json!({})).tap_xid(xid)
    }

    trait TapXid {
        fn tap_xid(self, xid: Xid) -> Self;
    }

    impl TapXid for Message {
        fn tap_xid(mut self, xid: Xid) -> Self {
            self.set_xid(xid);
            self
        }
    }

    #[test]
    fn assign_xid_never_returns_reserved_range() {
        let mut current = XID_WRAP_START;
        for _ in 0..1000 {
            assert!(current > XID_RESERVED_MAX);
            current = next_dynamic_xid(current);
        }
    }

    #[test]
    fn assign_xid_wraps_before_u32_max() {
        assert_eq!(next_dynamic_xid(XID_DYNAMIC_MAX - 1), XID_DYNAMIC_MAX);
        assert_eq!(next_dynamic_xid(XID_DYNAMIC_MAX), XID_WRAP_START);
        assert_eq!(next_dynamic_xid(u32::MAX), XID_WRAP_START);
    }

    #[test]
    fn message_items_wraps_scalar_payloads() {
        let single = Message::from_value(json!({"type": "X", "msg": {"a": 1}})).unwrap();
        assert_eq!(message_items(&single).len(), 1);

        let list = Message::from_value(json!({"type": "X", "msg": [{"a": 1}, {"a": 2}]})).unwrap();
        assert_eq!(message_items(&list).len(), 2);

        let none = Message::from_value(json!({"type": "X"})).unwrap();
        assert!(message_items(&none).is_empty());
    }

    #[test]
    fn noop_message_carries_xid() {
        let message = noop_message(42);
        assert_eq!(message.xid(), Some(42));
    }
}
