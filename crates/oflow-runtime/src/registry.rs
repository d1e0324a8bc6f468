use std::collections::HashMap;

use oflow_proto::{Message, Port, PortChange};
use tracing::warn;

use crate::{ControllerError, TaskScope};

/// A connected switch and everything the framework tracks about it (§3).
pub struct Datapath {
    pub conn_id: u32,
    pub datapath_id: String,
    pub endpoint: Option<String>,
    pub version: Option<u8>,
    pub ports: HashMap<u32, Port>,
    pub closed: bool,
    pub scope: TaskScope,
}

/// Authoritative map between live transport connections and the logical
/// datapaths they represent, dual-keyed by `conn_id` and `datapath_id`
/// (§4.E).
#[derive(Default)]
pub struct Registry {
    by_conn: HashMap<u32, Datapath>,
    conn_by_dpid: HashMap<String, u32>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_conn.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_conn.is_empty()
    }

    pub fn by_conn_id(&self, conn_id: u32) -> Option<&Datapath> {
        self.by_conn.get(&conn_id)
    }

    pub fn by_conn_id_mut(&mut self, conn_id: u32) -> Option<&mut Datapath> {
        self.by_conn.get_mut(&conn_id)
    }

    pub fn by_datapath_id(&self, datapath_id: &str) -> Option<&Datapath> {
        let conn_id = *self.conn_by_dpid.get(datapath_id)?;
        self.by_conn.get(&conn_id)
    }

    /// All currently live connection ids, for the shutdown sequence's
    /// "for each live Datapath" enumeration.
    pub fn live_conn_ids(&self) -> Vec<u32> {
        self.by_conn.keys().copied().collect()
    }

    /// Creates a Datapath from a `CHANNEL_UP` event and registers it under
    /// both keys. Rejects the event if either key is already present — a
    /// `CHANNEL_UP` for a known conn_id or datapath_id is a
    /// programmer/driver-protocol error, surfaced as a recoverable `Err`.
    pub fn channel_up(&mut self, event: &Message) -> Result<&Datapath, ControllerError> {
        let conn_id = event.conn_id().ok_or(ControllerError::MissingDatapathId)?;
        let datapath_id = event
            .datapath_id()
            .ok_or(ControllerError::MissingDatapathId)?
            .to_string();

        if self.by_conn.contains_key(&conn_id) {
            return Err(ControllerError::ConnIdAlreadyRegistered { conn_id });
        }
        if self.conn_by_dpid.contains_key(&datapath_id) {
            return Err(ControllerError::DatapathIdAlreadyRegistered { datapath_id });
        }

        let ports = event
            .get("ports")
            .and_then(|v| v.as_array())
            .map(|list| {
                list.iter()
                    .filter_map(Port::from_value)
                    .map(|port| (port.port_no, port))
                    .collect()
            })
            .unwrap_or_default();

        let datapath = Datapath {
            conn_id,
            datapath_id: datapath_id.clone(),
            endpoint: event.endpoint().map(str::to_string),
            version: event.version(),
            ports,
            closed: false,
            scope: TaskScope::new(format!("datapath-{conn_id}")),
        };

        self.conn_by_dpid.insert(datapath_id, conn_id);
        self.by_conn.insert(conn_id, datapath);
        Ok(self.by_conn.get(&conn_id).expect("just inserted"))
    }

    /// Marks a Datapath closed in place without removing it, so that a
    /// driver-initiated `CHANNEL_DOWN` arriving afterward for the same
    /// `conn_id` is recognized as redundant and skipped rather than
    /// double-dispatched.
    pub fn mark_closed(&mut self, conn_id: u32) -> bool {
        match self.by_conn.get_mut(&conn_id) {
            Some(dp) => {
                dp.closed = true;
                true
            }
            None => false,
        }
    }

    /// Handles a driver-initiated `CHANNEL_DOWN`: pops the Datapath and
    /// removes its `datapath_id` index. Returns `None` (skip handler
    /// invocation) if the Datapath was already force-closed.
    pub fn channel_down(&mut self, conn_id: u32) -> Option<Datapath> {
        let dp = self.by_conn.remove(&conn_id)?;
        self.conn_by_dpid.remove(&dp.datapath_id);
        if dp.closed {
            None
        } else {
            Some(dp)
        }
    }

    /// Unconditionally pops a Datapath for the shutdown sequence, which
    /// owns the decision to synthesize a `CHANNEL_DOWN` regardless of any
    /// prior `mark_closed` call.
    pub fn take_for_shutdown(&mut self, conn_id: u32) -> Option<Datapath> {
        let dp = self.by_conn.remove(&conn_id)?;
        self.conn_by_dpid.remove(&dp.datapath_id);
        Some(dp)
    }

    /// Applies a `PORT_STATUS` event's `ADD`/`MODIFY`/`DELETE` to the
    /// Datapath's port table.
    pub fn port_status(&mut self, conn_id: u32, event: &Message) {
        let Some(dp) = self.by_conn.get_mut(&conn_id) else {
            warn!(conn_id, "PORT_STATUS for unknown conn_id; dropping");
            return;
        };
        let Some(reason) = event.get("reason").and_then(|v| v.as_str()) else {
            warn!(conn_id, "PORT_STATUS missing reason; dropping");
            return;
        };
        let Some(change) = PortChange::parse(reason) else {
            warn!(conn_id, reason, "PORT_STATUS with unrecognized reason; dropping");
            return;
        };
        let Some(port) = event.get("port").and_then(Port::from_value) else {
            warn!(conn_id, "PORT_STATUS missing a valid port object; dropping");
            return;
        };

        match change {
            PortChange::Add | PortChange::Modify => {
                dp.ports.insert(port.port_no, port);
            }
            PortChange::Delete => {
                dp.ports.remove(&port.port_no);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn channel_up_event(conn_id: u32, datapath_id: &str) -> Message {
        Message::from_value(json!({
            "type": "CHANNEL_UP",
            "conn_id": conn_id,
            "datapath_id": datapath_id,
            "endpoint": "127.0.0.1:55555",
            "version": 4,
        }))
        .unwrap()
    }

    #[test]
    fn channel_up_registers_both_keys() {
        let mut registry = Registry::new();
        registry.channel_up(&channel_up_event(8, "00:00:00:00:00:00:00:01")).unwrap();
        assert!(registry.by_conn_id(8).is_some());
        assert!(registry.by_datapath_id("00:00:00:00:00:00:00:01").is_some());
    }

    #[test]
    fn duplicate_channel_up_is_rejected() {
        let mut registry = Registry::new();
        registry.channel_up(&channel_up_event(8, "00:00:00:00:00:00:00:01")).unwrap();
        let result = registry.channel_up(&channel_up_event(8, "00:00:00:00:00:00:00:02"));
        assert!(matches!(result, Err(ControllerError::ConnIdAlreadyRegistered { conn_id: 8 })));
    }

    #[test]
    fn channel_down_removes_both_keys() {
        let mut registry = Registry::new();
        registry.channel_up(&channel_up_event(8, "00:00:00:00:00:00:00:01")).unwrap();
        let dp = registry.channel_down(8).unwrap();
        assert_eq!(dp.conn_id, 8);
        assert!(registry.is_empty());
        assert!(registry.by_datapath_id("00:00:00:00:00:00:00:01").is_none());
    }

    #[test]
    fn channel_down_after_mark_closed_is_suppressed() {
        let mut registry = Registry::new();
        registry.channel_up(&channel_up_event(8, "00:00:00:00:00:00:00:01")).unwrap();
        assert!(registry.mark_closed(8));
        assert!(registry.channel_down(8).is_none());
        assert!(registry.is_empty(), "entry must still be removed even when handler is skipped");
    }

    #[test]
    fn port_status_add_modify_delete() {
        let mut registry = Registry::new();
        registry.channel_up(&channel_up_event(8, "00:00:00:00:00:00:00:01")).unwrap();

        let add = Message::from_value(json!({
            "type": "PORT_STATUS", "conn_id": 8, "reason": "ADD",
            "port": {"port_no": 1, "name": "eth0"},
        }))
        .unwrap();
        registry.port_status(8, &add);
        assert_eq!(registry.by_conn_id(8).unwrap().ports.len(), 1);

        let modify = Message::from_value(json!({
            "type": "PORT_STATUS", "conn_id": 8, "reason": "MODIFY",
            "port": {"port_no": 1, "name": "eth0-renamed"},
        }))
        .unwrap();
        registry.port_status(8, &modify);
        assert_eq!(registry.by_conn_id(8).unwrap().ports[&1].name, "eth0-renamed");

        let delete = Message::from_value(json!({
            "type": "PORT_STATUS", "conn_id": 8, "reason": "DELETE",
            "port": {"port_no": 1, "name": "eth0-renamed"},
        }))
        .unwrap();
        registry.port_status(8, &delete);
        assert!(registry.by_conn_id(8).unwrap().ports.is_empty());
    }
}
