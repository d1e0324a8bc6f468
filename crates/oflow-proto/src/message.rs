use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Xid;

/// OpenFlow message types that never carry a waiter's xid — they are always
/// unsolicited and routed to the event queue rather than a pending request.
pub const ASYNC_NOTIFICATION_TYPES: &[&str] = &["PACKET_IN", "FLOW_REMOVED", "PORT_STATUS"];

/// Coarse classification of a decoded [`Message`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MessageKind {
    /// Has a `type` field: an OpenFlow message (lifecycle, data, or reply).
    OpenFlow,
    /// Has `method` (and no `id`... or an `id` paired with a request): a JSON-RPC request.
    RpcRequest,
    /// Has `id` plus `result`/`error` and no `method`: a JSON-RPC response.
    RpcResponse,
}

/// A record exchanged with the driver over the framed pipe.
///
/// Records are dict-shaped JSON; the framework only inspects a handful of
/// well-known fields (`type`, `xid`, `conn_id`, `datapath_id`, `flags`,
/// `msg`, `version`, `endpoint`) and leaves the rest opaque so that apps can
/// still read OpenFlow-specific fields the core doesn't understand.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Message {
    fields: Map<String, Value>,
}

impl Message {
    /// Wraps an already-decoded JSON object. Returns `None` for non-object values.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// Builds an OpenFlow-shaped message from a type tag and a payload.
    pub fn openflow(type_tag: impl Into<String>, msg: Value) -> Self {
        let mut fields = Map::new();
        fields.insert("type".to_string(), Value::String(type_tag.into()));
        fields.insert("msg".to_string(), msg);
        Self { fields }
    }

    /// Builds a JSON-RPC request envelope. `id` is omitted for a send-only call.
    pub fn rpc_request(method: impl Into<String>, params: Value, id: Option<u64>) -> Self {
        let mut fields = Map::new();
        if let Some(id) = id {
            fields.insert("id".to_string(), Value::from(id));
        }
        fields.insert("method".to_string(), Value::String(method.into()));
        fields.insert("params".to_string(), params);
        Self { fields }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    pub fn type_tag(&self) -> Option<&str> {
        self.fields.get("type").and_then(Value::as_str)
    }

    pub fn method(&self) -> Option<&str> {
        self.fields.get("method").and_then(Value::as_str)
    }

    pub fn xid(&self) -> Option<Xid> {
        self.fields.get("xid").and_then(Value::as_u64).map(|v| v as Xid)
    }

    pub fn set_xid(&mut self, xid: Xid) {
        self.fields.insert("xid".to_string(), Value::from(xid));
    }

    pub fn rpc_id(&self) -> Option<u64> {
        self.fields.get("id").and_then(Value::as_u64)
    }

    pub fn conn_id(&self) -> Option<u32> {
        self.fields.get("conn_id").and_then(Value::as_u64).map(|v| v as u32)
    }

    pub fn datapath_id(&self) -> Option<&str> {
        self.fields.get("datapath_id").and_then(Value::as_str)
    }

    pub fn version(&self) -> Option<u8> {
        self.fields.get("version").and_then(Value::as_u64).map(|v| v as u8)
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.fields.get("endpoint").and_then(Value::as_str)
    }

    pub fn flags(&self) -> Vec<&str> {
        self.fields
            .get("flags")
            .and_then(Value::as_array)
            .map(|values| values.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags().iter().any(|f| *f == flag)
    }

    pub fn msg(&self) -> Option<&Value> {
        self.fields.get("msg")
    }

    pub fn result(&self) -> Option<&Value> {
        self.fields.get("result")
    }

    pub fn error(&self) -> Option<&Value> {
        self.fields.get("error")
    }

    /// The correlation id used to pair this message with a pending request:
    /// `xid` for OpenFlow messages, `id` for JSON-RPC responses.
    pub fn correlation_id(&self) -> Option<u64> {
        if self.type_tag().is_some() {
            self.xid().map(u64::from)
        } else {
            self.rpc_id()
        }
    }

    pub fn kind(&self) -> MessageKind {
        if self.type_tag().is_some() {
            MessageKind::OpenFlow
        } else if self.method().is_some() {
            MessageKind::RpcRequest
        } else {
            MessageKind::RpcResponse
        }
    }

    /// Whether this OpenFlow message type is an always-unsolicited async notification.
    pub fn is_async_notification(&self) -> bool {
        matches!(self.type_tag(), Some(t) if ASYNC_NOTIFICATION_TYPES.contains(&t))
    }

    pub fn is_error(&self) -> bool {
        matches!(self.type_tag(), Some("ERROR") | Some("CHANNEL_ALERT"))
    }

    pub fn is_more(&self) -> bool {
        self.has_flag("MORE")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_openflow_vs_rpc() {
        let of = Message::from_value(json!({"type": "PACKET_IN", "xid": 7})).unwrap();
        assert_eq!(of.kind(), MessageKind::OpenFlow);
        assert_eq!(of.correlation_id(), Some(7));
        assert!(of.is_async_notification());

        let req = Message::from_value(json!({"id": 1, "method": "OFP.DESCRIPTION"})).unwrap();
        assert_eq!(req.kind(), MessageKind::RpcRequest);

        let resp = Message::from_value(json!({"id": 1, "result": {}})).unwrap();
        assert_eq!(resp.kind(), MessageKind::RpcResponse);
        assert_eq!(resp.correlation_id(), Some(1));
    }

    #[test]
    fn more_flag_and_error_detection() {
        let frag = Message::from_value(json!({"type": "REPLY.PORT_DESC", "flags": ["MORE"]})).unwrap();
        assert!(frag.is_more());

        let err = Message::from_value(json!({"type": "ERROR"})).unwrap();
        assert!(err.is_error());
    }

    #[test]
    fn non_object_values_are_rejected() {
        assert!(Message::from_value(json!("not an object")).is_none());
    }
}
