use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single switch port as reported by `CHANNEL_UP`'s initial port list or a
/// subsequent `PORT_STATUS` event.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Port {
    pub port_no: u32,
    pub name: String,
    #[serde(default)]
    pub hw_addr: String,
    #[serde(default)]
    pub config: Vec<String>,
    #[serde(default)]
    pub state: Vec<String>,
    #[serde(default)]
    pub ethernet: Option<Value>,
}

impl Port {
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// The kind of change carried by a `PORT_STATUS` event.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PortChange {
    Add,
    Modify,
    Delete,
}

impl PortChange {
    pub fn parse(reason: &str) -> Option<Self> {
        match reason {
            "ADD" => Some(Self::Add),
            "MODIFY" => Some(Self::Modify),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}
