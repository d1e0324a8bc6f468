use oflow_proto::Message;
use serde_json::{Map, Value};

/// Reshapes a `PACKET_IN` message's `msg._pkt` field list into a `msg.pkt`
/// mapping, hex-decoding `msg.data` and slicing off the leading offset the
/// driver reports under `x_pkt_pos`. `_pkt` and `data` are removed from
/// `msg` once folded into `pkt`.
pub fn transform_packet_in(message: &mut Message) {
    let Some(msg) = message.get("msg").and_then(Value::as_object) else {
        return;
    };

    let mut msg = msg.clone();
    let pkt_fields = msg.remove("_pkt");
    let data = msg.remove("data");

    let mut pkt = from_field_list(pkt_fields);

    let offset = pkt.remove("x_pkt_pos").and_then(|v| v.as_u64()).unwrap_or(0) as usize;

    let hex_data = data.as_ref().and_then(Value::as_str).unwrap_or("");
    let payload = hex::decode(hex_data).unwrap_or_default();
    let sliced = payload.get(offset..).unwrap_or(&[]);
    let as_values: Vec<Value> = sliced.iter().map(|b| Value::from(*b)).collect();
    pkt.insert("payload".to_string(), Value::Array(as_values));

    msg.insert("pkt".to_string(), Value::Object(pkt));
    message.insert("msg", Value::Object(msg));
}

/// Builds a field map from a `_pkt`-style field list, lowercasing every key
/// and collapsing repeated fields into a list value, matching the driver's
/// own field-list encoding.
fn from_field_list(fields: Option<Value>) -> Map<String, Value> {
    let mut pkt = Map::new();
    let Some(Value::Array(fields)) = fields else {
        return pkt;
    };

    for entry in fields {
        let (Some(field), Some(value)) = (entry.get("field").and_then(Value::as_str), entry.get("value")) else {
            continue;
        };
        let key = field.to_lowercase();
        let value = value.clone();
        match pkt.get_mut(&key) {
            Some(Value::Array(existing)) => existing.push(value),
            Some(existing) => {
                let prior = existing.clone();
                pkt.insert(key, Value::Array(vec![prior, value]));
            }
            None => {
                pkt.insert(key, value);
            }
        }
    }
    pkt
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_pkt_map_and_slices_payload_by_offset() {
        let mut message = Message::openflow(
            "PACKET_IN",
            json!({
                "_pkt": [
                    {"field": "X_PKT_POS", "value": 2},
                    {"field": "IN_PORT", "value": 1},
                ],
                "data": "aabbccddee",
            }),
        );
        transform_packet_in(&mut message);
        let msg = message.get("msg").unwrap();
        let pkt = msg.get("pkt").unwrap();
        assert_eq!(pkt["in_port"], 1);
        assert_eq!(pkt["payload"], json!([0xcc, 0xdd, 0xee]));
        assert!(pkt.get("x_pkt_pos").is_none());
        assert!(msg.get("_pkt").is_none());
        assert!(msg.get("data").is_none());
    }

    #[test]
    fn repeated_fields_collapse_into_a_list() {
        let mut message = Message::openflow(
            "PACKET_IN",
            json!({
                "_pkt": [
                    {"field": "VLAN_VID", "value": 10},
                    {"field": "VLAN_VID", "value": 20},
                ],
                "data": "",
            }),
        );
        transform_packet_in(&mut message);
        let pkt = message.get("msg").unwrap().get("pkt").unwrap();
        assert_eq!(pkt["vlan_vid"], json!([10, 20]));
    }

    #[test]
    fn missing_pkt_field_still_produces_an_empty_pkt_map() {
        let mut message = Message::openflow("PACKET_IN", json!({"data": "aa"}));
        transform_packet_in(&mut message);
        let msg = message.get("msg").unwrap();
        assert_eq!(msg.get("pkt").unwrap(), &json!({"payload": [0xaa]}));
        assert!(msg.get("data").is_none());
    }
}
