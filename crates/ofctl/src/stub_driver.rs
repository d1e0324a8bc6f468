use serde_json::{json, Value};
use tokio::io::{self, AsyncReadExt, AsyncWriteExt};

const RECORD_TERMINATOR: u8 = 0x00;
const READ_CHUNK: usize = 4096;

/// An in-process stand-in for `oftr jsonrpc`: reads NUL-delimited JSON-RPC
/// requests off stdin, replies with a minimal canned result keyed by
/// method, and writes NUL-delimited replies to stdout. Exists so the rest
/// of the framework can be exercised manually without a real driver binary
/// on hand.
pub async fn run() -> io::Result<()> {
    let mut stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = stdin.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buffer.extend_from_slice(&chunk[..n]);

        while let Some(pos) = buffer.iter().position(|&b| b == RECORD_TERMINATOR) {
            let record: Vec<u8> = buffer.drain(..=pos).collect();
            let record = &record[..record.len() - 1];
            if record.is_empty() {
                continue;
            }
            let Ok(request) = serde_json::from_slice::<Value>(record) else {
                continue;
            };
            let reply = canned_reply(&request);
            let mut bytes = serde_json::to_vec(&reply)?;
            bytes.push(RECORD_TERMINATOR);
            stdout.write_all(&bytes).await?;
            stdout.flush().await?;
        }
    }
}

fn canned_reply(request: &Value) -> Value {
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let method = request.get("method").and_then(Value::as_str).unwrap_or("");

    let result = match method {
        "OFP.DESCRIPTION" => json!({
            "api_version": "0.9",
            "sw_desc": "ofctl stub-driver",
            "versions": [1, 2, 3, 4, 5, 6],
        }),
        "OFP.LISTEN" | "OFP.CONNECT" => json!({"conn_id": 1}),
        "OFP.CLOSE" => json!({"count": 1}),
        "OFP.ADD_IDENTITY" => json!({"tls_id": 1}),
        _ => json!({}),
    };

    json!({"id": id, "result": result})
}
