use std::io::Write as _;
use std::time::Duration;

use oflow_driver::{Driver, DriverConfig, DriverError};
use serde_json::json;
use tokio::sync::mpsc;

fn stub(body: &str) -> tempfile::TempPath {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "#!/bin/bash\n{body}").unwrap();
    let mut perms = std::fs::metadata(file.path()).unwrap().permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        perms.set_mode(0o755);
    }
    std::fs::set_permissions(file.path(), perms).unwrap();
    // Close the write handle before the binary is spawned: execve fails
    // with ETXTBSY on a path that still has an open writable fd.
    file.into_temp_path()
}

async fn open(binary: &std::path::Path) -> (Driver, mpsc::Receiver<oflow_proto::Message>) {
    let (tx, rx) = mpsc::channel(16);
    let config = DriverConfig {
        binary: binary.to_path_buf(),
        debug: false,
        rpc_socket: None,
    };
    (Driver::open(&config, tx).await.unwrap(), rx)
}

#[tokio::test]
async fn description_probe_resolves_the_reply_payload() {
    let script = stub(
        r#"while IFS= read -r -d $'\0' line; do
  id=$(echo "$line" | grep -o '"id":[0-9]*' | head -1 | cut -d: -f2)
  printf '{"id":%s,"result":{"api_version":"0.9","sw_desc":"stub","versions":[1,2,3,4,5,6]}}\0' "$id"
done"#,
    );
    let (driver, _rx) = open(&script).await;

    let description = driver.description().await.unwrap();
    assert_eq!(description.get("api_version").unwrap(), "0.9");
    assert_eq!(description.get("versions").unwrap(), &json!([1, 2, 3, 4, 5, 6]));

    driver.shutdown().await.unwrap();
}

#[tokio::test]
async fn listen_then_close_round_trips_conn_id_and_closed_count() {
    let script = stub(
        r#"while IFS= read -r -d $'\0' line; do
  id=$(echo "$line" | grep -o '"id":[0-9]*' | head -1 | cut -d: -f2)
  if echo "$line" | grep -q 'OFP.CLOSE'; then
    printf '{"id":%s,"result":{"count":1}}\0' "$id"
  else
    printf '{"id":%s,"result":{"conn_id":7}}\0' "$id"
  fi
done"#,
    );
    let (driver, _rx) = open(&script).await;

    let conn_id = driver.listen("tcp:6653", &["FEATURES_REQ"], &[4], 0).await.unwrap();
    assert_eq!(conn_id, 7);

    let closed = driver.close(conn_id).await.unwrap();
    assert_eq!(closed, 1);

    driver.shutdown().await.unwrap();
}

#[tokio::test]
async fn request_with_error_reply_surfaces_a_request_error() {
    let script = stub(
        r#"while IFS= read -r -d $'\0' line; do
  xid=$(echo "$line" | grep -o '"xid":[0-9]*' | head -1 | cut -d: -f2)
  printf '{"type":"ERROR","xid":%s,"msg":{"code":"EPERM"}}\0' "$xid"
done"#,
    );
    let (driver, _rx) = open(&script).await;

    let xid = driver.assign_xid();
    let result = driver
        .request(1, "BARRIER_REQUEST", xid, json!({}), Duration::from_secs(2))
        .await;
    assert!(matches!(result, Err(DriverError::Request { xid: got, .. }) if got == xid));

    driver.shutdown().await.unwrap();
}

#[tokio::test]
async fn multi_part_reply_merges_fragments_in_order() {
    let script = stub(
        r#"while IFS= read -r -d $'\0' line; do
  xid=$(echo "$line" | grep -o '"xid":[0-9]*' | head -1 | cut -d: -f2)
  printf '{"type":"REPLY.PORT_DESC","xid":%s,"flags":["MORE"],"msg":[{"port_no":1}]}\0' "$xid"
  printf '{"type":"REPLY.PORT_DESC","xid":%s,"msg":[{"port_no":2}]}\0' "$xid"
done"#,
    );
    let (driver, _rx) = open(&script).await;

    let xid = driver.assign_xid();
    let reply = driver
        .request(1, "MULTIPART_REQUEST", xid, json!({}), Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(reply.type_tag(), Some("REPLY.PORT_DESC"));
    assert_eq!(reply.msg().unwrap(), &json!([{"port_no": 1}, {"port_no": 2}]));

    driver.shutdown().await.unwrap();
}

#[tokio::test]
async fn unanswered_request_times_out() {
    let script = stub("cat >/dev/null");
    let (driver, _rx) = open(&script).await;

    let xid = driver.assign_xid();
    let result = driver
        .request(1, "BARRIER_REQUEST", xid, json!({}), Duration::from_millis(100))
        .await;
    assert!(matches!(result, Err(DriverError::Timeout { xid: got, .. }) if got == xid));

    driver.shutdown().await.unwrap();
}
