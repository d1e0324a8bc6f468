use std::{sync::Arc, time::Duration};

use oflow_proto::{Message, Xid, XID_RESERVED_MAX};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::{correlator::DEFAULT_REQUEST_TIMEOUT, Correlator, DriverConfig, DriverError, Transport};

/// Typed wrapper over the driver's JSON-RPC control surface (§4.C). Every
/// call here either fires-and-forgets (`send`) or round-trips through the
/// [`Correlator`] (everything else).
pub struct Driver {
    correlator: Correlator,
}

impl Driver {
    /// Spawns the driver subprocess and starts its transport and correlator.
    /// Unsolicited OpenFlow notifications are forwarded to `unsolicited_tx`.
    pub async fn open(config: &DriverConfig, unsolicited_tx: mpsc::Sender<Message>) -> Result<Self, DriverError> {
        let transport = Arc::new(Transport::open(config).await?);
        let correlator = Correlator::start(transport, unsolicited_tx).await?;
        Ok(Self { correlator })
    }

    /// Starts listening for datapath connections on `endpoint` (e.g.
    /// `tcp:6653`). Resolves to the listener's `conn_id`.
    pub async fn listen(&self, endpoint: &str, options: &[&str], versions: &[u8], tls_id: u32) -> Result<u32, DriverError> {
        let reply = self
            .call(
                "OFP.LISTEN",
                json!({"endpoint": endpoint, "options": options, "versions": versions, "tls_id": tls_id}),
            )
            .await?;
        Ok(reply.conn_id().unwrap_or_default())
    }

    /// Actively connects to `endpoint` as a client. Resolves to the new
    /// connection's `conn_id`.
    pub async fn connect(&self, endpoint: &str) -> Result<u32, DriverError> {
        let reply = self.call("OFP.CONNECT", json!({"endpoint": endpoint})).await?;
        Ok(reply.conn_id().unwrap_or_default())
    }

    /// Closes `conn_id` and waits for the driver to confirm. Resolves to the
    /// number of connections actually closed (`0` if already closed).
    pub async fn close(&self, conn_id: u32) -> Result<u32, DriverError> {
        let reply = self.call("OFP.CLOSE", json!({"conn_id": conn_id})).await?;
        Ok(reply.get("count").and_then(Value::as_u64).unwrap_or_default() as u32)
    }

    /// Closes `conn_id` without waiting for a reply; used during forced
    /// shutdown when the driver may not respond in time (§4.H).
    pub fn close_no_wait(&self, conn_id: u32) -> Result<(), DriverError> {
        self.correlator
            .send(Message::rpc_request("OFP.CLOSE", json!({"conn_id": conn_id}), None))
    }

    /// Registers an x.509 identity (cert/CA cert/key) for TLS connections.
    /// Resolves to a `tls_id` usable with [`Driver::listen`].
    pub async fn add_identity(&self, cert: &str, cacert: &str, privkey: &str) -> Result<u32, DriverError> {
        let reply = self
            .call("OFP.ADD_IDENTITY", json!({"cert": cert, "cacert": cacert, "privkey": privkey}))
            .await?;
        Ok(reply.get("tls_id").and_then(Value::as_u64).unwrap_or_default() as u32)
    }

    /// Fetches driver build/version metadata.
    pub async fn description(&self) -> Result<Message, DriverError> {
        self.call("OFP.DESCRIPTION", json!({})).await
    }

    /// Sends a raw OpenFlow message on `conn_id` without tracking a reply.
    /// `xid` must be caller-supplied and outside the driver-reserved range.
    pub fn send(&self, conn_id: u32, type_tag: &str, xid: Xid, msg: Value) -> Result<(), DriverError> {
        self.check_caller_xid(xid)?;
        let mut record = Message::openflow(type_tag, msg);
        record.insert("conn_id", json!(conn_id));
        record.set_xid(xid);
        self.correlator.send(record)
    }

    /// Sends a raw OpenFlow message on `conn_id` and awaits the matching
    /// reply, merging any multi-part (`MORE`-flagged) fragments.
    pub async fn request(
        &self,
        conn_id: u32,
        type_tag: &str,
        xid: Xid,
        msg: Value,
        timeout: Duration,
    ) -> Result<Message, DriverError> {
        self.check_caller_xid(xid)?;
        let mut record = Message::openflow(type_tag, msg);
        record.insert("conn_id", json!(conn_id));
        record.set_xid(xid);
        self.correlator.request(record, xid, timeout).await
    }

    /// Allocates an xid outside the driver-reserved range for use with
    /// [`Driver::send`] or [`Driver::request`].
    pub fn assign_xid(&self) -> Xid {
        self.correlator.assign_xid()
    }

    /// Terminates the driver subprocess and waits for it to exit.
    pub async fn shutdown(&self) -> Result<std::process::ExitStatus, DriverError> {
        self.correlator.close().await
    }

    async fn call(&self, method: &str, params: Value) -> Result<Message, DriverError> {
        let xid = self.correlator.assign_xid();
        let record = Message::rpc_request(method, params, Some(u64::from(xid)));
        self.correlator.request(record, xid, DEFAULT_REQUEST_TIMEOUT).await
    }

    fn check_caller_xid(&self, xid: Xid) -> Result<(), DriverError> {
        if xid <= XID_RESERVED_MAX {
            Err(DriverError::ReservedXid(xid))
        } else {
            Ok(())
        }
    }
}
