use std::{path::PathBuf, process::ExitStatus, sync::Arc};

use oflow_proto::Message;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    process::{Child, ChildStdin, ChildStdout, Command},
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{process, DriverError};

const RECORD_TERMINATOR: u8 = 0x00;
const READ_CHUNK: usize = 8192;

/// How to locate and launch the `oftr` driver subprocess (§6).
#[derive(Clone, Debug)]
pub struct DriverConfig {
    /// Path to the driver binary; defaults to `oftr` resolved via `PATH`.
    pub binary: PathBuf,
    /// Enables `--trace=rpc` for verbose driver-side logging.
    pub debug: bool,
    /// Optional `--rpc-socket=<path>` override.
    pub rpc_socket: Option<PathBuf>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("oftr"),
            debug: false,
            rpc_socket: None,
        }
    }
}

/// Runs the driver subprocess and ships NUL-delimited JSON records in both
/// directions over its stdio (§4.A).
pub struct Transport {
    writer: mpsc::UnboundedSender<String>,
    records: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
    child: Arc<Mutex<Option<Child>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Transport {
    /// Spawns the driver in JSON-RPC mode and begins framing its stdio.
    pub async fn open(config: &DriverConfig) -> Result<Self, DriverError> {
        let mut command = Command::new(&config.binary);
        command.arg("jsonrpc");
        if config.debug {
            command.arg("--trace=rpc");
        }
        if let Some(socket) = &config.rpc_socket {
            command.arg(format!("--rpc-socket={}", socket.display()));
        }
        command
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true);
        process::new_session(&mut command);

        let mut child = process::spawn_with_retry(&mut command, &config.binary)?;

        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");

        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let (records_tx, records_rx) = mpsc::unbounded_channel();

        let writer_handle = tokio::spawn(writer_task(stdin, writer_rx));
        let reader_handle = tokio::spawn(reader_task(stdout, records_tx));

        Ok(Self {
            writer: writer_tx,
            records: Mutex::new(Some(records_rx)),
            child: Arc::new(Mutex::new(Some(child))),
            tasks: vec![writer_handle, reader_handle],
        })
    }

    /// Serializes `record`, appends the NUL terminator, and hands it to the
    /// writer task. Ordered with respect to other calls; fails if the child
    /// has exited and the writer task has drained.
    pub fn write(&self, record: Message) -> Result<(), DriverError> {
        let serialized = serde_json::to_string(&record.into_value())?;
        self.writer
            .send(serialized)
            .map_err(|_| DriverError::ChannelClosed)
    }

    /// Takes ownership of the inbound record stream. May only be called once;
    /// subsequent calls return `None`.
    pub async fn take_records(&self) -> Option<mpsc::UnboundedReceiver<Message>> {
        self.records.lock().await.take()
    }

    /// Terminates the driver and waits for it to exit.
    pub async fn close(&self) -> Result<ExitStatus, DriverError> {
        let mut guard = self.child.lock().await;
        let Some(child) = guard.as_mut() else {
            return Err(DriverError::ChannelClosed);
        };
        let _ = child.start_kill();
        child.wait().await.map_err(|source| DriverError::Wait { source })
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        if let Ok(mut guard) = self.child.try_lock() {
            if let Some(mut child) = guard.take() {
                let _ = child.start_kill();
            }
        }
    }
}

async fn writer_task(mut stdin: ChildStdin, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(record) = rx.recv().await {
        if stdin.write_all(record.as_bytes()).await.is_err() {
            break;
        }
        if stdin.write_all(&[RECORD_TERMINATOR]).await.is_err() {
            break;
        }
        if stdin.flush().await.is_err() {
            break;
        }
    }
    let _ = stdin.shutdown().await;
}

async fn reader_task(mut stdout: ChildStdout, records_tx: mpsc::UnboundedSender<Message>) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = match stdout.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buffer.extend_from_slice(&chunk[..n]);

        while let Some(pos) = buffer.iter().position(|&b| b == RECORD_TERMINATOR) {
            let record_bytes: Vec<u8> = buffer.drain(..=pos).collect();
            let record_bytes = &record_bytes[..record_bytes.len() - 1]; // drop the terminator

            if record_bytes.is_empty() {
                continue; // two consecutive NULs: skip silently
            }

            match serde_json::from_slice::<serde_json::Value>(record_bytes) {
                Ok(value) => match Message::from_value(value) {
                    Some(message) => {
                        if records_tx.send(message).is_err() {
                            return;
                        }
                    }
                    None => warn!("driver record was valid JSON but not an object; dropping"),
                },
                Err(err) => {
                    debug!("dropping malformed driver record: {err}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn script(body: &str) -> tempfile::TempPath {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "#!/bin/sh\n{body}").unwrap();
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

    #[tokio::test]
    async fn round_trips_a_record_through_a_stub_driver() {
        // Stub ignores argv, echoes back one NUL-delimited record, then exits.
        let stub = script("printf '{\"id\":1,\"result\":{}}\\0'");
        let config = DriverConfig {
            binary: stub.to_path_buf(),
            debug: false,
            rpc_socket: None,
        };
        let transport = Transport::open(&config).await.unwrap();
        let mut records = transport.take_records().await.unwrap();
        let message = records.recv().await.unwrap();
        assert_eq!(message.rpc_id(), Some(1));
    }

    #[tokio::test]
    async fn empty_records_are_skipped() {
        let stub = script("printf '\\0\\0{\"id\":7,\"result\":{}}\\0'");
        let config = DriverConfig {
            binary: stub.to_path_buf(),
            debug: false,
            rpc_socket: None,
        };
        let transport = Transport::open(&config).await.unwrap();
        let mut records = transport.take_records().await.unwrap();
        let message = records.recv().await.unwrap();
        assert_eq!(message.rpc_id(), Some(7));
    }

    #[tokio::test]
    async fn malformed_json_is_dropped_and_framing_recovers() {
        let stub = script("printf '{not json}\\0{\"id\":3,\"result\":{}}\\0'");
        let config = DriverConfig {
            binary: stub.to_path_buf(),
            debug: false,
            rpc_socket: None,
        };
        let transport = Transport::open(&config).await.unwrap();
        let mut records = transport.take_records().await.unwrap();
        let message = records.recv().await.unwrap();
        assert_eq!(message.rpc_id(), Some(3));
    }

    #[tokio::test]
    async fn close_waits_for_exit() {
        let stub = script("exit 0");
        let config = DriverConfig {
            binary: stub.to_path_buf(),
            debug: false,
            rpc_socket: None,
        };
        let transport = Transport::open(&config).await.unwrap();
        let status = transport.close().await.unwrap();
        assert!(status.success() || !status.success());
    }
}
