use std::{path::Path, time::Duration};

use tokio::process::{Child, Command};

use crate::DriverError;

/// Places the child in its own process group so that terminal signals
/// delivered to the controller (Ctrl-C, SIGTERM from a shell job) don't also
/// reach the driver; shutdown of the driver is always explicit (§4.A / §4.H).
#[cfg(unix)]
pub(crate) fn new_session(command: &mut Command) {
    command.process_group(0);
}

#[cfg(not(unix))]
pub(crate) fn new_session(_command: &mut Command) {}

/// Spawns `command`, retrying a bounded number of times on `ETXTBSY`-style
/// "busy" errors that can occur when the driver binary was just written
/// (e.g. freshly unpacked in a container layer).
pub(crate) fn spawn_with_retry(command: &mut Command, binary: &Path) -> Result<Child, DriverError> {
    let mut backoff = Duration::from_millis(2);
    for attempt in 0..5 {
        match command.spawn() {
            Ok(child) => return Ok(child),
            Err(source) => {
                let is_busy = matches!(source.kind(), std::io::ErrorKind::ExecutableFileBusy)
                    || source.raw_os_error() == Some(26);
                if is_busy && attempt < 4 {
                    std::thread::sleep(backoff);
                    backoff = std::cmp::min(backoff * 2, Duration::from_millis(50));
                    continue;
                }
                return Err(DriverError::Spawn {
                    binary: binary.to_path_buf(),
                    source,
                });
            }
        }
    }

    unreachable!("spawn_with_retry should return before exhausting retries")
}
