use std::path::PathBuf;

use clap::Args;
use oflow_driver::{Driver, DriverConfig, DriverError};
use tokio::sync::mpsc;

#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// Path to the `oftr`-compatible driver binary.
    #[arg(long)]
    driver: PathBuf,
}

/// Opens the driver, issues `OFP.DESCRIPTION`, prints the reply, and closes
/// it again — the framework's own startup self-check, exposed standalone.
pub async fn run(args: ProbeArgs) -> Result<(), DriverError> {
    let config = DriverConfig {
        binary: args.driver,
        debug: false,
        rpc_socket: None,
    };
    let (unsolicited_tx, _unsolicited_rx) = mpsc::channel(16);
    let driver = Driver::open(&config, unsolicited_tx).await?;

    let description = driver.description().await?;
    let pretty = serde_json::to_string_pretty(&description.into_value())
        .expect("a decoded JSON value always re-serializes");
    println!("{pretty}");

    driver.shutdown().await?;
    Ok(())
}
