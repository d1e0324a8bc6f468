#![forbid(unsafe_code)]

mod demo_app;
mod probe;
mod stub_driver;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use oflow_runtime::{Controller, ControllerConfig};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ofctl")]
#[command(about = "Command-line front end for the OpenFlow controller framework")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Boot a controller from a TOML config file with a logging-only demo app.
    Run(RunArgs),
    /// Issue `OFP.DESCRIPTION` against a driver binary and print the reply.
    Probe(probe::ProbeArgs),
    /// Run an in-process stub driver over stdio, for manual testing.
    StubDriver,
}

#[derive(Debug, clap::Args)]
struct RunArgs {
    /// Path to a controller config TOML file.
    #[arg(long)]
    config: PathBuf,
}

fn install_tracing() {
    let filter = if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::from_default_env()
    } else if std::env::var_os("ZOFDEBUG").is_some_and(|v| !v.is_empty()) {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = ControllerConfig::from_toml_file(&args.config)?;
    let apps: Vec<Box<dyn oflow_runtime::App>> = vec![Box::new(demo_app::LoggingApp)];
    let mut controller = Controller::new(config, apps);
    controller.run().await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    install_tracing();
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Command::Run(args) => match run(args).await {
            Ok(()) => 0,
            Err(err) => {
                eprintln!("{err}");
                1
            }
        },
        Command::Probe(args) => match probe::run(args).await {
            Ok(()) => 0,
            Err(err) => {
                eprintln!("{err}");
                1
            }
        },
        Command::StubDriver => match stub_driver::run().await {
            Ok(()) => 0,
            Err(err) => {
                eprintln!("{err}");
                1
            }
        },
    };

    std::process::exit(exit_code);
}
