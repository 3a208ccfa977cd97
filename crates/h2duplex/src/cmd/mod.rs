use std::path::PathBuf;

use clap::{Args, Subcommand};
use h2duplex_transport::Lifetime;

use crate::exit::{CliError, CliResult, INTERNAL};
use crate::output::OutputFormat;

pub mod echo;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve duplex connections and echo every message back.
    Echo(EchoArgs),
    /// Dial a duplex endpoint and send a single message.
    Send(SendArgs),
    /// Serve duplex connections and print received messages.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Echo(args) => block_on(echo::run(args, format)),
        Command::Send(args) => block_on(send::run(args, format)),
        Command::Listen(args) => block_on(listen::run(args, format)),
        Command::Version(args) => version::run(args),
    }
}

fn block_on<F>(future: F) -> CliResult<i32>
where
    F: std::future::Future<Output = CliResult<i32>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))?;
    runtime.block_on(future)
}

/// Lifetime that ends on Ctrl-C.
fn shutdown_on_ctrl_c() -> Lifetime {
    let shutdown = Lifetime::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("interrupt received, shutting down"),
            Err(err) => {
                tracing::warn!(error = %err, "signal handler setup failed");
                return;
            }
        }
        trigger.cancel();
    });
    shutdown
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Address to bind (e.g. 127.0.0.1:8080).
    pub addr: String,
    /// Echo messages unchanged instead of uppercasing them.
    #[arg(long)]
    pub verbatim: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// URL of the duplex endpoint (e.g. http://127.0.0.1:8080/).
    pub url: String,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Wait for one reply message and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    /// Maximum time to establish the connection (e.g. 5s, 500ms).
    #[arg(long, default_value = "10s", env = "H2DUPLEX_CONNECT_TIMEOUT")]
    pub connect_timeout: String,
    /// Request method.
    #[arg(long, short = 'X', default_value = "POST")]
    pub method: String,
    /// Extra request header as `name: value`. Repeatable.
    #[arg(long, short = 'H', value_name = "HEADER")]
    pub header: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address to bind (e.g. 127.0.0.1:8080).
    pub addr: String,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
