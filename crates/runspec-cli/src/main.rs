//! runspec CLI
//!
//! Compiles a runtime and task into a workload and prints or submits it.

use clap::Parser;

use runspec_cli::{Cli, Result};
use runspec_common::telemetry::{init_telemetry, TelemetryConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_telemetry(TelemetryConfig {
        service_name: "runspec-cli".to_string(),
        json: cli.json_logs,
        filter: None,
    })?;

    cli.run().await
}
