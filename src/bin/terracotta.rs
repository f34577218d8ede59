//! Terracotta launcher: reads `--server <list>` and a config file path,
//! starts the configured subset of agents (§10.5).

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use terracotta::agents::supervisor;
use terracotta::config::TerracottaConfig;
use terracotta::hypervisor::NullHypervisor;
use terracotta::store::MetricStore;

#[derive(Parser, Debug)]
#[command(name = "terracotta", about = "Dynamic workload-consolidation controller")]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "/etc/terracotta/config.yaml")]
    config: String,

    /// Subset of agents to run on this process, overriding the config
    /// file's `server` list (e.g. `--server global-manager,local-manager`).
    #[arg(long, value_delimiter = ',')]
    server: Option<Vec<String>>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let args = Args::parse();
    let mut config = match TerracottaConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            log::error!(target: "terracotta", "invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(server) = args.server {
        config.server = server;
    }

    let store = match MetricStore::connect(&config.sql_connection).await {
        Ok(store) => store,
        Err(e) => {
            log::error!(target: "terracotta", "cannot reach metric store at startup: {e}");
            return ExitCode::FAILURE;
        }
    };

    let hypervisor = Arc::new(NullHypervisor);
    match supervisor::run(config, hypervisor, store).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!(target: "terracotta", "agent exited with error: {e}");
            ExitCode::FAILURE
        }
    }
}
