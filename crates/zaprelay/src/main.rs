// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! zaprelay - WhatsApp sales-ops relay.
//!
//! Binary entry point: the webhook server plus one-shot maintenance commands.

mod maintenance;
mod serve;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use zaprelay_config::model::RelayConfig;

/// zaprelay - WhatsApp sales-ops relay.
#[derive(Parser, Debug)]
#[command(name = "zaprelay", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the webhook server and the alert monitor.
    Serve,
    /// Answer conversations whose last client message got no bot reply.
    Reprocess,
    /// Open LLM sessions for bot conversations that never got one.
    RecoverSessions,
    /// Recompute conversation timestamps from their messages.
    SyncMessages,
    /// Evaluate every active alert rule once.
    RunAlerts,
    /// Send one query to the LLM and print the answer.
    ProbeLlm {
        /// Text to send.
        query: String,
    },
    /// Validate configuration and print it with secrets redacted.
    CheckConfig,
}

fn load_config(path: Option<&PathBuf>) -> RelayConfig {
    let loaded = match path {
        Some(path) => zaprelay_config::load_and_validate_path(path),
        None => zaprelay_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            zaprelay_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());
    init_tracing(&config.agent.log_level);

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Reprocess) => maintenance::reprocess(&config).await,
        Some(Commands::RecoverSessions) => maintenance::recover_sessions(&config).await,
        Some(Commands::SyncMessages) => maintenance::sync_messages(&config).await,
        Some(Commands::RunAlerts) => maintenance::run_alerts(&config).await,
        Some(Commands::ProbeLlm { query }) => maintenance::probe_llm(&config, query).await,
        Some(Commands::CheckConfig) => maintenance::check_config(&config),
        None => {
            println!("zaprelay: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over `agent.log_level` when set.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("zaprelay={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn probe_llm_takes_a_query() {
        let cli = Cli::try_parse_from(["zaprelay", "probe-llm", "olá"]).unwrap();
        match cli.command {
            Some(Commands::ProbeLlm { query }) => assert_eq!(query, "olá"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn config_flag_is_global() {
        let cli =
            Cli::try_parse_from(["zaprelay", "run-alerts", "--config", "/etc/zaprelay.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/zaprelay.toml")));
        assert!(matches!(cli.command, Some(Commands::RunAlerts)));
    }

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Only jemalloc supports advancing the stats epoch.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0);
    }
}
