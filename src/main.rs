mod config;
mod engine;
mod input;
mod model;
mod numeric;
mod output;
mod protocol;
mod report;

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, ConfigError, load_config};
use crate::input::{CsvMatrixSource, InputError};
use crate::output::FileSink;
use crate::protocol::driver::{DriverParams, ProtocolDriver, Role};
use crate::protocol::relay::run_relay;

#[derive(Parser)]
#[command(
    name = "fednorm",
    version,
    about = "Federated cross-site normalization of gene-expression count matrices"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a federation locally, one driver per site directory.
    Run {
        /// Directory holding one subdirectory per site; the first site in
        /// sorted order acts as the coordinator.
        #[arg(long)]
        input: PathBuf,
        /// Output directory; each site writes into its own subdirectory.
        #[arg(long)]
        out: PathBuf,
        /// Sleep between inbox polls, in milliseconds.
        #[arg(long, default_value_t = 1000)]
        poll_ms: u64,
        /// Grace period for the coordinator's final broadcast, in milliseconds.
        #[arg(long, default_value_t = 10_000)]
        grace_ms: u64,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Run {
            input,
            out,
            poll_ms,
            grace_ms,
        } => run_federation(
            &input,
            &out,
            DriverParams {
                poll_interval: Duration::from_millis(poll_ms),
                finish_grace: Duration::from_millis(grace_ms),
            },
        ),
    };
    if let Err(err) = outcome {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run_federation(input: &Path, out: &Path, params: DriverParams) -> Result<(), String> {
    let sites = discover_sites(input).map_err(|e| e.to_string())?;
    let configs = sites
        .iter()
        .map(|site| load_config(&site.dir))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;
    let mode = check_mode_agreement(&configs).map_err(|e| e.to_string())?;
    info!(
        sites = sites.len(),
        %mode,
        coordinator = %sites[0].name,
        "federation starting"
    );

    let mut mailboxes = Vec::with_capacity(sites.len());
    let mut workers = Vec::with_capacity(sites.len());
    for (idx, (site, site_config)) in sites.iter().zip(&configs).enumerate() {
        let role = if idx == 0 {
            Role::coordinator(sites.len())
        } else {
            Role::Participant
        };
        let mut driver = ProtocolDriver::new(mode, role, params.clone());
        mailboxes.push(driver.mailbox());

        let source = CsvMatrixSource::new(site.dir.clone(), site_config.clone());
        let mut sink = FileSink::new(out.join(&site.name), site_config.clone());
        let name = site.name.clone();
        let worker = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || driver.run(&source, &mut sink))
            .map_err(|e| format!("could not start a worker for site {name}: {e}"))?;
        workers.push((site.name.clone(), worker));
    }

    run_relay(&mailboxes[0], &mailboxes[1..]);

    let mut failures = Vec::new();
    let mut cancelled = Vec::new();
    for (name, worker) in workers {
        match worker.join() {
            Ok(Ok(())) => info!(site = %name, "site finished"),
            Ok(Err(err)) if err.is_cancelled() => cancelled.push(format!("{name}: {err}")),
            Ok(Err(err)) => failures.push(format!("{name}: {err}")),
            Err(_) => failures.push(format!("{name}: worker thread panicked")),
        }
    }
    // Cancelled sites are collateral of the primary failure; report that one.
    if let Some(first) = failures.first().or(cancelled.first()) {
        return Err(first.clone());
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct Site {
    name: String,
    dir: PathBuf,
}

fn discover_sites(input: &Path) -> Result<Vec<Site>, InputError> {
    let mut sites = Vec::new();
    for entry in std::fs::read_dir(input)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            sites.push(Site {
                name: entry.file_name().to_string_lossy().to_string(),
                dir: entry.path(),
            });
        }
    }
    if sites.is_empty() {
        return Err(InputError::MissingInput(format!(
            "no site directories under {}",
            input.display()
        )));
    }
    sites.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(sites)
}

fn check_mode_agreement(configs: &[Config]) -> Result<config::Mode, ConfigError> {
    let mode = configs[0].normalization;
    if configs.iter().any(|c| c.normalization != mode) {
        return Err(ConfigError::ModeMismatch);
    }
    Ok(mode)
}
