use async_trait::async_trait;
use clap::{Parser, Subcommand};
use pureroot::gate::{GateObserver, GateOutcome, RootGate, TerminalDenialResolver};
use pureroot::packages::batch::{ToggleBatch, ToggleConfirmation};
use pureroot::packages::inventory::{export_csv, export_file_name, filter_packages, AppFilter, ToggleRisk};
use pureroot::packages::toggle::{ToggleRequest, ToggleResult};
use pureroot::system::terminal::TerminalInput;
use pureroot::{Config, LogFormat, PureRoot, PureRootError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Enable and disable Android packages on a rooted device
#[derive(Parser)]
#[command(name = "pureroot", version, about)]
struct Cli {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show whether root access is available
    Status,
    #[command(flatten)]
    Gated(GatedCommand),
}

/// Commands that need root access.
#[derive(Subcommand)]
enum GatedCommand {
    /// List installed packages
    List {
        #[arg(long, value_enum, default_value_t = AppFilter::User)]
        filter: AppFilter,
        /// Case-insensitive package name search
        #[arg(long, default_value = "")]
        search: String,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Enable packages
    Enable {
        #[arg(required = true)]
        packages: Vec<String>,
        /// Do not ask for confirmation
        #[arg(long, short)]
        yes: bool,
    },
    /// Disable packages
    Disable {
        #[arg(required = true)]
        packages: Vec<String>,
        /// Do not ask for confirmation
        #[arg(long, short)]
        yes: bool,
    },
    /// Export package states as CSV
    Export {
        #[arg(long, value_enum, default_value_t = AppFilter::All)]
        filter: AppFilter,
        /// Output file; defaults to a timestamped name in the export directory
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

struct ConsoleObserver;

impl GateObserver for ConsoleObserver {
    fn on_root_reacquired(&self) {
        eprintln!("Root access re-acquired.");
    }

    fn on_cooldown_notice(&self) {
        eprintln!("Root access is unavailable; pureroot may not work until it is granted.");
    }
}

/// Asks before every toggle, with an extra warning for system apps, unless
/// `assume_yes` is set.
struct TerminalConfirmation {
    input: TerminalInput,
    assume_yes: bool,
}

#[async_trait]
impl ToggleConfirmation for TerminalConfirmation {
    async fn confirm(&self, request: &ToggleRequest, risk: ToggleRisk) -> Result<bool> {
        if self.assume_yes {
            return Ok(true);
        }

        let mut prompt = String::new();
        if let Some(warning) = risk.warning(request.action()) {
            prompt.push_str(&warning);
            prompt.push('\n');
        }
        prompt.push_str(&format!(
            "Are you sure you want to {} {}? [y/N] ",
            request.action(),
            request.package_name
        ));

        let answer = self.input.prompt(&prompt).await?.unwrap_or_default();
        let confirmed = matches!(answer.trim().to_lowercase().as_str(), "y" | "yes");
        if !confirmed {
            eprintln!("Skipped {}", request.package_name);
        }
        Ok(confirmed)
    }

    fn on_result(&self, result: &ToggleResult) {
        print_result(result);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = match cli.config.as_deref() {
        Some(path) => Config::load(Some(path)),
        None => Config::from_env(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return Err(e);
        }
    };

    init_logging(config.log_format);
    info!("Starting pureroot");

    let app = PureRoot::builder().with_config(config).build()?;

    match cli.command {
        Commands::Status => status(&app).await,
        Commands::Gated(command) => run_gated(&app, command).await,
    }
}

async fn run_gated(app: &PureRoot, command: GatedCommand) -> Result<()> {
    let input = TerminalInput::stdin();
    let gate = app.gate(
        "main",
        Arc::new(TerminalDenialResolver::new(Arc::clone(app.checker()), input.clone())),
        Arc::new(ConsoleObserver),
    );
    acquire_root(app, &gate).await?;

    match command {
        GatedCommand::List { filter, search, json } => list(app, filter, &search, json).await,
        GatedCommand::Enable { packages, yes } => toggle(app, &gate, input, packages, true, yes).await,
        GatedCommand::Disable { packages, yes } => toggle(app, &gate, input, packages, false, yes).await,
        GatedCommand::Export { filter, output } => export(app, filter, output).await,
    }
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pureroot=info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json().with_writer(std::io::stderr)).init(),
        LogFormat::Text => registry.with(fmt::layer().with_writer(std::io::stderr)).init(),
    }
}

async fn status(app: &PureRoot) -> Result<()> {
    let status = app.checker().status().await;
    println!("elevated access : {}", status.elevated_access);
    println!("su binary found : {}", status.binary_present);
    println!("running as root : {}", pureroot::system::is_root());
    Ok(())
}

/// First-launch prompt, then the gate.
async fn acquire_root(app: &PureRoot, gate: &RootGate) -> Result<()> {
    eprintln!("Checking root status...");
    if !app.checker().request_access().await {
        warn!("Root access denied or not available on first request");
    }

    match gate.activate().await {
        outcome if outcome.is_granted() => Ok(()),
        GateOutcome::Suppressed => Err(PureRootError::PermissionDenied(
            "root access unavailable, retry in a few seconds".to_string(),
        )),
        _ => {
            eprintln!("Exiting: pureroot cannot work without root access.");
            Err(PureRootError::PermissionDenied("root access not granted".to_string()))
        }
    }
}

async fn list(app: &PureRoot, filter: AppFilter, search: &str, json: bool) -> Result<()> {
    let packages = app.inventory().load().await?;
    let shown = filter_packages(&packages, filter, search);

    if json {
        println!("{}", serde_json::to_string_pretty(&shown)?);
        return Ok(());
    }

    for package in &shown {
        println!(
            "{:<8} {:<6} {}",
            if package.enabled { "enabled" } else { "DISABLED" },
            if package.system { "system" } else { "user" },
            package.package_name
        );
    }
    eprintln!("{} of {} packages", shown.len(), packages.len());
    Ok(())
}

async fn toggle(
    app: &PureRoot,
    gate: &RootGate,
    input: TerminalInput,
    packages: Vec<String>,
    enabled: bool,
    yes: bool,
) -> Result<()> {
    let requests = packages
        .into_iter()
        .map(|name| {
            if enabled {
                ToggleRequest::enable(name)
            } else {
                ToggleRequest::disable(name)
            }
        })
        .collect();

    let confirmation = TerminalConfirmation {
        input,
        assume_yes: yes,
    };
    let summary = ToggleBatch::new(app, gate).run(requests, &confirmation).await?;

    let failed = summary.failed();
    if failed > 0 {
        return Err(PureRootError::Other(anyhow::anyhow!("{} operation(s) failed", failed)));
    }
    Ok(())
}

fn print_result(result: &ToggleResult) {
    match result {
        ToggleResult::Success { package_name } => println!("Done: {}", package_name),
        failure => eprintln!("Failed: {}", failure),
    }
}

async fn export(app: &PureRoot, filter: AppFilter, output: Option<PathBuf>) -> Result<()> {
    let packages = filter_packages(&app.inventory().load().await?, filter, "");
    let path = output.unwrap_or_else(|| app.config().export_dir.join(export_file_name(chrono::Local::now())));

    let mut buffer = Vec::new();
    export_csv(&packages, &mut buffer)?;
    tokio::fs::write(&path, buffer).await?;

    info!("Exported {} packages to {}", packages.len(), path.display());
    println!("App list exported to {}", path.display());
    Ok(())
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
    fn status_stays_outside_the_gated_commands() {
        let cli = Cli::try_parse_from(["pureroot", "status"]).unwrap();
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn toggles_parse_as_gated_commands() {
        let cli = Cli::try_parse_from(["pureroot", "disable", "com.a", "com.b", "--yes"]).unwrap();
        match cli.command {
            Commands::Gated(GatedCommand::Disable { packages, yes }) => {
                assert_eq!(packages, vec!["com.a".to_string(), "com.b".to_string()]);
                assert!(yes);
            }
            _ => panic!("expected a gated disable"),
        }

        let cli = Cli::try_parse_from(["pureroot", "list", "--filter", "system", "--search", "google"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Gated(GatedCommand::List {
                filter: AppFilter::System,
                ..
            })
        ));
    }
}
