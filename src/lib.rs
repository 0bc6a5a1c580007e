pub mod gate;
pub mod packages;
pub mod system;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{debug, info};

use gate::{DenialCooldown, DenialResolver, GateObserver, RootGate};
use packages::inventory::PackageInventory;
use packages::toggle::PackageToggleService;
use packages::{PackageQuery, PmPackageQuery};
use system::command::{CommandRunner, SuCommandRunner};
use system::root::{RootStatusChecker, DEFAULT_SU_PATHS};

#[derive(Debug, Error)]
pub enum PureRootError {
    #[error("Failed to start {0}")]
    Spawn(String),

    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    #[error("Command error: {0}")]
    Execution(String),

    #[error("Package query failed: {0}")]
    PackageQuery(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PureRootError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub su_binary: String,
    pub pm_binary: String,
    pub which_binary: String,
    pub su_paths: Vec<String>,
    pub denial_cooldown_ms: u64,
    pub command_timeout_secs: u64,
    pub log_format: LogFormat,
    pub export_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            su_binary: "su".to_string(),
            pm_binary: "pm".to_string(),
            which_binary: "which".to_string(),
            su_paths: DEFAULT_SU_PATHS.iter().map(|p| p.to_string()).collect(),
            denial_cooldown_ms: 5000,
            command_timeout_secs: 60,
            log_format: LogFormat::Text,
            export_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Layers defaults, an optional config file and `PUREROOT_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let defaults = config::Config::try_from(&Config::default())
            .map_err(|e| PureRootError::Configuration(e.to_string()))?;

        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            debug!("Loading configuration file {}", path.display());
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix("PUREROOT")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("su_paths"),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| PureRootError::Configuration(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("su_binary", &self.su_binary),
            ("pm_binary", &self.pm_binary),
            ("which_binary", &self.which_binary),
        ] {
            if value.trim().is_empty() {
                return Err(PureRootError::Configuration(format!("{} must not be empty", name)));
            }
        }

        if self.denial_cooldown_ms == 0 {
            return Err(PureRootError::Configuration(
                "denial_cooldown_ms must be greater than zero".to_string(),
            ));
        }

        if self.command_timeout_secs == 0 {
            return Err(PureRootError::Configuration(
                "command_timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn denial_cooldown(&self) -> Duration {
        Duration::from_millis(self.denial_cooldown_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Application context shared by every gated step.
///
/// Owns the one [`DenialCooldown`] of the process; every gate created through
/// [`PureRoot::gate`] shares it.
#[derive(Clone)]
pub struct PureRoot {
    config: Arc<Config>,
    checker: Arc<RootStatusChecker>,
    cooldown: Arc<DenialCooldown>,
    toggles: Arc<PackageToggleService>,
    inventory: Arc<PackageInventory>,
}

impl PureRoot {
    pub fn builder() -> PureRootBuilder {
        PureRootBuilder::default()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn checker(&self) -> &Arc<RootStatusChecker> {
        &self.checker
    }

    pub fn cooldown(&self) -> &Arc<DenialCooldown> {
        &self.cooldown
    }

    pub fn toggles(&self) -> &PackageToggleService {
        &self.toggles
    }

    pub fn inventory(&self) -> &PackageInventory {
        &self.inventory
    }

    pub fn gate(
        &self,
        screen: impl Into<String>,
        resolver: Arc<dyn DenialResolver>,
        observer: Arc<dyn GateObserver>,
    ) -> RootGate {
        RootGate::new(
            screen,
            Arc::clone(&self.checker),
            Arc::clone(&self.cooldown),
            resolver,
            observer,
        )
    }
}

#[derive(Default)]
pub struct PureRootBuilder {
    config: Option<Config>,
    runner: Option<Arc<dyn CommandRunner>>,
    package_query: Option<Arc<dyn PackageQuery>>,
}

impl PureRootBuilder {
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn with_package_query(mut self, query: Arc<dyn PackageQuery>) -> Self {
        self.package_query = Some(query);
        self
    }

    pub fn build(self) -> Result<PureRoot> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let config = Arc::new(config);

        let runner = self.runner.unwrap_or_else(|| {
            Arc::new(
                SuCommandRunner::new(config.su_binary.clone())
                    .with_timeout(config.command_timeout()),
            )
        });

        let package_query = self.package_query.unwrap_or_else(|| {
            Arc::new(PmPackageQuery::new(Arc::clone(&runner), config.pm_binary.clone()))
        });

        let checker = Arc::new(RootStatusChecker::new(Arc::clone(&runner), &config));
        let cooldown = Arc::new(DenialCooldown::new(config.denial_cooldown()));
        let toggles = Arc::new(PackageToggleService::new(
            Arc::clone(&runner),
            Arc::clone(&package_query),
            config.pm_binary.clone(),
        ));
        let inventory = Arc::new(PackageInventory::new(package_query));

        info!(
            su = %config.su_binary,
            cooldown_ms = config.denial_cooldown_ms,
            "PureRoot context ready"
        );

        Ok(PureRoot {
            config,
            checker,
            cooldown,
            toggles,
            inventory,
        })
    }
}
