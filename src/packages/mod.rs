pub mod batch;
pub mod inventory;
pub mod toggle;

use crate::system::command::CommandRunner;
use crate::system::quote_shell_arg;
use crate::{PureRootError, Result};
use async_trait::async_trait;
use serde::{Serialize, Deserialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageState {
    pub package_name: String,
    pub enabled: bool,
    pub system: bool,
}

/// Read access to the system package database.
///
/// Both operations include disabled packages, which a default query would
/// leave out.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PackageQuery: Send + Sync {
    /// `None` when the package is not installed.
    async fn query(&self, package_name: &str) -> Result<Option<PackageState>>;

    async fn list(&self) -> Result<Vec<PackageState>>;
}

/// [`PackageQuery`] over unprivileged `pm list packages` calls.
pub struct PmPackageQuery {
    runner: Arc<dyn CommandRunner>,
    pm_binary: String,
}

impl PmPackageQuery {
    pub fn new(runner: Arc<dyn CommandRunner>, pm_binary: impl Into<String>) -> Self {
        Self {
            runner,
            pm_binary: pm_binary.into(),
        }
    }

    async fn list_names(&self, flag: Option<&str>, filter: Option<&str>) -> Result<BTreeSet<String>> {
        let mut args = vec!["list".to_string(), "packages".to_string()];
        args.extend(flag.map(String::from));
        args.extend(filter.map(String::from));

        let outcome = self.runner.run_direct(&self.pm_binary, args).await?;
        if !outcome.success() {
            return Err(PureRootError::PackageQuery(format!(
                "{} list packages {} exited with {}: {}",
                self.pm_binary,
                flag.unwrap_or_default(),
                outcome.exit_code,
                outcome.stderr.trim()
            )));
        }

        Ok(parse_package_list(&outcome.stdout))
    }
}

#[async_trait]
impl PackageQuery for PmPackageQuery {
    async fn query(&self, package_name: &str) -> Result<Option<PackageState>> {
        // pm filters by substring; exact matches are picked out below.
        let installed = self.list_names(None, Some(package_name)).await?;
        if !installed.contains(package_name) {
            debug!("Package {} not resolvable", package_name);
            return Ok(None);
        }

        let disabled = self.list_names(Some("-d"), Some(package_name)).await?;
        let system = self.list_names(Some("-s"), Some(package_name)).await?;

        Ok(Some(PackageState {
            package_name: package_name.to_string(),
            enabled: !disabled.contains(package_name),
            system: system.contains(package_name),
        }))
    }

    async fn list(&self) -> Result<Vec<PackageState>> {
        let installed = self.list_names(None, None).await?;
        let disabled = self.list_names(Some("-d"), None).await?;
        let system = self.list_names(Some("-s"), None).await?;

        debug!(
            installed = installed.len(),
            disabled = disabled.len(),
            system = system.len(),
            "Listed packages"
        );

        Ok(installed
            .into_iter()
            .map(|name| PackageState {
                enabled: !disabled.contains(&name),
                system: system.contains(&name),
                package_name: name,
            })
            .collect())
    }
}

/// Extracts names from `package:<name>` lines.
pub fn parse_package_list(stdout: &str) -> BTreeSet<String> {
    stdout
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .map(|rest| {
            // `-f` output is `package:<path>=<name>`.
            rest.rsplit_once('=').map(|(_, name)| name).unwrap_or(rest).trim()
        })
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

/// `pm enable '<id>'` or `pm disable '<id>'`.
pub fn pm_toggle_command(pm_binary: &str, package_name: &str, enabled: bool) -> String {
    let action = if enabled { "enable" } else { "disable" };
    format!("{} {} {}", pm_binary, action, quote_shell_arg(package_name))
}
