use crate::packages::{PackageQuery, PackageState};
use crate::Result;
use chrono::{DateTime, TimeZone};
use clap::ValueEnum;
use serde::{Serialize, Deserialize};
use std::fmt::Display;
use std::io::Write;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AppFilter {
    #[default]
    User,
    System,
    All,
}

impl AppFilter {
    pub fn matches(&self, package: &PackageState) -> bool {
        match self {
            AppFilter::User => !package.system,
            AppFilter::System => package.system,
            AppFilter::All => true,
        }
    }
}

/// How careful the user should be before toggling a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ToggleRisk {
    Normal,
    System,
    /// Core framework or input method; disabling can leave the device unusable.
    CoreAndroid,
    GoogleApp,
}

impl ToggleRisk {
    pub fn classify(package: &PackageState) -> Self {
        if !package.system {
            return ToggleRisk::Normal;
        }

        let name = package.package_name.as_str();
        if name.starts_with("com.android") || name.starts_with("com.google.android.inputmethod") {
            ToggleRisk::CoreAndroid
        } else if name.starts_with("com.google.android") {
            ToggleRisk::GoogleApp
        } else {
            ToggleRisk::System
        }
    }

    pub fn warning(&self, action: &str) -> Option<String> {
        let system = format!(
            "This is a system app. Being able to {} it does not mean it is safe to.",
            action
        );
        match self {
            ToggleRisk::Normal => None,
            ToggleRisk::System => Some(system),
            ToggleRisk::CoreAndroid => Some(format!(
                "{} It belongs to the Android core; choosing to {} it can make the device unstable or unbootable.",
                system, action
            )),
            ToggleRisk::GoogleApp => Some(format!(
                "{} Other Google services may depend on it; choosing to {} it can break them.",
                system, action
            )),
        }
    }
}

pub struct PackageInventory {
    query: Arc<dyn PackageQuery>,
}

impl PackageInventory {
    pub fn new(query: Arc<dyn PackageQuery>) -> Self {
        Self { query }
    }

    pub async fn query(&self, package_name: &str) -> Result<Option<PackageState>> {
        self.query.query(package_name).await
    }

    /// All installed packages, disabled ones included, sorted by name.
    pub async fn load(&self) -> Result<Vec<PackageState>> {
        let mut packages = self.query.list().await?;
        packages.sort_by_key(|p| p.package_name.to_lowercase());
        info!("Total packages loaded: {}", packages.len());
        Ok(packages)
    }
}

pub fn filter_packages(packages: &[PackageState], filter: AppFilter, search: &str) -> Vec<PackageState> {
    let needle = search.trim().to_lowercase();
    packages
        .iter()
        .filter(|p| filter.matches(p))
        .filter(|p| needle.is_empty() || p.package_name.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

pub fn export_csv<W: Write>(packages: &[PackageState], mut writer: W) -> std::io::Result<()> {
    writeln!(writer, "Package Name,Status,Type")?;
    for package in packages {
        writeln!(
            writer,
            "{},{},{}",
            csv_field(&package.package_name),
            if package.enabled { "Enabled" } else { "Disabled" },
            if package.system { "System" } else { "User" },
        )?;
    }
    writer.flush()
}

pub fn export_file_name<Tz>(now: DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!("PureRoot_AppStatus_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
