use crate::packages::{pm_toggle_command, PackageQuery};
use crate::system::command::CommandRunner;
use serde::{Serialize, Deserialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleRequest {
    pub package_name: String,
    pub enabled: bool,
}

impl ToggleRequest {
    pub fn enable(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            enabled: true,
        }
    }

    pub fn disable(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            enabled: false,
        }
    }

    pub fn action(&self) -> &'static str {
        if self.enabled {
            "enable"
        } else {
            "disable"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleFailureKind {
    /// The shell could not be run, or verification itself errored.
    Execution,
    /// `pm` ran and exited non-zero.
    Command { exit_code: i32 },
    /// `pm` exited 0 but the package kept its previous state.
    VerificationMismatch,
    /// The package could not be found after the command. Whether the command
    /// took effect is unknown.
    Unresolvable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ToggleResult {
    Success {
        package_name: String,
    },
    Failure {
        package_name: String,
        kind: ToggleFailureKind,
        reason: String,
    },
}

impl ToggleResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ToggleResult::Success { .. })
    }

    pub fn package_name(&self) -> &str {
        match self {
            ToggleResult::Success { package_name } => package_name,
            ToggleResult::Failure { package_name, .. } => package_name,
        }
    }
}

impl fmt::Display for ToggleResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToggleResult::Success { package_name } => write!(f, "{}: ok", package_name),
            ToggleResult::Failure {
                package_name,
                reason,
                ..
            } => write!(f, "{}: {}", package_name, reason),
        }
    }
}

pub struct PackageToggleService {
    runner: Arc<dyn CommandRunner>,
    query: Arc<dyn PackageQuery>,
    pm_binary: String,
}

impl PackageToggleService {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        query: Arc<dyn PackageQuery>,
        pm_binary: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            query,
            pm_binary: pm_binary.into(),
        }
    }

    pub async fn apply(&self, request: &ToggleRequest) -> ToggleResult {
        self.set_enabled(&request.package_name, request.enabled).await
    }

    /// Runs `pm enable|disable` as root, then confirms the new state through
    /// the package query. Never fails; every problem becomes a
    /// [`ToggleResult::Failure`].
    pub async fn set_enabled(&self, package_name: &str, enabled: bool) -> ToggleResult {
        let action = if enabled { "enable" } else { "disable" };
        let command = pm_toggle_command(&self.pm_binary, package_name, enabled);
        info!("Executing PM command: {}", command);

        let outcome = match self.runner.run_elevated(&command).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Exception during {} for {}: {}", action, package_name, e);
                return failure(package_name, ToggleFailureKind::Execution, format!("Exception: {}", e));
            }
        };

        debug!("{} command exit value: {} for {}", action, outcome.exit_code, package_name);
        if !outcome.stderr.trim().is_empty() {
            warn!("Stderr for {} {}: {}", action, package_name, outcome.stderr.trim());
        }
        if !outcome.stdout.trim().is_empty() {
            debug!("Stdout for {} {}: {}", action, package_name, outcome.stdout.trim());
        }

        if !outcome.success() {
            let reason = with_stderr(
                format!("Command '{}' failed (code {})", action, outcome.exit_code),
                &outcome.stderr,
            );
            error!("{}", reason);
            return failure(
                package_name,
                ToggleFailureKind::Command {
                    exit_code: outcome.exit_code,
                },
                reason,
            );
        }

        match self.query.query(package_name).await {
            Ok(Some(state)) if state.enabled == enabled => {
                info!("Package {} successfully {}d", package_name, action);
                ToggleResult::Success {
                    package_name: package_name.to_string(),
                }
            }
            Ok(Some(state)) => {
                warn!(
                    "Package {} state did not change to {}. Current state: enabled={}",
                    package_name, action, state.enabled
                );
                failure(
                    package_name,
                    ToggleFailureKind::VerificationMismatch,
                    with_stderr("State did not change as expected".to_string(), &outcome.stderr),
                )
            }
            Ok(None) => {
                error!("Package {} not found after {} command", package_name, action);
                failure(
                    package_name,
                    ToggleFailureKind::Unresolvable,
                    with_stderr("Package not found after command".to_string(), &outcome.stderr),
                )
            }
            Err(e) => {
                error!("Verifying {} of {} failed: {}", action, package_name, e);
                failure(package_name, ToggleFailureKind::Execution, format!("Exception: {}", e))
            }
        }
    }
}

fn failure(package_name: &str, kind: ToggleFailureKind, reason: String) -> ToggleResult {
    ToggleResult::Failure {
        package_name: package_name.to_string(),
        kind,
        reason,
    }
}

fn with_stderr(message: String, stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("{}.", message)
    } else {
        format!("{}. Stderr: {}", message, stderr)
    }
}
