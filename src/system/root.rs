//! Root availability probes.
//!
//! Two separate questions are answered here: whether elevated access can be
//! obtained right now, and whether a superuser binary exists on the device at
//! all. The second one lets callers tell "rooted but denied" apart from "not
//! rooted".

use crate::system::command::CommandRunner;
use crate::Config;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Well-known superuser locations probed before falling back to `which su`.
pub const DEFAULT_SU_PATHS: [&str; 10] = [
    "/system/app/Superuser.apk",
    "/sbin/su",
    "/system/bin/su",
    "/system/xbin/su",
    "/data/local/xbin/su",
    "/data/local/bin/su",
    "/system/sd/xbin/su",
    "/system/bin/failsafe/su",
    "/data/local/su",
    "/su/bin/su",
];

const ROOT_UID_MARKER: &str = "uid=0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RootStatus {
    pub elevated_access: bool,
    pub binary_present: bool,
}

pub struct RootStatusChecker {
    runner: Arc<dyn CommandRunner>,
    su_binary: String,
    which_binary: String,
    su_paths: Vec<PathBuf>,
}

impl RootStatusChecker {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &Config) -> Self {
        Self {
            runner,
            su_binary: config.su_binary.clone(),
            which_binary: config.which_binary.clone(),
            su_paths: config.su_paths.iter().map(PathBuf::from).collect(),
        }
    }

    /// Runs `su -c id` and requires both a zero exit code and `uid=0` in
    /// stdout. Some `su` builds fall back to an unprivileged shell and still
    /// exit 0.
    pub async fn has_elevated_access(&self) -> bool {
        let args = vec!["-c".to_string(), "id".to_string()];
        match self.runner.run_direct(&self.su_binary, args).await {
            Ok(outcome) if outcome.success() => {
                let granted = outcome.stdout.contains(ROOT_UID_MARKER);
                if !granted {
                    warn!("{} -c id exited 0 without uid=0: {}", self.su_binary, outcome.stdout.trim());
                }
                granted
            }
            Ok(outcome) => {
                debug!("{} -c id exited with {}", self.su_binary, outcome.exit_code);
                false
            }
            Err(e) => {
                debug!("Root verification failed: {}", e);
                false
            }
        }
    }

    pub async fn superuser_binary_present(&self) -> bool {
        for path in &self.su_paths {
            match tokio::fs::try_exists(path).await {
                Ok(true) => {
                    debug!("Superuser binary found at {}", path.display());
                    return true;
                }
                Ok(false) => {}
                Err(e) => debug!("Cannot probe {}: {}", path.display(), e),
            }
        }

        match self
            .runner
            .run_direct(&self.which_binary, vec![self.su_binary.clone()])
            .await
        {
            Ok(outcome) => {
                debug!("which {} exited with {}", self.su_binary, outcome.exit_code);
                outcome.success()
            }
            Err(e) => {
                debug!("which {} failed: {}", self.su_binary, e);
                false
            }
        }
    }

    pub async fn status(&self) -> RootStatus {
        RootStatus {
            elevated_access: self.has_elevated_access().await,
            binary_present: self.superuser_binary_present().await,
        }
    }

    /// First-launch request: opens an elevated shell and runs `id` in it, which
    /// is what makes a root manager show its grant prompt.
    pub async fn request_access(&self) -> bool {
        info!("Requesting superuser access");
        match self.runner.run_elevated("id").await {
            Ok(outcome) => {
                let granted = outcome.success() && outcome.stdout.contains(ROOT_UID_MARKER);
                info!(exit_code = outcome.exit_code, granted, "Superuser request finished");
                granted
            }
            Err(e) => {
                warn!("Superuser request failed: {}", e);
                false
            }
        }
    }
}
