//! Per-screen root gate.
//!
//! Every activation re-checks root access. When it is missing the gate hands
//! control to the denial flow, at most once per cooldown window across the
//! whole process.

mod cooldown;
mod denial;

pub use cooldown::{CooldownToken, DenialCooldown};
pub use denial::{DenialRequest, DenialResolution, DenialResolver, PendingDenial, TerminalDenialResolver};

use crate::system::root::RootStatusChecker;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GateState {
    Unchecked,
    Checking,
    Granted,
    DeniedCooldownActive,
    DeniedAgain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GateOutcome {
    /// Access confirmed. `reacquired` is set when a denial preceded it.
    Granted { reacquired: bool },
    /// The denial flow was shown and answered.
    Denied {
        binary_present: bool,
        resolution: DenialResolution,
    },
    /// Access is missing but the flow was shown too recently.
    Suppressed,
}

impl GateOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(
            self,
            GateOutcome::Granted { .. }
                | GateOutcome::Denied {
                    resolution: DenialResolution::Resolved,
                    ..
                }
        )
    }
}

/// Callbacks for the screen a gate protects.
pub trait GateObserver: Send + Sync {
    fn on_root_verified(&self) {}

    fn on_root_reacquired(&self) {}

    /// Access is missing and the denial flow is cooling down; the screen may
    /// not be usable.
    fn on_cooldown_notice(&self) {}
}

pub struct RootGate {
    screen: String,
    checker: Arc<RootStatusChecker>,
    cooldown: Arc<DenialCooldown>,
    resolver: Arc<dyn DenialResolver>,
    observer: Arc<dyn GateObserver>,
    state: Mutex<GateState>,
    denied_since_grant: AtomicBool,
    reset_timer: Mutex<Option<JoinHandle<()>>>,
}

impl RootGate {
    pub fn new(
        screen: impl Into<String>,
        checker: Arc<RootStatusChecker>,
        cooldown: Arc<DenialCooldown>,
        resolver: Arc<dyn DenialResolver>,
        observer: Arc<dyn GateObserver>,
    ) -> Self {
        Self {
            screen: screen.into(),
            checker,
            cooldown,
            resolver,
            observer,
            state: Mutex::new(GateState::Unchecked),
            denied_since_grant: AtomicBool::new(false),
            reset_timer: Mutex::new(None),
        }
    }

    pub fn screen(&self) -> &str {
        &self.screen
    }

    pub fn state(&self) -> GateState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs one gate evaluation. Call it on every activation of the screen.
    pub async fn activate(&self) -> GateOutcome {
        debug!(screen = %self.screen, "Checking root status");
        self.set_state(GateState::Checking);

        if self.checker.has_elevated_access().await {
            let reacquired = self.denied_since_grant.swap(false, Ordering::SeqCst);
            self.grant(reacquired);
            return GateOutcome::Granted { reacquired };
        }

        warn!(screen = %self.screen, "Root access lost or not available");

        let Some(token) = self.cooldown.try_arm() else {
            warn!(
                screen = %self.screen,
                "Denial flow was shown recently, not showing it again"
            );
            self.set_state(GateState::DeniedCooldownActive);
            self.observer.on_cooldown_notice();
            return GateOutcome::Suppressed;
        };

        self.schedule_reset(token);
        self.denied_since_grant.store(true, Ordering::SeqCst);
        self.set_state(GateState::DeniedCooldownActive);

        let binary_present = self.checker.superuser_binary_present().await;
        let (request, pending) = DenialRequest::new(binary_present);
        info!(
            screen = %self.screen,
            token = %request.token(),
            binary_present,
            "Surfacing denial flow"
        );
        self.resolver.launch(request);

        let resolution = pending.wait().await;
        match resolution {
            DenialResolution::Resolved => {
                info!(screen = %self.screen, "Root re-acquired through the denial flow");
                self.denied_since_grant.store(false, Ordering::SeqCst);
                self.grant(true);
            }
            DenialResolution::Unresolved => {
                warn!(screen = %self.screen, "Denial flow closed without root access");
                self.set_state(GateState::DeniedAgain);
            }
        }

        GateOutcome::Denied {
            binary_present,
            resolution,
        }
    }

    fn grant(&self, reacquired: bool) {
        self.cooldown.clear();
        self.set_state(GateState::Granted);
        if reacquired {
            self.observer.on_root_reacquired();
        } else {
            debug!(screen = %self.screen, "Root access verified");
            self.observer.on_root_verified();
        }
    }

    fn schedule_reset(&self, token: CooldownToken) {
        let cooldown = Arc::clone(&self.cooldown);
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(token.expires_at()).await;
            if cooldown.expire(token) {
                debug!("Denial cooldown finished");
            }
        });

        let previous = self
            .reset_timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn set_state(&self, state: GateState) {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }
}

impl Drop for RootGate {
    fn drop(&mut self) {
        let timer = self
            .reset_timer
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(timer) = timer {
            timer.abort();
        }
    }
}
