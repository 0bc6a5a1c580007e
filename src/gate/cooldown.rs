use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Process-wide suppression window for the denial flow.
///
/// Arming is a compare-and-set under the lock, so two gates evaluating at the
/// same moment cannot both win. Each arm gets a fresh generation; a reset
/// timer only clears the arm it was scheduled for. The window is also
/// enforced from the arm timestamp, so the cell expires on its own even when
/// no timer is left to clear it.
#[derive(Debug)]
pub struct DenialCooldown {
    window: Duration,
    inner: Mutex<CooldownInner>,
}

#[derive(Debug, Default)]
struct CooldownInner {
    armed_at: Option<Instant>,
    generation: u64,
}

/// Identifies one arming of the cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownToken {
    generation: u64,
    expires_at: Instant,
}

impl CooldownToken {
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }
}

impl DenialCooldown {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            inner: Mutex::new(CooldownInner::default()),
        }
    }

    pub fn is_active(&self) -> bool {
        let inner = self.lock();
        self.active(&inner)
    }

    /// Arms the window unless it is already active.
    pub fn try_arm(&self) -> Option<CooldownToken> {
        let mut inner = self.lock();
        if self.active(&inner) {
            return None;
        }

        let now = Instant::now();
        inner.armed_at = Some(now);
        inner.generation += 1;
        Some(CooldownToken {
            generation: inner.generation,
            expires_at: now + self.window,
        })
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.armed_at = None;
        inner.generation += 1;
    }

    /// Clears the window if `token` is still the current arm. Returns whether
    /// anything was cleared.
    pub fn expire(&self, token: CooldownToken) -> bool {
        let mut inner = self.lock();
        if inner.generation != token.generation || inner.armed_at.is_none() {
            return false;
        }
        inner.armed_at = None;
        true
    }

    fn active(&self, inner: &CooldownInner) -> bool {
        inner
            .armed_at
            .map(|armed_at| armed_at.elapsed() < self.window)
            .unwrap_or(false)
    }

    fn lock(&self) -> MutexGuard<'_, CooldownInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
