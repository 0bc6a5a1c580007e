//! Several toggles in a row, each behind the root gate.

use crate::gate::RootGate;
use crate::packages::inventory::ToggleRisk;
use crate::packages::toggle::{ToggleRequest, ToggleResult};
use crate::{PureRoot, PureRootError, Result};
use async_trait::async_trait;
use tracing::{error, info};

/// Asks the user about each toggle and hears about its result.
#[async_trait]
pub trait ToggleConfirmation: Send + Sync {
    /// `risk` is `Normal` for packages the query could not find.
    async fn confirm(&self, request: &ToggleRequest, risk: ToggleRisk) -> Result<bool>;

    fn on_result(&self, _result: &ToggleResult) {}
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub results: Vec<ToggleResult>,
    pub skipped: Vec<String>,
}

impl BatchSummary {
    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.is_success()).count()
    }
}

pub struct ToggleBatch<'a> {
    app: &'a PureRoot,
    gate: &'a RootGate,
}

impl<'a> ToggleBatch<'a> {
    /// `gate` must have granted access just before; it is re-activated before
    /// every request after the first.
    pub fn new(app: &'a PureRoot, gate: &'a RootGate) -> Self {
        Self { app, gate }
    }

    pub async fn run(
        &self,
        requests: Vec<ToggleRequest>,
        confirmation: &dyn ToggleConfirmation,
    ) -> Result<BatchSummary> {
        let mut summary = BatchSummary::default();

        for (index, request) in requests.into_iter().enumerate() {
            // Root can be revoked while the user answers prompts.
            if index > 0 && !self.gate.activate().await.is_granted() {
                error!("Root access lost before {} {}", request.action(), request.package_name);
                return Err(PureRootError::PermissionDenied("root access lost".to_string()));
            }

            let risk = match self.app.inventory().query(&request.package_name).await? {
                Some(state) => ToggleRisk::classify(&state),
                None => ToggleRisk::Normal,
            };

            if !confirmation.confirm(&request, risk).await? {
                info!("Skipped {} of {}", request.action(), request.package_name);
                summary.skipped.push(request.package_name);
                continue;
            }

            let result = self.app.toggles().apply(&request).await;
            confirmation.on_result(&result);
            summary.results.push(result);
        }

        Ok(summary)
    }
}
