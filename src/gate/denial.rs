//! Request/response channel to the external denial-resolution flow.

use crate::system::root::RootStatusChecker;
use crate::system::terminal::TerminalInput;
use serde::{Serialize, Deserialize};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DenialResolution {
    /// Access was granted while the flow was showing.
    Resolved,
    /// The user backed out or declined.
    Unresolved,
}

/// One surfacing of the denial flow, answered exactly once.
#[derive(Debug)]
pub struct DenialRequest {
    token: Uuid,
    binary_present: bool,
    reply: oneshot::Sender<DenialResolution>,
}

/// The gate's end of a [`DenialRequest`].
#[derive(Debug)]
pub struct PendingDenial {
    token: Uuid,
    reply: oneshot::Receiver<DenialResolution>,
}

impl DenialRequest {
    pub fn new(binary_present: bool) -> (Self, PendingDenial) {
        let token = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        (
            Self {
                token,
                binary_present,
                reply: tx,
            },
            PendingDenial { token, reply: rx },
        )
    }

    pub fn token(&self) -> Uuid {
        self.token
    }

    /// A superuser binary exists, so access was denied rather than missing.
    pub fn binary_present(&self) -> bool {
        self.binary_present
    }

    /// The gate stopped waiting for this request.
    pub fn is_abandoned(&self) -> bool {
        self.reply.is_closed()
    }

    pub fn resolve(self, resolution: DenialResolution) {
        if self.reply.send(resolution).is_err() {
            debug!(token = %self.token, "Denial request answered after the gate went away");
        }
    }
}

impl PendingDenial {
    pub fn token(&self) -> Uuid {
        self.token
    }

    /// A request dropped without an answer counts as unresolved.
    pub async fn wait(self) -> DenialResolution {
        self.reply.await.unwrap_or(DenialResolution::Unresolved)
    }
}

/// The flow shown when root access is missing.
pub trait DenialResolver: Send + Sync {
    /// Takes ownership of the request; the answer goes through
    /// [`DenialRequest::resolve`], possibly from another task.
    fn launch(&self, request: DenialRequest);
}

/// Terminal rendition of the permission-denied screen.
///
/// Enter re-checks access, `q` or end of input backs out.
pub struct TerminalDenialResolver {
    checker: Arc<RootStatusChecker>,
    input: TerminalInput,
}

impl TerminalDenialResolver {
    pub fn new(checker: Arc<RootStatusChecker>, input: TerminalInput) -> Self {
        Self { checker, input }
    }

    pub fn message(binary_present: bool) -> &'static str {
        if binary_present {
            "Root access was denied to pureroot. Grant it in your root manager \
             (Magisk, KernelSU, ...) and press Enter to retry, or type q to exit."
        } else {
            "No root access detected on this device. pureroot needs a rooted \
             device with a working su binary. Press Enter to retry, or type q to exit."
        }
    }
}

impl DenialResolver for TerminalDenialResolver {
    fn launch(&self, request: DenialRequest) {
        let checker = Arc::clone(&self.checker);
        let input = self.input.clone();
        tokio::spawn(async move {
            eprintln!("{}", Self::message(request.binary_present()));

            loop {
                if request.is_abandoned() {
                    debug!(token = %request.token(), "Denial prompt abandoned");
                    return;
                }

                let line = match input.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Reading denial prompt input failed: {}", e);
                        break;
                    }
                };

                if line.trim().eq_ignore_ascii_case("q") {
                    break;
                }

                if checker.has_elevated_access().await {
                    info!(token = %request.token(), "Root access detected from denial prompt");
                    request.resolve(DenialResolution::Resolved);
                    return;
                }
                eprintln!("Root access still not available.");
            }

            request.resolve(DenialResolution::Unresolved);
        });
    }
}
