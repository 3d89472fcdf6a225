use std::fmt::Display;
use std::future::Future;
use tokio::sync::OnceCell;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SetupOutcome {
    /// Setup ran (or was not needed) and the store is ready.
    Ready,
    /// Setup failed; queries go ahead and surface their own errors.
    Skipped,
}

/// One-shot initialization gate for schema provisioning.
///
/// The first caller runs the action; callers arriving while it is pending
/// await the same result. An outcome is cached for the lifetime of the gate.
/// An `Err` from the action (setup endpoint unreachable) is not: the call
/// counts as skipped and the next caller runs the action again.
#[derive(Debug, Default)]
pub(crate) struct SetupGate {
    outcome: OnceCell<SetupOutcome>,
}

impl SetupGate {
    pub fn new() -> Self {
        Self {
            outcome: OnceCell::new(),
        }
    }

    pub async fn ensure<F, Fut, E>(&self, action: F) -> SetupOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SetupOutcome, E>>,
        E: Display,
    {
        match self.outcome.get_or_try_init(action).await {
            Ok(outcome) => *outcome,
            Err(e) => {
                tracing::warn!(error = %e, "store setup unreachable, will retry");
                SetupOutcome::Skipped
            }
        }
    }

    pub fn outcome(&self) -> Option<SetupOutcome> {
        self.outcome.get().copied()
    }
}
