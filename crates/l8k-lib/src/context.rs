//! Per-run context passed to every provider and collaborator call

use crate::error::LaunchError;
use crate::ui::{Output, SilentOutput};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Cancellation and user-facing output for one workflow run
#[derive(Clone)]
pub struct RunContext {
    cancel: CancellationToken,
    ui: Arc<dyn Output>,
}

impl RunContext {
    pub fn new(cancel: CancellationToken, ui: Arc<dyn Output>) -> Self {
        Self { cancel, ui }
    }

    /// Context with a fresh token and no terminal output
    pub fn silent() -> Self {
        Self::new(CancellationToken::new(), Arc::new(SilentOutput))
    }

    pub fn ui(&self) -> &dyn Output {
        self.ui.as_ref()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail with `Cancelled` once the token has fired
    pub fn check(&self) -> Result<(), LaunchError> {
        if self.cancel.is_cancelled() {
            return Err(LaunchError::Cancelled);
        }
        Ok(())
    }

    /// Race a future against cancellation
    ///
    /// The future is dropped when the token fires first.
    pub async fn run<T, E, F>(&self, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<LaunchError>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(LaunchError::Cancelled.into()),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_returns_future_result() {
        let ctx = RunContext::silent();
        let result: Result<u32, LaunchError> = ctx.run(async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancellation() {
        let ctx = RunContext::silent();
        let token = ctx.token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let result: Result<(), LaunchError> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(LaunchError::Cancelled)));
        assert!(ctx.check().is_err());
    }

    #[tokio::test]
    async fn test_run_converts_into_anyhow() {
        let ctx = RunContext::silent();
        ctx.token().cancel();
        let result: anyhow::Result<()> = ctx.run(async { Ok(()) }).await;
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LaunchError>(),
            Some(LaunchError::Cancelled)
        ));
    }
}
