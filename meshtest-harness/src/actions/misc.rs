use crate::action::Execute;
use crate::error::HarnessResult;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Marks the end of a case's setup actions. Does nothing when run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetupComplete;

#[async_trait]
impl Execute for SetupComplete {
    async fn execute(&self) -> HarnessResult<()> {
        debug!("Setup complete");
        Ok(())
    }
}

/// Pauses the case.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sleep {
    pub duration: Duration,
}

#[async_trait]
impl Execute for Sleep {
    async fn execute(&self) -> HarnessResult<()> {
        tokio::time::sleep(self.duration).await;
        Ok(())
    }
}
