//! Periodic drivers for the getter and tester.

use async_trait::async_trait;
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::getter::Getter;
use crate::tester::Tester;

/// Work run once per cycle by [`spawn_periodic`].
#[async_trait]
pub trait Cycle: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn run_cycle(&self) -> anyhow::Result<()>;
}

#[async_trait]
impl Cycle for Getter {
    fn name(&self) -> &str {
        "getter"
    }

    async fn run_cycle(&self) -> anyhow::Result<()> {
        let report = self.run().await?;
        debug!("getter cycle: {:?}", report);
        Ok(())
    }
}

#[async_trait]
impl Cycle for Tester {
    fn name(&self) -> &str {
        "tester"
    }

    async fn run_cycle(&self) -> anyhow::Result<()> {
        let report = self.run().await?;
        debug!("tester cycle: {:?}", report);
        Ok(())
    }
}

/// Run `task` now and then once per `period` until `shutdown` fires.
///
/// The period is measured from the end of one cycle to the start of the
/// next, so cycles never overlap. A failing cycle is logged and the next one
/// starts from scratch. Cancellation is observed between cycles.
pub fn spawn_periodic<C: Cycle>(
    task: Arc<C>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("starting {} every {:?}", task.name(), period);
        let mut cycle: u64 = 0;
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            debug!("{} loop {} start...", task.name(), cycle);
            if let Err(err) = task.run_cycle().await {
                error!("{} cycle {} failed: {:#}", task.name(), cycle, err);
            }
            cycle += 1;

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(period) => {}
            }
        }
        info!("{} stopped after {} cycles", task.name(), cycle);
    })
}
