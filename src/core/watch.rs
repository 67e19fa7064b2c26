use crate::core::{Pipeline, RunSummary};
use crate::utils::error::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

pub struct WatchEngine<P: Pipeline> {
    pipeline: P,
}

impl<P: Pipeline> WatchEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    pub async fn run(&self) -> Result<RunSummary> {
        tracing::debug!("Extracting latest messages...");
        let fetched = self.pipeline.extract().await?;
        let fetched_count = fetched.len();
        tracing::debug!("Fetched {} messages", fetched_count);

        let digest = self.pipeline.transform(fetched).await?;
        if digest.is_empty() {
            tracing::info!("No new messages");
        } else {
            tracing::info!("{} new messages", digest.len());
        }

        let mut summary = self.pipeline.load(digest).await?;
        summary.fetched = fetched_count;
        Ok(summary)
    }

    /// Runs immediately, then once per `interval` until `shutdown` resolves.
    /// A failed run is logged and the loop carries on. Returns the number of
    /// runs that completed successfully.
    pub async fn run_every<F>(&self, interval: Duration, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut completed = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping after {} runs", completed);
                    return completed;
                }
                _ = ticker.tick() => {
                    match self.run().await {
                        Ok(summary) => {
                            completed += 1;
                            tracing::info!(
                                fetched = summary.fetched,
                                new = summary.new,
                                notified = summary.notified,
                                "Run finished"
                            );
                        }
                        Err(e) => {
                            tracing::error!(
                                "❌ Run failed: {} (Category: {:?}, Severity: {:?})",
                                e,
                                e.category(),
                                e.severity()
                            );
                            tracing::warn!("💡 Recovery suggestion: {}", e.recovery_suggestion());
                        }
                    }
                }
            }
        }
    }
}
