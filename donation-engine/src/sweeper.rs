//! Scheduled background jobs: the pending-record sweep and campaign
//! expiry.

use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::chain::ChainProvider;
use crate::config::ReconciliationConfig;
use crate::core::DonationCore;
use crate::errors::{EngineError, Result};

pub struct Sweeper {
    scheduler: JobScheduler,
}

impl Sweeper {
    pub async fn new() -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| EngineError::Scheduler(e.to_string()))?;
        Ok(Self { scheduler })
    }

    /// Register both jobs and start the scheduler
    pub async fn start<P: ChainProvider + 'static>(
        &mut self,
        core: Arc<DonationCore<P>>,
        config: &ReconciliationConfig,
    ) -> Result<()> {
        info!(
            sweep = %config.sweep_schedule,
            expiry = %config.campaign_expiry_schedule,
            "Starting background jobs"
        );

        let sweep_core = core.clone();
        let sweep_job = Job::new_async(config.sweep_schedule.as_str(), move |_uuid, _lock| {
            let core = sweep_core.clone();
            Box::pin(async move {
                match core.reconcile_pending().await {
                    Ok(report) if report.still_pending > 0 => {
                        info!(still_pending = report.still_pending, "Sweep left records pending");
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Pending sweep failed"),
                }
            })
        })
        .map_err(|e| EngineError::Scheduler(e.to_string()))?;

        let expiry_core = core;
        let expiry_job = Job::new_async(
            config.campaign_expiry_schedule.as_str(),
            move |_uuid, _lock| {
                let core = expiry_core.clone();
                Box::pin(async move {
                    match core.end_expired_campaigns().await {
                        Ok(0) => {}
                        Ok(n) => info!(ended = n, "Campaign expiry pass finished"),
                        Err(e) => error!(error = %e, "Campaign expiry pass failed"),
                    }
                })
            },
        )
        .map_err(|e| EngineError::Scheduler(e.to_string()))?;

        self.scheduler
            .add(sweep_job)
            .await
            .map_err(|e| EngineError::Scheduler(e.to_string()))?;
        self.scheduler
            .add(expiry_job)
            .await
            .map_err(|e| EngineError::Scheduler(e.to_string()))?;
        self.scheduler
            .start()
            .await
            .map_err(|e| EngineError::Scheduler(e.to_string()))?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| EngineError::Scheduler(e.to_string()))?;
        info!("Background jobs stopped");
        Ok(())
    }
}
