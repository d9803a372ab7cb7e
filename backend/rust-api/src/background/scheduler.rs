use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::services::ReconciliationEngine;

/// Periodic pull of every linked merchant's payments.
pub struct BackgroundScheduler {
    scheduler: Mutex<JobScheduler>,
}

impl BackgroundScheduler {
    pub async fn new(cron: &str, reconciler: Arc<ReconciliationEngine>) -> anyhow::Result<Self> {
        let scheduler = JobScheduler::new().await?;

        scheduler
            .add(Job::new_async(cron, move |_uuid, _l| {
                let reconciler = reconciler.clone();
                Box::pin(async move {
                    match reconciler.sync_all().await {
                        Ok(sweep) => info!(
                            merchants = sweep.merchants,
                            failed = sweep.failed,
                            recorded = sweep.recorded,
                            "Payment sync sweep finished"
                        ),
                        Err(e) => error!("Payment sync sweep could not list merchants: {}", e),
                    }
                })
            })?)
            .await?;

        scheduler.start().await?;
        info!(cron, "Background scheduler started");

        Ok(Self {
            scheduler: Mutex::new(scheduler),
        })
    }

    pub async fn shutdown(&self) {
        if let Err(e) = self.scheduler.lock().await.shutdown().await {
            error!("Background scheduler shutdown failed: {}", e);
        }
        info!("Background scheduler stopped");
    }
}
