use crate::campaigns::{CampaignError, CampaignService};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, serde::Serialize)]
pub struct SweepResult {
    pub campaign_id: Uuid,
    pub name: String,
    #[serde(flatten)]
    pub outcome: SweepOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SweepOutcome {
    Sent { recipient_count: i64 },
    Error { error: String },
}

/// Sends every scheduled campaign whose time has come.
///
/// Campaigns are sent one after the other, oldest schedule first. A failing
/// campaign is reported in its own result and never stops the sweep.
#[derive(Clone)]
pub struct CampaignSweeper {
    campaigns: Arc<CampaignService>,
}

impl CampaignSweeper {
    pub fn new(campaigns: Arc<CampaignService>) -> Self {
        Self { campaigns }
    }

    #[tracing::instrument(name = "Sweep due campaigns", skip(self), fields(due = tracing::field::Empty))]
    pub async fn run(&self) -> Result<Vec<SweepResult>, CampaignError> {
        let due = self.campaigns.find_due(Utc::now()).await?;
        tracing::Span::current().record("due", &due.len());

        let mut results = Vec::with_capacity(due.len());
        for campaign in due {
            let outcome = match self.campaigns.send(campaign.id).await {
                Ok(sent) => SweepOutcome::Sent {
                    recipient_count: sent.stats.total_sent,
                },
                Err(e) => {
                    tracing::warn!(
                        campaign_id = %campaign.id,
                        error.message = %e,
                        "Scheduled campaign could not be sent"
                    );
                    SweepOutcome::Error {
                        error: e.to_string(),
                    }
                }
            };
            results.push(SweepResult {
                campaign_id: campaign.id,
                name: campaign.name,
                outcome,
            });
        }
        Ok(results)
    }
}

pub struct SweeperWorker {
    sweeper: CampaignSweeper,
    interval: Duration,
}

impl SweeperWorker {
    pub fn new(sweeper: CampaignSweeper, interval: Duration) -> Self {
        Self { sweeper, interval }
    }

    pub async fn run_until_terminated(self) -> Result<(), std::io::Error> {
        worker_loop(self.sweeper, self.interval).await;
        Ok(())
    }
}

async fn worker_loop(sweeper: CampaignSweeper, interval: Duration) {
    loop {
        match sweeper.run().await {
            Ok(results) if !results.is_empty() => {
                let failed = results
                    .iter()
                    .filter(|r| matches!(r.outcome, SweepOutcome::Error { .. }))
                    .count();
                tracing::info!(
                    swept = results.len(),
                    failed,
                    "Finished sweeping scheduled campaigns"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "Failed to look up due campaigns"
            ),
        }
        tokio::time::sleep(interval).await;
    }
}
