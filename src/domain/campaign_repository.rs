use crate::domain::{Campaign, CampaignPatch, CampaignStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Campaign persistence.
///
/// Every status change is conditional on the status currently stored, so two
/// callers racing on the same campaign cannot both win. Methods returning
/// `bool` report whether the condition held and the write happened.
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn insert(&self, campaign: &Campaign) -> Result<(), anyhow::Error>;

    async fn get(&self, id: Uuid) -> Result<Option<Campaign>, anyhow::Error>;

    /// Apply `patch` unless the campaign is `sent`.
    /// `None` when no editable campaign has this id.
    async fn update(
        &self,
        id: Uuid,
        patch: &CampaignPatch,
    ) -> Result<Option<Campaign>, anyhow::Error>;

    /// Delete unless the campaign is `sent`.
    async fn delete(&self, id: Uuid) -> Result<bool, anyhow::Error>;

    /// draft -> scheduled, storing `scheduled_for`.
    async fn schedule(&self, id: Uuid, scheduled_for: DateTime<Utc>)
        -> Result<bool, anyhow::Error>;

    /// Move to `new_status` only if the stored status is one of `expected`.
    async fn transition_status(
        &self,
        id: Uuid,
        expected: &[CampaignStatus],
        new_status: CampaignStatus,
    ) -> Result<bool, anyhow::Error>;

    /// sending -> sent, recording when and to how many recipients.
    async fn complete_delivery(
        &self,
        id: Uuid,
        sent_at: DateTime<Utc>,
        total_sent: i64,
    ) -> Result<bool, anyhow::Error>;

    /// Scheduled campaigns whose `scheduled_for` is at or before `now`,
    /// oldest schedule first.
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>, anyhow::Error>;
}
