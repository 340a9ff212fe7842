use crate::domain::{
    Audience, Campaign, CampaignPatch, CampaignRepository, CampaignStats, CampaignStatus,
    NewCampaign, Recipient, SubscriberEmail, SubscriberFilter, SubscriberRepository,
};
use crate::email_client::EmailTransport;
use crate::utils::error_chain_fmt;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

#[derive(thiserror::Error)]
pub enum CampaignError {
    #[error("Campaign {0} was not found")]
    NotFound(Uuid),
    #[error("{0}")]
    InvalidState(String),
    #[error("Sending failed, campaign reverted to draft: {0}")]
    DeliveryFailed(#[source] anyhow::Error),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl std::fmt::Debug for CampaignError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Campaign lifecycle: draft -> scheduled -> sending -> sent.
///
/// The only way back is sending -> draft when the email transport fails.
pub struct CampaignService {
    campaigns: Arc<dyn CampaignRepository>,
    subscribers: Arc<dyn SubscriberRepository>,
    email_client: Arc<dyn EmailTransport>,
    interest_groups: Vec<String>,
}

impl CampaignService {
    pub fn new(
        campaigns: Arc<dyn CampaignRepository>,
        subscribers: Arc<dyn SubscriberRepository>,
        email_client: Arc<dyn EmailTransport>,
        interest_groups: Vec<String>,
    ) -> Self {
        Self {
            campaigns,
            subscribers,
            email_client,
            interest_groups,
        }
    }

    pub fn interest_groups(&self) -> &[String] {
        &self.interest_groups
    }

    #[tracing::instrument(
        name = "Create a draft campaign",
        skip(self, new_campaign),
        fields(campaign_name = %new_campaign.name)
    )]
    pub async fn create(
        &self,
        new_campaign: NewCampaign,
        created_by: Uuid,
    ) -> Result<Campaign, CampaignError> {
        let campaign = Campaign::draft(new_campaign, created_by);
        self.campaigns.insert(&campaign).await?;
        Ok(campaign)
    }

    #[tracing::instrument(name = "Get a campaign", skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<Campaign, CampaignError> {
        self.campaigns
            .get(id)
            .await?
            .ok_or(CampaignError::NotFound(id))
    }

    #[tracing::instrument(name = "Update a campaign", skip(self, patch))]
    pub async fn update(&self, id: Uuid, patch: CampaignPatch) -> Result<Campaign, CampaignError> {
        let campaign = self.get(id).await?;
        ensure_not_sent(&campaign, "edited")?;
        match self.campaigns.update(id, &patch).await? {
            Some(campaign) => Ok(campaign),
            // Lost a race with a send or a delete
            None => Err(self.rejection(id, "edited").await),
        }
    }

    #[tracing::instrument(name = "Delete a campaign", skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), CampaignError> {
        let campaign = self.get(id).await?;
        ensure_not_sent(&campaign, "deleted")?;
        if !self.campaigns.delete(id).await? {
            return Err(self.rejection(id, "deleted").await);
        }
        Ok(())
    }

    #[tracing::instrument(name = "Schedule a campaign", skip(self))]
    pub async fn schedule(
        &self,
        id: Uuid,
        scheduled_for: DateTime<Utc>,
    ) -> Result<Campaign, CampaignError> {
        let campaign = self.get(id).await?;
        if campaign.status != CampaignStatus::Draft {
            return Err(CampaignError::InvalidState(format!(
                "Only draft campaigns can be scheduled, this campaign is {}",
                campaign.status.as_ref()
            )));
        }
        if scheduled_for <= Utc::now() {
            return Err(CampaignError::InvalidState(
                "Scheduled time must be in the future".into(),
            ));
        }
        if !self.campaigns.schedule(id, scheduled_for).await? {
            return Err(self.rejection(id, "scheduled").await);
        }
        self.get(id).await
    }

    /// Deliver `id` to every deliverable subscriber in its target groups.
    ///
    /// The campaign is claimed (`sending`) before the transport is called and
    /// only marked `sent` once the transport succeeded. On transport failure
    /// it goes back to `draft` and no subscriber is credited.
    #[tracing::instrument(
        name = "Send a campaign",
        skip(self),
        fields(recipients = tracing::field::Empty)
    )]
    pub async fn send(&self, id: Uuid) -> Result<Campaign, CampaignError> {
        let campaign = self.get(id).await?;
        ensure_sendable(&campaign)?;
        if self.recipients(&campaign).await?.is_empty() {
            return Err(no_recipients());
        }

        let claimed = self
            .campaigns
            .transition_status(id, &CampaignStatus::SENDABLE, CampaignStatus::Sending)
            .await?;
        if !claimed {
            return Err(self.rejection(id, "sent").await);
        }

        // Deliver what is stored now: an edit may have landed before the claim
        let (campaign, recipients) = match self.load_claimed(id).await {
            Ok(loaded) => loaded,
            Err(e) => {
                self.revert_to_draft(id).await;
                return Err(e);
            }
        };
        tracing::Span::current().record("recipients", &recipients.len());

        if let Err(e) = self
            .email_client
            .send_bulk(&recipients, &campaign.subject, &campaign.content)
            .await
        {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "Failed to deliver campaign, reverting it to draft"
            );
            self.revert_to_draft(id).await;
            return Err(CampaignError::DeliveryFailed(e));
        }

        let sent_at = Utc::now();
        let total_sent = recipients.len() as i64;
        if !self
            .campaigns
            .complete_delivery(id, sent_at, total_sent)
            .await?
        {
            return Err(CampaignError::Unexpected(anyhow::anyhow!(
                "Campaign {} left the sending state while it was being delivered",
                id
            )));
        }

        // The campaign is already sent at this point: a failure here must not
        // be reported as a failed send
        let emails: Vec<SubscriberEmail> = recipients.into_iter().map(|r| r.email).collect();
        if let Err(e) = self
            .subscribers
            .record_delivery(&emails, id, sent_at)
            .await
        {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "Failed to record campaign delivery on subscribers"
            );
        }

        self.get(id).await
    }

    #[tracing::instrument(name = "Get campaign stats", skip(self))]
    pub async fn get_stats(&self, id: Uuid) -> Result<CampaignStats, CampaignError> {
        Ok(self.get(id).await?.stats)
    }

    #[tracing::instrument(name = "Get due campaigns", skip(self))]
    pub async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>, CampaignError> {
        Ok(self.campaigns.find_due(now).await?)
    }

    async fn recipients(&self, campaign: &Campaign) -> Result<Vec<Recipient>, CampaignError> {
        let audience = Audience::from_target_groups(&campaign.target_groups, &self.interest_groups);
        let filter = SubscriberFilter::deliverable(audience);
        Ok(self.subscribers.find_recipients(&filter).await?)
    }

    async fn load_claimed(&self, id: Uuid) -> Result<(Campaign, Vec<Recipient>), CampaignError> {
        let campaign = self.get(id).await?;
        let recipients = self.recipients(&campaign).await?;
        if recipients.is_empty() {
            return Err(no_recipients());
        }
        Ok((campaign, recipients))
    }

    async fn revert_to_draft(&self, id: Uuid) {
        match self
            .campaigns
            .transition_status(id, &[CampaignStatus::Sending], CampaignStatus::Draft)
            .await
        {
            Ok(true) => {}
            Ok(false) => tracing::warn!("Campaign was no longer sending when reverting to draft"),
            Err(e) => tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "Failed to revert campaign to draft"
            ),
        }
    }

    /// Explain why a conditional write on `id` did not apply.
    async fn rejection(&self, id: Uuid, action: &str) -> CampaignError {
        match self.campaigns.get(id).await {
            Ok(Some(campaign)) => match campaign.status {
                CampaignStatus::Sent => {
                    CampaignError::InvalidState("Campaign has already been sent".into())
                }
                CampaignStatus::Sending => {
                    CampaignError::InvalidState("Campaign is already being sent".into())
                }
                status => CampaignError::InvalidState(format!(
                    "Campaign cannot be {} while it is {}",
                    action,
                    status.as_ref()
                )),
            },
            Ok(None) => CampaignError::NotFound(id),
            Err(e) => CampaignError::Unexpected(e),
        }
    }
}

fn no_recipients() -> CampaignError {
    CampaignError::InvalidState("No subscribers match the target criteria".into())
}

fn ensure_not_sent(campaign: &Campaign, action: &str) -> Result<(), CampaignError> {
    if campaign.status == CampaignStatus::Sent {
        return Err(CampaignError::InvalidState(format!(
            "Sent campaigns cannot be {}",
            action
        )));
    }
    Ok(())
}

fn ensure_sendable(campaign: &Campaign) -> Result<(), CampaignError> {
    match campaign.status {
        CampaignStatus::Sent => Err(CampaignError::InvalidState(
            "Campaign has already been sent".into(),
        )),
        CampaignStatus::Sending => Err(CampaignError::InvalidState(
            "Campaign is already being sent".into(),
        )),
        CampaignStatus::Draft | CampaignStatus::Scheduled => Ok(()),
    }
}
