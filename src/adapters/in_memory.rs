//! Process-local stores with the same conditional semantics as the Postgres
//! adapters. Every conditional write happens under a single write lock.

use crate::domain::{
    Campaign, CampaignPatch, CampaignRepository, CampaignStatus, DeliveryRecord, Recipient,
    Subscriber, SubscriberEmail, SubscriberFilter, SubscriberRepository, UserRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::Secret;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct InMemoryCampaignRepository {
    campaigns: Arc<RwLock<HashMap<Uuid, Campaign>>>,
}

impl InMemoryCampaignRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CampaignRepository for InMemoryCampaignRepository {
    async fn insert(&self, campaign: &Campaign) -> Result<(), anyhow::Error> {
        let mut campaigns = self.campaigns.write().await;
        if campaigns.contains_key(&campaign.id) {
            anyhow::bail!("Campaign {} already exists", campaign.id);
        }
        campaigns.insert(campaign.id, campaign.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Campaign>, anyhow::Error> {
        Ok(self.campaigns.read().await.get(&id).cloned())
    }

    async fn update(
        &self,
        id: Uuid,
        patch: &CampaignPatch,
    ) -> Result<Option<Campaign>, anyhow::Error> {
        let mut campaigns = self.campaigns.write().await;
        match campaigns.get_mut(&id) {
            Some(campaign) if campaign.status != CampaignStatus::Sent => {
                campaign.apply(patch.clone());
                Ok(Some(campaign.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, anyhow::Error> {
        let mut campaigns = self.campaigns.write().await;
        match campaigns.get(&id) {
            Some(campaign) if campaign.status != CampaignStatus::Sent => {
                campaigns.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn schedule(
        &self,
        id: Uuid,
        scheduled_for: DateTime<Utc>,
    ) -> Result<bool, anyhow::Error> {
        let mut campaigns = self.campaigns.write().await;
        match campaigns.get_mut(&id) {
            Some(campaign) if campaign.status == CampaignStatus::Draft => {
                campaign.status = CampaignStatus::Scheduled;
                campaign.scheduled_for = Some(scheduled_for);
                campaign.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn transition_status(
        &self,
        id: Uuid,
        expected: &[CampaignStatus],
        new_status: CampaignStatus,
    ) -> Result<bool, anyhow::Error> {
        let mut campaigns = self.campaigns.write().await;
        match campaigns.get_mut(&id) {
            Some(campaign) if expected.contains(&campaign.status) => {
                if !campaign.status.can_transition_to(new_status) {
                    anyhow::bail!(
                        "Illegal campaign transition {} -> {}",
                        campaign.status.as_ref(),
                        new_status.as_ref()
                    );
                }
                campaign.status = new_status;
                campaign.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_delivery(
        &self,
        id: Uuid,
        sent_at: DateTime<Utc>,
        total_sent: i64,
    ) -> Result<bool, anyhow::Error> {
        let mut campaigns = self.campaigns.write().await;
        match campaigns.get_mut(&id) {
            Some(campaign) if campaign.status == CampaignStatus::Sending => {
                campaign.status = CampaignStatus::Sent;
                campaign.sent_at = Some(sent_at);
                campaign.stats.total_sent = total_sent;
                campaign.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>, anyhow::Error> {
        let mut due: Vec<Campaign> = self
            .campaigns
            .read()
            .await
            .values()
            .filter(|campaign| {
                campaign.status == CampaignStatus::Scheduled
                    && campaign
                        .scheduled_for
                        .map(|scheduled_for| scheduled_for <= now)
                        .unwrap_or(false)
            })
            .cloned()
            .collect();
        due.sort_by_key(|campaign| campaign.scheduled_for);
        Ok(due)
    }
}

#[derive(Clone, Default)]
pub struct InMemorySubscriberRepository {
    subscribers: Arc<RwLock<HashMap<Uuid, Subscriber>>>,
}

impl InMemorySubscriberRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn find_first(
        &self,
        predicate: impl Fn(&Subscriber) -> bool,
    ) -> Option<Subscriber> {
        self.subscribers
            .read()
            .await
            .values()
            .find(|subscriber| predicate(*subscriber))
            .cloned()
    }
}

#[async_trait]
impl SubscriberRepository for InMemorySubscriberRepository {
    async fn insert(&self, subscriber: &Subscriber) -> Result<bool, anyhow::Error> {
        let mut subscribers = self.subscribers.write().await;
        if subscribers.values().any(|s| s.email == subscriber.email) {
            return Ok(false);
        }
        subscribers.insert(subscriber.id, subscriber.clone());
        Ok(true)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Subscriber>, anyhow::Error> {
        Ok(self.subscribers.read().await.get(&id).cloned())
    }

    async fn find_by_email(
        &self,
        email: &SubscriberEmail,
    ) -> Result<Option<Subscriber>, anyhow::Error> {
        Ok(self.find_first(|s| &s.email == email).await)
    }

    async fn find_by_verification_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<Subscriber>, anyhow::Error> {
        Ok(self
            .find_first(|s| s.verification_token_hash.as_deref() == Some(token_hash))
            .await)
    }

    async fn find_by_unsubscribe_token(
        &self,
        token: &str,
    ) -> Result<Option<Subscriber>, anyhow::Error> {
        Ok(self.find_first(|s| s.unsubscribe_token == token).await)
    }

    async fn update(&self, subscriber: &Subscriber) -> Result<(), anyhow::Error> {
        let mut subscribers = self.subscribers.write().await;
        if let Some(stored) = subscribers.get_mut(&subscriber.id) {
            stored.first_name = subscriber.first_name.clone();
            stored.last_name = subscriber.last_name.clone();
            stored.status = subscriber.status;
            stored.is_verified = subscriber.is_verified;
            stored.preferences = subscriber.preferences.clone();
            stored.verification_token_hash = subscriber.verification_token_hash.clone();
            stored.verification_token_expiry = subscriber.verification_token_expiry;
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, anyhow::Error> {
        Ok(self.subscribers.write().await.remove(&id).is_some())
    }

    async fn find_recipients(
        &self,
        filter: &SubscriberFilter,
    ) -> Result<Vec<Recipient>, anyhow::Error> {
        let mut recipients: Vec<Recipient> = self
            .subscribers
            .read()
            .await
            .values()
            .filter(|subscriber| filter.matches(subscriber))
            .map(Recipient::from)
            .collect();
        recipients.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(recipients)
    }

    async fn record_delivery(
        &self,
        emails: &[SubscriberEmail],
        campaign_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<u64, anyhow::Error> {
        let mut subscribers = self.subscribers.write().await;
        let mut credited = 0;
        for subscriber in subscribers
            .values_mut()
            .filter(|subscriber| emails.contains(&subscriber.email))
        {
            subscriber.last_email_sent = Some(sent_at);
            subscriber.campaigns.push(DeliveryRecord {
                campaign_id,
                sent_at,
            });
            credited += 1;
        }
        Ok(credited)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryUserRepository {
    users: Arc<RwLock<HashMap<String, (Uuid, Secret<String>)>>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, username: &str, user_id: Uuid, password_hash: String) {
        self.users
            .write()
            .await
            .insert(username.to_string(), (user_id, Secret::new(password_hash)));
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn get_stored_credentials(
        &self,
        username: &str,
    ) -> Result<Option<(Uuid, Secret<String>)>, anyhow::Error> {
        Ok(self
            .users
            .read()
            .await
            .get(username)
            .map(|(user_id, hash)| (*user_id, hash.clone())))
    }
}
