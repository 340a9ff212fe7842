use crate::domain::{Recipient, Subscriber, SubscriberEmail, SubscriberFilter};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait SubscriberRepository: Send + Sync {
    /// `false` when a subscriber with the same email already exists.
    async fn insert(&self, subscriber: &Subscriber) -> Result<bool, anyhow::Error>;

    async fn get(&self, id: Uuid) -> Result<Option<Subscriber>, anyhow::Error>;

    async fn find_by_email(
        &self,
        email: &SubscriberEmail,
    ) -> Result<Option<Subscriber>, anyhow::Error>;

    async fn find_by_verification_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<Subscriber>, anyhow::Error>;

    async fn find_by_unsubscribe_token(
        &self,
        token: &str,
    ) -> Result<Option<Subscriber>, anyhow::Error>;

    /// Persist the profile fields: names, status, verification and preferences.
    /// Delivery history is only ever written by `record_delivery`.
    async fn update(&self, subscriber: &Subscriber) -> Result<(), anyhow::Error>;

    async fn delete(&self, id: Uuid) -> Result<bool, anyhow::Error>;

    /// Every subscriber matching `filter`, ordered by email address.
    async fn find_recipients(
        &self,
        filter: &SubscriberFilter,
    ) -> Result<Vec<Recipient>, anyhow::Error>;

    /// Stamp `last_email_sent` and append `campaign_id` to the history of
    /// every subscriber in `emails`, as one bulk write.
    /// Returns how many subscribers were credited.
    async fn record_delivery(
        &self,
        emails: &[SubscriberEmail],
        campaign_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<u64, anyhow::Error>;
}
