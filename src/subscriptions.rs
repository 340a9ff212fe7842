use crate::domain::{
    unknown_groups, GroupFlags, NewSubscriber, Subscriber, SubscriberEmail, SubscriberRepository,
    SubscriberStatus,
};
use crate::email_client::EmailTransport;
use crate::utils::error_chain_fmt;
use anyhow::Context;
use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

#[derive(thiserror::Error)]
pub enum SubscriptionError {
    #[error("{0}")]
    Validation(String),
    #[error("Subscriber {0} was not found")]
    NotFound(Uuid),
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl std::fmt::Debug for SubscriptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Subscriber directory: double opt-in, preferences and unsubscription.
pub struct SubscriptionService {
    subscribers: Arc<dyn SubscriberRepository>,
    email_client: Arc<dyn EmailTransport>,
    base_url: String,
    interest_groups: Vec<String>,
    token_ttl: Duration,
}

impl SubscriptionService {
    pub fn new(
        subscribers: Arc<dyn SubscriberRepository>,
        email_client: Arc<dyn EmailTransport>,
        base_url: String,
        interest_groups: Vec<String>,
        token_ttl: Duration,
    ) -> Self {
        Self {
            subscribers,
            email_client,
            base_url,
            interest_groups,
            token_ttl,
        }
    }

    #[tracing::instrument(
        name = "Subscribe a reader",
        skip(self, new_subscriber),
        fields(subscriber_email = %new_subscriber.email)
    )]
    pub async fn subscribe(
        &self,
        new_subscriber: NewSubscriber,
    ) -> Result<Subscriber, SubscriptionError> {
        self.validate_preferences(&new_subscriber.preferences)?;

        if let Some(existing) = self
            .subscribers
            .find_by_email(&new_subscriber.email)
            .await?
        {
            return self.resubscribe(existing, new_subscriber).await;
        }

        let token = generate_token();
        let subscriber = Subscriber {
            id: Uuid::new_v4(),
            email: new_subscriber.email,
            first_name: new_subscriber.first_name.map(String::from),
            last_name: new_subscriber.last_name.map(String::from),
            status: SubscriberStatus::Active,
            is_verified: false,
            preferences: new_subscriber.preferences,
            verification_token_hash: Some(hash_token(&token)),
            verification_token_expiry: Some(Utc::now() + self.token_ttl),
            unsubscribe_token: generate_token(),
            last_email_sent: None,
            campaigns: vec![],
            subscribed_at: Utc::now(),
        };

        if !self
            .subscribers
            .insert(&subscriber)
            .await
            .context("Failed to store a new subscriber")?
        {
            // Somebody registered the same address in the meantime
            return self
                .subscribers
                .find_by_email(&subscriber.email)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Subscriber vanished after a duplicate insert"))
                .map_err(SubscriptionError::Unexpected);
        }

        self.send_verification_email(&subscriber.email, &token)
            .await
            .context("Failed to send a verification email")?;
        Ok(subscriber)
    }

    async fn resubscribe(
        &self,
        mut subscriber: Subscriber,
        new_subscriber: NewSubscriber,
    ) -> Result<Subscriber, SubscriptionError> {
        if subscriber.status == SubscriberStatus::Active {
            if subscriber.is_verified {
                return Ok(subscriber);
            }
            // The first link may have expired or never arrived
            tracing::info!("Reissuing a verification token to an unverified reader");
            let token = self.reissue_verification_token(&mut subscriber);
            self.subscribers
                .update(&subscriber)
                .await
                .context("Failed to store a new verification token")?;
            self.send_verification_email(&subscriber.email, &token)
                .await
                .context("Failed to send a verification email")?;
            return Ok(subscriber);
        }

        tracing::info!("Reactivating an unsubscribed reader");
        subscriber.status = SubscriberStatus::Active;
        subscriber.preferences = new_subscriber.preferences;
        if let Some(first_name) = new_subscriber.first_name {
            subscriber.first_name = Some(first_name.into());
        }
        if let Some(last_name) = new_subscriber.last_name {
            subscriber.last_name = Some(last_name.into());
        }

        let token = if subscriber.is_verified {
            None
        } else {
            Some(self.reissue_verification_token(&mut subscriber))
        };

        self.subscribers
            .update(&subscriber)
            .await
            .context("Failed to reactivate a subscriber")?;

        if let Some(token) = token {
            self.send_verification_email(&subscriber.email, &token)
                .await
                .context("Failed to send a verification email")?;
        }
        Ok(subscriber)
    }

    #[tracing::instrument(name = "Verify a subscriber", skip_all)]
    pub async fn verify(&self, token: &str) -> Result<Subscriber, SubscriptionError> {
        let mut subscriber = self
            .subscribers
            .find_by_verification_token(&hash_token(token))
            .await?
            .ok_or(SubscriptionError::InvalidToken)?;

        let expired = subscriber
            .verification_token_expiry
            .map(|expiry| expiry < Utc::now())
            .unwrap_or(true);
        if expired {
            return Err(SubscriptionError::InvalidToken);
        }

        subscriber.is_verified = true;
        subscriber.verification_token_hash = None;
        subscriber.verification_token_expiry = None;
        self.subscribers
            .update(&subscriber)
            .await
            .context("Failed to mark a subscriber as verified")?;
        Ok(subscriber)
    }

    #[tracing::instrument(name = "Update subscriber preferences", skip_all)]
    pub async fn update_preferences(
        &self,
        unsubscribe_token: &str,
        preferences: GroupFlags,
    ) -> Result<Subscriber, SubscriptionError> {
        self.validate_preferences(&preferences)?;
        let mut subscriber = self.find_by_unsubscribe_token(unsubscribe_token).await?;
        subscriber.preferences = preferences;
        self.subscribers
            .update(&subscriber)
            .await
            .context("Failed to update subscriber preferences")?;
        Ok(subscriber)
    }

    /// Soft delete: the subscriber is kept, with its delivery history,
    /// but no longer receives campaigns.
    #[tracing::instrument(name = "Unsubscribe a reader", skip_all)]
    pub async fn unsubscribe(
        &self,
        unsubscribe_token: &str,
    ) -> Result<Subscriber, SubscriptionError> {
        let mut subscriber = self.find_by_unsubscribe_token(unsubscribe_token).await?;
        if subscriber.status == SubscriberStatus::Unsubscribed {
            return Ok(subscriber);
        }
        subscriber.status = SubscriberStatus::Unsubscribed;
        self.subscribers
            .update(&subscriber)
            .await
            .context("Failed to unsubscribe a reader")?;
        Ok(subscriber)
    }

    #[tracing::instrument(name = "Get a subscriber", skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<Subscriber, SubscriptionError> {
        self.subscribers
            .get(id)
            .await?
            .ok_or(SubscriptionError::NotFound(id))
    }

    #[tracing::instrument(name = "Delete a subscriber", skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), SubscriptionError> {
        if !self.subscribers.delete(id).await? {
            return Err(SubscriptionError::NotFound(id));
        }
        Ok(())
    }

    /// Replace any pending verification token and return the new plain one.
    fn reissue_verification_token(&self, subscriber: &mut Subscriber) -> String {
        let token = generate_token();
        subscriber.verification_token_hash = Some(hash_token(&token));
        subscriber.verification_token_expiry = Some(Utc::now() + self.token_ttl);
        token
    }

    async fn find_by_unsubscribe_token(
        &self,
        token: &str,
    ) -> Result<Subscriber, SubscriptionError> {
        self.subscribers
            .find_by_unsubscribe_token(token)
            .await?
            .ok_or(SubscriptionError::InvalidToken)
    }

    fn validate_preferences(&self, preferences: &GroupFlags) -> Result<(), SubscriptionError> {
        let unknown = unknown_groups(preferences, &self.interest_groups);
        if !unknown.is_empty() {
            return Err(SubscriptionError::Validation(format!(
                "Unknown interest groups: {}",
                unknown.join(", ")
            )));
        }
        Ok(())
    }

    #[tracing::instrument(name = "Send a verification email", skip_all)]
    async fn send_verification_email(
        &self,
        recipient: &SubscriberEmail,
        token: &str,
    ) -> Result<(), anyhow::Error> {
        let verification_link = format!("{}/subscriptions/verify?token={}", self.base_url, token);
        let html_body = format!(
            "<p>\
            Welcome to our newsletter!<br />\
            Click <a href=\"{}\">here</a> to confirm your email address.\
            </p>",
            verification_link
        );
        let text_body = format!(
            "Welcome to our newsletter!\nVisit {} to confirm your email address.",
            verification_link
        );
        self.email_client
            .send_email(recipient, "Confirm your subscription", &html_body, &text_body)
            .await
    }
}

/// Alphanumeric (A-Z, a-z, 0-9), 25 characters, case-sensitive.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(25)
        .collect()
}

fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}
