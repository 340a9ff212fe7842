use crate::domain::{
    DeliveryRecord, GroupFlags, Recipient, Subscriber, SubscriberEmail, SubscriberFilter,
    SubscriberRepository, SubscriberStatus,
};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

const SUBSCRIBER_COLUMNS: &str = "id, email, first_name, last_name, status, is_verified, \
    preferences, verification_token_hash, verification_token_expiry, unsubscribe_token, \
    last_email_sent, subscribed_at";

#[derive(Clone)]
pub struct PostgresSubscriberRepository {
    pg_pool: PgPool,
}

impl PostgresSubscriberRepository {
    pub fn new(pg_pool: PgPool) -> Self {
        Self { pg_pool }
    }

    async fn find_one_by(
        &self,
        column: &str,
        value: &str,
    ) -> Result<Option<Subscriber>, anyhow::Error> {
        let query = format!(
            "SELECT {} FROM subscribers WHERE {} = $1",
            SUBSCRIBER_COLUMNS, column
        );
        let row = sqlx::query_as::<_, SubscriberRow>(&query)
            .bind(value)
            .fetch_optional(&self.pg_pool)
            .await
            .with_context(|| format!("Failed to fetch subscriber by {}", column))?;
        match row {
            Some(row) => self.hydrate(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn hydrate(&self, row: SubscriberRow) -> Result<Subscriber, anyhow::Error> {
        let campaigns = sqlx::query_as::<_, (Uuid, DateTime<Utc>)>(
            r#"
            SELECT campaign_id, sent_at
            FROM subscriber_campaigns
            WHERE subscriber_id = $1
            ORDER BY sent_at ASC
            "#,
        )
        .bind(row.id)
        .fetch_all(&self.pg_pool)
        .await
        .context("Failed to fetch subscriber campaign history")?
        .into_iter()
        .map(|(campaign_id, sent_at)| DeliveryRecord {
            campaign_id,
            sent_at,
        })
        .collect();
        row.into_subscriber(campaigns)
    }
}

#[derive(sqlx::FromRow)]
struct SubscriberRow {
    id: Uuid,
    email: String,
    first_name: Option<String>,
    last_name: Option<String>,
    status: String,
    is_verified: bool,
    preferences: Json<GroupFlags>,
    verification_token_hash: Option<String>,
    verification_token_expiry: Option<DateTime<Utc>>,
    unsubscribe_token: String,
    last_email_sent: Option<DateTime<Utc>>,
    subscribed_at: DateTime<Utc>,
}

impl SubscriberRow {
    fn into_subscriber(self, campaigns: Vec<DeliveryRecord>) -> Result<Subscriber, anyhow::Error> {
        let email = SubscriberEmail::parse(self.email).map_err(|e| anyhow::anyhow!(e))?;
        let status = SubscriberStatus::from_str(&self.status)
            .with_context(|| format!("Unknown subscriber status `{}`", self.status))?;
        Ok(Subscriber {
            id: self.id,
            email,
            first_name: self.first_name,
            last_name: self.last_name,
            status,
            is_verified: self.is_verified,
            preferences: self.preferences.0,
            verification_token_hash: self.verification_token_hash,
            verification_token_expiry: self.verification_token_expiry,
            unsubscribe_token: self.unsubscribe_token,
            last_email_sent: self.last_email_sent,
            campaigns,
            subscribed_at: self.subscribed_at,
        })
    }
}

#[async_trait]
impl SubscriberRepository for PostgresSubscriberRepository {
    #[tracing::instrument(
        name = "Insert a new subscriber into database",
        skip(self, subscriber),
        fields(subscriber_email = %subscriber.email)
    )]
    async fn insert(&self, subscriber: &Subscriber) -> Result<bool, anyhow::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO subscribers (
                id, email, first_name, last_name, status, is_verified, preferences,
                verification_token_hash, verification_token_expiry, unsubscribe_token,
                last_email_sent, subscribed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(subscriber.id)
        .bind(subscriber.email.as_ref())
        .bind(subscriber.first_name.as_deref())
        .bind(subscriber.last_name.as_deref())
        .bind(subscriber.status.as_ref())
        .bind(subscriber.is_verified)
        .bind(Json(&subscriber.preferences))
        .bind(subscriber.verification_token_hash.as_deref())
        .bind(subscriber.verification_token_expiry)
        .bind(&subscriber.unsubscribe_token)
        .bind(subscriber.last_email_sent)
        .bind(subscriber.subscribed_at)
        .execute(&self.pg_pool)
        .await
        .context("Failed to insert subscriber")?;
        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(name = "Get subscriber from database", skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<Subscriber>, anyhow::Error> {
        let query = format!("SELECT {} FROM subscribers WHERE id = $1", SUBSCRIBER_COLUMNS);
        let row = sqlx::query_as::<_, SubscriberRow>(&query)
            .bind(id)
            .fetch_optional(&self.pg_pool)
            .await
            .context("Failed to fetch subscriber")?;
        match row {
            Some(row) => self.hydrate(row).await.map(Some),
            None => Ok(None),
        }
    }

    #[tracing::instrument(name = "Get subscriber by email from database", skip(self))]
    async fn find_by_email(
        &self,
        email: &SubscriberEmail,
    ) -> Result<Option<Subscriber>, anyhow::Error> {
        self.find_one_by("email", email.as_ref()).await
    }

    #[tracing::instrument(
        name = "Get subscriber by verification token from database",
        skip_all
    )]
    async fn find_by_verification_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<Subscriber>, anyhow::Error> {
        self.find_one_by("verification_token_hash", token_hash).await
    }

    #[tracing::instrument(name = "Get subscriber by unsubscribe token from database", skip_all)]
    async fn find_by_unsubscribe_token(
        &self,
        token: &str,
    ) -> Result<Option<Subscriber>, anyhow::Error> {
        self.find_one_by("unsubscribe_token", token).await
    }

    #[tracing::instrument(
        name = "Update subscriber profile in database",
        skip(self, subscriber),
        fields(subscriber_id = %subscriber.id)
    )]
    async fn update(&self, subscriber: &Subscriber) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            UPDATE subscribers
            SET first_name = $2,
                last_name = $3,
                status = $4,
                is_verified = $5,
                preferences = $6,
                verification_token_hash = $7,
                verification_token_expiry = $8
            WHERE id = $1
            "#,
        )
        .bind(subscriber.id)
        .bind(subscriber.first_name.as_deref())
        .bind(subscriber.last_name.as_deref())
        .bind(subscriber.status.as_ref())
        .bind(subscriber.is_verified)
        .bind(Json(&subscriber.preferences))
        .bind(subscriber.verification_token_hash.as_deref())
        .bind(subscriber.verification_token_expiry)
        .execute(&self.pg_pool)
        .await
        .context("Failed to update subscriber")?;
        Ok(())
    }

    #[tracing::instrument(name = "Delete subscriber from database", skip(self))]
    async fn delete(&self, id: Uuid) -> Result<bool, anyhow::Error> {
        let result = sqlx::query("DELETE FROM subscribers WHERE id = $1")
            .bind(id)
            .execute(&self.pg_pool)
            .await
            .context("Failed to delete subscriber")?;
        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(name = "Get matching recipients from database", skip(self))]
    async fn find_recipients(
        &self,
        filter: &SubscriberFilter,
    ) -> Result<Vec<Recipient>, anyhow::Error> {
        // A NULL parameter disables its predicate.
        // Preference groups are OR-combined through EXISTS over the JSONB object.
        let rows = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT email, unsubscribe_token
            FROM subscribers
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::boolean IS NULL OR is_verified = $2)
              AND ($3::text[] IS NULL OR EXISTS (
                    SELECT 1
                    FROM jsonb_each(preferences) AS preference(key, value)
                    WHERE preference.key = ANY($3)
                      AND preference.value = 'true'::jsonb
              ))
            ORDER BY email
            "#,
        )
        .bind(filter.status.map(|status| status.as_ref().to_string()))
        .bind(filter.is_verified)
        .bind(filter.audience.groups())
        .fetch_all(&self.pg_pool)
        .await
        .context("Failed to fetch matching subscribers")?;

        let recipients = rows
            .into_iter()
            .filter_map(
                |(email, unsubscribe_token)| match SubscriberEmail::parse(email) {
                    Ok(email) => Some(Recipient {
                        email,
                        unsubscribe_token,
                    }),
                    Err(error) => {
                        // Validation rules may have tightened since the row was written
                        tracing::warn!(
                            error.message = %error,
                            "Skipping a subscriber with an invalid stored email address"
                        );
                        None
                    }
                },
            )
            .collect();
        Ok(recipients)
    }

    #[tracing::instrument(
        name = "Record campaign delivery for subscribers in database",
        skip(self, emails),
        fields(recipients = emails.len())
    )]
    async fn record_delivery(
        &self,
        emails: &[SubscriberEmail],
        campaign_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<u64, anyhow::Error> {
        let emails: Vec<String> = emails.iter().map(|e| e.as_ref().to_string()).collect();
        let result = sqlx::query(
            r#"
            WITH credited AS (
                UPDATE subscribers
                SET last_email_sent = $2
                WHERE email = ANY($1)
                RETURNING id
            )
            INSERT INTO subscriber_campaigns (subscriber_id, campaign_id, sent_at)
            SELECT id, $3, $2 FROM credited
            "#,
        )
        .bind(emails)
        .bind(sent_at)
        .bind(campaign_id)
        .execute(&self.pg_pool)
        .await
        .context("Failed to record campaign delivery")?;
        Ok(result.rows_affected())
    }
}
