use crate::domain::{
    Campaign, CampaignPatch, CampaignRepository, CampaignStats, CampaignStatus, GroupFlags,
};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

const CAMPAIGN_COLUMNS: &str = "id, name, subject, content, target_groups, status, \
    scheduled_for, sent_at, total_sent, created_by, created_at, updated_at";

#[derive(Clone)]
pub struct PostgresCampaignRepository {
    pg_pool: PgPool,
}

impl PostgresCampaignRepository {
    pub fn new(pg_pool: PgPool) -> Self {
        Self { pg_pool }
    }
}

#[derive(sqlx::FromRow)]
struct CampaignRow {
    id: Uuid,
    name: String,
    subject: String,
    content: String,
    target_groups: Json<GroupFlags>,
    status: String,
    scheduled_for: Option<DateTime<Utc>>,
    sent_at: Option<DateTime<Utc>>,
    total_sent: i64,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = anyhow::Error;

    fn try_from(row: CampaignRow) -> Result<Self, Self::Error> {
        let status = CampaignStatus::from_str(&row.status)
            .with_context(|| format!("Unknown campaign status `{}`", row.status))?;
        Ok(Campaign {
            id: row.id,
            name: row.name,
            subject: row.subject,
            content: row.content,
            target_groups: row.target_groups.0,
            status,
            scheduled_for: row.scheduled_for,
            sent_at: row.sent_at,
            stats: CampaignStats {
                total_sent: row.total_sent,
            },
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn status_names(statuses: &[CampaignStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_ref().to_string()).collect()
}

#[async_trait]
impl CampaignRepository for PostgresCampaignRepository {
    #[tracing::instrument(
        name = "Insert a new campaign into database",
        skip(self, campaign),
        fields(campaign_id = %campaign.id)
    )]
    async fn insert(&self, campaign: &Campaign) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            INSERT INTO campaigns (
                id, name, subject, content, target_groups, status,
                scheduled_for, sent_at, total_sent, created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(campaign.id)
        .bind(&campaign.name)
        .bind(&campaign.subject)
        .bind(&campaign.content)
        .bind(Json(&campaign.target_groups))
        .bind(campaign.status.as_ref())
        .bind(campaign.scheduled_for)
        .bind(campaign.sent_at)
        .bind(campaign.stats.total_sent)
        .bind(campaign.created_by)
        .bind(campaign.created_at)
        .bind(campaign.updated_at)
        .execute(&self.pg_pool)
        .await
        .context("Failed to insert campaign")?;
        Ok(())
    }

    #[tracing::instrument(name = "Get campaign from database", skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<Campaign>, anyhow::Error> {
        let query = format!("SELECT {} FROM campaigns WHERE id = $1", CAMPAIGN_COLUMNS);
        sqlx::query_as::<_, CampaignRow>(&query)
            .bind(id)
            .fetch_optional(&self.pg_pool)
            .await
            .context("Failed to fetch campaign")?
            .map(Campaign::try_from)
            .transpose()
    }

    #[tracing::instrument(name = "Update editable campaign in database", skip(self, patch))]
    async fn update(
        &self,
        id: Uuid,
        patch: &CampaignPatch,
    ) -> Result<Option<Campaign>, anyhow::Error> {
        let query = format!(
            r#"
            UPDATE campaigns
            SET name = COALESCE($2, name),
                subject = COALESCE($3, subject),
                content = COALESCE($4, content),
                target_groups = COALESCE($5, target_groups),
                updated_at = now()
            WHERE id = $1 AND status <> $6
            RETURNING {}
            "#,
            CAMPAIGN_COLUMNS
        );
        sqlx::query_as::<_, CampaignRow>(&query)
            .bind(id)
            .bind(patch.name.as_deref())
            .bind(patch.subject.as_deref())
            .bind(patch.content.as_deref())
            .bind(patch.target_groups.as_ref().map(Json))
            .bind(CampaignStatus::Sent.as_ref())
            .fetch_optional(&self.pg_pool)
            .await
            .context("Failed to update campaign")?
            .map(Campaign::try_from)
            .transpose()
    }

    #[tracing::instrument(name = "Delete unsent campaign from database", skip(self))]
    async fn delete(&self, id: Uuid) -> Result<bool, anyhow::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM campaigns
            WHERE id = $1 AND status <> $2
            "#,
        )
        .bind(id)
        .bind(CampaignStatus::Sent.as_ref())
        .execute(&self.pg_pool)
        .await
        .context("Failed to delete campaign")?;
        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(name = "Schedule draft campaign in database", skip(self))]
    async fn schedule(
        &self,
        id: Uuid,
        scheduled_for: DateTime<Utc>,
    ) -> Result<bool, anyhow::Error> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns
            SET status = $2, scheduled_for = $3, updated_at = now()
            WHERE id = $1 AND status = $4
            "#,
        )
        .bind(id)
        .bind(CampaignStatus::Scheduled.as_ref())
        .bind(scheduled_for)
        .bind(CampaignStatus::Draft.as_ref())
        .execute(&self.pg_pool)
        .await
        .context("Failed to schedule campaign")?;
        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(
        name = "Conditionally update campaign status in database",
        skip(self, expected),
        fields(new_status = %new_status.as_ref())
    )]
    async fn transition_status(
        &self,
        id: Uuid,
        expected: &[CampaignStatus],
        new_status: CampaignStatus,
    ) -> Result<bool, anyhow::Error> {
        // Single statement: the status check and the write cannot interleave
        // with another caller's
        let result = sqlx::query(
            r#"
            UPDATE campaigns
            SET status = $2, updated_at = now()
            WHERE id = $1 AND status = ANY($3)
            "#,
        )
        .bind(id)
        .bind(new_status.as_ref())
        .bind(status_names(expected))
        .execute(&self.pg_pool)
        .await
        .context("Failed to update campaign status")?;
        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(name = "Mark campaign as sent in database", skip(self))]
    async fn complete_delivery(
        &self,
        id: Uuid,
        sent_at: DateTime<Utc>,
        total_sent: i64,
    ) -> Result<bool, anyhow::Error> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns
            SET status = $2, sent_at = $3, total_sent = $4, updated_at = now()
            WHERE id = $1 AND status = $5
            "#,
        )
        .bind(id)
        .bind(CampaignStatus::Sent.as_ref())
        .bind(sent_at)
        .bind(total_sent)
        .bind(CampaignStatus::Sending.as_ref())
        .execute(&self.pg_pool)
        .await
        .context("Failed to mark campaign as sent")?;
        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(name = "Get due campaigns from database", skip(self))]
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>, anyhow::Error> {
        let query = format!(
            r#"
            SELECT {}
            FROM campaigns
            WHERE status = $1 AND scheduled_for <= $2
            ORDER BY scheduled_for ASC
            "#,
            CAMPAIGN_COLUMNS
        );
        sqlx::query_as::<_, CampaignRow>(&query)
            .bind(CampaignStatus::Scheduled.as_ref())
            .bind(now)
            .fetch_all(&self.pg_pool)
            .await
            .context("Failed to fetch due campaigns")?
            .into_iter()
            .map(Campaign::try_from)
            .collect()
    }
}
