use crate::domain::audience::{unknown_groups, GroupFlags};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::AsRefStr,
    strum::EnumString,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Sending,
    Sent,
}

impl CampaignStatus {
    /// Statuses from which a send may start.
    pub const SENDABLE: [CampaignStatus; 2] = [CampaignStatus::Draft, CampaignStatus::Scheduled];

    /// draft -> scheduled -> sending -> sent, plus the sending -> draft rollback.
    /// A draft may also be sent immediately without being scheduled.
    pub fn can_transition_to(self, next: CampaignStatus) -> bool {
        use CampaignStatus::*;
        matches!(
            (self, next),
            (Draft, Scheduled)
                | (Draft, Sending)
                | (Scheduled, Sending)
                | (Sending, Sent)
                | (Sending, Draft)
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CampaignStats {
    pub total_sent: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub subject: String,
    /// HTML body.
    pub content: String,
    pub target_groups: GroupFlags,
    pub status: CampaignStatus,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub stats: CampaignStats,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn draft(new_campaign: NewCampaign, created_by: Uuid) -> Self {
        let now = Utc::now();
        let NewCampaign {
            name,
            subject,
            content,
            target_groups,
        } = new_campaign;
        Self {
            id: Uuid::new_v4(),
            name,
            subject,
            content,
            target_groups,
            status: CampaignStatus::Draft,
            scheduled_for: None,
            sent_at: None,
            stats: CampaignStats::default(),
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, patch: CampaignPatch) {
        let CampaignPatch {
            name,
            subject,
            content,
            target_groups,
        } = patch;
        if let Some(name) = name {
            self.name = name;
        }
        if let Some(subject) = subject {
            self.subject = subject;
        }
        if let Some(content) = content {
            self.content = content;
        }
        if let Some(target_groups) = target_groups {
            self.target_groups = target_groups;
        }
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub name: String,
    pub subject: String,
    pub content: String,
    pub target_groups: GroupFlags,
}

impl NewCampaign {
    /// Form-level checks done by callers before handing a campaign to the service.
    pub fn parse(
        name: String,
        subject: String,
        content: String,
        target_groups: GroupFlags,
        known_groups: &[String],
    ) -> Result<Self, String> {
        let name = required("name", name)?;
        let subject = required("subject", subject)?;
        let content = required("content", content)?;
        validate_target_groups(&target_groups, known_groups)?;
        Ok(Self {
            name,
            subject,
            content,
            target_groups,
        })
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct CampaignPatch {
    pub name: Option<String>,
    pub subject: Option<String>,
    pub content: Option<String>,
    pub target_groups: Option<GroupFlags>,
}

impl CampaignPatch {
    pub fn validate(self, known_groups: &[String]) -> Result<Self, String> {
        let name = self.name.map(|v| required("name", v)).transpose()?;
        let subject = self.subject.map(|v| required("subject", v)).transpose()?;
        let content = self.content.map(|v| required("content", v)).transpose()?;
        if let Some(target_groups) = &self.target_groups {
            validate_target_groups(target_groups, known_groups)?;
        }
        Ok(Self {
            name,
            subject,
            content,
            target_groups: self.target_groups,
        })
    }
}

fn required(field: &str, value: String) -> Result<String, String> {
    if value.trim().is_empty() {
        return Err(format!("Campaign {} cannot be empty", field));
    }
    Ok(value)
}

fn validate_target_groups(target_groups: &GroupFlags, known_groups: &[String]) -> Result<(), String> {
    if target_groups.is_empty() {
        return Err("Campaign target groups cannot be empty".into());
    }
    let unknown = unknown_groups(target_groups, known_groups);
    if !unknown.is_empty() {
        return Err(format!("Unknown target groups: {}", unknown.join(", ")));
    }
    Ok(())
}
