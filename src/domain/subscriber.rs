use crate::domain::audience::{Audience, GroupFlags};
use crate::domain::{SubscriberEmail, SubscriberName};
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
pub enum SubscriberStatus {
    Active,
    Unsubscribed,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DeliveryRecord {
    pub campaign_id: Uuid,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Subscriber {
    pub id: Uuid,
    #[serde(serialize_with = "serialize_email")]
    pub email: SubscriberEmail,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub status: SubscriberStatus,
    pub is_verified: bool,
    pub preferences: GroupFlags,
    #[serde(skip)]
    pub verification_token_hash: Option<String>,
    #[serde(skip)]
    pub verification_token_expiry: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub unsubscribe_token: String,
    pub last_email_sent: Option<DateTime<Utc>>,
    /// Append-only history of campaigns delivered to this subscriber.
    pub campaigns: Vec<DeliveryRecord>,
    pub subscribed_at: DateTime<Utc>,
}

impl Subscriber {
    /// Campaigns only go to active subscribers who confirmed their address.
    pub fn is_deliverable(&self) -> bool {
        self.status == SubscriberStatus::Active && self.is_verified
    }
}

fn serialize_email<S: serde::Serializer>(
    email: &SubscriberEmail,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(email.as_ref())
}

/// Where a campaign email goes, and the token its unsubscribe link carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub email: SubscriberEmail,
    pub unsubscribe_token: String,
}

impl From<&Subscriber> for Recipient {
    fn from(subscriber: &Subscriber) -> Self {
        Self {
            email: subscriber.email.clone(),
            unsubscribe_token: subscriber.unsubscribe_token.clone(),
        }
    }
}

pub struct NewSubscriber {
    pub email: SubscriberEmail,
    pub first_name: Option<SubscriberName>,
    pub last_name: Option<SubscriberName>,
    pub preferences: GroupFlags,
}

/// Selection over the subscriber directory.
///
/// The audience is OR-combined over its groups: a subscriber matches when at
/// least one of them is `true` in their preferences.
#[derive(Debug, Clone)]
pub struct SubscriberFilter {
    pub status: Option<SubscriberStatus>,
    pub is_verified: Option<bool>,
    pub audience: Audience,
}

impl SubscriberFilter {
    pub fn deliverable(audience: Audience) -> Self {
        Self {
            status: Some(SubscriberStatus::Active),
            is_verified: Some(true),
            audience,
        }
    }

    pub fn matches(&self, subscriber: &Subscriber) -> bool {
        if let Some(status) = self.status {
            if subscriber.status != status {
                return false;
            }
        }
        if let Some(is_verified) = self.is_verified {
            if subscriber.is_verified != is_verified {
                return false;
            }
        }
        self.audience.admits(&subscriber.preferences)
    }
}
