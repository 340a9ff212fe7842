mod audience;
mod campaign;
mod campaign_repository;
mod subscriber;
mod subscriber_email;
mod subscriber_name;
mod subscriber_repository;
mod user_repository;

pub use audience::{matches_target_groups, unknown_groups, Audience, GroupFlags};
pub use campaign::{Campaign, CampaignPatch, CampaignStats, CampaignStatus, NewCampaign};
pub use campaign_repository::CampaignRepository;
pub use subscriber::{
    DeliveryRecord, NewSubscriber, Recipient, Subscriber, SubscriberFilter, SubscriberStatus,
};
pub use subscriber_email::SubscriberEmail;
pub use subscriber_name::SubscriberName;
pub use subscriber_repository::SubscriberRepository;
pub use user_repository::UserRepository;
