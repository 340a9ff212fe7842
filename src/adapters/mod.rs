mod in_memory;
mod postgres_campaign_repository;
mod postgres_subscriber_repository;
mod postgres_user_repository;

pub use in_memory::{InMemoryCampaignRepository, InMemorySubscriberRepository, InMemoryUserRepository};
pub use postgres_campaign_repository::PostgresCampaignRepository;
pub use postgres_subscriber_repository::PostgresSubscriberRepository;
pub use postgres_user_repository::PostgresUserRepository;
