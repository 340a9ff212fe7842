pub mod adapters;
pub mod authentication;
pub mod campaigns;
pub mod configuration;
pub mod domain;
pub mod email_client;
pub mod routes;
pub mod startup;
pub mod subscriptions;
pub mod sweeper;
pub mod telemetry;
pub mod utils;
