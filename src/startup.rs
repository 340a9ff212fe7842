use crate::adapters::{PostgresCampaignRepository, PostgresSubscriberRepository, PostgresUserRepository};
use crate::authentication::reject_anonymous_users;
use crate::campaigns::CampaignService;
use crate::configuration::{DatabaseSettings, EmailClientSettings, EmailProvider, Settings};
use crate::domain::{CampaignRepository, SubscriberRepository, UserRepository};
use crate::email_client::{EmailTransport, PostmarkEmailClient, SmtpEmailClient};
use crate::routes::{
    campaign_stats, create_campaign, delete_campaign, delete_subscriber, get_campaign,
    get_subscriber, health_check, json_config, query_config, schedule_campaign, send_campaign,
    subscribe, sweep_campaigns, unsubscribe, update_campaign, update_preferences,
    verify_subscriber,
};
use crate::subscriptions::SubscriptionService;
use crate::sweeper::{CampaignSweeper, SweeperWorker};
use actix_web::dev::Server;
use actix_web::web::Data;
use actix_web::{web, App, HttpServer};
use actix_web_lab::middleware::from_fn;
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;
use tracing_actix_web::TracingLogger;

/// The persistence backends the application runs on.
#[derive(Clone)]
pub struct Stores {
    pub campaigns: Arc<dyn CampaignRepository>,
    pub subscribers: Arc<dyn SubscriberRepository>,
    pub users: Arc<dyn UserRepository>,
}

impl Stores {
    pub fn postgres(pg_pool: PgPool) -> Self {
        Self {
            campaigns: Arc::new(PostgresCampaignRepository::new(pg_pool.clone())),
            subscribers: Arc::new(PostgresSubscriberRepository::new(pg_pool.clone())),
            users: Arc::new(PostgresUserRepository::new(pg_pool)),
        }
    }
}

pub struct Application {
    port: u16,
    server: Server,
    sweeper: CampaignSweeper,
}

impl Application {
    /// Postgres stores and the email provider named in `settings`.
    pub async fn build(settings: Settings) -> Result<Self, anyhow::Error> {
        let pg_pool = get_pg_pool(&settings.database);
        if settings.database.run_migrations {
            sqlx::migrate!("./migrations")
                .run(&pg_pool)
                .await
                .context("Failed to migrate the database")?;
        }
        let email_client = get_email_client(
            &settings.email_client,
            &settings.application.base_url,
        )?;
        Self::build_with(settings, Stores::postgres(pg_pool), email_client)
    }

    pub fn build_with(
        settings: Settings,
        stores: Stores,
        email_client: Arc<dyn EmailTransport>,
    ) -> Result<Self, anyhow::Error> {
        let listener = TcpListener::bind(settings.application.get_url())
            .with_context(|| format!("Failed to bind {}", settings.application.get_url()))?;
        let port = listener.local_addr()?.port();

        let newsletter = &settings.newsletter;
        let campaigns = Arc::new(CampaignService::new(
            stores.campaigns.clone(),
            stores.subscribers.clone(),
            email_client.clone(),
            newsletter.interest_groups.clone(),
        ));
        let subscriptions = SubscriptionService::new(
            stores.subscribers.clone(),
            email_client,
            settings.application.base_url.clone(),
            newsletter.interest_groups.clone(),
            chrono::Duration::hours(newsletter.verification_token_ttl_hours),
        );
        let sweeper = CampaignSweeper::new(campaigns.clone());

        let server = run(listener, stores.users, campaigns, subscriptions, sweeper.clone())?;

        Ok(Self {
            port,
            server,
            sweeper,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Background sweeper sharing this application's campaign service.
    pub fn sweeper_worker(&self, interval: Duration) -> SweeperWorker {
        SweeperWorker::new(self.sweeper.clone(), interval)
    }

    pub async fn run_until_terminated(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

pub fn get_pg_pool(database: &DatabaseSettings) -> PgPool {
    PgPoolOptions::new()
        .acquire_timeout(Duration::from_secs(2))
        .connect_lazy_with(database.get_pg_options())
}

/// Build the transport selected by `email_client.provider`.
///
/// Campaign emails link back to `{base_url}/subscriptions/unsubscribe` with
/// each recipient's own token.
pub fn get_email_client(
    email_client: &EmailClientSettings,
    base_url: &str,
) -> Result<Arc<dyn EmailTransport>, anyhow::Error> {
    let sender = email_client
        .sender()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Invalid sender email address")?;
    let unsubscribe_url = format!("{}/subscriptions/unsubscribe", base_url);
    let transport: Arc<dyn EmailTransport> = match email_client.provider {
        EmailProvider::Postmark => Arc::new(PostmarkEmailClient::new(
            &email_client.api_base_url,
            sender,
            email_client.authorization_token.clone(),
            email_client.timeout(),
            email_client.batch_size,
            unsubscribe_url,
        )?),
        EmailProvider::Smtp => Arc::new(SmtpEmailClient::new(
            &email_client.smtp_host,
            email_client.smtp_port,
            &sender,
            email_client.authorization_token.clone(),
            email_client.timeout(),
            email_client.batch_size,
            unsubscribe_url,
        )?),
    };
    Ok(transport)
}

fn run(
    listener: TcpListener,
    users: Arc<dyn UserRepository>,
    campaigns: Arc<CampaignService>,
    subscriptions: SubscriptionService,
    sweeper: CampaignSweeper,
) -> Result<Server, anyhow::Error> {
    // web::Data is an Arc: every worker thread shares the same services
    let users: Data<dyn UserRepository> = Data::from(users);
    let campaigns: Data<CampaignService> = Data::from(campaigns);
    let subscriptions = Data::new(subscriptions);
    let sweeper = Data::new(sweeper);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(json_config())
            .app_data(query_config())
            .route("/health", web::get().to(health_check))
            .service(
                web::scope("/subscriptions")
                    .route("", web::post().to(subscribe))
                    .route("/verify", web::get().to(verify_subscriber))
                    .route("/preferences", web::put().to(update_preferences))
                    .route("/unsubscribe", web::get().to(unsubscribe)),
            )
            .service(
                web::scope("/admin")
                    .wrap(from_fn(reject_anonymous_users))
                    .route("/campaigns", web::post().to(create_campaign))
                    .route("/campaigns/sweep", web::post().to(sweep_campaigns))
                    .route("/campaigns/{campaign_id}", web::get().to(get_campaign))
                    .route("/campaigns/{campaign_id}", web::put().to(update_campaign))
                    .route("/campaigns/{campaign_id}", web::delete().to(delete_campaign))
                    .route(
                        "/campaigns/{campaign_id}/schedule",
                        web::post().to(schedule_campaign),
                    )
                    .route("/campaigns/{campaign_id}/send", web::post().to(send_campaign))
                    .route("/campaigns/{campaign_id}/stats", web::get().to(campaign_stats))
                    .route("/subscribers/{subscriber_id}", web::get().to(get_subscriber))
                    .route(
                        "/subscribers/{subscriber_id}",
                        web::delete().to(delete_subscriber),
                    ),
            )
            .app_data(users.clone())
            .app_data(campaigns.clone())
            .app_data(subscriptions.clone())
            .app_data(sweeper.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
