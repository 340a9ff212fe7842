use fake::faker::internet::en::Password;
use fake::faker::name::en::FirstName;
use fake::Fake;
use newsletter_campaigns::adapters::{
    InMemoryCampaignRepository, InMemorySubscriberRepository, InMemoryUserRepository,
};
use newsletter_campaigns::authentication::hash_password;
use newsletter_campaigns::configuration::{DatabaseSettings, EmailProvider, Settings};
use newsletter_campaigns::domain::{Subscriber, SubscriberEmail, SubscriberRepository};
use newsletter_campaigns::startup::{get_email_client, Application, Stores};
use newsletter_campaigns::telemetry::{get_tracing_subscriber, init_tracing_subscriber};
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use sqlx::{Connection, Executor, PgConnection, PgPool};
use std::sync::Arc;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

static TRACING: Lazy<()> = Lazy::new(|| {
    let test_name = "test_app";
    let default_log_level = "debug";
    if std::env::var("TEST_LOG").is_ok() {
        init_tracing_subscriber(get_tracing_subscriber(
            test_name,
            default_log_level,
            std::io::stdout,
        ));
    } else {
        init_tracing_subscriber(get_tracing_subscriber(
            test_name,
            default_log_level,
            std::io::sink,
        ));
    }
});

pub struct TestApp {
    pub addr: String,
    pub port: u16,
    pub email_server: MockServer,
    pub campaigns: InMemoryCampaignRepository,
    pub subscribers: InMemorySubscriberRepository,
    pub test_user: TestUser,
    pub api_client: reqwest::Client,
}

pub async fn spawn_app() -> TestApp {
    Lazy::force(&TRACING);

    let email_server = MockServer::start().await;

    let settings = {
        let mut settings = Settings::get_configuration().expect("Failed to read configuration");
        // Port 0 lets the OS pick a free port
        settings.application.port = 0;
        settings.email_client.provider = EmailProvider::Postmark;
        settings.email_client.api_base_url = email_server.uri();
        settings.email_client.timeout_milliseconds = 500;
        settings.newsletter.interest_groups =
            vec!["news".into(), "product".into(), "events".into()];
        settings
    };

    let campaigns = InMemoryCampaignRepository::new();
    let subscribers = InMemorySubscriberRepository::new();
    let users = InMemoryUserRepository::new();
    let test_user = TestUser::generate();
    test_user.store(&users).await;

    let stores = Stores {
        campaigns: Arc::new(campaigns.clone()),
        subscribers: Arc::new(subscribers.clone()),
        users: Arc::new(users),
    };
    let email_client = get_email_client(&settings.email_client, &settings.application.base_url)
        .expect("Failed to build email client");
    let app = Application::build_with(settings, stores, email_client)
        .expect("Failed to build application");

    let port = app.port();
    let addr = format!("http://127.0.0.1:{}", port);
    tokio::spawn(app.run_until_terminated());

    TestApp {
        addr,
        port,
        email_server,
        campaigns,
        subscribers,
        test_user,
        api_client: reqwest::Client::new(),
    }
}

/// A brand new, migrated database so tests never see each other's rows.
/// Test databases are not dropped afterwards.
pub async fn get_test_database() -> PgPool {
    Lazy::force(&TRACING);
    let database: DatabaseSettings = Settings::get_configuration()
        .expect("Failed to read configuration")
        .database;
    let database_name = Uuid::new_v4().to_string();

    let mut connection = PgConnection::connect_with(&database.get_pg_options_without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(format!(r#"CREATE DATABASE "{}";"#, database_name).as_str())
        .await
        .expect("Failed to create database");

    let pg_pool = PgPool::connect_with(database.get_pg_options().database(&database_name))
        .await
        .expect("Failed to connect to Postgres");
    sqlx::migrate!("./migrations")
        .run(&pg_pool)
        .await
        .expect("Failed to migrate the database");
    pg_pool
}

pub struct TestUser {
    pub user_id: Uuid,
    pub username: String,
    pub password: String,
}

impl TestUser {
    pub fn generate() -> Self {
        Self {
            user_id: Uuid::new_v4(),
            username: FirstName().fake(),
            password: Password(8..20).fake(),
        }
    }

    async fn store(&self, users: &InMemoryUserRepository) {
        let password_hash = hash_password(&self.password).expect("Failed to hash password");
        users
            .add_user(&self.username, self.user_id, password_hash)
            .await;
    }
}

pub struct VerificationLinks {
    pub html: reqwest::Url,
    pub plain_text: reqwest::Url,
}

impl TestApp {
    pub async fn post_subscriptions(&self, body: &Value) -> reqwest::Response {
        self.api_client
            .post(&format!("{}/subscriptions", self.addr))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get_verify(&self, token: &str) -> reqwest::Response {
        self.api_client
            .get(&format!("{}/subscriptions/verify", self.addr))
            .query(&[("token", token)])
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn put_preferences(&self, body: &Value) -> reqwest::Response {
        self.api_client
            .put(&format!("{}/subscriptions/preferences", self.addr))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get_unsubscribe(&self, token: &str) -> reqwest::Response {
        self.api_client
            .get(&format!("{}/subscriptions/unsubscribe", self.addr))
            .query(&[("token", token)])
            .send()
            .await
            .expect("Failed to execute request")
    }

    fn admin(&self, method: reqwest::Method, endpoint: &str) -> reqwest::RequestBuilder {
        self.api_client
            .request(method, &format!("{}/admin{}", self.addr, endpoint))
            .basic_auth(&self.test_user.username, Some(&self.test_user.password))
    }

    pub async fn post_campaign(&self, body: &Value) -> reqwest::Response {
        self.admin(reqwest::Method::POST, "/campaigns")
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get_campaign(&self, id: &str) -> reqwest::Response {
        self.admin(reqwest::Method::GET, &format!("/campaigns/{}", id))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn put_campaign(&self, id: &str, body: &Value) -> reqwest::Response {
        self.admin(reqwest::Method::PUT, &format!("/campaigns/{}", id))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn delete_campaign(&self, id: &str) -> reqwest::Response {
        self.admin(reqwest::Method::DELETE, &format!("/campaigns/{}", id))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn schedule_campaign(&self, id: &str, body: &Value) -> reqwest::Response {
        self.admin(reqwest::Method::POST, &format!("/campaigns/{}/schedule", id))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn send_campaign(&self, id: &str) -> reqwest::Response {
        self.admin(reqwest::Method::POST, &format!("/campaigns/{}/send", id))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get_campaign_stats(&self, id: &str) -> reqwest::Response {
        self.admin(reqwest::Method::GET, &format!("/campaigns/{}/stats", id))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post_sweep(&self) -> reqwest::Response {
        self.admin(reqwest::Method::POST, "/campaigns/sweep")
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get_subscriber(&self, id: Uuid) -> reqwest::Response {
        self.admin(reqwest::Method::GET, &format!("/subscribers/{}", id))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn delete_subscriber(&self, id: Uuid) -> reqwest::Response {
        self.admin(reqwest::Method::DELETE, &format!("/subscribers/{}", id))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// The only link in `text`, pointed at the test server.
    pub fn get_link(&self, text: &str) -> reqwest::Url {
        let links: Vec<_> = linkify::LinkFinder::new()
            .links(text)
            .filter(|l| *l.kind() == linkify::LinkKind::Url)
            .collect();
        assert_eq!(links.len(), 1);
        let mut link = reqwest::Url::parse(links[0].as_str()).unwrap();
        // The base url has no port
        link.set_port(Some(self.port)).unwrap();
        link
    }

    /// Extract the verification links from a request sent to the email API.
    pub fn get_verification_links(&self, email_request: &wiremock::Request) -> VerificationLinks {
        let body: Value = serde_json::from_slice(&email_request.body).unwrap();
        VerificationLinks {
            html: self.get_link(body["HtmlBody"].as_str().unwrap()),
            plain_text: self.get_link(body["TextBody"].as_str().unwrap()),
        }
    }

    pub async fn create_unverified_subscriber(
        &self,
        email: &str,
        preferences: Value,
    ) -> VerificationLinks {
        let _mock_guard = Mock::given(path("/email"))
            .and(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .named("Verification email")
            .expect(1)
            .mount_as_scoped(&self.email_server)
            .await;

        let body = json!({ "email": email, "preferences": preferences });
        self.post_subscriptions(&body)
            .await
            .error_for_status()
            .unwrap();

        let email_request = self
            .email_server
            .received_requests()
            .await
            .unwrap()
            .pop()
            .unwrap();
        self.get_verification_links(&email_request)
    }

    pub async fn create_verified_subscriber(&self, email: &str, preferences: Value) -> Subscriber {
        let links = self.create_unverified_subscriber(email, preferences).await;
        reqwest::get(links.html)
            .await
            .unwrap()
            .error_for_status()
            .unwrap();
        self.find_subscriber(email).await
    }

    pub async fn find_subscriber(&self, email: &str) -> Subscriber {
        let email = SubscriberEmail::parse(email.into()).unwrap();
        self.subscribers
            .find_by_email(&email)
            .await
            .unwrap()
            .expect("Subscriber not found")
    }

    /// Create a draft through the API and return its id.
    pub async fn create_draft(&self, target_groups: Value) -> String {
        let body = json!({
            "name": "Spring issue",
            "subject": "What's new this spring",
            "content": "<p>Hello there</p>",
            "target_groups": target_groups,
        });
        let response = self.post_campaign(&body).await;
        assert_eq!(response.status().as_u16(), 201);
        let body: Value = response.json().await.unwrap();
        body["data"]["id"].as_str().unwrap().to_string()
    }

    pub async fn campaign_status(&self, id: &str) -> String {
        let body: Value = self.get_campaign(id).await.json().await.unwrap();
        body["data"]["status"].as_str().unwrap().to_string()
    }
}

pub fn batch_recipients(email_request: &wiremock::Request) -> Vec<String> {
    let body: Value = serde_json::from_slice(&email_request.body).unwrap();
    body.as_array()
        .unwrap()
        .iter()
        .map(|message| message["To"].as_str().unwrap().to_string())
        .collect()
}

/// Every address the email API received a batch message for, sorted.
pub async fn delivered_addresses(email_server: &MockServer) -> Vec<String> {
    let mut addresses: Vec<String> = email_server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == "/email/batch")
        .flat_map(batch_recipients)
        .collect();
    addresses.sort();
    addresses
}
