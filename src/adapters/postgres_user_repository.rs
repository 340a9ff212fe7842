use crate::domain::UserRepository;
use anyhow::Context;
use async_trait::async_trait;
use secrecy::Secret;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct PostgresUserRepository {
    pg_pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pg_pool: PgPool) -> Self {
        Self { pg_pool }
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    #[tracing::instrument(name = "Get credentials from database", skip_all)]
    async fn get_stored_credentials(
        &self,
        username: &str,
    ) -> Result<Option<(Uuid, Secret<String>)>, anyhow::Error> {
        let credentials = sqlx::query_as::<_, (Uuid, String)>(
            r#"
            SELECT user_id, password_hash
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pg_pool)
        .await
        .context("Failed to fetch credentials from database")?
        .map(|(user_id, password_hash)| (user_id, Secret::new(password_hash)));

        Ok(credentials)
    }
}
