use async_trait::async_trait;
use secrecy::Secret;
use uuid::Uuid;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// User id and argon2 PHC password hash for `username`.
    async fn get_stored_credentials(
        &self,
        username: &str,
    ) -> Result<Option<(Uuid, Secret<String>)>, anyhow::Error>;
}
