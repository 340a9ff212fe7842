mod middleware;
mod password;

pub use middleware::{reject_anonymous_users, UserId};
pub use password::{
    get_credentials_from_basic_auth, hash_password, validate_credentials, verify_password_hash,
    AuthError, Credentials,
};
