use crate::authentication::{get_credentials_from_basic_auth, validate_credentials, AuthError};
use crate::domain::UserRepository;
use crate::routes::error_response;
use crate::utils::e500;
use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::error::InternalError;
use actix_web::http::{header, StatusCode};
use actix_web::{web, HttpMessage};
use actix_web_lab::middleware::Next;
use std::fmt::Display;
use std::ops::Deref;
use uuid::Uuid;

/// Id of the admin authenticated for the current request.
#[derive(Copy, Clone, Debug)]
pub struct UserId(Uuid);

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl Deref for UserId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[tracing::instrument(
    name = "Authenticate admin request",
    skip_all,
    fields(username = tracing::field::Empty, user_id = tracing::field::Empty)
)]
pub async fn reject_anonymous_users(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, actix_web::Error> {
    let users = req
        .app_data::<web::Data<dyn UserRepository>>()
        .cloned()
        .ok_or_else(|| e500("No user repository registered"))?;

    let credentials = get_credentials_from_basic_auth(req.headers()).map_err(unauthorized)?;
    tracing::Span::current().record("username", &tracing::field::display(&credentials.username));

    let user_id = validate_credentials(users.get_ref(), credentials)
        .await
        .map_err(|e| match e {
            AuthError::InvalidCredentials(_) => unauthorized(e.into()),
            AuthError::UnexpectedError(_) => e500(e),
        })?;
    tracing::Span::current().record("user_id", &tracing::field::display(&user_id));

    req.extensions_mut().insert(UserId(user_id));
    next.call(req).await
}

fn unauthorized(e: anyhow::Error) -> actix_web::Error {
    let mut response = error_response(StatusCode::UNAUTHORIZED, "Authentication required");
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        header::HeaderValue::from_static(r#"Basic realm="admin""#),
    );
    InternalError::from_response(e, response).into()
}
