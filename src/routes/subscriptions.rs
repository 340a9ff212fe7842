use crate::domain::{
    GroupFlags, NewSubscriber, Subscriber, SubscriberEmail, SubscriberName, SubscriberStatus,
};
use crate::routes::{error_response, success_response};
use crate::subscriptions::{SubscriptionError, SubscriptionService};
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};

impl ResponseError for SubscriptionError {
    fn status_code(&self) -> StatusCode {
        match self {
            SubscriptionError::Validation(_) | SubscriptionError::InvalidToken => {
                StatusCode::BAD_REQUEST
            }
            SubscriptionError::NotFound(_) => StatusCode::NOT_FOUND,
            SubscriptionError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            SubscriptionError::Unexpected(_) => {
                error_response(self.status_code(), "Internal server error")
            }
            e => error_response(self.status_code(), &e.to_string()),
        }
    }
}

#[derive(serde::Deserialize)]
pub struct SubscribeRequest {
    email: String,
    first_name: Option<String>,
    last_name: Option<String>,
    #[serde(default)]
    preferences: GroupFlags,
}

impl TryFrom<SubscribeRequest> for NewSubscriber {
    type Error = String;

    fn try_from(request: SubscribeRequest) -> Result<Self, Self::Error> {
        Ok(NewSubscriber {
            email: SubscriberEmail::parse(request.email)?,
            first_name: SubscriberName::parse_optional(request.first_name)?,
            last_name: SubscriberName::parse_optional(request.last_name)?,
            preferences: request.preferences,
        })
    }
}

/// What a reader gets to see about their own subscription.
#[derive(serde::Serialize)]
struct SubscriptionView<'a> {
    email: &'a str,
    status: SubscriberStatus,
    is_verified: bool,
    preferences: &'a GroupFlags,
}

impl<'a> From<&'a Subscriber> for SubscriptionView<'a> {
    fn from(subscriber: &'a Subscriber) -> Self {
        Self {
            email: subscriber.email.as_ref(),
            status: subscriber.status,
            is_verified: subscriber.is_verified,
            preferences: &subscriber.preferences,
        }
    }
}

#[tracing::instrument(
    name = "Add a new subscriber",
    skip(request, subscriptions),
    fields(subscriber_email = %request.email)
)]
pub async fn subscribe(
    web::Json(request): web::Json<SubscribeRequest>,
    subscriptions: web::Data<SubscriptionService>,
) -> Result<HttpResponse, SubscriptionError> {
    let new_subscriber: NewSubscriber = request
        .try_into()
        .map_err(SubscriptionError::Validation)?;
    let subscriber = subscriptions.subscribe(new_subscriber).await?;
    Ok(success_response(
        StatusCode::CREATED,
        SubscriptionView::from(&subscriber),
    ))
}

#[derive(serde::Deserialize)]
pub struct TokenParameters {
    token: String,
}

#[tracing::instrument(name = "Verify a subscriber email", skip_all)]
pub async fn verify_subscriber(
    web::Query(TokenParameters { token }): web::Query<TokenParameters>,
    subscriptions: web::Data<SubscriptionService>,
) -> Result<HttpResponse, SubscriptionError> {
    let subscriber = subscriptions.verify(&token).await?;
    Ok(success_response(
        StatusCode::OK,
        SubscriptionView::from(&subscriber),
    ))
}

#[derive(serde::Deserialize)]
pub struct PreferencesRequest {
    token: String,
    preferences: GroupFlags,
}

#[tracing::instrument(name = "Update subscriber preferences", skip_all)]
pub async fn update_preferences(
    web::Json(PreferencesRequest { token, preferences }): web::Json<PreferencesRequest>,
    subscriptions: web::Data<SubscriptionService>,
) -> Result<HttpResponse, SubscriptionError> {
    let subscriber = subscriptions.update_preferences(&token, preferences).await?;
    Ok(success_response(
        StatusCode::OK,
        SubscriptionView::from(&subscriber),
    ))
}

#[tracing::instrument(name = "Unsubscribe a reader", skip_all)]
pub async fn unsubscribe(
    web::Query(TokenParameters { token }): web::Query<TokenParameters>,
    subscriptions: web::Data<SubscriptionService>,
) -> Result<HttpResponse, SubscriptionError> {
    let subscriber = subscriptions.unsubscribe(&token).await?;
    Ok(success_response(
        StatusCode::OK,
        SubscriptionView::from(&subscriber),
    ))
}
