use crate::subscriptions::{SubscriptionError, SubscriptionService};
use crate::routes::success_response;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use uuid::Uuid;

#[tracing::instrument(name = "Fetch a subscriber", skip(subscriptions))]
pub async fn get_subscriber(
    subscriber_id: web::Path<Uuid>,
    subscriptions: web::Data<SubscriptionService>,
) -> Result<HttpResponse, SubscriptionError> {
    let subscriber = subscriptions.get(subscriber_id.into_inner()).await?;
    Ok(success_response(StatusCode::OK, subscriber))
}

#[tracing::instrument(name = "Remove a subscriber", skip(subscriptions))]
pub async fn delete_subscriber(
    subscriber_id: web::Path<Uuid>,
    subscriptions: web::Data<SubscriptionService>,
) -> Result<HttpResponse, SubscriptionError> {
    let subscriber_id = subscriber_id.into_inner();
    subscriptions.delete(subscriber_id).await?;
    Ok(success_response(
        StatusCode::OK,
        serde_json::json!({ "id": subscriber_id }),
    ))
}
