use crate::routes::success_response;
use actix_web::http::StatusCode;
use actix_web::HttpResponse;

pub async fn health_check() -> HttpResponse {
    success_response(StatusCode::OK, serde_json::json!({ "healthy": true }))
}
