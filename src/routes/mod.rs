mod admin;
mod health_check;
mod subscriptions;

pub use admin::*;
pub use health_check::*;
pub use subscriptions::*;

use actix_web::error::{InternalError, JsonPayloadError, QueryPayloadError};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};

#[derive(serde::Serialize)]
struct Success<T> {
    status: &'static str,
    data: T,
}

#[derive(serde::Serialize)]
struct Failure<'a> {
    status: &'static str,
    message: &'a str,
}

/// `{"status": "success", "data": ...}`
pub fn success_response<T: serde::Serialize>(status: StatusCode, data: T) -> HttpResponse {
    HttpResponse::build(status).json(Success {
        status: "success",
        data,
    })
}

/// `{"status": "error", "message": ...}`
pub fn error_response(status: StatusCode, message: &str) -> HttpResponse {
    HttpResponse::build(status).json(Failure {
        status: "error",
        message,
    })
}

pub fn e400<T>(e: T) -> actix_web::Error
where
    T: std::fmt::Debug + std::fmt::Display + 'static,
{
    let response = error_response(StatusCode::BAD_REQUEST, &e.to_string());
    InternalError::from_response(e, response).into()
}

/// Malformed JSON bodies get the same envelope as every other error.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|e: JsonPayloadError, _req: &HttpRequest| e400(e))
}

pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|e: QueryPayloadError, _req: &HttpRequest| e400(e))
}
