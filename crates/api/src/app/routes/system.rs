use axum::{http::StatusCode, response::Response};

use crate::app::errors;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Landing page for refused admin actions.
pub async fn unauthorized() -> Response {
    errors::unauthorized()
}
