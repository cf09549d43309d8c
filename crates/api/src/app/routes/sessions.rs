use std::sync::Arc;

use axum::{extract::Extension, response::IntoResponse, Json};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::LoginRequest>,
) -> axum::response::Response {
    match services.login(&body.email, &body.password) {
        Ok(session) => Json(serde_json::json!({
            "token": session.token,
            "user_id": session.user_id.to_string(),
        }))
        .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
