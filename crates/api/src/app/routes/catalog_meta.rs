use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::app::services::{AppServices, NewOptionType};
use crate::app::{dto, errors};
use crate::context::CurrentUser;

pub async fn create_option_type(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<dto::OptionTypeRequest>,
) -> axum::response::Response {
    let presentation = body.presentation.unwrap_or_else(|| body.name.clone());
    let new = NewOptionType {
        name: body.name,
        presentation,
        values: body
            .option_values
            .into_iter()
            .map(|v| {
                let presentation = v.presentation.unwrap_or_else(|| v.name.clone());
                (v.name, presentation)
            })
            .collect(),
    };

    let principal = services.principal(&user);
    match services.create_option_type(&principal, new) {
        Ok(option_type) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "id": option_type.id_typed().to_string(),
                "name": option_type.name(),
                "presentation": option_type.presentation(),
                "option_values": option_type.values().iter().map(|v| serde_json::json!({
                    "id": v.id.to_string(),
                    "name": v.name,
                    "presentation": v.presentation,
                })).collect::<Vec<_>>(),
            })),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn create_property(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<dto::PropertyRequest>,
) -> axum::response::Response {
    let principal = services.principal(&user);
    match services.create_property(&principal, &body.name, body.presentation) {
        Ok(property) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "id": property.id_typed().to_string(),
                "name": property.name(),
                "presentation": property.presentation(),
            })),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
