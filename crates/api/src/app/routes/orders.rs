use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use harvest_catalog::VariantId;
use harvest_core::FieldErrors;
use harvest_enterprises::EnterpriseId;
use harvest_orders::OrderId;

use crate::app::services::{AppServices, ServiceError};
use crate::app::{dto, errors};
use crate::context::CurrentUser;

/// Open a cart for the caller with the given line items.
pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<dto::CreateOrderRequest>,
) -> axum::response::Response {
    let mut field_errors = FieldErrors::new();
    let distributor = dto::parse_id::<EnterpriseId>("distributor_id", &body.distributor_id, &mut field_errors);
    let lines: Vec<(VariantId, u32)> = body
        .line_items
        .iter()
        .filter_map(|li| {
            dto::parse_id::<VariantId>("line_items.variant_id", &li.variant_id, &mut field_errors)
                .map(|variant_id| (variant_id, li.quantity))
        })
        .collect();
    let Some(distributor) = distributor.filter(|_| field_errors.is_empty()) else {
        return errors::service_error_to_response(ServiceError::Validation(field_errors));
    };

    match services.create_order(&user, distributor, &lines) {
        Ok(order) => {
            tracing::info!(order_id = %order.id_typed(), number = order.number(), "order created");
            (StatusCode::CREATED, Json(dto::order_json(&order))).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn complete_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let Ok(order_id) = id.parse::<OrderId>() else {
        return errors::service_error_to_response(ServiceError::NotFound);
    };

    match services.complete_order(&user, order_id) {
        Ok(order) => Json(dto::order_json(&order)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
