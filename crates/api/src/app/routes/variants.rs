use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use harvest_catalog::{ProductId, VariantId};
use harvest_core::FieldErrors;
use harvest_infra::{Page, VariantSearch};

use crate::app::services::{AppServices, ServiceError};
use crate::app::{dto, errors};
use crate::context::CurrentUser;

/// Index query options other than the `q[...]` conditions.
#[derive(Debug, Default, PartialEq)]
struct IndexOptions {
    page: Option<u32>,
    per_page: Option<u32>,
    show_deleted: bool,
    bulk_template: bool,
}

impl IndexOptions {
    fn from_params(params: &[(String, String)]) -> Self {
        let mut options = Self::default();
        for (key, value) in params {
            match key.as_str() {
                "page" => options.page = value.trim().parse().ok(),
                "per_page" => options.per_page = value.trim().parse().ok(),
                "show_deleted" => options.show_deleted = matches!(value.trim(), "true" | "1"),
                "template" => options.bulk_template = value == "bulk_index",
                _ => {}
            }
        }
        options
    }
}

pub async fn list_variants(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Query(params): Query<Vec<(String, String)>>,
) -> axum::response::Response {
    let options = IndexOptions::from_params(&params);
    let search = VariantSearch::from_params(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    let principal = services.principal(&user);
    let page = Page::new(options.page, options.per_page);
    match services.list_variants(&principal, &search, options.show_deleted, page) {
        Ok(found) if options.bulk_template => Json(
            found
                .items
                .iter()
                .map(|view| dto::variant_bulk_json(&view.variant))
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Ok(found) => Json(dto::variants_page_json(found)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn new_variant() -> impl IntoResponse {
    Json(serde_json::json!({
        "attributes": dto::STANDARD_ATTRIBUTES,
        "required_attributes": [],
    }))
}

fn parse_variant_id(raw: &str) -> Result<VariantId, ServiceError> {
    raw.parse().map_err(|_| ServiceError::NotFound)
}

pub async fn show_variant(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match parse_variant_id(&id).and_then(|id| services.variant(id)) {
        Ok(view) => Json(dto::variant_json(&view)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

fn created(result: Result<crate::app::services::VariantView, ServiceError>) -> axum::response::Response {
    match result {
        Ok(view) => (StatusCode::CREATED, Json(dto::variant_json(&view))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// `POST /api/variants` with `variant.product_id`.
pub async fn create_variant(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(form): Json<dto::VariantForm>,
) -> axum::response::Response {
    let mut field_errors = FieldErrors::new();
    let product_id = form
        .variant
        .product_id
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .and_then(|raw| dto::parse_id::<ProductId>("product_id", raw, &mut field_errors));
    if !field_errors.is_empty() {
        return errors::service_error_to_response(ServiceError::NotFound);
    }
    let input = match form.variant.to_variant_input() {
        Ok(input) => input,
        Err(e) => return errors::service_error_to_response(ServiceError::Validation(e)),
    };

    let principal = services.principal(&user);
    created(services.create_variant(&principal, product_id, &input))
}

pub async fn create_product_variant(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(product_id): Path<String>,
    Json(form): Json<dto::VariantForm>,
) -> axum::response::Response {
    let Some(product) = services.find_product(&product_id) else {
        return errors::service_error_to_response(ServiceError::NotFound);
    };
    let input = match form.variant.to_variant_input() {
        Ok(input) => input,
        Err(e) => return errors::service_error_to_response(ServiceError::Validation(e)),
    };

    let principal = services.principal(&user);
    created(services.create_variant(&principal, Some(product.id_typed()), &input))
}

pub async fn update_variant(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(form): Json<dto::VariantForm>,
) -> axum::response::Response {
    let variant_id = match parse_variant_id(&id) {
        Ok(id) => id,
        Err(e) => return errors::service_error_to_response(e),
    };
    let input = match form.variant.to_variant_input() {
        Ok(input) => input,
        Err(e) => return errors::service_error_to_response(ServiceError::Validation(e)),
    };

    let principal = services.principal(&user);
    match services.update_variant(&principal, variant_id, &input) {
        Ok(view) => Json(dto::variant_json(&view)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn destroy_variant(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let principal = services.principal(&user);
    match parse_variant_id(&id).and_then(|id| services.destroy_variant(&principal, id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Soft delete that refuses to remove a product's last variant.
/// The product may be addressed by id or permalink.
pub async fn soft_delete_variant(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path((product_key, variant_id)): Path<(String, String)>,
) -> axum::response::Response {
    let Some(product) = services.find_product(&product_key) else {
        return errors::service_error_to_response(ServiceError::NotFound);
    };

    let principal = services.principal(&user);
    let result = parse_variant_id(&variant_id)
        .and_then(|id| services.soft_delete_variant(&principal, product.id_typed(), id));
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
