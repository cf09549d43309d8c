//! Admin product form endpoints.
//!
//! Successful submissions redirect, refusals redirect to the unauthorized
//! page and invalid forms answer 200 with their field errors, except bulk
//! updates which answer 400.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};

use harvest_catalog::ProductId;
use harvest_core::FieldErrors;

use crate::app::services::{AppServices, ServiceError};
use crate::app::{dto, errors};
use crate::context::MaybeUser;

pub const PRODUCTS_PATH: &str = "/admin/products";
pub const NEW_PRODUCT_PATH: &str = "/admin/products/new";
pub const BULK_PRODUCTS_PATH: &str = "/api/products/bulk_products?page=1;per_page=500;";

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(MaybeUser(user)): Extension<MaybeUser>,
    Json(form): Json<dto::ProductForm>,
) -> axum::response::Response {
    let Some(user) = user else {
        return errors::found(errors::UNAUTHORIZED_PATH);
    };
    let new = match form.product.to_new_product() {
        Ok(new) => new,
        Err(field_errors) => return errors::validation_errors(StatusCode::OK, &field_errors),
    };

    let principal = services.principal(&user);
    match services.create_product(&principal, new) {
        Ok(_) if form.button.as_deref() == Some("add_another") => errors::found(NEW_PRODUCT_PATH),
        Ok(_) => errors::found(PRODUCTS_PATH),
        Err(e) => errors::admin_error_to_response(e),
    }
}

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(MaybeUser(user)): Extension<MaybeUser>,
    Path(id): Path<String>,
    Json(form): Json<dto::ProductPatchForm>,
) -> axum::response::Response {
    let Some(user) = user else {
        return errors::found(errors::UNAUTHORIZED_PATH);
    };
    let Some(product) = services.find_product(&id) else {
        return errors::admin_error_to_response(ServiceError::NotFound);
    };
    let changes = match form.product.to_changes() {
        Ok(changes) => changes,
        Err(field_errors) => return errors::validation_errors(StatusCode::OK, &field_errors),
    };

    let principal = services.principal(&user);
    match services.update_product(&principal, product.id_typed(), &changes) {
        Ok(updated) => errors::found(format!("{PRODUCTS_PATH}/{}/edit", updated.id_typed())),
        Err(e) => errors::admin_error_to_response(e),
    }
}

pub async fn delete_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(MaybeUser(user)): Extension<MaybeUser>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let Some(user) = user else {
        return errors::found(errors::UNAUTHORIZED_PATH);
    };

    let principal = services.principal(&user);
    match services.delete_product(&principal, &id) {
        Ok(()) => errors::found(PRODUCTS_PATH),
        Err(e) => errors::admin_error_to_response(e),
    }
}

pub async fn bulk_update(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(MaybeUser(user)): Extension<MaybeUser>,
    Json(form): Json<dto::BulkProductForm>,
) -> axum::response::Response {
    let Some(user) = user else {
        return errors::found(errors::UNAUTHORIZED_PATH);
    };

    let mut field_errors = FieldErrors::new();
    let mut entries = Vec::with_capacity(form.products.len());
    for (index, entry) in form.products.iter().enumerate() {
        let prefix = format!("products[{index}]");
        let product_id = dto::parse_id::<ProductId>(&format!("{prefix}.id"), &entry.id, &mut field_errors);
        match entry.attrs.to_changes() {
            Ok(changes) => {
                if let Some(product_id) = product_id {
                    entries.push((product_id, changes));
                }
            }
            Err(e) => field_errors.merge_prefixed(&prefix, e),
        }
    }
    if !field_errors.is_empty() {
        return errors::validation_errors(StatusCode::BAD_REQUEST, &field_errors);
    }

    let principal = services.principal(&user);
    match services.bulk_update(&principal, &entries) {
        Ok(()) => errors::found(BULK_PRODUCTS_PATH),
        Err(ServiceError::Validation(e)) => errors::validation_errors(StatusCode::BAD_REQUEST, &e),
        Err(e) => errors::admin_error_to_response(e),
    }
}
