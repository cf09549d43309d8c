use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use harvest_core::{FieldErrors, UserId};
use harvest_enterprises::EnterpriseId;

use crate::app::services::{AppServices, NewEnterprise, ServiceError};
use crate::app::{dto, errors};
use crate::context::MaybeUser;

fn enterprise_error(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Unauthorized(_) => errors::admin_error_to_response(err),
        other => errors::service_error_to_response(other),
    }
}

pub async fn register_enterprise(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(MaybeUser(user)): Extension<MaybeUser>,
    Json(body): Json<dto::RegisterEnterpriseRequest>,
) -> axum::response::Response {
    let Some(user) = user else {
        return errors::found(errors::UNAUTHORIZED_PATH);
    };

    let mut field_errors = FieldErrors::new();
    let Some(owner) = dto::parse_id::<UserId>("owner_id", &body.owner_id, &mut field_errors) else {
        return errors::validation_errors(StatusCode::UNPROCESSABLE_ENTITY, &field_errors);
    };

    let principal = services.principal(&user);
    let new = NewEnterprise {
        name: body.name,
        owner,
        is_primary_producer: body.is_primary_producer,
        sells: body.sells,
    };
    match services.register_enterprise(&principal, new) {
        Ok(enterprise) => (StatusCode::CREATED, Json(dto::enterprise_json(&enterprise))).into_response(),
        Err(e) => enterprise_error(e),
    }
}

pub async fn add_manager(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(MaybeUser(user)): Extension<MaybeUser>,
    Path(id): Path<String>,
    Json(body): Json<dto::AddManagerRequest>,
) -> axum::response::Response {
    let Some(user) = user else {
        return errors::found(errors::UNAUTHORIZED_PATH);
    };
    let Ok(enterprise_id) = id.parse::<EnterpriseId>() else {
        return errors::service_error_to_response(ServiceError::NotFound);
    };

    let mut field_errors = FieldErrors::new();
    let Some(manager) = dto::parse_id::<UserId>("user_id", &body.user_id, &mut field_errors) else {
        return errors::validation_errors(StatusCode::UNPROCESSABLE_ENTITY, &field_errors);
    };

    let principal = services.principal(&user);
    match services.add_manager(&principal, enterprise_id, manager) {
        Ok(enterprise) => Json(dto::enterprise_json(&enterprise)).into_response(),
        Err(e) => enterprise_error(e),
    }
}

pub async fn remove_manager(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(MaybeUser(user)): Extension<MaybeUser>,
    Path((id, user_id)): Path<(String, String)>,
) -> axum::response::Response {
    let Some(user) = user else {
        return errors::found(errors::UNAUTHORIZED_PATH);
    };
    let (Ok(enterprise_id), Ok(manager)) = (id.parse::<EnterpriseId>(), user_id.parse::<UserId>()) else {
        return errors::service_error_to_response(ServiceError::NotFound);
    };

    let principal = services.principal(&user);
    match services.remove_manager(&principal, enterprise_id, manager) {
        Ok(enterprise) => Json(dto::enterprise_json(&enterprise)).into_response(),
        Err(e) => enterprise_error(e),
    }
}
