use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use harvest_auth::Role;
use harvest_core::{FieldErrors, UserId};
use harvest_enterprises::EnterpriseId;

use crate::app::services::{AccountChanges, AppServices, ServiceError};
use crate::app::{dto, errors};
use crate::context::MaybeUser;

pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateUserRequest>,
) -> axum::response::Response {
    let user = body.user;
    match services.register_user(&user.email, &user.password, &user.password_confirmation) {
        Ok(created) => {
            tracing::info!(user_id = %created.id, "user signed up");
            errors::found("/")
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn registered_email(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RegisteredEmailRequest>,
) -> impl IntoResponse {
    Json(serde_json::json!({ "registered": services.is_registered(&body.email) }))
}

/// The signed-in user's completed orders, optionally for one shop.
pub async fn show_account(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(MaybeUser(user)): Extension<MaybeUser>,
    Query(query): Query<dto::AccountQuery>,
) -> axum::response::Response {
    let Some(user) = user else {
        return errors::found(errors::LOGIN_PATH);
    };

    let mut field_errors = FieldErrors::new();
    let distributor = query
        .distributor_id
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .and_then(|raw| dto::parse_id::<EnterpriseId>("distributor_id", raw, &mut field_errors));
    if !field_errors.is_empty() {
        return errors::validation_errors(StatusCode::UNPROCESSABLE_ENTITY, &field_errors);
    }

    match services.account_overview(user.user_id(), distributor) {
        Ok(overview) => Json(serde_json::json!({
            "user": dto::user_json(&overview.user),
            "orders": overview.orders.iter().map(dto::order_json).collect::<Vec<_>>(),
            "shops": overview.shops.iter().map(dto::enterprise_json).collect::<Vec<_>>(),
        }))
        .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_account(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(MaybeUser(user)): Extension<MaybeUser>,
    Json(body): Json<dto::AccountForm>,
) -> axum::response::Response {
    let Some(user) = user else {
        return errors::found(errors::LOGIN_PATH);
    };

    let changes = AccountChanges {
        email: body.user.email,
        password: body.user.password,
        password_confirmation: body.user.password_confirmation,
    };
    match services.update_account(user.user_id(), &changes) {
        Ok(_) => errors::found("/account"),
        Err(e) => errors::service_error_to_response(e),
    }
}

fn role_error(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Unauthorized(_) => errors::admin_error_to_response(err),
        other => errors::service_error_to_response(other),
    }
}

pub async fn assign_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(MaybeUser(user)): Extension<MaybeUser>,
    Path(id): Path<String>,
    Json(body): Json<dto::RoleRequest>,
) -> axum::response::Response {
    let Some(user) = user else {
        return errors::found(errors::UNAUTHORIZED_PATH);
    };
    let Ok(user_id) = id.parse::<UserId>() else {
        return errors::service_error_to_response(ServiceError::NotFound);
    };

    let principal = services.principal(&user);
    match services.assign_role(&principal, user_id, Role::new(body.role.trim().to_string())) {
        Ok(updated) => Json(dto::user_json(&updated)).into_response(),
        Err(e) => role_error(e),
    }
}

pub async fn revoke_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(MaybeUser(user)): Extension<MaybeUser>,
    Path((id, role)): Path<(String, String)>,
) -> axum::response::Response {
    let Some(user) = user else {
        return errors::found(errors::UNAUTHORIZED_PATH);
    };
    let Ok(user_id) = id.parse::<UserId>() else {
        return errors::service_error_to_response(ServiceError::NotFound);
    };

    let principal = services.principal(&user);
    match services.revoke_role(&principal, user_id, Role::new(role)) {
        Ok(updated) => Json(dto::user_json(&updated)).into_response(),
        Err(e) => role_error(e),
    }
}
