use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use harvest_core::FieldErrors;

use crate::app::services::ServiceError;

pub const UNAUTHORIZED_MESSAGE: &str = "You are not authorized to perform that action.";

/// Where admin pages send callers lacking rights.
pub const UNAUTHORIZED_PATH: &str = "/unauthorized";

pub const LOGIN_PATH: &str = "/login";

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// 401 with the standard message.
pub fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, axum::Json(json!({ "error": UNAUTHORIZED_MESSAGE }))).into_response()
}

pub fn validation_errors(status: StatusCode, errors: &FieldErrors) -> Response {
    (status, axum::Json(json!({ "errors": errors }))).into_response()
}

/// 302 redirect.
pub fn found(location: impl Into<String>) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.into())]).into_response()
}

/// Mapping for JSON API routes.
pub fn service_error_to_response(err: ServiceError) -> Response {
    match err {
        ServiceError::Validation(errors) => validation_errors(StatusCode::UNPROCESSABLE_ENTITY, &errors),
        ServiceError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        ServiceError::Unauthorized(reason) => {
            tracing::debug!(%reason, "request not authorized");
            unauthorized()
        }
        ServiceError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        ServiceError::Internal(msg) => {
            tracing::error!(error = %msg, "internal error");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
        }
    }
}

/// Mapping for admin form routes: refusals redirect, invalid forms are
/// re-rendered (200) with their errors.
pub fn admin_error_to_response(err: ServiceError) -> Response {
    match err {
        ServiceError::Unauthorized(reason) => {
            tracing::debug!(%reason, "admin action not authorized");
            found(UNAUTHORIZED_PATH)
        }
        ServiceError::Validation(errors) => validation_errors(StatusCode::OK, &errors),
        other => service_error_to_response(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_unprocessable_entity() {
        let res = service_error_to_response(ServiceError::Validation(FieldErrors::single("name", "can't be blank")));
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn admin_refusals_redirect_to_the_unauthorized_page() {
        let res = admin_error_to_response(ServiceError::Unauthorized("not managed".to_string()));
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(res.headers()[header::LOCATION], UNAUTHORIZED_PATH);

        let res = admin_error_to_response(ServiceError::Validation(FieldErrors::single("name", "x")));
        assert_eq!(res.status(), StatusCode::OK);

        let res = admin_error_to_response(ServiceError::NotFound);
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
