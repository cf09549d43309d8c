use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use harvest_auth::JwtValidator;

use crate::app::errors;
use crate::context::{CurrentUser, MaybeUser};

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
}

/// Require a valid bearer token; anything else is a 401.
pub async fn auth_middleware(State(state): State<AuthState>, mut req: Request, next: Next) -> Response {
    let Some(user) = current_user(&state, req.headers()) else {
        return errors::unauthorized();
    };

    req.extensions_mut().insert(user);
    next.run(req).await
}

/// Resolve the caller when a valid token is present, without rejecting.
///
/// Handlers behind this layer decide where an anonymous caller is sent.
pub async fn optional_auth_middleware(State(state): State<AuthState>, mut req: Request, next: Next) -> Response {
    let user = current_user(&state, req.headers());
    req.extensions_mut().insert(MaybeUser(user));
    next.run(req).await
}

pub async fn request_logging(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}

fn current_user(state: &AuthState, headers: &HeaderMap) -> Option<CurrentUser> {
    let token = extract_bearer(headers)?;
    let claims = state.jwt.validate(token, Utc::now()).ok()?;
    Some(CurrentUser::new(claims.sub, claims.roles))
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}
