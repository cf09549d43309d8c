//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: event store, dispatcher, projections and the use cases
//! - `routes/`: HTTP handlers, one file per resource
//! - `dto.rs`: request forms and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use harvest_auth::Hs256JwtValidator;

use crate::config::ApiConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::{AppServices, ServiceError};

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(config: ApiConfig) -> Result<Router, ServiceError> {
    let tokens = Arc::new(Hs256JwtValidator::new(config.jwt_secret.as_bytes()));
    let services = Arc::new(AppServices::in_memory(tokens.clone(), config.token_ttl));

    if let Some(admin) = &config.bootstrap_admin {
        services.bootstrap_admin(&admin.email, &admin.password)?;
    }

    Ok(router(services, middleware::AuthState { jwt: tokens }))
}

/// Assemble the router around existing services.
pub fn router(services: Arc<AppServices>, auth_state: middleware::AuthState) -> Router {
    let browser = routes::browser_router().layer(axum::middleware::from_fn_with_state(
        auth_state.clone(),
        middleware::optional_auth_middleware,
    ));
    let api = routes::api_router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    Router::new()
        .merge(routes::public_router())
        .merge(browser)
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(middleware::request_logging))
                .layer(Extension(services)),
        )
}
