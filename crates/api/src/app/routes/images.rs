use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::header,
    response::IntoResponse,
};

use harvest_catalog::ImageId;

use crate::app::errors;
use crate::app::services::{AppServices, ServiceError};

/// Raw image bytes with the content type detected at upload.
pub async fn show_image(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let attachment = id.parse::<ImageId>().ok().and_then(|id| services.image(id));
    match attachment {
        Some(file) => ([(header::CONTENT_TYPE, file.content_type)], file.bytes).into_response(),
        None => errors::service_error_to_response(ServiceError::NotFound),
    }
}
