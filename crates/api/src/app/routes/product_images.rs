use std::sync::Arc;

use axum::{
    extract::{Extension, Multipart, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::app::services::{AppServices, ServiceError, Upload};
use crate::app::{dto, errors};
use crate::context::CurrentUser;

/// Read the `file` part (and optional `alt`) of an upload form.
async fn read_upload(mut multipart: Multipart) -> Result<Upload, ServiceError> {
    let mut upload = Upload::default();
    let mut has_file = false;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(ServiceError::validation("file", e.body_text())),
        };
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                upload.file_name = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServiceError::validation("file", e.body_text()))?;
                upload.bytes = bytes.to_vec();
                has_file = true;
            }
            Some("alt") => {
                upload.alt = field.text().await.ok().filter(|alt| !alt.trim().is_empty());
            }
            _ => {}
        }
    }

    if !has_file {
        return Err(ServiceError::validation("file", "can't be blank"));
    }
    Ok(upload)
}

/// Attach the product's image, or replace the one it already has.
pub async fn update_product_image(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Path(product_id): Path<String>,
    multipart: Multipart,
) -> axum::response::Response {
    let Some(product) = services.find_product(&product_id) else {
        return errors::service_error_to_response(ServiceError::NotFound);
    };
    let upload = match read_upload(multipart).await {
        Ok(upload) => upload,
        Err(e) => return errors::service_error_to_response(e),
    };

    let principal = services.principal(&user);
    match services.upload_product_image(&principal, product.id_typed(), upload) {
        Ok((image, created)) => {
            let status = if created { StatusCode::CREATED } else { StatusCode::OK };
            tracing::info!(product_id = %product.id_typed(), image_id = %image.id, created, "product image stored");
            (status, Json(dto::image_json(&image))).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}
