use std::sync::Arc;

use axum::{
    extract::{Extension, RawQuery},
    response::IntoResponse,
    Json,
};

use harvest_infra::Page;

use crate::app::dto;
use crate::app::services::AppServices;
use crate::context::CurrentUser;

pub const BULK_MAX_PER_PAGE: u32 = 500;

/// `key=value` pairs separated by `&` or `;` (the bulk redirect uses `;`).
fn query_pairs(raw: Option<&str>) -> impl Iterator<Item = (&str, &str)> {
    raw.unwrap_or_default()
        .split(['&', ';'])
        .filter_map(|pair| pair.split_once('='))
}

/// Products the caller may edit, with their variants.
pub async fn bulk_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    RawQuery(query): RawQuery,
) -> impl IntoResponse {
    let (mut page, mut per_page) = (None, None);
    for (key, value) in query_pairs(query.as_deref()) {
        match key {
            "page" => page = value.parse().ok(),
            "per_page" => per_page = value.parse().ok(),
            _ => {}
        }
    }

    let principal = services.principal(&user);
    let products = services.bulk_products(&principal, Page::with_max(page, per_page, BULK_MAX_PER_PAGE));
    Json(dto::products_page_json(products))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semicolon_separated_queries_are_understood() {
        let pairs: Vec<_> = query_pairs(Some("page=1;per_page=500;")).collect();
        assert_eq!(pairs, vec![("page", "1"), ("per_page", "500")]);
        assert_eq!(query_pairs(None).count(), 0);
    }
}
