use axum::{
    routing::{delete, get, post, put},
    Router,
};

pub mod admin_products;
pub mod catalog_meta;
pub mod enterprises;
pub mod images;
pub mod orders;
pub mod product_images;
pub mod products;
pub mod sessions;
pub mod system;
pub mod users;
pub mod variants;

/// Routes that never look at the caller.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/unauthorized", get(system::unauthorized))
        .route("/login", post(sessions::login))
        .route("/users", post(users::create_user))
        .route("/user/registered_email", post(users::registered_email))
        .route("/images/:id", get(images::show_image))
}

/// Admin and account pages: the caller is optional and handlers redirect
/// anonymous or unauthorised requests.
pub fn browser_router() -> Router {
    Router::new()
        .route("/account", get(users::show_account).put(users::update_account))
        .route("/admin/enterprises", post(enterprises::register_enterprise))
        .route("/admin/enterprises/:id/managers", post(enterprises::add_manager))
        .route(
            "/admin/enterprises/:id/managers/:user_id",
            delete(enterprises::remove_manager),
        )
        .route("/admin/users/:id/roles", post(users::assign_role))
        .route("/admin/users/:id/roles/:role", delete(users::revoke_role))
        .route("/admin/products", post(admin_products::create_product))
        .route("/admin/products/bulk_update", post(admin_products::bulk_update))
        .route(
            "/admin/products/:id",
            put(admin_products::update_product).delete(admin_products::delete_product),
        )
}

/// Token-authenticated JSON endpoints, mounted under `/api`.
pub fn api_router() -> Router {
    Router::new()
        .route("/products/bulk_products", get(products::bulk_products))
        .route("/products/:product_id/variants", post(variants::create_product_variant))
        .route(
            "/products/:product_id/variants/:variant_id/soft_delete",
            delete(variants::soft_delete_variant),
        )
        .route("/product_images/:product_id", post(product_images::update_product_image))
        .route("/variants", get(variants::list_variants).post(variants::create_variant))
        .route("/variants/new", get(variants::new_variant))
        .route(
            "/variants/:id",
            get(variants::show_variant)
                .put(variants::update_variant)
                .delete(variants::destroy_variant),
        )
        .route("/option_types", post(catalog_meta::create_option_type))
        .route("/properties", post(catalog_meta::create_property))
        .route("/orders", post(orders::create_order))
        .route("/orders/:id/complete", post(orders::complete_order))
}
