pub mod auth;
mod carts;
pub mod error;
mod offers;
mod orders;
pub mod policy;
mod products;
mod ratings;
mod upload;
mod users;
mod validation;

use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

/// Plain acknowledgement body for endpoints with nothing else to return
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (public, plus token-consuming workflow endpoints)
    let auth_routes = Router::new()
        .route("/register", post(users::register))
        .route("/login", post(users::login))
        .route("/logout", post(users::logout))
        .route("/refresh", post(users::refresh))
        .route("/change-password", post(users::change_password))
        .route("/verify-email/:token", post(users::verify_email))
        .route("/forgot-password", post(users::forgot_password))
        .route("/reset-password/:token", post(users::reset_password))
        .route(
            "/delete-account/:token",
            delete(users::confirm_account_deletion),
        );

    // Profile routes (auth via the User extractor)
    let user_routes = Router::new()
        .route("/me", get(users::current_user))
        .route("/me", patch(users::update_account))
        .route("/me/avatar", put(users::update_avatar))
        .route("/me/address", put(users::update_address))
        .route("/resend-verification", post(users::resend_verification))
        .route("/me/delete-request", post(users::request_account_deletion));

    let product_routes = Router::new()
        .route("/", get(products::list_products))
        .route("/", post(products::add_product))
        .route("/:id", get(products::get_product))
        .route("/:id", patch(products::update_product))
        .route("/:id", delete(products::delete_product));

    let cart_routes = Router::new()
        .route("/", get(carts::get_cart))
        .route("/", delete(carts::clear_cart))
        .route("/items", post(carts::add_item))
        .route("/items", patch(carts::change_quantity))
        .route("/items/:product_id", delete(carts::remove_item));

    let order_routes = Router::new()
        .route("/", post(orders::create_order))
        .route("/", get(orders::get_user_orders))
        .route("/all", get(orders::list_all_orders))
        .route("/:id", get(orders::get_single_order))
        .route("/:id", delete(orders::cancel_order))
        .route("/:id/status", patch(orders::update_order_status));

    let offer_routes = Router::new()
        .route("/", post(offers::create_offer))
        .route("/active", get(offers::list_active_offers))
        .route("/:id", put(offers::update_offer))
        .route("/:id", delete(offers::delete_offer));

    let rating_routes = Router::new()
        .route("/", post(ratings::add_rating))
        .route("/", put(ratings::update_rating))
        .route("/:product_id", delete(ratings::delete_rating))
        .route("/product/:product_id", get(ratings::get_product_ratings));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_routes)
        .nest("/api/users", user_routes)
        .nest("/api/products", product_routes)
        .nest("/api/cart", cart_routes)
        .nest("/api/orders", order_routes)
        .nest("/api/offers", offer_routes)
        .nest("/api/ratings", rating_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
