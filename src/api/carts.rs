//! Shopping cart endpoints.
//!
//! A cart is one row per user. Writes recompute the stored total and are
//! guarded on the `updated_at` value read at load, so two requests racing on
//! the same cart cannot silently lose an update.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{
    apply_quantity_delta, compute_total, merge_line, remove_line, AddCartItemRequest, Cart,
    CartItem, CartResponse, ChangeQuantityRequest, Product, User,
};
use crate::AppState;

use super::error::ApiError;
use super::validation::{validate_quantity, validate_uuid};
use super::MessageResponse;

async fn fetch_cart(pool: &sqlx::SqlitePool, user_id: &str) -> Result<Option<Cart>, sqlx::Error> {
    sqlx::query_as::<_, Cart>("SELECT * FROM carts WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

/// Persist mutated line items. An empty list deletes the cart row instead of
/// leaving it empty. Both writes are guarded on the timestamp read at load;
/// a lost race surfaces as Conflict rather than a silent overwrite.
async fn persist_cart(
    pool: &sqlx::SqlitePool,
    cart: &Cart,
    items: &[CartItem],
) -> Result<Cart, ApiError> {
    let now = Utc::now().to_rfc3339();

    let result = if items.is_empty() {
        sqlx::query("DELETE FROM carts WHERE id = ? AND updated_at = ?")
            .bind(&cart.id)
            .bind(&cart.updated_at)
            .execute(pool)
            .await?
    } else {
        let items_json = serde_json::to_string(items)
            .map_err(|_| ApiError::internal("Failed to serialize cart items"))?;
        sqlx::query(
            "UPDATE carts SET items = ?, total_price = ?, updated_at = ? WHERE id = ? AND updated_at = ?",
        )
        .bind(&items_json)
        .bind(compute_total(items))
        .bind(&now)
        .bind(&cart.id)
        .bind(&cart.updated_at)
        .execute(pool)
        .await?
    };

    if result.rows_affected() == 0 {
        return Err(ApiError::conflict(
            "Cart was modified by another request, retry",
        ));
    }

    let mut updated = cart.clone();
    updated.items = serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string());
    updated.total_price = compute_total(items);
    updated.updated_at = now;
    Ok(updated)
}

/// Add a product to the cart, creating the cart on first add. Re-adding a
/// product accumulates quantity; the price captured at first add stays.
///
/// POST /api/cart/items
pub async fn add_item(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<AddCartItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    validate_uuid(&req.product_id, "product_id")
        .map_err(|e| ApiError::validation_field("product_id", e))?;
    validate_quantity(req.quantity).map_err(|e| ApiError::validation_field("quantity", e))?;

    let product: Option<Product> = sqlx::query_as("SELECT * FROM products WHERE id = ?")
        .bind(&req.product_id)
        .fetch_optional(&state.db)
        .await?;
    let product = product.ok_or_else(|| ApiError::not_found("Product not found"))?;

    let line = CartItem::from_product(&product, req.quantity);

    match fetch_cart(&state.db, &user.id).await? {
        Some(cart) => {
            let mut items = cart.line_items();
            merge_line(&mut items, line);
            let cart = persist_cart(&state.db, &cart, &items).await?;
            Ok(Json(CartResponse::from(cart)))
        }
        None => {
            let items = vec![line];
            let items_json = serde_json::to_string(&items)
                .map_err(|_| ApiError::internal("Failed to serialize cart items"))?;
            let id = Uuid::new_v4().to_string();
            let now = Utc::now().to_rfc3339();

            sqlx::query(
                r#"
                INSERT INTO carts (id, user_id, items, total_price, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(&user.id)
            .bind(&items_json)
            .bind(compute_total(&items))
            .bind(&now)
            .bind(&now)
            .execute(&state.db)
            .await?;

            let cart = fetch_cart(&state.db, &user.id)
                .await?
                .ok_or_else(|| ApiError::internal("Cart creation failed"))?;
            Ok(Json(CartResponse::from(cart)))
        }
    }
}

/// GET /api/cart
pub async fn get_cart(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = fetch_cart(&state.db, &user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Cart not found"))?;
    Ok(Json(CartResponse::from(cart)))
}

/// Apply a positive or negative quantity delta to one line. A line at or
/// below zero is dropped; a cart with no lines left is deleted.
///
/// PATCH /api/cart/items
pub async fn change_quantity(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<ChangeQuantityRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    validate_uuid(&req.product_id, "product_id")
        .map_err(|e| ApiError::validation_field("product_id", e))?;
    if req.change == 0 {
        return Err(ApiError::validation_field("change", "Change must be non-zero"));
    }

    let cart = fetch_cart(&state.db, &user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Cart not found"))?;

    let mut items = cart.line_items();
    if !apply_quantity_delta(&mut items, &req.product_id, req.change) {
        return Err(ApiError::not_found("Item not found in the cart"));
    }

    let cart = persist_cart(&state.db, &cart, &items).await?;
    Ok(Json(CartResponse::from(cart)))
}

/// Remove one line; deletes the cart when it was the last one.
///
/// DELETE /api/cart/items/:product_id
pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(product_id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    validate_uuid(&product_id, "product_id")
        .map_err(|e| ApiError::validation_field("product_id", e))?;

    let cart = fetch_cart(&state.db, &user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Cart not found"))?;

    let mut items = cart.line_items();
    if !remove_line(&mut items, &product_id) {
        return Err(ApiError::not_found("Item not found in the cart"));
    }

    let cart = persist_cart(&state.db, &cart, &items).await?;
    Ok(Json(CartResponse::from(cart)))
}

/// Drop the cart outright.
///
/// DELETE /api/cart
pub async fn clear_cart(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<MessageResponse>, ApiError> {
    let result = sqlx::query("DELETE FROM carts WHERE user_id = ?")
        .bind(&user.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Cart not found"));
    }

    Ok(Json(MessageResponse::new("Cart cleared successfully")))
}
