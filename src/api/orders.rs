//! Order endpoints: creation from the cart, lifecycle updates, cancellation
//! and listings.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{
    compute_totals, Cart, CreateOrderRequest, Offer, Order, OrderFilterQuery, OrderItem,
    OrderResponse, OrderStatus, PaymentStatus, UpdateOrderStatusRequest, User,
};
use crate::AppState;

use super::error::ApiError;
use super::policy::{authorize, Operation};
use super::validation::validate_uuid;
use super::MessageResponse;

async fn fetch_order(pool: &sqlx::SqlitePool, id: &str) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Load the offers applied to an order, preserving their discount rates
async fn fetch_offers(pool: &sqlx::SqlitePool, ids: &[String]) -> Result<Vec<Offer>, ApiError> {
    let mut offers = Vec::with_capacity(ids.len());
    for id in ids {
        let offer: Option<Offer> = sqlx::query_as("SELECT * FROM offers WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        offers.push(offer.ok_or_else(|| ApiError::not_found("Offer not found"))?);
    }
    Ok(offers)
}

/// Convert the caller's cart into an immutable order.
///
/// The order row is inserted first and the cart deleted after: a crash in
/// between leaves a stale cart to clean up, never a paid-for order missing.
///
/// POST /api/orders
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    for offer_id in &req.offers {
        validate_uuid(offer_id, "offer_id")
            .map_err(|e| ApiError::validation_field("offer_id", e))?;
    }

    let cart: Option<Cart> = sqlx::query_as("SELECT * FROM carts WHERE user_id = ?")
        .bind(&user.id)
        .fetch_optional(&state.db)
        .await?;
    let cart = match cart {
        Some(cart) if !cart.line_items().is_empty() => cart,
        _ => {
            return Err(ApiError::validation_field(
                "cart",
                "No items in the cart",
            ))
        }
    };

    let offers = fetch_offers(&state.db, &req.offers).await?;
    let discount_percents: Vec<f64> = offers.iter().map(|o| o.discount_percent).collect();

    let items: Vec<OrderItem> = cart.line_items().into_iter().map(OrderItem::from).collect();
    let (total_price, total_payable) = compute_totals(&items, &discount_percents);

    let items_json = serde_json::to_string(&items)
        .map_err(|_| ApiError::internal("Failed to serialize order items"))?;
    let address_json = serde_json::to_string(&user.address())
        .map_err(|_| ApiError::internal("Failed to serialize shipping address"))?;
    let offers_json = serde_json::to_string(&req.offers)
        .map_err(|_| ApiError::internal("Failed to serialize offer references"))?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO orders (
            id, customer_id, items, shipping_address, offers,
            order_status, total_price, total_payable_amount, payment_status,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&user.id)
    .bind(&items_json)
    .bind(&address_json)
    .bind(&offers_json)
    .bind(OrderStatus::Confirmed.to_string())
    .bind(total_price)
    .bind(total_payable)
    .bind(PaymentStatus::Pending.to_string())
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    // Cart consumption happens only after the order row exists
    sqlx::query("DELETE FROM carts WHERE id = ?")
        .bind(&cart.id)
        .execute(&state.db)
        .await?;

    let order = fetch_order(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::internal("Order creation failed"))?;

    tracing::info!(order_id = %order.id, customer_id = %user.id, total = total_payable, "Order created");

    Ok((StatusCode::CREATED, Json(OrderResponse::from(order))))
}

/// GET /api/orders
pub async fn get_user_orders(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders: Vec<Order> =
        sqlx::query_as("SELECT * FROM orders WHERE customer_id = ? ORDER BY created_at DESC")
            .bind(&user.id)
            .fetch_all(&state.db)
            .await?;

    if orders.is_empty() {
        return Err(ApiError::not_found("No orders found"));
    }

    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

/// GET /api/orders/:id
pub async fn get_single_order(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    validate_uuid(&id, "order_id").map_err(|e| ApiError::validation_field("order_id", e))?;

    let order: Option<Order> =
        sqlx::query_as("SELECT * FROM orders WHERE id = ? AND customer_id = ?")
            .bind(&id)
            .bind(&user.id)
            .fetch_optional(&state.db)
            .await?;
    let order = order.ok_or_else(|| ApiError::not_found("Order not found"))?;

    Ok(Json(OrderResponse::from(order)))
}

/// Cancel (hard-delete) an order that has not shipped yet.
///
/// DELETE /api/orders/:id
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    validate_uuid(&id, "order_id").map_err(|e| ApiError::validation_field("order_id", e))?;

    let order: Option<Order> =
        sqlx::query_as("SELECT * FROM orders WHERE id = ? AND customer_id = ?")
            .bind(&id)
            .bind(&user.id)
            .fetch_optional(&state.db)
            .await?;
    let order = order.ok_or_else(|| ApiError::not_found("Order not found"))?;

    let status = order
        .status_enum()
        .map_err(|_| ApiError::internal("Order has an unknown status"))?;
    if !status.is_cancellable() {
        return Err(ApiError::conflict(
            "Order has already shipped and cannot be cancelled",
        ));
    }

    sqlx::query("DELETE FROM orders WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    tracing::info!(order_id = %id, customer_id = %user.id, "Order cancelled");

    Ok(Json(MessageResponse::new("Order cancelled successfully")))
}

/// Set fulfilment (and optionally payment) status. Totals are recomputed on
/// every save so the stored payable amount can never drift from the items
/// and offers on the row.
///
/// PATCH /api/orders/:id/status
pub async fn update_order_status(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(req): Json<UpdateOrderStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    authorize(user.role_enum(), Operation::UpdateOrderStatus)?;
    validate_uuid(&id, "order_id").map_err(|e| ApiError::validation_field("order_id", e))?;

    let status: OrderStatus = req
        .order_status
        .parse()
        .map_err(|e: String| ApiError::validation_field("order_status", e))?;
    let payment_status: Option<PaymentStatus> = match &req.payment_status {
        Some(raw) => Some(
            raw.parse()
                .map_err(|e: String| ApiError::validation_field("payment_status", e))?,
        ),
        None => None,
    };

    let order = fetch_order(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    let offers = fetch_offers(&state.db, &order.applied_offer_ids()).await?;
    let discount_percents: Vec<f64> = offers.iter().map(|o| o.discount_percent).collect();
    let (total_price, total_payable) = compute_totals(&order.line_items(), &discount_percents);

    let payment_status = payment_status
        .map(|p| p.to_string())
        .unwrap_or(order.payment_status);

    sqlx::query(
        r#"
        UPDATE orders
        SET order_status = ?, payment_status = ?,
            total_price = ?, total_payable_amount = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(status.to_string())
    .bind(&payment_status)
    .bind(total_price)
    .bind(total_payable)
    .bind(Utc::now().to_rfc3339())
    .bind(&id)
    .execute(&state.db)
    .await?;

    let order = fetch_order(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    Ok(Json(OrderResponse::from(order)))
}

/// Admin listing across all customers; at least one filter is required.
///
/// GET /api/orders/all
pub async fn list_all_orders(
    State(state): State<Arc<AppState>>,
    user: User,
    Query(filter): Query<OrderFilterQuery>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    authorize(user.role_enum(), Operation::ListAllOrders)?;

    if filter.is_empty() {
        return Err(ApiError::validation_field(
            "filter",
            "Provide at least one filter: customer, order_status or date",
        ));
    }
    if let Some(ref customer) = filter.customer {
        validate_uuid(customer, "customer")
            .map_err(|e| ApiError::validation_field("customer", e))?;
    }
    if let Some(ref status) = filter.order_status {
        status
            .parse::<OrderStatus>()
            .map_err(|e| ApiError::validation_field("order_status", e))?;
    }

    let mut sql = String::from("SELECT * FROM orders WHERE 1 = 1");
    if filter.customer.is_some() {
        sql.push_str(" AND customer_id = ?");
    }
    if filter.order_status.is_some() {
        sql.push_str(" AND order_status = ?");
    }
    if filter.date.is_some() {
        sql.push_str(" AND DATE(created_at) = ?");
    }
    sql.push_str(" ORDER BY created_at DESC");

    let mut query = sqlx::query_as::<_, Order>(&sql);
    if let Some(ref customer) = filter.customer {
        query = query.bind(customer);
    }
    if let Some(ref status) = filter.order_status {
        query = query.bind(status);
    }
    if let Some(ref date) = filter.date {
        query = query.bind(date);
    }

    let orders = query.fetch_all(&state.db).await?;

    if orders.is_empty() {
        return Err(ApiError::not_found("No orders found for the given filters"));
    }

    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}
