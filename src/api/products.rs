//! Catalog endpoints.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{
    derive_availability, Product, ProductFilterQuery, ProductResponse, UpdateProductRequest, User,
    UserRole,
};
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};
use super::policy::{authorize, Operation};
use super::upload::collect_multipart;
use super::validation::{validate_price, validate_uuid};
use super::MessageResponse;

async fn fetch_product(pool: &sqlx::SqlitePool, id: &str) -> Result<Product, ApiError> {
    let product: Option<Product> = sqlx::query_as("SELECT * FROM products WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    product.ok_or_else(|| ApiError::not_found("Product not found"))
}

/// Create a catalog entry. Multipart: descriptive fields plus at least one
/// `images` file.
///
/// POST /api/products
pub async fn add_product(
    State(state): State<Arc<AppState>>,
    user: User,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    authorize(user.role_enum(), Operation::CreateProduct)?;

    let form = collect_multipart(multipart).await?;

    let label = form.field("label").unwrap_or_default().trim().to_string();
    let category = form.field("category").unwrap_or_default().trim().to_string();
    let price: Option<f64> = form.field("price").and_then(|v| v.parse().ok());
    let stock: Option<i64> = form.field("stock").and_then(|v| v.parse().ok());
    let warranty_months: i64 = form
        .field("warranty_months")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let mut errors = ValidationErrorBuilder::new();
    if label.is_empty() {
        errors.add("label", "Label is required");
    }
    if category.is_empty() {
        errors.add("category", "Category is required");
    }
    match price {
        Some(p) => {
            if let Err(e) = validate_price(p) {
                errors.add("price", e);
            }
        }
        None => {
            errors.add("price", "Price is required");
        }
    }
    if stock.is_none() {
        errors.add("stock", "Stock is required");
    }
    let images = form.files_named("images");
    if images.is_empty() {
        errors.add("images", "Provide at least one product image");
    }
    errors.finish()?;

    let (price, stock) = (price.unwrap(), stock.unwrap());

    // Upload all images; roll back the ones already stored if any fails
    let mut stored = Vec::new();
    for image in images {
        match state
            .storage
            .store(image.data.clone(), &image.file_name, "products")
            .await
        {
            Ok(object) => stored.push(object),
            Err(e) => {
                tracing::error!(error = %e, "Product image upload failed");
                for object in &stored {
                    state.storage.remove(&object.public_id).await;
                }
                return Err(ApiError::external_service("Product image upload failed"));
            }
        }
    }

    let images_url =
        serde_json::to_string(&stored.iter().map(|o| o.url.clone()).collect::<Vec<_>>())
            .unwrap_or_else(|_| "[]".to_string());
    let images_public_id =
        serde_json::to_string(&stored.iter().map(|o| o.public_id.clone()).collect::<Vec<_>>())
            .unwrap_or_else(|_| "[]".to_string());

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    let inserted = sqlx::query(
        r#"
        INSERT INTO products (
            id, label, color, size, material, category, brand, seller_id,
            price, stock, is_available, images_url, images_public_id,
            warranty_months, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&label)
    .bind(form.field("color"))
    .bind(form.field("size"))
    .bind(form.field("material"))
    .bind(&category)
    .bind(form.field("brand"))
    .bind(&user.id)
    .bind(price)
    .bind(stock)
    .bind(derive_availability(stock))
    .bind(&images_url)
    .bind(&images_public_id)
    .bind(warranty_months)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await;

    if let Err(e) = inserted {
        for object in &stored {
            state.storage.remove(&object.public_id).await;
        }
        return Err(e.into());
    }

    let product = fetch_product(&state.db, &id).await?;

    tracing::info!(product_id = %product.id, seller_id = %user.id, "Product created");

    Ok((StatusCode::CREATED, Json(ProductResponse::from(product))))
}

/// Exact-match catalog search; at least one filter is required.
///
/// GET /api/products
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ProductFilterQuery>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    if filter.is_empty() {
        return Err(ApiError::validation_field(
            "filter",
            "Provide at least one filter: label, category, brand, seller or price",
        ));
    }

    let mut sql = String::from("SELECT * FROM products WHERE 1 = 1");
    if filter.label.is_some() {
        sql.push_str(" AND label = ?");
    }
    if filter.category.is_some() {
        sql.push_str(" AND category = ?");
    }
    if filter.brand.is_some() {
        sql.push_str(" AND brand = ?");
    }
    if filter.seller.is_some() {
        sql.push_str(" AND seller_id = ?");
    }
    if filter.price.is_some() {
        sql.push_str(" AND price = ?");
    }
    sql.push_str(" ORDER BY created_at DESC");

    let mut query = sqlx::query_as::<_, Product>(&sql);
    if let Some(ref label) = filter.label {
        query = query.bind(label);
    }
    if let Some(ref category) = filter.category {
        query = query.bind(category);
    }
    if let Some(ref brand) = filter.brand {
        query = query.bind(brand);
    }
    if let Some(ref seller) = filter.seller {
        query = query.bind(seller);
    }
    if let Some(price) = filter.price {
        query = query.bind(price);
    }

    let products = query.fetch_all(&state.db).await?;

    if products.is_empty() {
        return Err(ApiError::not_found("No products found for the given filters"));
    }

    Ok(Json(products.into_iter().map(ProductResponse::from).collect()))
}

/// GET /api/products/:id
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    validate_uuid(&id, "product_id").map_err(|e| ApiError::validation_field("product_id", e))?;
    let product = fetch_product(&state.db, &id).await?;
    Ok(Json(ProductResponse::from(product)))
}

/// Update price, stock or availability. Sellers may only touch their own
/// products; availability is re-derived whenever stock changes.
///
/// PATCH /api/products/:id
pub async fn update_product(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    authorize(user.role_enum(), Operation::UpdateProduct)?;
    validate_uuid(&id, "product_id").map_err(|e| ApiError::validation_field("product_id", e))?;

    if req.price.is_none() && req.stock.is_none() && req.is_available.is_none() {
        return Err(ApiError::validation_field(
            "price",
            "Provide at least one field to update",
        ));
    }
    if let Some(price) = req.price {
        validate_price(price).map_err(|e| ApiError::validation_field("price", e))?;
    }

    let product = fetch_product(&state.db, &id).await?;
    if user.role_enum() == UserRole::Seller && product.seller_id.as_deref() != Some(user.id.as_str())
    {
        return Err(ApiError::not_found("Product not found"));
    }

    let price = req.price.unwrap_or(product.price);
    let stock = req.stock.unwrap_or(product.stock);
    // Stock is authoritative: an explicit availability flag only survives
    // when the stock count itself was not touched
    let is_available = match (req.stock, req.is_available) {
        (Some(stock), _) => derive_availability(stock),
        (None, Some(flag)) => flag,
        (None, None) => product.is_available,
    };

    sqlx::query(
        "UPDATE products SET price = ?, stock = ?, is_available = ?, updated_at = ? WHERE id = ?",
    )
    .bind(price)
    .bind(stock)
    .bind(is_available)
    .bind(Utc::now().to_rfc3339())
    .bind(&id)
    .execute(&state.db)
    .await?;

    let product = fetch_product(&state.db, &id).await?;
    Ok(Json(ProductResponse::from(product)))
}

/// Remove a catalog entry and its stored images.
///
/// DELETE /api/products/:id
pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    authorize(user.role_enum(), Operation::DeleteProduct)?;
    validate_uuid(&id, "product_id").map_err(|e| ApiError::validation_field("product_id", e))?;

    let product = fetch_product(&state.db, &id).await?;
    if user.role_enum() == UserRole::Seller && product.seller_id.as_deref() != Some(user.id.as_str())
    {
        return Err(ApiError::not_found("Product not found"));
    }

    sqlx::query("DELETE FROM products WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    for public_id in product.image_public_ids() {
        state.storage.remove(&public_id).await;
    }

    tracing::info!(product_id = %id, "Product deleted");

    Ok(Json(MessageResponse::new("Product deleted successfully")))
}
