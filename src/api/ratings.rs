//! Product rating endpoints.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{
    average_stars, ProductRatingSummary, Rating, ReviewEntry, ReviewImage, UpdateRatingRequest,
    User,
};
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};
use super::policy::{authorize, Operation};
use super::upload::collect_multipart;
use super::validation::{validate_stars, validate_uuid};
use super::MessageResponse;

/// Rate a product. Multipart: product_id, stars, review_text plus at least
/// one `images` file. One rating per (product, reviewer) pair.
///
/// POST /api/ratings
pub async fn add_rating(
    State(state): State<Arc<AppState>>,
    user: User,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Rating>), ApiError> {
    authorize(user.role_enum(), Operation::WriteRating)?;

    let form = collect_multipart(multipart).await?;

    let product_id = form.field("product_id").unwrap_or_default().to_string();
    let stars: Option<i64> = form.field("stars").and_then(|v| v.parse().ok());
    let review_text = form
        .field("review_text")
        .unwrap_or_default()
        .trim()
        .to_string();

    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_uuid(&product_id, "product_id") {
        errors.add("product_id", e);
    }
    match stars {
        Some(stars) => {
            if let Err(e) = validate_stars(stars) {
                errors.add("stars", e);
            }
        }
        None => {
            errors.add("stars", "Stars are required");
        }
    }
    if review_text.is_empty() {
        errors.add("review_text", "Review text is required");
    }
    let images = form.files_named("images");
    if images.is_empty() {
        errors.add("images", "Provide at least one review image");
    }
    errors.finish()?;
    let stars = stars.unwrap();

    // Pre-check for readability; the unique index on (product_id, reviewed_by)
    // still closes the check-then-insert race
    let existing: Option<(String,)> =
        sqlx::query_as("SELECT id FROM ratings WHERE product_id = ? AND reviewed_by = ?")
            .bind(&product_id)
            .bind(&user.id)
            .fetch_optional(&state.db)
            .await?;
    if existing.is_some() {
        return Err(ApiError::conflict("You have already rated this product"));
    }

    let mut stored = Vec::new();
    for image in images {
        match state
            .storage
            .store(image.data.clone(), &image.file_name, "reviews")
            .await
        {
            Ok(object) => stored.push(object),
            Err(e) => {
                tracing::error!(error = %e, "Review image upload failed");
                for object in &stored {
                    state.storage.remove(&object.public_id).await;
                }
                return Err(ApiError::external_service("Review image upload failed"));
            }
        }
    }

    let review_images: Vec<ReviewImage> = stored
        .iter()
        .map(|o| ReviewImage {
            image_url: o.url.clone(),
            image_public_id: o.public_id.clone(),
        })
        .collect();
    let review_images_json = serde_json::to_string(&review_images)
        .map_err(|_| ApiError::internal("Failed to serialize review images"))?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    let inserted = sqlx::query(
        r#"
        INSERT INTO ratings (
            id, product_id, reviewed_by, stars, review_text, review_images,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&product_id)
    .bind(&user.id)
    .bind(stars)
    .bind(&review_text)
    .bind(&review_images_json)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await;

    if let Err(e) = inserted {
        for object in &stored {
            state.storage.remove(&object.public_id).await;
        }
        let err: ApiError = e.into();
        // Surface the closed race the same way the pre-check does
        return if err.status() == axum::http::StatusCode::CONFLICT {
            Err(ApiError::conflict("You have already rated this product"))
        } else {
            Err(err)
        };
    }

    let rating: Rating = sqlx::query_as("SELECT * FROM ratings WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    tracing::info!(rating_id = %rating.id, product_id = %product_id, "Rating added");

    Ok((StatusCode::CREATED, Json(rating)))
}

/// Update the caller's rating of a product.
///
/// PUT /api/ratings
pub async fn update_rating(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<UpdateRatingRequest>,
) -> Result<Json<Rating>, ApiError> {
    authorize(user.role_enum(), Operation::WriteRating)?;

    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_uuid(&req.product_id, "product_id") {
        errors.add("product_id", e);
    }
    if let Err(e) = validate_stars(req.stars) {
        errors.add("stars", e);
    }
    if req.review_text.trim().is_empty() {
        errors.add("review_text", "Review text is required");
    }
    errors.finish()?;

    let result = sqlx::query(
        "UPDATE ratings SET stars = ?, review_text = ?, updated_at = ? WHERE product_id = ? AND reviewed_by = ?",
    )
    .bind(req.stars)
    .bind(req.review_text.trim())
    .bind(Utc::now().to_rfc3339())
    .bind(&req.product_id)
    .bind(&user.id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("You have not rated this product"));
    }

    let rating: Rating =
        sqlx::query_as("SELECT * FROM ratings WHERE product_id = ? AND reviewed_by = ?")
            .bind(&req.product_id)
            .bind(&user.id)
            .fetch_one(&state.db)
            .await?;

    Ok(Json(rating))
}

/// Delete the caller's rating of a product.
///
/// DELETE /api/ratings/:product_id
pub async fn delete_rating(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(product_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    validate_uuid(&product_id, "product_id")
        .map_err(|e| ApiError::validation_field("product_id", e))?;

    let rating: Option<Rating> =
        sqlx::query_as("SELECT * FROM ratings WHERE product_id = ? AND reviewed_by = ?")
            .bind(&product_id)
            .bind(&user.id)
            .fetch_optional(&state.db)
            .await?;
    let rating =
        rating.ok_or_else(|| ApiError::not_found("You have not rated this product"))?;

    sqlx::query("DELETE FROM ratings WHERE id = ?")
        .bind(&rating.id)
        .execute(&state.db)
        .await?;

    for image in rating.images() {
        state.storage.remove(&image.image_public_id).await;
    }

    Ok(Json(MessageResponse::new("Rating deleted successfully")))
}

/// Aggregate view of a product's ratings: average stars (1 decimal), count
/// and the denormalized review list. No ratings means 404, not a zero
/// average.
///
/// GET /api/ratings/product/:product_id
pub async fn get_product_ratings(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<String>,
) -> Result<Json<ProductRatingSummary>, ApiError> {
    validate_uuid(&product_id, "product_id")
        .map_err(|e| ApiError::validation_field("product_id", e))?;

    let ratings: Vec<Rating> =
        sqlx::query_as("SELECT * FROM ratings WHERE product_id = ? ORDER BY created_at DESC")
            .bind(&product_id)
            .fetch_all(&state.db)
            .await?;

    if ratings.is_empty() {
        return Err(ApiError::not_found("No ratings found for this product"));
    }

    let average_rating = average_stars(&ratings);
    let total_ratings = ratings.len() as i64;
    let reviews: Vec<ReviewEntry> = ratings.into_iter().map(ReviewEntry::from).collect();

    Ok(Json(ProductRatingSummary {
        product_id,
        average_rating,
        total_ratings,
        reviews,
    }))
}
