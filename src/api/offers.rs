//! Promotional offer endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{CreateOfferRequest, Offer, OfferIssuerRole, User, UserRole};
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};
use super::policy::{authorize, Operation};
use super::validation::{validate_discount_percent, validate_future_expiry, validate_uuid};
use super::MessageResponse;

struct ValidatedOffer {
    statement: String,
    discount_percent: f64,
    expires_at: String,
}

fn validate_offer_payload(req: &CreateOfferRequest) -> Result<ValidatedOffer, ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    let statement = req
        .statement
        .as_deref()
        .unwrap_or_default()
        .trim()
        .to_string();
    if statement.is_empty() {
        errors.add("statement", "Statement is required");
    }

    let discount_percent = req.discount_percent;
    match discount_percent {
        Some(percent) => {
            if let Err(e) = validate_discount_percent(percent) {
                errors.add("discount_percent", e);
            }
        }
        None => {
            errors.add("discount_percent", "Discount percent is required");
        }
    }

    let mut expires_at = None;
    match req.expires_at.as_deref() {
        Some(raw) => match validate_future_expiry(raw, Utc::now()) {
            Ok(parsed) => expires_at = Some(parsed.to_rfc3339()),
            Err(e) => {
                errors.add("expires_at", e);
            }
        },
        None => {
            errors.add("expires_at", "Expiry is required");
        }
    }

    errors.finish()?;

    Ok(ValidatedOffer {
        statement,
        discount_percent: discount_percent.unwrap(),
        expires_at: expires_at.unwrap(),
    })
}

/// Admin-issued offers are recorded under the brand label
fn issuer_role_for(role: UserRole) -> OfferIssuerRole {
    match role {
        UserRole::Seller => OfferIssuerRole::Seller,
        _ => OfferIssuerRole::Brand,
    }
}

/// Create an offer. A still-active offer with the same statement is rejected.
///
/// POST /api/offers
pub async fn create_offer(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<CreateOfferRequest>,
) -> Result<(StatusCode, Json<Offer>), ApiError> {
    authorize(user.role_enum(), Operation::CreateOffer)?;

    let payload = validate_offer_payload(&req)?;
    let now = Utc::now().to_rfc3339();

    let duplicate: Option<(String,)> =
        sqlx::query_as("SELECT id FROM offers WHERE statement = ? AND expires_at > ?")
            .bind(&payload.statement)
            .bind(&now)
            .fetch_optional(&state.db)
            .await?;
    if duplicate.is_some() {
        return Err(ApiError::conflict(
            "An active offer with this statement already exists",
        ));
    }

    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO offers (
            id, statement, discount_percent, expires_at,
            issued_by_role, issued_by_id, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&payload.statement)
    .bind(payload.discount_percent)
    .bind(&payload.expires_at)
    .bind(issuer_role_for(user.role_enum()).to_string())
    .bind(&user.id)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let offer: Offer = sqlx::query_as("SELECT * FROM offers WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    tracing::info!(offer_id = %offer.id, issued_by = %user.id, "Offer created");

    Ok((StatusCode::CREATED, Json(offer)))
}

/// PUT /api/offers/:id
pub async fn update_offer(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(req): Json<CreateOfferRequest>,
) -> Result<Json<Offer>, ApiError> {
    authorize(user.role_enum(), Operation::UpdateOffer)?;
    validate_uuid(&id, "offer_id").map_err(|e| ApiError::validation_field("offer_id", e))?;

    let payload = validate_offer_payload(&req)?;

    let result = sqlx::query(
        "UPDATE offers SET statement = ?, discount_percent = ?, expires_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&payload.statement)
    .bind(payload.discount_percent)
    .bind(&payload.expires_at)
    .bind(Utc::now().to_rfc3339())
    .bind(&id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Offer not found"));
    }

    let offer: Offer = sqlx::query_as("SELECT * FROM offers WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    Ok(Json(offer))
}

/// DELETE /api/offers/:id
pub async fn delete_offer(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    authorize(user.role_enum(), Operation::DeleteOffer)?;
    validate_uuid(&id, "offer_id").map_err(|e| ApiError::validation_field("offer_id", e))?;

    let result = sqlx::query("DELETE FROM offers WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Offer not found"));
    }

    Ok(Json(MessageResponse::new("Offer deleted successfully")))
}

/// Offers whose expiry is still strictly in the future.
///
/// GET /api/offers/active
pub async fn list_active_offers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Offer>>, ApiError> {
    let offers: Vec<Offer> =
        sqlx::query_as("SELECT * FROM offers WHERE expires_at > ? ORDER BY expires_at ASC")
            .bind(Utc::now().to_rfc3339())
            .fetch_all(&state.db)
            .await?;

    Ok(Json(offers))
}
