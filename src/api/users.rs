//! Account endpoints: registration, login/logout, token refresh, password
//! management, email verification and token-gated account deletion.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{
    ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, LoginResponse, RefreshRequest,
    ResetPasswordRequest, TokenPairResponse, UpdateAccountRequest, UpdateAddressRequest, User,
    UserResponse, UserRole,
};
use crate::AppState;

use super::auth::{
    generate_temporary_token, hash_password, hash_token, issue_token_pair, tokens_match,
    verify_password,
};
use super::error::{ApiError, ValidationErrorBuilder};
use super::upload::collect_multipart;
use super::validation::{
    validate_address_label, validate_email, validate_password, validate_user_name,
};
use super::MessageResponse;

/// Look up a user by username or email, matching either
async fn find_by_identifier(
    pool: &sqlx::SqlitePool,
    user_name: Option<&str>,
    email: Option<&str>,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_name = ? OR email = ?")
        .bind(user_name.unwrap_or_default())
        .bind(email.unwrap_or_default())
        .fetch_optional(pool)
        .await
}

async fn fetch_user(pool: &sqlx::SqlitePool, id: &str) -> Result<User, ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    user.ok_or_else(|| ApiError::not_found("User not found"))
}

/// Register a new account. Multipart: profile fields plus a required
/// `avatar` image.
///
/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let form = collect_multipart(multipart).await?;

    let user_name = form
        .field("user_name")
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    let email = form.field("email").unwrap_or_default().trim().to_lowercase();
    let full_name = form.field("full_name").unwrap_or_default().trim().to_string();
    let password = form.field("password").unwrap_or_default().to_string();
    let role = form.field("role").unwrap_or("customer").to_lowercase();

    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_user_name(&user_name) {
        errors.add("user_name", e);
    }
    if let Err(e) = validate_email(&email) {
        errors.add("email", e);
    }
    if full_name.is_empty() {
        errors.add("full_name", "Full name is required");
    }
    if let Err(e) = validate_password(&password) {
        errors.add("password", e);
    }
    if role.parse::<UserRole>().is_err() {
        errors.add("role", "Role must be one of: customer, seller, admin");
    }
    if let Some(label) = form.field("address_label") {
        if let Err(e) = validate_address_label(label) {
            errors.add("address_label", e);
        }
    }
    let avatar = form.files_named("avatar").into_iter().next();
    if avatar.is_none() {
        errors.add("avatar", "Avatar file is required");
    }
    errors.finish()?;
    let avatar = avatar.unwrap();

    let taken: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE user_name = ?")
        .bind(&user_name)
        .fetch_optional(&state.db)
        .await?;
    if taken.is_some() {
        return Err(ApiError::conflict("Username not available"));
    }

    let taken: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;
    if taken.is_some() {
        return Err(ApiError::conflict("Email already in use"));
    }

    let stored_avatar = state
        .storage
        .store(avatar.data.clone(), &avatar.file_name, "avatars")
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Avatar upload failed");
            ApiError::external_service("Avatar upload failed")
        })?;

    let id = Uuid::new_v4().to_string();
    let password_hash = hash_password(&password).map_err(|e| {
        tracing::error!(error = %e, "Failed to hash password");
        ApiError::internal("Failed to create account")
    })?;
    let verification = generate_temporary_token();
    let now = Utc::now().to_rfc3339();

    let inserted = sqlx::query(
        r#"
        INSERT INTO users (
            id, user_name, email, full_name, password_hash, role,
            avatar_url, avatar_public_id,
            address_label, address_street, address_city, address_state, address_pin, address_country,
            is_email_verified, email_verification_token, email_verification_expiry,
            token_version, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&user_name)
    .bind(&email)
    .bind(&full_name)
    .bind(&password_hash)
    .bind(&role)
    .bind(&stored_avatar.url)
    .bind(&stored_avatar.public_id)
    .bind(form.field("address_label"))
    .bind(form.field("address_street"))
    .bind(form.field("address_city"))
    .bind(form.field("address_state"))
    .bind(form.field("address_pin"))
    .bind(form.field("address_country"))
    .bind(&verification.digest)
    .bind(&verification.expires_at)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await;

    if let Err(e) = inserted {
        state.storage.remove(&stored_avatar.public_id).await;
        return Err(e.into());
    }

    let user = fetch_user(&state.db, &id).await?;

    let verify_url = format!(
        "{}/verify-email/{}",
        state.config.server.frontend_url, verification.raw
    );
    let mailer = state.mailer.clone();
    let (to, name) = (user.email.clone(), user.user_name.clone());
    tokio::spawn(async move {
        if let Err(e) = mailer.send_verification_email(&to, &name, &verify_url).await {
            tracing::warn!(error = %e, "Failed to send verification email");
        }
    });

    tracing::info!(user_id = %user.id, "User registered");

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// Log in with username or email.
///
/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    if req.user_name.is_none() && req.email.is_none() {
        return Err(ApiError::validation_field(
            "user_name",
            "Username or email is required",
        ));
    }
    if req.password.is_empty() {
        return Err(ApiError::validation_field("password", "Password is required"));
    }

    let user = find_by_identifier(&state.db, req.user_name.as_deref(), req.email.as_deref())
        .await?
        .ok_or_else(|| ApiError::not_found("User does not exist"))?;

    if !verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::unauthorized("Incorrect password"));
    }

    let pair = issue_token_pair(&state.db, &state.config.auth, &user).await?;

    Ok(Json(LoginResponse {
        user: UserResponse::from(user),
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    }))
}

/// Clear the stored refresh token and bump the token version so every
/// outstanding refresh token dies with the session.
///
/// POST /api/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<MessageResponse>, ApiError> {
    sqlx::query(
        "UPDATE users SET refresh_token = NULL, token_version = token_version + 1, updated_at = ? WHERE id = ?",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(&user.id)
    .execute(&state.db)
    .await?;

    Ok(Json(MessageResponse::new("Logged out")))
}

/// Exchange a refresh token for a fresh access + refresh pair.
///
/// POST /api/auth/refresh
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<TokenPairResponse>, ApiError> {
    let claims = super::auth::decode_refresh_token(&state.config.auth, &req.refresh_token)?;

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&claims.sub)
        .fetch_optional(&state.db)
        .await?;
    let user = user.ok_or_else(|| ApiError::forbidden("Invalid refresh token"))?;

    // The token must be the one on record and carry the current version;
    // a bumped version means this token was revoked
    let stored_matches = user
        .refresh_token
        .as_deref()
        .map(|stored| tokens_match(stored, &req.refresh_token))
        .unwrap_or(false);
    if !stored_matches || claims.token_version != user.token_version {
        return Err(ApiError::conflict(
            "Refresh token is invalid or has been revoked",
        ));
    }

    let pair = issue_token_pair(&state.db, &state.config.auth, &user).await?;

    Ok(Json(TokenPairResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    }))
}

/// Change the password of the logged-in account and rotate all tokens.
///
/// POST /api/auth/change-password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<TokenPairResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if req.old_password.is_empty() {
        errors.add("old_password", "Old password is required");
    }
    if let Err(e) = validate_password(&req.new_password) {
        errors.add("new_password", e);
    }
    if req.new_password != req.confirm_password {
        errors.add("confirm_password", "Passwords do not match");
    }
    if !req.old_password.is_empty() && req.old_password == req.new_password {
        errors.add("new_password", "New password must differ from the old one");
    }
    errors.finish()?;

    if !verify_password(&req.old_password, &user.password_hash) {
        return Err(ApiError::unauthorized("Incorrect password"));
    }

    let password_hash = hash_password(&req.new_password).map_err(|e| {
        tracing::error!(error = %e, "Failed to hash password");
        ApiError::internal("Failed to change password")
    })?;

    sqlx::query(
        r#"
        UPDATE users
        SET password_hash = ?, refresh_token = NULL,
            token_version = token_version + 1, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&password_hash)
    .bind(Utc::now().to_rfc3339())
    .bind(&user.id)
    .execute(&state.db)
    .await?;

    // Re-read so the new pair embeds the bumped version
    let user = fetch_user(&state.db, &user.id).await?;
    let pair = issue_token_pair(&state.db, &state.config.auth, &user).await?;

    tracing::info!(user_id = %user.id, "Password changed, sessions revoked");

    Ok(Json(TokenPairResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    }))
}

/// GET /api/users/me
pub async fn current_user(user: User) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

/// Re-issue the email verification token for an unverified account.
///
/// POST /api/users/resend-verification
pub async fn resend_verification(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<MessageResponse>, ApiError> {
    if user.is_email_verified {
        return Err(ApiError::conflict("Email is already verified"));
    }

    let verification = generate_temporary_token();
    sqlx::query(
        "UPDATE users SET email_verification_token = ?, email_verification_expiry = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&verification.digest)
    .bind(&verification.expires_at)
    .bind(Utc::now().to_rfc3339())
    .bind(&user.id)
    .execute(&state.db)
    .await?;

    let verify_url = format!(
        "{}/verify-email/{}",
        state.config.server.frontend_url, verification.raw
    );
    let mailer = state.mailer.clone();
    tokio::spawn(async move {
        if let Err(e) = mailer
            .send_verification_email(&user.email, &user.user_name, &verify_url)
            .await
        {
            tracing::warn!(error = %e, "Failed to send verification email");
        }
    });

    Ok(Json(MessageResponse::new(
        "Verification mail sent to your email",
    )))
}

#[derive(Debug, serde::Serialize)]
pub struct VerifyEmailResponse {
    pub is_email_verified: bool,
}

/// Consume an emailed verification token.
///
/// POST /api/auth/verify-email/:token
pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<VerifyEmailResponse>, ApiError> {
    let digest = hash_token(token.trim());
    let now = Utc::now().to_rfc3339();

    let result = sqlx::query(
        r#"
        UPDATE users
        SET is_email_verified = 1, email_verification_token = NULL,
            email_verification_expiry = NULL, updated_at = ?
        WHERE email_verification_token = ? AND email_verification_expiry > ?
        "#,
    )
    .bind(&now)
    .bind(&digest)
    .bind(&now)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found(
            "Verification link is invalid or has expired",
        ));
    }

    Ok(Json(VerifyEmailResponse {
        is_email_verified: true,
    }))
}

/// Start the forgotten-password flow for an account matched by username or
/// email.
///
/// POST /api/auth/forgot-password
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if req.user_name.is_none() && req.email.is_none() {
        return Err(ApiError::validation_field(
            "user_name",
            "Username or email is required",
        ));
    }

    let user = find_by_identifier(&state.db, req.user_name.as_deref(), req.email.as_deref())
        .await?
        .ok_or_else(|| ApiError::not_found("No user exists with the given credentials"))?;

    let reset = generate_temporary_token();
    sqlx::query(
        "UPDATE users SET forgot_password_token = ?, forgot_password_expiry = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&reset.digest)
    .bind(&reset.expires_at)
    .bind(Utc::now().to_rfc3339())
    .bind(&user.id)
    .execute(&state.db)
    .await?;

    let reset_url = format!(
        "{}/forgot-password/{}",
        state.config.server.frontend_url, reset.raw
    );
    let mailer = state.mailer.clone();
    tokio::spawn(async move {
        if let Err(e) = mailer
            .send_password_reset_email(&user.email, &user.user_name, &reset_url)
            .await
        {
            tracing::warn!(error = %e, "Failed to send password reset email");
        }
    });

    Ok(Json(MessageResponse::new(
        "Password reset mail sent to your email",
    )))
}

/// Consume an emailed reset token and set a new password. All sessions are
/// revoked.
///
/// POST /api/auth/reset-password/:token
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_password(&req.new_password) {
        errors.add("new_password", e);
    }
    if req.new_password != req.confirm_password {
        errors.add("confirm_password", "Passwords do not match");
    }
    errors.finish()?;

    let password_hash = hash_password(&req.new_password).map_err(|e| {
        tracing::error!(error = %e, "Failed to hash password");
        ApiError::internal("Failed to reset password")
    })?;

    let digest = hash_token(token.trim());
    let now = Utc::now().to_rfc3339();

    let result = sqlx::query(
        r#"
        UPDATE users
        SET password_hash = ?, forgot_password_token = NULL, forgot_password_expiry = NULL,
            refresh_token = NULL, token_version = token_version + 1, updated_at = ?
        WHERE forgot_password_token = ? AND forgot_password_expiry > ?
        "#,
    )
    .bind(&password_hash)
    .bind(&now)
    .bind(&digest)
    .bind(&now)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Reset link is invalid or has expired"));
    }

    Ok(Json(MessageResponse::new("Password reset successful")))
}

/// Update username and/or full name.
///
/// PATCH /api/users/me
pub async fn update_account(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<UpdateAccountRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    if req.user_name.is_none() && req.full_name.is_none() {
        return Err(ApiError::validation_field(
            "user_name",
            "Provide at least one field to update",
        ));
    }

    let user_name = req.user_name.map(|n| n.trim().to_lowercase());
    if let Some(ref name) = user_name {
        validate_user_name(name).map_err(|e| ApiError::validation_field("user_name", e))?;

        let taken: Option<(String,)> =
            sqlx::query_as("SELECT id FROM users WHERE user_name = ? AND id != ?")
                .bind(name)
                .bind(&user.id)
                .fetch_optional(&state.db)
                .await?;
        if taken.is_some() {
            return Err(ApiError::conflict(
                "A user with this username already exists",
            ));
        }
    }

    sqlx::query(
        r#"
        UPDATE users
        SET user_name = COALESCE(?, user_name),
            full_name = COALESCE(?, full_name),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&user_name)
    .bind(&req.full_name)
    .bind(Utc::now().to_rfc3339())
    .bind(&user.id)
    .execute(&state.db)
    .await?;

    let user = fetch_user(&state.db, &user.id).await?;
    Ok(Json(UserResponse::from(user)))
}

/// Replace the avatar image.
///
/// PUT /api/users/me/avatar
pub async fn update_avatar(
    State(state): State<Arc<AppState>>,
    user: User,
    multipart: Multipart,
) -> Result<Json<UserResponse>, ApiError> {
    let form = collect_multipart(multipart).await?;
    let avatar = form
        .files_named("avatar")
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::validation_field("avatar", "Avatar file is required"))?;

    let stored = state
        .storage
        .store(avatar.data.clone(), &avatar.file_name, "avatars")
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Avatar upload failed");
            ApiError::external_service("Avatar upload failed")
        })?;

    sqlx::query("UPDATE users SET avatar_url = ?, avatar_public_id = ?, updated_at = ? WHERE id = ?")
        .bind(&stored.url)
        .bind(&stored.public_id)
        .bind(Utc::now().to_rfc3339())
        .bind(&user.id)
        .execute(&state.db)
        .await?;

    if !user.avatar_public_id.is_empty() {
        state.storage.remove(&user.avatar_public_id).await;
    }

    let user = fetch_user(&state.db, &user.id).await?;
    Ok(Json(UserResponse::from(user)))
}

/// Replace the stored address.
///
/// PUT /api/users/me/address
pub async fn update_address(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<UpdateAddressRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    if req.label.is_none()
        && req.street.is_none()
        && req.city.is_none()
        && req.state.is_none()
        && req.pin.is_none()
        && req.country.is_none()
    {
        return Err(ApiError::validation_field(
            "address",
            "Provide at least one field to update",
        ));
    }
    if let Some(ref label) = req.label {
        validate_address_label(label).map_err(|e| ApiError::validation_field("label", e))?;
    }

    sqlx::query(
        r#"
        UPDATE users
        SET address_label = ?, address_street = ?, address_city = ?,
            address_state = ?, address_pin = ?, address_country = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&req.label)
    .bind(&req.street)
    .bind(&req.city)
    .bind(&req.state)
    .bind(&req.pin)
    .bind(&req.country)
    .bind(Utc::now().to_rfc3339())
    .bind(&user.id)
    .execute(&state.db)
    .await?;

    let user = fetch_user(&state.db, &user.id).await?;
    Ok(Json(UserResponse::from(user)))
}

/// Email a single-use deletion link to the account owner.
///
/// POST /api/users/me/delete-request
pub async fn request_account_deletion(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<MessageResponse>, ApiError> {
    let deletion = generate_temporary_token();
    sqlx::query(
        "UPDATE users SET delete_account_token = ?, delete_account_expiry = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&deletion.digest)
    .bind(&deletion.expires_at)
    .bind(Utc::now().to_rfc3339())
    .bind(&user.id)
    .execute(&state.db)
    .await?;

    let delete_url = format!(
        "{}/delete-user/{}",
        state.config.server.frontend_url, deletion.raw
    );
    let mailer = state.mailer.clone();
    tokio::spawn(async move {
        if let Err(e) = mailer
            .send_account_deletion_email(&user.email, &user.user_name, &delete_url)
            .await
        {
            tracing::warn!(error = %e, "Failed to send account deletion email");
        }
    });

    Ok(Json(MessageResponse::new(
        "Account deletion mail sent to your email",
    )))
}

/// Consume an emailed deletion token: anonymize the user's ratings, expire
/// and anonymize offers they issued, then remove the account.
///
/// DELETE /api/auth/delete-account/:token
pub async fn confirm_account_deletion(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let digest = hash_token(token.trim());
    let now = Utc::now().to_rfc3339();

    let user: Option<User> = sqlx::query_as(
        "SELECT * FROM users WHERE delete_account_token = ? AND delete_account_expiry > ?",
    )
    .bind(&digest)
    .bind(&now)
    .fetch_optional(&state.db)
    .await?;
    let user = user.ok_or_else(|| ApiError::not_found("Deletion link is invalid or has expired"))?;

    // Anonymize dependents before the row disappears so a crash mid-sequence
    // never leaves references to a vanished account
    sqlx::query("UPDATE ratings SET reviewed_by = NULL, updated_at = ? WHERE reviewed_by = ?")
        .bind(&now)
        .bind(&user.id)
        .execute(&state.db)
        .await?;

    if user.role_enum() != UserRole::Customer {
        sqlx::query(
            "UPDATE offers SET issued_by_id = NULL, expires_at = ?, updated_at = ? WHERE issued_by_id = ?",
        )
        .bind(&now)
        .bind(&now)
        .bind(&user.id)
        .execute(&state.db)
        .await?;
    }

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&user.id)
        .execute(&state.db)
        .await?;

    if !user.avatar_public_id.is_empty() {
        state.storage.remove(&user.avatar_public_id).await;
    }

    tracing::info!(user_id = %user.id, "Account deleted");

    Ok(Json(MessageResponse::new("User deleted successfully")))
}
