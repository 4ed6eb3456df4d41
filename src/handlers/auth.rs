// src/handlers/auth.rs

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::user::{
        ForgotPasswordRequest, LoginRequest, MeResponse, RegisterRequest, ResetPasswordRequest,
        User, VerifyRequest,
    },
    notify::{Notice, Notifier},
    utils::{
        hash::{hash_password, verify_password},
        jwt::{Claims, sign_action_token, sign_jwt, verify_action_token},
    },
};

const VERIFY_PURPOSE: &str = "verify";
const RESET_PURPOSE: &str = "reset";
const ACTION_TOKEN_LIFETIME_SECS: u64 = 3600;

/// Registers a new user.
///
/// The account starts unverified; an approval request is filed for the
/// admins and the applicant gets an "application received" notice. Returns
/// 201 Created with the user object (excluding the password hash).
pub async fn register(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    State(notifier): State<Notifier>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    if payload.password != payload.confirmation_password {
        return Err(AppError::BadRequest("Passwords don't match".to_string()));
    }

    let hashed_password = hash_password(&payload.password)?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (name, surname, email, password)
        VALUES ($1, $2, $3, $4)
        RETURNING id, name, surname, email, password,
                  is_active, is_superuser, is_verified, created_at
        "#,
    )
    .bind(&payload.name)
    .bind(&payload.surname)
    .bind(&payload.email)
    .bind(&hashed_password)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        // Postgres error code for unique violation is 23505
        if e.to_string().contains("unique constraint") || e.to_string().contains("23505") {
            AppError::Conflict(format!("User with email '{}' already exists", payload.email))
        } else {
            tracing::error!("Failed to register user: {:?}", e);
            AppError::from(e)
        }
    })?;

    let info = json!({
        "name": user.name,
        "surname": user.surname,
        "email": user.email,
    });

    sqlx::query(
        "INSERT INTO admin_requests (timestamp, info, status, user_id)
         VALUES ($1, $2, 'approval', $3)",
    )
    .bind(crate::statistics::now_local())
    .bind(&info)
    .bind(user.id)
    .execute(&pool)
    .await
    .map_err(|e| {
        if e.to_string().contains("unique constraint") || e.to_string().contains("23505") {
            AppError::Conflict("You have already sent the request".to_string())
        } else {
            AppError::from(e)
        }
    })?;

    notifier.dispatch(Notice::Approval {
        name: user.name.clone(),
        email: user.email.clone(),
    });

    if config.send_admin_notices {
        notifier.dispatch(Notice::AdminApproval {
            name: user.name.clone(),
            surname: user.surname.clone(),
            email: user.email.clone(),
        });
    }

    Ok((StatusCode::CREATED, Json(user)))
}

/// Authenticates a user and returns a JWT token.
///
/// Only active, verified accounts may log in.
pub async fn login(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, name, surname, email, password,
               is_active, is_superuser, is_verified, created_at
        FROM users
        WHERE email = $1
        "#,
    )
    .bind(&payload.email)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Login DB error: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let user = user.ok_or(AppError::AuthError("User not found".to_string()))?;

    let is_valid = verify_password(&payload.password, &user.password)?;

    if !is_valid {
        return Err(AppError::AuthError("Invalid password".to_string()));
    }

    if !user.is_active {
        return Err(AppError::AuthError("User is inactive".to_string()));
    }

    if !user.is_verified {
        return Err(AppError::Forbidden(
            "Account has not been verified yet".to_string(),
        ));
    }

    let token = sign_jwt(
        user.id,
        user.is_superuser,
        &config.jwt_secret,
        config.jwt_expiration,
    )?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
    })))
}

/// Consumes a verification token issued when an admin accepted the
/// registration request, and marks the account verified.
pub async fn verify(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Json(payload): Json<VerifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let claims = verify_action_token(&payload.token, VERIFY_PURPOSE, &config.jwt_secret)?;
    let user_id: i64 = claims
        .sub
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid or expired token".to_string()))?;

    let is_verified: Option<bool> = sqlx::query_scalar("SELECT is_verified FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&pool)
        .await?;

    match is_verified {
        None => Err(AppError::BadRequest("Invalid or expired token".to_string())),
        Some(true) => Err(AppError::Conflict("User is already verified".to_string())),
        Some(false) => {
            sqlx::query("UPDATE users SET is_verified = TRUE WHERE id = $1")
                .bind(user_id)
                .execute(&pool)
                .await?;

            Ok(Json(json!({ "status": "account verified" })))
        }
    }
}

/// Starts the password-reset flow. Always answers 202 so the endpoint does
/// not reveal whether an email is registered.
pub async fn forgot_password(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    State(notifier): State<Notifier>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, name, surname, email, password,
               is_active, is_superuser, is_verified, created_at
        FROM users
        WHERE email = $1
        "#,
    )
    .bind(&payload.email)
    .fetch_optional(&pool)
    .await?;

    if let Some(user) = user {
        if user.is_active {
            let token = sign_action_token(
                user.id,
                &user.email,
                RESET_PURPOSE,
                &config.jwt_secret,
                ACTION_TOKEN_LIFETIME_SECS,
            )?;

            notifier.dispatch(Notice::Forgot {
                name: user.name,
                email: user.email,
                token,
            });
        }
    }

    Ok(StatusCode::ACCEPTED)
}

/// Consumes a reset token and stores the new password hash.
pub async fn reset_password(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let claims = verify_action_token(&payload.token, RESET_PURPOSE, &config.jwt_secret)?;
    let user_id: i64 = claims
        .sub
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid or expired token".to_string()))?;

    let hashed = hash_password(&payload.password)?;

    let result = sqlx::query("UPDATE users SET password = $1 WHERE id = $2 AND is_active = TRUE")
        .bind(&hashed)
        .bind(user_id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::BadRequest("Invalid or expired token".to_string()));
    }

    Ok(Json(json!({ "status": "password has been changed" })))
}

/// Get the current user's profile.
pub async fn get_me(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, name, surname, email, password,
               is_active, is_superuser, is_verified, created_at
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(claims.user_id())
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("User not found".to_string()))?;

    Ok(Json(MeResponse {
        id: user.id,
        name: user.name,
        surname: user.surname,
        email: user.email,
        is_superuser: user.is_superuser,
        is_verified: user.is_verified,
        created_at: user.created_at,
    }))
}
