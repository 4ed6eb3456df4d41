// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    config::Config,
    error::AppError,
    models::admin_request::{AdminRequest, RequestIdParams, TokenReportParams},
    models::feedback::{Feedback, FeedbackListParams},
    notify::{Notice, Notifier},
    statistics,
    utils::jwt::sign_action_token,
};

const VERIFY_PURPOSE: &str = "verify";
const VERIFY_TOKEN_LIFETIME_SECS: u64 = 3600;

fn applicant_field(request: &AdminRequest, field: &str) -> String {
    request.info[field].as_str().unwrap_or_default().to_string()
}

/// Lists registration requests awaiting review.
/// Admin only.
pub async fn list_requests(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let requests = sqlx::query_as::<_, AdminRequest>(
        "SELECT id, timestamp, info, status, user_id
         FROM admin_requests
         WHERE status = 'approval'
         ORDER BY timestamp",
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(requests))
}

/// Accepts a registration request: issues a verification token, notifies
/// the applicant and marks the request accepted.
/// Admin only.
pub async fn accept_request(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    State(notifier): State<Notifier>,
    Query(params): Query<RequestIdParams>,
) -> Result<impl IntoResponse, AppError> {
    let request = sqlx::query_as::<_, AdminRequest>(
        "SELECT id, timestamp, info, status, user_id FROM admin_requests WHERE id = $1",
    )
    .bind(params.request_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Request not found".to_string()))?;

    let email = applicant_field(&request, "email");

    let token = sign_action_token(
        request.user_id,
        &email,
        VERIFY_PURPOSE,
        &config.jwt_secret,
        VERIFY_TOKEN_LIFETIME_SECS,
    )?;

    notifier.dispatch(Notice::Accept {
        name: applicant_field(&request, "name"),
        email,
        token,
    });

    sqlx::query("UPDATE admin_requests SET status = 'accepted' WHERE id = $1")
        .bind(params.request_id)
        .execute(&pool)
        .await?;

    Ok(Json(serde_json::json!({
        "status": format!("request #{} has been accepted successfully", params.request_id)
    })))
}

/// Rejects a registration request and notifies the applicant.
/// Admin only.
pub async fn reject_request(
    State(pool): State<PgPool>,
    State(notifier): State<Notifier>,
    Query(params): Query<RequestIdParams>,
) -> Result<impl IntoResponse, AppError> {
    let request = sqlx::query_as::<_, AdminRequest>(
        "SELECT id, timestamp, info, status, user_id FROM admin_requests WHERE id = $1",
    )
    .bind(params.request_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Request not found".to_string()))?;

    notifier.dispatch(Notice::Reject {
        name: applicant_field(&request, "name"),
        email: applicant_field(&request, "email"),
    });

    sqlx::query("UPDATE admin_requests SET status = 'rejected' WHERE id = $1")
        .bind(params.request_id)
        .execute(&pool)
        .await?;

    Ok(Json(serde_json::json!({
        "status": format!("request #{} has been rejected successfully", params.request_id)
    })))
}

/// Lists user feedback, optionally only entries not yet reviewed.
/// Admin only.
pub async fn list_feedback(
    State(pool): State<PgPool>,
    Query(params): Query<FeedbackListParams>,
) -> Result<impl IntoResponse, AppError> {
    let feedback = if params.only_new {
        sqlx::query_as::<_, Feedback>(
            "SELECT id, value, user_comment, viewed, request_id
             FROM feedback
             WHERE viewed = FALSE
             ORDER BY id DESC",
        )
        .fetch_all(&pool)
        .await?
    } else {
        sqlx::query_as::<_, Feedback>(
            "SELECT id, value, user_comment, viewed, request_id
             FROM feedback
             ORDER BY id DESC",
        )
        .fetch_all(&pool)
        .await?
    };

    Ok(Json(feedback))
}

/// Marks a feedback entry as reviewed.
/// Admin only.
pub async fn set_feedback_viewed(
    State(pool): State<PgPool>,
    Path(feedback_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("UPDATE feedback SET viewed = TRUE WHERE id = $1")
        .bind(feedback_id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Feedback not found".to_string()));
    }

    Ok(Json(serde_json::json!({
        "status": format!("feedback #{} was viewed", feedback_id)
    })))
}

/// Total prompt tokens spent on an operation kind
/// ('get_answer' | 'get_test' | 'both').
/// Admin only.
pub async fn token_report(
    State(pool): State<PgPool>,
    Query(params): Query<TokenReportParams>,
) -> Result<impl IntoResponse, AppError> {
    let tokens = statistics::tokens_spent(&pool, &params.operation).await?;

    Ok(Json(serde_json::json!({ "tokens": tokens })))
}
