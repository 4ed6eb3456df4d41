// src/handlers/contest.rs

use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    contest,
    error::AppError,
    models::contest::{LeaderboardEntry, LeaderboardParams},
    utils::jwt::Claims,
};

/// Full ranked leaderboard for a contest document.
#[utoipa::path(
    get,
    path = "/api/contest/leaderboard",
    params(LeaderboardParams),
    responses(
        (status = 200, description = "Ranked standings, best first", body = [LeaderboardEntry])
    ),
    tag = "contest"
)]
pub async fn get_leaderboard(
    State(pool): State<PgPool>,
    Query(params): Query<LeaderboardParams>,
) -> Result<impl IntoResponse, AppError> {
    let entries = contest::leaderboard(&pool, &params.doc_name)
        .await
        .map_err(|e| {
            tracing::error!("Failed to build leaderboard: {}", e);
            e
        })?;

    Ok(Json(entries))
}

/// The caller's personalized view: the podium plus their own entry when
/// ranked below it.
#[utoipa::path(
    get,
    path = "/api/contest/my",
    params(LeaderboardParams),
    responses(
        (status = 200, description = "Top-3 plus the caller's entry", body = [LeaderboardEntry])
    ),
    tag = "contest"
)]
pub async fn get_my_leaderboard(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<LeaderboardParams>,
) -> Result<impl IntoResponse, AppError> {
    let entries = contest::my_leaderboard(&pool, &params.doc_name, claims.user_id()).await?;

    Ok(Json(entries))
}
