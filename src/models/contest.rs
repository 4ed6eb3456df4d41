// src/models/contest.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

/// Ledger row joined to user identity, in leaderboard order.
#[derive(Debug, Clone, FromRow)]
pub struct ContestStanding {
    pub user_id: i64,
    pub name: String,
    pub surname: String,
    pub points: f64,
    pub total_tests: i32,
}

/// A ranked leaderboard entry returned to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LeaderboardEntry {
    pub rank: i64,
    #[serde(skip)]
    pub user_id: i64,
    pub name: String,
    pub surname: String,
    pub points: f64,
    pub total_tests: i32,
}

/// Query params for the leaderboard endpoints.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LeaderboardParams {
    pub doc_name: String,
}
