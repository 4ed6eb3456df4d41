// src/models/admin_request.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::IntoParams;

/// Represents the 'admin_requests' table: one registration-approval request
/// per user, reviewed by administrators.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AdminRequest {
    pub id: i64,
    pub timestamp: chrono::NaiveDateTime,
    /// Snapshot of the applicant's name/surname/email at registration time.
    pub info: serde_json::Value,
    /// 'approval' | 'accepted' | 'rejected'.
    pub status: String,
    pub user_id: i64,
}

/// Query param for accept/reject.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RequestIdParams {
    pub request_id: i64,
}

/// Query param for the admin token-spend report.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TokenReportParams {
    /// 'get_answer', 'get_test' or 'both'.
    pub operation: String,
}
