// src/models/feedback.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Represents the 'feedback' table. Rows are immutable once created; only
/// the `viewed` flag is flipped by administrators.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Feedback {
    pub id: i64,
    /// Sentiment / category chosen by the user (e.g. 'like', 'dislike').
    pub value: String,
    pub user_comment: Option<String>,
    pub viewed: bool,
    /// The interaction this feedback refers to.
    pub request_id: i64,
}

/// DTO for submitting feedback on a prior interaction.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct FeedbackRequest {
    #[validate(length(min = 1, max = 50))]
    pub value: String,
    #[validate(length(max = 2000))]
    pub user_comment: Option<String>,
    pub request_id: i64,
}

/// Query params for the admin feedback listing.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FeedbackListParams {
    /// When true, only feedback not yet marked as viewed.
    #[serde(default)]
    pub only_new: bool,
}
