// src/models/doc.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Represents the 'docs' table: one row per document indexed by the LLM
/// service.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Doc {
    pub id: i64,

    /// Unique document name, used as the key in all LLM service calls.
    pub name: String,

    /// Source file extension ('txt' or 'zip').
    pub doc_type: Option<String>,

    /// Chunking parameters reported by the LLM service at upload time.
    pub chunk_size: Option<i32>,
    pub embedding_model: Option<String>,

    pub description: String,

    /// Uploading user; NULL for documents seeded outside the API.
    pub user_id: Option<i64>,

    /// Whether quiz results on this document count towards the contest
    /// leaderboard.
    pub in_contest: bool,
}

/// Listing DTO: name + description only.
#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct DocSummary {
    pub name: String,
    pub description: String,
}

/// Query parameters for the upload endpoint (the file itself arrives as
/// multipart form data).
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UploadDocParams {
    pub doc_name: String,
    pub doc_description: String,
}

/// DTO for renaming / re-describing a document.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangeDocRequest {
    #[validate(length(min = 1, max = 100))]
    pub current_name: String,
    pub new_name: Option<String>,
    pub description: Option<String>,
}

/// Query parameter used by delete / add_data.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DocNameParams {
    pub doc_name: String,
}
