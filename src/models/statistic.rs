// src/models/statistic.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

/// Operation kinds recorded in the statistics log.
///
/// Stored as plain strings so the audit log stays readable from SQL.
pub const OP_GET_ANSWER: &str = "get_answer";
pub const OP_GET_TEST: &str = "get_test";

/// Common fields of a new 'request_statistic' row, filled from the LLM
/// service response before the detail row is attached. Receipt timestamps
/// are naive local time; every window comparison in the contest logic
/// relies on this convention.
#[derive(Debug)]
pub struct InteractionMeta {
    pub user_id: i64,
    pub operation: &'static str,
    pub doc_name: Option<String>,
    pub prompt_path: String,
    pub tokens: i32,
    pub embedding_tokens: i32,
    pub total_time: f64,
    pub gigachat_time: f64,
    pub from_cache: bool,
}

/// The type-specific detail row owned by an interaction record.
#[derive(Debug)]
pub enum InteractionDetail {
    /// Quiz generation ('test_system' row).
    Quiz {
        question: String,
        options: [String; 4],
        right_answer: String,
        generation_attempts: i32,
    },
    /// Question answering ('answer_question_system' row).
    Answer {
        question: String,
        answer: String,
        metrics: serde_json::Value,
    },
}

/// Quiz row as read back for scoring.
#[derive(Debug, FromRow)]
pub struct QuizRecord {
    pub question: String,
    pub right_answer: String,
    pub answered_at: Option<chrono::NaiveDateTime>,
    /// Receipt timestamp of the owning interaction.
    pub timestamp: chrono::NaiveDateTime,
    pub doc_name: Option<String>,
}

/// Query params for the question-answering proxy.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GetAnswerParams {
    pub filename: String,
    pub question: String,
}

/// Query params for the quiz-generation proxy.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GetTestParams {
    pub filename: String,
}

/// Quiz returned to the client: the right answer is stripped.
#[derive(Debug, Serialize, ToSchema)]
pub struct QuizPublic {
    pub request_id: i64,
    pub question: String,
    pub options: Vec<String>,
}

/// DTO for submitting a quiz answer.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckTestRequest {
    pub request_id: i64,
    pub selected_option: String,
}

/// Result of a scored quiz answer.
#[derive(Debug, Serialize, ToSchema)]
pub struct CheckTestResponse {
    pub right_answer: String,
    pub score: f64,
}

/// Answer returned by the question-answering proxy.
#[derive(Debug, Serialize, ToSchema)]
pub struct AnswerPublic {
    pub request_id: i64,
    pub result: String,
}
