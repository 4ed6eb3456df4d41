// src/statistics.rs
//
// The interaction audit log: one row per LLM call plus exactly one detail
// row, and the feedback records that reference them.

use sqlx::PgPool;

use crate::error::AppError;
use crate::models::feedback::FeedbackRequest;
use crate::models::statistic::{InteractionDetail, InteractionMeta, OP_GET_ANSWER, OP_GET_TEST};

/// Current time in the deployment's local time zone with the offset
/// stripped. Every timestamp stored or compared by this module and the
/// contest logic uses this convention; mixing it with UTC would silently
/// break the cheat-detection window.
pub fn now_local() -> chrono::NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Start of the current local day, for daily token accounting.
pub fn today_local() -> chrono::NaiveDateTime {
    now_local().date().and_hms_opt(0, 0, 0).expect("midnight is valid")
}

/// Inserts one interaction record and its detail row in a single
/// transaction, returning the new interaction id. The record is immutable
/// once committed.
pub async fn record_interaction(
    pool: &PgPool,
    meta: InteractionMeta,
    detail: InteractionDetail,
) -> Result<i64, AppError> {
    let mut tx = pool.begin().await?;

    let request_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO request_statistic
            (user_id, timestamp, operation, doc_name, prompt_path,
             tokens, embedding_tokens, total_time, gigachat_time, from_cache)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
        "#,
    )
    .bind(meta.user_id)
    .bind(now_local())
    .bind(meta.operation)
    .bind(&meta.doc_name)
    .bind(&meta.prompt_path)
    .bind(meta.tokens)
    .bind(meta.embedding_tokens)
    .bind(meta.total_time)
    .bind(meta.gigachat_time)
    .bind(meta.from_cache)
    .fetch_one(&mut *tx)
    .await?;

    match detail {
        InteractionDetail::Quiz {
            question,
            options,
            right_answer,
            generation_attempts,
        } => {
            let [option_1, option_2, option_3, option_4] = options;
            sqlx::query(
                r#"
                INSERT INTO test_system
                    (request_id, question, option_1, option_2, option_3, option_4,
                     right_answer, generation_attempts, answered_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NULL)
                "#,
            )
            .bind(request_id)
            .bind(question)
            .bind(option_1)
            .bind(option_2)
            .bind(option_3)
            .bind(option_4)
            .bind(right_answer)
            .bind(generation_attempts)
            .execute(&mut *tx)
            .await?;
        }
        InteractionDetail::Answer {
            question,
            answer,
            metrics,
        } => {
            sqlx::query(
                r#"
                INSERT INTO answer_question_system (request_id, question, answer, metrics)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(request_id)
            .bind(question)
            .bind(answer)
            .bind(metrics)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;

    Ok(request_id)
}

/// Records user feedback on a prior interaction and, when the interaction
/// belongs to a contest document, bumps the matching feedback counter on the
/// submitter's ledger row. A feedback event never creates a ledger row.
pub async fn record_feedback(
    pool: &PgPool,
    user_id: i64,
    feedback: &FeedbackRequest,
) -> Result<(), AppError> {
    let parent: Option<(String, Option<String>)> =
        sqlx::query_as("SELECT operation, doc_name FROM request_statistic WHERE id = $1")
            .bind(feedback.request_id)
            .fetch_optional(pool)
            .await?;

    let Some((operation, doc_name)) = parent else {
        return Err(AppError::NotFound("Interaction not found".to_string()));
    };

    sqlx::query("INSERT INTO feedback (value, user_comment, request_id) VALUES ($1, $2, $3)")
        .bind(&feedback.value)
        .bind(&feedback.user_comment)
        .bind(feedback.request_id)
        .execute(pool)
        .await?;

    let Some(doc_name) = doc_name else {
        return Ok(());
    };

    let in_contest: Option<bool> = sqlx::query_scalar("SELECT in_contest FROM docs WHERE name = $1")
        .bind(&doc_name)
        .fetch_optional(pool)
        .await?;

    if !in_contest.unwrap_or(false) {
        return Ok(());
    }

    let update_sql = match operation.as_str() {
        OP_GET_TEST => {
            "UPDATE contest SET test_feedbacks = test_feedbacks + 1
             WHERE user_id = $1 AND doc_name = $2"
        }
        OP_GET_ANSWER => {
            "UPDATE contest SET answer_question_feedbacks = answer_question_feedbacks + 1
             WHERE user_id = $1 AND doc_name = $2"
        }
        _ => return Ok(()),
    };

    // rows_affected == 0 means the user has no ledger row yet; that is fine.
    sqlx::query(update_sql)
        .bind(user_id)
        .bind(&doc_name)
        .execute(pool)
        .await?;

    Ok(())
}

/// True when this call's spend pushed the running total over the limit.
/// Strictly-crossing so the notice fires exactly once per day.
pub fn crossed_limit(total_after: i64, call_tokens: i64, limit: i64) -> bool {
    total_after >= limit && total_after - call_tokens < limit
}

/// Tokens spent by a user since `since`, grouped by document.
pub async fn tokens_by_doc_since(
    pool: &PgPool,
    user_id: i64,
    since: chrono::NaiveDateTime,
) -> Result<Vec<(Option<String>, i64)>, AppError> {
    let rows: Vec<(Option<String>, i64)> = sqlx::query_as(
        r#"
        SELECT doc_name, SUM(tokens + embedding_tokens)
        FROM request_statistic
        WHERE user_id = $1 AND timestamp >= $2
        GROUP BY doc_name
        "#,
    )
    .bind(user_id)
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Total prompt tokens spent on an operation kind, for the admin report.
pub async fn tokens_spent(pool: &PgPool, operation: &str) -> Result<i64, AppError> {
    let total: Option<i64> = match operation {
        "both" => {
            sqlx::query_scalar("SELECT SUM(tokens) FROM request_statistic")
                .fetch_one(pool)
                .await?
        }
        OP_GET_ANSWER | OP_GET_TEST => {
            sqlx::query_scalar("SELECT SUM(tokens) FROM request_statistic WHERE operation = $1")
                .bind(operation)
                .fetch_one(pool)
                .await?
        }
        _ => return Err(AppError::BadRequest("Unexpected operation".to_string())),
    };

    Ok(total.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_crossing_fires_once() {
        // 62k -> 64k crosses the 63k budget.
        assert!(crossed_limit(64_000, 2_000, 63_000));
        // Already over before this call: no new notice.
        assert!(!crossed_limit(66_000, 2_000, 63_000));
        // Still under.
        assert!(!crossed_limit(62_000, 2_000, 63_000));
        // Landing exactly on the limit counts as crossing.
        assert!(crossed_limit(63_000, 1_000, 63_000));
    }
}
