// src/handlers/llm.rs

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    config::Config,
    contest,
    error::AppError,
    llm_client::LlmClient,
    models::feedback::FeedbackRequest,
    models::statistic::{
        AnswerPublic, CheckTestRequest, CheckTestResponse, GetAnswerParams, GetTestParams,
        InteractionDetail, InteractionMeta, OP_GET_ANSWER, OP_GET_TEST, QuizPublic, QuizRecord,
    },
    notify::{Notice, Notifier},
    statistics,
    utils::jwt::Claims,
};

/// Checks the caller's daily token spend after a recorded interaction and
/// enqueues a `token_limit` notice the moment the budget is crossed.
/// Best-effort: any failure here is logged and the request proceeds.
async fn check_token_budget(pool: &PgPool, config: &Config, notifier: &Notifier, user_id: i64, call_tokens: i64) {
    let result: Result<(), AppError> = async {
        let by_doc = statistics::tokens_by_doc_since(pool, user_id, statistics::today_local()).await?;
        let total_after: i64 = by_doc.iter().map(|(_, spent)| spent).sum();

        if !statistics::crossed_limit(total_after, call_tokens, config.daily_token_limit) {
            return Ok(());
        }

        let identity: Option<(String, String, String)> =
            sqlx::query_as("SELECT name, surname, email FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(pool)
                .await?;

        let Some((name, surname, email)) = identity else {
            return Ok(());
        };

        let tokens_by_doc: HashMap<String, i64> = by_doc
            .into_iter()
            .map(|(doc, spent)| (doc.unwrap_or_else(|| "unknown".to_string()), spent))
            .collect();

        notifier.dispatch(Notice::TokenLimit {
            name,
            surname,
            email,
            tokens_by_doc,
        });

        Ok(())
    }
    .await;

    if let Err(e) = result {
        tracing::warn!("Token budget check failed for user {}: {}", user_id, e);
    }
}

/// Proxies a question to the QA system and records the interaction.
///
/// The document must exist in the catalog; on upstream failure nothing is
/// recorded and the error surfaces as 502.
#[utoipa::path(
    post,
    path = "/api/llm/get_answer",
    params(GetAnswerParams),
    responses(
        (status = 200, description = "Answer with the interaction id", body = AnswerPublic),
        (status = 404, description = "Document not found"),
        (status = 502, description = "LLM service failed")
    ),
    tag = "llm"
)]
pub async fn get_answer(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    State(llm): State<LlmClient>,
    State(notifier): State<Notifier>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<GetAnswerParams>,
) -> Result<impl IntoResponse, AppError> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM docs WHERE name = $1")
        .bind(&params.filename)
        .fetch_optional(&pool)
        .await?;

    if exists.is_none() {
        return Err(AppError::NotFound(
            "Document with this name was not found".to_string(),
        ));
    }

    let response = llm.ask(&params.filename, &params.question).await?;

    let user_id = claims.user_id();
    let request_id = statistics::record_interaction(
        &pool,
        InteractionMeta {
            user_id,
            operation: OP_GET_ANSWER,
            doc_name: Some(params.filename.clone()),
            prompt_path: response.prompt_path.clone(),
            tokens: response.tokens,
            embedding_tokens: response.embedding_tokens,
            total_time: response.total_time,
            gigachat_time: response.gigachat_time,
            from_cache: response.from_cache,
        },
        InteractionDetail::Answer {
            question: params.question.clone(),
            answer: response.result.clone(),
            metrics: response.metrics.clone(),
        },
    )
    .await?;

    if response.total_time > config.qa_time_limit {
        notifier.dispatch(Notice::QaTimeLimit {
            filename: params.filename.clone(),
            tokens: response.tokens,
            total_time: response.total_time,
            gigachat_time: response.gigachat_time,
            question: params.question.clone(),
            answer: response.result.clone(),
        });
    }

    let call_tokens = (response.tokens + response.embedding_tokens) as i64;
    check_token_budget(&pool, &config, &notifier, user_id, call_tokens).await;

    Ok(Json(AnswerPublic {
        request_id,
        result: response.result,
    }))
}

/// Generates a quiz question from a document and records the interaction.
/// The right answer never leaves the server.
#[utoipa::path(
    post,
    path = "/api/llm/get_test",
    params(GetTestParams),
    responses(
        (status = 200, description = "Quiz with the interaction id", body = QuizPublic),
        (status = 502, description = "LLM service failed")
    ),
    tag = "llm"
)]
pub async fn get_test(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    State(llm): State<LlmClient>,
    State(notifier): State<Notifier>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<GetTestParams>,
) -> Result<impl IntoResponse, AppError> {
    let response = llm.generate_quiz(&params.filename).await?;
    let quiz = response.result;

    let user_id = claims.user_id();
    let options = [
        quiz.option_1.clone(),
        quiz.option_2.clone(),
        quiz.option_3.clone(),
        quiz.option_4.clone(),
    ];

    let request_id = statistics::record_interaction(
        &pool,
        InteractionMeta {
            user_id,
            operation: OP_GET_TEST,
            doc_name: Some(params.filename.clone()),
            prompt_path: response.prompt_path.clone(),
            tokens: response.tokens,
            embedding_tokens: 0,
            total_time: response.total_time,
            gigachat_time: response.gigachat_time,
            from_cache: false,
        },
        InteractionDetail::Quiz {
            question: quiz.question.clone(),
            options: options.clone(),
            right_answer: quiz.right_answer.clone(),
            generation_attempts: quiz.generation_attempts,
        },
    )
    .await?;

    if response.total_time > config.qa_time_limit {
        notifier.dispatch(Notice::TestTimeLimit {
            filename: params.filename.clone(),
            tokens: response.tokens,
            total_time: response.total_time,
            gigachat_time: response.gigachat_time,
            generation_attempts: quiz.generation_attempts,
            question: quiz.question.clone(),
            options: options.to_vec(),
            right_answer: quiz.right_answer.clone(),
        });
    }

    check_token_budget(&pool, &config, &notifier, user_id, response.tokens as i64).await;

    Ok(Json(QuizPublic {
        request_id,
        question: quiz.question,
        options: options.to_vec(),
    }))
}

/// Scores a submitted quiz answer.
///
/// Stamps the answered-at time, runs the lookup-window cheat check, updates
/// the contest ledger when the document is part of a contest, and returns
/// the right answer with the awarded score.
#[utoipa::path(
    post,
    path = "/api/llm/check_test",
    request_body = CheckTestRequest,
    responses(
        (status = 200, description = "Right answer and awarded score", body = CheckTestResponse),
        (status = 400, description = "Question does not exist or was already answered")
    ),
    tag = "llm"
)]
pub async fn check_test(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CheckTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    let quiz: Option<QuizRecord> = sqlx::query_as(
        r#"
        SELECT t.question, t.right_answer, t.answered_at, s.timestamp, s.doc_name
        FROM test_system t
        JOIN request_statistic s ON s.id = t.request_id
        WHERE t.request_id = $1
        "#,
    )
    .bind(payload.request_id)
    .fetch_optional(&pool)
    .await?;

    let quiz = match quiz {
        Some(quiz) if quiz.answered_at.is_none() => quiz,
        _ => {
            return Err(AppError::BadRequest(
                "Question does not exist or already answered".to_string(),
            ));
        }
    };

    let answered_at = statistics::now_local();

    // Conditional update so a racing duplicate submission loses cleanly.
    let stamped = sqlx::query(
        "UPDATE test_system SET answered_at = $1 WHERE request_id = $2 AND answered_at IS NULL",
    )
    .bind(answered_at)
    .bind(payload.request_id)
    .execute(&pool)
    .await?;

    if stamped.rows_affected() == 0 {
        return Err(AppError::BadRequest(
            "Question does not exist or already answered".to_string(),
        ));
    }

    let user_id = claims.user_id();

    let score = match &quiz.doc_name {
        Some(doc_name) => {
            contest::score_answer(
                &pool,
                user_id,
                doc_name,
                &quiz.question,
                &payload.selected_option,
                &quiz.right_answer,
                quiz.timestamp,
                answered_at,
                config.partial_credit,
            )
            .await?
        }
        None => contest::judge_answer(
            &payload.selected_option,
            &quiz.right_answer,
            &quiz.question,
            &[],
            config.partial_credit,
        ),
    };

    if let Some(doc_name) = &quiz.doc_name {
        let in_contest: Option<bool> =
            sqlx::query_scalar("SELECT in_contest FROM docs WHERE name = $1")
                .bind(doc_name)
                .fetch_optional(&pool)
                .await?;

        if in_contest.unwrap_or(false) {
            contest::upsert_score(&pool, user_id, doc_name, score).await?;
        }
    }

    Ok(Json(CheckTestResponse {
        right_answer: quiz.right_answer,
        score,
    }))
}

/// Records user feedback on a prior interaction.
#[utoipa::path(
    post,
    path = "/api/llm/send_feedback",
    request_body = FeedbackRequest,
    responses(
        (status = 200, description = "Feedback stored"),
        (status = 404, description = "Interaction not found")
    ),
    tag = "llm"
)]
pub async fn send_feedback(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<FeedbackRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    statistics::record_feedback(&pool, claims.user_id(), &payload).await?;

    Ok(Json(serde_json::json!({
        "result": "feedback added successfully"
    })))
}
