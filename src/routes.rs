// src/routes.rs

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::Method,
    middleware,
    routing::{delete, get, patch, post, put},
};
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;

use crate::{
    handlers::{admin, auth, contest, docs, llm},
    models::contest::LeaderboardEntry,
    models::feedback::FeedbackRequest,
    models::statistic::{AnswerPublic, CheckTestRequest, CheckTestResponse, QuizPublic},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        llm::get_answer,
        llm::get_test,
        llm::check_test,
        llm::send_feedback,
        contest::get_leaderboard,
        contest::get_my_leaderboard,
    ),
    components(schemas(
        AnswerPublic,
        QuizPublic,
        CheckTestRequest,
        CheckTestResponse,
        FeedbackRequest,
        LeaderboardEntry,
    )),
    tags(
        (name = "llm", description = "QA / quiz proxy to the LLM service"),
        (name = "contest", description = "Contest leaderboards"),
    )
)]
struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, docs, llm, contest, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (pool, config, LLM client, notifier).
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<_> = state
        .config
        .cors_origins
        .iter()
        .map(|origin| origin.parse().expect("invalid CORS origin"))
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    // The LLM proxy is the expensive surface; rate-limit it per client IP.
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(2)
        .burst_size(5)
        .finish()
        .unwrap();
    let governor_conf = Arc::new(governor_conf);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/verify", post(auth::verify))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password))
        .merge(
            Router::new()
                .route("/me", get(auth::get_me))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        );

    let docs_routes = Router::new()
        .route("/my", get(docs::my_docs))
        .route("/change_data", patch(docs::change_doc))
        .route("/add_data", post(docs::add_data))
        .route("/delete-my", delete(docs::delete_doc))
        .merge(
            // Upload and the full catalog are admin-only.
            Router::new()
                .route("/upload", post(docs::upload_doc))
                .route("/all", get(docs::all_docs))
                .layer(middleware::from_fn(admin_middleware)),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024));

    let llm_routes = Router::new()
        .route("/get_answer", post(llm::get_answer))
        .route("/get_test", post(llm::get_test))
        .route("/check_test", post(llm::check_test))
        .route("/send_feedback", post(llm::send_feedback))
        .layer(GovernorLayer::new(governor_conf))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let contest_routes = Router::new()
        .route("/leaderboard", get(contest::get_leaderboard))
        .route("/my", get(contest::get_my_leaderboard))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/requests", get(admin::list_requests))
        .route("/accept", post(admin::accept_request))
        .route("/reject", post(admin::reject_request))
        .route("/feedback", get(admin::list_feedback))
        .route("/feedback/{id}/viewed", put(admin::set_feedback_viewed))
        .route("/tokens", get(admin::token_report))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/docs", docs_routes)
        .nest("/api/llm", llm_routes)
        .nest("/api/contest", contest_routes)
        .nest("/api/admin", admin_routes)
        .route("/api/openapi.json", get(openapi_json))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
