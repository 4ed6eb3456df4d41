// tests/api_tests.rs
//
// End-to-end tests against a real Postgres. They are ignored by default;
// run them with a database available:
//
//     DATABASE_URL=postgres://... cargo test -- --ignored

use std::net::SocketAddr;

use chrono::Duration;
use docqa_backend::config::Config;
use docqa_backend::llm_client::LlmClient;
use docqa_backend::notify::Notifier;
use docqa_backend::routes;
use docqa_backend::state::AppState;
use docqa_backend::utils::hash::hash_password;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

fn test_config(database_url: String) -> Config {
    Config {
        database_url,
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600, // 10 minutes for tests
        rust_log: "error".to_string(),
        admin_email: None,
        admin_password: None,
        send_admin_notices: false,
        // Nothing listens here; LLM-dependent paths are not exercised.
        llm_service_url: "http://127.0.0.1:9/".parse().unwrap(),
        llm_timeout_secs: 1,
        redis_url: "redis://127.0.0.1:6379/1".to_string(),
        cors_origins: vec!["http://localhost:3000".to_string()],
        qa_time_limit: 15.0,
        daily_token_limit: 63_000,
        partial_credit: 0.5,
    }
}

/// Helper function to spawn the app on a random port for testing.
/// Returns the base URL (e.g., "http://127.0.0.1:12345") and a pool for
/// direct seeding.
async fn spawn_app() -> (String, PgPool) {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing. Make sure DATABASE_URL is set.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = test_config(database_url);

    let llm = LlmClient::new(config.llm_service_url.clone(), config.llm_timeout_secs)
        .expect("Failed to build LLM client");

    let state = AppState {
        pool: pool.clone(),
        config,
        llm,
        // Notices go nowhere in tests.
        notifier: Notifier::discard(),
    };

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (address, pool)
}

fn unique_email() -> String {
    format!("u_{}@test.example", &uuid::Uuid::new_v4().to_string()[..8])
}

/// Seeds a verified user directly and returns (id, email).
async fn seed_verified_user(pool: &PgPool) -> (i64, String) {
    let email = unique_email();
    let hashed = hash_password("password123").unwrap();

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO users (name, surname, email, password, is_verified)
         VALUES ('Test', 'User', $1, $2, TRUE)
         RETURNING id",
    )
    .bind(&email)
    .bind(&hashed)
    .fetch_one(pool)
    .await
    .unwrap();

    (id, email)
}

async fn login(client: &reqwest::Client, address: &str, email: &str) -> String {
    let response = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({
            "email": email,
            "password": "password123"
        }))
        .send()
        .await
        .expect("Login failed")
        .json::<serde_json::Value>()
        .await
        .expect("Failed to parse login json");

    response["token"].as_str().expect("Token not found").to_string()
}

/// Seeds a contest document with a unique name.
async fn seed_contest_doc(pool: &PgPool) -> String {
    let name = format!("doc_{}", &uuid::Uuid::new_v4().to_string()[..8]);
    sqlx::query(
        "INSERT INTO docs (name, description, in_contest) VALUES ($1, 'test doc', TRUE)",
    )
    .bind(&name)
    .execute(pool)
    .await
    .unwrap();
    name
}

/// Seeds an unanswered quiz received at `received_at`; returns request_id.
async fn seed_quiz(
    pool: &PgPool,
    user_id: i64,
    doc_name: &str,
    question: &str,
    received_at: chrono::NaiveDateTime,
) -> i64 {
    let request_id: i64 = sqlx::query_scalar(
        "INSERT INTO request_statistic
            (user_id, timestamp, operation, doc_name, prompt_path,
             tokens, embedding_tokens, total_time, gigachat_time, from_cache)
         VALUES ($1, $2, 'get_test', $3, 'prompts/test.txt', 100, 0, 1.0, 0.8, FALSE)
         RETURNING id",
    )
    .bind(user_id)
    .bind(received_at)
    .bind(doc_name)
    .fetch_one(pool)
    .await
    .unwrap();

    sqlx::query(
        "INSERT INTO test_system
            (request_id, question, option_1, option_2, option_3, option_4,
             right_answer, generation_attempts)
         VALUES ($1, $2, 'A', 'B', 'C', 'D', 'B', 1)",
    )
    .bind(request_id)
    .bind(question)
    .execute(pool)
    .await
    .unwrap();

    request_id
}

/// Seeds an answer-lookup interaction at `at`.
async fn seed_lookup(
    pool: &PgPool,
    user_id: i64,
    doc_name: &str,
    question: &str,
    at: chrono::NaiveDateTime,
) {
    let request_id: i64 = sqlx::query_scalar(
        "INSERT INTO request_statistic
            (user_id, timestamp, operation, doc_name, prompt_path,
             tokens, embedding_tokens, total_time, gigachat_time, from_cache)
         VALUES ($1, $2, 'get_answer', $3, 'prompts/qa.txt', 100, 10, 1.0, 0.8, FALSE)
         RETURNING id",
    )
    .bind(user_id)
    .bind(at)
    .bind(doc_name)
    .fetch_one(pool)
    .await
    .unwrap();

    sqlx::query(
        "INSERT INTO answer_question_system (request_id, question, answer, metrics)
         VALUES ($1, $2, 'the answer', NULL)",
    )
    .bind(request_id)
    .bind(question)
    .execute(pool)
    .await
    .unwrap();
}

async fn check_test(
    client: &reqwest::Client,
    address: &str,
    token: &str,
    request_id: i64,
    selected: &str,
) -> serde_json::Value {
    client
        .post(format!("{}/api/llm/check_test", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({
            "request_id": request_id,
            "selected_option": selected
        }))
        .send()
        .await
        .expect("check_test failed")
        .json()
        .await
        .expect("Failed to parse check_test json")
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn health_check_404() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/random_path_that_does_not_exist", address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn register_works_and_files_admin_request() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let email = unique_email();

    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "name": "Ivan",
            "surname": "Petrov",
            "email": email,
            "password": "password123",
            "confirmation_password": "password123"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 201);

    let status: String = sqlx::query_scalar(
        "SELECT ar.status FROM admin_requests ar
         JOIN users u ON ar.user_id = u.id
         WHERE u.email = $1",
    )
    .bind(&email)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(status, "approval");
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn register_fails_validation() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    // Password too short.
    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "name": "Ivan",
            "surname": "Petrov",
            "email": unique_email(),
            "password": "yo",
            "confirmation_password": "yo"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn unverified_user_cannot_login() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let email = unique_email();

    client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "name": "Ivan",
            "surname": "Petrov",
            "email": email,
            "password": "password123",
            "confirmation_password": "password123"
        }))
        .send()
        .await
        .expect("Register failed");

    let response = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({
            "email": email,
            "password": "password123"
        }))
        .send()
        .await
        .expect("Login request failed");

    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn clean_correct_answer_scores_full_credit() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let (user_id, email) = seed_verified_user(&pool).await;
    let doc = seed_contest_doc(&pool).await;
    let token = login(&client, &address, &email).await;

    let received = chrono::Local::now().naive_local() - Duration::seconds(60);
    let request_id = seed_quiz(&pool, user_id, &doc, "What is the capacity?", received).await;

    let result = check_test(&client, &address, &token, request_id, "B").await;
    assert_eq!(result["right_answer"], "B");
    assert_eq!(result["score"], 1.0);

    let (total_tests, points, cheat_tests): (i32, f64, i32) = sqlx::query_as(
        "SELECT total_tests, points, cheat_tests FROM contest
         WHERE user_id = $1 AND doc_name = $2",
    )
    .bind(user_id)
    .bind(&doc)
    .fetch_one(&pool)
    .await
    .unwrap();

    assert_eq!(total_tests, 1);
    assert_eq!(points, 1.0);
    assert_eq!(cheat_tests, 0);
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn matching_lookup_in_window_halves_credit() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let (user_id, email) = seed_verified_user(&pool).await;
    let doc = seed_contest_doc(&pool).await;
    let token = login(&client, &address, &email).await;

    // Quiz received 60s ago, lookup with the same (normalized) question 30s
    // ago, answer submitted now.
    let received = chrono::Local::now().naive_local() - Duration::seconds(60);
    let request_id = seed_quiz(&pool, user_id, &doc, "What is the capacity?", received).await;
    seed_lookup(
        &pool,
        user_id,
        &doc,
        "what is the CAPACITY",
        received + Duration::seconds(30),
    )
    .await;

    let result = check_test(&client, &address, &token, request_id, "B").await;
    assert_eq!(result["score"], 0.5);

    let cheat_tests: i32 = sqlx::query_scalar(
        "SELECT cheat_tests FROM contest WHERE user_id = $1 AND doc_name = $2",
    )
    .bind(user_id)
    .bind(&doc)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(cheat_tests, 1);
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn unrelated_lookup_keeps_full_credit_and_wrong_answer_scores_zero() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let (user_id, email) = seed_verified_user(&pool).await;
    let doc = seed_contest_doc(&pool).await;
    let token = login(&client, &address, &email).await;

    let received = chrono::Local::now().naive_local() - Duration::seconds(60);
    let first = seed_quiz(&pool, user_id, &doc, "What is the capacity?", received).await;
    seed_lookup(
        &pool,
        user_id,
        &doc,
        "How do I configure logging?",
        received + Duration::seconds(30),
    )
    .await;

    let result = check_test(&client, &address, &token, first, "B").await;
    assert_eq!(result["score"], 1.0);

    // Second quiz answered wrong: 0 points, no cheat flag, but one more test.
    let second = seed_quiz(&pool, user_id, &doc, "What is the latency?", received).await;
    let result = check_test(&client, &address, &token, second, "A").await;
    assert_eq!(result["score"], 0.0);

    let (total_tests, points, cheat_tests): (i32, f64, i32) = sqlx::query_as(
        "SELECT total_tests, points, cheat_tests FROM contest
         WHERE user_id = $1 AND doc_name = $2",
    )
    .bind(user_id)
    .bind(&doc)
    .fetch_one(&pool)
    .await
    .unwrap();

    assert_eq!(total_tests, 2);
    assert_eq!(points, 1.0);
    assert_eq!(cheat_tests, 0);
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn quiz_cannot_be_answered_twice() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let (user_id, email) = seed_verified_user(&pool).await;
    let doc = seed_contest_doc(&pool).await;
    let token = login(&client, &address, &email).await;

    let received = chrono::Local::now().naive_local() - Duration::seconds(60);
    let request_id = seed_quiz(&pool, user_id, &doc, "What is the capacity?", received).await;

    check_test(&client, &address, &token, request_id, "B").await;

    let response = client
        .post(format!("{}/api/llm/check_test", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({
            "request_id": request_id,
            "selected_option": "B"
        }))
        .send()
        .await
        .expect("check_test failed");

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn leaderboard_ranks_and_personal_view() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let doc = seed_contest_doc(&pool).await;

    // Five contestants with descending points; the caller sits in 5th place.
    let mut users = Vec::new();
    for points in [9.0_f64, 7.0, 5.0, 3.0, 1.0] {
        let (user_id, email) = seed_verified_user(&pool).await;
        sqlx::query(
            "INSERT INTO contest (user_id, doc_name, total_tests, points)
             VALUES ($1, $2, 10, $3)",
        )
        .bind(user_id)
        .bind(&doc)
        .bind(points)
        .execute(&pool)
        .await
        .unwrap();
        users.push((user_id, email));
    }

    let token = login(&client, &address, &users[4].1).await;

    let full: Vec<serde_json::Value> = client
        .get(format!("{}/api/contest/leaderboard?doc_name={}", address, doc))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("leaderboard failed")
        .json()
        .await
        .unwrap();

    assert_eq!(full.len(), 5);
    let ranks: Vec<i64> = full.iter().map(|e| e["rank"].as_i64().unwrap()).collect();
    assert_eq!(ranks, vec![1, 2, 3, 4, 5]);

    let mine: Vec<serde_json::Value> = client
        .get(format!("{}/api/contest/my?doc_name={}", address, doc))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("my leaderboard failed")
        .json()
        .await
        .unwrap();

    // Top-3 plus the caller's own 5th-place entry.
    assert_eq!(mine.len(), 4);
    assert_eq!(mine[3]["rank"].as_i64().unwrap(), 5);
    assert_eq!(mine[3]["points"].as_f64().unwrap(), 1.0);
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn feedback_increments_contest_counter() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let (user_id, email) = seed_verified_user(&pool).await;
    let doc = seed_contest_doc(&pool).await;
    let token = login(&client, &address, &email).await;

    // Answer a quiz first so the ledger row exists.
    let received = chrono::Local::now().naive_local() - Duration::seconds(60);
    let request_id = seed_quiz(&pool, user_id, &doc, "What is the capacity?", received).await;
    check_test(&client, &address, &token, request_id, "B").await;

    let response = client
        .post(format!("{}/api/llm/send_feedback", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({
            "value": "dislike",
            "user_comment": "question was ambiguous",
            "request_id": request_id
        }))
        .send()
        .await
        .expect("send_feedback failed");

    assert_eq!(response.status().as_u16(), 200);

    let test_feedbacks: i32 = sqlx::query_scalar(
        "SELECT test_feedbacks FROM contest WHERE user_id = $1 AND doc_name = $2",
    )
    .bind(user_id)
    .bind(&doc)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(test_feedbacks, 1);
}
