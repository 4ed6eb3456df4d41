// src/config.rs

use std::env;

use dotenvy::dotenv;
use url::Url;

/// Application configuration, loaded once at startup and injected into
/// `AppState`. Core logic never reads the process environment directly.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,

    /// Seed account created at startup (superuser, pre-verified).
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    /// Whether registration also notifies the admin mailbox.
    pub send_admin_notices: bool,

    /// Base URL of the LLM microservice.
    pub llm_service_url: Url,
    /// Timeout for question/quiz/document calls to the LLM service, seconds.
    pub llm_timeout_secs: u64,

    /// Redis broker the notification worker consumes from.
    pub redis_url: String,

    pub cors_origins: Vec<String>,

    /// Latency above which an admin notice is enqueued, seconds.
    pub qa_time_limit: f64,
    /// Per-user daily token budget; crossing it enqueues an admin notice.
    pub daily_token_limit: i64,
    /// Credit awarded for a correct answer with a matching lookup in the
    /// quiz window.
    pub partial_credit: f64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3600);

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let llm_service_url = env::var("LLM_SERVICE_URL")
            .unwrap_or_else(|_| "http://gigachat_api:8080".to_string())
            .parse()
            .expect("LLM_SERVICE_URL must be a valid URL");

        let llm_timeout_secs = env::var("LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(150);

        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://redis:6379/1".to_string());

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let qa_time_limit = env::var("QA_TIME_LIMIT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(15.0);

        let daily_token_limit = env::var("DAILY_TOKEN_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(63_000);

        let partial_credit = env::var("PARTIAL_CREDIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.5);

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            admin_email: env::var("ADMIN_EMAIL").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            send_admin_notices: env::var("SEND_ADMIN_NOTICES")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            llm_service_url,
            llm_timeout_secs,
            redis_url,
            cors_origins,
            qa_time_limit,
            daily_token_limit,
            partial_credit,
        }
    }
}
