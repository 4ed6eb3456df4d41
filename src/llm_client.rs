// src/llm_client.rs

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::AppError;

/// Response of the question-answering endpoint (`process_questions`).
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerResponse {
    pub result: String,
    pub tokens: i32,
    #[serde(default)]
    pub embedding_tokens: i32,
    pub total_time: f64,
    pub gigachat_time: f64,
    #[serde(default)]
    pub metrics: serde_json::Value,
    #[serde(default)]
    pub from_cache: bool,
    pub prompt_path: String,
}

/// Inner quiz payload of the quiz-generation endpoint. Field names follow
/// the microservice's wire format verbatim.
#[derive(Debug, Clone, Deserialize)]
pub struct QuizPayload {
    pub question: String,
    #[serde(rename = "1 option")]
    pub option_1: String,
    #[serde(rename = "2 option")]
    pub option_2: String,
    #[serde(rename = "3 option")]
    pub option_3: String,
    #[serde(rename = "4 option")]
    pub option_4: String,
    #[serde(rename = "right answer")]
    pub right_answer: String,
    #[serde(rename = "generation_attemps")]
    pub generation_attempts: i32,
}

/// Response of the quiz-generation endpoint (`process_data`).
#[derive(Debug, Clone, Deserialize)]
pub struct QuizResponse {
    pub result: QuizPayload,
    pub tokens: i32,
    pub total_time: f64,
    pub gigachat_time: f64,
    pub prompt_path: String,
}

/// Chunking info reported by the document-ingestion endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadInfo {
    pub chunk_size: i32,
    pub embedding_model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub result: String,
    pub info: Option<UploadInfo>,
}

/// Thin typed client for the LLM microservice. All calls share one
/// connection pool and the configured timeout; any transport error, non-2xx
/// status or malformed body surfaces as `AppError::BadGateway` and nothing
/// is persisted by the caller.
#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    base: Url,
}

impl LlmClient {
    pub fn new(base: Url, timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { http, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url, AppError> {
        self.base
            .join(path)
            .map_err(|e| AppError::InternalServerError(e.to_string()))
    }

    /// Asks the QA system a question about a document.
    pub async fn ask(&self, filename: &str, question: &str) -> Result<AnswerResponse, AppError> {
        let url = self.endpoint("process_questions")?;
        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({ "filename": filename, "question": question }))
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    /// Generates a quiz question from a document.
    pub async fn generate_quiz(&self, filename: &str) -> Result<QuizResponse, AppError> {
        let url = self.endpoint("process_data")?;
        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({ "filename": filename }))
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    /// Sends a new document to be indexed.
    pub async fn upload_doc(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadResponse, AppError> {
        let url = self.endpoint("process_doc")?;
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_owned())
            .mime_str("application/octet-stream")
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    /// Appends data to an already indexed document.
    pub async fn add_data(&self, file_name: &str, bytes: Vec<u8>) -> Result<(), AppError> {
        let url = self.endpoint("process_add_data")?;
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_owned())
            .mime_str("application/octet-stream")
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        self.http
            .post(url)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    /// Renames a document on the LLM side.
    pub async fn rename_doc(&self, current_name: &str, new_name: &str) -> Result<(), AppError> {
        let url = self.endpoint("process_change_doc_name")?;
        self.http
            .post(url)
            .json(&serde_json::json!({ "doc_name": current_name, "new_name": new_name }))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    /// Removes a document from the LLM index.
    pub async fn delete_doc(&self, doc_name: &str) -> Result<(), AppError> {
        let url = self.endpoint("process_delete_doc")?;
        self.http
            .post(url)
            .json(&serde_json::json!({ "doc_name": doc_name }))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiz_response_parses_wire_field_names() {
        let raw = serde_json::json!({
            "result": {
                "question": "What is the capacity?",
                "1 option": "10",
                "2 option": "20",
                "3 option": "30",
                "4 option": "40",
                "right answer": "20",
                "generation_attemps": 2
            },
            "tokens": 512,
            "total_time": 3.2,
            "gigachat_time": 2.8,
            "prompt_path": "prompts/test.txt"
        });

        let parsed: QuizResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.result.option_2, "20");
        assert_eq!(parsed.result.right_answer, "20");
        assert_eq!(parsed.result.generation_attempts, 2);
    }

    #[test]
    fn answer_response_defaults_optional_fields() {
        let raw = serde_json::json!({
            "result": "42",
            "tokens": 100,
            "total_time": 1.5,
            "gigachat_time": 1.1,
            "prompt_path": "prompts/qa.txt"
        });

        let parsed: AnswerResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.embedding_tokens, 0);
        assert!(!parsed.from_cache);
        assert!(parsed.metrics.is_null());
    }
}
