// src/handlers/docs.rs

use axum::{
    Extension, Json,
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::AppError,
    llm_client::LlmClient,
    models::doc::{ChangeDocRequest, Doc, DocNameParams, DocSummary, UploadDocParams},
    utils::{jwt::Claims, text::validate_doc_name},
};

/// Extensions the ingestion pipeline accepts for a fresh document.
const UPLOAD_EXTENSIONS: [&str; 2] = ["zip", "txt"];

/// Reads the single "file" part out of a multipart body.
/// Returns (original file name, bytes).
async fn read_file_part(mut multipart: Multipart) -> Result<(String, Vec<u8>), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() == Some("file") {
            let file_name = field
                .file_name()
                .ok_or(AppError::BadRequest("File name is missing".to_string()))?
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            return Ok((file_name, bytes.to_vec()));
        }
    }

    Err(AppError::BadRequest("No file attached".to_string()))
}

fn file_extension(file_name: &str) -> Option<&str> {
    file_name.rsplit_once('.').map(|(_, ext)| ext)
}

/// Uploads a new document: the file is forwarded to the LLM service for
/// indexing and, on success, registered in the local catalog.
/// Admin only.
pub async fn upload_doc(
    State(pool): State<PgPool>,
    State(llm): State<LlmClient>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<UploadDocParams>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    validate_doc_name(&params.doc_name)?;

    let (file_name, bytes) = read_file_part(multipart).await?;

    let extension = file_extension(&file_name)
        .filter(|ext| UPLOAD_EXTENSIONS.contains(ext))
        .ok_or(AppError::BadRequest(
            "File has an unsupported extension".to_string(),
        ))?
        .to_string();

    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM docs WHERE name = $1")
        .bind(&params.doc_name)
        .fetch_optional(&pool)
        .await?;

    if existing.is_some() {
        return Err(AppError::Conflict(
            "Document with this name already exists".to_string(),
        ));
    }

    let upload_name = format!("{}.{}", params.doc_name, extension);
    tracing::debug!("Forwarding new document '{}' to the LLM service", upload_name);

    let response = llm.upload_doc(&upload_name, bytes).await?;

    if response.result != "success" {
        return Err(AppError::BadGateway(format!(
            "Document ingestion failed: {}",
            response.result
        )));
    }

    let info = response.info;

    sqlx::query(
        r#"
        INSERT INTO docs (name, doc_type, chunk_size, embedding_model, description, user_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(&params.doc_name)
    .bind(&extension)
    .bind(info.as_ref().map(|i| i.chunk_size))
    .bind(info.as_ref().map(|i| i.embedding_model.clone()))
    .bind(&params.doc_description)
    .bind(claims.user_id())
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to register document: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "added new doc" })),
    ))
}

/// Lists documents visible to the current user: their own uploads plus
/// every contest document.
pub async fn my_docs(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let docs = sqlx::query_as::<_, DocSummary>(
        "SELECT name, description FROM docs WHERE user_id = $1 OR in_contest = TRUE ORDER BY id",
    )
    .bind(claims.user_id())
    .fetch_all(&pool)
    .await?;

    Ok(Json(docs))
}

/// Lists every registered document with full catalog details.
/// Admin only.
pub async fn all_docs(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let docs = sqlx::query_as::<_, Doc>(
        "SELECT id, name, doc_type, chunk_size, embedding_model, description, user_id, in_contest
         FROM docs ORDER BY id",
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(docs))
}

/// Renames and/or re-describes a document. Renames are propagated to the
/// LLM service before the catalog row changes.
pub async fn change_doc(
    State(pool): State<PgPool>,
    State(llm): State<LlmClient>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ChangeDocRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let current: Option<(String, String, Option<i64>)> =
        sqlx::query_as("SELECT name, description, user_id FROM docs WHERE name = $1")
            .bind(&payload.current_name)
            .fetch_optional(&pool)
            .await?;

    let (cur_name, cur_description, owner_id) = current.ok_or(AppError::NotFound(
        "Document with this name was not found".to_string(),
    ))?;

    if !claims.superuser && owner_id != Some(claims.user_id()) {
        return Err(AppError::Forbidden("Forbidden".to_string()));
    }

    let new_name = payload
        .new_name
        .filter(|name| *name != cur_name)
        .map(|name| {
            validate_doc_name(&name)?;
            Ok::<_, AppError>(name)
        })
        .transpose()?;

    let new_description = payload
        .description
        .filter(|description| *description != cur_description);

    if new_name.is_none() && new_description.is_none() {
        return Ok(StatusCode::NO_CONTENT);
    }

    if let Some(name) = &new_name {
        llm.rename_doc(&cur_name, name).await?;
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE docs SET ");
    let mut separated = builder.separated(", ");

    if let Some(name) = new_name {
        separated.push("name = ");
        separated.push_bind_unseparated(name);
    }

    if let Some(description) = new_description {
        separated.push("description = ");
        separated.push_bind_unseparated(description);
    }

    builder.push(" WHERE name = ");
    builder.push_bind(payload.current_name.clone());

    builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update document: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(StatusCode::NO_CONTENT)
}

/// Appends more data to an existing document (txt only). The file is
/// forwarded to the LLM service; the catalog row is untouched.
pub async fn add_data(
    State(pool): State<PgPool>,
    State(llm): State<LlmClient>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<DocNameParams>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let owner: Option<Option<i64>> = sqlx::query_scalar("SELECT user_id FROM docs WHERE name = $1")
        .bind(&params.doc_name)
        .fetch_optional(&pool)
        .await?;

    let owner_id = owner.ok_or(AppError::NotFound(
        "Document with this name was not found".to_string(),
    ))?;

    if !claims.superuser && owner_id != Some(claims.user_id()) {
        return Err(AppError::Forbidden("Forbidden".to_string()));
    }

    let (file_name, bytes) = read_file_part(multipart).await?;

    if file_extension(&file_name) != Some("txt") {
        return Err(AppError::BadRequest(
            "File has an unsupported extension".to_string(),
        ));
    }

    let upload_name = format!("{}.txt", params.doc_name);
    llm.add_data(&upload_name, bytes).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Deletes a document from the catalog and asks the LLM service to drop its
/// index. Owners may delete their own documents; admins may delete any.
pub async fn delete_doc(
    State(pool): State<PgPool>,
    State(llm): State<LlmClient>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<DocNameParams>,
) -> Result<impl IntoResponse, AppError> {
    let owner: Option<Option<i64>> = sqlx::query_scalar("SELECT user_id FROM docs WHERE name = $1")
        .bind(&params.doc_name)
        .fetch_optional(&pool)
        .await?;

    let owner_id = owner.ok_or(AppError::NotFound("The doc does not exist.".to_string()))?;

    if !claims.superuser && owner_id != Some(claims.user_id()) {
        return Err(AppError::Forbidden("Forbidden".to_string()));
    }

    sqlx::query("DELETE FROM docs WHERE name = $1")
        .bind(&params.doc_name)
        .execute(&pool)
        .await?;

    // The catalog row is gone either way; a failed index cleanup is only
    // logged.
    if let Err(e) = llm.delete_doc(&params.doc_name).await {
        tracing::warn!("Failed to delete document index for '{}': {}", params.doc_name, e);
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_parsing() {
        assert_eq!(file_extension("manual.txt"), Some("txt"));
        assert_eq!(file_extension("archive.v2.zip"), Some("zip"));
        assert_eq!(file_extension("noext"), None);
    }
}
