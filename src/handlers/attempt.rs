// src/handlers/attempt.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    error::AppError,
    models::attempt::AnswerRequest,
    services::{attempt, expiry::ExpiryScheduler},
    utils::jwt::Claims,
};

/// Starts an attempt on a question set.
///
/// * EXCLUSIVE sets consume one unused purchase.
/// * Time-limited sets get an expiry job.
/// * Options are returned without their correctness flags.
pub async fn start_attempt(
    State(pool): State<SqlitePool>,
    State(scheduler): State<ExpiryScheduler>,
    Extension(claims): Extension<Claims>,
    Path(question_set_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let started = attempt::start_attempt(&pool, &scheduler, user_id, question_set_id).await?;
    Ok((StatusCode::CREATED, Json(started)))
}

/// Saves the answer to one question. Re-answering overwrites the previous answer.
pub async fn answer_question(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path((attempt_id, question_id)): Path<(i64, i64)>,
    Json(payload): Json<AnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.user_id()?;

    attempt::answer_question(&pool, user_id, attempt_id, question_id, &payload).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Answer saved",
    })))
}

/// Finishes an attempt and returns its score.
pub async fn finish_attempt(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let summary = attempt::finish_attempt(&pool, user_id, attempt_id).await?;
    Ok(Json(summary))
}

pub async fn list_history(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    Ok(Json(attempt::list_attempts(&pool, user_id).await?))
}

pub async fn get_attempt(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    Ok(Json(attempt::attempt_detail(&pool, user_id, attempt_id).await?))
}
