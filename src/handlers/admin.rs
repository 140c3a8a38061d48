// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        attempt::GradeAnswerRequest,
        credit::GrantCreditsRequest,
        question_set::{CreateCategoryRequest, CreateQuestionSetRequest},
    },
    services::{attempt, catalog, ledger},
};

pub async fn create_category(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let category = catalog::create_category(&pool, payload.name.trim()).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn list_categories(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(catalog::list_categories(&pool).await?))
}

/// Creates a question set in DRAFT status, with its questions and options.
/// Admin only.
pub async fn create_question_set(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateQuestionSetRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    if let Some(problem) = payload.consistency_error() {
        return Err(AppError::BadRequest(problem));
    }

    let set = catalog::create_question_set(&pool, &payload).await?;
    Ok((StatusCode::CREATED, Json(set)))
}

/// Makes a set visible to students.
pub async fn publish_question_set(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(catalog::publish_question_set(&pool, id).await?))
}

/// Credits a user's balance (PURCHASE, BONUS or REFUND).
/// Admin only.
pub async fn grant_credits(
    State(pool): State<SqlitePool>,
    Json(payload): Json<GrantCreditsRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
        .bind(payload.user_id)
        .fetch_optional(&pool)
        .await?;
    if user_exists.is_none() {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    let entry = ledger::add_credits(
        &pool,
        payload.user_id,
        payload.amount,
        payload.transaction_type,
        Some("admin_grant".to_string()),
        payload.description,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(entry)))
}

/// Stored answers of any attempt, for review before grading.
pub async fn list_attempt_answers(
    State(pool): State<SqlitePool>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(attempt::list_answers(&pool, attempt_id).await?))
}

/// Grades a SHORT/LONG answer and rescores its attempt.
pub async fn grade_answer(
    State(pool): State<SqlitePool>,
    Path(question_attempt_id): Path<i64>,
    Json(payload): Json<GradeAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = attempt::grade_answer(&pool, question_attempt_id, payload.is_correct).await?;
    Ok(Json(attempt))
}
