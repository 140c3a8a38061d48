// src/handlers/question_set.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::question_set::PublicQuestionSet,
    services::catalog,
};

/// Lists published question sets.
pub async fn list_question_sets(
    State(pool): State<SqlitePool>,
) -> Result<impl IntoResponse, AppError> {
    let sets = catalog::list_published(&pool).await?;
    Ok(Json(sets))
}

/// A published set with its questions. Answer keys are never included.
pub async fn get_question_set(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    let tree = catalog::load_published_tree(&mut conn, id).await?;
    Ok(Json(PublicQuestionSet::from(tree)))
}
