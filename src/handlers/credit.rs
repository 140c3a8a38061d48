// src/handlers/credit.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    services::{ledger, purchase},
    utils::jwt::Claims,
};

/// Current credit balance (0 for users without a ledger yet).
pub async fn get_balance(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let balance = ledger::get_balance(&pool, claims.user_id()?).await?;
    Ok(Json(json!({ "balance": balance })))
}

pub async fn list_transactions(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(ledger::list_transactions(&pool, claims.user_id()?).await?))
}

/// Buys one attempt on an EXCLUSIVE question set.
/// The debit and the purchase record are committed together or not at all.
pub async fn purchase_question_set(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(question_set_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let purchase = purchase::purchase_question_set(&pool, user_id, question_set_id).await?;
    let balance = ledger::get_balance(&pool, user_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Question set purchased",
            "data": {
                "purchase": purchase,
                "balance": balance,
            },
        })),
    ))
}

pub async fn check_access(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(question_set_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let has_access = purchase::has_access(&pool, claims.user_id()?, question_set_id).await?;
    Ok(Json(json!({ "hasAccess": has_access })))
}
