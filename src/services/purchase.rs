// src/services/purchase.rs

//! Access gate for EXCLUSIVE question sets: buying an entitlement with credits, and
//! consuming one when an attempt starts.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    error::AppError,
    models::{
        credit::{CreditMutation, QuestionSetPurchase, TransactionType},
        question_set::AccessType,
    },
    services::{catalog, ledger},
};

const PURCHASE_COLUMNS: &str = "id, user_id, question_set_id, credit_transaction_id, purchased_at, \
                                is_used, question_set_attempt_id";

/// Buys one attempt entitlement for an EXCLUSIVE set.
///
/// The debit and the purchase row share one transaction: if either fails, neither is
/// persisted.
pub async fn purchase_question_set(
    pool: &SqlitePool,
    user_id: i64,
    question_set_id: i64,
) -> Result<QuestionSetPurchase, AppError> {
    let mut tx = pool.begin().await?;

    // Write first so the balance read below is already under the write lock.
    ledger::ensure_account(&mut tx, user_id).await?;

    let set = catalog::fetch_published_question_set(&mut tx, question_set_id).await?;
    let cost = match (set.access_type, set.credit_cost) {
        (AccessType::Exclusive, Some(cost)) if cost > 0 => cost,
        (AccessType::Exclusive, _) => {
            return Err(AppError::BadRequest(
                "Question set has no valid credit cost".to_string(),
            ));
        }
        (AccessType::Free, _) => {
            return Err(AppError::BadRequest(
                "Free question sets cannot be purchased".to_string(),
            ));
        }
    };

    let balance = ledger::balance_of(&mut tx, user_id).await?;
    if balance < cost {
        return Err(AppError::InsufficientCredits { balance, required: cost });
    }

    let debit = ledger::apply_mutation(
        &mut tx,
        &CreditMutation {
            user_id,
            amount: -cost,
            transaction_type: TransactionType::Usage,
            reference_id: Some(format!("question_set:{}", set.id)),
            description: Some(format!("Purchased question set '{}'", set.name)),
        },
    )
    .await?;

    let purchase = sqlx::query_as::<_, QuestionSetPurchase>(&format!(
        r#"
        INSERT INTO question_set_purchases
            (user_id, question_set_id, credit_transaction_id, purchased_at, is_used)
        VALUES (?, ?, ?, ?, FALSE)
        RETURNING {}
        "#,
        PURCHASE_COLUMNS
    ))
    .bind(user_id)
    .bind(set.id)
    .bind(debit.id)
    .bind(Utc::now())
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to record purchase of set {}: {:?}", set.id, e);
        AppError::from(e)
    })?;

    tx.commit().await?;

    tracing::info!(
        "User {} purchased question set {} for {} credits",
        user_id,
        set.id,
        cost
    );
    Ok(purchase)
}

pub async fn has_unused_purchase(
    conn: &mut SqliteConnection,
    user_id: i64,
    question_set_id: i64,
) -> Result<bool, AppError> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM question_set_purchases \
         WHERE user_id = ? AND question_set_id = ? AND is_used = FALSE LIMIT 1",
    )
    .bind(user_id)
    .bind(question_set_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(found.is_some())
}

/// Whether the user may start an attempt on the set right now.
pub async fn has_access(
    pool: &SqlitePool,
    user_id: i64,
    question_set_id: i64,
) -> Result<bool, AppError> {
    let mut conn = pool.acquire().await?;
    let set = catalog::fetch_published_question_set(&mut conn, question_set_id).await?;
    match set.access_type {
        AccessType::Free => Ok(true),
        AccessType::Exclusive => has_unused_purchase(&mut conn, user_id, question_set_id).await,
    }
}

/// Marks the oldest unused entitlement as used by `attempt_id`.
/// Must run in the same transaction that inserts the attempt.
pub async fn consume_entitlement(
    conn: &mut SqliteConnection,
    user_id: i64,
    question_set_id: i64,
    attempt_id: i64,
) -> Result<i64, AppError> {
    let consumed: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE question_set_purchases
        SET is_used = TRUE, question_set_attempt_id = ?
        WHERE id = (
            SELECT id FROM question_set_purchases
            WHERE user_id = ? AND question_set_id = ? AND is_used = FALSE
            ORDER BY purchased_at, id
            LIMIT 1
        ) AND is_used = FALSE
        RETURNING id
        "#,
    )
    .bind(attempt_id)
    .bind(user_id)
    .bind(question_set_id)
    .fetch_optional(&mut *conn)
    .await?;

    consumed.ok_or_else(|| {
        AppError::Forbidden("Purchase this question set before starting an attempt".to_string())
    })
}
