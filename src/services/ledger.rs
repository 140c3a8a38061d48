// src/services/ledger.rs

//! Credit ledger: per-user balance plus an append-only transaction log.
//!
//! [`apply_mutation`] runs inside the caller's transaction; [`update_credits`] and its
//! `add`/`deduct` wrappers own a transaction of their own. The balance never goes
//! negative and always equals the signed sum of the user's transactions.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    error::AppError,
    models::credit::{CreditMutation, CreditTransaction, TransactionType},
};

const TRANSACTION_COLUMNS: &str =
    "id, user_id, amount, transaction_type, reference_id, description, created_at";

/// Current balance; zero for users who never had a ledger row.
pub async fn balance_of(conn: &mut SqliteConnection, user_id: i64) -> Result<i64, AppError> {
    let balance: Option<i64> = sqlx::query_scalar("SELECT balance FROM user_credits WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(balance.unwrap_or(0))
}

pub async fn get_balance(pool: &SqlitePool, user_id: i64) -> Result<i64, AppError> {
    let mut conn = pool.acquire().await?;
    balance_of(&mut conn, user_id).await
}

/// Creates the user's zero-balance row if it does not exist yet.
pub async fn ensure_account(conn: &mut SqliteConnection, user_id: i64) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO user_credits (user_id, balance, updated_at) VALUES (?, 0, ?) \
         ON CONFLICT(user_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Applies one balance change and appends its log entry, without committing.
///
/// The balance check and update are a single conditional `UPDATE`, so two concurrent
/// debits cannot both pass against the same stale balance.
pub async fn apply_mutation(
    conn: &mut SqliteConnection,
    mutation: &CreditMutation,
) -> Result<CreditTransaction, AppError> {
    if mutation.amount == 0 {
        return Err(AppError::BadRequest("Credit amount must be non-zero".to_string()));
    }
    if mutation.transaction_type.is_debit() != (mutation.amount < 0) {
        return Err(AppError::BadRequest(format!(
            "{:?} does not match the direction of the amount",
            mutation.transaction_type
        )));
    }

    ensure_account(conn, mutation.user_id).await?;

    let now = Utc::now();
    let new_balance: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE user_credits
        SET balance = balance + ?, updated_at = ?
        WHERE user_id = ? AND balance + ? >= 0
        RETURNING balance
        "#,
    )
    .bind(mutation.amount)
    .bind(now)
    .bind(mutation.user_id)
    .bind(mutation.amount)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(new_balance) = new_balance else {
        let balance = balance_of(conn, mutation.user_id).await?;
        return Err(AppError::InsufficientCredits {
            balance,
            required: mutation.amount.abs(),
        });
    };

    let entry = sqlx::query_as::<_, CreditTransaction>(&format!(
        r#"
        INSERT INTO credit_transactions
            (user_id, amount, transaction_type, reference_id, description, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING {}
        "#,
        TRANSACTION_COLUMNS
    ))
    .bind(mutation.user_id)
    .bind(mutation.amount.abs())
    .bind(mutation.transaction_type)
    .bind(&mutation.reference_id)
    .bind(&mutation.description)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    tracing::info!(
        user_id = mutation.user_id,
        amount = mutation.amount,
        balance = new_balance,
        "Applied {:?} credit transaction {}",
        entry.transaction_type,
        entry.id
    );
    Ok(entry)
}

/// Applies a signed mutation in its own transaction. Any failure leaves both the
/// balance and the log untouched.
pub async fn update_credits(
    pool: &SqlitePool,
    mutation: CreditMutation,
) -> Result<CreditTransaction, AppError> {
    let mut tx = pool.begin().await?;
    let entry = apply_mutation(&mut tx, &mutation).await?;
    tx.commit().await?;
    Ok(entry)
}

pub async fn add_credits(
    pool: &SqlitePool,
    user_id: i64,
    amount: i64,
    transaction_type: TransactionType,
    reference_id: Option<String>,
    description: Option<String>,
) -> Result<CreditTransaction, AppError> {
    if amount <= 0 || transaction_type.is_debit() {
        return Err(AppError::BadRequest(
            "Credits can only be added with a positive amount and a crediting type".to_string(),
        ));
    }
    update_credits(
        pool,
        CreditMutation {
            user_id,
            amount: transaction_type.signed(amount),
            transaction_type,
            reference_id,
            description,
        },
    )
    .await
}

pub async fn deduct_credits(
    pool: &SqlitePool,
    user_id: i64,
    amount: i64,
    transaction_type: TransactionType,
    reference_id: Option<String>,
    description: Option<String>,
) -> Result<CreditTransaction, AppError> {
    if amount <= 0 || !transaction_type.is_debit() {
        return Err(AppError::BadRequest(
            "Credits can only be deducted with a positive amount and a debiting type".to_string(),
        ));
    }
    update_credits(
        pool,
        CreditMutation {
            user_id,
            amount: transaction_type.signed(amount),
            transaction_type,
            reference_id,
            description,
        },
    )
    .await
}

/// The user's log, newest first.
pub async fn list_transactions(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<Vec<CreditTransaction>, AppError> {
    let entries = sqlx::query_as::<_, CreditTransaction>(&format!(
        "SELECT {} FROM credit_transactions WHERE user_id = ? ORDER BY id DESC",
        TRANSACTION_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(entries)
}
