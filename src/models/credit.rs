// src/models/credit.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Kind of ledger entry. Amounts are stored unsigned; the type carries the direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// Credits bought by the user.
    Purchase,
    /// Credits spent, e.g. on an exclusive question set.
    Usage,
    Refund,
    Bonus,
}

impl TransactionType {
    pub fn is_debit(self) -> bool {
        matches!(self, TransactionType::Usage)
    }

    /// Applies the direction of this type to an unsigned amount.
    pub fn signed(self, amount: i64) -> i64 {
        if self.is_debit() { -amount } else { amount }
    }
}

/// Represents the append-only 'credit_transactions' table.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditTransaction {
    pub id: i64,
    pub user_id: i64,
    pub amount: i64,
    pub transaction_type: TransactionType,
    pub reference_id: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Represents the 'question_set_purchases' table: one entitlement to attempt a set.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSetPurchase {
    pub id: i64,
    pub user_id: i64,
    pub question_set_id: i64,
    pub credit_transaction_id: i64,
    pub purchased_at: DateTime<Utc>,
    pub is_used: bool,
    pub question_set_attempt_id: Option<i64>,
}

/// A single balance change, signed: negative amounts debit.
#[derive(Debug, Clone)]
pub struct CreditMutation {
    pub user_id: i64,
    pub amount: i64,
    pub transaction_type: TransactionType,
    pub reference_id: Option<String>,
    pub description: Option<String>,
}

/// DTO for an admin crediting a user.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GrantCreditsRequest {
    pub user_id: i64,
    #[validate(range(min = 1, max = 1000000))]
    pub amount: i64,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}
