// src/models/attempt.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::question_set::PublicQuestionSet;

/// Represents the 'question_set_attempts' table: one user's pass through one set.
///
/// `is_completed` is the only terminal flag. `score`, `percentage` and
/// `completed_at` stay empty until the attempt is completed.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSetAttempt {
    pub id: i64,
    pub user_id: i64,
    pub question_set_id: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub is_completed: bool,
    pub score: Option<i64>,
    pub percentage: Option<f64>,

    /// False while any SHORT/LONG answer still waits for manual grading.
    pub is_checked: bool,
}

/// Represents the 'question_attempts' table. At most one row per (attempt, question).
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionAttempt {
    pub id: i64,
    pub question_set_attempt_id: i64,
    pub question_id: i64,
    pub selected_option_id: Option<i64>,
    pub selected_boolean_answer: Option<bool>,
    pub selected_text_answer: Option<String>,
    pub is_correct: bool,
    pub graded_at: Option<DateTime<Utc>>,
    pub answered_at: DateTime<Utc>,
}

/// DTO for answering one question of an attempt.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub selected_option_id: Option<i64>,
    pub selected_boolean_answer: Option<bool>,
    #[validate(length(max = 10000))]
    pub selected_text_answer: Option<String>,
}

/// Returned by the start endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAttemptResponse {
    pub attempt: QuestionSetAttempt,
    pub question_set: PublicQuestionSet,
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreSummary {
    pub score: i64,
    pub total: i64,
    pub percentage: f64,
}

/// Own attempt as shown in history. Answers are only revealed once completed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptDetail {
    pub attempt: QuestionSetAttempt,
    pub answers: Vec<QuestionAttempt>,
}

/// DTO for manually grading a SHORT/LONG answer.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeAnswerRequest {
    pub is_correct: bool,
}
