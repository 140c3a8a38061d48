// src/services/attempt.rs

//! Attempt sessions: start, answer, and the single completion path shared by an
//! explicit finish and both expiry mechanisms.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use crate::{
    error::AppError,
    models::{
        attempt::{
            AnswerRequest, AttemptDetail, QuestionAttempt, QuestionSetAttempt, ScoreSummary,
            StartAttemptResponse,
        },
        question_set::{AccessType, QuestionType},
    },
    services::{
        catalog,
        expiry::ExpiryScheduler,
        grading::{self, Answer, AnswerOutcome, ScoreCard, Verdict},
        purchase,
    },
};

const ATTEMPT_COLUMNS: &str = "id, user_id, question_set_id, started_at, completed_at, \
                               is_completed, score, percentage, is_checked";

const ANSWER_COLUMNS: &str = "id, question_set_attempt_id, question_id, selected_option_id, \
                              selected_boolean_answer, selected_text_answer, is_correct, \
                              graded_at, answered_at";

/// Result of [`complete_attempt`].
#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    /// This call scored the attempt.
    Completed { attempt: QuestionSetAttempt, card: ScoreCard },
    /// Someone else completed it first; nothing was written.
    AlreadyCompleted(QuestionSetAttempt),
}

#[derive(FromRow)]
struct OutcomeRow {
    is_correct: bool,
    question_type: QuestionType,
    graded_at: Option<DateTime<Utc>>,
}

async fn fetch_attempt(
    conn: &mut SqliteConnection,
    attempt_id: i64,
) -> Result<Option<QuestionSetAttempt>, AppError> {
    let attempt = sqlx::query_as::<_, QuestionSetAttempt>(&format!(
        "SELECT {} FROM question_set_attempts WHERE id = ?",
        ATTEMPT_COLUMNS
    ))
    .bind(attempt_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(attempt)
}

/// Fetches an attempt owned by `user_id`. Other users' attempts look missing.
async fn fetch_own_attempt(
    conn: &mut SqliteConnection,
    user_id: i64,
    attempt_id: i64,
) -> Result<QuestionSetAttempt, AppError> {
    match fetch_attempt(conn, attempt_id).await? {
        Some(attempt) if attempt.user_id == user_id => Ok(attempt),
        _ => Err(AppError::NotFound("Attempt not found".to_string())),
    }
}

/// Starts an attempt. On EXCLUSIVE sets one unused purchase is consumed in the same
/// transaction as the insert; without one nothing is created. Time-limited attempts get
/// an expiry job once committed.
pub async fn start_attempt(
    pool: &SqlitePool,
    scheduler: &ExpiryScheduler,
    user_id: i64,
    question_set_id: i64,
) -> Result<StartAttemptResponse, AppError> {
    let tree = {
        let mut conn = pool.acquire().await?;
        catalog::load_published_tree(&mut conn, question_set_id).await?
    };

    let started_at = Utc::now();
    let mut tx = pool.begin().await?;

    let attempt_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO question_set_attempts (user_id, question_set_id, started_at, is_completed, is_checked)
        VALUES (?, ?, ?, FALSE, FALSE)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(question_set_id)
    .bind(started_at)
    .fetch_one(&mut *tx)
    .await?;

    if tree.set.access_type == AccessType::Exclusive {
        let purchase_id =
            purchase::consume_entitlement(&mut tx, user_id, question_set_id, attempt_id).await?;
        tracing::debug!("Attempt {} consumed purchase {}", attempt_id, purchase_id);
    }

    tx.commit().await?;

    let deadline = tree.set.deadline_for(started_at);
    if let Some(limit) = tree.set.time_limit() {
        match limit.to_std() {
            Ok(delay) => scheduler.schedule(attempt_id, delay),
            Err(e) => tracing::warn!("Attempt {} has an unschedulable limit: {}", attempt_id, e),
        }
    }

    tracing::info!(
        "User {} started attempt {} on question set {}",
        user_id,
        attempt_id,
        question_set_id
    );

    Ok(StartAttemptResponse {
        attempt: QuestionSetAttempt {
            id: attempt_id,
            user_id,
            question_set_id,
            started_at,
            completed_at: None,
            is_completed: false,
            score: None,
            percentage: None,
            is_checked: false,
        },
        question_set: tree.into(),
        deadline,
    })
}

/// Records (or replaces) the answer to one question of an open attempt.
///
/// The deadline is checked here as well as by the expiry paths, since an answer can
/// arrive after the deadline but before either of them has run.
pub async fn answer_question(
    pool: &SqlitePool,
    user_id: i64,
    attempt_id: i64,
    question_id: i64,
    req: &AnswerRequest,
) -> Result<Verdict, AppError> {
    let mut conn = pool.acquire().await?;

    let attempt = match fetch_attempt(&mut conn, attempt_id).await? {
        Some(attempt) if attempt.user_id == user_id && !attempt.is_completed => attempt,
        _ => return Err(already_completed_or_missing()),
    };

    let set = catalog::fetch_question_set(&mut conn, attempt.question_set_id).await?;
    let now = Utc::now();
    if set.deadline_for(attempt.started_at).is_some_and(|deadline| now > deadline) {
        return Err(AppError::TimeExpired);
    }

    let question = catalog::fetch_question_in_set(&mut conn, set.id, question_id).await?;
    let answer = Answer::from_request(question.question_type, req)?;
    let verdict = answer.evaluate(&question)?;
    let (option_id, boolean, text) = answer.columns();

    // Single statement: the row is only written while the attempt is still open.
    let written = sqlx::query(
        r#"
        INSERT INTO question_attempts
            (question_set_attempt_id, question_id, selected_option_id, selected_boolean_answer,
             selected_text_answer, is_correct, answered_at)
        SELECT ?, ?, ?, ?, ?, ?, ?
        WHERE EXISTS (
            SELECT 1 FROM question_set_attempts WHERE id = ? AND is_completed = FALSE
        )
        ON CONFLICT (question_set_attempt_id, question_id) DO UPDATE SET
            selected_option_id = excluded.selected_option_id,
            selected_boolean_answer = excluded.selected_boolean_answer,
            selected_text_answer = excluded.selected_text_answer,
            is_correct = excluded.is_correct,
            graded_at = NULL,
            answered_at = excluded.answered_at
        "#,
    )
    .bind(attempt_id)
    .bind(question_id)
    .bind(option_id)
    .bind(boolean)
    .bind(text)
    .bind(verdict.is_correct())
    .bind(now)
    .bind(attempt_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if written == 0 {
        return Err(already_completed_or_missing());
    }

    tracing::debug!(
        "Attempt {} answered question {}: {:?}",
        attempt_id,
        question_id,
        verdict
    );
    Ok(verdict)
}

fn already_completed_or_missing() -> AppError {
    AppError::Conflict("Attempt already completed or not found".to_string())
}

/// Counts the set's questions and the attempt's stored answers into a score card.
async fn tally(
    conn: &mut SqliteConnection,
    attempt: &QuestionSetAttempt,
) -> Result<ScoreCard, AppError> {
    let total = catalog::count_questions(conn, attempt.question_set_id).await?;

    let rows = sqlx::query_as::<_, OutcomeRow>(
        r#"
        SELECT qa.is_correct, q.question_type, qa.graded_at
        FROM question_attempts qa
        JOIN questions q ON q.id = qa.question_id
        WHERE qa.question_set_attempt_id = ?
        "#,
    )
    .bind(attempt.id)
    .fetch_all(&mut *conn)
    .await?;

    let outcomes: Vec<AnswerOutcome> = rows
        .into_iter()
        .map(|r| AnswerOutcome {
            is_correct: r.is_correct,
            awaiting_review: r.question_type.requires_manual_grading() && r.graded_at.is_none(),
        })
        .collect();

    Ok(grading::score_attempt(total, &outcomes))
}

async fn store_score(
    conn: &mut SqliteConnection,
    attempt_id: i64,
    card: &ScoreCard,
) -> Result<QuestionSetAttempt, AppError> {
    let attempt = sqlx::query_as::<_, QuestionSetAttempt>(&format!(
        "UPDATE question_set_attempts SET score = ?, percentage = ?, is_checked = ? \
         WHERE id = ? RETURNING {}",
        ATTEMPT_COLUMNS
    ))
    .bind(card.score)
    .bind(card.percentage)
    .bind(card.is_checked)
    .bind(attempt_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(attempt)
}

/// Scores and closes an attempt exactly once.
///
/// The first statement flips `is_completed` conditionally; whichever caller gets the
/// row scores it, every other caller sees [`CompletionOutcome::AlreadyCompleted`].
pub async fn complete_attempt(
    pool: &SqlitePool,
    attempt_id: i64,
    now: DateTime<Utc>,
) -> Result<CompletionOutcome, AppError> {
    let mut tx = pool.begin().await?;

    let claimed = sqlx::query(
        "UPDATE question_set_attempts SET is_completed = TRUE, completed_at = ? \
         WHERE id = ? AND is_completed = FALSE",
    )
    .bind(now)
    .bind(attempt_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if claimed == 0 {
        let existing = fetch_attempt(&mut tx, attempt_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Attempt not found".to_string()))?;
        return Ok(CompletionOutcome::AlreadyCompleted(existing));
    }

    let attempt = fetch_attempt(&mut tx, attempt_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Attempt not found".to_string()))?;
    let card = tally(&mut tx, &attempt).await?;
    let attempt = store_score(&mut tx, attempt_id, &card).await?;

    tx.commit().await?;

    tracing::info!(
        "Attempt {} completed: {}/{} ({:.1}%)",
        attempt_id,
        card.score,
        card.total,
        card.percentage
    );
    Ok(CompletionOutcome::Completed { attempt, card })
}

/// Client-initiated completion. Finishing twice is a conflict for the client.
pub async fn finish_attempt(
    pool: &SqlitePool,
    user_id: i64,
    attempt_id: i64,
) -> Result<ScoreSummary, AppError> {
    {
        let mut conn = pool.acquire().await?;
        fetch_own_attempt(&mut conn, user_id, attempt_id).await?;
    }

    match complete_attempt(pool, attempt_id, Utc::now()).await? {
        CompletionOutcome::Completed { card, .. } => Ok(ScoreSummary {
            score: card.score,
            total: card.total,
            percentage: card.percentage,
        }),
        CompletionOutcome::AlreadyCompleted(_) => Err(AppError::Conflict(
            "Attempt is already completed".to_string(),
        )),
    }
}

/// Own attempts, newest first.
pub async fn list_attempts(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<Vec<QuestionSetAttempt>, AppError> {
    let attempts = sqlx::query_as::<_, QuestionSetAttempt>(&format!(
        "SELECT {} FROM question_set_attempts WHERE user_id = ? ORDER BY started_at DESC, id DESC",
        ATTEMPT_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(attempts)
}

/// Own attempt; answers with their correctness are only included once it is completed.
pub async fn attempt_detail(
    pool: &SqlitePool,
    user_id: i64,
    attempt_id: i64,
) -> Result<AttemptDetail, AppError> {
    let mut conn = pool.acquire().await?;
    let attempt = fetch_own_attempt(&mut conn, user_id, attempt_id).await?;

    let answers = if attempt.is_completed {
        sqlx::query_as::<_, QuestionAttempt>(&format!(
            "SELECT {} FROM question_attempts WHERE question_set_attempt_id = ? ORDER BY question_id",
            ANSWER_COLUMNS
        ))
        .bind(attempt_id)
        .fetch_all(&mut *conn)
        .await?
    } else {
        Vec::new()
    };

    Ok(AttemptDetail { attempt, answers })
}

/// Answers stored for an attempt, in question order.
pub async fn list_answers(
    pool: &SqlitePool,
    attempt_id: i64,
) -> Result<Vec<QuestionAttempt>, AppError> {
    let answers = sqlx::query_as::<_, QuestionAttempt>(&format!(
        "SELECT {} FROM question_attempts WHERE question_set_attempt_id = ? ORDER BY question_id",
        ANSWER_COLUMNS
    ))
    .bind(attempt_id)
    .fetch_all(pool)
    .await?;
    Ok(answers)
}

#[derive(FromRow)]
struct GradedRow {
    question_set_attempt_id: i64,
    question_id: i64,
}

#[derive(FromRow)]
struct GradingContext {
    question_type: QuestionType,
    is_completed: bool,
}

/// Admin grading of a SHORT/LONG answer on a completed attempt. Rescores the attempt
/// with the usual denominator and marks it checked once nothing is left to review.
pub async fn grade_answer(
    pool: &SqlitePool,
    question_attempt_id: i64,
    is_correct: bool,
) -> Result<QuestionSetAttempt, AppError> {
    let mut tx = pool.begin().await?;

    // Write first so concurrent graders queue on the write lock. Rejections below
    // drop the transaction, which rolls this back.
    let target = sqlx::query_as::<_, GradedRow>(
        r#"
        UPDATE question_attempts SET is_correct = ?, graded_at = ?
        WHERE id = ?
        RETURNING question_set_attempt_id, question_id
        "#,
    )
    .bind(is_correct)
    .bind(Utc::now())
    .bind(question_attempt_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Answer not found".to_string()))?;

    let context = sqlx::query_as::<_, GradingContext>(
        r#"
        SELECT q.question_type, a.is_completed
        FROM questions q, question_set_attempts a
        WHERE q.id = ? AND a.id = ?
        "#,
    )
    .bind(target.question_id)
    .bind(target.question_set_attempt_id)
    .fetch_one(&mut *tx)
    .await?;

    if !context.question_type.requires_manual_grading() {
        return Err(AppError::BadRequest(
            "Only SHORT and LONG answers are graded manually".to_string(),
        ));
    }
    if !context.is_completed {
        return Err(AppError::Conflict("Attempt is still in progress".to_string()));
    }

    let attempt = fetch_attempt(&mut tx, target.question_set_attempt_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Attempt not found".to_string()))?;
    let card = tally(&mut tx, &attempt).await?;
    let attempt = store_score(&mut tx, attempt.id, &card).await?;

    tx.commit().await?;

    tracing::info!(
        "Graded answer {} on attempt {}: now {}/{}",
        question_attempt_id,
        attempt.id,
        card.score,
        card.total
    );
    Ok(attempt)
}
