// src/services/catalog.rs

//! Read access to question sets for the attempt and purchase flows, plus the admin
//! operations that create and publish them. Reads are never cached: every attempt
//! operation sees the set as it is stored at that moment.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    error::AppError,
    models::question_set::{
        Category, CreateQuestionSetRequest, Question, QuestionOption, QuestionSet,
        QuestionSetTree, SetStatus,
    },
};

const SET_COLUMNS: &str = "id, name, category_id, access_type, credit_cost, is_time_limited, \
                           time_limit_seconds, status, created_at";

const QUESTION_COLUMNS: &str = "id, question_set_id, question_type, content, \
                                correct_answer_boolean, correct_answer_text, position";

pub async fn fetch_question_set(
    conn: &mut SqliteConnection,
    question_set_id: i64,
) -> Result<QuestionSet, AppError> {
    sqlx::query_as::<_, QuestionSet>(&format!(
        "SELECT {} FROM question_sets WHERE id = ?",
        SET_COLUMNS
    ))
    .bind(question_set_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Question set not found".to_string()))
}

/// Like [`fetch_question_set`], but drafts are reported as missing.
pub async fn fetch_published_question_set(
    conn: &mut SqliteConnection,
    question_set_id: i64,
) -> Result<QuestionSet, AppError> {
    let set = fetch_question_set(conn, question_set_id).await?;
    if set.status != SetStatus::Published {
        return Err(AppError::NotFound("Question set not found".to_string()));
    }
    Ok(set)
}

/// Loads a published set with its ordered questions and options.
pub async fn load_published_tree(
    conn: &mut SqliteConnection,
    question_set_id: i64,
) -> Result<QuestionSetTree, AppError> {
    let set = fetch_published_question_set(conn, question_set_id).await?;

    let mut questions = sqlx::query_as::<_, Question>(&format!(
        "SELECT {} FROM questions WHERE question_set_id = ? ORDER BY position, id",
        QUESTION_COLUMNS
    ))
    .bind(question_set_id)
    .fetch_all(&mut *conn)
    .await?;

    let options = sqlx::query_as::<_, QuestionOption>(
        r#"
        SELECT o.id, o.question_id, o.text, o.is_correct, o.position
        FROM question_options o
        JOIN questions q ON q.id = o.question_id
        WHERE q.question_set_id = ?
        ORDER BY o.question_id, o.position, o.id
        "#,
    )
    .bind(question_set_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_question: HashMap<i64, Vec<QuestionOption>> = HashMap::new();
    for option in options {
        by_question.entry(option.question_id).or_default().push(option);
    }
    for question in &mut questions {
        question.options = by_question.remove(&question.id).unwrap_or_default();
    }

    Ok(QuestionSetTree { set, questions })
}

/// Fetches one question with its options, checking it belongs to `question_set_id`.
pub async fn fetch_question_in_set(
    conn: &mut SqliteConnection,
    question_set_id: i64,
    question_id: i64,
) -> Result<Question, AppError> {
    let mut question = sqlx::query_as::<_, Question>(&format!(
        "SELECT {} FROM questions WHERE id = ?",
        QUESTION_COLUMNS
    ))
    .bind(question_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;

    if question.question_set_id != question_set_id {
        return Err(AppError::BadRequest(
            "Question does not belong to this question set".to_string(),
        ));
    }

    question.options = sqlx::query_as::<_, QuestionOption>(
        "SELECT id, question_id, text, is_correct, position FROM question_options \
         WHERE question_id = ? ORDER BY position, id",
    )
    .bind(question_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(question)
}

/// Number of questions currently in the set; the scoring denominator.
pub async fn count_questions(
    conn: &mut SqliteConnection,
    question_set_id: i64,
) -> Result<i64, AppError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE question_set_id = ?")
        .bind(question_set_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

pub async fn list_published(pool: &SqlitePool) -> Result<Vec<QuestionSet>, AppError> {
    let sets = sqlx::query_as::<_, QuestionSet>(&format!(
        "SELECT {} FROM question_sets WHERE status = ? ORDER BY id DESC",
        SET_COLUMNS
    ))
    .bind(SetStatus::Published)
    .fetch_all(pool)
    .await?;
    Ok(sets)
}

pub async fn create_category(pool: &SqlitePool, name: &str) -> Result<Category, AppError> {
    sqlx::query_as::<_, Category>(
        "INSERT INTO categories (name, created_at) VALUES (?, ?) RETURNING id, name, created_at",
    )
    .bind(name)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint") {
            AppError::Conflict(format!("Category '{}' already exists", name))
        } else {
            tracing::error!("Failed to create category: {:?}", e);
            AppError::from(e)
        }
    })
}

pub async fn list_categories(pool: &SqlitePool) -> Result<Vec<Category>, AppError> {
    let categories =
        sqlx::query_as::<_, Category>("SELECT id, name, created_at FROM categories ORDER BY name")
            .fetch_all(pool)
            .await?;
    Ok(categories)
}

/// Inserts a DRAFT set with all of its questions and options in one transaction.
/// The request must already have passed validation.
pub async fn create_question_set(
    pool: &SqlitePool,
    req: &CreateQuestionSetRequest,
) -> Result<QuestionSet, AppError> {
    let mut tx = pool.begin().await?;

    if let Some(category_id) = req.category_id {
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM categories WHERE id = ?")
            .bind(category_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(AppError::NotFound("Category not found".to_string()));
        }
    }

    let set = sqlx::query_as::<_, QuestionSet>(&format!(
        r#"
        INSERT INTO question_sets
            (name, category_id, access_type, credit_cost, is_time_limited, time_limit_seconds, status, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING {}
        "#,
        SET_COLUMNS
    ))
    .bind(&req.name)
    .bind(req.category_id)
    .bind(req.access_type)
    .bind(req.credit_cost)
    .bind(req.is_time_limited)
    .bind(req.time_limit_seconds)
    .bind(SetStatus::Draft)
    .bind(Utc::now())
    .fetch_one(&mut *tx)
    .await?;

    for (position, question) in req.questions.iter().enumerate() {
        let question_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO questions
                (question_set_id, question_type, content, correct_answer_boolean, correct_answer_text, position)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(set.id)
        .bind(question.question_type)
        .bind(&question.content)
        .bind(question.correct_answer_boolean)
        .bind(&question.correct_answer_text)
        .bind(position as i64)
        .fetch_one(&mut *tx)
        .await?;

        for (opt_position, option) in question.options.iter().enumerate() {
            sqlx::query(
                "INSERT INTO question_options (question_id, text, is_correct, position) VALUES (?, ?, ?, ?)",
            )
            .bind(question_id)
            .bind(&option.text)
            .bind(option.is_correct)
            .bind(opt_position as i64)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;

    tracing::info!(
        "Created question set {} '{}' with {} questions",
        set.id,
        set.name,
        req.questions.len()
    );
    Ok(set)
}

pub async fn publish_question_set(
    pool: &SqlitePool,
    question_set_id: i64,
) -> Result<QuestionSet, AppError> {
    sqlx::query_as::<_, QuestionSet>(&format!(
        "UPDATE question_sets SET status = ? WHERE id = ? RETURNING {}",
        SET_COLUMNS
    ))
    .bind(SetStatus::Published)
    .bind(question_set_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Question set not found".to_string()))
}
