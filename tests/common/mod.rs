// tests/common/mod.rs
#![allow(dead_code)]

use chrono::Utc;
use quiz_backend::{
    db,
    models::question_set::{
        AccessType, CreateOptionRequest, CreateQuestionRequest, CreateQuestionSetRequest,
        QuestionSetTree, QuestionType,
    },
    services::catalog,
};
use sqlx::SqlitePool;

/// Fresh in-memory database with migrations applied.
pub async fn test_pool() -> SqlitePool {
    let pool = db::connect("sqlite::memory:", 1)
        .await
        .expect("Failed to open in-memory database");
    db::migrate(&pool).await.expect("Failed to migrate database");
    pool
}

/// File-backed database with several connections, for tests where writers must
/// actually contend. Run these on a multi-thread runtime.
pub async fn shared_pool() -> SqlitePool {
    let path = std::env::temp_dir().join(format!("quiz_{}.db", uuid::Uuid::new_v4()));
    let pool = db::connect(&format!("sqlite://{}", path.display()), 8)
        .await
        .expect("Failed to open file database");
    db::migrate(&pool).await.expect("Failed to migrate database");
    pool
}

pub async fn seed_user(pool: &SqlitePool, username: &str) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO users (username, password, role, created_at) VALUES (?, 'x', 'student', ?) RETURNING id",
    )
    .bind(username)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .expect("Failed to seed user")
}

pub fn mcq(content: &str) -> CreateQuestionRequest {
    CreateQuestionRequest {
        question_type: QuestionType::Mcq,
        content: content.to_string(),
        options: vec![
            CreateOptionRequest { text: "right".to_string(), is_correct: true },
            CreateOptionRequest { text: "wrong".to_string(), is_correct: false },
        ],
        correct_answer_boolean: None,
        correct_answer_text: None,
    }
}

pub fn true_or_false(answer: bool) -> CreateQuestionRequest {
    CreateQuestionRequest {
        question_type: QuestionType::TrueOrFalse,
        content: "The sky is blue".to_string(),
        options: vec![],
        correct_answer_boolean: Some(answer),
        correct_answer_text: None,
    }
}

pub fn fill_in(key: &str) -> CreateQuestionRequest {
    CreateQuestionRequest {
        question_type: QuestionType::FillInTheBlanks,
        content: "Plants make food by ____".to_string(),
        options: vec![],
        correct_answer_boolean: None,
        correct_answer_text: Some(key.to_string()),
    }
}

pub fn short_answer() -> CreateQuestionRequest {
    CreateQuestionRequest {
        question_type: QuestionType::Short,
        content: "Explain osmosis".to_string(),
        options: vec![],
        correct_answer_boolean: None,
        correct_answer_text: None,
    }
}

pub struct SetSpec {
    pub access_type: AccessType,
    pub credit_cost: Option<i64>,
    pub time_limit_seconds: Option<i64>,
    pub publish: bool,
}

impl SetSpec {
    pub fn free() -> Self {
        SetSpec { access_type: AccessType::Free, credit_cost: None, time_limit_seconds: None, publish: true }
    }

    pub fn timed(seconds: i64) -> Self {
        SetSpec { time_limit_seconds: Some(seconds), ..SetSpec::free() }
    }

    pub fn exclusive(cost: i64) -> Self {
        SetSpec { access_type: AccessType::Exclusive, credit_cost: Some(cost), ..SetSpec::free() }
    }
}

/// Creates (and by default publishes) a set, returning its loaded tree.
pub async fn seed_set(
    pool: &SqlitePool,
    spec: SetSpec,
    questions: Vec<CreateQuestionRequest>,
) -> QuestionSetTree {
    let req = CreateQuestionSetRequest {
        name: "Biology basics".to_string(),
        category_id: None,
        access_type: spec.access_type,
        credit_cost: spec.credit_cost,
        is_time_limited: spec.time_limit_seconds.is_some(),
        time_limit_seconds: spec.time_limit_seconds,
        questions,
    };
    assert_eq!(req.consistency_error(), None);

    let set = catalog::create_question_set(pool, &req)
        .await
        .expect("Failed to create set");
    if !spec.publish {
        let questions = Vec::new();
        return QuestionSetTree { set, questions };
    }
    catalog::publish_question_set(pool, set.id)
        .await
        .expect("Failed to publish set");

    let mut conn = pool.acquire().await.unwrap();
    catalog::load_published_tree(&mut conn, set.id)
        .await
        .expect("Failed to load set")
}

/// Id of the correct (or incorrect) option of an MCQ question.
pub fn option_id(tree: &QuestionSetTree, question_idx: usize, correct: bool) -> i64 {
    tree.questions[question_idx]
        .options
        .iter()
        .find(|o| o.is_correct == correct)
        .map(|o| o.id)
        .expect("MCQ question without matching option")
}

/// Signed sum of the user's ledger entries.
pub async fn ledger_sum(pool: &SqlitePool, user_id: i64) -> i64 {
    sqlx::query_scalar(
        "SELECT COALESCE(SUM(CASE WHEN transaction_type = 'USAGE' THEN -amount ELSE amount END), 0) \
         FROM credit_transactions WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}
