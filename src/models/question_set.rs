// src/models/question_set.rs

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessType {
    Free,
    Exclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SetStatus {
    Draft,
    Published,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    Mcq,
    TrueOrFalse,
    FillInTheBlanks,
    Short,
    Long,
}

impl QuestionType {
    /// SHORT and LONG answers have no answer key and wait for an admin.
    pub fn requires_manual_grading(self) -> bool {
        matches!(self, QuestionType::Short | QuestionType::Long)
    }
}

/// Represents the 'categories' table.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Represents the 'question_sets' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSet {
    pub id: i64,
    pub name: String,
    pub category_id: Option<i64>,
    pub access_type: AccessType,

    /// Present iff the set is EXCLUSIVE.
    pub credit_cost: Option<i64>,

    pub is_time_limited: bool,

    /// Present iff the set is time limited.
    pub time_limit_seconds: Option<i64>,

    pub status: SetStatus,
    pub created_at: DateTime<Utc>,
}

impl QuestionSet {
    /// Time limit of an attempt on this set, `None` for untimed sets.
    pub fn time_limit(&self) -> Option<TimeDelta> {
        match (self.is_time_limited, self.time_limit_seconds) {
            (true, Some(secs)) if secs > 0 => Some(TimeDelta::seconds(secs)),
            _ => None,
        }
    }

    /// `started_at + time_limit`, the instant after which answers are refused.
    pub fn deadline_for(&self, started_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.time_limit().map(|limit| started_at + limit)
    }
}

/// Represents the 'questions' table. Options are attached after loading.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: i64,
    pub question_set_id: i64,
    pub question_type: QuestionType,
    pub content: String,

    /// Answer key for TRUE_OR_FALSE questions.
    pub correct_answer_boolean: Option<bool>,

    /// Answer key for FILL_IN_THE_BLANKS questions.
    pub correct_answer_text: Option<String>,

    pub position: i64,

    #[sqlx(skip)]
    pub options: Vec<QuestionOption>,
}

/// Represents the 'question_options' table.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    pub id: i64,
    pub question_id: i64,
    pub text: String,
    pub is_correct: bool,
    pub position: i64,
}

/// A set together with its ordered questions and their options.
#[derive(Debug, Clone)]
pub struct QuestionSetTree {
    pub set: QuestionSet,
    pub questions: Vec<Question>,
}

/// Option as shown to a student: never carries `is_correct`.
#[derive(Debug, Serialize)]
pub struct PublicOption {
    pub id: i64,
    pub text: String,
}

/// Question as shown to a student: answer keys are stripped.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub id: i64,
    pub question_type: QuestionType,
    pub content: String,
    pub options: Vec<PublicOption>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestionSet {
    pub id: i64,
    pub name: String,
    pub category_id: Option<i64>,
    pub access_type: AccessType,
    pub credit_cost: Option<i64>,
    pub is_time_limited: bool,
    pub time_limit_seconds: Option<i64>,
    pub questions: Vec<PublicQuestion>,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        PublicQuestion {
            id: q.id,
            question_type: q.question_type,
            content: q.content,
            options: q
                .options
                .into_iter()
                .map(|o| PublicOption { id: o.id, text: o.text })
                .collect(),
        }
    }
}

impl From<QuestionSetTree> for PublicQuestionSet {
    fn from(tree: QuestionSetTree) -> Self {
        let set = tree.set;
        PublicQuestionSet {
            id: set.id,
            name: set.name,
            category_id: set.category_id,
            access_type: set.access_type,
            credit_cost: set.credit_cost,
            is_time_limited: set.is_time_limited,
            time_limit_seconds: set.time_limit_seconds,
            questions: tree.questions.into_iter().map(PublicQuestion::from).collect(),
        }
    }
}

/// DTO for creating a category.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
}

/// DTO for creating a question set with its questions (admin).
#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuestionSetRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub category_id: Option<i64>,
    pub access_type: AccessType,
    #[validate(range(min = 1))]
    pub credit_cost: Option<i64>,
    #[serde(default)]
    pub is_time_limited: bool,
    // at most one week
    #[validate(range(min = 1, max = 604800))]
    pub time_limit_seconds: Option<i64>,
    #[validate(length(min = 1, max = 500), nested)]
    pub questions: Vec<CreateQuestionRequest>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuestionRequest {
    pub question_type: QuestionType,
    #[validate(length(min = 1, max = 2000))]
    pub content: String,
    #[serde(default)]
    #[validate(length(max = 10), nested)]
    pub options: Vec<CreateOptionRequest>,
    pub correct_answer_boolean: Option<bool>,
    #[validate(length(min = 1, max = 500))]
    pub correct_answer_text: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOptionRequest {
    #[validate(length(min = 1, max = 500))]
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

impl CreateQuestionSetRequest {
    /// Cross-field rules the derive cannot express.
    /// Returns the first violation as a message.
    pub fn consistency_error(&self) -> Option<String> {
        match (self.access_type, self.credit_cost) {
            (AccessType::Exclusive, None) => {
                return Some("creditCost is required for EXCLUSIVE sets".to_string());
            }
            (AccessType::Free, Some(_)) => {
                return Some("creditCost is only allowed on EXCLUSIVE sets".to_string());
            }
            _ => {}
        }
        match (self.is_time_limited, self.time_limit_seconds) {
            (true, None) => {
                return Some("timeLimitSeconds is required for time-limited sets".to_string());
            }
            (false, Some(_)) => {
                return Some("timeLimitSeconds requires isTimeLimited".to_string());
            }
            _ => {}
        }
        self.questions
            .iter()
            .enumerate()
            .find_map(|(idx, q)| q.consistency_error().map(|e| format!("question {}: {}", idx + 1, e)))
    }
}

impl CreateQuestionRequest {
    fn consistency_error(&self) -> Option<String> {
        match self.question_type {
            QuestionType::Mcq => {
                if self.options.len() < 2 {
                    return Some("MCQ needs at least two options".to_string());
                }
                let correct = self.options.iter().filter(|o| o.is_correct).count();
                if correct != 1 {
                    return Some("MCQ needs exactly one correct option".to_string());
                }
                None
            }
            _ if !self.options.is_empty() => Some("only MCQ questions take options".to_string()),
            QuestionType::TrueOrFalse if self.correct_answer_boolean.is_none() => {
                Some("correctAnswerBoolean is required".to_string())
            }
            QuestionType::FillInTheBlanks if self.correct_answer_text.is_none() => {
                Some("correctAnswerText is required".to_string())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(is_time_limited: bool, time_limit_seconds: Option<i64>) -> QuestionSet {
        QuestionSet {
            id: 1,
            name: "Set".to_string(),
            category_id: None,
            access_type: AccessType::Free,
            credit_cost: None,
            is_time_limited,
            time_limit_seconds,
            status: SetStatus::Published,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn deadline_only_for_time_limited_sets() {
        let start = Utc::now();
        assert_eq!(set(false, Some(60)).deadline_for(start), None);
        assert_eq!(set(true, None).deadline_for(start), None);
        assert_eq!(
            set(true, Some(60)).deadline_for(start),
            Some(start + TimeDelta::seconds(60))
        );
    }

    #[test]
    fn public_projection_hides_correct_flag() {
        let q = Question {
            id: 7,
            question_set_id: 1,
            question_type: QuestionType::Mcq,
            content: "2 + 2?".to_string(),
            correct_answer_boolean: None,
            correct_answer_text: None,
            position: 0,
            options: vec![QuestionOption {
                id: 70,
                question_id: 7,
                text: "4".to_string(),
                is_correct: true,
                position: 0,
            }],
        };
        let json = serde_json::to_value(PublicQuestion::from(q)).unwrap();
        assert_eq!(json["options"][0], serde_json::json!({"id": 70, "text": "4"}));
    }

    #[test]
    fn mcq_requires_single_correct_option() {
        let req = CreateQuestionRequest {
            question_type: QuestionType::Mcq,
            content: "?".to_string(),
            options: vec![
                CreateOptionRequest { text: "a".to_string(), is_correct: true },
                CreateOptionRequest { text: "b".to_string(), is_correct: true },
            ],
            correct_answer_boolean: None,
            correct_answer_text: None,
        };
        assert!(req.consistency_error().is_some());
    }

    #[test]
    fn validation_descends_into_questions_and_options() {
        let req = CreateQuestionSetRequest {
            name: "Set".to_string(),
            category_id: None,
            access_type: AccessType::Free,
            credit_cost: None,
            is_time_limited: false,
            time_limit_seconds: None,
            questions: vec![CreateQuestionRequest {
                question_type: QuestionType::Mcq,
                content: "?".to_string(),
                options: vec![
                    CreateOptionRequest { text: "".to_string(), is_correct: true },
                    CreateOptionRequest { text: "b".to_string(), is_correct: false },
                ],
                correct_answer_boolean: None,
                correct_answer_text: None,
            }],
        };
        assert!(req.validate().is_err());

        let empty = CreateQuestionSetRequest { questions: vec![], ..req };
        assert!(empty.validate().is_err());
    }
}
