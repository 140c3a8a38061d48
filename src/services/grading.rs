// src/services/grading.rs

//! Answer evaluation and attempt scoring. No I/O happens here.

use crate::{
    error::AppError,
    models::{
        attempt::AnswerRequest,
        question_set::{Question, QuestionType},
    },
};

/// A student's answer, shaped by the type of the question it answers.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// MCQ: the chosen option.
    Choice(i64),
    /// TRUE_OR_FALSE.
    Boolean(bool),
    /// FILL_IN_THE_BLANKS.
    Text(String),
    /// SHORT / LONG: stored as given, graded later by an admin.
    Ungraded(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Correct,
    Incorrect,
    RequiresManualGrading,
}

impl Verdict {
    /// Value stored in `question_attempts.is_correct`. Ungraded answers count as wrong
    /// until an admin grades them.
    pub fn is_correct(self) -> bool {
        matches!(self, Verdict::Correct)
    }
}

impl Answer {
    /// Picks the payload field that matches `question_type`; the others are ignored.
    pub fn from_request(question_type: QuestionType, req: &AnswerRequest) -> Result<Self, AppError> {
        let missing = |field: &str| {
            AppError::BadRequest(format!("{} is required for this question type", field))
        };
        match question_type {
            QuestionType::Mcq => req
                .selected_option_id
                .map(Answer::Choice)
                .ok_or_else(|| missing("selectedOptionId")),
            QuestionType::TrueOrFalse => req
                .selected_boolean_answer
                .map(Answer::Boolean)
                .ok_or_else(|| missing("selectedBooleanAnswer")),
            QuestionType::FillInTheBlanks => req
                .selected_text_answer
                .clone()
                .map(Answer::Text)
                .ok_or_else(|| missing("selectedTextAnswer")),
            QuestionType::Short | QuestionType::Long => req
                .selected_text_answer
                .clone()
                .map(Answer::Ungraded)
                .ok_or_else(|| missing("selectedTextAnswer")),
        }
    }

    /// Checks the answer against the question's key.
    ///
    /// Fails with `BadRequest` when an MCQ option is not one of the question's options.
    pub fn evaluate(&self, question: &Question) -> Result<Verdict, AppError> {
        let verdict = match self {
            Answer::Choice(option_id) => {
                let option = question
                    .options
                    .iter()
                    .find(|o| o.id == *option_id)
                    .ok_or_else(|| {
                        AppError::BadRequest("Option does not belong to this question".to_string())
                    })?;
                correct_if(option.is_correct)
            }
            Answer::Boolean(value) => correct_if(question.correct_answer_boolean == Some(*value)),
            Answer::Text(text) => correct_if(
                question
                    .correct_answer_text
                    .as_deref()
                    .is_some_and(|key| blanks_match(key, text)),
            ),
            Answer::Ungraded(_) => Verdict::RequiresManualGrading,
        };
        Ok(verdict)
    }

    /// Column values for (selected_option_id, selected_boolean_answer, selected_text_answer).
    pub fn columns(&self) -> (Option<i64>, Option<bool>, Option<&str>) {
        match self {
            Answer::Choice(id) => (Some(*id), None, None),
            Answer::Boolean(b) => (None, Some(*b), None),
            Answer::Text(t) | Answer::Ungraded(t) => (None, None, Some(t.as_str())),
        }
    }
}

fn correct_if(cond: bool) -> Verdict {
    if cond { Verdict::Correct } else { Verdict::Incorrect }
}

/// Case-insensitive, whitespace-trimmed comparison.
fn blanks_match(key: &str, given: &str) -> bool {
    key.trim().to_lowercase() == given.trim().to_lowercase()
}

/// What scoring needs to know about one stored answer.
#[derive(Debug, Clone, Copy)]
pub struct AnswerOutcome {
    pub is_correct: bool,
    pub awaiting_review: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreCard {
    pub score: i64,
    pub total: i64,
    pub percentage: f64,
    pub is_checked: bool,
}

/// Scores an attempt. `total_questions` counts every question in the set, so
/// unanswered questions lower the percentage exactly like wrong ones.
pub fn score_attempt(total_questions: i64, answers: &[AnswerOutcome]) -> ScoreCard {
    let score = answers.iter().filter(|a| a.is_correct).count() as i64;
    let percentage = if total_questions > 0 {
        score as f64 / total_questions as f64 * 100.0
    } else {
        0.0
    };
    ScoreCard {
        score,
        total: total_questions,
        percentage,
        is_checked: !answers.iter().any(|a| a.awaiting_review),
    }
}
