//! Core data model types for quizsession.
//!
//! These mirror what the grading service sends back when an attempt is
//! opened and when it is scored. A fetched `Quiz` is immutable for the
//! lifetime of a session.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

id_type!(
    /// Server identifier of a quiz.
    QuizId
);
id_type!(
    /// Server identifier of a question within a quiz.
    QuestionId
);
id_type!(
    /// Server identifier of a choice belonging to a question.
    AnswerId
);
id_type!(
    /// Server identifier of one attempt at a quiz.
    AttemptId
);

/// A quiz definition as served to a student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    pub id: QuizId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Questions in presentation order.
    #[serde(default)]
    pub questions: Vec<Question>,
    /// Time limit in minutes; 0 means untimed.
    #[serde(default)]
    pub time_limit_minutes: u32,
    /// Minimum score (percentage) needed to pass.
    #[serde(default = "default_passing_score")]
    pub passing_score: u32,
    /// Completed attempts allowed per student; 0 means unlimited.
    #[serde(default)]
    pub max_attempts: u32,
}

fn default_passing_score() -> u32 {
    70
}

impl Quiz {
    /// Countdown length in seconds, or `None` for an untimed quiz.
    pub fn time_limit_secs(&self) -> Option<u32> {
        (self.time_limit_minutes > 0).then(|| self.time_limit_minutes.saturating_mul(60))
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    pub fn contains_question(&self, id: QuestionId) -> bool {
        self.questions.iter().any(|q| q.id == id)
    }
}

/// A single question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    #[serde(rename = "question_text", alias = "text")]
    pub text: String,
    pub question_type: QuestionType,
    #[serde(default = "default_points")]
    pub points: u32,
    /// Choices in presentation order; empty for short-answer questions.
    #[serde(default)]
    pub answers: Vec<Answer>,
}

fn default_points() -> u32 {
    1
}

/// How a question is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// Exactly one choice. The service also calls this `multiple_choice`
    /// or `true_false`.
    #[serde(alias = "multiple_choice", alias = "true_false")]
    SingleChoice,
    /// Any subset of the choices.
    MultipleSelect,
    /// Free text.
    ShortAnswer,
}

impl QuestionType {
    pub fn is_choice(self) -> bool {
        !matches!(self, QuestionType::ShortAnswer)
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionType::SingleChoice => write!(f, "single_choice"),
            QuestionType::MultipleSelect => write!(f, "multiple_select"),
            QuestionType::ShortAnswer => write!(f, "short_answer"),
        }
    }
}

/// One selectable choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub id: AnswerId,
    #[serde(rename = "answer_text", alias = "text")]
    pub text: String,
}

/// Attempt record returned when an attempt is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: AttemptId,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

/// Everything the start call hands back: the quiz and the new attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct StartedAttempt {
    pub quiz: Quiz,
    pub attempt: Attempt,
}

/// Scored outcome of a submitted attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizResult {
    pub passed: bool,
    /// Percentage in `0..=100`.
    #[serde(deserialize_with = "score_from_number_or_string")]
    pub score: f64,
    #[serde(default)]
    pub time_taken_seconds: u64,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Decimal fields come over the wire as either `66.67` or `"66.67"`.
fn score_from_number_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse::<f64>().map_err(serde::de::Error::custom),
    }
}
