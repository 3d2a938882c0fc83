//! Core trait definition for the grading service.
//!
//! Implemented over HTTP by `quizsession-client`, and by the scripted mock
//! used in tests.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::model::{AnswerId, AttemptId, QuestionId, QuizId, QuizResult, StartedAttempt};

/// The two calls a quiz session makes against the grading service.
#[async_trait]
pub trait AttemptService: Send + Sync {
    /// Human-readable backend name (e.g. "http").
    fn name(&self) -> &str;

    /// Fetch the quiz definition and open a new attempt for it.
    async fn start_attempt(&self, quiz_id: QuizId) -> Result<StartedAttempt, ServiceError>;

    /// Submit collected responses and receive the scored result.
    async fn submit_attempt(&self, request: &SubmitRequest) -> Result<QuizResult, ServiceError>;
}

/// Payload for scoring an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub attempt_id: AttemptId,
    /// One entry per question the student interacted with, in quiz order.
    pub responses: Vec<ResponseEntry>,
}

/// One question's response as sent to the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEntry {
    pub question_id: QuestionId,
    /// Empty for text responses and for cleared choice responses.
    #[serde(default)]
    pub selected_answer_ids: BTreeSet<AnswerId>,
    /// Empty for choice responses.
    #[serde(default)]
    pub text_response: String,
}

impl SubmitRequest {
    pub fn contains_question(&self, id: QuestionId) -> bool {
        self.responses.iter().any(|r| r.question_id == id)
    }
}
