//! In-progress responses for one attempt.
//!
//! A question appears in [`AnswerState`] only once the student has touched
//! it. Clearing a choice set keeps the (empty) entry, so the question is
//! still submitted, as unanswered.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::model::{AnswerId, AttemptId, QuestionId, Quiz};
use crate::traits::{ResponseEntry, SubmitRequest};

/// A recorded response; its shape follows the question type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Response {
    /// Selected choice ids. A singleton for single-choice questions.
    Choice(BTreeSet<AnswerId>),
    /// Free text, kept verbatim.
    Text(String),
}

impl Response {
    /// Whether this response carries anything the grader could score.
    pub fn is_blank(&self) -> bool {
        match self {
            Response::Choice(ids) => ids.is_empty(),
            Response::Text(text) => text.is_empty(),
        }
    }

    pub fn selected(&self) -> Option<&BTreeSet<AnswerId>> {
        match self {
            Response::Choice(ids) => Some(ids),
            Response::Text(_) => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Response::Choice(_) => None,
            Response::Text(text) => Some(text),
        }
    }
}

/// Mapping from question to the student's current response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerState {
    responses: HashMap<QuestionId, Response>,
}

impl AnswerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the question's response with exactly `{answer}`.
    pub fn select_single(&mut self, question: QuestionId, answer: AnswerId) {
        self.responses
            .insert(question, Response::Choice(BTreeSet::from([answer])));
    }

    /// Add `answer` to the question's set if absent, remove it if present.
    pub fn toggle_multiple(&mut self, question: QuestionId, answer: AnswerId) {
        let entry = self
            .responses
            .entry(question)
            .or_insert_with(|| Response::Choice(BTreeSet::new()));

        if let Response::Text(_) = entry {
            *entry = Response::Choice(BTreeSet::new());
        }
        if let Response::Choice(ids) = entry {
            if !ids.remove(&answer) {
                ids.insert(answer);
            }
        }
    }

    /// Replace the question's text response, including with `""`.
    pub fn set_text(&mut self, question: QuestionId, text: impl Into<String>) {
        self.responses.insert(question, Response::Text(text.into()));
    }

    pub fn get(&self, question: QuestionId) -> Option<&Response> {
        self.responses.get(&question)
    }

    pub fn is_selected(&self, question: QuestionId, answer: AnswerId) -> bool {
        self.get(question)
            .and_then(Response::selected)
            .is_some_and(|ids| ids.contains(&answer))
    }

    /// Number of questions with a non-blank response.
    pub fn answered_count(&self) -> usize {
        self.responses.values().filter(|r| !r.is_blank()).count()
    }

    /// Number of questions the student has interacted with.
    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// Build the scoring payload.
    ///
    /// Entries follow the quiz's question order and cover only questions
    /// present in this state.
    pub fn to_submission(&self, quiz: &Quiz, attempt_id: AttemptId) -> SubmitRequest {
        let responses = quiz
            .questions
            .iter()
            .filter_map(|question| {
                let response = self.responses.get(&question.id)?;
                Some(match response {
                    Response::Choice(ids) => ResponseEntry {
                        question_id: question.id,
                        selected_answer_ids: ids.clone(),
                        text_response: String::new(),
                    },
                    Response::Text(text) => ResponseEntry {
                        question_id: question.id,
                        selected_answer_ids: BTreeSet::new(),
                        text_response: text.clone(),
                    },
                })
            })
            .collect();

        SubmitRequest {
            attempt_id,
            responses,
        }
    }
}
