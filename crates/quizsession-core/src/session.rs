//! Synchronous session controller.
//!
//! Owns one [`State`] and turns UI calls into machine events. It performs
//! no I/O: when a transition starts a submission, the payload is handed
//! back to the caller, which is expected to send it and report the outcome
//! through [`SessionController::submit_succeeded`] or
//! [`SessionController::submit_failed`].

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::answers::AnswerState;
use crate::error::ServiceError;
use crate::machine::{AnswerEdit, Event, Phase, State, SubmitTrigger};
use crate::model::{AnswerId, AttemptId, Question, QuestionId, Quiz, QuizResult, StartedAttempt};
use crate::traits::SubmitRequest;

/// Controller for one attempt.
#[derive(Debug)]
pub struct SessionController {
    id: Uuid,
    state: State,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionController {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: State::Loading,
        }
    }

    /// Local identifier used to correlate log lines for this session.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Feed one event through the machine.
    pub fn apply(&mut self, event: Event) -> Option<SubmitRequest> {
        let from = self.state.phase();
        let (next, submission) = std::mem::take(&mut self.state).transition(event);
        self.state = next;

        let to = self.state.phase();
        if from != to {
            tracing::debug!(session = %self.id, %from, %to, "session transition");
            match &self.state {
                State::InProgress(active) if from == Phase::Loading => tracing::info!(
                    session = %self.id,
                    quiz = %active.quiz.id,
                    attempt = %active.attempt.id,
                    questions = active.quiz.question_count(),
                    time_limit_secs = ?active.quiz.time_limit_secs(),
                    "attempt started"
                ),
                State::InProgress(active) => tracing::warn!(
                    session = %self.id,
                    attempt = %active.attempt.id,
                    error = active.submit_error.as_deref().unwrap_or_default(),
                    "submission failed, attempt still open"
                ),
                State::Submitting { trigger, .. } => {
                    tracing::info!(session = %self.id, ?trigger, "submitting attempt")
                }
                State::Completed { result, .. } => tracing::info!(
                    session = %self.id,
                    passed = result.passed,
                    score = result.score,
                    "attempt scored"
                ),
                State::Errored { error, .. } => {
                    tracing::error!(session = %self.id, %error, "session failed")
                }
                State::Loading => {}
            }
        }
        submission
    }

    pub fn started(&mut self, started: StartedAttempt) {
        self.apply(Event::Started(started));
    }

    pub fn start_failed(&mut self, error: ServiceError) {
        self.apply(Event::StartFailed(error));
    }

    pub fn go_to_question(&mut self, index: usize) {
        self.apply(Event::Navigated(index));
    }

    pub fn next_question(&mut self) {
        if let Some(active) = self.state.active() {
            let index = active.current + 1;
            self.go_to_question(index);
        }
    }

    pub fn previous_question(&mut self) {
        if let Some(index) = self.state.active().and_then(|a| a.current.checked_sub(1)) {
            self.go_to_question(index);
        }
    }

    pub fn select_single(&mut self, question: QuestionId, answer: AnswerId) {
        self.apply(Event::Answered(AnswerEdit::SelectSingle { question, answer }));
    }

    pub fn toggle_multiple(&mut self, question: QuestionId, answer: AnswerId) {
        self.apply(Event::Answered(AnswerEdit::ToggleMultiple { question, answer }));
    }

    pub fn set_text(&mut self, question: QuestionId, text: impl Into<String>) {
        self.apply(Event::Answered(AnswerEdit::SetText {
            question,
            text: text.into(),
        }));
    }

    /// One second of wall-clock time has passed.
    pub fn tick(&mut self) -> Option<SubmitRequest> {
        self.apply(Event::Ticked)
    }

    /// Explicit submit from the student.
    pub fn submit(&mut self) -> Option<SubmitRequest> {
        self.apply(Event::SubmitRequested(SubmitTrigger::Manual))
    }

    pub fn submit_succeeded(&mut self, result: QuizResult) {
        self.apply(Event::SubmitSucceeded(result));
    }

    pub fn submit_failed(&mut self, error: ServiceError) {
        self.apply(Event::SubmitFailed(error));
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn quiz(&self) -> Option<&Quiz> {
        self.state.active().map(|a| a.quiz.as_ref())
    }

    pub fn attempt_id(&self) -> Option<AttemptId> {
        self.state.active().map(|a| a.attempt.id)
    }

    pub fn current_index(&self) -> usize {
        self.state.active().map_or(0, |a| a.current)
    }

    pub fn current_question(&self) -> Option<&Question> {
        let active = self.state.active()?;
        active.quiz.question(active.current)
    }

    pub fn answers(&self) -> Option<&AnswerState> {
        self.state.active().map(|a| &a.answers)
    }

    pub fn remaining_secs(&self) -> Option<u32> {
        self.state
            .active()
            .and_then(|a| a.countdown)
            .map(|c| c.remaining_secs())
    }

    pub fn result(&self) -> Option<&QuizResult> {
        self.state.result()
    }

    /// Whether the countdown should be driven right now.
    pub fn is_ticking(&self) -> bool {
        matches!(self.phase(), Phase::InProgress | Phase::Submitting)
            && self.remaining_secs().is_some()
    }

    /// Whether an explicit submit would be accepted.
    pub fn can_submit(&self) -> bool {
        match &self.state {
            State::InProgress(active) => active.accepts_manual_submit(),
            _ => false,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let active = self.state.active();
        SessionSnapshot {
            session_id: self.id,
            phase: self.phase(),
            quiz: active.map(|a| Arc::clone(&a.quiz)),
            attempt_id: self.attempt_id(),
            current: self.current_index(),
            answers: active.map(|a| a.answers.clone()).unwrap_or_default(),
            remaining_secs: self.remaining_secs(),
            can_submit: self.can_submit(),
            submit_error: active.and_then(|a| a.submit_error.clone()),
            result: self.result().cloned(),
            error: self.state.error_message().map(str::to_string),
        }
    }
}

/// Point-in-time view of a session for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub phase: Phase,
    #[serde(skip)]
    pub quiz: Option<Arc<Quiz>>,
    pub attempt_id: Option<AttemptId>,
    pub current: usize,
    pub answers: AnswerState,
    pub remaining_secs: Option<u32>,
    pub can_submit: bool,
    /// Last retryable submit failure, shown while the attempt stays open.
    pub submit_error: Option<String>,
    pub result: Option<QuizResult>,
    /// Fatal failure; the caller should leave the session.
    pub error: Option<String>,
}

impl SessionSnapshot {
    pub fn loading(session_id: Uuid) -> Self {
        Self {
            session_id,
            phase: Phase::Loading,
            quiz: None,
            attempt_id: None,
            current: 0,
            answers: AnswerState::default(),
            remaining_secs: None,
            can_submit: false,
            submit_error: None,
            result: None,
            error: None,
        }
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.quiz.as_ref()?.question(self.current)
    }

    pub fn question_count(&self) -> usize {
        self.quiz.as_ref().map_or(0, |q| q.question_count())
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }
}
