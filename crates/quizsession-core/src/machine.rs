//! The attempt state machine.
//!
//! `Loading → InProgress → Submitting → Completed`, with `Errored` reachable
//! from `Loading` and `Submitting`. Every input is an [`Event`] fed to
//! [`State::transition`], which returns the next state and, when a
//! submission starts, the payload to send. Events that make no sense in
//! the current state are ignored, which is what keeps double submits and
//! stray post-completion UI events harmless.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::answers::AnswerState;
use crate::error::{ServiceError, START_FAILED_FALLBACK, SUBMIT_FAILED_FALLBACK};
use crate::model::{AnswerId, Attempt, QuestionId, Quiz, QuizResult, StartedAttempt};
use crate::traits::SubmitRequest;

/// Coarse lifecycle phase, without the data each state carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Loading,
    InProgress,
    Submitting,
    Completed,
    Errored,
}

impl Phase {
    /// `Completed` and `Errored` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Errored)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Loading => "loading",
            Phase::InProgress => "in_progress",
            Phase::Submitting => "submitting",
            Phase::Completed => "completed",
            Phase::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// What asked for the submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitTrigger {
    /// The student pressed submit. Only honoured on the last question.
    Manual,
    /// The countdown reached zero.
    Timer,
}

/// A local edit to the answer state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerEdit {
    SelectSingle {
        question: QuestionId,
        answer: AnswerId,
    },
    ToggleMultiple {
        question: QuestionId,
        answer: AnswerId,
    },
    SetText {
        question: QuestionId,
        text: String,
    },
}

impl AnswerEdit {
    pub fn question(&self) -> QuestionId {
        match self {
            AnswerEdit::SelectSingle { question, .. }
            | AnswerEdit::ToggleMultiple { question, .. }
            | AnswerEdit::SetText { question, .. } => *question,
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Started(StartedAttempt),
    StartFailed(ServiceError),
    Navigated(usize),
    Answered(AnswerEdit),
    Ticked,
    SubmitRequested(SubmitTrigger),
    SubmitSucceeded(QuizResult),
    SubmitFailed(ServiceError),
}

/// Remaining time of a timed attempt.
///
/// Ticks that arrive while a submission is in flight are held rather than
/// applied, and charged in full if that submission fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    remaining_secs: u32,
    held_secs: u32,
}

impl Countdown {
    pub fn new(secs: u32) -> Self {
        Self {
            remaining_secs: secs,
            held_secs: 0,
        }
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    pub fn is_expired(&self) -> bool {
        self.remaining_secs == 0
    }

    /// Advance one second. Returns `true` once the countdown is at zero.
    fn tick(&mut self) -> bool {
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        self.is_expired()
    }

    fn hold(&mut self) {
        self.held_secs = self.held_secs.saturating_add(1);
    }

    fn settle(&mut self) {
        self.remaining_secs = self.remaining_secs.saturating_sub(self.held_secs);
        self.held_secs = 0;
    }
}

/// Data of an opened attempt, carried from `InProgress` onwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveAttempt {
    pub quiz: Arc<Quiz>,
    pub attempt: Attempt,
    pub answers: AnswerState,
    /// Index of the question on screen.
    pub current: usize,
    /// `None` for untimed quizzes.
    pub countdown: Option<Countdown>,
    /// Message of the last retryable submit failure.
    pub submit_error: Option<String>,
    /// Submission requests issued so far, including failed ones.
    pub submissions: u32,
}

impl ActiveAttempt {
    pub fn new(started: StartedAttempt) -> Self {
        let countdown = started.quiz.time_limit_secs().map(Countdown::new);
        Self {
            quiz: Arc::new(started.quiz),
            attempt: started.attempt,
            answers: AnswerState::new(),
            current: 0,
            countdown,
            submit_error: None,
            submissions: 0,
        }
    }

    /// Whether the question on screen is the last one.
    pub fn is_last_question(&self) -> bool {
        self.current + 1 >= self.quiz.question_count()
    }

    /// Time is up but the attempt is still open, which only happens after a
    /// failed forced submission. Answers are frozen until it is resent.
    pub fn is_expired(&self) -> bool {
        self.countdown.is_some_and(|c| c.is_expired())
    }

    /// Whether an explicit submit would be accepted from `InProgress`.
    pub fn accepts_manual_submit(&self) -> bool {
        self.is_last_question() || self.is_expired()
    }

    fn go_to(&mut self, index: usize) {
        if self.is_expired() {
            return;
        }
        if index < self.quiz.question_count() {
            self.current = index;
        }
    }

    fn apply(&mut self, edit: AnswerEdit) {
        if self.is_expired() {
            tracing::debug!(question = %edit.question(), "edit after time ran out ignored");
            return;
        }
        if !self.quiz.contains_question(edit.question()) {
            tracing::debug!(question = %edit.question(), "edit for unknown question ignored");
            return;
        }
        match edit {
            AnswerEdit::SelectSingle { question, answer } => {
                self.answers.select_single(question, answer)
            }
            AnswerEdit::ToggleMultiple { question, answer } => {
                self.answers.toggle_multiple(question, answer)
            }
            AnswerEdit::SetText { question, text } => self.answers.set_text(question, text),
        }
    }

    fn submission(&self) -> SubmitRequest {
        self.answers.to_submission(&self.quiz, self.attempt.id)
    }
}

/// Full session state.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum State {
    #[default]
    Loading,
    InProgress(ActiveAttempt),
    Submitting {
        active: ActiveAttempt,
        trigger: SubmitTrigger,
    },
    Completed {
        active: ActiveAttempt,
        result: QuizResult,
    },
    Errored {
        message: String,
        error: ServiceError,
        active: Option<ActiveAttempt>,
    },
}

impl State {
    pub fn phase(&self) -> Phase {
        match self {
            State::Loading => Phase::Loading,
            State::InProgress(_) => Phase::InProgress,
            State::Submitting { .. } => Phase::Submitting,
            State::Completed { .. } => Phase::Completed,
            State::Errored { .. } => Phase::Errored,
        }
    }

    pub fn active(&self) -> Option<&ActiveAttempt> {
        match self {
            State::Loading => None,
            State::InProgress(active)
            | State::Submitting { active, .. }
            | State::Completed { active, .. } => Some(active),
            State::Errored { active, .. } => active.as_ref(),
        }
    }

    pub fn result(&self) -> Option<&QuizResult> {
        match self {
            State::Completed { result, .. } => Some(result),
            _ => None,
        }
    }

    /// The fatal error message, once `Errored`.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            State::Errored { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Apply one event, returning the next state and the payload to submit
    /// if this transition started a submission.
    pub fn transition(self, event: Event) -> (State, Option<SubmitRequest>) {
        match (self, event) {
            (State::Loading, Event::Started(started)) => {
                (State::InProgress(ActiveAttempt::new(started)), None)
            }
            (State::Loading, Event::StartFailed(error)) => (
                State::Errored {
                    message: error.user_message(START_FAILED_FALLBACK),
                    error,
                    active: None,
                },
                None,
            ),

            (State::InProgress(mut active), Event::Navigated(index)) => {
                active.go_to(index);
                (State::InProgress(active), None)
            }
            (State::Submitting { mut active, trigger }, Event::Navigated(index)) => {
                active.go_to(index);
                (State::Submitting { active, trigger }, None)
            }

            (State::InProgress(mut active), Event::Answered(edit)) => {
                active.apply(edit);
                (State::InProgress(active), None)
            }
            (State::Submitting { mut active, trigger }, Event::Answered(edit)) => {
                active.apply(edit);
                (State::Submitting { active, trigger }, None)
            }

            (State::InProgress(mut active), Event::Ticked) => {
                let expired = active.countdown.as_mut().is_some_and(Countdown::tick);
                if expired {
                    begin_submit(active, SubmitTrigger::Timer)
                } else {
                    (State::InProgress(active), None)
                }
            }
            (State::Submitting { mut active, trigger }, Event::Ticked) => {
                if let Some(countdown) = active.countdown.as_mut() {
                    countdown.hold();
                }
                (State::Submitting { active, trigger }, None)
            }

            (State::InProgress(active), Event::SubmitRequested(trigger)) => {
                if trigger == SubmitTrigger::Manual && !active.accepts_manual_submit() {
                    (State::InProgress(active), None)
                } else {
                    begin_submit(active, trigger)
                }
            }

            (State::Submitting { mut active, .. }, Event::SubmitSucceeded(result)) => {
                if let Some(countdown) = active.countdown.as_mut() {
                    countdown.settle();
                }
                (State::Completed { active, result }, None)
            }
            (State::Submitting { mut active, .. }, Event::SubmitFailed(error)) => {
                let message = error.user_message(SUBMIT_FAILED_FALLBACK);
                if error.is_retryable() {
                    if let Some(countdown) = active.countdown.as_mut() {
                        countdown.settle();
                    }
                    active.submit_error = Some(message);
                    (State::InProgress(active), None)
                } else {
                    (
                        State::Errored {
                            message,
                            error,
                            active: Some(active),
                        },
                        None,
                    )
                }
            }

            (state, event) => {
                tracing::trace!(phase = %state.phase(), ?event, "event ignored");
                (state, None)
            }
        }
    }
}

fn begin_submit(mut active: ActiveAttempt, trigger: SubmitTrigger) -> (State, Option<SubmitRequest>) {
    let request = active.submission();
    active.submit_error = None;
    active.submissions += 1;
    (State::Submitting { active, trigger }, Some(request))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::answers::Response;
    use crate::model::{Answer, AttemptId, Question, QuestionType, QuizId};
    use crate::traits::ResponseEntry;

    fn question(id: u64, question_type: QuestionType) -> Question {
        let answers = if question_type.is_choice() {
            (1..=3)
                .map(|n| Answer {
                    id: AnswerId(id * 10 + n),
                    text: format!("A{n}"),
                })
                .collect()
        } else {
            vec![]
        };
        Question {
            id: QuestionId(id),
            text: format!("Q{id}"),
            question_type,
            points: 1,
            answers,
        }
    }

    fn started(time_limit_minutes: u32) -> StartedAttempt {
        StartedAttempt {
            quiz: Quiz {
                id: QuizId(1),
                title: "Lifetimes".into(),
                description: String::new(),
                questions: vec![
                    question(1, QuestionType::SingleChoice),
                    question(2, QuestionType::MultipleSelect),
                    question(3, QuestionType::ShortAnswer),
                ],
                time_limit_minutes,
                passing_score: 70,
                max_attempts: 0,
            },
            attempt: Attempt {
                id: AttemptId(42),
                started_at: None,
            },
        }
    }

    fn in_progress(time_limit_minutes: u32) -> State {
        let (state, effect) = State::Loading.transition(Event::Started(started(time_limit_minutes)));
        assert!(effect.is_none());
        state
    }

    fn step(state: State, event: Event) -> State {
        state.transition(event).0
    }

    fn passing() -> QuizResult {
        QuizResult {
            passed: true,
            score: 100.0,
            time_taken_seconds: 30,
            completed_at: None,
        }
    }

    fn select(question: u64, answer: u64) -> Event {
        Event::Answered(AnswerEdit::SelectSingle {
            question: QuestionId(question),
            answer: AnswerId(answer),
        })
    }

    fn remaining(state: &State) -> Option<u32> {
        state
            .active()
            .and_then(|a| a.countdown)
            .map(|c| c.remaining_secs())
    }

    #[test]
    fn start_enters_in_progress_with_countdown() {
        let state = in_progress(2);
        assert_eq!(state.phase(), Phase::InProgress);
        assert_eq!(remaining(&state), Some(120));

        let untimed = in_progress(0);
        assert_eq!(remaining(&untimed), None);
    }

    #[test]
    fn start_failure_is_terminal_with_service_message() {
        let (state, effect) = State::Loading.transition(Event::StartFailed(
            ServiceError::AttemptNotPermitted("Maximum attempts (2) reached.".into()),
        ));
        assert!(effect.is_none());
        assert_eq!(state.phase(), Phase::Errored);
        assert_eq!(state.error_message(), Some("Maximum attempts (2) reached."));

        let state = step(state, Event::Started(started(0)));
        assert_eq!(state.phase(), Phase::Errored);
    }

    #[test]
    fn navigation_is_bounds_checked() {
        let mut state = in_progress(0);
        state = step(state, Event::Navigated(2));
        assert_eq!(state.active().unwrap().current, 2);

        state = step(state, Event::Navigated(3));
        assert_eq!(state.active().unwrap().current, 2);

        state = step(state, select(1, 11));
        assert_eq!(state.active().unwrap().current, 2);
    }

    #[test]
    fn single_select_overwrites_for_every_question_type() {
        for id in 1..=3 {
            let mut state = in_progress(0);
            state = step(state, select(id, 100));
            state = step(state, select(id, 200));
            let answers = &state.active().unwrap().answers;
            assert_eq!(
                answers.get(QuestionId(id)),
                Some(&Response::Choice(BTreeSet::from([AnswerId(200)])))
            );
        }
    }

    #[test]
    fn edits_for_unknown_questions_are_ignored() {
        let state = step(in_progress(0), select(99, 1));
        assert!(state.active().unwrap().answers.is_empty());
    }

    #[test]
    fn manual_submit_requires_last_question() {
        let (state, effect) = in_progress(0).transition(Event::SubmitRequested(SubmitTrigger::Manual));
        assert!(effect.is_none());
        assert_eq!(state.phase(), Phase::InProgress);

        let state = step(state, Event::Navigated(2));
        let (state, effect) = state.transition(Event::SubmitRequested(SubmitTrigger::Manual));
        assert!(effect.is_some());
        assert_eq!(state.phase(), Phase::Submitting);
    }

    #[test]
    fn second_submit_is_a_no_op() {
        let state = step(in_progress(0), Event::Navigated(2));
        let (state, first) = state.transition(Event::SubmitRequested(SubmitTrigger::Manual));
        let (state, second) = state.transition(Event::SubmitRequested(SubmitTrigger::Timer));
        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(state.phase(), Phase::Submitting);
        assert_eq!(state.active().unwrap().submissions, 1);
    }

    #[test]
    fn untimed_skip_scenario_payload() {
        let mut state = in_progress(0);
        state = step(state, select(1, 12));
        state = step(state, Event::Navigated(1));
        state = step(state, Event::Navigated(2));
        state = step(
            state,
            Event::Answered(AnswerEdit::SetText {
                question: QuestionId(3),
                text: "done".into(),
            }),
        );

        let (_, request) = state.transition(Event::SubmitRequested(SubmitTrigger::Manual));
        let request = request.expect("submission should start");
        assert_eq!(
            request.responses,
            vec![
                ResponseEntry {
                    question_id: QuestionId(1),
                    selected_answer_ids: BTreeSet::from([AnswerId(12)]),
                    text_response: String::new(),
                },
                ResponseEntry {
                    question_id: QuestionId(3),
                    selected_answer_ids: BTreeSet::new(),
                    text_response: "done".into(),
                },
            ]
        );
        assert!(!request.contains_question(QuestionId(2)));
    }

    #[test]
    fn countdown_expiry_forces_submission() {
        let mut state = in_progress(1);
        for _ in 0..59 {
            let (next, effect) = state.transition(Event::Ticked);
            assert!(effect.is_none());
            state = next;
        }
        assert_eq!(remaining(&state), Some(1));

        let (state, effect) = state.transition(Event::Ticked);
        let request = effect.expect("expiry should submit");
        assert!(request.responses.is_empty());
        assert!(matches!(
            state,
            State::Submitting {
                trigger: SubmitTrigger::Timer,
                ..
            }
        ));

        let (_, manual) = state.transition(Event::SubmitRequested(SubmitTrigger::Manual));
        assert!(manual.is_none());
    }

    #[test]
    fn forced_submission_uses_partial_answers() {
        let mut state = step(in_progress(1), select(1, 11));
        state = step(
            state,
            Event::Answered(AnswerEdit::SetText {
                question: QuestionId(3),
                text: "half-typ".into(),
            }),
        );
        let mut request = None;
        for _ in 0..60 {
            let (next, effect) = state.transition(Event::Ticked);
            state = next;
            request = request.or(effect);
        }
        let request = request.expect("expiry should submit");
        assert_eq!(request.responses.len(), 2);
        assert_eq!(request.responses[1].text_response, "half-typ");
    }

    #[test]
    fn countdown_is_frozen_while_submitting_and_charged_on_failure() {
        let mut state = step(in_progress(1), Event::Navigated(2));
        for _ in 0..10 {
            state = step(state, Event::Ticked);
        }
        state = step(state, Event::SubmitRequested(SubmitTrigger::Manual));
        for _ in 0..5 {
            state = step(state, Event::Ticked);
        }
        assert_eq!(remaining(&state), Some(50));

        state = step(state, Event::SubmitFailed(ServiceError::Network("reset".into())));
        assert_eq!(state.phase(), Phase::InProgress);
        assert_eq!(remaining(&state), Some(45));
        assert_eq!(
            state.active().unwrap().submit_error.as_deref(),
            Some("Failed to submit quiz")
        );
    }

    #[test]
    fn countdown_exhausted_during_failed_submit_refires() {
        let mut state = in_progress(1);
        for _ in 0..59 {
            state = step(state, Event::Ticked);
        }
        state = step(state, Event::Navigated(2));
        state = step(state, Event::SubmitRequested(SubmitTrigger::Manual));
        for _ in 0..3 {
            state = step(state, Event::Ticked);
        }
        state = step(state, Event::SubmitFailed(ServiceError::Timeout(30)));
        assert_eq!(remaining(&state), Some(0));

        let (state, effect) = state.transition(Event::Ticked);
        assert!(effect.is_some());
        assert_eq!(state.phase(), Phase::Submitting);
    }

    #[test]
    fn spent_countdown_freezes_answers_until_resent() {
        let mut state = step(in_progress(1), select(1, 11));
        for _ in 0..58 {
            state = step(state, Event::Ticked);
        }
        state = step(state, Event::Navigated(2));
        state = step(state, Event::SubmitRequested(SubmitTrigger::Manual));
        for _ in 0..5 {
            state = step(state, Event::Ticked);
        }
        state = step(state, Event::SubmitFailed(ServiceError::Network("reset".into())));
        assert_eq!(state.phase(), Phase::InProgress);
        assert_eq!(remaining(&state), Some(0));
        assert!(state.active().unwrap().is_expired());

        let frozen = state.clone();
        state = step(
            state,
            Event::Answered(AnswerEdit::SetText {
                question: QuestionId(3),
                text: "late".into(),
            }),
        );
        state = step(state, select(1, 12));
        state = step(state, Event::Navigated(0));
        assert_eq!(state, frozen);

        let (state, effect) = state.transition(Event::SubmitRequested(SubmitTrigger::Manual));
        let request = effect.expect("expired attempt accepts submit");
        assert_eq!(request.responses.len(), 1);
        assert_eq!(state.phase(), Phase::Submitting);
    }

    #[test]
    fn retry_after_failure_sends_identical_payload() {
        let mut state = step(in_progress(0), select(1, 13));
        state = step(state, Event::Navigated(2));
        let mut phases = vec![state.phase()];

        let (next, first) = state.transition(Event::SubmitRequested(SubmitTrigger::Manual));
        phases.push(next.phase());
        let answers_before = next.active().unwrap().answers.clone();

        let next = step(next, Event::SubmitFailed(ServiceError::Network("down".into())));
        phases.push(next.phase());
        assert_eq!(next.active().unwrap().answers, answers_before);

        let (next, second) = next.transition(Event::SubmitRequested(SubmitTrigger::Manual));
        phases.push(next.phase());
        assert!(next.active().unwrap().submit_error.is_none());

        let next = step(next, Event::SubmitSucceeded(passing()));
        phases.push(next.phase());

        assert_eq!(first, second);
        assert_eq!(
            phases,
            vec![
                Phase::InProgress,
                Phase::Submitting,
                Phase::InProgress,
                Phase::Submitting,
                Phase::Completed,
            ]
        );
    }

    #[test]
    fn fatal_submit_failure_errors_out() {
        let state = step(in_progress(0), Event::Navigated(2));
        let state = step(state, Event::SubmitRequested(SubmitTrigger::Manual));
        let state = step(
            state,
            Event::SubmitFailed(ServiceError::AlreadySubmitted(
                "Quiz attempt not found or already completed.".into(),
            )),
        );
        assert_eq!(state.phase(), Phase::Errored);
        assert_eq!(
            state.error_message(),
            Some("Quiz attempt not found or already completed.")
        );
        assert!(state.active().is_some());
    }

    #[test]
    fn completed_state_is_read_only() {
        let state = step(in_progress(1), select(1, 11));
        let state = step(state, Event::Navigated(2));
        let state = step(state, Event::SubmitRequested(SubmitTrigger::Manual));
        let completed = step(state, Event::SubmitSucceeded(passing()));
        assert_eq!(completed.phase(), Phase::Completed);

        let events = vec![
            Event::Navigated(0),
            select(1, 12),
            Event::Answered(AnswerEdit::ToggleMultiple {
                question: QuestionId(2),
                answer: AnswerId(21),
            }),
            Event::Ticked,
            Event::SubmitRequested(SubmitTrigger::Manual),
            Event::SubmitRequested(SubmitTrigger::Timer),
            Event::SubmitFailed(ServiceError::Network("late".into())),
            Event::SubmitSucceeded(QuizResult {
                passed: false,
                score: 0.0,
                time_taken_seconds: 1,
                completed_at: None,
            }),
        ];

        let mut state = completed.clone();
        for event in events {
            let (next, effect) = state.transition(event);
            assert!(effect.is_none());
            state = next;
        }
        assert_eq!(state, completed);
        assert_eq!(state.result(), Some(&passing()));
    }

    #[test]
    fn stale_submit_outcome_outside_submitting_is_ignored() {
        let state = in_progress(0);
        let after = step(state.clone(), Event::SubmitSucceeded(passing()));
        assert_eq!(after, state);
    }
}
