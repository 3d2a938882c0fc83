//! Mock grading service for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use quizsession_core::error::ServiceError;
use quizsession_core::model::{QuizId, QuizResult, StartedAttempt};
use quizsession_core::traits::{AttemptService, SubmitRequest};

/// A scripted grading service for driving sessions without a server.
///
/// Submit outcomes are consumed in order; once the script runs out, every
/// further submission gets the default result.
pub struct MockAttemptService {
    start: Result<StartedAttempt, ServiceError>,
    submit_script: Mutex<VecDeque<Result<QuizResult, ServiceError>>>,
    default_result: QuizResult,
    delay: Duration,
    start_calls: AtomicU32,
    submit_calls: AtomicU32,
    submissions: Mutex<Vec<SubmitRequest>>,
}

impl MockAttemptService {
    /// A service that opens `started` and scores every submission with
    /// `result`.
    pub fn new(started: StartedAttempt, result: QuizResult) -> Self {
        Self {
            start: Ok(started),
            submit_script: Mutex::new(VecDeque::new()),
            default_result: result,
            delay: Duration::ZERO,
            start_calls: AtomicU32::new(0),
            submit_calls: AtomicU32::new(0),
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// A service whose start call always fails with `error`.
    pub fn failing_start(error: ServiceError) -> Self {
        Self {
            start: Err(error),
            submit_script: Mutex::new(VecDeque::new()),
            default_result: QuizResult {
                passed: false,
                score: 0.0,
                time_taken_seconds: 0,
                completed_at: None,
            },
            delay: Duration::ZERO,
            start_calls: AtomicU32::new(0),
            submit_calls: AtomicU32::new(0),
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Queue the outcome of the next unscripted submission.
    pub fn then_submit(self, outcome: Result<QuizResult, ServiceError>) -> Self {
        self.submit_script.lock().unwrap().push_back(outcome);
        self
    }

    /// Delay every call by `delay` (tokio time, so it honours paused clocks).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn start_calls(&self) -> u32 {
        self.start_calls.load(Ordering::Relaxed)
    }

    pub fn submit_calls(&self) -> u32 {
        self.submit_calls.load(Ordering::Relaxed)
    }

    /// Every submission received, in order.
    pub fn submissions(&self) -> Vec<SubmitRequest> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn last_submission(&self) -> Option<SubmitRequest> {
        self.submissions.lock().unwrap().last().cloned()
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl AttemptService for MockAttemptService {
    fn name(&self) -> &str {
        "mock"
    }

    async fn start_attempt(&self, quiz_id: QuizId) -> Result<StartedAttempt, ServiceError> {
        self.start_calls.fetch_add(1, Ordering::Relaxed);
        self.pause().await;

        match &self.start {
            Ok(started) if started.quiz.id == quiz_id => Ok(started.clone()),
            Ok(_) => Err(ServiceError::QuizNotFound(format!("Quiz {quiz_id} not found."))),
            Err(error) => Err(error.clone()),
        }
    }

    async fn submit_attempt(&self, request: &SubmitRequest) -> Result<QuizResult, ServiceError> {
        self.submit_calls.fetch_add(1, Ordering::Relaxed);
        self.submissions.lock().unwrap().push(request.clone());
        self.pause().await;

        let scripted = self.submit_script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(self.default_result.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quizsession_core::model::{Attempt, AttemptId, Quiz};

    fn started() -> StartedAttempt {
        StartedAttempt {
            quiz: Quiz {
                id: QuizId(2),
                title: "mock".into(),
                description: String::new(),
                questions: vec![],
                time_limit_minutes: 0,
                passing_score: 70,
                max_attempts: 0,
            },
            attempt: Attempt {
                id: AttemptId(20),
                started_at: None,
            },
        }
    }

    fn result(score: f64) -> QuizResult {
        QuizResult {
            passed: score >= 70.0,
            score,
            time_taken_seconds: 10,
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn scripted_outcomes_then_default() {
        let mock = MockAttemptService::new(started(), result(100.0))
            .then_submit(Err(ServiceError::Network("down".into())));
        let request = SubmitRequest {
            attempt_id: AttemptId(20),
            responses: vec![],
        };

        assert!(mock.submit_attempt(&request).await.is_err());
        assert_eq!(mock.submit_attempt(&request).await.unwrap().score, 100.0);
        assert_eq!(mock.submit_calls(), 2);
        assert_eq!(mock.submissions().len(), 2);
    }

    #[tokio::test]
    async fn unknown_quiz_is_not_found() {
        let mock = MockAttemptService::new(started(), result(0.0));
        let err = mock.start_attempt(QuizId(3)).await.unwrap_err();
        assert!(matches!(err, ServiceError::QuizNotFound(_)));
        assert_eq!(mock.start_calls(), 1);
    }
}
