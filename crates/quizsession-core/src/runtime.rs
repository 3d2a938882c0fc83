//! Async driver for one quiz attempt.
//!
//! Each session runs on its own tokio task, which is the single logical
//! thread every input goes through: UI commands, countdown ticks, and the
//! outcomes of service calls. Inputs are applied one at a time, so a timer
//! expiry racing a manual submit is settled by whichever reaches the
//! machine first.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval};
use tracing::Instrument;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::model::{AnswerId, QuestionId, QuizId, QuizResult};
use crate::session::{SessionController, SessionSnapshot};
use crate::traits::{AttemptService, SubmitRequest};

/// Timing configuration for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Interval between countdown ticks. One second outside of tests.
    pub tick_period: Duration,
    /// Upper bound on the start call; exceeding it is fatal.
    pub start_timeout: Duration,
    /// Upper bound on the submit call; exceeding it is retryable.
    pub submit_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_secs(1),
            start_timeout: Duration::from_secs(30),
            submit_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
enum Command {
    GoTo(usize),
    Next,
    Previous,
    SelectSingle(QuestionId, AnswerId),
    ToggleMultiple(QuestionId, AnswerId),
    SetText(QuestionId, String),
    Submit,
}

/// Handle to a running quiz session.
///
/// Every UI operation is a non-blocking send; the resulting state is
/// observed through snapshots. Dropping the handle abandons the session:
/// the task stops and any pending request is discarded unobserved.
pub struct QuizSession {
    id: Uuid,
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
    task: JoinHandle<()>,
}

impl QuizSession {
    /// Start an attempt at `quiz_id` on the current tokio runtime.
    pub fn spawn(service: Arc<dyn AttemptService>, quiz_id: QuizId, config: SessionConfig) -> Self {
        let controller = SessionController::new();
        let id = controller.id();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshots) = watch::channel(SessionSnapshot::loading(id));

        let span = tracing::info_span!("quiz_session", session = %id, quiz = %quiz_id);
        let driver = Driver {
            service,
            config,
            controller,
            commands: command_rx,
            snapshots: snapshot_tx,
        };
        let task = tokio::spawn(driver.run(quiz_id).instrument(span));

        Self {
            id,
            commands,
            snapshots,
            task,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn go_to_question(&self, index: usize) {
        self.send(Command::GoTo(index));
    }

    pub fn next_question(&self) {
        self.send(Command::Next);
    }

    pub fn previous_question(&self) {
        self.send(Command::Previous);
    }

    pub fn select_single(&self, question: QuestionId, answer: AnswerId) {
        self.send(Command::SelectSingle(question, answer));
    }

    pub fn toggle_multiple(&self, question: QuestionId, answer: AnswerId) {
        self.send(Command::ToggleMultiple(question, answer));
    }

    pub fn set_text(&self, question: QuestionId, text: impl Into<String>) {
        self.send(Command::SetText(question, text.into()));
    }

    pub fn submit(&self) {
        self.send(Command::Submit);
    }

    /// The latest published state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until a snapshot satisfies `predicate`.
    ///
    /// Returns the last snapshot if the session ends without satisfying it.
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> SessionSnapshot {
        loop {
            {
                let snapshot = self.snapshots.borrow_and_update();
                if predicate(&*snapshot) {
                    return (*snapshot).clone();
                }
            }
            if self.snapshots.changed().await.is_err() {
                return self.snapshots.borrow().clone();
            }
        }
    }

    /// Wait until the session is `Completed` or `Errored`.
    pub async fn finished(&mut self) -> SessionSnapshot {
        self.wait_for(SessionSnapshot::is_finished).await
    }

    /// Whether the session task has exited.
    pub fn is_closed(&self) -> bool {
        self.task.is_finished()
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::trace!(session = %self.id, "command after session ended ignored");
        }
    }
}

struct Driver {
    service: Arc<dyn AttemptService>,
    config: SessionConfig,
    controller: SessionController,
    commands: mpsc::UnboundedReceiver<Command>,
    snapshots: watch::Sender<SessionSnapshot>,
}

type PendingSubmit = BoxFuture<'static, Result<QuizResult, ServiceError>>;

impl Driver {
    async fn run(mut self, quiz_id: QuizId) {
        if !self.start(quiz_id).await {
            tracing::debug!("session abandoned while loading");
            return;
        }
        self.publish();

        // Held while the attempt is open; dropped on completion or error.
        let mut ticker = self
            .controller
            .is_ticking()
            .then(|| countdown_ticker(self.config.tick_period));
        let mut pending: FuturesUnordered<PendingSubmit> = FuturesUnordered::new();

        while !self.controller.phase().is_terminal() {
            let submission = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => {
                        tracing::debug!(in_flight = !pending.is_empty(), "session abandoned");
                        return;
                    }
                },
                _ = next_tick(&mut ticker) => self.controller.tick(),
                Some(outcome) = pending.next(), if !pending.is_empty() => {
                    match outcome {
                        Ok(result) => self.controller.submit_succeeded(result),
                        Err(error) => self.controller.submit_failed(error),
                    }
                    None
                }
            };

            if let Some(request) = submission {
                pending.push(self.submit(request));
            }
            if !self.controller.is_ticking() {
                ticker = None;
            }
            self.publish();
        }
    }

    /// Returns `false` if every handle was dropped before the start call
    /// resolved.
    async fn start(&mut self, quiz_id: QuizId) -> bool {
        let limit = self.config.start_timeout;
        let service = Arc::clone(&self.service);
        let start = tokio::time::timeout(limit, service.start_attempt(quiz_id));
        tokio::pin!(start);

        loop {
            tokio::select! {
                outcome = &mut start => {
                    match outcome {
                        Ok(Ok(started)) => self.controller.started(started),
                        Ok(Err(error)) => self.controller.start_failed(error),
                        Err(_) => self
                            .controller
                            .start_failed(ServiceError::Timeout(limit.as_secs())),
                    }
                    return true;
                }
                command = self.commands.recv() => match command {
                    // Nothing is open yet; the machine ignores these.
                    Some(command) => {
                        self.handle(command);
                    }
                    None => return false,
                },
            }
        }
    }

    fn handle(&mut self, command: Command) -> Option<SubmitRequest> {
        let controller = &mut self.controller;
        match command {
            Command::GoTo(index) => controller.go_to_question(index),
            Command::Next => controller.next_question(),
            Command::Previous => controller.previous_question(),
            Command::SelectSingle(question, answer) => controller.select_single(question, answer),
            Command::ToggleMultiple(question, answer) => {
                controller.toggle_multiple(question, answer)
            }
            Command::SetText(question, text) => controller.set_text(question, text),
            Command::Submit => return controller.submit(),
        }
        None
    }

    fn submit(&self, request: SubmitRequest) -> PendingSubmit {
        let service = Arc::clone(&self.service);
        let limit = self.config.submit_timeout;
        async move {
            tracing::debug!(
                attempt = %request.attempt_id,
                responses = request.responses.len(),
                "sending submission"
            );
            match tokio::time::timeout(limit, service.submit_attempt(&request)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ServiceError::Timeout(limit.as_secs())),
            }
        }
        .in_current_span()
        .boxed()
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.controller.snapshot());
    }
}

const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);

fn countdown_ticker(period: Duration) -> Interval {
    let period = period.max(MIN_TICK_PERIOD);
    tokio::time::interval_at(Instant::now() + period, period)
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
