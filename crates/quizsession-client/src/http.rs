//! Grading-service client over HTTP.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::instrument;

use quizsession_core::error::ServiceError;
use quizsession_core::model::{Attempt, QuizId, Quiz, QuizResult, StartedAttempt};
use quizsession_core::traits::{AttemptService, SubmitRequest};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Talks to the LMS REST API.
pub struct HttpAttemptService {
    base_url: String,
    token: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpAttemptService {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let base = if base_url.is_empty() {
            DEFAULT_BASE_URL
        } else {
            base_url
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url: base.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
            timeout,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Failure> {
        let mut request = self.client.get(self.url(path));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        self.send(request).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Failure> {
        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        self.send(request).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, Failure> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Failure::Transport(ServiceError::Timeout(self.timeout.as_secs()))
            } else {
                Failure::Transport(ServiceError::Network(e.to_string()))
            }
        })?;

        let status = response.status().as_u16();
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(Failure::Status {
                status,
                body: ErrorBody::parse(&body),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Failure::Transport(ServiceError::Decode(e.to_string())))
    }
}

#[derive(Serialize)]
struct StartBody {
    quiz_id: QuizId,
}

#[async_trait]
impl AttemptService for HttpAttemptService {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self), fields(base_url = %self.base_url))]
    async fn start_attempt(&self, quiz_id: QuizId) -> Result<StartedAttempt, ServiceError> {
        let quiz: Quiz = self
            .get(&format!("quizzes/{quiz_id}/"))
            .await
            .map_err(|f| f.into_start_error())?;

        let attempt: Attempt = self
            .post("quizzes/start/", &StartBody { quiz_id })
            .await
            .map_err(|f| f.into_start_error())?;

        tracing::debug!(attempt = %attempt.id, questions = quiz.question_count(), "attempt opened");
        Ok(StartedAttempt { quiz, attempt })
    }

    #[instrument(skip(self, request), fields(attempt = %request.attempt_id, responses = request.responses.len()))]
    async fn submit_attempt(&self, request: &SubmitRequest) -> Result<QuizResult, ServiceError> {
        self.post("quizzes/submit/", request)
            .await
            .map_err(|f| f.into_submit_error())
    }
}

/// A failed call before it is mapped to the caller's error taxonomy.
#[derive(Debug)]
enum Failure {
    Transport(ServiceError),
    Status { status: u16, body: ErrorBody },
}

impl Failure {
    fn into_start_error(self) -> ServiceError {
        match self {
            Failure::Transport(error) => error,
            Failure::Status { status: 404, body } => ServiceError::QuizNotFound(body.message),
            Failure::Status { status: 400, body } if body.has_field("quiz_id") => {
                ServiceError::QuizNotFound(body.message)
            }
            Failure::Status { status: 400, body } if body.error.is_some() => {
                ServiceError::AttemptNotPermitted(body.message)
            }
            Failure::Status { status, body } => common_error(status, body),
        }
    }

    fn into_submit_error(self) -> ServiceError {
        match self {
            Failure::Transport(error) => error,
            Failure::Status { status: 404, body } => ServiceError::AlreadySubmitted(body.message),
            Failure::Status { status: 400, body } if body.error.is_some() => {
                ServiceError::AttemptExpired(body.message)
            }
            Failure::Status { status: 400, body } => ServiceError::Validation(body.message),
            Failure::Status { status, body } => common_error(status, body),
        }
    }
}

fn common_error(status: u16, body: ErrorBody) -> ServiceError {
    match status {
        401 | 403 => ServiceError::Unauthorized(body.message),
        _ => ServiceError::Api {
            status,
            message: body.message,
        },
    }
}

/// Error payloads come as `{"error": ..}`, `{"detail": ..}`, or a map of
/// field name to messages.
#[derive(Debug, Default)]
struct ErrorBody {
    error: Option<String>,
    fields: Vec<String>,
    message: String,
}

impl ErrorBody {
    fn parse(raw: &str) -> Self {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
            return Self {
                message: raw.trim().to_string(),
                ..Self::default()
            };
        };
        let Some(object) = value.as_object() else {
            let message = match value.as_str() {
                Some(text) => text.trim().to_string(),
                None => raw.trim().to_string(),
            };
            return Self {
                message,
                ..Self::default()
            };
        };

        let error = object
            .get("error")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let detail = object.get("detail").and_then(|v| v.as_str());

        let mut fields = Vec::new();
        let mut first_field_message = None;
        for (name, v) in object {
            if name == "error" || name == "detail" {
                continue;
            }
            let text = match v {
                serde_json::Value::String(s) => Some(s.as_str()),
                serde_json::Value::Array(items) => items.first().and_then(|i| i.as_str()),
                _ => None,
            };
            if let Some(text) = text {
                fields.push(name.clone());
                first_field_message.get_or_insert_with(|| format!("{name}: {text}"));
            }
        }

        let message = error
            .clone()
            .or_else(|| detail.map(str::to_string))
            .or(first_field_message)
            .unwrap_or_default();

        Self {
            error,
            fields,
            message,
        }
    }

    fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f == name)
    }
}
