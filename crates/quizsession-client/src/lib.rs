//! quizsession-client: grading-service integrations.
//!
//! Implements the `AttemptService` trait over the LMS REST API, plus a
//! scripted mock for tests, and loads client configuration.

pub mod config;
pub mod http;
pub mod mock;

pub use config::{create_service, load_config, load_config_from, ClientConfig};
pub use http::HttpAttemptService;
pub use mock::MockAttemptService;
