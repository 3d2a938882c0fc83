//! quizsession-core: quiz attempt engine.
//!
//! This crate defines the data model, the grading-service trait, and the
//! state machine that sequences one attempt from start to scored result,
//! including answer capture and the countdown.

pub mod answers;
pub mod display;
pub mod error;
pub mod machine;
pub mod model;
pub mod runtime;
pub mod session;
pub mod traits;

pub use error::ServiceError;
pub use machine::{Event, Phase, State};
pub use runtime::{QuizSession, SessionConfig};
pub use session::{SessionController, SessionSnapshot};
pub use traits::AttemptService;
