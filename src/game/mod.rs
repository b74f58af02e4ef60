pub mod matcher;
pub mod scorer;
pub mod service;
pub mod transitions;

pub use service::GameService;
pub use transitions::{GameError, SubmissionInput};
