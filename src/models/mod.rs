pub mod game;
pub mod pack;
pub mod user;

pub use game::{
    // Persisted game row
    Game,
    // What players are served
    GameView,
    // State blob stored inside the row
    GameState, PlayerScore, SceneSnapshot, Submission, STEP_ANSWERING, STEP_REVEAL, STEP_WAITING,
};
pub use pack::{AnswerType, Pack, QuestionType, Scene, SceneAnswer};
pub use user::User;
