pub mod handler;
pub mod hub;
pub mod messages;

pub use handler::handle_game_socket;
pub use hub::GameHub;
