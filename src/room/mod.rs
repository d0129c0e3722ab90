// Public API - what other modules can use
pub use handlers::{
    cast_vote, close_room, create_room, get_game, get_lobby, get_results, host_candidates,
    join_room, leave_room, restart_game, start_game, toggle_ready,
};
pub use service::RoomService;

// Internal modules
pub mod code;
mod handlers;
pub mod models;
pub mod repository;
mod service;
pub mod types;
pub mod views;
