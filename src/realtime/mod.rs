// Real-time delivery to browsers over server-sent events

// Public API - what other modules can use
pub use handler::room_events;
pub use subscription::Subscription;

// Internal modules
mod handler;
mod subscription;
