// Real-time notification components
//
// Room mutations queue their notifications in an `Outbox` while the room
// lock is held; the `Broadcaster` delivers them once the lock is released.

// Public API - what other modules can use
pub use broadcaster::Broadcaster;
pub use events::{RoomEventKind, RoomMessage};
pub use outbox::{Notice, Outbox, Render};

// Internal modules
mod broadcaster;
mod events;
mod outbox;
