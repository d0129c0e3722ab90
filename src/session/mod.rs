// Public API - what other modules can use
pub use extractor::{
    session_cookie, session_id, PlayerSession, RequiredSession, SESSION_COOKIE, SESSION_HEADER,
};

// Internal modules
mod extractor;
