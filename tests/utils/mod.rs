pub mod actions;
pub mod assertions;
pub mod setup;

// Re-export main utilities for use by test files
#[allow(unused_imports)]
pub use assertions::{drain, events_of, redirects, MessageLog};
#[allow(unused_imports)]
pub use setup::{TestSetup, TestSetupBuilder};
