pub mod clock;
pub mod time;

// Foundation crate: small, well-tested primitives only.
pub use clock::*;
pub use time::*;

pub use chrono::Duration;
