//! Durable snapshot of the dashboard session.

pub mod snapshot;
pub mod storage;

pub use snapshot::*;
pub use storage::*;
