//! Session wiring: URL mirroring, startup merge of URL/storage/defaults, and
//! the context object collaborators are handed.

pub mod bootstrap;
pub mod location;
pub mod query;
pub mod session;
pub mod url_sync;

pub use bootstrap::*;
pub use location::*;
pub use query::*;
pub use session::*;
pub use url_sync::*;
