pub mod config;
pub mod driver;
pub mod error;
pub mod key;
pub mod layers;
pub mod store;

pub use config::*;
pub use driver::*;
pub use error::*;
pub use key::{Field, StateKey, StateValue};
pub use layers::*;
pub use store::*;
