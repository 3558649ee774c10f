pub mod event_bus;
pub mod timer;
pub mod visibility;

pub use event_bus::*;
pub use timer::*;
pub use visibility::*;
