// Client-side message synchronization: the engine, the identity accessor,
// and the display-facing event stream.

pub mod engine;
pub mod events;
pub mod identity;
pub mod view;

pub use engine::ChatEngine;
pub use events::ChatEvent;
pub use identity::{IdentitySource, SessionIdentity};
