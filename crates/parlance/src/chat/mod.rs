//! Live session streaming engine.
//!
//! One [`ChatSession`] per conversation owns at most one concurrent agent
//! run, converts the run's execution trace into the wire event protocol,
//! re-chunks generated text at safe markdown boundaries, and fans the
//! event stream out to WebSocket subscribers.

pub mod chunker;
pub mod codec;
pub mod driver;
pub mod events;
pub mod queue;
pub mod registry;
pub mod session;
pub mod ws;

pub use events::WireEvent;
pub use registry::SessionRegistry;
pub use session::{ChatDeps, ChatSession, StartOptions};
