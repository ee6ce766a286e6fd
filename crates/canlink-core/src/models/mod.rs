//! Shared data models for CAN bus sessions

mod descriptor;
mod frame;
mod message;
mod state;

pub use descriptor::*;
pub use frame::*;
pub use message::*;
pub use state::*;
