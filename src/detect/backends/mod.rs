pub mod scripted;
pub mod subprocess;

pub use scripted::{synthetic_hand, ScriptedBackend};
pub use subprocess::{SubprocessBackend, SubprocessConfig};
