//! Hand landmark detection backends.
//!
//! The landmark model itself is external. Backends adapt it to
//! `HandDetector`: the `scripted` backend synthesizes or replays hands for
//! demos and tests, and the `subprocess` backend drives an external helper
//! process (e.g. a MediaPipe script) over stdin/stdout.

mod backend;
mod backends;
mod registry;

pub use backend::HandDetector;
pub use backends::{synthetic_hand, ScriptedBackend, SubprocessBackend, SubprocessConfig};
pub use registry::{BackendRegistry, SharedDetector};
