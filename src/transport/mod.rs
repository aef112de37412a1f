//! Control-signal transport.
//!
//! Control values leave the process as named scalar messages, fire-and-forget:
//! no acknowledgment is expected and failed sends are not retried. The OSC
//! sender is the production sink; anything implementing `ControlSink` can
//! stand in for it.

mod osc;

pub use osc::{parse_osc_target, OscSender, DEFAULT_OSC_TARGET};

use anyhow::Result;

use crate::gesture::ControlSignal;

pub const DEFAULT_ADDRESS_PREFIX: &str = "/hand";

/// Destination for named control values.
pub trait ControlSink: Send + Sync {
    fn send(&self, address: &str, value: f32) -> Result<()>;
}

/// Maps signal pairs to message addresses under a common prefix.
///
/// A single pair is sent as `<prefix>/distance` and `<prefix>/rotation`;
/// multiple pairs are numbered from 1 (`<prefix>/distance1`, ...).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressScheme {
    prefix: String,
}

impl Default for AddressScheme {
    fn default() -> Self {
        Self::new(DEFAULT_ADDRESS_PREFIX)
    }
}

impl AddressScheme {
    pub fn new(prefix: &str) -> Self {
        let trimmed = prefix.trim().trim_end_matches('/');
        let prefix = if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        };
        Self { prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `(address, value)` messages for a signal, in send order.
    pub fn messages(&self, signal: &ControlSignal) -> Vec<(String, f32)> {
        let numbered = signal.pairs.len() > 1;
        let mut messages = Vec::with_capacity(signal.pairs.len() * 2);
        for (i, pair) in signal.pairs.iter().enumerate() {
            let suffix = if numbered {
                (i + 1).to_string()
            } else {
                String::new()
            };
            messages.push((format!("{}/distance{}", self.prefix, suffix), pair.distance));
            messages.push((format!("{}/rotation{}", self.prefix, suffix), pair.rotation));
        }
        messages
    }
}
