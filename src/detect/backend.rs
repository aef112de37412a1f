use anyhow::Result;

use crate::frame::Frame;
use crate::landmark::HandObservation;

/// Hand landmark detector backend.
///
/// Implementations treat the frame as read-only and ephemeral: pixels must
/// not be stored beyond the `detect` call, written to disk, or forwarded.
pub trait HandDetector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Detect zero or more hands in a frame, in the detector's own order.
    ///
    /// An error means this frame produced no usable result; callers skip
    /// the frame and do not retry.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<HandObservation>>;

    /// Optional warm-up hook, called once before a stream starts.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
