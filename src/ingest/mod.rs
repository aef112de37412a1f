//! Camera frame sources.
//!
//! A `CameraProvider` opens a device identifier into a `FrameStream`; the
//! stream yields frames until the source is exhausted or disconnected, and
//! releases the device when dropped. Device identifiers are:
//! - `stub://<name>`: synthetic frames (testing, demos)
//! - `/dev/videoN`: V4L2 device node (feature: ingest-v4l2)
//! - `N`: shorthand for `/dev/videoN`
//!
//! Frame sources MUST NOT:
//! - Store captured frames to disk
//! - Log pixel content
//! - Retain frames beyond handoff to the capture loop

use anyhow::Result;

use crate::frame::Frame;

mod devices;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod v4l2;

pub use devices::{list_devices, resolve_device};
pub use v4l2::{V4l2Config, V4l2Provider, V4l2Source};

/// An open capture resource bound to one device.
///
/// Dropping the stream releases the device.
pub trait FrameStream: Send {
    /// Resolved device identifier.
    fn device(&self) -> &str;

    /// Block until the next frame is available.
    ///
    /// An error means no frame could be read: a warm-up miss before the
    /// first frame, or end of stream afterwards.
    fn read(&mut self) -> Result<Frame>;
}

/// Opens devices into frame streams.
pub trait CameraProvider: Send + Sync {
    fn open(&self, device: &str) -> Result<Box<dyn FrameStream>>;
}
