//! V4L2 frame source.
//!
//! This module provides `V4l2Source` for capturing frames from local V4L2
//! devices, and `V4l2Provider`, the `CameraProvider` the lifecycle manager
//! uses to open them.
//!
//! `stub://` identifiers select a synthetic backend:
//! - `stub://fail`: refuses to open
//! - `stub://blank`: opens, never yields a frame
//! - `stub://eof:N`: yields N frames, then ends
//! - any other name: yields frames forever

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

use super::devices::resolve_device;
use super::{CameraProvider, FrameStream};
use crate::frame::Frame;

const STUB_SCHEME: &str = "stub://";

/// Configuration for a V4L2 source.
#[derive(Clone, Debug)]
pub struct V4l2Config {
    /// Device path (e.g., "/dev/video0") or `stub://` identifier.
    pub device: String,
    /// Target frame rate. Synthetic sources pace themselves to it; 0 disables pacing.
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 30,
            width: 640,
            height: 480,
        }
    }
}

/// Opens V4L2 (or synthetic) sources using a shared size/rate template.
#[derive(Clone, Debug, Default)]
pub struct V4l2Provider {
    template: V4l2Config,
}

impl V4l2Provider {
    pub fn new(template: V4l2Config) -> Self {
        Self { template }
    }
}

impl CameraProvider for V4l2Provider {
    fn open(&self, device: &str) -> Result<Box<dyn FrameStream>> {
        let config = V4l2Config {
            device: resolve_device(device),
            ..self.template.clone()
        };
        let mut source = V4l2Source::new(config)?;
        source.connect()?;
        Ok(Box::new(source))
    }
}

/// V4L2 frame source.
///
/// Uses libv4l for real devices, with a synthetic fallback for `stub://` paths.
pub struct V4l2Source {
    device: String,
    backend: V4l2Backend,
}

enum V4l2Backend {
    Synthetic(SyntheticV4l2Source),
    #[cfg(feature = "ingest-v4l2")]
    Device(DeviceV4l2Source),
}

impl V4l2Source {
    pub fn new(config: V4l2Config) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("frame size must be non-zero"));
        }
        let device = config.device.clone();
        if config.device.starts_with(STUB_SCHEME) {
            Ok(Self {
                device,
                backend: V4l2Backend::Synthetic(SyntheticV4l2Source::new(config)?),
            })
        } else {
            #[cfg(feature = "ingest-v4l2")]
            {
                Ok(Self {
                    device,
                    backend: V4l2Backend::Device(DeviceV4l2Source::new(config)),
                })
            }
            #[cfg(not(feature = "ingest-v4l2"))]
            {
                Err(anyhow!(
                    "camera {} requires the ingest-v4l2 feature",
                    config.device
                ))
            }
        }
    }

    /// Connect to the device.
    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            V4l2Backend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            V4l2Backend::Device(source) => source.connect(),
        }
    }

    /// Capture the next frame, converted to RGB24.
    pub fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            V4l2Backend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            V4l2Backend::Device(source) => source.next_frame(),
        }
    }

    pub fn frames_captured(&self) -> u64 {
        match &self.backend {
            V4l2Backend::Synthetic(source) => source.frame_count,
            #[cfg(feature = "ingest-v4l2")]
            V4l2Backend::Device(source) => source.frame_count,
        }
    }
}

impl FrameStream for V4l2Source {
    fn device(&self) -> &str {
        &self.device
    }

    fn read(&mut self) -> Result<Frame> {
        self.next_frame()
    }
}

impl Drop for V4l2Source {
    fn drop(&mut self) {
        log::info!(
            "V4l2Source: released {} after {} frames",
            self.device,
            self.frames_captured()
        );
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StubMode {
    Live,
    Refuse,
    Blank,
    Eof(u64),
}

fn parse_stub_mode(device: &str) -> Result<StubMode> {
    let name = device.strip_prefix(STUB_SCHEME).unwrap_or(device);
    match name {
        "fail" => Ok(StubMode::Refuse),
        "blank" => Ok(StubMode::Blank),
        _ => match name.strip_prefix("eof:") {
            Some(count) => count
                .parse::<u64>()
                .map(StubMode::Eof)
                .map_err(|_| anyhow!("invalid frame count in {}", device)),
            None => Ok(StubMode::Live),
        },
    }
}

struct SyntheticV4l2Source {
    config: V4l2Config,
    mode: StubMode,
    connected: bool,
    frame_count: u64,
    last_frame_at: Option<Instant>,
}

impl SyntheticV4l2Source {
    fn new(config: V4l2Config) -> Result<Self> {
        let mode = parse_stub_mode(&config.device)?;
        Ok(Self {
            config,
            mode,
            connected: false,
            frame_count: 0,
            last_frame_at: None,
        })
    }

    fn connect(&mut self) -> Result<()> {
        if self.mode == StubMode::Refuse {
            return Err(anyhow!("could not open camera {}", self.config.device));
        }
        self.connected = true;
        log::info!(
            "V4l2Source: connected to {} (synthetic)",
            self.config.device
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("v4l2 device not connected"));
        }
        match self.mode {
            StubMode::Blank => return Err(anyhow!("no frame from {}", self.config.device)),
            StubMode::Eof(limit) if self.frame_count >= limit => {
                return Err(anyhow!("end of stream on {}", self.config.device))
            }
            _ => {}
        }
        self.pace();
        self.frame_count += 1;
        let pixels = self.generate_synthetic_pixels();
        Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            self.frame_count,
        )
    }

    fn pace(&mut self) {
        if self.config.target_fps > 0 {
            let interval = Duration::from_secs(1) / self.config.target_fps;
            if let Some(last) = self.last_frame_at {
                let elapsed = last.elapsed();
                if elapsed < interval {
                    std::thread::sleep(interval - elapsed);
                }
            }
        }
        self.last_frame_at = Some(Instant::now());
    }

    /// Slowly drifting gradient; detectors never see real content here.
    fn generate_synthetic_pixels(&self) -> Vec<u8> {
        let pixel_count = (self.config.width * self.config.height * 3) as usize;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count) % 256) as u8;
        }
        pixels
    }
}

// ----------------------------------------------------------------------------
// Production V4L2 source using libv4l
// ----------------------------------------------------------------------------

#[cfg(feature = "ingest-v4l2")]
use device::DeviceV4l2Source;

#[cfg(feature = "ingest-v4l2")]
mod device {
    use anyhow::{anyhow, Context, Result};
    use ouroboros::self_referencing;

    use super::V4l2Config;
    use crate::frame::Frame;
    use crate::ingest::normalize::{normalize_to_rgb, PixelFormat};

    pub(super) struct DeviceV4l2Source {
        config: V4l2Config,
        state: Option<DeviceV4l2State>,
        pub(super) frame_count: u64,
        format: PixelFormat,
        active_width: u32,
        active_height: u32,
    }

    #[self_referencing]
    struct DeviceV4l2State {
        device: v4l::Device,
        #[borrows(mut device)]
        #[covariant]
        stream: v4l::prelude::MmapStream<'this, v4l::Device>,
    }

    impl DeviceV4l2Source {
        pub(super) fn new(config: V4l2Config) -> Self {
            Self {
                active_width: config.width,
                active_height: config.height,
                config,
                state: None,
                frame_count: 0,
                format: PixelFormat::Rgb24,
            }
        }

        pub(super) fn connect(&mut self) -> Result<()> {
            use v4l::buffer::Type;
            use v4l::video::Capture;

            let mut device = v4l::Device::with_path(&self.config.device)
                .with_context(|| format!("open v4l2 device {}", self.config.device))?;
            let mut format = device.format().context("read v4l2 format")?;
            format.width = self.config.width;
            format.height = self.config.height;
            format.fourcc = v4l::FourCC::new(b"RGB3");

            let format = match device.set_format(&format) {
                Ok(format) => format,
                Err(err) => {
                    log::warn!(
                        "V4l2Source: failed to set format on {}: {}",
                        self.config.device,
                        err
                    );
                    device
                        .format()
                        .context("read v4l2 format after set failure")?
                }
            };
            self.format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
                anyhow!(
                    "v4l2 device {} delivers unsupported pixel format {}",
                    self.config.device,
                    format.fourcc
                )
            })?;

            if self.config.target_fps > 0 {
                let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
                if let Err(err) = device.set_params(&params) {
                    log::warn!(
                        "V4l2Source: failed to set fps on {}: {}",
                        self.config.device,
                        err
                    );
                }
            }

            self.active_width = format.width;
            self.active_height = format.height;

            let state = DeviceV4l2StateBuilder {
                device,
                stream_builder: |device| {
                    v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                        .map_err(|err| {
                            anyhow::Error::new(err).context("create v4l2 buffer stream")
                        })
                },
            }
            .try_build()?;
            self.state = Some(state);

            log::info!(
                "V4l2Source: connected to {} ({}x{}, {:?})",
                self.config.device,
                self.active_width,
                self.active_height,
                self.format
            );
            Ok(())
        }

        pub(super) fn next_frame(&mut self) -> Result<Frame> {
            use v4l::io::traits::CaptureStream;

            let width = self.active_width;
            let height = self.active_height;
            let format = self.format;
            let state = self.state.as_mut().context("v4l2 device not connected")?;
            let pixels = state.with_mut(|fields| -> Result<Vec<u8>> {
                let (buf, _meta) = fields.stream.next().context("capture v4l2 frame")?;
                normalize_to_rgb(buf, width, height, format)
            })?;

            self.frame_count += 1;
            Frame::new(pixels, width, height, self.frame_count)
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config(device: &str) -> V4l2Config {
        V4l2Config {
            device: device.to_string(),
            target_fps: 0,
            width: 64,
            height: 48,
        }
    }

    #[test]
    fn v4l2_source_produces_numbered_frames() -> Result<()> {
        let mut source = V4l2Source::new(stub_config("stub://test"))?;
        source.connect()?;

        let first = source.next_frame()?;
        let second = source.next_frame()?;
        assert_eq!(first.width, 64);
        assert_eq!(first.height, 48);
        assert_eq!(first.pixels().len(), 64 * 48 * 3);
        assert_eq!((first.sequence, second.sequence), (1, 2));
        Ok(())
    }

    #[test]
    fn refusing_stub_fails_to_connect() -> Result<()> {
        let mut source = V4l2Source::new(stub_config("stub://fail"))?;
        assert!(source.connect().is_err());
        Ok(())
    }

    #[test]
    fn blank_stub_never_yields() -> Result<()> {
        let mut source = V4l2Source::new(stub_config("stub://blank"))?;
        source.connect()?;
        for _ in 0..3 {
            assert!(source.next_frame().is_err());
        }
        Ok(())
    }

    #[test]
    fn eof_stub_ends_after_count() -> Result<()> {
        let mut source = V4l2Source::new(stub_config("stub://eof:2"))?;
        source.connect()?;
        assert!(source.next_frame().is_ok());
        assert!(source.next_frame().is_ok());
        assert!(source.next_frame().is_err());
        assert_eq!(source.frames_captured(), 2);
        Ok(())
    }

    #[test]
    fn malformed_eof_count_is_rejected() {
        assert!(V4l2Source::new(stub_config("stub://eof:many")).is_err());
    }

    #[test]
    fn provider_opens_connected_stream() -> Result<()> {
        let provider = V4l2Provider::new(stub_config("unused"));
        let mut stream = provider.open("stub://hands")?;
        assert_eq!(stream.device(), "stub://hands");
        assert_eq!(stream.read()?.sequence, 1);
        assert!(provider.open("stub://fail").is_err());
        Ok(())
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn real_devices_require_feature() {
        let provider = V4l2Provider::default();
        assert!(provider.open("0").is_err());
    }
}
