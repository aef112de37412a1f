//! Hand gesture to OSC bridge.
//!
//! Turns hand poses seen by a camera into continuous control values and
//! streams them to an OSC listener (a synthesizer, a lighting rig, a DAW).
//!
//! # Architecture
//!
//! One capture loop runs per active camera stream:
//!
//! 1. **Ingest**: a `CameraProvider` opens a device into a `FrameStream`.
//! 2. **Detect**: a `HandDetector` backend reports 21 landmarks per hand.
//! 3. **Gesture**: each hand is reduced to spread/orientation metrics, the
//!    hand with the largest spread wins, and its spreads are calibrated onto
//!    `0..=1`.
//! 4. **Transport**: the values are sent as OSC float messages.
//!
//! The `StreamManager` owns the loop's lifecycle (`Stopped`, `Loading`,
//! `Running`) and guarantees a single open camera at a time.
//!
//! # Module Structure
//!
//! - `landmark`: landmark indices and hand observations
//! - `gesture`: extraction, dominant-hand selection, normalization
//! - `frame`: RGB frames handed from ingest to detection
//! - `ingest`: camera sources (V4L2, synthetic `stub://` devices)
//! - `detect`: landmark detector backends and their registry
//! - `transport`: OSC addressing and sending
//! - `pipeline`: the per-frame capture loop
//! - `lifecycle`: stream start/stop state machine
//! - `config`: file and environment configuration

pub mod config;
pub mod detect;
pub mod frame;
pub mod gesture;
pub mod ingest;
pub mod landmark;
pub mod lifecycle;
pub mod pipeline;
pub mod transport;

pub use config::HandOscConfig;
pub use detect::{BackendRegistry, HandDetector, ScriptedBackend, SharedDetector};
pub use frame::Frame;
pub use gesture::{
    Calibration, ControlSignal, ExtractionStrategy, GestureFrame, GestureProcessor, SignalPair,
};
pub use ingest::{CameraProvider, FrameStream, V4l2Config, V4l2Provider, V4l2Source};
pub use landmark::{HandLandmark, HandObservation, Point, HAND_LANDMARK_COUNT};
pub use lifecycle::{StreamManager, StreamState, StreamStatus};
pub use pipeline::{CapturePipeline, FrameAnnotation, FrameOutcome, PipelineSettings};
pub use transport::{AddressScheme, ControlSink, OscSender};
