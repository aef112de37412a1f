//! Capture loop.
//!
//! One iteration: read a frame, detect hands, extract and select the
//! dominant hand, normalize, emit control messages, annotate. Frames are
//! handled strictly one at a time and in order; a frame's messages depend
//! only on that frame.
//!
//! Failures inside an iteration stay inside it. A detector error or a frame
//! without hands emits nothing (the listener keeps its last value). A read
//! error ends the loop: before the first frame it is retried up to
//! `warmup_attempts` times to absorb camera warm-up, afterwards it means the
//! source is exhausted.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::detect::SharedDetector;
use crate::frame::Frame;
use crate::gesture::{GestureFrame, GestureProcessor};
use crate::ingest::FrameStream;
use crate::transport::{AddressScheme, ControlSink};

pub const DEFAULT_WARMUP_ATTEMPTS: u32 = 10;
pub const DEFAULT_WARMUP_DELAY: Duration = Duration::from_millis(50);
pub const DEFAULT_MAX_HANDS: usize = 2;

#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub processor: GestureProcessor,
    pub addresses: AddressScheme,
    /// Hands beyond this count are ignored, in detector order.
    pub max_hands: usize,
    /// Reads attempted before the first frame counts as a failed start.
    pub warmup_attempts: u32,
    /// Pause between failed warm-up reads.
    pub warmup_delay: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            processor: GestureProcessor::default(),
            addresses: AddressScheme::default(),
            max_hands: DEFAULT_MAX_HANDS,
            warmup_attempts: DEFAULT_WARMUP_ATTEMPTS,
            warmup_delay: DEFAULT_WARMUP_DELAY,
        }
    }
}

/// Overlay data for the dominant hand, in pixel coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameAnnotation {
    pub segments: Vec<((i32, i32), (i32, i32))>,
    pub labels: Vec<String>,
}

/// What one iteration did.
#[derive(Clone, Debug)]
pub struct FrameOutcome {
    pub sequence: u64,
    pub hands_detected: usize,
    pub gesture: Option<GestureFrame>,
    pub annotation: Option<FrameAnnotation>,
}

impl FrameOutcome {
    pub fn emitted(&self) -> bool {
        self.gesture.is_some()
    }
}

/// Why the loop stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopExit {
    /// The stop flag was observed.
    Stopped,
    /// The source could not deliver another frame.
    SourceEnded(String),
}

/// Called after every processed frame, e.g. by a presentation layer that
/// draws the annotation.
pub type FrameObserver = Arc<dyn Fn(&Frame, &FrameOutcome) + Send + Sync>;

pub struct CapturePipeline {
    settings: PipelineSettings,
    detector: SharedDetector,
    sink: Arc<dyn ControlSink>,
    observer: Option<FrameObserver>,
}

impl CapturePipeline {
    pub fn new(
        settings: PipelineSettings,
        detector: SharedDetector,
        sink: Arc<dyn ControlSink>,
    ) -> Self {
        Self {
            settings,
            detector,
            sink,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: FrameObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Warm up the detector, then read until the first frame arrives.
    ///
    /// Gives up after `warmup_attempts` failed reads or when `stop` is set.
    pub fn warm_up(&self, stream: &mut dyn FrameStream, stop: &AtomicBool) -> Result<Frame> {
        {
            let mut detector = self
                .detector
                .lock()
                .map_err(|_| anyhow!("detector lock poisoned"))?;
            detector.warm_up()?;
        }

        let attempts = self.settings.warmup_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            if stop.load(Ordering::SeqCst) {
                return Err(anyhow!("start of {} cancelled", stream.device()));
            }
            match stream.read() {
                Ok(frame) => return Ok(frame),
                Err(err) => {
                    log::warn!(
                        "failed to grab frame from {} (attempt {}/{}): {}",
                        stream.device(),
                        attempt,
                        attempts,
                        err
                    );
                    last_error = Some(err);
                }
            }
            if attempt < attempts && !self.settings.warmup_delay.is_zero() {
                std::thread::sleep(self.settings.warmup_delay);
            }
        }
        Err(anyhow!(
            "could not read a frame from {} after {} attempts: {}",
            stream.device(),
            attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        ))
    }

    /// Process `first`, then keep reading until `stop` is set or the source ends.
    ///
    /// `stop` is checked at the top of every iteration; a read already in
    /// progress completes first.
    pub fn run(
        &self,
        stream: &mut dyn FrameStream,
        first: Frame,
        stop: &AtomicBool,
        mut on_frame: impl FnMut(&FrameOutcome),
    ) -> LoopExit {
        let mut next = Some(first);
        loop {
            if stop.load(Ordering::SeqCst) {
                return LoopExit::Stopped;
            }
            let frame = match next.take() {
                Some(frame) => frame,
                None => match stream.read() {
                    Ok(frame) => frame,
                    Err(err) => return LoopExit::SourceEnded(err.to_string()),
                },
            };
            let outcome = self.process_frame(&frame);
            on_frame(&outcome);
        }
    }

    /// Run one frame through detection, selection, emission and annotation.
    pub fn process_frame(&self, frame: &Frame) -> FrameOutcome {
        let mut hands = match self.detect(frame) {
            Ok(hands) => hands,
            Err(err) => {
                log::warn!("hand detection failed on frame {}: {}", frame.sequence, err);
                Vec::new()
            }
        };
        let hands_detected = hands.len();
        hands.truncate(self.settings.max_hands);

        let gesture = self.settings.processor.process(&hands);
        let annotation = gesture.as_ref().map(|gesture| {
            self.emit(gesture);
            annotate(gesture, frame.width, frame.height)
        });
        if let Some(annotation) = &annotation {
            log::debug!(
                "frame {}: {} ({} ms)",
                frame.sequence,
                annotation.labels.join(" "),
                frame.age_ms()
            );
        }

        let outcome = FrameOutcome {
            sequence: frame.sequence,
            hands_detected,
            gesture,
            annotation,
        };
        if let Some(observer) = &self.observer {
            observer(frame, &outcome);
        }
        outcome
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<crate::landmark::HandObservation>> {
        let mut detector = self
            .detector
            .lock()
            .map_err(|_| anyhow!("detector lock poisoned"))?;
        detector.detect(frame)
    }

    fn emit(&self, gesture: &GestureFrame) {
        for (address, value) in self.settings.addresses.messages(&gesture.signal) {
            if let Err(err) = self.sink.send(&address, value) {
                log::warn!("control message {} dropped: {}", address, err);
            }
        }
    }
}

fn annotate(gesture: &GestureFrame, width: u32, height: u32) -> FrameAnnotation {
    let pairs = gesture.dominant.metrics.pairs();
    let numbered = gesture.signal.pairs.len() > 1;
    let segments = pairs
        .iter()
        .map(|pair| (pair.from.to_pixel(width, height), pair.to.to_pixel(width, height)))
        .collect();
    let mut labels = Vec::with_capacity(gesture.signal.pairs.len() * 2);
    for (i, pair) in gesture.signal.pairs.iter().enumerate() {
        let suffix = if numbered {
            (i + 1).to_string()
        } else {
            String::new()
        };
        labels.push(format!("Dist{}: {:.2}", suffix, pair.distance));
        labels.push(format!("Angle{}: {:.2}", suffix, pair.rotation));
    }
    FrameAnnotation { segments, labels }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{synthetic_hand, ScriptedBackend};
    use crate::gesture::{Calibration, ExtractionStrategy};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(String, f32)>>,
    }

    impl ControlSink for Recorder {
        fn send(&self, address: &str, value: f32) -> Result<()> {
            self.sent
                .lock()
                .map_err(|_| anyhow!("poisoned"))?
                .push((address.to_string(), value));
            Ok(())
        }
    }

    fn pipeline(
        strategy: ExtractionStrategy,
        script: Vec<Vec<crate::landmark::HandObservation>>,
    ) -> (CapturePipeline, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let settings = PipelineSettings {
            processor: GestureProcessor::new(strategy, Calibration::default()),
            ..PipelineSettings::default()
        };
        let detector: SharedDetector = Arc::new(Mutex::new(ScriptedBackend::replay(script)));
        (
            CapturePipeline::new(settings, detector, recorder.clone()),
            recorder,
        )
    }

    #[test]
    fn fixed_pair_frame_sends_four_messages() -> Result<()> {
        let (pipeline, recorder) =
            pipeline(ExtractionStrategy::FixedPair, vec![vec![synthetic_hand(0.75, 0.0)]]);
        let outcome = pipeline.process_frame(&Frame::blank(640, 480, 1)?);
        assert!(outcome.emitted());

        let sent = recorder.sent.lock().unwrap();
        let addresses: Vec<&str> = sent.iter().map(|(a, _)| a.as_str()).collect();
        assert_eq!(
            addresses,
            vec![
                "/hand/distance1",
                "/hand/rotation1",
                "/hand/distance2",
                "/hand/rotation2"
            ]
        );
        assert!((sent[0].1 - 0.5).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn annotation_projects_dominant_pair() -> Result<()> {
        let (pipeline, _) =
            pipeline(ExtractionStrategy::MaxPair, vec![vec![synthetic_hand(1.0, 0.0)]]);
        let outcome = pipeline.process_frame(&Frame::blank(100, 100, 1)?);
        let annotation = outcome.annotation.expect("annotation");
        assert_eq!(annotation.segments.len(), 1);
        assert_eq!(annotation.labels.len(), 2);
        assert!(annotation.labels[0].starts_with("Dist: "));
        Ok(())
    }

    #[test]
    fn empty_frames_send_nothing() -> Result<()> {
        let (pipeline, recorder) = pipeline(ExtractionStrategy::FixedPair, vec![vec![]]);
        let outcome = pipeline.process_frame(&Frame::blank(2, 2, 1)?);
        assert!(!outcome.emitted());
        assert!(outcome.annotation.is_none());
        assert!(recorder.sent.lock().unwrap().is_empty());
        Ok(())
    }

    #[test]
    fn extra_hands_are_truncated_in_detector_order() -> Result<()> {
        let hands = vec![
            synthetic_hand(0.6, 0.0),
            synthetic_hand(0.7, 0.0),
            synthetic_hand(1.0, 0.0),
        ];
        let (pipeline, _) = pipeline(ExtractionStrategy::FixedPair, vec![hands]);
        let outcome = pipeline.process_frame(&Frame::blank(2, 2, 1)?);
        assert_eq!(outcome.hands_detected, 3);
        let gesture = outcome.gesture.expect("gesture");
        assert_eq!(gesture.dominant.index, 1);
        Ok(())
    }
}
