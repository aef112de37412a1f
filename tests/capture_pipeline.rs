use anyhow::{anyhow, Result};
use rosc::{OscPacket, OscType};
use std::net::UdpSocket;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hand_osc::detect::{synthetic_hand, HandDetector, ScriptedBackend, SharedDetector};
use hand_osc::gesture::{Calibration, ExtractionStrategy, GestureProcessor};
use hand_osc::ingest::{CameraProvider, V4l2Config, V4l2Provider};
use hand_osc::landmark::HandObservation;
use hand_osc::pipeline::{CapturePipeline, FrameObserver, LoopExit, PipelineSettings};
use hand_osc::transport::ControlSink;
use hand_osc::{Frame, OscSender};

#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<(String, f32)>>,
}

impl ControlSink for Recorder {
    fn send(&self, address: &str, value: f32) -> Result<()> {
        self.sent.lock().unwrap().push((address.to_string(), value));
        Ok(())
    }
}

struct BrokenDetector;

impl HandDetector for BrokenDetector {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<HandObservation>> {
        Err(anyhow!("model crashed"))
    }
}

fn settings(strategy: ExtractionStrategy) -> PipelineSettings {
    PipelineSettings {
        processor: GestureProcessor::new(strategy, Calibration::default()),
        warmup_delay: Duration::ZERO,
        ..PipelineSettings::default()
    }
}

fn replay(frames: Vec<Vec<HandObservation>>) -> SharedDetector {
    Arc::new(Mutex::new(ScriptedBackend::replay(frames)))
}

#[test]
fn frame_without_hands_sends_nothing() -> Result<()> {
    let recorder = Arc::new(Recorder::default());
    let pipeline = CapturePipeline::new(
        settings(ExtractionStrategy::FixedPair),
        replay(vec![vec![]]),
        recorder.clone(),
    );
    let outcome = pipeline.process_frame(&Frame::blank(8, 8, 1)?);
    assert_eq!(outcome.hands_detected, 0);
    assert!(outcome.gesture.is_none());
    assert!(recorder.sent.lock().unwrap().is_empty());
    Ok(())
}

#[test]
fn closed_hand_sends_nothing() -> Result<()> {
    let recorder = Arc::new(Recorder::default());
    let pipeline = CapturePipeline::new(
        settings(ExtractionStrategy::FixedPair),
        replay(vec![vec![synthetic_hand(0.0, 0.0)]]),
        recorder.clone(),
    );
    let outcome = pipeline.process_frame(&Frame::blank(8, 8, 1)?);
    assert_eq!(outcome.hands_detected, 1);
    assert!(!outcome.emitted());
    assert!(recorder.sent.lock().unwrap().is_empty());
    Ok(())
}

#[test]
fn detector_failure_skips_the_frame() -> Result<()> {
    let recorder = Arc::new(Recorder::default());
    let detector: SharedDetector = Arc::new(Mutex::new(BrokenDetector));
    let pipeline = CapturePipeline::new(
        settings(ExtractionStrategy::FixedPair),
        detector,
        recorder.clone(),
    );
    let outcome = pipeline.process_frame(&Frame::blank(8, 8, 1)?);
    assert!(!outcome.emitted());
    assert!(recorder.sent.lock().unwrap().is_empty());
    Ok(())
}

#[test]
fn equal_spreads_keep_the_first_hand() -> Result<()> {
    // Identical geometry; only the detector score tells them apart.
    let first = synthetic_hand(0.9, 0.2).with_score(0.6);
    let second = synthetic_hand(0.9, 0.2).with_score(0.99);
    let pipeline = CapturePipeline::new(
        settings(ExtractionStrategy::MaxPair),
        replay(vec![vec![first, second]]),
        Arc::new(Recorder::default()),
    );
    let outcome = pipeline.process_frame(&Frame::blank(8, 8, 1)?);
    let gesture = outcome.gesture.expect("gesture");
    assert_eq!(gesture.dominant.index, 0);
    Ok(())
}

#[test]
fn widest_hand_wins_regardless_of_order() -> Result<()> {
    let pipeline = CapturePipeline::new(
        settings(ExtractionStrategy::FixedPair),
        replay(vec![vec![synthetic_hand(0.6, 0.0), synthetic_hand(0.95, 0.0)]]),
        Arc::new(Recorder::default()),
    );
    let gesture = pipeline
        .process_frame(&Frame::blank(8, 8, 1)?)
        .gesture
        .expect("gesture");
    assert_eq!(gesture.dominant.index, 1);
    Ok(())
}

#[test]
fn control_values_stay_within_unit_range() -> Result<()> {
    let recorder = Arc::new(Recorder::default());
    let pipeline = CapturePipeline::new(
        settings(ExtractionStrategy::FixedPair),
        replay(vec![
            vec![synthetic_hand(0.2, 0.0)],
            vec![synthetic_hand(1.6, 1.2)],
        ]),
        recorder.clone(),
    );
    pipeline.process_frame(&Frame::blank(8, 8, 1)?);
    pipeline.process_frame(&Frame::blank(8, 8, 2)?);

    let sent = recorder.sent.lock().unwrap();
    assert_eq!(sent.len(), 8);
    assert!(sent.iter().all(|(_, v)| (0.0..=1.0).contains(v)));
    // Below the low calibration point maps to 0, above the high point to 1.
    assert_eq!(sent[0], ("/hand/distance1".to_string(), 0.0));
    assert_eq!(sent[4], ("/hand/distance1".to_string(), 1.0));
    Ok(())
}

#[test]
fn observer_sees_every_frame() -> Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let observer: FrameObserver = Arc::new(move |frame, outcome| {
        sink.lock()
            .unwrap()
            .push((frame.sequence, outcome.annotation.is_some()));
    });
    let pipeline = CapturePipeline::new(
        settings(ExtractionStrategy::FixedPair),
        replay(vec![vec![synthetic_hand(0.8, 0.0)], vec![]]),
        Arc::new(Recorder::default()),
    )
    .with_observer(observer);

    let camera = V4l2Provider::new(V4l2Config {
        device: String::new(),
        target_fps: 0,
        width: 16,
        height: 12,
    });
    let mut stream = camera.open("stub://eof:4")?;
    let stop = AtomicBool::new(false);
    let first = pipeline.warm_up(stream.as_mut(), &stop)?;
    let mut frames = 0;
    let exit = pipeline.run(stream.as_mut(), first, &stop, |_| frames += 1);

    assert!(matches!(exit, LoopExit::SourceEnded(_)));
    assert_eq!(frames, 4);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(1, true), (2, false), (3, true), (4, false)]
    );
    Ok(())
}

#[test]
fn stop_flag_ends_run_before_next_frame() -> Result<()> {
    let pipeline = CapturePipeline::new(
        settings(ExtractionStrategy::FixedPair),
        replay(vec![vec![synthetic_hand(0.8, 0.0)]]),
        Arc::new(Recorder::default()),
    );
    let camera = V4l2Provider::new(V4l2Config {
        device: String::new(),
        target_fps: 0,
        width: 4,
        height: 4,
    });
    let mut stream = camera.open("stub://hands")?;
    let stop = AtomicBool::new(true);
    let first = Frame::blank(4, 4, 1)?;
    let mut frames = 0;
    let exit = pipeline.run(stream.as_mut(), first, &stop, |_| frames += 1);
    assert_eq!(exit, LoopExit::Stopped);
    assert_eq!(frames, 0);
    Ok(())
}

#[test]
fn max_pair_frame_reaches_an_osc_listener() -> Result<()> {
    let listener = UdpSocket::bind("127.0.0.1:0")?;
    listener.set_read_timeout(Some(Duration::from_secs(2)))?;
    let sender = OscSender::new(&listener.local_addr()?.to_string())?;

    let pipeline = CapturePipeline::new(
        settings(ExtractionStrategy::MaxPair),
        replay(vec![vec![synthetic_hand(1.0, 0.0)]]),
        Arc::new(sender),
    );
    assert!(pipeline.process_frame(&Frame::blank(8, 8, 1)?).emitted());

    let mut received = Vec::new();
    let mut buf = [0u8; 256];
    for _ in 0..2 {
        let (len, _) = listener.recv_from(&mut buf)?;
        let (_, packet) = rosc::decoder::decode_udp(&buf[..len])?;
        let OscPacket::Message(msg) = packet else {
            panic!("expected a single message");
        };
        match msg.args.as_slice() {
            [OscType::Float(value)] => assert!((0.0..=1.0).contains(value)),
            other => panic!("unexpected arguments {:?}", other),
        }
        received.push(msg.addr);
    }
    assert_eq!(received, vec!["/hand/distance", "/hand/rotation"]);
    Ok(())
}
