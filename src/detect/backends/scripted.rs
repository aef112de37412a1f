use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::detect::backend::HandDetector;
use crate::frame::Frame;
use crate::landmark::{HandLandmark, HandObservation, Point, HAND_LANDMARK_COUNT};

const WRIST: Point = Point::new(0.5, 0.8, 0.0);
/// Wrist to index tip in the synthetic pose.
const SYNTHETIC_HAND_LENGTH: f32 = 0.3;

/// Build a plausible open hand.
///
/// `openness` is the thumb-to-index spread in hand lengths; `tilt` is the
/// angle of the thumb-index segment above horizontal, in radians.
pub fn synthetic_hand(openness: f32, tilt: f32) -> HandObservation {
    let mut hand = HandObservation::new([WRIST; HAND_LANDMARK_COUNT]);

    let index_tip = Point::new(WRIST.x, WRIST.y - SYNTHETIC_HAND_LENGTH, 0.0);
    let reach = openness * SYNTHETIC_HAND_LENGTH;
    let thumb_tip = Point::new(
        index_tip.x - reach * tilt.cos(),
        index_tip.y + reach * tilt.sin(),
        0.0,
    );
    let fingers = [
        (
            [HandLandmark::ThumbCmc, HandLandmark::ThumbMcp, HandLandmark::ThumbIp],
            HandLandmark::ThumbTip,
            thumb_tip,
        ),
        (
            [HandLandmark::IndexMcp, HandLandmark::IndexPip, HandLandmark::IndexDip],
            HandLandmark::IndexTip,
            index_tip,
        ),
        (
            [HandLandmark::MiddleMcp, HandLandmark::MiddlePip, HandLandmark::MiddleDip],
            HandLandmark::MiddleTip,
            Point::new(0.53, 0.47, 0.0),
        ),
        (
            [HandLandmark::RingMcp, HandLandmark::RingPip, HandLandmark::RingDip],
            HandLandmark::RingTip,
            Point::new(0.56, 0.5, 0.0),
        ),
        (
            [HandLandmark::PinkyMcp, HandLandmark::PinkyPip, HandLandmark::PinkyDip],
            HandLandmark::PinkyTip,
            Point::new(0.6, 0.56, 0.0),
        ),
    ];
    for (joints, tip, tip_point) in fingers {
        for (joint, t) in joints.into_iter().zip([0.4_f32, 0.6, 0.8]) {
            hand.set_point(
                joint,
                Point::new(
                    WRIST.x + (tip_point.x - WRIST.x) * t,
                    WRIST.y + (tip_point.y - WRIST.y) * t,
                    0.0,
                ),
            );
        }
        hand.set_point(tip, tip_point);
    }
    hand
}

enum Script {
    Synthetic,
    Replay(Vec<Vec<HandObservation>>),
}

/// Detector that never looks at pixels.
///
/// `synthetic()` produces one hand that slowly opens, closes and tilts as the
/// frame sequence advances; `replay()` returns a fixed list of per-frame
/// results, cycling by frame sequence.
pub struct ScriptedBackend {
    script: Script,
    jitter: Option<(f32, StdRng)>,
}

impl ScriptedBackend {
    pub fn synthetic() -> Self {
        Self {
            script: Script::Synthetic,
            jitter: None,
        }
    }

    pub fn replay(frames: Vec<Vec<HandObservation>>) -> Self {
        Self {
            script: Script::Replay(frames),
            jitter: None,
        }
    }

    /// Add uniform noise of up to `amount` to every x/y coordinate.
    pub fn with_jitter(mut self, amount: f32, seed: u64) -> Self {
        self.jitter = (amount > 0.0).then(|| (amount, StdRng::seed_from_u64(seed)));
        self
    }

    fn scripted_hands(&self, sequence: u64) -> Vec<HandObservation> {
        match &self.script {
            Script::Synthetic => {
                let t = sequence as f32;
                let openness = 0.75 + 0.5 * (t * 0.05).sin();
                let tilt = 0.6 * (1.0 + (t * 0.031).sin());
                vec![synthetic_hand(openness, tilt).with_score(0.9)]
            }
            Script::Replay(frames) if frames.is_empty() => Vec::new(),
            Script::Replay(frames) => {
                let slot = (sequence.saturating_sub(1) % frames.len() as u64) as usize;
                frames[slot].clone()
            }
        }
    }
}

impl HandDetector for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<HandObservation>> {
        let mut hands = self.scripted_hands(frame.sequence);
        if let Some((amount, rng)) = self.jitter.as_mut() {
            for point in hands.iter_mut().flat_map(|hand| hand.points_mut().iter_mut()) {
                point.x += rng.gen_range(-*amount..=*amount);
                point.y += rng.gen_range(-*amount..=*amount);
            }
        }
        Ok(hands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::{extract, ExtractionStrategy};

    #[test]
    fn synthetic_hand_has_requested_spread_and_tilt() {
        let hand = synthetic_hand(0.8, std::f32::consts::FRAC_PI_4);
        let metrics = extract(&hand, ExtractionStrategy::FixedPair).expect("metrics");
        assert!((metrics.primary().spread - 0.8).abs() < 1e-4);
        assert!((metrics.primary().orientation - 0.5).abs() < 1e-4);
    }

    #[test]
    fn synthetic_backend_reports_one_hand_per_frame() -> Result<()> {
        let mut backend = ScriptedBackend::synthetic();
        for sequence in 1..=5 {
            let frame = Frame::blank(2, 2, sequence)?;
            assert_eq!(backend.detect(&frame)?.len(), 1);
        }
        Ok(())
    }

    #[test]
    fn replay_cycles_by_sequence() -> Result<()> {
        let hand = synthetic_hand(0.5, 0.0);
        let mut backend = ScriptedBackend::replay(vec![vec![], vec![hand.clone(), hand]]);
        let counts: Vec<usize> = (1..=4)
            .map(|sequence| {
                let frame = Frame::blank(2, 2, sequence)?;
                Ok(backend.detect(&frame)?.len())
            })
            .collect::<Result<_>>()?;
        assert_eq!(counts, vec![0, 2, 0, 2]);
        Ok(())
    }

    #[test]
    fn jitter_is_reproducible_for_a_seed() -> Result<()> {
        let frame = Frame::blank(2, 2, 3)?;
        let mut a = ScriptedBackend::synthetic().with_jitter(0.01, 7);
        let mut b = ScriptedBackend::synthetic().with_jitter(0.01, 7);
        let clean = ScriptedBackend::synthetic().detect(&frame)?;
        let noisy = a.detect(&frame)?;
        assert_eq!(noisy, b.detect(&frame)?);
        assert_ne!(noisy[0].points(), clean[0].points());
        Ok(())
    }
}
