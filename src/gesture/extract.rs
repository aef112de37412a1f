//! Landmark feature extraction.
//!
//! Turns one `HandObservation` into spread/orientation metrics. Spread is the
//! planar distance between two landmarks divided by the hand length (wrist to
//! a reference fingertip). Orientation is the folded angle of the same pair:
//! `atan2(|dy|, |dx|)` in degrees over 90, so 0 is horizontal and 1 vertical.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::landmark::{HandLandmark, HandObservation, Point};

/// Which landmark pairs feed the control signal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// Thumb to index and thumb to pinky, normalized by wrist to index tip.
    /// Two metric pairs per hand.
    #[default]
    FixedPair,
    /// The two fingertips furthest apart this frame, normalized by wrist to
    /// middle tip. One metric pair per hand.
    MaxPair,
}

impl ExtractionStrategy {
    /// Fingertip whose distance from the wrist is the hand length.
    pub fn reference_tip(self) -> HandLandmark {
        match self {
            Self::FixedPair => HandLandmark::IndexTip,
            Self::MaxPair => HandLandmark::MiddleTip,
        }
    }

    /// Metric pairs produced per hand.
    pub fn pair_count(self) -> usize {
        match self {
            Self::FixedPair => 2,
            Self::MaxPair => 1,
        }
    }
}

impl FromStr for ExtractionStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fixed_pair" | "fixed-pair" | "fixed" => Ok(Self::FixedPair),
            "max_pair" | "max-pair" | "max" => Ok(Self::MaxPair),
            other => Err(anyhow!(
                "unknown extraction strategy '{}': expected 'fixed_pair' or 'max_pair'",
                other
            )),
        }
    }
}

impl fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FixedPair => write!(f, "fixed_pair"),
            Self::MaxPair => write!(f, "max_pair"),
        }
    }
}

/// Metrics for one landmark pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PairMetrics {
    /// Pair distance over hand length. Non-negative, unbounded above.
    pub spread: f32,
    /// Folded angle in `0..=1`.
    pub orientation: f32,
    /// Endpoints of the pair, kept for annotation.
    pub from: Point,
    pub to: Point,
}

/// Metrics for one hand. The first pair is the primary pair used for
/// dominant-hand selection; there is always at least one.
#[derive(Clone, Debug, PartialEq)]
pub struct HandMetrics {
    pairs: Vec<PairMetrics>,
}

impl HandMetrics {
    /// Returns `None` for an empty pair list.
    pub fn new(pairs: Vec<PairMetrics>) -> Option<Self> {
        (!pairs.is_empty()).then_some(Self { pairs })
    }

    pub fn primary(&self) -> &PairMetrics {
        &self.pairs[0]
    }

    pub fn pairs(&self) -> &[PairMetrics] {
        &self.pairs
    }
}

/// Folded orientation of the segment `a -> b`. Symmetric in its arguments.
pub fn orientation(a: &Point, b: &Point) -> f32 {
    let dx = (b.x - a.x).abs();
    let dy = (b.y - a.y).abs();
    dy.atan2(dx).to_degrees() / 90.0
}

/// Extract metrics for a hand, or `None` when the observation is degenerate
/// (zero hand length or non-finite coordinates).
pub fn extract(hand: &HandObservation, strategy: ExtractionStrategy) -> Option<HandMetrics> {
    let wrist = hand.point(HandLandmark::Wrist);
    let hand_length = wrist.distance_2d(&hand.point(strategy.reference_tip()));
    if !hand_length.is_finite() || hand_length <= 0.0 {
        return None;
    }

    let pairs: Vec<(HandLandmark, HandLandmark)> = match strategy {
        ExtractionStrategy::FixedPair => vec![
            (HandLandmark::ThumbTip, HandLandmark::IndexTip),
            (HandLandmark::ThumbTip, HandLandmark::PinkyTip),
        ],
        ExtractionStrategy::MaxPair => vec![furthest_pair(hand, &HandLandmark::FINGERTIPS)?],
    };

    let mut metrics = Vec::with_capacity(pairs.len());
    for (a, b) in pairs {
        let from = hand.point(a);
        let to = hand.point(b);
        let spread = from.distance_2d(&to) / hand_length;
        let orientation = orientation(&from, &to);
        if !spread.is_finite() || !orientation.is_finite() {
            return None;
        }
        metrics.push(PairMetrics {
            spread,
            orientation,
            from,
            to,
        });
    }
    HandMetrics::new(metrics)
}

/// Unordered pair of `tracked` landmarks with the greatest planar distance.
/// The first maximum in enumeration order wins ties.
pub fn furthest_pair(
    hand: &HandObservation,
    tracked: &[HandLandmark],
) -> Option<(HandLandmark, HandLandmark)> {
    let mut best: Option<(f32, HandLandmark, HandLandmark)> = None;
    for (i, &a) in tracked.iter().enumerate() {
        for &b in &tracked[i + 1..] {
            let distance = hand.point(a).distance_2d(&hand.point(b));
            if !distance.is_finite() {
                continue;
            }
            match best {
                Some((max, _, _)) if distance <= max => {}
                _ => best = Some((distance, a, b)),
            }
        }
    }
    best.map(|(_, a, b)| (a, b))
}
