//! Per-frame gesture math.
//!
//! `extract` turns each detected hand into metrics, `select` picks the
//! dominant hand, and `normalize` maps its spreads onto the control range.
//! Everything here is a pure function of the current frame's landmarks; no
//! history is consulted.

mod extract;
mod normalize;
mod select;

pub use extract::{
    extract, furthest_pair, orientation, ExtractionStrategy, HandMetrics, PairMetrics,
};
pub use normalize::{Calibration, DEFAULT_CALIBRATION_HIGH, DEFAULT_CALIBRATION_LOW};
pub use select::{select_dominant, DominantHand};

use crate::landmark::HandObservation;

/// One emitted (distance, rotation) pair. Both values are in `0..=1`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SignalPair {
    pub distance: f32,
    pub rotation: f32,
}

/// Control values for one frame: one pair per metric pair of the dominant
/// hand, in extraction order.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlSignal {
    pub pairs: Vec<SignalPair>,
}

/// Result of processing one frame's hands.
#[derive(Clone, Debug, PartialEq)]
pub struct GestureFrame {
    pub signal: ControlSignal,
    pub dominant: DominantHand,
}

/// Extraction strategy plus calibration, applied frame by frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GestureProcessor {
    pub strategy: ExtractionStrategy,
    pub calibration: Calibration,
}

impl GestureProcessor {
    pub fn new(strategy: ExtractionStrategy, calibration: Calibration) -> Self {
        Self {
            strategy,
            calibration,
        }
    }

    /// Returns `None` when no hand yields metrics; nothing is emitted then.
    pub fn process(&self, hands: &[HandObservation]) -> Option<GestureFrame> {
        let dominant = select_dominant(hands.iter().map(|hand| extract(hand, self.strategy)))?;
        let pairs = dominant
            .metrics
            .pairs()
            .iter()
            .map(|pair| SignalPair {
                distance: self.calibration.normalize(pair.spread),
                rotation: pair.orientation,
            })
            .collect();
        Some(GestureFrame {
            signal: ControlSignal { pairs },
            dominant,
        })
    }
}
