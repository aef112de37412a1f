//! Hand landmark model.
//!
//! Detectors report each hand as 21 ordered keypoints in normalized image
//! coordinates (MediaPipe hand landmark convention). `x` and `y` are relative
//! to frame width and height; `z` is relative depth and is carried but not
//! used by the gesture math. Detector noise can push coordinates slightly
//! outside `0..=1`; no clamping happens here.

use anyhow::{anyhow, Result};

/// Number of landmarks in one hand observation.
pub const HAND_LANDMARK_COUNT: usize = 21;

/// A keypoint position in normalized image coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Planar (x, y) Euclidean distance. Depth is ignored.
    pub fn distance_2d(&self, other: &Point) -> f32 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Project to pixel coordinates for a frame of the given size.
    pub fn to_pixel(&self, width: u32, height: u32) -> (i32, i32) {
        ((self.x * width as f32) as i32, (self.y * height as f32) as i32)
    }
}

/// Anatomical landmark identity, indexed as the detector orders them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(usize)]
pub enum HandLandmark {
    Wrist = 0,
    ThumbCmc = 1,
    ThumbMcp = 2,
    ThumbIp = 3,
    ThumbTip = 4,
    IndexMcp = 5,
    IndexPip = 6,
    IndexDip = 7,
    IndexTip = 8,
    MiddleMcp = 9,
    MiddlePip = 10,
    MiddleDip = 11,
    MiddleTip = 12,
    RingMcp = 13,
    RingPip = 14,
    RingDip = 15,
    RingTip = 16,
    PinkyMcp = 17,
    PinkyPip = 18,
    PinkyDip = 19,
    PinkyTip = 20,
}

impl HandLandmark {
    /// The five fingertips, thumb first.
    pub const FINGERTIPS: [HandLandmark; 5] = [
        HandLandmark::ThumbTip,
        HandLandmark::IndexTip,
        HandLandmark::MiddleTip,
        HandLandmark::RingTip,
        HandLandmark::PinkyTip,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// All landmarks of one detected hand in one frame.
///
/// Observations are produced fresh per frame and never retained across
/// frames.
#[derive(Clone, Debug, PartialEq)]
pub struct HandObservation {
    points: [Point; HAND_LANDMARK_COUNT],
    /// Detector confidence, when the backend reports one.
    pub score: Option<f32>,
}

impl HandObservation {
    pub fn new(points: [Point; HAND_LANDMARK_COUNT]) -> Self {
        Self {
            points,
            score: None,
        }
    }

    /// Build from a detector-supplied list, rejecting the wrong landmark count.
    pub fn from_points(points: &[Point]) -> Result<Self> {
        let points: [Point; HAND_LANDMARK_COUNT] = points.try_into().map_err(|_| {
            anyhow!(
                "hand observation requires {} landmarks, got {}",
                HAND_LANDMARK_COUNT,
                points.len()
            )
        })?;
        Ok(Self::new(points))
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    pub fn point(&self, landmark: HandLandmark) -> Point {
        self.points[landmark.index()]
    }

    pub fn points(&self) -> &[Point; HAND_LANDMARK_COUNT] {
        &self.points
    }

    pub fn points_mut(&mut self) -> &mut [Point; HAND_LANDMARK_COUNT] {
        &mut self.points
    }

    pub fn set_point(&mut self, landmark: HandLandmark, point: Point) {
        self.points[landmark.index()] = point;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_points_rejects_wrong_count() {
        let points = vec![Point::default(); 20];
        assert!(HandObservation::from_points(&points).is_err());

        let points = vec![Point::default(); HAND_LANDMARK_COUNT];
        assert!(HandObservation::from_points(&points).is_ok());
    }

    #[test]
    fn landmark_indices_follow_detector_order() {
        assert_eq!(HandLandmark::Wrist.index(), 0);
        assert_eq!(HandLandmark::ThumbTip.index(), 4);
        assert_eq!(HandLandmark::IndexTip.index(), 8);
        assert_eq!(HandLandmark::MiddleTip.index(), 12);
        assert_eq!(HandLandmark::PinkyTip.index(), 20);
    }

    #[test]
    fn pixel_projection_truncates() {
        let p = Point::new(0.5, 0.25, 0.0);
        assert_eq!(p.to_pixel(640, 480), (320, 120));
    }
}
