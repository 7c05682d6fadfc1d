//! Swing extraction from pose landmarks
//!
//! Converts the dominant arm's shoulder and wrist landmarks into an
//! (angle, magnitude) swing vector and low-pass filters it with an
//! exponential moving average. The previous smoothed sample is the only
//! state; when the arm is not detected the previous sample is returned
//! unchanged.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

// MediaPipe Pose landmark indices (33 total)
pub const LEFT_SHOULDER: usize = 11;
pub const RIGHT_SHOULDER: usize = 12;
pub const LEFT_ELBOW: usize = 13;
pub const RIGHT_ELBOW: usize = 14;
pub const LEFT_WRIST: usize = 15;
pub const RIGHT_WRIST: usize = 16;

/// Multiplier from normalized shoulder-to-wrist distance to swing magnitude
pub const MAGNITUDE_SCALE: f32 = 10.0;
/// EMA factor applied to each new measurement
pub const SMOOTHING_ALPHA: f32 = 0.3;

/// A single landmark in normalized image coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32, // 0-1 normalized
    pub y: f32, // 0-1 normalized
    #[serde(default)]
    pub z: f32, // relative depth, unused for swings
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    fn is_detected(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// One detector result: landmarks indexed by the MediaPipe numbering
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseFrame {
    pub landmarks: Vec<Landmark>,
}

impl PoseFrame {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self { landmarks }
    }

    /// Landmark at `index`, or `None` if the detector did not produce it
    pub fn get(&self, index: usize) -> Option<Landmark> {
        self.landmarks
            .get(index)
            .copied()
            .filter(Landmark::is_detected)
    }
}

/// A player's swing for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SwingSample {
    /// Direction of the shoulder-to-wrist vector in degrees
    pub angle: f32,
    /// Swing strength, never negative
    #[serde(alias = "velocity")]
    pub magnitude: f32,
    /// Milliseconds when the sample was produced
    #[serde(default, alias = "ts")]
    pub timestamp: u64,
}

impl SwingSample {
    pub fn new(angle: f32, magnitude: f32, timestamp: u64) -> Self {
        let magnitude = if magnitude.is_finite() { magnitude.max(0.0) } else { 0.0 };
        Self {
            angle,
            magnitude,
            timestamp,
        }
    }

    /// Whether a sample received from a peer can be used for a hit
    pub fn is_usable(&self) -> bool {
        self.angle.is_finite() && self.magnitude.is_finite() && self.magnitude >= 0.0
    }
}

/// Which arm holds the racket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Handedness {
    #[default]
    Right,
    Left,
}

impl Handedness {
    /// (wrist, elbow, shoulder) landmark indices
    fn arm(self) -> (usize, usize, usize) {
        match self {
            Self::Right => (RIGHT_WRIST, RIGHT_ELBOW, RIGHT_SHOULDER),
            Self::Left => (LEFT_WRIST, LEFT_ELBOW, LEFT_SHOULDER),
        }
    }
}

/// How the angle component is smoothed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AngleSmoothing {
    /// EMA on the raw degree value; jumps when a swing crosses ±180°
    #[default]
    Linear,
    /// EMA on the unit direction's cosine and sine, then back to degrees
    Circular,
}

impl FromStr for AngleSmoothing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "circular" => Ok(Self::Circular),
            other => Err(format!("unknown angle smoothing: {other}")),
        }
    }
}

/// Stateful swing filter for the local player
#[derive(Debug, Clone)]
pub struct SwingExtractor {
    handedness: Handedness,
    smoothing: AngleSmoothing,
    alpha: f32,
    previous: SwingSample,
    // Smoothed direction for circular mode
    direction: (f32, f32),
}

impl SwingExtractor {
    pub fn new(handedness: Handedness, smoothing: AngleSmoothing) -> Self {
        Self {
            handedness,
            smoothing,
            alpha: SMOOTHING_ALPHA,
            previous: SwingSample::default(),
            direction: (1.0, 0.0),
        }
    }

    /// Override the EMA factor; values outside (0, 1] are clamped
    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha.clamp(f32::EPSILON, 1.0);
        self
    }

    /// Last smoothed sample
    pub fn previous(&self) -> SwingSample {
        self.previous
    }

    /// Produce the swing sample for the latest pose, if any.
    ///
    /// Pose loss is not an error: without a frame, or with any of the arm
    /// landmarks missing, the previous smoothed sample is returned as is.
    pub fn extract(&mut self, pose: Option<&PoseFrame>, now_ms: u64) -> SwingSample {
        let Some(pose) = pose else {
            return self.previous;
        };
        let (wrist, elbow, shoulder) = self.handedness.arm();
        let (Some(wrist), Some(_elbow), Some(shoulder)) =
            (pose.get(wrist), pose.get(elbow), pose.get(shoulder))
        else {
            return self.previous;
        };

        let dx = wrist.x - shoulder.x;
        let dy = wrist.y - shoulder.y;
        let raw_angle = dy.atan2(dx).to_degrees();
        let raw_magnitude = MAGNITUDE_SCALE * (dx * dx + dy * dy).sqrt();

        let a = self.alpha;
        let angle = match self.smoothing {
            AngleSmoothing::Linear => a * raw_angle + (1.0 - a) * self.previous.angle,
            AngleSmoothing::Circular => {
                let (c, s) = self.direction;
                let rad = raw_angle.to_radians();
                let c = a * rad.cos() + (1.0 - a) * c;
                let s = a * rad.sin() + (1.0 - a) * s;
                self.direction = (c, s);
                s.atan2(c).to_degrees()
            }
        };
        let magnitude = a * raw_magnitude + (1.0 - a) * self.previous.magnitude;

        self.previous = SwingSample::new(angle, magnitude, now_ms);
        self.previous
    }
}

impl Default for SwingExtractor {
    fn default() -> Self {
        Self::new(Handedness::Right, AngleSmoothing::Linear)
    }
}

/// Where the tick loop reads the detector's most recent result
pub trait PoseSource: Send {
    fn latest(&mut self) -> Option<PoseFrame>;
}

/// Latest-frame slot shared between the detector thread and the tick loop
#[derive(Debug, Clone, Default)]
pub struct SharedPose(Arc<Mutex<Option<PoseFrame>>>);

impl SharedPose {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the latest frame; `None` marks the arm as not detected
    pub fn publish(&self, frame: Option<PoseFrame>) {
        *self.0.lock() = frame;
    }
}

impl PoseSource for SharedPose {
    fn latest(&mut self) -> Option<PoseFrame> {
        self.0.lock().clone()
    }
}

/// No camera attached: the local swing stays at its previous value
#[derive(Debug, Default)]
pub struct NoPose;

impl PoseSource for NoPose {
    fn latest(&mut self) -> Option<PoseFrame> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn arm_pose(shoulder: (f32, f32), wrist: (f32, f32)) -> PoseFrame {
        let mut landmarks = vec![Landmark::default(); 33];
        landmarks[RIGHT_SHOULDER] = Landmark::new(shoulder.0, shoulder.1);
        landmarks[RIGHT_ELBOW] = Landmark::new((shoulder.0 + wrist.0) / 2.0, (shoulder.1 + wrist.1) / 2.0);
        landmarks[RIGHT_WRIST] = Landmark::new(wrist.0, wrist.1);
        PoseFrame::new(landmarks)
    }

    #[test]
    fn first_sample_is_alpha_weighted_against_zero() {
        let mut extractor = SwingExtractor::default();
        // wrist straight below shoulder: dy = 0.2 -> 90 degrees, magnitude 2.0
        let sample = extractor.extract(Some(&arm_pose((0.5, 0.4), (0.5, 0.6))), 100);
        assert!((sample.angle - 27.0).abs() < 1e-3, "angle {}", sample.angle);
        assert!((sample.magnitude - 0.6).abs() < 1e-4, "magnitude {}", sample.magnitude);
        assert_eq!(sample.timestamp, 100);
    }

    #[test]
    fn left_handed_extractor_reads_the_left_arm() {
        let mut landmarks = vec![Landmark::new(f32::NAN, f32::NAN); 33];
        landmarks[LEFT_SHOULDER] = Landmark::new(0.5, 0.4);
        landmarks[LEFT_ELBOW] = Landmark::new(0.5, 0.5);
        landmarks[LEFT_WRIST] = Landmark::new(0.5, 0.6);
        let pose = PoseFrame::new(landmarks);

        let mut right = SwingExtractor::default();
        assert_eq!(right.extract(Some(&pose), 100), SwingSample::default());

        let mut left = SwingExtractor::new(Handedness::Left, AngleSmoothing::Linear);
        let sample = left.extract(Some(&pose), 100);
        assert!((sample.angle - 27.0).abs() < 1e-3, "angle {}", sample.angle);
        assert!((sample.magnitude - 0.6).abs() < 1e-4, "magnitude {}", sample.magnitude);
    }

    #[test]
    fn missing_landmark_returns_previous_unchanged() {
        let mut extractor = SwingExtractor::default();
        let first = extractor.extract(Some(&arm_pose((0.5, 0.5), (0.8, 0.5))), 10);

        let mut partial = arm_pose((0.5, 0.5), (0.1, 0.1));
        partial.landmarks.truncate(RIGHT_WRIST); // wrist not detected
        assert_eq!(extractor.extract(Some(&partial), 20), first);

        let mut nan_elbow = arm_pose((0.5, 0.5), (0.1, 0.1));
        nan_elbow.landmarks[RIGHT_ELBOW].x = f32::NAN;
        assert_eq!(extractor.extract(Some(&nan_elbow), 30), first);

        assert_eq!(extractor.extract(None, 40), first);
    }

    #[test]
    fn smoothing_converges_to_steady_input() {
        let mut extractor = SwingExtractor::default();
        let pose = arm_pose((0.5, 0.5), (0.8, 0.5)); // angle 0, magnitude 3.0
        let mut sample = SwingSample::default();
        for t in 0..60 {
            sample = extractor.extract(Some(&pose), t);
        }
        assert!(sample.angle.abs() < 1e-3);
        assert!((sample.magnitude - 3.0).abs() < 1e-3);
    }

    #[test]
    fn smoothed_magnitude_stays_within_input_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..50 {
            let mut extractor = SwingExtractor::default();
            let mut max_input: f32 = 0.0;
            for t in 0..200 {
                let wrist = (rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0));
                let pose = arm_pose((0.5, 0.5), wrist);
                let dx: f32 = wrist.0 - 0.5;
                let dy: f32 = wrist.1 - 0.5;
                max_input = max_input.max(MAGNITUDE_SCALE * (dx * dx + dy * dy).sqrt());

                let sample = extractor.extract(Some(&pose), t);
                assert!(sample.magnitude >= 0.0);
                assert!(sample.magnitude <= max_input + 1e-4);
            }
        }
    }

    #[test]
    fn linear_angle_smoothing_jumps_across_wraparound() {
        let mut extractor = SwingExtractor::default().with_alpha(0.5);
        // settle just below +180, then cross to just above -180
        for t in 0..30 {
            extractor.extract(Some(&arm_pose((0.5, 0.5), (0.2, 0.501))), t);
        }
        let before = extractor.previous().angle;
        let after = extractor.extract(Some(&arm_pose((0.5, 0.5), (0.2, 0.499))), 31).angle;
        assert!(before > 179.0);
        assert!(after < before - 150.0, "linear EMA averages across the seam: {after}");
    }

    #[test]
    fn circular_angle_smoothing_stays_near_seam() {
        let mut extractor = SwingExtractor::new(Handedness::Right, AngleSmoothing::Circular);
        let upper = arm_pose((0.5, 0.5), (0.2, 0.501));
        let lower = arm_pose((0.5, 0.5), (0.2, 0.499));
        for t in 0..30 {
            extractor.extract(Some(&upper), t);
        }
        let sample = extractor.extract(Some(&lower), 31);
        assert!(sample.angle.abs() > 175.0, "angle {}", sample.angle);
    }

    #[test]
    fn negative_or_nan_magnitude_is_clamped() {
        assert_eq!(SwingSample::new(10.0, -3.0, 0).magnitude, 0.0);
        assert_eq!(SwingSample::new(10.0, f32::NAN, 0).magnitude, 0.0);
        let remote = SwingSample {
            angle: f32::INFINITY,
            magnitude: 1.0,
            timestamp: 0,
        };
        assert!(!remote.is_usable());
    }

    #[test]
    fn swing_accepts_legacy_field_names() {
        let sample: SwingSample =
            serde_json::from_str(r#"{"angle": 12.5, "velocity": 2.0, "ts": 99}"#).unwrap();
        assert_eq!(sample, SwingSample::new(12.5, 2.0, 99));
    }

    #[test]
    fn shared_pose_hands_latest_frame_to_reader() {
        let shared = SharedPose::new();
        let mut reader: Box<dyn PoseSource> = Box::new(shared.clone());
        assert!(reader.latest().is_none());

        shared.publish(Some(arm_pose((0.5, 0.5), (0.8, 0.5))));
        assert!(reader.latest().is_some());

        shared.publish(None);
        assert!(reader.latest().is_none());
        assert!(NoPose.latest().is_none());
    }
}
