use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::time::Instant;

use crate::detect::backend::{BackendStats, InferenceBackend, InferenceError};
use crate::detection::{BoundingBox, DetectionKind, Priority, RawDetection};
use crate::frame::StillImage;

/// Coordinates below are laid out for a 640x480 still and scaled to the real one.
const LAYOUT_WIDTH: f32 = 640.0;
const LAYOUT_HEIGHT: f32 = 480.0;

const FACE_EVERY: u64 = 30;
const HAND_EVERY: u64 = 20;
const OBJECT_EVERY: u64 = 40;
const POSE_EVERY: u64 = 50;
const EMOTION_EVERY: u64 = 60;

const GESTURES: &[&str] = &["smoking", "drinking", "phone", "waving", "pointing"];
const OBJECTS: &[(&str, Priority)] = &[
    ("cigarette", Priority::Critical),
    ("coffee_cup", Priority::Medium),
    ("phone", Priority::High),
    ("bottle", Priority::Medium),
];
const POSES: &[&str] = &["sitting", "standing", "leaning", "turning"];
const EMOTIONS: &[&str] = &["neutral", "smiling", "focused", "suspicious", "alert"];

/// Local stand-in for a vision model.
///
/// Emits detections on a fixed schedule keyed off the call counter (a face
/// every 30th call, a hand gesture every 20th, an object every 40th, a pose
/// every 50th, an emotion every 60th). Labels and jitter come from a seeded
/// RNG, so a fixed seed replays the same feed.
pub struct SimulatedBackend {
    calls: u64,
    rng: StdRng,
    stats: BackendStats,
}

impl SimulatedBackend {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            calls: 0,
            rng,
            stats: BackendStats::default(),
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }

    fn jitter(&mut self, base: f32, spread: f32) -> f32 {
        base + self.rng.gen::<f32>() * spread
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items.choose(&mut self.rng).copied().unwrap_or("unknown")
    }

    fn generate(&mut self, scale_x: f32, scale_y: f32) -> Vec<RawDetection> {
        let frame = self.calls;
        let mut out = Vec::new();
        let region = |x: f32, y: f32, w: f32, h: f32| {
            BoundingBox::new(x * scale_x, y * scale_y, w * scale_x, h * scale_y)
        };

        if frame.is_multiple_of(FACE_EVERY) {
            let confidence = self.jitter(0.95, 0.05);
            let coords = region(
                self.jitter(200.0, 100.0),
                self.jitter(150.0, 50.0),
                self.jitter(180.0, 40.0),
                self.jitter(200.0, 30.0),
            );
            out.push(
                RawDetection::new(DetectionKind::Face, "Face detected", confidence as f64)
                    .with_coordinates(coords)
                    .with_priority(Priority::High)
                    .with_details("Full facial analysis")
                    .with_subtype("primary_face"),
            );
        }

        if frame.is_multiple_of(HAND_EVERY) {
            let gesture = self.pick(GESTURES);
            let confidence = self.jitter(0.85, 0.15);
            let coords = region(
                self.jitter(300.0, 200.0),
                self.jitter(250.0, 100.0),
                self.jitter(80.0, 30.0),
                self.jitter(90.0, 20.0),
            );
            let priority = if gesture == "smoking" {
                Priority::Critical
            } else {
                Priority::Medium
            };
            out.push(
                RawDetection::new(
                    DetectionKind::Hand,
                    format!("Gesture: {}", gesture),
                    confidence as f64,
                )
                .with_coordinates(coords)
                .with_priority(priority)
                .with_details(format!("Hand gesture detected: {}", gesture))
                .with_subtype(gesture),
            );
        }

        if frame.is_multiple_of(OBJECT_EVERY) {
            let (name, priority) = OBJECTS
                .choose(&mut self.rng)
                .copied()
                .unwrap_or(("object", Priority::Low));
            let confidence = self.jitter(0.80, 0.20);
            let coords = region(
                self.jitter(100.0, 300.0),
                self.jitter(200.0, 150.0),
                self.jitter(60.0, 40.0),
                self.jitter(80.0, 30.0),
            );
            out.push(
                RawDetection::new(
                    DetectionKind::Object,
                    format!("Object: {}", name),
                    confidence as f64,
                )
                .with_coordinates(coords)
                .with_priority(priority)
                .with_details(format!("Object detected: {}", name))
                .with_subtype(name),
            );
        }

        if frame.is_multiple_of(POSE_EVERY) {
            let pose = self.pick(POSES);
            let confidence = self.jitter(0.75, 0.25);
            out.push(
                RawDetection::new(DetectionKind::Pose, format!("Pose: {}", pose), confidence as f64)
                    .with_coordinates(region(150.0, 100.0, 200.0, 350.0))
                    .with_priority(Priority::Low)
                    .with_details(format!("Posture analysis: {}", pose))
                    .with_subtype(pose),
            );
        }

        if frame.is_multiple_of(EMOTION_EVERY) {
            let emotion = self.pick(EMOTIONS);
            let confidence = self.jitter(0.70, 0.30);
            let priority = if emotion == "suspicious" {
                Priority::High
            } else {
                Priority::Low
            };
            out.push(
                RawDetection::new(
                    DetectionKind::Emotion,
                    format!("Emotion: {}", emotion),
                    confidence as f64,
                )
                .with_coordinates(region(220.0, 160.0, 140.0, 180.0))
                .with_priority(priority)
                .with_details(format!("Emotional analysis: {}", emotion))
                .with_subtype(emotion),
            );
        }

        out
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new(None)
    }
}

impl InferenceBackend for SimulatedBackend {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn analyze(&mut self, still: &StillImage) -> Result<Vec<RawDetection>, InferenceError> {
        let started = Instant::now();
        self.calls += 1;
        let scale_x = still.width() as f32 / LAYOUT_WIDTH;
        let scale_y = still.height() as f32 / LAYOUT_HEIGHT;
        let detections = self.generate(scale_x, scale_y);
        self.stats
            .record_success(detections.len(), started.elapsed().as_millis() as u64);
        Ok(detections)
    }

    fn stats(&self) -> BackendStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn still() -> StillImage {
        StillImage::encode(&RgbImage::new(640, 480), 80, 0).unwrap()
    }

    fn kinds_at(call: u64) -> Vec<DetectionKind> {
        let mut backend = SimulatedBackend::new(Some(11));
        let still = still();
        let mut last = Vec::new();
        for _ in 0..call {
            last = backend.analyze(&still).unwrap();
        }
        last.into_iter().map(|d| d.kind).collect()
    }

    #[test]
    fn schedule_follows_call_counter() {
        assert!(kinds_at(1).is_empty());
        assert_eq!(kinds_at(20), vec![DetectionKind::Hand]);
        assert_eq!(kinds_at(30), vec![DetectionKind::Face]);
        assert_eq!(kinds_at(40), vec![DetectionKind::Hand, DetectionKind::Object]);
        assert_eq!(kinds_at(50), vec![DetectionKind::Pose]);
        assert_eq!(
            kinds_at(60),
            vec![
                DetectionKind::Face,
                DetectionKind::Hand,
                DetectionKind::Emotion
            ]
        );
    }

    #[test]
    fn same_seed_replays_same_feed() {
        let still = still();
        let mut a = SimulatedBackend::new(Some(5));
        let mut b = SimulatedBackend::new(Some(5));
        for _ in 0..120 {
            assert_eq!(a.analyze(&still).unwrap(), b.analyze(&still).unwrap());
        }
        assert_eq!(a.calls(), 120);
        assert_eq!(a.stats().requests, 120);
    }

    #[test]
    fn smoking_gesture_is_critical() {
        let still = still();
        let mut backend = SimulatedBackend::new(Some(3));
        for _ in 0..2000 {
            for det in backend.analyze(&still).unwrap() {
                if det.kind == DetectionKind::Hand {
                    let expected = if det.subtype.as_deref() == Some("smoking") {
                        Priority::Critical
                    } else {
                        Priority::Medium
                    };
                    assert_eq!(det.priority, Some(expected));
                }
            }
        }
    }

    #[test]
    fn coordinates_scale_with_still_size() {
        let small = StillImage::encode(&RgbImage::new(320, 240), 80, 0).unwrap();
        let mut backend = SimulatedBackend::new(Some(1));
        let mut pose = None;
        for _ in 0..50 {
            pose = backend
                .analyze(&small)
                .unwrap()
                .into_iter()
                .find(|d| d.kind == DetectionKind::Pose);
        }
        let pose = pose.expect("pose on 50th call");
        assert_eq!(pose.coordinates, BoundingBox::new(75.0, 50.0, 100.0, 175.0));
    }
}
