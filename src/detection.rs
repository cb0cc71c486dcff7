//! Detection records.
//!
//! A `Detection` is one classified, localized, time-stamped observation
//! produced by a single inference call. Backends hand back `RawDetection`s
//! (the loosely-typed wire shape); the feed controller turns them into
//! `Detection`s by stamping the capture time, clamping confidence and
//! attaching a per-kind feature vector. Records are never mutated after that.
//!
//! The detection vocabulary is a single tagged enum. Per-kind facts (vector
//! length, default priority) live in one metadata table, `DetectionKind::metadata`.

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// Rank used when a detection carries no priority at all.
pub const NEUTRAL_PRIORITY_RANK: u8 = 4;

/// Vector length for kinds outside the lookup table.
const DEFAULT_VECTOR_LEN: usize = 64;

// -------------------- Kinds --------------------

/// Detection vocabulary.
///
/// Superset of the object/gesture/emotion vocabulary and the
/// gesture/weapon/movement/risk vocabulary. Unrecognised tags are kept as
/// `Other` rather than rejected.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DetectionKind {
    Person,
    Face,
    Hand,
    Object,
    Gesture,
    Action,
    Emotion,
    Pose,
    Weapon,
    Movement,
    Risk,
    Smoking,
    Drinking,
    Eating,
    Phone,
    Suspicious,
    Other(String),
}

/// Static facts about a detection kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KindMetadata {
    pub vector_len: usize,
    pub default_priority: Option<Priority>,
}

impl DetectionKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "person" => Self::Person,
            "face" => Self::Face,
            "hand" => Self::Hand,
            "object" => Self::Object,
            "gesture" => Self::Gesture,
            "action" => Self::Action,
            "emotion" => Self::Emotion,
            "pose" => Self::Pose,
            "weapon" => Self::Weapon,
            "movement" => Self::Movement,
            "risk" => Self::Risk,
            "smoking" => Self::Smoking,
            "drinking" => Self::Drinking,
            "eating" => Self::Eating,
            "phone" => Self::Phone,
            "suspicious" => Self::Suspicious,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Self::Person => "person",
            Self::Face => "face",
            Self::Hand => "hand",
            Self::Object => "object",
            Self::Gesture => "gesture",
            Self::Action => "action",
            Self::Emotion => "emotion",
            Self::Pose => "pose",
            Self::Weapon => "weapon",
            Self::Movement => "movement",
            Self::Risk => "risk",
            Self::Smoking => "smoking",
            Self::Drinking => "drinking",
            Self::Eating => "eating",
            Self::Phone => "phone",
            Self::Suspicious => "suspicious",
            Self::Other(tag) => tag,
        }
    }

    /// Per-kind metadata table.
    pub fn metadata(&self) -> KindMetadata {
        let (vector_len, default_priority) = match self {
            Self::Person => (256, Some(Priority::Low)),
            Self::Face => (128, Some(Priority::High)),
            Self::Object => (96, Some(Priority::Medium)),
            Self::Hand => (64, Some(Priority::Medium)),
            Self::Emotion => (48, Some(Priority::Low)),
            Self::Action => (48, Some(Priority::Medium)),
            Self::Gesture => (32, Some(Priority::Medium)),
            Self::Pose => (24, Some(Priority::Low)),
            Self::Weapon | Self::Risk | Self::Suspicious => {
                (DEFAULT_VECTOR_LEN, Some(Priority::Critical))
            }
            Self::Smoking => (DEFAULT_VECTOR_LEN, Some(Priority::High)),
            Self::Drinking | Self::Eating | Self::Phone => {
                (DEFAULT_VECTOR_LEN, Some(Priority::Medium))
            }
            Self::Movement => (DEFAULT_VECTOR_LEN, Some(Priority::Low)),
            Self::Other(_) => (DEFAULT_VECTOR_LEN, None),
        };
        KindMetadata {
            vector_len,
            default_priority,
        }
    }

    pub fn vector_len(&self) -> usize {
        self.metadata().vector_len
    }

    pub fn default_priority(&self) -> Option<Priority> {
        self.metadata().default_priority
    }
}

impl Default for DetectionKind {
    fn default() -> Self {
        Self::Other("unknown".to_string())
    }
}

impl fmt::Display for DetectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl Serialize for DetectionKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

impl<'de> Deserialize<'de> for DetectionKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::from_tag(&tag))
    }
}

// -------------------- Priority --------------------

/// Ordinal severity. Declaration order is display order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "critical" => Some(Self::Critical),
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn rank(self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

// -------------------- Geometry / confidence --------------------

/// Axis-aligned box in the analyzed image's pixel space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub width: f32,
    #[serde(default)]
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Non-finite components become 0; width and height are at least 0.
    pub fn sanitized(self) -> Self {
        let finite = |v: f32| if v.is_finite() { v } else { 0.0 };
        Self {
            x: finite(self.x),
            y: finite(self.y),
            width: finite(self.width).max(0.0),
            height: finite(self.height).max(0.0),
        }
    }
}

/// Inclusive confidence clamp range.
///
/// Keeps displayed certainty away from 0% and 100%.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConfidenceRange {
    min: f32,
    max: f32,
}

impl ConfidenceRange {
    /// Range used with the local simulation backend.
    pub const SIMULATED: Self = Self {
        min: 0.6,
        max: 0.98,
    };
    /// Range used with remote vision APIs.
    pub const REMOTE: Self = Self {
        min: 0.7,
        max: 0.99,
    };

    pub fn new(min: f32, max: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&min) || !(0.0..=1.0).contains(&max) {
            return Err(anyhow!(
                "confidence range [{}, {}] must lie within [0, 1]",
                min,
                max
            ));
        }
        if min > max {
            return Err(anyhow!(
                "confidence range min {} exceeds max {}",
                min,
                max
            ));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn clamp(&self, raw: f64) -> f32 {
        if raw.is_nan() {
            return self.min;
        }
        (raw as f32).clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

// -------------------- Wire shape --------------------

/// Detection as returned by an inference backend, before normalisation.
///
/// Deserialisation is lenient: a model reply that gets the shape slightly
/// wrong still yields a record instead of failing the whole batch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    #[serde(rename = "type", default)]
    pub kind: DetectionKind,
    #[serde(default)]
    pub label: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub confidence: f64,
    #[serde(default)]
    pub coordinates: BoundingBox,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default, deserialize_with = "lenient_priority")]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub subtype: Option<String>,
}

impl RawDetection {
    pub fn new(kind: DetectionKind, label: impl Into<String>, confidence: f64) -> Self {
        Self {
            kind,
            label: label.into(),
            confidence,
            ..Self::default()
        }
    }

    pub fn with_coordinates(mut self, coordinates: BoundingBox) -> Self {
        self.coordinates = coordinates;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }
}

fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

fn lenient_priority<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Priority>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.as_deref().and_then(Priority::parse))
}

// -------------------- Feature vectors --------------------

/// Illustrative feature vectors for display. Values carry no meaning.
pub struct FeatureVectors {
    rng: StdRng,
}

impl FeatureVectors {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    pub fn generate(&mut self, len: usize) -> Vec<f32> {
        (0..len).map(|_| self.rng.gen_range(-1.0..=1.0)).collect()
    }
}

// -------------------- Detection --------------------

/// One normalised detection record, as exposed to the presentation layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "type")]
    pub kind: DetectionKind,
    pub label: String,
    pub confidence: f32,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
    pub coordinates: BoundingBox,
    pub vector: Vec<f32>,
    pub priority: Option<Priority>,
    pub details: Option<String>,
    pub subtype: Option<String>,
}

impl Detection {
    /// Normalise a backend result.
    ///
    /// An explicit priority from the backend wins over the kind default.
    pub fn from_raw(
        raw: RawDetection,
        timestamp_ms: u64,
        range: &ConfidenceRange,
        vectors: &mut FeatureVectors,
    ) -> Self {
        let vector = vectors.generate(raw.kind.vector_len());
        let priority = raw.priority.or_else(|| raw.kind.default_priority());
        Self {
            confidence: range.clamp(raw.confidence),
            coordinates: raw.coordinates.sanitized(),
            priority,
            vector,
            timestamp_ms,
            kind: raw.kind,
            label: raw.label,
            details: raw.details,
            subtype: raw.subtype,
        }
    }

    pub fn priority_rank(&self) -> u8 {
        self.priority
            .map(Priority::rank)
            .unwrap_or(NEUTRAL_PRIORITY_RANK)
    }

    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.timestamp_ms)
    }
}

// -------------------- Display ordering --------------------

/// Priority rank ascending, then newest first.
pub fn compare_for_display(a: &Detection, b: &Detection) -> Ordering {
    a.priority_rank()
        .cmp(&b.priority_rank())
        .then_with(|| b.timestamp_ms.cmp(&a.timestamp_ms))
}

pub fn display_order<'a, I>(detections: I) -> Vec<&'a Detection>
where
    I: IntoIterator<Item = &'a Detection>,
{
    let mut ordered: Vec<&Detection> = detections.into_iter().collect();
    ordered.sort_by(|a, b| compare_for_display(a, b));
    ordered
}

/// The `k` detections the presentation layer shows at once.
pub fn top_k<'a, I>(detections: I, k: usize) -> Vec<&'a Detection>
where
    I: IntoIterator<Item = &'a Detection>,
{
    let mut ordered = display_order(detections);
    ordered.truncate(k);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(priority: Option<Priority>, timestamp_ms: u64, label: &str) -> Detection {
        Detection {
            kind: DetectionKind::Object,
            label: label.to_string(),
            confidence: 0.8,
            timestamp_ms,
            coordinates: BoundingBox::default(),
            vector: Vec::new(),
            priority,
            details: None,
            subtype: None,
        }
    }

    #[test]
    fn display_order_groups_by_priority_then_recency() {
        let items = vec![
            detection(Some(Priority::Low), 400, "low"),
            detection(Some(Priority::Critical), 100, "critical-old"),
            detection(Some(Priority::Medium), 300, "medium"),
            detection(Some(Priority::Critical), 200, "critical-new"),
        ];

        let labels: Vec<&str> = display_order(&items)
            .into_iter()
            .map(|d| d.label.as_str())
            .collect();
        assert_eq!(labels, vec!["critical-new", "critical-old", "medium", "low"]);
    }

    #[test]
    fn missing_priority_sorts_after_low() {
        let items = vec![
            detection(None, 900, "neutral"),
            detection(Some(Priority::Low), 100, "low"),
        ];
        let ordered = display_order(&items);
        assert_eq!(ordered[0].label, "low");
        assert_eq!(ordered[1].priority_rank(), NEUTRAL_PRIORITY_RANK);
    }

    #[test]
    fn top_k_limits_output() {
        let items: Vec<Detection> = (0..10)
            .map(|i| detection(Some(Priority::Medium), i, "m"))
            .collect();
        let shown = top_k(&items, 8);
        assert_eq!(shown.len(), 8);
        assert_eq!(shown[0].timestamp_ms, 9);
    }

    #[test]
    fn confidence_clamps_out_of_range_values() {
        let range = ConfidenceRange::SIMULATED;
        assert_eq!(range.clamp(-0.5), 0.6);
        assert_eq!(range.clamp(1.4), 0.98);
        assert_eq!(range.clamp(f64::NAN), 0.6);
        assert_eq!(range.clamp(f64::INFINITY), 0.98);
        assert!((range.clamp(0.75) - 0.75).abs() < f32::EPSILON);
    }

    #[test]
    fn confidence_range_rejects_invalid_bounds() {
        assert!(ConfidenceRange::new(0.9, 0.5).is_err());
        assert!(ConfidenceRange::new(-0.1, 0.5).is_err());
        assert!(ConfidenceRange::new(0.2, 1.5).is_err());
        assert!(ConfidenceRange::new(0.7, 0.99).is_ok());
    }

    #[test]
    fn vector_lengths_follow_kind_table() {
        assert_eq!(DetectionKind::Face.vector_len(), 128);
        assert_eq!(DetectionKind::Hand.vector_len(), 64);
        assert_eq!(DetectionKind::Object.vector_len(), 96);
        assert_eq!(DetectionKind::Emotion.vector_len(), 48);
        assert_eq!(DetectionKind::Gesture.vector_len(), 32);
        assert_eq!(DetectionKind::Pose.vector_len(), 24);
        assert_eq!(DetectionKind::Person.vector_len(), 256);
        assert_eq!(DetectionKind::Action.vector_len(), 48);
        assert_eq!(DetectionKind::Weapon.vector_len(), 64);
        assert_eq!(DetectionKind::from_tag("drone").vector_len(), 64);
    }

    #[test]
    fn unknown_tags_are_kept() {
        let kind = DetectionKind::from_tag(" Drone ");
        assert_eq!(kind, DetectionKind::Other("drone".to_string()));
        assert_eq!(kind.default_priority(), None);
        assert_eq!(DetectionKind::from_tag("WEAPON"), DetectionKind::Weapon);
    }

    #[test]
    fn raw_detection_parses_loose_model_output() {
        let json = r#"{
            "type": "hand",
            "label": "holding cup",
            "confidence": "0.91",
            "coordinates": {"x": 10, "y": 20, "width": -5},
            "priority": "urgent"
        }"#;
        let raw: RawDetection = serde_json::from_str(json).unwrap();
        assert_eq!(raw.kind, DetectionKind::Hand);
        assert!((raw.confidence - 0.91).abs() < 1e-9);
        assert_eq!(raw.priority, None);
        assert_eq!(raw.coordinates.height, 0.0);

        let mut vectors = FeatureVectors::new(Some(1));
        let det = Detection::from_raw(raw, 42, &ConfidenceRange::REMOTE, &mut vectors);
        assert_eq!(det.coordinates.width, 0.0);
        assert_eq!(det.priority, Some(Priority::Medium));
        assert_eq!(det.vector.len(), 64);
        assert_eq!(det.timestamp_ms, 42);
    }

    #[test]
    fn explicit_priority_overrides_kind_default() {
        let raw = RawDetection::new(DetectionKind::Pose, "leaning", 0.8)
            .with_priority(Priority::Critical);
        let mut vectors = FeatureVectors::new(Some(7));
        let det = Detection::from_raw(raw, 0, &ConfidenceRange::SIMULATED, &mut vectors);
        assert_eq!(det.priority, Some(Priority::Critical));
        assert!(det.vector.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn detection_serializes_with_type_tag() {
        let det = detection(Some(Priority::High), 5, "phone");
        let value = serde_json::to_value(&det).unwrap();
        assert_eq!(value["type"], "object");
        assert_eq!(value["priority"], "high");
        assert_eq!(value["timestamp"], 5);
    }
}
