//! Remote vision backend on the Gemini `generateContent` REST API.
//!
//! The credential is supplied by the caller (environment variable or key
//! file, see `config`) and travels in the `x-goog-api-key` header, never in
//! the request URL. The key is zeroized when the config is dropped.

use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::time::{Duration, Instant};
use zeroize::Zeroizing;

use crate::detect::backend::{BackendStats, InferenceBackend, InferenceError};
use crate::detect::parse::parse_detections;
use crate::detection::RawDetection;
use crate::frame::StillImage;

pub use super::{
    GEMINI_DEFAULT_BASE_URL as DEFAULT_BASE_URL, GEMINI_DEFAULT_MODEL as DEFAULT_MODEL,
    GEMINI_DEFAULT_TIMEOUT as DEFAULT_TIMEOUT,
};

const CONNECTION_ACK: &str = "SADE_OK";
const MAX_ERROR_BODY: usize = 512;

const DETECTION_PROMPT: &str = "\
Analyze this image and detect:
1. PEOPLE: position, posture, activity
2. FACES: emotions, expressions, gaze
3. HANDS: gestures, held objects, positions
4. OBJECTS: cigarettes, drinks, phones, weapons, tools
5. BEHAVIOURS: smoking, drinking, talking on the phone, eating
6. POSTURES: sitting, standing, leaning, moving

Reply ONLY with a valid JSON array and no other text:
[
  {
    \"type\": \"face|hand|object|gesture|emotion|pose|person|weapon|smoking|drinking|phone|eating|movement|risk|suspicious\",
    \"label\": \"short description\",
    \"confidence\": 0.85,
    \"coordinates\": {\"x\": 100, \"y\": 150, \"width\": 80, \"height\": 100},
    \"details\": \"detailed description\",
    \"priority\": \"critical|high|medium|low\",
    \"subtype\": \"specific subcategory\"
  }
]

Priorities:
- critical: weapons, danger, suspicious behaviour
- high: smoking, dangerous objects, aggressive gestures
- medium: drinking, phone use, personal objects
- low: ordinary gestures, common postures
Reply with [] when nothing is detected.";

const GESTURE_PROMPT: &str = "\
Look only at the hand gestures in this image. Is the person:
- smoking (cigarette in hand)
- drinking (glass, bottle)
- using a phone
- making a specific gesture (waving, pointing)
- holding a dangerous object
Reply with exactly one word: smoking, drinking, phone, waving, pointing, dangerous, normal or not_detected.";

const EMOTION_PROMPT: &str = "\
Analyze the facial expression of the main person in this image.
Reply with exactly one word: neutral, happy, sad, angry, surprised, focused, worried or suspicious.";

const CONNECTION_PROMPT: &str = "Reply with exactly SADE_OK.";

#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: Zeroizing<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Zeroizing::new(api_key.into()),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Hand gesture reported by [`GeminiBackend::classify_gesture`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GestureLabel {
    Smoking,
    Drinking,
    Phone,
    Waving,
    Pointing,
    Dangerous,
    Normal,
    NotDetected,
}

impl GestureLabel {
    /// Anything outside the label set is `NotDetected`.
    pub fn from_reply(reply: &str) -> Self {
        match normalize_label(reply).as_str() {
            "smoking" => Self::Smoking,
            "drinking" => Self::Drinking,
            "phone" => Self::Phone,
            "waving" => Self::Waving,
            "pointing" => Self::Pointing,
            "dangerous" => Self::Dangerous,
            "normal" => Self::Normal,
            _ => Self::NotDetected,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Smoking => "smoking",
            Self::Drinking => "drinking",
            Self::Phone => "phone",
            Self::Waving => "waving",
            Self::Pointing => "pointing",
            Self::Dangerous => "dangerous",
            Self::Normal => "normal",
            Self::NotDetected => "not_detected",
        }
    }
}

/// Facial expression reported by [`GeminiBackend::classify_emotion`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmotionLabel {
    Neutral,
    Happy,
    Sad,
    Angry,
    Surprised,
    Focused,
    Worried,
    Suspicious,
}

impl EmotionLabel {
    /// Anything outside the label set is `Neutral`.
    pub fn from_reply(reply: &str) -> Self {
        match normalize_label(reply).as_str() {
            "happy" => Self::Happy,
            "sad" => Self::Sad,
            "angry" => Self::Angry,
            "surprised" => Self::Surprised,
            "focused" => Self::Focused,
            "worried" => Self::Worried,
            "suspicious" => Self::Suspicious,
            _ => Self::Neutral,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Angry => "angry",
            Self::Surprised => "surprised",
            Self::Focused => "focused",
            Self::Worried => "worried",
            Self::Suspicious => "suspicious",
        }
    }
}

fn normalize_label(reply: &str) -> String {
    reply
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '`')
        .trim()
        .to_lowercase()
        .replace([' ', '-'], "_")
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: CandidateContent,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    fn text(&self) -> String {
        self.candidates
            .iter()
            .flat_map(|c| c.content.parts.iter())
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

pub struct GeminiBackend {
    config: GeminiConfig,
    agent: ureq::Agent,
    stats: BackendStats,
}

impl GeminiBackend {
    pub fn new(config: GeminiConfig) -> Result<Self, InferenceError> {
        if config.api_key.trim().is_empty() {
            return Err(InferenceError::Unavailable(
                "gemini backend requires an API key".to_string(),
            ));
        }
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Ok(Self {
            config,
            agent,
            stats: BackendStats::default(),
        })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    /// Single-label hand gesture query.
    pub fn classify_gesture(&mut self, still: &StillImage) -> Result<GestureLabel, InferenceError> {
        let reply = self.tracked(|backend| backend.generate(GESTURE_PROMPT, Some(still)), |_| 0)?;
        Ok(GestureLabel::from_reply(&reply))
    }

    /// Single-label facial expression query.
    pub fn classify_emotion(&mut self, still: &StillImage) -> Result<EmotionLabel, InferenceError> {
        let reply = self.tracked(|backend| backend.generate(EMOTION_PROMPT, Some(still)), |_| 0)?;
        Ok(EmotionLabel::from_reply(&reply))
    }

    fn tracked<T>(
        &mut self,
        call: impl FnOnce(&Self) -> Result<T, InferenceError>,
        count: impl FnOnce(&T) -> usize,
    ) -> Result<T, InferenceError> {
        let started = Instant::now();
        let result = call(&*self);
        let latency = started.elapsed().as_millis() as u64;
        match &result {
            Ok(value) => self.stats.record_success(count(value), latency),
            Err(err) => self.stats.record_failure(err, latency),
        }
        result
    }

    fn generate(&self, prompt: &str, still: Option<&StillImage>) -> Result<String, InferenceError> {
        let mut parts = vec![json!({ "text": prompt })];
        if let Some(still) = still {
            parts.push(json!({
                "inline_data": {
                    "mime_type": "image/jpeg",
                    "data": still.base64(),
                }
            }));
        }
        let body = json!({ "contents": [{ "parts": parts }] }).to_string();

        let response = self
            .agent
            .post(&self.config.endpoint())
            .set("Content-Type", "application/json")
            .set("x-goog-api-key", self.config.api_key.as_str())
            .send_string(&body);

        let response = match response {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                return Err(classify_status(status, &body));
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(InferenceError::Transport(transport.to_string()));
            }
        };

        let text = response
            .into_string()
            .map_err(|e| InferenceError::Transport(format!("read reply: {}", e)))?;
        let reply: GenerateResponse = serde_json::from_str(&text).map_err(|e| {
            InferenceError::MalformedResponse(format!("unexpected reply envelope: {}", e))
        })?;
        Ok(reply.text())
    }
}

fn classify_status(status: u16, body: &str) -> InferenceError {
    let message: String = body.chars().take(MAX_ERROR_BODY).collect();
    match status {
        429 if message.to_ascii_lowercase().contains("quota") => InferenceError::QuotaExceeded,
        429 => InferenceError::RateLimited,
        401 | 403 => InferenceError::PermissionDenied(message),
        _ => InferenceError::Http { status, message },
    }
}

impl InferenceBackend for GeminiBackend {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn analyze(&mut self, still: &StillImage) -> Result<Vec<RawDetection>, InferenceError> {
        self.tracked(
            |backend| {
                let reply = backend.generate(DETECTION_PROMPT, Some(still))?;
                parse_detections(&reply)
            },
            Vec::len,
        )
    }

    fn test_connection(&mut self) -> Result<bool, InferenceError> {
        let reply = self.tracked(|backend| backend.generate(CONNECTION_PROMPT, None), |_| 0)?;
        let ok = reply.contains(CONNECTION_ACK);
        if !ok {
            log::warn!("gemini connection test: unexpected reply ({} chars)", reply.len());
        }
        Ok(ok)
    }

    fn stats(&self) -> BackendStats {
        self.stats.clone()
    }
}
