//! signlens-types: data model shared by the capture, workflow and provider crates.

mod errors;

pub use errors::{AnalysisError, CaptureError, LocationError, TransitionError, VideoGenError};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

// ──────────────────── Stage Types ────────────────────

/// Top-level mode of a scan session. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisStage {
    Idle,
    Capturing,
    Processing,
    Complete,
    Error,
}

impl AnalysisStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStage::Idle => "IDLE",
            AnalysisStage::Capturing => "CAPTURING",
            AnalysisStage::Processing => "PROCESSING",
            AnalysisStage::Complete => "COMPLETE",
            AnalysisStage::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────── Image Types ────────────────────

/// Encoding of a captured still frame. Only JPEG is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageEncoding {
    Jpeg,
}

impl ImageEncoding {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageEncoding::Jpeg => "image/jpeg",
        }
    }
}

/// An encoded still frame taken from the live camera stream.
///
/// The buffer is immutable; cloning shares it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    bytes: Bytes,
    encoding: ImageEncoding,
    /// Width of the source frame in pixels.
    pub width: u32,
    /// Height of the source frame in pixels.
    pub height: u32,
}

impl CapturedImage {
    pub fn new(bytes: impl Into<Bytes>, encoding: ImageEncoding, width: u32, height: u32) -> Self {
        Self {
            bytes: bytes.into(),
            encoding,
            width,
            height,
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn encoding(&self) -> ImageEncoding {
        self.encoding
    }

    pub fn mime_type(&self) -> &'static str {
        self.encoding.mime_type()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// ──────────────────── Business Types ────────────────────

/// A product or service read off the signboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Structured business information produced by one successful analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessRecord {
    pub business_name: String,
    /// Romanized form of the main native-script text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transliteration: Option<String>,
    pub category: String,
    /// Model confidence, 0 to 100.
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub products: Vec<Product>,
    /// City or area inferred from the image text.
    #[serde(default)]
    pub address_context: String,
    /// One-sentence summary of the spot.
    pub summary: String,
    pub detected_language: String,
}

impl BusinessRecord {
    /// Clamp confidence into 0..=100 and drop blank optional text.
    pub fn normalized(mut self) -> Self {
        self.confidence = if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 100.0)
        } else {
            0.0
        };
        if self
            .transliteration
            .as_deref()
            .is_some_and(|t| t.trim().is_empty())
        {
            self.transliteration = None;
        }
        self.address_context = self.address_context.trim().to_string();
        self
    }
}

// ──────────────────── Location Types ────────────────────

/// Result of the one-shot geolocation query.
#[derive(Debug, Clone, PartialEq)]
pub enum GeoContext {
    Position { latitude: f64, longitude: f64 },
    Failed(LocationError),
}

impl GeoContext {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match self {
            GeoContext::Position {
                latitude,
                longitude,
            } => Some((*latitude, *longitude)),
            GeoContext::Failed(_) => None,
        }
    }
}

/// Human-readable place label derived from a [`GeoContext`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "name", rename_all = "snake_case")]
pub enum Locality {
    /// Lookup still running.
    Pending,
    /// Place name, e.g. "Mumbai, Maharashtra".
    Resolved(String),
    /// Geolocation was denied or unavailable.
    Unavailable,
    /// Coordinates were known but could not be turned into a name.
    Unknown,
}

impl Locality {
    pub const PENDING_LABEL: &'static str = "Locating...";
    pub const UNAVAILABLE_LABEL: &'static str = "Location Unavailable";
    pub const UNKNOWN_LABEL: &'static str = "Unknown Location";

    /// Label shown in the header.
    pub fn label(&self) -> &str {
        match self {
            Locality::Pending => Self::PENDING_LABEL,
            Locality::Resolved(name) => name,
            Locality::Unavailable => Self::UNAVAILABLE_LABEL,
            Locality::Unknown => Self::UNKNOWN_LABEL,
        }
    }

    /// Hint passed to the vision model; anything but a resolved name falls back to `default_region`.
    pub fn hint<'a>(&'a self, default_region: &'a str) -> &'a str {
        match self {
            Locality::Resolved(name) => name,
            _ => default_region,
        }
    }
}

// ──────────────────── Agent Task Types ────────────────────

/// Status of one simulated sub-task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Pending,
    Working,
    Done,
}

/// One row of the processing animation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: String,
    pub name: String,
    pub status: AgentStatus,
    /// 0 to 100.
    pub progress: f64,
    pub message: String,
}

// ──────────────────── Video Types ────────────────────

/// Input for promotional video generation.
#[derive(Debug, Clone)]
pub struct VideoRequest {
    pub business_name: String,
    pub category: String,
    pub locality: String,
    pub summary: String,
    pub detected_language: String,
    /// Optional reference frame for image-to-video.
    pub reference_image: Option<CapturedImage>,
}

/// Locator of a generated, playable video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoHandle {
    pub uri: String,
}
