//! Edit and normalization request models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single timeline segment of the source that survives the edit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Segment {
    /// Segment start in seconds
    pub start: f64,
    /// Segment end in seconds, exclusive
    pub end: f64,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// A crop rectangle in source pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Rotation in multiples of 90 degrees, clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Whether this rotation swaps frame width and height.
    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, Rotation::Cw90 | Rotation::Cw270)
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let deg = match self {
            Rotation::None => 0,
            Rotation::Cw90 => 90,
            Rotation::Cw180 => 180,
            Rotation::Cw270 => 270,
        };
        write!(f, "{}°", deg)
    }
}

/// An edit request describing how the source clip is transformed.
///
/// Semantics and path resolution are validated by the HTTP layer before the
/// request reaches the queue.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EditRequest {
    /// Trim start in seconds; `None` means start of clip
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trim_start: Option<f64>,

    /// Trim end in seconds; `None` means end of clip
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trim_end: Option<f64>,

    /// Explicit segment list; when non-empty it replaces the trim window
    /// and segments are concatenated in request order
    #[serde(default)]
    pub segments: Vec<Segment>,

    /// Crop rectangle in source coordinates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop: Option<CropRect>,

    /// Rotation in 90-degree steps
    #[serde(default)]
    pub rotation: Rotation,

    /// Mirror horizontally
    #[serde(default)]
    pub flip_horizontal: bool,

    /// Mirror vertically
    #[serde(default)]
    pub flip_vertical: bool,

    /// Playback speed factor (1.0 = unchanged)
    #[serde(default = "default_speed")]
    pub speed: f64,

    /// Drop the audio track entirely
    #[serde(default)]
    pub mute: bool,

    /// Fixed output width in pixels; height is derived to preserve aspect
    pub output_width: u32,

    /// Output canvas height; when set, the scaled frame is padded into a
    /// canvas of this height instead of using the derived height
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canvas_height: Option<u32>,

    /// Vertical pixel offset of the frame within the output canvas
    #[serde(default)]
    pub vertical_offset: i32,

    /// Target output size in megabytes; enables size-targeted encoding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_size_mb: Option<f64>,
}

fn default_speed() -> f64 {
    1.0
}

impl Default for EditRequest {
    fn default() -> Self {
        Self {
            trim_start: None,
            trim_end: None,
            segments: Vec::new(),
            crop: None,
            rotation: Rotation::None,
            flip_horizontal: false,
            flip_vertical: false,
            speed: 1.0,
            mute: false,
            output_width: 1280,
            canvas_height: None,
            vertical_offset: 0,
            target_size_mb: None,
        }
    }
}

impl EditRequest {
    /// Total source time surviving the edit, before speed scaling.
    ///
    /// `source_duration` is used when no trim window is set.
    pub fn selected_duration(&self, source_duration: f64) -> f64 {
        if !self.segments.is_empty() {
            return self.segments.iter().map(Segment::duration).sum();
        }
        let start = self.trim_start.unwrap_or(0.0).max(0.0);
        let end = self.trim_end.unwrap_or(source_duration).min(source_duration);
        (end - start).max(0.0)
    }

    /// Output duration after speed scaling.
    pub fn output_duration(&self, source_duration: f64) -> f64 {
        let selected = self.selected_duration(source_duration);
        if self.speed > 0.0 {
            selected / self.speed
        } else {
            selected
        }
    }
}

/// Request to normalize a freshly uploaded file into the canonical
/// editable format (H.264/AAC MP4).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NormalizeRequest {
    /// Maximum output width; larger sources are scaled down
    #[serde(default = "default_max_width")]
    pub max_width: u32,

    /// Maximum output height; larger sources are scaled down
    #[serde(default = "default_max_height")]
    pub max_height: u32,
}

fn default_max_width() -> u32 {
    1920
}

fn default_max_height() -> u32 {
    1080
}

impl Default for NormalizeRequest {
    fn default() -> Self {
        Self {
            max_width: default_max_width(),
            max_height: default_max_height(),
        }
    }
}

/// The unit of work accepted by the queue.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobRequest {
    /// Transform an already-normalized clip per an edit request
    Edit(EditRequest),
    /// Transcode a fresh upload into the canonical editable format
    Normalize(NormalizeRequest),
}
