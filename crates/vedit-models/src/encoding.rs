//! Video encoding configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "fast";
/// Preset used in ultra-safe mode (faster presets use smaller lookahead buffers)
pub const ULTRA_SAFE_PRESET: &str = "superfast";
/// Default CRF for quality-based (non size-targeted) encodes
pub const DEFAULT_CRF: u8 = 20;
/// Default audio bitrate allowance in kbit/s
pub const DEFAULT_AUDIO_BITRATE_KBPS: u32 = 128;

/// Fraction of the target size reserved for container overhead and
/// rate-control error in size-targeted encodes.
pub const DEFAULT_SIZE_SAFETY_MARGIN: f64 = 0.07;

/// Lowest video bitrate worth emitting; targets below this are floored.
pub const MIN_VIDEO_BITRATE_KBPS: u32 = 100;

/// Vertical-offset clamp applied in ultra-safe mode, in pixels.
pub const ULTRA_SAFE_OFFSET_CLAMP: i32 = 200;

/// Exit code conventionally produced by a SIGKILLed (OOM-killed) process.
pub const OOM_EXIT_CODE: i32 = 137;

/// Total-memory threshold at or below which a host counts as low-memory.
pub const DEFAULT_LOW_MEMORY_THRESHOLD_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Video encoding configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    /// Video codec (e.g., "libx264")
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Encoding preset (e.g., "fast", "medium")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Constant Rate Factor for quality-based encodes (0-51, lower is better)
    #[serde(default = "default_crf")]
    pub crf: u8,

    /// Audio codec
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Audio bitrate in kbit/s
    #[serde(default = "default_audio_bitrate_kbps")]
    pub audio_bitrate_kbps: u32,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_crf() -> u8 {
    DEFAULT_CRF
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate_kbps() -> u32 {
    DEFAULT_AUDIO_BITRATE_KBPS
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: default_video_codec(),
            preset: default_preset(),
            crf: default_crf(),
            audio_codec: default_audio_codec(),
            audio_bitrate_kbps: default_audio_bitrate_kbps(),
        }
    }
}

impl EncodingConfig {
    /// Audio bitrate formatted for FFmpeg (e.g. "128k").
    pub fn audio_bitrate_arg(&self) -> String {
        format!("{}k", self.audio_bitrate_kbps)
    }
}
