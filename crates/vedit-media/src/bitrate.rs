//! Target-bitrate math for size-targeted encodes.

use vedit_models::encoding::MIN_VIDEO_BITRATE_KBPS;

use crate::error::{MediaError, MediaResult};

/// Compute the video bitrate (kbit/s) that hits a target output size.
///
/// The usable budget is the target size minus the safety margin (container
/// overhead, rate-control error) and the audio allowance. The result is
/// floored at [`MIN_VIDEO_BITRATE_KBPS`] so pathological targets still
/// produce a playable file.
pub fn video_bitrate_kbps(
    target_size_mb: f64,
    duration_seconds: f64,
    safety_margin: f64,
    audio_kbps: u32,
) -> MediaResult<u32> {
    if target_size_mb <= 0.0 {
        return Err(MediaError::invalid_request("target size must be positive"));
    }
    if duration_seconds <= 0.0 {
        return Err(MediaError::invalid_request(
            "duration must be positive for size-targeted encoding",
        ));
    }
    if !(0.0..1.0).contains(&safety_margin) {
        return Err(MediaError::invalid_request(
            "safety margin must be in [0, 1)",
        ));
    }

    // MB -> kbit: 1 MB = 8 * 1024 kbit
    let total_kbits = target_size_mb * 8.0 * 1024.0 * (1.0 - safety_margin);
    let total_kbps = total_kbits / duration_seconds;
    let video_kbps = total_kbps - audio_kbps as f64;

    Ok((video_kbps.floor() as i64).max(MIN_VIDEO_BITRATE_KBPS as i64) as u32)
}
