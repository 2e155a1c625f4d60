//! FFmpeg filter-graph and output-geometry construction for edit requests.

use vedit_models::encoding::ULTRA_SAFE_OFFSET_CLAMP;
use vedit_models::{EditRequest, EncodeMode, Rotation};

use crate::error::{MediaError, MediaResult};
use crate::probe::VideoInfo;

/// Output geometry of an edit, normalized for 4:2:0 codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Scaled frame width
    pub width: u32,
    /// Scaled frame height
    pub height: u32,
    /// Full canvas height (equals `height` unless a pad canvas is requested)
    pub canvas_height: u32,
}

/// Normalize a dimension to an even value by subtracting 1 if odd.
///
/// 4:2:0 pixel formats reject odd dimensions.
pub fn even(n: u32) -> u32 {
    n - (n % 2)
}

/// Derive output geometry: fixed width, height preserving aspect after crop
/// and rotation, both normalized to even values.
pub fn derive_geometry(src: &VideoInfo, req: &EditRequest) -> MediaResult<Geometry> {
    let (mut frame_w, mut frame_h) = match req.crop {
        Some(c) => {
            if c.width == 0 || c.height == 0 {
                return Err(MediaError::invalid_request("crop rectangle is empty"));
            }
            // Widen before adding: x + width can overflow u32
            if c.x as u64 + c.width as u64 > src.width as u64
                || c.y as u64 + c.height as u64 > src.height as u64
            {
                return Err(MediaError::invalid_request(format!(
                    "crop {}x{}+{}+{} exceeds source {}x{}",
                    c.width, c.height, c.x, c.y, src.width, src.height
                )));
            }
            (c.width, c.height)
        }
        None => (src.width, src.height),
    };

    if req.rotation.swaps_dimensions() {
        std::mem::swap(&mut frame_w, &mut frame_h);
    }

    if req.output_width == 0 || frame_w == 0 || frame_h == 0 {
        return Err(MediaError::invalid_request("output width must be positive"));
    }

    let width = even(req.output_width);
    let height = even((width as f64 * frame_h as f64 / frame_w as f64).round() as u32);
    let canvas_height = match req.canvas_height {
        Some(c) => even(c.max(height)),
        None => height,
    };

    Ok(Geometry {
        width,
        height,
        canvas_height,
    })
}

/// Clamp the vertical offset per mode.
///
/// Ultra-safe mode tightens the bound to ±200 px, which keeps the pad filter
/// valid on small scaled outputs.
pub fn clamp_vertical_offset(offset: i32, mode: EncodeMode) -> i32 {
    match mode {
        EncodeMode::UltraSafe => offset.clamp(-ULTRA_SAFE_OFFSET_CLAMP, ULTRA_SAFE_OFFSET_CLAMP),
        EncodeMode::Standard => offset,
    }
}

/// Build the video filter chain for an edit request, or `None` when the
/// request needs no video filtering.
pub fn build_video_filter(
    src: &VideoInfo,
    req: &EditRequest,
    mode: EncodeMode,
) -> MediaResult<Option<String>> {
    let geometry = derive_geometry(src, req)?;
    let mut chain: Vec<String> = Vec::new();

    if let Some(c) = req.crop {
        chain.push(format!("crop={}:{}:{}:{}", c.width, c.height, c.x, c.y));
    }

    match req.rotation {
        Rotation::None => {}
        Rotation::Cw90 => chain.push("transpose=1".to_string()),
        Rotation::Cw180 => chain.push("transpose=1,transpose=1".to_string()),
        Rotation::Cw270 => chain.push("transpose=2".to_string()),
    }

    if req.flip_horizontal {
        chain.push("hflip".to_string());
    }
    if req.flip_vertical {
        chain.push("vflip".to_string());
    }

    if (req.speed - 1.0).abs() > f64::EPSILON {
        if req.speed <= 0.0 {
            return Err(MediaError::invalid_request("speed must be positive"));
        }
        chain.push(format!("setpts=PTS/{:.4}", req.speed));
    }

    chain.push(format!("scale={}:{}", geometry.width, geometry.height));

    if geometry.canvas_height > geometry.height {
        let free = (geometry.canvas_height - geometry.height) as i32;
        let offset = clamp_vertical_offset(req.vertical_offset, mode);
        // Pad rejects frames placed outside the canvas
        let y = (free / 2 + offset).clamp(0, free);
        chain.push(format!(
            "pad={}:{}:0:{}",
            geometry.width, geometry.canvas_height, y
        ));
    }

    if chain.len() == 1 && req.output_width == src.width && req.canvas_height.is_none() {
        // Bare identity scale on an untouched source
        if even(src.width) == src.width && even(src.height) == src.height {
            return Ok(None);
        }
    }

    Ok(Some(chain.join(",")))
}

/// Build the audio filter chain (tempo matching for speed changes), or
/// `None` when audio passes through untouched or is muted.
pub fn build_audio_filter(req: &EditRequest) -> MediaResult<Option<String>> {
    if req.mute || (req.speed - 1.0).abs() <= f64::EPSILON {
        return Ok(None);
    }
    if req.speed <= 0.0 {
        return Err(MediaError::invalid_request("speed must be positive"));
    }
    Ok(Some(atempo_chain(req.speed)))
}

/// Decompose a speed factor into a chain of `atempo` filters, each within
/// the filter's supported 0.5–2.0 range.
fn atempo_chain(speed: f64) -> String {
    let mut remaining = speed;
    let mut parts = Vec::new();

    while remaining > 2.0 {
        parts.push("atempo=2.0".to_string());
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        parts.push("atempo=0.5".to_string());
        remaining /= 0.5;
    }
    parts.push(format!("atempo={:.4}", remaining));

    parts.join(",")
}

/// Scale filter used by upload normalization: fit within bounds, keep
/// aspect, and force even dimensions.
pub fn normalize_scale_filter(max_width: u32, max_height: u32) -> String {
    format!(
        "scale='min({},iw)':'min({},ih)':force_original_aspect_ratio=decrease:force_divisible_by=2",
        even(max_width),
        even(max_height)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use vedit_models::CropRect;

    fn src_1080p() -> VideoInfo {
        VideoInfo {
            duration: 60.0,
            width: 1920,
            height: 1080,
        }
    }

    #[test]
    fn test_even_normalization() {
        assert_eq!(even(1280), 1280);
        assert_eq!(even(1281), 1280);
        assert_eq!(even(719), 718);
    }

    #[test]
    fn test_derived_height_preserves_aspect() {
        let req = EditRequest {
            output_width: 1280,
            ..Default::default()
        };
        let g = derive_geometry(&src_1080p(), &req).unwrap();
        assert_eq!(g.width, 1280);
        assert_eq!(g.height, 720);
        assert_eq!(g.canvas_height, 720);
    }

    #[test]
    fn test_odd_derived_height_is_normalized() {
        let src = VideoInfo {
            duration: 10.0,
            width: 1000,
            height: 451,
        };
        let req = EditRequest {
            output_width: 999,
            ..Default::default()
        };
        let g = derive_geometry(&src, &req).unwrap();
        assert_eq!(g.width, 998);
        assert_eq!(g.height % 2, 0);
    }

    #[test]
    fn test_rotation_swaps_aspect() {
        let req = EditRequest {
            output_width: 540,
            rotation: Rotation::Cw90,
            ..Default::default()
        };
        let g = derive_geometry(&src_1080p(), &req).unwrap();
        // 1080x1920 after rotation: 540 wide -> 960 tall
        assert_eq!(g.height, 960);
    }

    #[test]
    fn test_crop_out_of_bounds_rejected() {
        let req = EditRequest {
            output_width: 1280,
            crop: Some(CropRect {
                x: 1000,
                y: 0,
                width: 1000,
                height: 500,
            }),
            ..Default::default()
        };
        assert!(derive_geometry(&src_1080p(), &req).is_err());
    }

    #[test]
    fn test_crop_bounds_check_survives_huge_offsets() {
        let req = EditRequest {
            output_width: 1280,
            crop: Some(CropRect {
                x: u32::MAX,
                y: 0,
                width: 2,
                height: 2,
            }),
            ..Default::default()
        };
        assert!(derive_geometry(&src_1080p(), &req).is_err());
    }

    #[test]
    fn test_filter_chain_ordering() {
        let req = EditRequest {
            output_width: 1280,
            crop: Some(CropRect {
                x: 100,
                y: 50,
                width: 800,
                height: 600,
            }),
            rotation: Rotation::Cw90,
            flip_horizontal: true,
            speed: 2.0,
            ..Default::default()
        };
        let filter = build_video_filter(&src_1080p(), &req, EncodeMode::Standard)
            .unwrap()
            .unwrap();

        let crop_pos = filter.find("crop=800:600:100:50").unwrap();
        let transpose_pos = filter.find("transpose=1").unwrap();
        let flip_pos = filter.find("hflip").unwrap();
        let setpts_pos = filter.find("setpts=PTS/2.0000").unwrap();
        let scale_pos = filter.find("scale=").unwrap();
        assert!(crop_pos < transpose_pos);
        assert!(transpose_pos < flip_pos);
        assert!(flip_pos < setpts_pos);
        assert!(setpts_pos < scale_pos);
    }

    #[test]
    fn test_vertical_offset_clamped_in_ultra_safe() {
        assert_eq!(clamp_vertical_offset(500, EncodeMode::UltraSafe), 200);
        assert_eq!(clamp_vertical_offset(-500, EncodeMode::UltraSafe), -200);
        assert_eq!(clamp_vertical_offset(500, EncodeMode::Standard), 500);
        assert_eq!(clamp_vertical_offset(150, EncodeMode::UltraSafe), 150);
    }

    #[test]
    fn test_pad_offset_stays_inside_canvas() {
        let req = EditRequest {
            output_width: 1080,
            canvas_height: Some(1920),
            vertical_offset: 10_000,
            ..Default::default()
        };
        let filter = build_video_filter(&src_1080p(), &req, EncodeMode::Standard)
            .unwrap()
            .unwrap();
        // 1080x608 frame in a 1920 canvas leaves 1312 free pixels
        assert!(filter.contains("pad=1080:1920:0:1312"));
    }

    #[test]
    fn test_atempo_chain_decomposition() {
        assert_eq!(atempo_chain(1.5), "atempo=1.5000");
        assert_eq!(atempo_chain(3.0), "atempo=2.0,atempo=1.5000");
        assert_eq!(atempo_chain(0.25), "atempo=0.5,atempo=0.5000");
    }

    #[test]
    fn test_muted_request_has_no_audio_filter() {
        let req = EditRequest {
            speed: 2.0,
            mute: true,
            ..Default::default()
        };
        assert!(build_audio_filter(&req).unwrap().is_none());
    }

    #[test]
    fn test_normalize_scale_filter() {
        let f = normalize_scale_filter(1920, 1080);
        assert!(f.contains("min(1920,iw)"));
        assert!(f.contains("force_divisible_by=2"));
    }
}
