use serde::{Deserialize, Serialize};

/// Flat per-frame rendering configuration: boolean mode switches plus integer
/// slider parameters. The web layer replaces the whole record atomically; the
/// processing loop snapshots it once per frame, so values may change between
/// frames without restarting the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectConfig {
    // Detector selection
    pub use_box_detector: bool,
    pub use_mask_segmenter: bool,

    // Box-detector effects
    pub extract_objects: bool,
    pub ascii_objects: bool,
    pub silhouette_black: bool,
    pub silhouette_inlay: bool,

    // Segmenter effects
    pub cut_background: bool,
    pub replace_background: bool,
    pub color_canny: bool,
    pub color_canny_on_background: bool,
    pub color_on_gray: bool,
    pub color_on_gray_blur: bool,
    pub objects_on_blur: bool,

    // Detector-independent stylization
    pub colorize: bool,
    pub cartoon: bool,
    pub pencil: bool,
    pub two_colored: bool,
    pub quantize_colors: bool,
    pub denoise_and_sharpen: bool,
    pub ascii_paint: bool,
    pub sobel: bool,

    // Upscaling / interpolation
    pub upscale: bool,
    pub interpolate: bool,

    // Sliders (integers in application-defined ranges)
    /// Detector confidence threshold in percent (strict `>` comparison).
    pub confidence: i32,
    /// Gaussian blur kernel basis used by blur-backed effects.
    pub blur: i32,
    /// ASCII glyph font scale, tenths.
    pub ascii_size: i32,
    /// Grid step between ASCII sample points, pixels.
    pub ascii_interval: i32,
    /// ASCII glyph stroke thickness.
    pub ascii_thickness: i32,
    /// Mask region shrink divisor (box is shrunk by `1/divisor` per side).
    pub shrink_divisor: i32,
    /// Target k-means cluster count for color quantization; 0 disables.
    pub color_count: i32,
    /// Detail-enhance spatial sigma for the sharpening pass.
    pub sharpen_sigma: i32,
    /// Center weight of the 3x3 sharpening kernel.
    pub sharpen_kernel: i32,
    /// Non-local-means luminance strength; 0 disables denoising.
    pub denoise_luma: i32,
    /// Non-local-means color strength.
    pub denoise_chroma: i32,
    /// Sobel aperture size (odd).
    pub sobel_kernel: i32,
    /// Contrast gain in percent (100 = identity).
    pub contrast: i32,
    /// Brightness offset added after the contrast gain.
    pub brightness: i32,
    /// Saturation gain in percent (100 = identity).
    pub saturation: i32,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            use_box_detector: false,
            use_mask_segmenter: false,
            extract_objects: false,
            ascii_objects: false,
            silhouette_black: false,
            silhouette_inlay: false,
            cut_background: false,
            replace_background: false,
            color_canny: false,
            color_canny_on_background: false,
            color_on_gray: false,
            color_on_gray_blur: false,
            objects_on_blur: false,
            colorize: false,
            cartoon: false,
            pencil: false,
            two_colored: false,
            quantize_colors: false,
            denoise_and_sharpen: false,
            ascii_paint: false,
            sobel: false,
            upscale: false,
            interpolate: false,
            confidence: 50,
            blur: 5,
            ascii_size: 10,
            ascii_interval: 10,
            ascii_thickness: 2,
            shrink_divisor: 10,
            color_count: 8,
            sharpen_sigma: 10,
            sharpen_kernel: 9,
            denoise_luma: 0,
            denoise_chroma: 0,
            sobel_kernel: 3,
            contrast: 100,
            brightness: 0,
            saturation: 100,
        }
    }
}

impl EffectConfig {
    /// Detector threshold as a fraction; sliders are percent values.
    pub fn confidence_fraction(&self) -> f32 {
        self.confidence as f32 / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_neutral() {
        let cfg = EffectConfig::default();
        assert!(!cfg.use_box_detector);
        assert!(!cfg.extract_objects);
        assert_eq!(cfg.contrast, 100);
        assert_eq!(cfg.brightness, 0);
        assert_eq!(cfg.saturation, 100);
    }

    #[test]
    fn deserializes_partial_record() {
        let cfg: EffectConfig =
            serde_json::from_str(r#"{"use_box_detector":true,"confidence":65}"#).unwrap();
        assert!(cfg.use_box_detector);
        assert_eq!(cfg.confidence, 65);
        // Unspecified fields fall back to defaults
        assert_eq!(cfg.saturation, 100);
        assert!(!cfg.sobel);
    }
}
