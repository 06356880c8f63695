// Effect chain: a fixed-order registry of toggleable effects. Later effects
// see earlier effects' output; the color adjustment pass always runs last.

pub mod adjust;
pub mod annotate;
pub mod colorize;
pub mod compositor;
pub mod hud;
pub mod recolor;
pub mod stylize;
pub mod upscale;

use anyhow::Result;
use opencv::core::Mat;
use opencv::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::EffectConfig;
use crate::detect::DetectionSet;
use colorize::Colorizer;
use upscale::Upscaler;

/// Pre-annotation object crop stashed for the export side channel.
pub struct ExtractedCrop {
    pub label: String,
    pub image: Mat,
}

/// Per-run effect context: the substitute background, the crop sink, glyph
/// randomness and the optional upscaler/colorizer collaborators. Lives for
/// the whole run; the crop sink is drained once per frame.
pub struct EffectCtx {
    pub background: Option<Mat>,
    pub extracted: Vec<ExtractedCrop>,
    pub rng: StdRng,
    pub upscaler: Option<Box<dyn Upscaler>>,
    pub colorizer: Option<Box<dyn Colorizer>>,
}

impl EffectCtx {
    pub fn new(
        background: Option<Mat>,
        upscaler: Option<Box<dyn Upscaler>>,
        colorizer: Option<Box<dyn Colorizer>>,
    ) -> Self {
        Self {
            background,
            extracted: Vec::new(),
            rng: StdRng::from_entropy(),
            upscaler,
            colorizer,
        }
    }

    pub fn take_extracted(&mut self) -> Vec<ExtractedCrop> {
        std::mem::take(&mut self.extracted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    ExtractObjects,
    AsciiObjects,
    SilhouetteBlack,
    SilhouetteInlay,
    ColorOnGray,
    ColorOnGrayBlur,
    ObjectsOnBlur,
    CutBackground,
    ReplaceBackground,
    ColorCanny,
    ColorCannyOnBackground,
    Colorize,
    Cartoon,
    Pencil,
    TwoColored,
    QuantizeColors,
    DenoiseAndSharpen,
    AsciiPaint,
    Sobel,
    Upscale,
}

/// Application order: box-detector effects, segmenter effects, whole-frame
/// stylization, upscaling. Color adjustment is not listed; it is
/// unconditional and always last.
pub const ORDER: &[EffectKind] = &[
    EffectKind::ExtractObjects,
    EffectKind::AsciiObjects,
    EffectKind::SilhouetteBlack,
    EffectKind::SilhouetteInlay,
    EffectKind::ColorOnGray,
    EffectKind::ColorOnGrayBlur,
    EffectKind::ObjectsOnBlur,
    EffectKind::CutBackground,
    EffectKind::ReplaceBackground,
    EffectKind::ColorCanny,
    EffectKind::ColorCannyOnBackground,
    EffectKind::Colorize,
    EffectKind::Cartoon,
    EffectKind::Pencil,
    EffectKind::TwoColored,
    EffectKind::QuantizeColors,
    EffectKind::DenoiseAndSharpen,
    EffectKind::AsciiPaint,
    EffectKind::Sobel,
    EffectKind::Upscale,
];

impl EffectKind {
    /// Detector-conditioned effects stay off while their detector is off,
    /// regardless of the individual toggle.
    pub fn enabled(self, cfg: &EffectConfig) -> bool {
        use EffectKind::*;
        match self {
            ExtractObjects => cfg.use_box_detector && cfg.extract_objects,
            AsciiObjects => cfg.use_box_detector && cfg.ascii_objects,
            SilhouetteBlack => cfg.use_box_detector && cfg.silhouette_black,
            SilhouetteInlay => cfg.use_box_detector && cfg.silhouette_inlay,
            ColorOnGray => cfg.use_mask_segmenter && cfg.color_on_gray,
            ColorOnGrayBlur => cfg.use_mask_segmenter && cfg.color_on_gray_blur,
            ObjectsOnBlur => cfg.use_mask_segmenter && cfg.objects_on_blur,
            CutBackground => cfg.use_mask_segmenter && cfg.cut_background,
            ReplaceBackground => cfg.use_mask_segmenter && cfg.replace_background,
            ColorCanny => cfg.use_mask_segmenter && cfg.color_canny,
            ColorCannyOnBackground => cfg.use_mask_segmenter && cfg.color_canny_on_background,
            Colorize => cfg.colorize,
            Cartoon => cfg.cartoon,
            Pencil => cfg.pencil,
            TwoColored => cfg.two_colored,
            QuantizeColors => cfg.quantize_colors,
            DenoiseAndSharpen => cfg.denoise_and_sharpen,
            AsciiPaint => cfg.ascii_paint,
            Sobel => cfg.sobel,
            Upscale => cfg.upscale,
        }
    }

    fn apply(
        self,
        frame: &Mat,
        boxes: &DetectionSet,
        masks: &DetectionSet,
        cfg: &EffectConfig,
        ctx: &mut EffectCtx,
    ) -> Result<Mat> {
        use EffectKind::*;
        match self {
            ExtractObjects => annotate::extract_objects(frame, boxes, ctx),
            AsciiObjects => annotate::ascii_objects(frame, boxes, cfg, ctx),
            SilhouetteBlack => annotate::silhouette_black(frame, boxes),
            SilhouetteInlay => annotate::silhouette_inlay(frame, boxes),
            ColorOnGray => recolor::color_on_gray(frame, masks, cfg),
            ColorOnGrayBlur => recolor::color_on_gray_blur(frame, masks),
            ObjectsOnBlur => recolor::objects_on_blur(frame, masks, cfg),
            CutBackground => recolor::cut_background(frame, masks),
            ReplaceBackground => {
                let out = recolor::replace_background(frame, masks, ctx.background.as_ref())?;
                stylize::denoise(&out, cfg.denoise_luma, cfg.denoise_chroma)
            }
            ColorCanny => {
                let out = recolor::color_canny(frame, masks, cfg)?;
                stylize::denoise(&out, cfg.denoise_luma, cfg.denoise_chroma)
            }
            ColorCannyOnBackground => recolor::color_canny_on_background(frame, masks),
            Colorize => match ctx.colorizer.as_mut() {
                Some(col) => col.colorize(frame),
                None => Ok(frame.try_clone()?),
            },
            Cartoon => stylize::cartoon(frame, cfg),
            Pencil => stylize::pencil(frame, cfg),
            TwoColored => stylize::two_colored(frame, cfg),
            QuantizeColors => stylize::quantize_colors(frame, cfg.color_count),
            DenoiseAndSharpen => {
                let out = stylize::sharpen(frame, cfg.sharpen_sigma, cfg.sharpen_kernel)?;
                stylize::denoise(&out, cfg.denoise_luma, cfg.denoise_chroma)
            }
            AsciiPaint => stylize::ascii_paint(frame, cfg, ctx),
            Sobel => stylize::sobel(frame, cfg.sobel_kernel),
            Upscale => match ctx.upscaler.as_mut() {
                Some(up) => {
                    let out = up.upscale(frame)?;
                    stylize::sharpen(&out, cfg.sharpen_sigma, cfg.sharpen_kernel)
                }
                None => Ok(frame.try_clone()?),
            },
        }
    }
}

/// Run the full chain over one frame. Disabled effects are skipped without
/// side effects; the color adjustment runs unconditionally at the end.
pub fn apply_chain(
    frame: &Mat,
    boxes: &DetectionSet,
    masks: &DetectionSet,
    cfg: &EffectConfig,
    ctx: &mut EffectCtx,
) -> Result<Mat> {
    let mut out = frame.try_clone()?;
    for &kind in ORDER {
        if kind.enabled(cfg) {
            out = kind.apply(&out, boxes, masks, cfg, ctx)?;
        }
    }
    adjust::brightness_contrast_saturation(&out, cfg)
}
