// Whole-frame stylization: k-means color quantization, non-local-means
// denoising, kernel sharpening with detail enhancement, cartoon compositing,
// full-frame ASCII rendering and Sobel edges.

use anyhow::Result;
use opencv::core::{
    self, Mat, Point, Scalar, TermCriteria, Vec3b, CV_16S, CV_32F, CV_8U, CV_8UC3,
};
use opencv::imgproc;
use opencv::photo;
use opencv::prelude::*;
use rand::Rng;

use crate::config::EffectConfig;
use crate::fx::compositor::gaussian_blur_odd;
use crate::fx::EffectCtx;

const GLYPHS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// K-means color quantization in Lab space. A non-positive cluster count
/// leaves the frame untouched.
pub fn quantize_colors(frame: &Mat, color_count: i32) -> Result<Mat> {
    if color_count <= 0 {
        return Ok(frame.try_clone()?);
    }

    let mut lab = Mat::default();
    imgproc::cvt_color_def(frame, &mut lab, imgproc::COLOR_BGR2Lab)?;

    let samples = lab.reshape(1, lab.rows() * lab.cols())?;
    let mut samples_f = Mat::default();
    samples.convert_to(&mut samples_f, CV_32F, 1.0, 0.0)?;

    let mut labels = Mat::default();
    let mut centers = Mat::default();
    let criteria = TermCriteria::new(
        core::TermCriteria_COUNT + core::TermCriteria_EPS,
        10,
        1.0,
    )?;
    core::kmeans(
        &samples_f,
        color_count,
        &mut labels,
        criteria,
        1,
        core::KMEANS_PP_CENTERS,
        &mut centers,
    )?;

    let mut quant = Mat::new_rows_cols_with_default(
        lab.rows(),
        lab.cols(),
        CV_8UC3,
        Scalar::all(0.0),
    )?;
    for row in 0..lab.rows() {
        for col in 0..lab.cols() {
            let idx = row * lab.cols() + col;
            let cluster = *labels.at::<i32>(idx)?;
            let px = quant.at_2d_mut::<Vec3b>(row, col)?;
            for ch in 0..3 {
                px[ch] = (*centers.at_2d::<f32>(cluster, ch as i32)?)
                    .clamp(0.0, 255.0) as u8;
            }
        }
    }

    let mut out = Mat::default();
    imgproc::cvt_color_def(&quant, &mut out, imgproc::COLOR_Lab2BGR)?;
    Ok(out)
}

/// Non-local-means denoising with separate luminance and color strengths.
/// Zero luminance strength disables the pass entirely.
pub fn denoise(frame: &Mat, luma: i32, chroma: i32) -> Result<Mat> {
    if luma <= 0 {
        return Ok(frame.try_clone()?);
    }
    // Channel order is swapped around the call, so the luminance estimate
    // runs on the red-leading layout
    let mut rgb = Mat::default();
    imgproc::cvt_color_def(frame, &mut rgb, imgproc::COLOR_BGR2RGB)?;
    let mut denoised = Mat::default();
    photo::fast_nl_means_denoising_colored(&rgb, &mut denoised, luma as f32, chroma as f32, 7, 15)?;
    let mut out = Mat::default();
    imgproc::cvt_color_def(&denoised, &mut out, imgproc::COLOR_RGB2BGR)?;
    Ok(out)
}

/// 3x3 sharpening kernel: slider-chosen center weight, ring weights adjusted
/// so the kernel always sums to one, then a detail-enhance pass.
pub fn sharpen(frame: &Mat, sigma: i32, center: i32) -> Result<Mat> {
    let mut kernel = [[-1.0f32; 3]; 3];
    kernel[1][1] = center as f32;

    let mut diff = 9 - center;
    'balance: while diff != 0 {
        for j in 0..3 {
            for i in 0..3 {
                if i == 1 && j == 1 {
                    continue;
                }
                if diff > 0 {
                    kernel[j][i] += 1.0;
                    diff -= 1;
                } else {
                    kernel[j][i] -= 1.0;
                    diff += 1;
                }
                if diff == 0 {
                    break 'balance;
                }
            }
        }
    }

    let kernel = Mat::from_slice_2d(&kernel)?;
    let mut filtered = Mat::default();
    imgproc::filter_2d_def(frame, &mut filtered, -1, &kernel)?;

    let mut out = Mat::default();
    photo::detail_enhance(&filtered, &mut out, sigma as f32, 0.15)?;
    Ok(out)
}

/// Morphological gradient edges, per-channel Otsu-binarized and inverted.
/// Edge pixels come out black on white.
pub fn morph_edges(frame: &Mat) -> Result<Mat> {
    let kernel =
        imgproc::get_structuring_element_def(imgproc::MORPH_RECT, core::Size::new(2, 2))?;
    let mut gradient = Mat::default();
    imgproc::morphology_ex_def(frame, &mut gradient, imgproc::MORPH_GRADIENT, &kernel)?;

    let mut channels = core::Vector::<Mat>::new();
    core::split(&gradient, &mut channels)?;

    let mut binarized = core::Vector::<Mat>::new();
    for ch in &channels {
        let mut inverted = Mat::default();
        core::bitwise_not_def(&ch, &mut inverted)?;
        let mut bin = Mat::default();
        imgproc::threshold(
            &inverted,
            &mut bin,
            0.0,
            255.0,
            imgproc::THRESH_OTSU | imgproc::THRESH_BINARY,
        )?;
        binarized.push(bin);
    }

    let mut merged = Mat::default();
    core::merge(&binarized, &mut merged)?;

    let mut gray = Mat::default();
    imgproc::cvt_color_def(&merged, &mut gray, imgproc::COLOR_BGR2GRAY)?;
    let mut bgr = Mat::default();
    imgproc::cvt_color_def(&gray, &mut bgr, imgproc::COLOR_GRAY2BGR)?;
    let mut out = Mat::default();
    core::bitwise_not_def(&bgr, &mut out)?;
    Ok(out)
}

/// Quantized colors carved by morphological edges, then sharpened and
/// denoised.
pub fn cartoon(frame: &Mat, cfg: &EffectConfig) -> Result<Mat> {
    let edges = morph_edges(frame)?;
    let quant = quantize_colors(frame, cfg.color_count)?;
    let mut carved = Mat::default();
    core::bitwise_and_def(&quant, &edges, &mut carved)?;
    let sharp = sharpen(&carved, cfg.sharpen_sigma, cfg.sharpen_kernel)?;
    denoise(&sharp, cfg.denoise_luma, cfg.denoise_chroma)
}

/// Two-tone k-means reduction followed by the sharpening and denoising
/// passes.
pub fn two_colored(frame: &Mat, cfg: &EffectConfig) -> Result<Mat> {
    let quant = quantize_colors(frame, 2)?;
    let sharp = sharpen(&quant, cfg.sharpen_sigma, cfg.sharpen_kernel)?;
    denoise(&sharp, cfg.denoise_luma, cfg.denoise_chroma)
}

/// Pencil sketch: morphological edges carved into the two-tone reduction,
/// then sharpened and denoised.
pub fn pencil(frame: &Mat, cfg: &EffectConfig) -> Result<Mat> {
    let edges = morph_edges(frame)?;
    let quant = quantize_colors(frame, 2)?;
    let mut carved = Mat::default();
    core::bitwise_and_def(&quant, &edges, &mut carved)?;
    let sharp = sharpen(&carved, cfg.sharpen_sigma, cfg.sharpen_kernel)?;
    denoise(&sharp, cfg.denoise_luma, cfg.denoise_chroma)
}

/// Random glyphs over the blurred frame, colored by the pixel under each
/// grid point, rendered on black.
pub fn ascii_paint(frame: &Mat, cfg: &EffectConfig, ctx: &mut EffectCtx) -> Result<Mat> {
    let blurred = gaussian_blur_odd(frame, cfg.blur)?;
    let mut canvas = Mat::new_rows_cols_with_default(
        frame.rows(),
        frame.cols(),
        CV_8UC3,
        Scalar::all(0.0),
    )?;

    let font_scale = cfg.ascii_size as f64 / 10.0;
    let step = cfg.ascii_interval.max(1) as usize;

    for xx in (0..blurred.cols()).step_by(step) {
        for yy in (0..blurred.rows()).step_by(step) {
            let px = *blurred.at_2d::<Vec3b>(yy, xx)?;
            let glyph = GLYPHS[ctx.rng.gen_range(0..GLYPHS.len())] as char;
            imgproc::put_text(
                &mut canvas,
                &glyph.to_string(),
                Point::new(xx, yy),
                imgproc::FONT_HERSHEY_SIMPLEX,
                font_scale,
                Scalar::new(px[0] as f64, px[1] as f64, px[2] as f64, 0.0),
                cfg.ascii_thickness.max(1),
                imgproc::LINE_AA,
                false,
            )?;
        }
    }

    Ok(canvas)
}

/// Sobel gradient magnitude, equal-weighted x/y, back in BGR.
pub fn sobel(frame: &Mat, aperture: i32) -> Result<Mat> {
    let k = aperture.clamp(1, 7) | 1;

    let mut gray = Mat::default();
    imgproc::cvt_color_def(frame, &mut gray, imgproc::COLOR_BGR2GRAY)?;

    let mut gx = Mat::default();
    let mut gy = Mat::default();
    imgproc::sobel(&gray, &mut gx, CV_16S, 1, 0, k, 1.0, 0.0, core::BORDER_DEFAULT)?;
    imgproc::sobel(&gray, &mut gy, CV_16S, 0, 1, k, 1.0, 0.0, core::BORDER_DEFAULT)?;

    let mut ax = Mat::default();
    let mut ay = Mat::default();
    core::convert_scale_abs_def(&gx, &mut ax)?;
    core::convert_scale_abs_def(&gy, &mut ay)?;

    let mut magnitude = Mat::default();
    core::add_weighted(&ax, 0.5, &ay, 0.5, 0.0, &mut magnitude, CV_8U)?;

    let mut out = Mat::default();
    imgproc::cvt_color_def(&magnitude, &mut out, imgproc::COLOR_GRAY2BGR)?;
    Ok(out)
}
