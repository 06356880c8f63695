// Grayscale color restoration seam. The shipped backend runs the caffe
// colorization network: the frame's lightness channel goes through the net
// at 224x224 and the predicted ab chroma planes come back, get resized to
// the frame and rejoin the original lightness.

use std::path::Path;

use anyhow::{bail, Context, Result};
use opencv::core::{self, Mat, Scalar, Size, Vector, CV_32F, CV_8U};
use opencv::dnn::{self, NetTrait, NetTraitConst};
use opencv::imgproc;
use opencv::prelude::*;
use tracing::info;

const NET_INPUT_SIDE: i32 = 224;
const LAB_LIGHTNESS_OFFSET: f64 = 50.0;

pub trait Colorizer: Send {
    fn colorize(&mut self, frame: &Mat) -> Result<Mat>;
}

pub struct CaffeColorizer {
    net: dnn::Net,
    output_layers: Vector<String>,
}

impl CaffeColorizer {
    pub fn new(prototxt: &Path, model: &Path, use_cuda: bool) -> Result<Self> {
        let mut net = dnn::read_net_from_caffe(
            prototxt.to_string_lossy().as_ref(),
            model.to_string_lossy().as_ref(),
        )
        .with_context(|| format!("loading caffe model from {}", model.display()))?;
        if use_cuda {
            net.set_preferable_backend(dnn::DNN_BACKEND_CUDA)?;
            net.set_preferable_target(dnn::DNN_TARGET_CUDA)?;
        }
        let output_layers = net.get_unconnected_out_layers_names()?;
        info!("colorization network initialized");
        Ok(Self { net, output_layers })
    }
}

impl Colorizer for CaffeColorizer {
    fn colorize(&mut self, frame: &Mat) -> Result<Mat> {
        let size = frame.size()?;

        let mut scaled = Mat::default();
        frame.convert_to(&mut scaled, CV_32F, 1.0 / 255.0, 0.0)?;
        let mut lab = Mat::default();
        imgproc::cvt_color_def(&scaled, &mut lab, imgproc::COLOR_BGR2Lab)?;

        let mut small = Mat::default();
        imgproc::resize(
            &lab,
            &mut small,
            Size::new(NET_INPUT_SIDE, NET_INPUT_SIDE),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;
        let mut small_channels = Vector::<Mat>::new();
        core::split(&small, &mut small_channels)?;
        // The network was trained on mean-centered lightness
        let mut lightness = Mat::default();
        core::subtract(
            &small_channels.get(0)?,
            &Scalar::all(LAB_LIGHTNESS_OFFSET),
            &mut lightness,
            &core::no_array(),
            -1,
        )?;

        let blob = dnn::blob_from_image(
            &lightness,
            1.0,
            Size::new(NET_INPUT_SIDE, NET_INPUT_SIDE),
            Scalar::all(0.0),
            false,
            false,
            CV_32F,
        )?;
        self.net.set_input(&blob, "", 1.0, Scalar::default())?;
        let mut outputs: Vector<Mat> = Vector::new();
        self.net.forward(&mut outputs, &self.output_layers)?;
        let ab = outputs.get(0)?;

        // ab is 1x2xHxW: predicted chroma planes at network resolution
        let dims = ab.mat_size();
        if dims.len() < 4 {
            bail!("unexpected colorization output shape");
        }
        let (h, w) = (dims[2], dims[3]);
        let mut a_plane = Mat::new_rows_cols_with_default(h, w, CV_32F, Scalar::all(0.0))?;
        let mut b_plane = Mat::new_rows_cols_with_default(h, w, CV_32F, Scalar::all(0.0))?;
        for y in 0..h {
            for x in 0..w {
                *a_plane.at_2d_mut::<f32>(y, x)? = *ab.at_nd::<f32>(&[0, 0, y, x])?;
                *b_plane.at_2d_mut::<f32>(y, x)? = *ab.at_nd::<f32>(&[0, 1, y, x])?;
            }
        }

        let mut a_full = Mat::default();
        let mut b_full = Mat::default();
        imgproc::resize(&a_plane, &mut a_full, size, 0.0, 0.0, imgproc::INTER_LINEAR)?;
        imgproc::resize(&b_plane, &mut b_full, size, 0.0, 0.0, imgproc::INTER_LINEAR)?;

        let mut full_channels = Vector::<Mat>::new();
        core::split(&lab, &mut full_channels)?;
        let mut merged = Vector::<Mat>::new();
        merged.push(full_channels.get(0)?);
        merged.push(a_full);
        merged.push(b_full);
        let mut lab_out = Mat::default();
        core::merge(&merged, &mut lab_out)?;

        let mut bgr = Mat::default();
        imgproc::cvt_color_def(&lab_out, &mut bgr, imgproc::COLOR_Lab2BGR)?;
        // The saturating cast also clips the float range to [0, 1]
        let mut out = Mat::default();
        bgr.convert_to(&mut out, CV_8U, 255.0, 0.0)?;
        Ok(out)
    }
}
