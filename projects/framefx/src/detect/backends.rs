// DNN-backed detector implementations. The YOLO backend reads a darknet
// cfg/weights pair; the Mask R-CNN backend reads a frozen TensorFlow graph.
// Both can be steered onto CUDA when OpenCV was built with it.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use opencv::core::{Mat, Scalar, Size, Vector, CV_32F};
use opencv::dnn::{self, NetTrait, NetTraitConst};
use opencv::prelude::*;
use tracing::info;

use crate::detect::{BoxDetector, MaskSegmenter, RawInstance, RawPrediction};

const YOLO_INPUT_SIZE: i32 = 608;
const YOLO_SCALE: f64 = 0.003;
const MASK_SIDE: i32 = 15;

/// Load one class label per line.
pub fn load_class_names(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading class names from {}", path.display()))?;
    Ok(text
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect())
}

fn enable_cuda(net: &mut dnn::Net) -> Result<()> {
    net.set_preferable_backend(dnn::DNN_BACKEND_CUDA)?;
    net.set_preferable_target(dnn::DNN_TARGET_CUDA)?;
    info!("dnn backend set to CUDA");
    Ok(())
}

/// YOLO v3 box detector over a darknet network.
pub struct YoloDnnDetector {
    net: dnn::Net,
    output_layers: Vector<String>,
    class_names: Vec<String>,
}

impl YoloDnnDetector {
    pub fn new(cfg: &Path, weights: &Path, names: &Path, use_cuda: bool) -> Result<Self> {
        let mut net = dnn::read_net_from_darknet(
            cfg.to_string_lossy().as_ref(),
            weights.to_string_lossy().as_ref(),
        )
        .with_context(|| format!("loading darknet model from {}", weights.display()))?;
        if use_cuda {
            enable_cuda(&mut net)?;
        }
        let output_layers = net.get_unconnected_out_layers_names()?;
        let class_names = load_class_names(names)?;
        info!(classes = class_names.len(), "yolo network initialized");
        Ok(Self {
            net,
            output_layers,
            class_names,
        })
    }
}

impl BoxDetector for YoloDnnDetector {
    fn detect(&mut self, frame: &Mat) -> Result<Vec<RawPrediction>> {
        let blob = dnn::blob_from_image(
            frame,
            YOLO_SCALE,
            Size::new(YOLO_INPUT_SIZE, YOLO_INPUT_SIZE),
            Scalar::all(0.0),
            true,
            false,
            CV_32F,
        )?;
        self.net
            .set_input(&blob, "", 1.0, Scalar::default())?;

        let mut outputs: Vector<Mat> = Vector::new();
        self.net.forward(&mut outputs, &self.output_layers)?;

        // Each output row is [cx, cy, w, h, objectness, class scores...]
        let mut predictions = Vec::new();
        for out in &outputs {
            let cols = out.cols();
            for row in 0..out.rows() {
                let mut scores = Vec::with_capacity((cols - 5).max(0) as usize);
                for col in 5..cols {
                    scores.push(*out.at_2d::<f32>(row, col)?);
                }
                predictions.push(RawPrediction {
                    cx: *out.at_2d::<f32>(row, 0)?,
                    cy: *out.at_2d::<f32>(row, 1)?,
                    w: *out.at_2d::<f32>(row, 2)?,
                    h: *out.at_2d::<f32>(row, 3)?,
                    scores,
                });
            }
        }
        Ok(predictions)
    }

    fn class_names(&self) -> &[String] {
        &self.class_names
    }
}

/// Mask R-CNN instance segmenter over a frozen TensorFlow graph.
pub struct MaskRcnnSegmenter {
    net: dnn::Net,
    class_names: Vec<String>,
}

impl MaskRcnnSegmenter {
    pub fn new(graph: &Path, config: &Path, names: &Path, use_cuda: bool) -> Result<Self> {
        let mut net = dnn::read_net_from_tensorflow(
            graph.to_string_lossy().as_ref(),
            config.to_string_lossy().as_ref(),
        )
        .with_context(|| format!("loading tensorflow model from {}", graph.display()))?;
        if use_cuda {
            enable_cuda(&mut net)?;
        }
        let class_names = load_class_names(names)?;
        info!(classes = class_names.len(), "mask r-cnn network initialized");
        Ok(Self { net, class_names })
    }
}

impl MaskSegmenter for MaskRcnnSegmenter {
    fn detect(&mut self, frame: &Mat) -> Result<Vec<RawInstance>> {
        let size = frame.size()?;
        let blob = dnn::blob_from_image(
            frame,
            1.0,
            Size::new(size.width, size.height),
            Scalar::all(0.0),
            true,
            false,
            CV_32F,
        )?;
        self.net
            .set_input(&blob, "", 1.0, Scalar::default())?;

        let mut outputs: Vector<Mat> = Vector::new();
        let names: Vector<String> =
            Vector::from_iter(["detection_out_final", "detection_masks"]);
        self.net.forward(&mut outputs, &names)?;

        let boxes = outputs.get(0)?;
        let masks = outputs.get(1)?;

        // boxes is 1x1xNx7: [batch, class_id, score, x1, y1, x2, y2]
        // masks is Nx90x15x15: per-instance, per-class probability maps
        let dims = boxes.mat_size();
        let count = if dims.len() >= 3 { dims[2] } else { 0 };
        let mut instances = Vec::with_capacity(count as usize);
        for i in 0..count {
            let class_id = *boxes.at_nd::<f32>(&[0, 0, i, 1])? as usize;
            let confidence = *boxes.at_nd::<f32>(&[0, 0, i, 2])?;
            let x1 = *boxes.at_nd::<f32>(&[0, 0, i, 3])?;
            let y1 = *boxes.at_nd::<f32>(&[0, 0, i, 4])?;
            let x2 = *boxes.at_nd::<f32>(&[0, 0, i, 5])?;
            let y2 = *boxes.at_nd::<f32>(&[0, 0, i, 6])?;

            let mut mask = Mat::new_rows_cols_with_default(
                MASK_SIDE,
                MASK_SIDE,
                CV_32F,
                Scalar::all(0.0),
            )?;
            for y in 0..MASK_SIDE {
                for x in 0..MASK_SIDE {
                    *mask.at_2d_mut::<f32>(y, x)? =
                        *masks.at_nd::<f32>(&[i, class_id as i32, y, x])?;
                }
            }

            instances.push(RawInstance {
                class_id,
                confidence,
                x1,
                y1,
                x2,
                y2,
                mask,
            });
        }
        Ok(instances)
    }

    fn class_names(&self) -> &[String] {
        &self.class_names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn class_names_skip_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "person\ncar\n\nbicycle  \n").unwrap();
        let names = load_class_names(file.path()).unwrap();
        assert_eq!(names, vec!["person", "car", "bicycle"]);
    }

    #[test]
    fn missing_names_file_reports_path() {
        let err = load_class_names(Path::new("/nonexistent/coco.names")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/coco.names"));
    }
}
