use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;

use crate::pipeline::orchestrator::ModelPaths;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Port to bind to
    #[arg(long, default_value_t = 12206)]
    pub port: u16,

    /// Root directory for video and image sources
    #[arg(long, env = "FRAMEFX_MEDIA_ROOT")]
    pub media_root: PathBuf,

    /// Root directory for output artifacts
    #[arg(long, env = "FRAMEFX_OUTPUT_ROOT")]
    pub output_root: PathBuf,

    /// Replacement background image
    #[arg(long, env = "FRAMEFX_BACKGROUND")]
    pub background: Option<PathBuf>,

    /// Darknet config for the box detector
    #[arg(long, env = "FRAMEFX_YOLO_CFG")]
    pub yolo_cfg: Option<PathBuf>,

    /// Darknet weights for the box detector
    #[arg(long, env = "FRAMEFX_YOLO_WEIGHTS")]
    pub yolo_weights: Option<PathBuf>,

    /// Class names for the box detector
    #[arg(long, env = "FRAMEFX_YOLO_NAMES")]
    pub yolo_names: Option<PathBuf>,

    /// Frozen TensorFlow graph for the mask segmenter
    #[arg(long, env = "FRAMEFX_RCNN_GRAPH")]
    pub rcnn_graph: Option<PathBuf>,

    /// Graph config for the mask segmenter
    #[arg(long, env = "FRAMEFX_RCNN_CONFIG")]
    pub rcnn_config: Option<PathBuf>,

    /// Class names for the mask segmenter
    #[arg(long, env = "FRAMEFX_RCNN_NAMES")]
    pub rcnn_names: Option<PathBuf>,

    /// Caffe prototxt for the colorization network
    #[arg(long, env = "FRAMEFX_COLORIZE_PROTOTXT")]
    pub colorize_prototxt: Option<PathBuf>,

    /// Caffe weights for the colorization network
    #[arg(long, env = "FRAMEFX_COLORIZE_MODEL")]
    pub colorize_model: Option<PathBuf>,

    /// Run DNN inference on a CUDA backend
    #[arg(long, env = "FRAMEFX_CUDA")]
    pub cuda: bool,

    /// Scale factor for the upscale effect
    #[arg(long, default_value_t = 4.0)]
    pub upscale_factor: f64,

    /// Render this source to completion without starting the server.
    /// The name is relative to the media root.
    #[arg(long)]
    pub render: Option<String>,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn model_paths(&self) -> ModelPaths {
        ModelPaths {
            yolo_cfg: self.yolo_cfg.clone(),
            yolo_weights: self.yolo_weights.clone(),
            yolo_names: self.yolo_names.clone(),
            rcnn_graph: self.rcnn_graph.clone(),
            rcnn_config: self.rcnn_config.clone(),
            rcnn_names: self.rcnn_names.clone(),
            colorize_prototxt: self.colorize_prototxt.clone(),
            colorize_model: self.colorize_model.clone(),
            use_cuda: self.cuda,
        }
    }
}
