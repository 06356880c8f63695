// Frame processing pipeline: per-run state, the sequential worker loop,
// stats, frame publication and crop export.

pub mod exporter;
pub mod headless;
pub mod orchestrator;
pub mod publisher;
pub mod state;
pub mod stats;
pub mod worker;
