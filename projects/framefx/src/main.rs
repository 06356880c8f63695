mod cli;
mod config;
mod detect;
mod fx;
mod pipeline;
mod run_context;
mod video;
mod web;

use std::sync::{Arc, RwLock};

use anyhow::Result;

use cli::Args;
use config::EffectConfig;
use pipeline::headless;
use pipeline::orchestrator::RunRequest;
use web::server::run_server;
use web::AppContext;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args = Args::parse_args();
    let models = args.model_paths();

    if let Some(source) = args.render.clone() {
        let req = RunRequest {
            source_path: args.media_root.join(&source),
            source_name: source,
            output_root: args.output_root.clone(),
            background_path: args.background.clone(),
            record: true,
            upscale_factor: args.upscale_factor,
        };
        let config = Arc::new(RwLock::new(EffectConfig::default()));
        return tokio::task::spawn_blocking(move || headless::render(req, &models, config))
            .await?;
    }

    let ctx = Arc::new(AppContext::new(
        args.media_root.clone(),
        args.output_root.clone(),
        args.background.clone(),
        args.upscale_factor,
        models,
    ));

    run_server(args.host, args.port, ctx).await?;

    Ok(())
}
