mod app;
mod config;
mod error;
mod render;
mod upload;
mod utils;

use anyhow::{anyhow, Context};
use app::ImageAnalyzer;
use clap::Parser;
use config::Config;
use eframe::CreationContext;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Send an image to an analysis endpoint and view the result
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML config file (default: <config dir>/image-analyzer/config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Post images to this webhook URL instead of the configured destination
    #[arg(long)]
    webhook_url: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn init_tracing(debug: bool, default_filter: &str) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(url) = args.webhook_url {
        config = config.with_webhook_url(url);
        config.validate()?;
    }
    init_tracing(args.debug, &config.log_filter);

    let policy = upload::build_policy(&config)?;
    let export_config = config.export.clone();

    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_inner_size([640.0, 720.0])
            .with_min_inner_size([420.0, 520.0])
            .with_drag_and_drop(true),
        ..Default::default()
    };

    eframe::run_native(
        "Image Analyzer",
        options,
        Box::new(move |cc: &CreationContext| {
            Box::new(ImageAnalyzer::new(cc, policy, export_config))
        }),
    )
    .map_err(|e| anyhow!("failed to open the window: {e}"))
}
