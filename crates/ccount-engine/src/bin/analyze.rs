//! Batch analysis binary.
//!
//! Usage: ccount-analyze <video> <zones.json> [output.mp4]
//!
//! Reads the zone list from a JSON file, runs one batch analysis over the
//! video, and prints the result summary as JSON on stdout.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ccount_engine::pipeline::default_output_path;
use ccount_engine::{
    AnalysisPipeline, AnalysisRequest, EngineConfig, ProgressTracker, YoloPersonDetector,
};
use ccount_models::Zone;

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("ccount=info".parse().unwrap())
        .add_directive("ort=warn".parse().unwrap())
        .add_directive("onnxruntime=warn".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    let mut args = std::env::args().skip(1);
    let (video, zones_path) = match (args.next(), args.next()) {
        (Some(video), Some(zones)) => (PathBuf::from(video), PathBuf::from(zones)),
        _ => {
            eprintln!("Usage: ccount-analyze <video> <zones.json> [output.mp4]");
            std::process::exit(2);
        }
    };
    let output = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| default_output_path(".", "run"));

    let zones: Vec<Zone> = match std::fs::read(&zones_path)
        .map_err(|e| e.to_string())
        .and_then(|bytes| serde_json::from_slice(&bytes).map_err(|e| e.to_string()))
    {
        Ok(zones) => zones,
        Err(e) => {
            error!("Failed to load zones from {}: {e}", zones_path.display());
            std::process::exit(1);
        }
    };

    let config = EngineConfig::from_env();
    info!("Engine config: {:?}", config);

    let detector = Arc::new(YoloPersonDetector::new((&config).into()));
    let pipeline = AnalysisPipeline::new(detector, ProgressTracker::new(), config);

    let request = AnalysisRequest::new(video, zones);
    match pipeline.analyze(request, &output).await {
        Ok(result) => match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                error!("Failed to serialize result: {e}");
                std::process::exit(1);
            }
        },
        Err(e) => {
            error!("Analysis failed: {e}");
            std::process::exit(1);
        }
    }
}
