//! FireCode CLI - Bridge interface for services
//!
//! Commands: rules, evaluate, analyze
//! Outputs JSON to stdout, logs to stderr
//! Returns 2 when a drawing is not fully compliant

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use firecode_core::{
    AnalysisConfig, BuildingType, ComplianceEngine, DetectionBundle, OverallStatus, ProjectInfo,
};

#[derive(Parser)]
#[command(name = "firecode-cli")]
#[command(about = "FireCode CLI - Fire-safety compliance for technical drawings")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the compliance rule catalog
    Rules,

    /// Evaluate recorded detections without a drawing file
    Evaluate {
        /// Detection bundle (JSON)
        #[arg(short, long)]
        detections: PathBuf,

        /// Meters per pixel; inferred from the texts when omitted
        #[arg(short, long)]
        scale: Option<f64>,
    },

    /// Run the full analysis pipeline on a drawing
    Analyze {
        /// Drawing file
        #[arg(long)]
        drawing: PathBuf,

        /// Detection bundle (JSON) replayed as detector output
        #[arg(short, long)]
        detections: PathBuf,

        #[arg(short, long, default_value = "commercial")]
        building_type: String,

        /// JSON payload (ProjectInfo)
        #[arg(short, long)]
        project: Option<String>,

        /// Analysis config (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn print_json<T: Serialize>(value: &T) -> bool {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize output");
            false
        }
    }
}

fn fail(error: impl std::fmt::Display) -> ExitCode {
    println!("{}", serde_json::json!({ "success": false, "error": error.to_string() }));
    ExitCode::FAILURE
}

fn parse_building_type(value: &str) -> Result<BuildingType, serde_json::Error> {
    serde_json::from_value(serde_json::Value::String(value.to_lowercase()))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Rules => {
            let engine = ComplianceEngine::new();
            if print_json(&engine.catalog().rules()) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }

        Commands::Evaluate { detections, scale } => {
            let bundle = match DetectionBundle::load(&detections) {
                Ok(b) => b,
                Err(e) => return fail(format!("Invalid detections: {}", e)),
            };
            if let Some(s) = scale.filter(|s| !(s.is_finite() && *s > 0.0)) {
                return fail(format!("Scale must be positive, got {}", s));
            }

            let engine = ComplianceEngine::new();
            let outcome = engine.assess(&bundle.elements, &bundle.texts, (bundle.width, bundle.height), scale);
            let compliant = outcome.issues.is_empty();

            if !print_json(&outcome) {
                return ExitCode::FAILURE;
            }
            if compliant {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }

        Commands::Analyze { drawing, detections, building_type, project, config } => {
            let building_type = match parse_building_type(&building_type) {
                Ok(t) => t,
                Err(_) => return fail(format!("Unknown building type: {}", building_type)),
            };

            let project_info: Option<ProjectInfo> = match project.as_deref().map(serde_json::from_str::<ProjectInfo>) {
                None => None,
                Some(Ok(p)) => Some(p),
                Some(Err(e)) => return fail(format!("Invalid project payload: {}", e)),
            };

            let config = match config.as_deref().map(AnalysisConfig::load) {
                None => AnalysisConfig::default(),
                Some(Ok(c)) => c,
                Some(Err(e)) => return fail(e),
            };

            let bundle = match DetectionBundle::load(&detections) {
                Ok(b) => b,
                Err(e) => return fail(format!("Invalid detections: {}", e)),
            };

            let pipeline = match bundle.into_pipeline().with_config(config) {
                Ok(p) => p,
                Err(e) => return fail(e),
            };
            let result = pipeline.run(&drawing, building_type, project_info).await;

            if !print_json(&result) {
                return ExitCode::FAILURE;
            }
            match result.overall_status {
                OverallStatus::Completed => ExitCode::SUCCESS,
                OverallStatus::NeedsRevision | OverallStatus::Failed => ExitCode::from(2),
            }
        }
    }
}
