use axum::{routing::{get, post}, Router};
use clap::Parser;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

mod hub;
mod startup;
mod v1;

use startup::{LanguageModelHandle, VisionEncoderHandle};

/// Operating mode the service settles into during startup. Resolved exactly
/// once, before the listener is bound; request handlers only ever read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceMode {
    /// No accelerator (or MOCK_INFERENCE=true); fixed diagnostic payloads only.
    Mock,
    /// All model resources acquired; handles retained for the process lifetime.
    ModelLoaded,
    /// Model loading was attempted and failed; the service stays reachable
    /// but reports unavailable on diagnosis requests.
    ModelLoadFailed,
}

#[derive(Debug)]
pub struct ServiceState {
    pub mode: ServiceMode,
    pub accelerator_available: bool,
    pub vision_encoder: Option<VisionEncoderHandle>,
    pub language_model: Option<LanguageModelHandle>,
}

impl ServiceState {
    pub fn ready(&self) -> bool {
        self.mode != ServiceMode::ModelLoadFailed
    }
}

/// How /api/train launches the fine-tuning script. Resolved once at startup.
#[derive(Debug)]
pub struct TrainingConfig {
    pub command: Vec<String>,
    pub hub_token: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ServiceState>,
    pub training: Arc<TrainingConfig>,
}

#[derive(Debug, Parser)]
#[command(name = "omni-xray-server", about = "Omni-XRay diagnosis serving shim")]
struct Args {
    /// Address to bind the HTTP listener on.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8000, env = "PORT")]
    port: u16,

    /// Command line used to launch the fine-tuning script for /api/train.
    #[arg(long, default_value = "python3 train.py")]
    train_command: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let service = startup::resolve_service_state(startup::StartupProbe::from_env()).await;
    tracing::info!(mode = ?service.mode, "startup complete");

    let training = TrainingConfig {
        command: args
            .train_command
            .split_whitespace()
            .map(str::to_string)
            .collect(),
        hub_token: std::env::var("HF_TOKEN").ok(),
    };

    let state = AppState {
        service: Arc::new(service),
        training: Arc::new(training),
    };

    // The frontend is served from another origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(v1::health_check))
        .route("/api/diagnose", post(v1::diagnose))
        .route("/api/train", post(v1::stream_training))
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listener");

    tracing::info!("Omni-XRay server starting on http://{addr}");
    tracing::info!("Available endpoints:");
    tracing::info!("  - GET  /health       - Health check");
    tracing::info!("  - POST /api/diagnose - Radiograph diagnosis (multipart image upload)");
    tracing::info!("  - POST /api/train    - Launch fine-tuning, stream logs (SSE)");

    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(mode: ServiceMode) -> ServiceState {
        ServiceState {
            mode,
            accelerator_available: false,
            vision_encoder: None,
            language_model: None,
        }
    }

    #[test]
    fn only_load_failure_makes_the_service_unready() {
        assert!(state(ServiceMode::Mock).ready());
        assert!(state(ServiceMode::ModelLoaded).ready());
        assert!(!state(ServiceMode::ModelLoadFailed).ready());
    }
}
