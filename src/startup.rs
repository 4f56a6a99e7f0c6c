//! One-shot startup resolution: probe the environment, then settle into mock
//! or real-model mode before the listener is bound. Load failures downgrade
//! the mode instead of killing the process so health checks keep passing.

use std::path::Path;

use crate::hub::HubClient;
use crate::{ServiceMode, ServiceState};

/// Feature-extraction backbone (torchvision DenseNet-121 weights on the hub).
const VISION_ENCODER_ID: &str = "timm/densenet121.tv_in1k";
/// Quantized base model; gated, requires an authenticated token.
const BASE_MODEL_ID: &str = "google/medgemma-1.5-4b-it";
/// Fine-tuned LoRA checkpoints produced by the training pipeline.
const ADAPTER_ID: &str = "hssling/MedGemma-XRay-Agent";

/// What the environment looked like at process start.
#[derive(Debug, Clone, Copy)]
pub struct StartupProbe {
    pub accelerator_available: bool,
    pub mock_override: bool,
}

impl StartupProbe {
    pub fn from_env() -> Self {
        Self {
            accelerator_available: accelerator_available(),
            mock_override: std::env::var("MOCK_INFERENCE").is_ok_and(|v| v == "true"),
        }
    }
}

fn accelerator_available() -> bool {
    Path::new("/proc/driver/nvidia/version").exists() || Path::new("/dev/nvidia0").exists()
}

/// Compute dtype used when dequantizing 4-bit weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeDtype {
    Bf16,
}

/// Fixed quantization settings that fit the 4B base model into 16GB of VRAM.
#[derive(Debug, Clone, Copy)]
pub struct QuantizationConfig {
    pub load_in_4bit: bool,
    pub double_quant: bool,
    pub compute_dtype: ComputeDtype,
}

impl QuantizationConfig {
    pub fn four_bit() -> Self {
        Self {
            load_in_4bit: true,
            double_quant: true,
            compute_dtype: ComputeDtype::Bf16,
        }
    }
}

/// Resolved vision feature-extraction model. Owned by the service for the
/// life of the process; only populated in ModelLoaded mode.
#[derive(Debug, Clone)]
pub struct VisionEncoderHandle {
    pub repo_id: String,
    pub revision: String,
}

/// Resolved quantized base model plus its fine-tuned adapter.
#[derive(Debug, Clone)]
pub struct LanguageModelHandle {
    pub base_repo_id: String,
    pub base_revision: String,
    pub adapter_repo_id: String,
    pub adapter_revision: String,
    pub quantization: QuantizationConfig,
}

/// Runs exactly once. The mock path cannot fail; the model path catches every
/// failure and downgrades to ModelLoadFailed.
pub async fn resolve_service_state(probe: StartupProbe) -> ServiceState {
    if !probe.accelerator_available || probe.mock_override {
        tracing::warn!(
            "No accelerator detected or MOCK_INFERENCE=true. Running in mock diagnostics mode."
        );
        return ServiceState {
            mode: ServiceMode::Mock,
            accelerator_available: probe.accelerator_available,
            vision_encoder: None,
            language_model: None,
        };
    }

    tracing::info!("Accelerator detected. Loading production inference environment...");
    match load_models().await {
        Ok((vision_encoder, language_model)) => {
            tracing::info!(
                "Loaded {} with adapter {}",
                language_model.base_repo_id,
                language_model.adapter_repo_id
            );
            ServiceState {
                mode: ServiceMode::ModelLoaded,
                accelerator_available: true,
                vision_encoder: Some(vision_encoder),
                language_model: Some(language_model),
            }
        }
        Err(e) => {
            // Stay up so orchestration can still reach /health; diagnosis
            // requests will get 503s.
            tracing::error!("Failed to load models: {e}");
            ServiceState {
                mode: ServiceMode::ModelLoadFailed,
                accelerator_available: true,
                vision_encoder: None,
                language_model: None,
            }
        }
    }
}

async fn load_models() -> Result<(VisionEncoderHandle, LanguageModelHandle), String> {
    let hub = HubClient::from_env();

    let vision = hub.model_info(VISION_ENCODER_ID).await?;
    let vision_encoder = VisionEncoderHandle {
        repo_id: vision.id,
        revision: vision.sha.unwrap_or_else(|| "main".to_string()),
    };

    let account = hub.whoami().await?;
    tracing::info!("Authenticated against the hub as {account}");

    let base = hub.model_info(BASE_MODEL_ID).await?;
    let adapter = hub.model_info(ADAPTER_ID).await?;

    let language_model = LanguageModelHandle {
        base_repo_id: base.id,
        base_revision: base.sha.unwrap_or_else(|| "main".to_string()),
        adapter_repo_id: adapter.id,
        adapter_revision: adapter.sha.unwrap_or_else(|| "main".to_string()),
        quantization: QuantizationConfig::four_bit(),
    };

    Ok((vision_encoder, language_model))
}
