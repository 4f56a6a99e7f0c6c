use axum::{
    Json,
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use super::super::AppState;
use super::{ErrorResponse, error};

#[derive(Debug, Deserialize)]
pub struct DiagnoseParams {
    #[serde(default = "default_scan_type")]
    pub scan_type: String,
}

fn default_scan_type() -> String {
    "chest".to_string()
}

/// Highlighted region, in percent of image width/height.
#[derive(Debug, Serialize)]
pub struct BoundingBox {
    pub top: f32,
    pub left: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Serialize)]
pub struct DiagnosisResponse {
    pub overall_status: String,
    pub findings: Vec<String>,
    pub description: String,
    /// Percentage scale, not a probability.
    pub confidence: f64,
    pub bbox: Vec<BoundingBox>,
}

/// Accepts a multipart upload with a `file` image part; `scan_type` comes from
/// the query string (default "chest") and may be overridden by a form field of
/// the same name.
pub async fn diagnose(
    State(state): State<AppState>,
    Query(params): Query<DiagnoseParams>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    if !state.service.ready() {
        return Err(error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Models failed to load into VRAM. Diagnosis is unavailable on this instance.",
        ));
    }

    let mut scan_type = params.scan_type;
    let mut contents: Option<Vec<u8>> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        error(
            StatusCode::BAD_REQUEST,
            &format!("Malformed multipart body: {e}"),
        )
    })? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let bytes = field.bytes().await.map_err(|e| {
                    error(
                        StatusCode::BAD_REQUEST,
                        &format!("Failed to read uploaded file: {e}"),
                    )
                })?;
                contents = Some(bytes.to_vec());
            }
            Some("scan_type") => {
                if let Ok(value) = field.text().await {
                    scan_type = value;
                }
            }
            _ => {}
        }
    }

    let contents = contents.ok_or_else(|| {
        error(
            StatusCode::BAD_REQUEST,
            "Missing 'file' field in multipart body.",
        )
    })?;

    // A body that does not decode is a caller mistake, not a server fault.
    let image = image::load_from_memory(&contents).map_err(|_| {
        error(
            StatusCode::BAD_REQUEST,
            "Invalid Image Format. Must be decodable picture file.",
        )
    })?;

    tracing::info!(
        "Processing a {} radiograph of size {}x{}...",
        scan_type.to_uppercase(),
        image.width(),
        image.height()
    );

    // The real pipeline (resize, tensor conversion, feature extraction, prompt
    // construction, generation) hangs off the ModelLoaded handles but is not
    // wired up; every ready instance serves the fixed payloads.
    Ok((StatusCode::OK, Json(mock_diagnosis(&scan_type))))
}

fn mock_diagnosis(scan_type: &str) -> DiagnosisResponse {
    if scan_type == "chest" {
        DiagnosisResponse {
            overall_status: "Abnormal".to_string(),
            findings: vec!["Infiltration".to_string(), "Pleural Effusion".to_string()],
            description: "Bilateral lung fields demonstrate patchy opacities in the \
                mid-to-lower zones suggestive of infiltration. Blunting of the left \
                costophrenic angle indicates mild pleural effusion. The \
                cardiomediastinal silhouette is within normal limits. Trachea is midline."
                .to_string(),
            confidence: 91.5,
            bbox: vec![
                BoundingBox {
                    top: 60.0,
                    left: 70.0,
                    width: 15.0,
                    height: 10.0,
                },
                BoundingBox {
                    top: 40.0,
                    left: 30.0,
                    width: 20.0,
                    height: 20.0,
                },
            ],
        }
    } else {
        DiagnosisResponse {
            overall_status: "Abnormal".to_string(),
            findings: vec!["Fracture".to_string(), "Cortical Disruption".to_string()],
            description: "Evidence of an acute transverse fracture through the \
                diaphysis with 2mm dorsal displacement. No intra-articular extension \
                is apparent. Surrounding soft tissue swelling and joint effusion are \
                evident."
                .to_string(),
            confidence: 96.2,
            bbox: vec![BoundingBox {
                top: 45.0,
                left: 45.0,
                width: 10.0,
                height: 10.0,
            }],
        }
    }
}
