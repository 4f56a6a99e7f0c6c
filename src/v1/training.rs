//! Launches the fine-tuning script as a managed child process and pushes its
//! merged stdout/stderr to the caller as an SSE log stream. Every stream ends
//! with an explicit `end` event carrying the child's exit code.

use std::process::Stdio;
use std::sync::Arc;

use async_stream::stream;
use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    response::sse::{Event, KeepAlive},
};
use chrono::{DateTime, Utc};
use futures::stream::Stream;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use uuid::Uuid;

use super::super::{AppState, TrainingConfig};

#[derive(Serialize)]
struct TrainingStarted {
    job_id: Uuid,
    command: String,
    started_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct TrainingLogLine {
    line: String,
}

#[derive(Serialize)]
struct TrainingFinished {
    job_id: Uuid,
    /// None when the stream ended without a child exiting normally.
    exit_code: Option<i32>,
}

pub async fn stream_training(State(state): State<AppState>) -> impl IntoResponse {
    let stream = training_events(state.training.clone());

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        axum::response::Sse::new(stream).keep_alive(KeepAlive::default()),
    )
}

fn training_events(
    config: Arc<TrainingConfig>,
) -> impl Stream<Item = Result<Event, std::io::Error>> {
    stream! {
        let job_id = Uuid::new_v4();
        let command_line = config.command.join(" ");

        yield json_event("start", &TrainingStarted {
            job_id,
            command: command_line.clone(),
            started_at: Utc::now(),
        });

        // Never spawn the trainer without hub credentials; it would only get
        // as far as its first authenticated push and die there.
        let Some(token) = config.hub_token.clone() else {
            yield json_event("log", &TrainingLogLine {
                line: "HF_TOKEN not set. Refusing to start training without hub credentials."
                    .to_string(),
            });
            yield json_event("end", &TrainingFinished { job_id, exit_code: None });
            return;
        };

        let Some((program, rest)) = config.command.split_first() else {
            yield Err(std::io::Error::other("training command is empty"));
            return;
        };

        tracing::info!(%job_id, command = %command_line, "starting training process");

        let mut child = match Command::new(program)
            .args(rest)
            .env("HF_TOKEN", token)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                yield Err(std::io::Error::other(format!(
                    "failed to spawn training process: {e}"
                )));
                return;
            }
        };

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            yield Err(std::io::Error::other(
                "training process output was not captured",
            ));
            return;
        };

        let stdout_lines = LinesStream::new(BufReader::new(stdout).lines());
        let stderr_lines = LinesStream::new(BufReader::new(stderr).lines());
        let mut lines = stdout_lines.merge(stderr_lines);

        while let Some(line) = lines.next().await {
            match line {
                Ok(line) => yield json_event("log", &TrainingLogLine { line }),
                Err(e) => {
                    yield Err(std::io::Error::other(format!(
                        "failed to read training output: {e}"
                    )));
                    return;
                }
            }
        }

        let exit_code = match child.wait().await {
            Ok(status) => status.code(),
            Err(e) => {
                yield Err(std::io::Error::other(format!(
                    "failed to reap training process: {e}"
                )));
                return;
            }
        };

        tracing::info!(%job_id, ?exit_code, "training execution finished");
        yield json_event("end", &TrainingFinished { job_id, exit_code });
    }
}

fn json_event<T: Serialize>(kind: &str, payload: &T) -> Result<Event, std::io::Error> {
    let data = serde_json::to_string(payload)
        .map_err(|e| std::io::Error::other(format!("failed to encode {kind} event: {e}")))?;
    Ok(Event::default().event(kind).data(data))
}

#[cfg(test)]
mod tests {
    use axum::{Router, body::Body, http::Request, http::StatusCode, routing::post};
    use tower::ServiceExt;

    use super::super::testutil::state_with_training;
    use super::*;

    async fn collect_sse(command: Vec<String>, hub_token: Option<String>) -> (StatusCode, String) {
        let app = Router::new()
            .route("/api/train", post(stream_training))
            .with_state(state_with_training(command, hub_token));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/train")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn streams_child_output_with_an_explicit_end() {
        let (status, text) = collect_sse(
            vec!["echo".to_string(), "hello-training".to_string()],
            Some("test-token".to_string()),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("event: start"));
        assert!(text.contains("hello-training"));
        assert!(text.contains("event: end"));
        assert!(text.contains("\"exit_code\":0"));
    }

    #[tokio::test]
    async fn merges_stderr_into_the_log_stream() {
        let (_, text) = collect_sse(
            vec![
                "sh".to_string(),
                "-c".to_string(),
                "echo out-line; echo err-line >&2".to_string(),
            ],
            Some("test-token".to_string()),
        )
        .await;

        assert!(text.contains("out-line"));
        assert!(text.contains("err-line"));
        assert!(text.contains("event: end"));
    }

    #[tokio::test]
    async fn refuses_to_start_without_a_hub_token() {
        let (status, text) =
            collect_sse(vec!["echo".to_string(), "sentinel-output".to_string()], None).await;

        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("HF_TOKEN not set"));
        assert!(text.contains("event: end"));
        assert!(text.contains("\"exit_code\":null"));
        // The child must never have run; its output would show up as a log line.
        assert!(!text.contains("\"line\":\"sentinel-output\""));
    }

    #[tokio::test]
    async fn nonzero_exit_codes_are_reported() {
        let (_, text) = collect_sse(
            vec!["sh".to_string(), "-c".to_string(), "exit 3".to_string()],
            Some("test-token".to_string()),
        )
        .await;

        assert!(text.contains("\"exit_code\":3"));
    }
}
