use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crewdeck_run::{RunEvent, StartError, Supervisor};

use crate::config::Config;
use crate::crew;

#[derive(Clone)]
pub struct AppState {
	pub supervisor: Arc<Supervisor>,
	pub config: Arc<Config>,
	pub http: reqwest::Client,
}

pub fn router(supervisor: Arc<Supervisor>, config: Arc<Config>, http: reqwest::Client) -> Router {
	let static_dir = config.crew.static_dir.clone();
	let state = AppState { supervisor, config, http };

	Router::new()
		.route("/api/agents", get(get_agents).post(save_agents))
		.route("/api/tasks", get(get_tasks).post(save_tasks))
		.route("/api/topic", get(get_topic))
		.route("/api/run", post(start_run))
		.route("/api/logs", get(stream_logs))
		.route("/api/stop", post(stop_run))
		.route("/api/status", get(run_status))
		.route("/api/output", get(list_output))
		.route("/api/ping/{machine}", get(ping_machine))
		.fallback_service(ServeDir::new(static_dir).append_index_html_on_directories(true))
		.layer(CorsLayer::permissive())
		.with_state(state)
}

#[derive(Deserialize)]
struct RunRequest {
	topic: String,
}

#[derive(Deserialize)]
struct YamlPayload {
	content: String,
}

#[derive(Serialize)]
struct ActionResponse {
	message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
	error: String,
}

#[derive(Serialize)]
struct StopResponse {
	ok: bool,
	message: String,
}

#[derive(Serialize)]
struct StatusResponse {
	running: bool,
	pid: Option<u32>,
	topic: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: String) -> ApiError {
	(status, Json(ErrorResponse { error }))
}

// ── YAML config ──────────────────────────────────────────────────────────────

async fn get_agents(State(state): State<AppState>) -> Json<serde_json::Value> {
	Json(crew::read_yaml(&state.config.crew.agents_path()))
}

async fn save_agents(
	State(state): State<AppState>,
	Json(payload): Json<YamlPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
	crew::write_yaml(&state.config.crew.agents_path(), &payload.content)
		.map(|_| Json(serde_json::json!({ "ok": true })))
		.map_err(|e| api_error(StatusCode::BAD_REQUEST, e))
}

async fn get_tasks(State(state): State<AppState>) -> Json<serde_json::Value> {
	Json(crew::read_yaml(&state.config.crew.tasks_path()))
}

async fn save_tasks(
	State(state): State<AppState>,
	Json(payload): Json<YamlPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
	crew::write_yaml(&state.config.crew.tasks_path(), &payload.content)
		.map(|_| Json(serde_json::json!({ "ok": true })))
		.map_err(|e| api_error(StatusCode::BAD_REQUEST, e))
}

async fn get_topic(State(state): State<AppState>) -> Json<serde_json::Value> {
	let topic = crew::read_topic(&state.config.crew.entry_path());
	Json(serde_json::json!({ "topic": topic }))
}

// ── Run control ──────────────────────────────────────────────────────────────

async fn start_run(
	State(state): State<AppState>,
	Json(req): Json<RunRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
	// The topic is written into the entry script inside the slot's
	// critical section, after the conflict check: a rejected start must
	// leave the script exactly as it was.
	let entry = state.config.crew.entry_path();
	let topic = req.topic.clone();
	let started = state
		.supervisor
		.start_with(state.config.crew.run_spec(&req.topic), move || {
			crew::apply_topic(&entry, &topic).map_err(StartError::Materialize)
		})
		.await;

	match started {
		Ok(status) => Ok(Json(ActionResponse {
			message: format!("crew started (pid {})", status.pid),
		})),
		Err(e @ StartError::AlreadyRunning { .. }) => {
			Err(api_error(StatusCode::CONFLICT, e.to_string()))
		}
		Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
	}
}

async fn stop_run(State(state): State<AppState>) -> Json<StopResponse> {
	match state.supervisor.stop().await {
		Some(status) => Json(StopResponse {
			ok: true,
			message: format!("crew terminated (pid {})", status.pid),
		}),
		None => Json(StopResponse {
			ok: false,
			message: "no crew running".to_string(),
		}),
	}
}

async fn run_status(State(state): State<AppState>) -> Json<StatusResponse> {
	match state.supervisor.status().await {
		Some(status) => Json(StatusResponse {
			running: true,
			pid: Some(status.pid),
			topic: Some(status.topic),
		}),
		None => Json(StatusResponse { running: false, pid: None, topic: None }),
	}
}

/// One SSE `message` event per output line, then a single `exit` event
/// carrying the exit code, then EOF. Attaching with nothing running
/// yields an immediately-empty stream. Dropping the connection while the
/// run is alive terminates it (the follower's disconnect policy).
async fn stream_logs(State(state): State<AppState>) -> impl IntoResponse {
	let follower = state.supervisor.attach().await;
	let stream = async_stream::stream! {
		let Some(mut follower) = follower else { return };
		while let Some(event) = follower.next().await {
			match event {
				RunEvent::Line { text } => {
					yield Ok::<Event, Infallible>(Event::default().data(text));
				}
				RunEvent::Exited { code } => {
					let data = serde_json::json!({ "code": code }).to_string();
					yield Ok(Event::default().event("exit").data(data));
				}
			}
		}
	};

	// Proxies must not buffer the stream; lines should reach the client
	// as the crew emits them.
	(
		[("x-accel-buffering", "no")],
		Sse::new(stream).keep_alive(KeepAlive::default()),
	)
}

// ── Surroundings ─────────────────────────────────────────────────────────────

async fn list_output(State(state): State<AppState>) -> Json<serde_json::Value> {
	let files = crew::list_output(&state.config.crew.output_dir);
	Json(serde_json::json!({ "files": files }))
}

async fn ping_machine(
	State(state): State<AppState>,
	Path(machine): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let url = state
		.config
		.machines
		.get(&machine)
		.ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("unknown machine: {}", machine)))?;

	let online = state.http.get(url).send().await.is_ok();
	Ok(Json(serde_json::json!({ "online": online })))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crewdeck_run::RunSpec;
	use std::collections::HashMap;
	use std::path::Path;

	fn run_spec(topic: &str, command: &str, dir: &Path) -> RunSpec {
		RunSpec {
			topic: topic.to_string(),
			command: command.to_string(),
			dir: dir.to_path_buf(),
			env: HashMap::new(),
		}
	}

	#[tokio::test]
	async fn rejected_start_leaves_entry_script_untouched() {
		let dir = std::env::temp_dir().join("crewdeck-api-test-conflict-topic");
		let _ = std::fs::create_dir_all(&dir);
		let entry = dir.join("main.py");
		std::fs::write(&entry, "inputs = {\n    'topic': 'Original Topic'\n}\n").unwrap();

		let sup = Supervisor::new();
		sup.start(run_spec("busy", "sleep 60", &dir)).await.unwrap();

		let entry_for_prepare = entry.clone();
		let err = sup
			.start_with(run_spec("intruder", "sleep 60", &dir), move || {
				crew::apply_topic(&entry_for_prepare, "Hijacked Topic")
					.map_err(StartError::Materialize)
			})
			.await
			.unwrap_err();

		assert!(matches!(err, StartError::AlreadyRunning { .. }));
		assert_eq!(crew::read_topic(&entry), "Original Topic");

		sup.stop().await;
		let _ = std::fs::remove_dir_all(&dir);
	}
}
