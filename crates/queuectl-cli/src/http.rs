//! Minimal HTTP surface mirroring the CLI's own operations.
//!
//! Every handler is a direct call into the `Scheduler`; no additional
//! invariant lives in this module.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path as AxPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use queuectl_core::{EnqueueRequest, JobFilter, JobState, QueueError, Scheduler};
use queuectl_executor::{log_path, WorkerPool};
use queuectl_store::SqliteStore;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

#[derive(Clone)]
struct AppState {
    scheduler: Arc<Scheduler<SqliteStore>>,
    data_dir: PathBuf,
}

pub async fn serve(scheduler: Scheduler<SqliteStore>, data_dir: PathBuf, bind: &str) -> Result<()> {
    let state = AppState {
        scheduler: Arc::new(scheduler),
        data_dir,
    };

    let app = Router::new()
        .route("/enqueue", post(enqueue))
        .route("/jobs", get(list_jobs))
        .route("/status", get(status))
        .route("/dlq", get(list_dlq))
        .route("/dlq/retry/:id", post(retry_dlq))
        .route("/config", get(config_get).post(config_set))
        .route("/workers/start", post(workers_start))
        .route("/workers/stop", post(workers_stop))
        .route("/logs/:id", get(job_log))
        .route("/metrics", get(metrics))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(bind, "queuectl HTTP surface listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn queue_error_response(err: QueueError) -> (StatusCode, Json<Value>) {
    let code = match err {
        QueueError::DuplicateId(_) | QueueError::Validation(_) => StatusCode::BAD_REQUEST,
        QueueError::NotFound(_) => StatusCode::NOT_FOUND,
        QueueError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (code, Json(json!({"status": "error", "error": err.to_string()})))
}

async fn enqueue(State(state): State<AppState>, Json(req): Json<EnqueueRequest>) -> impl IntoResponse {
    let id = req.id.clone();
    match state.scheduler.enqueue(req).await {
        Ok(()) => (StatusCode::CREATED, Json(json!({"status": "success", "job_id": id}))).into_response(),
        Err(e) => queue_error_response(e).into_response(),
    }
}

#[derive(Deserialize)]
struct StateQuery {
    state: Option<String>,
}

async fn list_jobs(State(state): State<AppState>, Query(q): Query<StateQuery>) -> impl IntoResponse {
    let filter = match q.state.as_deref() {
        None | Some("any") => JobFilter::Any,
        Some(raw) => match raw.parse::<JobState>() {
            Ok(s) => JobFilter::State(s),
            Err(e) => return (StatusCode::BAD_REQUEST, Json(json!({"status": "error", "error": e}))).into_response(),
        },
    };
    match state.scheduler.list_jobs(filter).await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(e) => queue_error_response(e).into_response(),
    }
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    match state.scheduler.snapshot_status().await {
        Ok(snap) => Json(snap).into_response(),
        Err(e) => queue_error_response(e).into_response(),
    }
}

async fn list_dlq(State(state): State<AppState>) -> impl IntoResponse {
    match state.scheduler.list_dlq().await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => queue_error_response(e).into_response(),
    }
}

async fn retry_dlq(State(state): State<AppState>, AxPath(id): AxPath<String>) -> impl IntoResponse {
    match state.scheduler.retry_from_dlq(&id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({"status": "success", "message": format!("DLQ job {id} retried")})),
        )
            .into_response(),
        Err(e) => queue_error_response(e).into_response(),
    }
}

#[derive(Deserialize)]
struct ConfigKeyQuery {
    key: String,
}

async fn config_get(State(state): State<AppState>, Query(q): Query<ConfigKeyQuery>) -> impl IntoResponse {
    match state.scheduler.config_get(&q.key).await {
        Ok(val) => Json(json!({ (q.key.clone()): val })).into_response(),
        Err(e) => queue_error_response(e).into_response(),
    }
}

#[derive(Deserialize)]
struct ConfigSetBody {
    key: String,
    value: String,
}

async fn config_set(State(state): State<AppState>, Json(body): Json<ConfigSetBody>) -> impl IntoResponse {
    match state.scheduler.config_set(&body.key, &body.value).await {
        Ok(()) => Json(json!({"status": "updated", (body.key.clone()): body.value})).into_response(),
        Err(e) => queue_error_response(e).into_response(),
    }
}

#[derive(Deserialize, Default)]
struct StartWorkersBody {
    count: Option<usize>,
}

async fn workers_start(State(state): State<AppState>, body: Option<Json<StartWorkersBody>>) -> impl IntoResponse {
    let count = body.map(|Json(b)| b.count.unwrap_or(1)).unwrap_or(1).max(1);

    if let Err(e) = state.scheduler.config_set("stop", "0").await {
        return queue_error_response(e).into_response();
    }

    let exe = match std::env::current_exe() {
        Ok(e) => e,
        Err(e) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"status": "error", "error": e.to_string()})))
                .into_response()
        }
    };
    let worker_args = crate::worker_args(&state.data_dir);

    match WorkerPool::start(count, &exe, &worker_args) {
        Ok(pool) => {
            tokio::task::spawn_blocking(move || {
                if let Err(e) = pool.join() {
                    error!(error = %e, "worker pool join failed");
                }
            });
            (StatusCode::OK, Json(json!({"status": "started", "workers": count}))).into_response()
        }
        Err(e) => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"status": "error", "error": e.to_string()}))).into_response()
        }
    }
}

async fn workers_stop(State(state): State<AppState>) -> impl IntoResponse {
    match state.scheduler.stop_pool().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({"status": "stopping", "message": "Workers will stop after current job"})),
        )
            .into_response(),
        Err(e) => queue_error_response(e).into_response(),
    }
}

async fn job_log(State(state): State<AppState>, AxPath(id): AxPath<String>) -> impl IntoResponse {
    let path = log_path(&state.data_dir, &id);
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Json(json!({"job_id": id, "log": content})).into_response(),
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("No log found for job {id}")})),
        )
            .into_response(),
    }
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.scheduler.snapshot_status().await {
        Ok(snap) => {
            let dlq_count = state.scheduler.list_dlq().await.map(|v| v.len() as i64).unwrap_or(0);
            let total = snap.pending + snap.processing + snap.completed + dlq_count;
            let success_rate = if total > 0 {
                (snap.completed as f64 / total as f64) * 100.0
            } else {
                0.0
            };
            Json(json!({
                "total_jobs": total,
                "completed_jobs": snap.completed,
                "pending_jobs": snap.pending,
                "failed_jobs": dlq_count,
                "success_rate": format!("{success_rate:.2}%"),
                "active_workers": !snap.stop_flag,
            }))
            .into_response()
        }
        Err(e) => queue_error_response(e).into_response(),
    }
}
