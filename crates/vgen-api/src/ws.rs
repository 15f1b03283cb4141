//! WebSocket streaming of job progress with backpressure support.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::{debug, warn};

use vgen_models::{JobEvent, JobId, JobState};

use crate::error::ApiError;
use crate::metrics;
use crate::state::AppState;

/// Global counter for active WebSocket connections.
static ACTIVE_WS_CONNECTIONS: AtomicI64 = AtomicI64::new(0);

const WS_SEND_BUFFER_SIZE: usize = 32;
const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Query parameters for the job stream endpoint.
#[derive(Debug, Deserialize)]
pub struct WsJobsQuery {
    pub job_id: String,
}

/// Send a WebSocket message with backpressure handling.
async fn send_ws_message(tx: &mpsc::Sender<Message>, event: &JobEvent) -> bool {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(_) => return false,
    };
    match tx.try_send(Message::Text(json.clone())) {
        Ok(_) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            // Channel full, apply backpressure by blocking
            debug!("WebSocket send buffer full, applying backpressure");
            tx.send(Message::Text(json)).await.is_ok()
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// Translate a job snapshot into the event a late subscriber missed.
fn snapshot_event(state: JobState, job: &vgen_models::Job) -> Option<JobEvent> {
    match state {
        JobState::Completed => job
            .result
            .clone()
            .map(|result| JobEvent::done(job.id.as_str(), result)),
        JobState::Failed | JobState::TimedOut => {
            Some(JobEvent::error(job.error.clone().unwrap_or_default()))
        }
        JobState::Processing if job.progress > 0 => Some(JobEvent::progress(job.progress)),
        _ => None,
    }
}

/// GET /ws/jobs?job_id=...
///
/// Streams the job's events as JSON text frames and closes after the
/// terminal event. Unknown jobs are rejected before the upgrade.
pub async fn ws_jobs(
    ws: WebSocketUpgrade,
    Query(query): Query<WsJobsQuery>,
    State(state): State<AppState>,
) -> Response {
    let job_id = JobId::from_string(query.job_id);
    if state.tracker.get(&job_id).await.is_err() {
        return ApiError::not_found(format!("job {}", job_id)).into_response();
    }

    let count = ACTIVE_WS_CONNECTIONS.fetch_add(1, Ordering::SeqCst) + 1;
    metrics::set_ws_active_connections(count);
    metrics::record_ws_connection();

    ws.on_upgrade(move |socket| async move {
        handle_job_socket(socket, state, job_id).await;
        let count = ACTIVE_WS_CONNECTIONS.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_ws_active_connections(count);
    })
}

async fn handle_job_socket(socket: WebSocket, state: AppState, job_id: JobId) {
    let (ws_sender, mut receiver) = socket.split();

    // Bounded channel so a slow client cannot pile up frames
    let (tx, mut rx) = mpsc::channel::<Message>(WS_SEND_BUFFER_SIZE);
    let send_task = tokio::spawn(async move {
        let mut ws_sender = ws_sender;
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    // Subscribe before reading the snapshot so no event can fall between
    // the two
    let mut events = state.tracker.hub().subscribe(&job_id).await;

    let terminal_already = match state.tracker.get(&job_id).await {
        Ok(job) => {
            let terminal = job.state.is_terminal();
            if let Some(event) = snapshot_event(job.state, &job) {
                send_ws_message(&tx, &event).await;
            }
            terminal
        }
        // Deleted between upgrade and here
        Err(_) => true,
    };

    if !terminal_already {
        let mut heartbeat = interval(WS_HEARTBEAT_INTERVAL);
        heartbeat.tick().await; // immediate first tick

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            let terminal = event.is_terminal();
                            metrics::record_ws_message_sent(event.event_type().as_str());
                            if !send_ws_message(&tx, &event).await || terminal {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            // Resynchronize from the store snapshot
                            warn!(job_id = %job_id, skipped, "WebSocket receiver lagged");
                            match state.tracker.get(&job_id).await {
                                Ok(job) => {
                                    let terminal = job.state.is_terminal();
                                    if let Some(event) = snapshot_event(job.state, &job) {
                                        send_ws_message(&tx, &event).await;
                                    }
                                    if terminal {
                                        break;
                                    }
                                }
                                Err(_) => break,
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = heartbeat.tick() => {
                    if tx.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
                msg = receiver.next() => {
                    match msg {
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(_)) => break,
                        // Pongs and stray client frames are ignored
                        _ => {}
                    }
                }
            }
        }
    }

    // Close the channel; the send task flushes what is queued and closes
    // the socket
    drop(tx);
    let _ = send_task.await;
    debug!(job_id = %job_id, "WebSocket stream finished");
}
