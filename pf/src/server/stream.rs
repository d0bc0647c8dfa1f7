//! SSE progress streaming
//!
//! A stream over a pending plan drives the pipeline itself and relays stage
//! updates as they happen. A stream over a plan in any other state observes:
//! it polls the store and reports rank advances, so reconnecting clients and
//! secondary tabs follow a run owned elsewhere. Either way the stream ends
//! with exactly one terminal event.

use std::convert::Infallible;
use std::time::Duration;

use async_stream::stream;
use axum::{
    extract::{Path, State},
    http::{HeaderName, header},
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::{Stream, StreamExt};
use planstore::{Plan, PlanStatus};
use serde_json::json;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{info, warn};

use crate::pipeline::run_pipeline;
use crate::progress::{
    CONNECTING, NOT_FOUND_MESSAGE, StatusMessage, TIMEOUT_MESSAGE, progress_channel,
    status_message,
};

use super::AppState;

/// One event on a plan's progress stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Stage update
    Status(StatusMessage),
    /// The plan finished; the document is ready to fetch
    Complete { plan_id: String },
    /// The plan failed or cannot be streamed
    Error { message: String },
}

impl StreamEvent {
    fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    fn into_sse(self) -> Event {
        let (name, data) = self.into_parts();
        Event::default().event(name).data(data.to_string())
    }

    /// Event name and JSON payload for the wire
    fn into_parts(self) -> (&'static str, serde_json::Value) {
        match self {
            Self::Status(status) => (
                "status",
                json!({
                    "etapa": status.etapa,
                    "modelo": status.modelo,
                    "mensagem": status.mensagem,
                }),
            ),
            Self::Complete { plan_id } => (
                "complete",
                json!({
                    "plan_id": plan_id,
                    "result_location": format!("/api/plans/{}/document", plan_id),
                    "mensagem": status_message(PlanStatus::Completed).mensagem,
                }),
            ),
            Self::Error { message } => ("error", json!({"error": message})),
        }
    }
}

/// GET /api/stream/:plan_id
pub async fn stream_plan(
    State(app): State<AppState>,
    Path(plan_id): Path<String>,
) -> impl IntoResponse {
    info!(plan_id = %plan_id, "Stream opened");
    let events = plan_events(app, plan_id).map(|event| Ok::<_, Infallible>(event.into_sse()));
    let sse = Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)));
    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        sse,
    )
}

/// Event sequence for one plan, from connection to terminal event
fn plan_events(app: AppState, plan_id: String) -> impl Stream<Item = StreamEvent> {
    stream! {
        yield StreamEvent::Status(CONNECTING);

        let plan = match app.state.get_plan(&plan_id).await {
            Ok(Some(plan)) => plan,
            Ok(None) => {
                yield StreamEvent::error(NOT_FOUND_MESSAGE);
                return;
            }
            Err(err) => {
                warn!(plan_id = %plan_id, error = %err, "Plan lookup failed");
                yield StreamEvent::error(NOT_FOUND_MESSAGE);
                return;
            }
        };

        let mut last_rank = plan.status.rank();

        if plan.status == PlanStatus::Pending {
            // Driver mode: this connection owns the run.
            yield StreamEvent::Status(status_message(PlanStatus::Pending));

            let (progress, mut progress_rx) = progress_channel();
            let ctx = app.pipeline_context(progress);
            let driven_id = plan_id.clone();
            let mut run = tokio::spawn(async move { run_pipeline(&ctx, &driven_id).await });

            let mut watchdog = interval(Duration::from_millis(app.stream.watch_interval_ms));
            watchdog.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                // Biased so queued stage updates drain before the watchdog
                // polls the store, which could already be further along.
                let advanced: Option<PlanStatus> = tokio::select! {
                    biased;
                    received = progress_rx.recv() => match received {
                        Some(status) if !status.is_terminal() => Some(status),
                        Some(_) => None,
                        None => {
                            if let Err(err) = (&mut run).await {
                                warn!(plan_id = %plan_id, error = %err, "Pipeline task aborted");
                            }
                            break;
                        }
                    },
                    joined = &mut run => {
                        if let Err(err) = joined {
                            warn!(plan_id = %plan_id, error = %err, "Pipeline task aborted");
                        }
                        break;
                    }
                    _ = watchdog.tick() => match app.state.get_plan(&plan_id).await {
                        Ok(Some(current)) if !current.status.is_terminal() => Some(current.status),
                        _ => None,
                    },
                };

                if let Some(status) = advanced {
                    if status.rank() > last_rank {
                        last_rank = status.rank();
                        yield StreamEvent::Status(status_message(status));
                    }
                }
            }

            // The run can finish before its last stage updates are read;
            // drain them so the client sees every rung.
            while let Ok(status) = progress_rx.try_recv() {
                if !status.is_terminal() && status.rank() > last_rank {
                    last_rank = status.rank();
                    yield StreamEvent::Status(status_message(status));
                }
            }

            match app.state.get_plan(&plan_id).await {
                Ok(Some(finished)) => {
                    if let Some(event) = terminal_event(&app, &finished).await {
                        yield event;
                        return;
                    }
                    // Another worker took the plan over; fall back to observing.
                    if finished.status.rank() > last_rank {
                        last_rank = finished.status.rank();
                        yield StreamEvent::Status(status_message(finished.status));
                    }
                }
                _ => {
                    yield StreamEvent::error(NOT_FOUND_MESSAGE);
                    return;
                }
            }
        } else {
            if let Some(event) = terminal_event(&app, &plan).await {
                yield event;
                return;
            }
            yield StreamEvent::Status(status_message(plan.status));
        }

        // Observer mode: poll the store until the plan settles or the
        // polling window runs out.
        let mut attempts: u32 = 0;
        loop {
            if attempts >= app.stream.max_attempts {
                yield timeout_event(&app, &plan_id).await;
                return;
            }
            sleep(Duration::from_millis(app.stream.poll_interval_ms)).await;
            attempts += 1;

            let current = match app.state.get_plan(&plan_id).await {
                Ok(Some(current)) => current,
                Ok(None) => {
                    yield StreamEvent::error(NOT_FOUND_MESSAGE);
                    return;
                }
                Err(err) => {
                    warn!(plan_id = %plan_id, error = %err, "Plan poll failed");
                    continue;
                }
            };

            if let Some(event) = terminal_event(&app, &current).await {
                yield event;
                return;
            }
            if current.status.rank() > last_rank {
                last_rank = current.status.rank();
                yield StreamEvent::Status(status_message(current.status));
            }
        }
    }
}

/// Terminal event for a plan, if it has settled
///
/// A plan stuck in `finalising` with its document persisted lost its driver
/// between the document write and the completion write; flip it to completed
/// here and report success.
async fn terminal_event(app: &AppState, plan: &Plan) -> Option<StreamEvent> {
    match plan.status {
        PlanStatus::Completed => Some(StreamEvent::Complete {
            plan_id: plan.id.clone(),
        }),
        PlanStatus::Failed => {
            let message = plan
                .error_message
                .clone()
                .unwrap_or_else(|| status_message(PlanStatus::Failed).mensagem.to_string());
            Some(StreamEvent::error(message))
        }
        PlanStatus::Finalising if plan.final_document.is_some() => {
            recover_orphaned(app, &plan.id).await
        }
        _ => None,
    }
}

/// Complete an orphaned plan, sealing it with the summed usage cost
async fn recover_orphaned(app: &AppState, plan_id: &str) -> Option<StreamEvent> {
    let total_cost = match app.state.total_cost(plan_id).await {
        Ok(cost) => cost,
        Err(err) => {
            warn!(plan_id = %plan_id, error = %err, "Cost lookup failed during recovery");
            return None;
        }
    };
    match app.state.complete_if_finalising(plan_id, total_cost).await {
        Ok(true) => {
            info!(plan_id = %plan_id, cost_eur = total_cost, "Recovered orphaned plan");
            Some(StreamEvent::Complete {
                plan_id: plan_id.to_string(),
            })
        }
        Ok(false) => None,
        Err(err) => {
            warn!(plan_id = %plan_id, error = %err, "Recovery failed");
            None
        }
    }
}

/// Give up on a plan that outlived the polling window
///
/// The guarded flip loses to a run that settled between our last poll and
/// now; in that case report the actual terminal state instead.
async fn timeout_event(app: &AppState, plan_id: &str) -> StreamEvent {
    match app.state.fail_if_in_flight(plan_id, TIMEOUT_MESSAGE).await {
        Ok(true) => {
            warn!(plan_id = %plan_id, "Plan timed out");
            StreamEvent::error(TIMEOUT_MESSAGE)
        }
        Ok(false) => match app.state.get_plan(plan_id).await {
            Ok(Some(plan)) => terminal_event(app, &plan)
                .await
                .unwrap_or_else(|| StreamEvent::error(TIMEOUT_MESSAGE)),
            _ => StreamEvent::error(TIMEOUT_MESSAGE),
        },
        Err(err) => {
            warn!(plan_id = %plan_id, error = %err, "Timeout flip failed");
            StreamEvent::error(TIMEOUT_MESSAGE)
        }
    }
}
