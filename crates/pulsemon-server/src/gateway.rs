use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use pulsemon_common::types::{
    ActiveAlert, ComponentHealth, HealthStatus, PredictedIssue, TrendReport,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

/// Messages pushed to every connected observer.
///
/// Delivery is at-most-once, latest-state-wins: a slow observer that falls
/// behind the broadcast channel skips the missed messages and resumes with
/// current state. Nothing is replayed on reconnect.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    HealthUpdate {
        components: Vec<ComponentHealth>,
        overall: HealthStatus,
        timestamp: DateTime<Utc>,
    },
    NewAlert {
        alert: ActiveAlert,
    },
    AlertAcknowledged {
        id: String,
        who: String,
        at: DateTime<Utc>,
    },
    ForecastUpdate {
        issues: Vec<PredictedIssue>,
        timestamp: DateTime<Utc>,
    },
    /// Internal pipeline failures, surfaced so observers can distinguish a
    /// broken monitor from a healthy system.
    PipelineError {
        component: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

/// Requests an observer may send over its socket. Replies go to that
/// observer only.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObserverRequest {
    AcknowledgeAlert {
        id: String,
        who: String,
    },
    GetTrends {
        #[serde(default)]
        metrics: Vec<String>,
    },
    GetForecasts {
        horizon_hours: Option<f64>,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObserverReply {
    AckResult { id: String, success: bool },
    Trends { trends: Vec<TrendReport> },
    Forecasts { issues: Vec<PredictedIssue> },
    Error { message: String },
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_observer(socket, state))
}

/// Serves one observer connection: forwards broadcast pushes and answers
/// pull requests until the peer disconnects.
async fn handle_observer(socket: WebSocket, state: AppState) {
    let mut rx = state.broadcast.subscribe();
    let (mut sink, mut stream) = socket.split();

    // Greet the new observer with current state so it does not have to
    // wait for the next tick.
    let (components, overall) = state.compute_health();
    let hello = PushMessage::HealthUpdate {
        components,
        overall,
        timestamp: Utc::now(),
    };
    if send_json(&mut sink, &hello).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            pushed = rx.recv() => {
                match pushed {
                    Ok(message) => {
                        if send_json(&mut sink, &message).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Observer lagging, skipping missed updates");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_request(&state, &text);
                        if send_json(&mut sink, &reply).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ping/pong/binary ignored
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "Observer socket error");
                        break;
                    }
                }
            }
        }
    }
    // Dropping the receiver removes the observer; no buffering of missed
    // updates is attempted.
}

fn handle_request(state: &AppState, text: &str) -> ObserverReply {
    let request: ObserverRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(e) => {
            return ObserverReply::Error {
                message: format!("malformed request: {e}"),
            }
        }
    };

    match request {
        ObserverRequest::AcknowledgeAlert { id, who } => {
            let success = state.acknowledge_alert(&id, &who).is_some();
            ObserverReply::AckResult { id, success }
        }
        ObserverRequest::GetTrends { metrics } => ObserverReply::Trends {
            trends: state.compute_trends(&metrics),
        },
        ObserverRequest::GetForecasts { horizon_hours } => ObserverReply::Forecasts {
            issues: state.compute_forecasts(horizon_hours),
        },
    }
}

async fn send_json<S, T>(sink: &mut S, value: &T) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
    T: Serialize,
{
    let text = match serde_json::to_string(value) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize gateway message");
            return Ok(());
        }
    };
    sink.send(Message::Text(text)).await.map_err(|_| ())
}
