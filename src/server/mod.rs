//! HTTP control surface over the attribution engine.

mod handlers;
mod router;
mod state;

pub use router::create_router;
pub use state::ControlState;

use crate::error::{TrackerError, TrackerResult};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::{error, info};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

impl IntoResponse for TrackerError {
    fn into_response(self) -> Response {
        error!("Control request failed: {self}");
        let body = json!({ "status": "error", "message": self.to_string() });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

/// Serves the control surface until `stop` is cancelled, letting in-flight
/// requests finish.
pub async fn serve(
    listener: TcpListener,
    state: ControlState,
    stop: CancellationToken,
) -> TrackerResult<()> {
    let addr = listener.local_addr()?;
    info!("Control surface listening on http://{addr}");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { stop.cancelled().await })
        .await?;

    info!("Control surface stopped");
    Ok(())
}
