use crate::store::UsageStore;
use crate::tracker::AttributionEngine;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared state for control handlers
#[derive(Clone)]
pub struct ControlState {
    pub engine: Arc<AttributionEngine>,
    pub store: Arc<UsageStore>,
    /// Cancelled by `POST /shutdown`; the shutdown sequence waits on it.
    pub shutdown: CancellationToken,
}
