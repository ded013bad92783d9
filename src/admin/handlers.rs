use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::resilience::{BreakerState, DependencySnapshot};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub dependencies: usize,
    pub open_circuits: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let snapshots = state.registry.snapshots();
    let open_circuits = snapshots
        .iter()
        .filter(|s| s.circuit_breaker.state == BreakerState::Open)
        .count();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if open_circuits == 0 { "operational" } else { "degraded" },
        uptime_secs: state.started_at.elapsed().as_secs(),
        dependencies: snapshots.len(),
        open_circuits,
    })
}

pub async fn get_dependencies(State(state): State<AdminState>) -> Json<Vec<DependencySnapshot>> {
    Json(state.registry.snapshots())
}

pub async fn get_dependency(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<DependencySnapshot>, StatusCode> {
    state
        .registry
        .get(&name)
        .map(|guard| Json(guard.snapshot()))
        .ok_or(StatusCode::NOT_FOUND)
}
