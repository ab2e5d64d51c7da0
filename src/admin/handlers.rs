use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::server::AppState;
use crate::resilience::{BreakerSnapshot, CircuitStatus};
use crate::routing::Route;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub routes: usize,
    pub migrated_routes: usize,
    pub breakers: usize,
    pub open_breakers: usize,
}

#[derive(Debug, Serialize)]
pub struct RoutingView {
    pub total: usize,
    pub migrated: usize,
    pub routes: Vec<Route>,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let routes = state.dispatcher.routes();
    let snapshots = state.dispatcher.breakers().snapshots();
    let open = snapshots
        .iter()
        .filter(|s| s.status != CircuitStatus::Closed)
        .count();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if open == 0 { "operational" } else { "degraded" },
        uptime_secs: state.started_at.elapsed().as_secs(),
        routes: routes.len(),
        migrated_routes: routes.migrated_count(),
        breakers: snapshots.len(),
        open_breakers: open,
    })
}

pub async fn get_breakers(State(state): State<AppState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.dispatcher.breakers().snapshots())
}

pub async fn get_routes(State(state): State<AppState>) -> Json<RoutingView> {
    let table = state.dispatcher.routes();
    Json(RoutingView {
        total: table.len(),
        migrated: table.migrated_count(),
        routes: table.routes().to_vec(),
    })
}
