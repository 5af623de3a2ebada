use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub backends: usize,
    pub alive: usize,
}

#[derive(Debug, Serialize)]
pub struct BackendStatus {
    pub url: String,
    pub address: String,
    pub alive: bool,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let alive = state.pool.alive_count();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if alive > 0 { "operational" } else { "unavailable" },
        backends: state.pool.len(),
        alive,
    })
}

pub async fn get_backends(State(state): State<AdminState>) -> Json<Vec<BackendStatus>> {
    let statuses = state
        .pool
        .backends()
        .iter()
        .map(|b| BackendStatus {
            url: b.url().to_string(),
            address: b.identity().to_string(),
            alive: b.is_alive(),
        })
        .collect();
    Json(statuses)
}
