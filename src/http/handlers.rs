//! Built-in endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::server::AppState;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Serialize)]
pub struct Healthcheck {
    pub status: &'static str,
    pub environment: &'static str,
    pub version: &'static str,
}

/// `GET /v1/healthcheck`
pub async fn healthcheck(State(state): State<AppState>) -> Json<Healthcheck> {
    Json(Healthcheck {
        status: "available",
        environment: state.config.environment.as_str(),
        version: VERSION,
    })
}
