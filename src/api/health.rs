use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::database;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub acquirer_environment: String,
    pub acquirer_configured: bool,
    /// `up`, `down` or `not_configured`
    pub database: String,
}

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let version = env!("CARGO_PKG_VERSION").to_string();

    let acquirer = state.provider.config();
    let acquirer_configured =
        !acquirer.merchant_id.is_empty() && !acquirer.secret_key.is_empty();

    let database = match &state.pool {
        Some(pool) => match database::health_check(pool).await {
            Ok(()) => "up",
            Err(_) => "down",
        },
        None => "not_configured",
    };

    let healthy = acquirer_configured && database != "down";
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        version,
        environment: state.environment.clone(),
        acquirer_environment: acquirer.environment.as_str().to_string(),
        acquirer_configured,
        database: database.to_string(),
    };

    (status, Json(response))
}
