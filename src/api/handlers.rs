use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::models::{InstanceConfig, InstanceId, Notification};

use super::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceResponse {
    pub instance_id: InstanceId,
    /// Validated configuration, absent if registration was rejected
    pub config: Option<InstanceConfig>,
    /// Last notification delivered, absent before the first poll cycle ends
    pub latest: Option<Notification>,
}

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// List registered instance ids
pub async fn list_instances(State(state): State<AppState>) -> Json<Vec<InstanceId>> {
    Json(state.instances.ids().await)
}

/// Register (or re-register) an instance with a raw configuration
pub async fn register_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(raw): Json<Value>,
) -> AppResult<(StatusCode, Json<InstanceConfig>)> {
    let config = state.instances.register(InstanceId(id), &raw).await?;

    Ok((StatusCode::CREATED, Json(InstanceConfig::clone(&config))))
}

/// Current state of one instance
pub async fn get_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<InstanceResponse>> {
    let instance_id = InstanceId(id);
    let config = state.instances.config(&instance_id).await;
    let latest = state.latest.read().await.get(&instance_id).cloned();

    if config.is_none() && latest.is_none() {
        return Err(AppError::NotFound(format!("instance {}", instance_id)));
    }

    Ok(Json(InstanceResponse {
        instance_id,
        config: config.map(|config| InstanceConfig::clone(&config)),
        latest,
    }))
}

/// Stop polling for an instance
pub async fn delete_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let instance_id = InstanceId(id);

    if !state.instances.teardown(&instance_id).await {
        return Err(AppError::NotFound(format!("instance {}", instance_id)));
    }
    state.latest.write().await.remove(&instance_id);

    Ok(StatusCode::NO_CONTENT)
}
