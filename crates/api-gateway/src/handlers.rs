//! Request handlers

use std::sync::Arc;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use common::utils::truncate_string;
use common::{DeployRequest, DeployResponse, ModelStatus, QueryRequest, QueryResponse, UndeployResponse};
use hardware_profiler::{recommend, Recommendations, SystemResources};
use model_manager::ModelLifecycleManager;

use crate::error::{ApiError, JsonBody};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ModelLifecycleManager>,
}

impl AppState {
    /// Creates a new handler state
    pub fn new(manager: Arc<ModelLifecycleManager>) -> Self {
        Self { manager }
    }
}

/// Host resources and what they allow
#[derive(Debug, Serialize)]
pub struct SystemReport {
    pub resources: SystemResources,
    pub recommendations: Recommendations,
}

/// Starts loading a model and answers before the load finishes
pub async fn deploy(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<DeployRequest>,
) -> Result<Json<DeployResponse>, ApiError> {
    let ticket = state.manager.start_deploy(request).await?;
    Ok(Json(ticket.response()))
}

pub async fn query(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    debug!(prompt = %truncate_string(&request.prompt, 80), "Query received");
    let response = state.manager.query(&request).await?;
    Ok(Json(response))
}

pub async fn status(State(state): State<AppState>) -> Json<ModelStatus> {
    Json(state.manager.status().await)
}

pub async fn undeploy(State(state): State<AppState>) -> Result<Json<UndeployResponse>, ApiError> {
    let response = state.manager.undeploy().await?;
    Ok(Json(response))
}

/// Probes the host on a blocking thread
pub async fn system() -> Result<Json<SystemReport>, ApiError> {
    let resources = tokio::task::spawn_blocking(SystemResources::probe)
        .await
        .map_err(|e| ApiError::internal(format!("Resource probe failed: {}", e)))?;
    let recommendations = recommend(&resources);

    Ok(Json(SystemReport {
        resources,
        recommendations,
    }))
}

/// Service descriptor
pub async fn root() -> Json<Value> {
    Json(json!({
        "service": "LLM Deploy",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "deploy": "POST /deploy - Deploy a model",
            "query": "POST /query - Query the deployed model",
            "status": "GET /status - Get model status",
            "undeploy": "DELETE /undeploy - Undeploy current model",
            "system": "GET /system - Host resources and model recommendations"
        }
    }))
}
