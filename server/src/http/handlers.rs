use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use shared_types::{Config, Group, IDEMPOTENCY_HEADER, VersionRef};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{
    dto::{
        ConfigRequest, ConfigVersionsResponse, DeletedResponse, GroupRequest,
        GroupVersionsResponse, LabelsRequest, LabelsResponse,
    },
    error::{ApiError, ApiResult},
    state::AppState,
};

/// The idempotency key sent with a request, if any.
fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Rejects a request whose idempotency key was already consumed.
async fn reject_replay(state: &AppState, key: Option<&str>) -> ApiResult<()> {
    let Some(token) = key else {
        return Ok(());
    };

    if state.registry.idempotency.seen(token).await {
        warn!(idempotency_key = token, "rejecting replayed request");
        return Err(ApiError::Conflict(format!(
            "Request with idempotency key {token} was already processed"
        )));
    }
    Ok(())
}

/// Consumes the idempotency key after a successful write.
async fn consume_key(state: &AppState, key: Option<&str>) {
    let Some(token) = key else {
        return;
    };

    // The write already landed, so a failure here is not the client's error
    if let Err(e) = state.registry.idempotency.reserve(token).await {
        warn!(idempotency_key = token, error = %e, "failed to record idempotency key");
    }
}

/// POST /configs
/// Create a config with a fresh id
#[instrument(skip(state, headers, request))]
pub async fn create_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ConfigRequest>,
) -> ApiResult<(StatusCode, Json<Config>)> {
    info!("Creating config version {}", request.version);

    let key = idempotency_key(&headers);
    reject_replay(&state, key.as_deref()).await?;

    let config = state
        .registry
        .configs
        .create(request.into_config(None))
        .await?;

    consume_key(&state, key.as_deref()).await;
    Ok((StatusCode::CREATED, Json(config)))
}

/// GET /configs/:id
/// List all versions of a config
#[instrument(skip(state))]
pub async fn list_config_versions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ConfigVersionsResponse>> {
    info!("Listing versions for config {}", id);

    let versions = state.registry.configs.list_versions(&id).await?;
    if versions.is_empty() {
        return Err(ApiError::NotFound(format!("config {id} not found")));
    }

    Ok(Json(ConfigVersionsResponse { versions }))
}

/// POST /configs/:id
/// Store a new version of an existing config
#[instrument(skip(state, headers, request))]
pub async fn put_config_version(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ConfigRequest>,
) -> ApiResult<(StatusCode, Json<Config>)> {
    info!("Putting config version {}@{}", id, request.version);

    let key = idempotency_key(&headers);
    reject_replay(&state, key.as_deref()).await?;

    let config = state
        .registry
        .configs
        .put_new_version(request.into_config(Some(id)))
        .await?;

    consume_key(&state, key.as_deref()).await;
    Ok((StatusCode::CREATED, Json(config)))
}

/// GET /configs/:id/:version
/// Get a specific version of a config
#[instrument(skip(state))]
pub async fn get_config(
    State(state): State<Arc<AppState>>,
    Path((id, version)): Path<(String, String)>,
) -> ApiResult<Json<Config>> {
    info!("Getting config {}@{}", id, version);

    let config = state.registry.configs.get(&id, &version).await?;
    Ok(Json(config))
}

/// DELETE /configs/:id/:version
/// Delete a single config version
#[instrument(skip(state, headers))]
pub async fn delete_config(
    State(state): State<Arc<AppState>>,
    Path((id, version)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<DeletedResponse>> {
    info!("Deleting config {}@{}", id, version);

    let key = idempotency_key(&headers);
    reject_replay(&state, key.as_deref()).await?;

    state.registry.configs.delete(&id, &version).await?;

    consume_key(&state, key.as_deref()).await;
    let deleted = VersionRef::new(id, version);
    Ok(Json(DeletedResponse {
        message: format!("Config {deleted} deleted successfully"),
        deleted,
    }))
}

/// POST /groups
/// Create a group with a fresh id
#[instrument(skip(state, headers, request))]
pub async fn create_group(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<GroupRequest>,
) -> ApiResult<(StatusCode, Json<Group>)> {
    info!("Creating group version {}", request.version);

    let key = idempotency_key(&headers);
    reject_replay(&state, key.as_deref()).await?;

    let group = state
        .registry
        .groups
        .create_group(request.into_group(None))
        .await?;

    consume_key(&state, key.as_deref()).await;
    Ok((StatusCode::CREATED, Json(group)))
}

/// GET /groups/:id
/// List all versions of a group
#[instrument(skip(state))]
pub async fn list_group_versions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<GroupVersionsResponse>> {
    info!("Listing versions for group {}", id);

    let versions = state.registry.groups.list_group_versions(&id).await?;
    if versions.is_empty() {
        return Err(ApiError::NotFound(format!("group {id} not found")));
    }

    Ok(Json(GroupVersionsResponse { versions }))
}

/// POST /groups/:id
/// Store a new version of an existing group
#[instrument(skip(state, headers, request))]
pub async fn put_group_version(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<GroupRequest>,
) -> ApiResult<(StatusCode, Json<Group>)> {
    info!("Putting group version {}@{}", id, request.version);

    let key = idempotency_key(&headers);
    reject_replay(&state, key.as_deref()).await?;

    let group = state
        .registry
        .groups
        .put_new_group_version(request.into_group(Some(id)))
        .await?;

    consume_key(&state, key.as_deref()).await;
    Ok((StatusCode::CREATED, Json(group)))
}

/// GET /groups/:id/:version
/// Get a specific version of a group
#[instrument(skip(state))]
pub async fn get_group(
    State(state): State<Arc<AppState>>,
    Path((id, version)): Path<(String, String)>,
) -> ApiResult<Json<Group>> {
    info!("Getting group {}@{}", id, version);

    let group = state.registry.groups.get_group(&id, &version).await?;
    Ok(Json(group))
}

/// DELETE /groups/:id/:version
/// Delete a group version and every label-set indexed under it
#[instrument(skip(state, headers))]
pub async fn delete_group(
    State(state): State<Arc<AppState>>,
    Path((id, version)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<DeletedResponse>> {
    info!("Deleting group {}@{}", id, version);

    let key = idempotency_key(&headers);
    reject_replay(&state, key.as_deref()).await?;

    let removed = state
        .registry
        .groups
        .delete_group_version(&id, &version)
        .await?;

    consume_key(&state, key.as_deref()).await;
    let deleted = VersionRef::new(id, version);
    Ok(Json(DeletedResponse {
        message: format!("Group {deleted} deleted successfully ({removed} keys)"),
        deleted,
    }))
}

/// POST /groups/:id/:version/labels
/// Append label-sets to a group version
#[instrument(skip(state, headers, request))]
pub async fn add_labels(
    State(state): State<Arc<AppState>>,
    Path((id, version)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<LabelsRequest>,
) -> ApiResult<Json<LabelsResponse>> {
    info!(
        "Adding {} label-sets to group {}@{}",
        request.configs.len(),
        id,
        version
    );

    let key = idempotency_key(&headers);
    reject_replay(&state, key.as_deref()).await?;

    let configs = state
        .registry
        .groups
        .add_labels_to_group(request.configs, &id, &version)
        .await?;

    consume_key(&state, key.as_deref()).await;
    Ok(Json(LabelsResponse { configs }))
}

/// GET /groups/:id/:version/labels/:labels
/// Find label-sets of a group version matching `k1=v1&k2=v2`
#[instrument(skip(state))]
pub async fn find_labels(
    State(state): State<Arc<AppState>>,
    Path((id, version, labels)): Path<(String, String, String)>,
) -> ApiResult<Json<LabelsResponse>> {
    info!("Finding labels {} in group {}@{}", labels, id, version);

    let configs = state
        .registry
        .groups
        .find_by_label(&id, &version, &labels)
        .await?;
    Ok(Json(LabelsResponse { configs }))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "config-registry",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
