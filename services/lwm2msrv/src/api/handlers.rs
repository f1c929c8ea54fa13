//! Resource API handlers
//!
//! Each read/write goes through the same [`ObjectRegistry`] dispatch the
//! LwM2M client uses, so responses mirror the CoAP result codes.

use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::Utc;
use std::collections::BTreeMap;

use common::{AppError, HealthStatus, LogLevelError, ServiceStatus, SuccessResponse};

use crate::api::dto::{
    InstanceSummary, LogLevelRequest, LogLevelResponse, ObjectSummary, ResourceDto,
    ResourceSummary, WriteRequest, WriteResult,
};
use crate::api::routes::AppState;
use crate::core::bootstrap::SERVICE_NAME;
use crate::core::lwm2m::{ReadResponse, ResponseCode, WriteResponse};

type ResourcePath = Path<(u16, u16, u16)>;

fn path_string(object_id: u16, instance_id: u16, resource_id: u16) -> String {
    format!("/{}/{}/{}", object_id, instance_id, resource_id)
}

/// GET /health
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse<HealthStatus>>, AppError> {
    let uptime_seconds: u64 = (Utc::now() - state.started_at)
        .num_seconds()
        .max(0)
        .try_into()
        .unwrap_or(0);

    let transport = state.registry.transport();
    let mut details = BTreeMap::new();
    details.insert(
        "transport".to_string(),
        serde_json::json!(transport.kind().to_string()),
    );
    details.insert(
        "endpoint".to_string(),
        serde_json::json!(transport.description()),
    );
    details.insert(
        "objects".to_string(),
        serde_json::json!(state.registry.object_ids().len()),
    );

    let health = HealthStatus {
        status: ServiceStatus::Healthy,
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        timestamp: Utc::now(),
        details,
    };

    Ok(Json(SuccessResponse::new(health)))
}

/// GET /api/v1/objects
pub async fn list_objects(
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse<Vec<ObjectSummary>>>, AppError> {
    let objects = state
        .registry
        .object_ids()
        .into_iter()
        .map(|object_id| ObjectSummary {
            object_id,
            instances: state
                .registry
                .instances(object_id)
                .iter()
                .map(|sensor| InstanceSummary {
                    instance_id: sensor.instance_id(),
                    resources: sensor
                        .resources()
                        .iter()
                        .map(|(id, spec)| ResourceSummary::new(*id, spec))
                        .collect(),
                })
                .collect(),
        })
        .collect();

    Ok(Json(SuccessResponse::new(objects)))
}

/// GET /api/v1/objects/{object_id}/{instance_id}/{resource_id}
pub async fn read_resource(
    State(state): State<AppState>,
    Path((object_id, instance_id, resource_id)): ResourcePath,
) -> Result<Json<SuccessResponse<ResourceDto>>, AppError> {
    let path = path_string(object_id, instance_id, resource_id);

    match state
        .registry
        .read(object_id, instance_id, resource_id)
        .await
    {
        ReadResponse::Content(resource) => Ok(Json(
            SuccessResponse::new(ResourceDto::new(path, &resource))
                .with_metadata("code", serde_json::json!(ResponseCode::Content.as_str())),
        )),
        ReadResponse::NotFound => Err(AppError::not_found(format!(
            "No Modbus mapping for {}",
            path
        ))),
        ReadResponse::InternalServerError(msg) => {
            Err(AppError::internal_error(format!("Read of {} failed", path)).with_details(msg))
        },
    }
}

/// PUT /api/v1/objects/{object_id}/{instance_id}/{resource_id}
pub async fn write_resource(
    State(state): State<AppState>,
    Path((object_id, instance_id, resource_id)): ResourcePath,
    Json(request): Json<WriteRequest>,
) -> Result<Json<SuccessResponse<WriteResult>>, AppError> {
    let path = path_string(object_id, instance_id, resource_id);
    let resource = request
        .into_resource(resource_id)
        .map_err(AppError::bad_request)?;

    let response = state
        .registry
        .write(object_id, instance_id, resource_id, &resource)
        .await;
    let code = response.code().to_string();

    match response {
        WriteResponse::Changed => Ok(Json(SuccessResponse::new(WriteResult { path, code }))),
        WriteResponse::NotFound => Err(AppError::not_found(format!(
            "{} is not mapped to a writable Modbus resource",
            path
        ))),
        WriteResponse::BadRequest(reason) => {
            Err(AppError::bad_request(format!("Invalid value for {}", path)).with_details(reason))
        },
        WriteResponse::InternalServerError(msg) => {
            Err(AppError::internal_error(format!("Write of {} failed", path)).with_details(msg))
        },
    }
}

/// GET /api/v1/admin/log-level
pub async fn get_log_level() -> Json<SuccessResponse<LogLevelResponse>> {
    Json(SuccessResponse::new(LogLevelResponse {
        level: common::logging::get_log_level(),
    }))
}

/// PUT /api/v1/admin/log-level
pub async fn set_log_level(
    Json(request): Json<LogLevelRequest>,
) -> Result<Json<SuccessResponse<LogLevelResponse>>, AppError> {
    common::logging::set_log_level(&request.level).map_err(|e| match e {
        LogLevelError::InvalidFilter(_) => AppError::bad_request(e.to_string()),
        LogLevelError::NotInitialized | LogLevelError::Reload(_) => {
            AppError::service_unavailable(e.to_string())
        },
    })?;
    Ok(Json(SuccessResponse::new(LogLevelResponse {
        level: request.level,
    })))
}
