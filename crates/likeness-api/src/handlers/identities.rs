use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use likeness_core::constants::UNCATEGORIZED_GROUP;
use likeness_core::models::{Identity, SetPrimaryRequest};
use likeness_core::AppError;
use likeness_db::DeleteOutcome;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UsernameQuery {
    /// Limit results to one profile
    pub instagram_username: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PrimaryResponse {
    pub primary: Option<Identity>,
}

fn required_username(raw: Option<&str>) -> Result<&str, AppError> {
    raw.map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AppError::InvalidInput("Instagram username is required".to_string()))
}

/// List identities, newest first
#[utoipa::path(
    get,
    path = "/api/identities",
    tag = "identities",
    params(UsernameQuery),
    responses(
        (status = 200, description = "Identities", body = [Identity]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn list_identities(
    Query(query): Query<UsernameQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Identity>>, HttpAppError> {
    let username = query
        .instagram_username
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty());
    let identities = state.identities.list(username).await?;
    Ok(Json(identities))
}

/// Delete an identity
///
/// Failed identities are kept and answer 409.
#[utoipa::path(
    delete,
    path = "/api/identities/{id}",
    tag = "identities",
    params(
        ("id" = Uuid, Path, description = "Identity ID")
    ),
    responses(
        (status = 204, description = "Identity deleted"),
        (status = 404, description = "Identity not found", body = ErrorResponse),
        (status = 409, description = "Failed identities cannot be deleted", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(identity_id = %id, operation = "delete_identity"))]
pub async fn delete_identity(
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, HttpAppError> {
    match state.identities.delete(id).await? {
        DeleteOutcome::Deleted => Ok(StatusCode::NO_CONTENT),
        DeleteOutcome::NotFound => {
            Err(AppError::NotFound("Identity not found".to_string()).into())
        }
        DeleteOutcome::Retained => Err(AppError::Conflict(
            "Failed identities are kept and cannot be deleted".to_string(),
        )
        .into()),
    }
}

/// Make an identity the profile's primary
#[utoipa::path(
    put,
    path = "/api/identities/{id}/primary",
    tag = "identities",
    params(
        ("id" = Uuid, Path, description = "Identity ID")
    ),
    request_body = SetPrimaryRequest,
    responses(
        (status = 200, description = "Primary updated", body = Identity),
        (status = 400, description = "Missing or uncategorized username", body = ErrorResponse),
        (status = 404, description = "Identity does not belong to this profile", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(identity_id = %id, operation = "set_primary"))]
pub async fn set_primary(
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<SetPrimaryRequest>,
) -> Result<Json<Identity>, HttpAppError> {
    let username = required_username(Some(request.instagram_username.as_str()))?;
    if username.eq_ignore_ascii_case(UNCATEGORIZED_GROUP) {
        return Err(AppError::InvalidInput(
            "Uncategorized identities cannot be set as primary".to_string(),
        )
        .into());
    }

    if !state.identities.set_primary(username, id).await? {
        return Err(AppError::NotFound("Identity not found for this profile".to_string()).into());
    }

    let identity = state
        .identities
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Identity not found".to_string()))?;
    tracing::info!(username = %username, "Primary identity updated");
    Ok(Json(identity))
}

/// Current primary identity of a profile
#[utoipa::path(
    get,
    path = "/api/identities/primary",
    tag = "identities",
    params(UsernameQuery),
    responses(
        (status = 200, description = "Primary identity, if any", body = PrimaryResponse),
        (status = 400, description = "Missing username", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn get_primary(
    Query(query): Query<UsernameQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<PrimaryResponse>, HttpAppError> {
    let username = required_username(query.instagram_username.as_deref())?;
    let primary = state.identities.get_primary(username).await?;
    Ok(Json(PrimaryResponse { primary }))
}
