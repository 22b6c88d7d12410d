//! Resource CRUD and search endpoints.
//!
//! One route tree serves every resource type. User-data types resolve to
//! their session-scoped provider; conformance types are served read-only
//! from the startup registry.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::{json, Value};

use crate::context::AccessTokenContext;
use crate::error::ApiError;
use crate::fhir::{bundle, Resource, ResourceType};
use crate::provider::{MethodOutcome, ResourceProvider};
use crate::search::{self, SearchQuery};
use crate::server::AppState;

type MaybeContext = Option<Extension<AccessTokenContext>>;

fn parse_type(raw: &str) -> Result<ResourceType, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::not_found(format!("Unknown resource type: {}", raw)))
}

fn require_context(ctx: MaybeContext) -> Result<AccessTokenContext, ApiError> {
    ctx.map(|Extension(ctx)| ctx)
        .ok_or_else(|| ApiError::unauthorized("No valid session - authentication required"))
}

fn user_provider(state: &AppState, resource_type: ResourceType) -> Result<&ResourceProvider, ApiError> {
    state
        .provider(resource_type)
        .ok_or_else(|| ApiError::internal(format!("No provider for {}", resource_type)))
}

fn apply_typed_filter(
    resource_type: ResourceType,
    resources: Vec<Resource>,
    query: &SearchQuery,
) -> Vec<Resource> {
    match resource_type {
        ResourceType::Patient => search::patient::filter(resources, query),
        ResourceType::Observation => search::observation::filter(resources, query),
        ResourceType::QuestionnaireResponse => {
            search::questionnaire_response::filter(resources, query)
        }
        _ => search::conformance::filter(resource_type, resources, query),
    }
}

/// GET /fhir/:type - search with the type's declared parameters.
pub async fn search_type(
    State(state): State<AppState>,
    Path(raw_type): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
    ctx: MaybeContext,
) -> Result<Response, ApiError> {
    let resource_type = parse_type(&raw_type)?;
    let query = SearchQuery::from_pairs(pairs);

    let results = if resource_type.is_user_data() {
        let ctx = require_context(ctx)?;
        let provider = user_provider(&state, resource_type)?;
        match query.first("_id") {
            Some(id) => provider.search_by_id(&ctx, id)?,
            None => provider.search_all(&ctx)?,
        }
    } else {
        state.registry.all(resource_type)
    };

    let filtered = apply_typed_filter(resource_type, results, &query);
    Ok(Json(bundle::searchset(filtered)).into_response())
}

/// POST /fhir/:type - create with a server-assigned id.
pub async fn create(
    State(state): State<AppState>,
    Path(raw_type): Path<String>,
    ctx: MaybeContext,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let resource_type = parse_type(&raw_type)?;
    if !resource_type.is_user_data() {
        return Err(ApiError::not_supported(format!(
            "create is not supported for {}",
            resource_type
        )));
    }

    let ctx = require_context(ctx)?;
    let outcome = user_provider(&state, resource_type)?.create(&ctx, body).await?;

    Ok(created_response(resource_type, outcome))
}

fn created_response(resource_type: ResourceType, outcome: MethodOutcome) -> Response {
    let location = format!(
        "/fhir/{}/{}/_history/{}",
        resource_type, outcome.id, outcome.version
    );
    (
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(outcome.resource.into_value()),
    )
        .into_response()
}

/// GET /fhir/:type/:id - read the latest version.
pub async fn read(
    State(state): State<AppState>,
    Path((raw_type, id)): Path<(String, String)>,
    ctx: MaybeContext,
) -> Result<Response, ApiError> {
    let resource_type = parse_type(&raw_type)?;

    let resource = if resource_type.is_user_data() {
        let ctx = require_context(ctx)?;
        user_provider(&state, resource_type)?.read(&ctx, &id, None)?
    } else {
        state.registry.get(resource_type, &id).ok_or_else(|| {
            ApiError::not_found(format!("{}/{} not found", resource_type, id))
        })?
    };

    Ok(Json(resource.into_value()).into_response())
}

/// GET /fhir/:type/:id/_history/:version - read an explicit version.
pub async fn vread(
    State(state): State<AppState>,
    Path((raw_type, id, raw_version)): Path<(String, String, String)>,
    ctx: MaybeContext,
) -> Result<Response, ApiError> {
    let resource_type = parse_type(&raw_type)?;
    if !resource_type.is_user_data() {
        return Err(ApiError::not_supported(format!(
            "vread is not supported for {}",
            resource_type
        )));
    }

    let version: u64 = raw_version.parse().map_err(|_| {
        ApiError::not_found(format!(
            "{}/{}/_history/{} not found",
            resource_type, id, raw_version
        ))
    })?;

    let ctx = require_context(ctx)?;
    let resource = user_provider(&state, resource_type)?.read(&ctx, &id, Some(version))?;
    Ok(Json(resource.into_value()).into_response())
}

/// PUT /fhir/:type/:id - update, creating version 1 for unknown ids.
pub async fn update(
    State(state): State<AppState>,
    Path((raw_type, id)): Path<(String, String)>,
    ctx: MaybeContext,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let resource_type = parse_type(&raw_type)?;
    if !resource_type.is_user_data() {
        return Err(ApiError::not_supported(format!(
            "update is not supported for {}",
            resource_type
        )));
    }

    let ctx = require_context(ctx)?;
    let outcome = user_provider(&state, resource_type)?.update(&ctx, &id, body).await?;
    Ok(Json(outcome.resource.into_value()).into_response())
}

/// DELETE /fhir/:type/:id - tombstone the id.
pub async fn delete(
    State(state): State<AppState>,
    Path((raw_type, id)): Path<(String, String)>,
    ctx: MaybeContext,
) -> Result<Response, ApiError> {
    let resource_type = parse_type(&raw_type)?;
    if !resource_type.is_user_data() {
        return Err(ApiError::not_supported(format!(
            "delete is not supported for {}",
            resource_type
        )));
    }

    let ctx = require_context(ctx)?;
    user_provider(&state, resource_type)?.delete(&ctx, &id).await?;

    Ok(Json(json!({
        "resourceType": "OperationOutcome",
        "issue": [{
            "severity": "information",
            "code": "informational",
            "diagnostics": format!("Deleted {}/{}", resource_type, id),
        }]
    }))
    .into_response())
}
