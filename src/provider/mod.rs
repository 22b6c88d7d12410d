//! Generic per-type resource provider.
//!
//! Implements read/create/update/delete/search against the current
//! session's store. Every value crossing this boundary is an owned copy:
//! callers can mutate what they receive without touching stored state.
//! Mutations are written through to the pod; pod failures are logged and
//! do not fail the request, the in-memory state is the session's truth.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::context::AccessTokenContext;
use crate::error::ApiError;
use crate::fhir::{Resource, ResourceType};
use crate::pod::PodClient;
use crate::session::{Session, SessionStore};

/// Result of a create or update.
#[derive(Debug)]
pub struct MethodOutcome {
    pub created: bool,
    pub id: String,
    pub version: u64,
    pub resource: Resource,
}

pub struct ResourceProvider {
    resource_type: ResourceType,
    sessions: Arc<SessionStore>,
    pod: Arc<PodClient>,
}

impl ResourceProvider {
    pub fn new(
        resource_type: ResourceType,
        sessions: Arc<SessionStore>,
        pod: Arc<PodClient>,
    ) -> Self {
        Self { resource_type, sessions, pod }
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    fn type_name(&self) -> &'static str {
        self.resource_type.as_str()
    }

    /// Resolve the caller's session, failing as unauthenticated when the
    /// session is gone (e.g. swept between middleware and handler).
    fn require_session(&self, ctx: &AccessTokenContext) -> Result<Arc<Session>, ApiError> {
        self.sessions
            .get(ctx.session_key())
            .ok_or_else(|| ApiError::unauthorized("No valid session - authentication required"))
    }

    /// Read a resource, distinguishing deleted (gone) from unknown (not
    /// found). An explicit version that was never written is not found.
    pub fn read(
        &self,
        ctx: &AccessTokenContext,
        id: &str,
        version: Option<u64>,
    ) -> Result<Resource, ApiError> {
        let session = self.require_session(ctx)?;

        if session.is_deleted(self.type_name(), id) {
            return Err(ApiError::gone(format!("{}/{} is deleted", self.type_name(), id)));
        }

        session
            .get(self.type_name(), id, version)
            .ok_or_else(|| ApiError::not_found(format!("{}/{} not found", self.type_name(), id)))
    }

    /// Create with a server-assigned id and version 1.
    pub async fn create(
        &self,
        ctx: &AccessTokenContext,
        body: Value,
    ) -> Result<MethodOutcome, ApiError> {
        let session = self.require_session(ctx)?;
        let resource = Resource::from_body(body, self.resource_type)
            .map_err(|e| ApiError::bad_request(e.to_string()))?;

        let id = session.next_id(self.type_name()).to_string();
        let mut stored = resource;
        stored.set_id(&id);
        stored.stamp_meta(1, Utc::now());

        session.store(self.type_name(), &id, 1, stored.clone());
        self.persist_to_pod(&stored, ctx).await;

        tracing::info!("Created {}/{} in session {}", self.type_name(), id, session.session_key());

        Ok(MethodOutcome { created: true, id, version: 1, resource: stored })
    }

    /// Update an id, bumping the version; an unknown id starts at version 1.
    pub async fn update(
        &self,
        ctx: &AccessTokenContext,
        id: &str,
        body: Value,
    ) -> Result<MethodOutcome, ApiError> {
        let session = self.require_session(ctx)?;
        let resource = Resource::from_body(body, self.resource_type)
            .map_err(|e| ApiError::bad_request(e.to_string()))?;

        let version = session
            .latest_version(self.type_name(), id)
            .map_or(1, |latest| latest + 1);

        let mut stored = resource;
        stored.set_id(id);
        stored.stamp_meta(version, Utc::now());

        session.store(self.type_name(), id, version, stored.clone());
        self.persist_to_pod(&stored, ctx).await;

        tracing::info!(
            "Updated {}/{} to version {} in session {}",
            self.type_name(),
            id,
            version,
            session.session_key()
        );

        Ok(MethodOutcome { created: false, id: id.to_string(), version, resource: stored })
    }

    /// Tombstone an id. Deleting an id that was never created is not found;
    /// the pod delete is idempotent.
    pub async fn delete(&self, ctx: &AccessTokenContext, id: &str) -> Result<(), ApiError> {
        let session = self.require_session(ctx)?;

        if !session.exists(self.type_name(), id) {
            return Err(ApiError::not_found(format!("{}/{} not found", self.type_name(), id)));
        }

        session.delete(self.type_name(), id);
        self.delete_from_pod(id, ctx).await;

        tracing::info!("Deleted {}/{} in session {}", self.type_name(), id, session.session_key());
        Ok(())
    }

    /// All non-tombstoned latest versions.
    pub fn search_all(&self, ctx: &AccessTokenContext) -> Result<Vec<Resource>, ApiError> {
        let session = self.require_session(ctx)?;
        Ok(session.get_all(self.type_name()))
    }

    /// Read wrapped as a search result; deleted or unknown ids yield an
    /// empty result set rather than an error.
    pub fn search_by_id(
        &self,
        ctx: &AccessTokenContext,
        id: &str,
    ) -> Result<Vec<Resource>, ApiError> {
        match self.read(ctx, id, None) {
            Ok(resource) => Ok(vec![resource]),
            Err(ApiError::NotFound(_)) | Err(ApiError::Gone(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn persist_to_pod(&self, resource: &Resource, ctx: &AccessTokenContext) {
        if let Err(e) = self.pod.save_resource(resource, ctx).await {
            // In-memory update already succeeded; pod sync is best-effort
            tracing::error!("Failed to persist resource to Solid pod: {}", e);
        }
    }

    async fn delete_from_pod(&self, id: &str, ctx: &AccessTokenContext) {
        if let Err(e) = self.pod.delete_resource(self.type_name(), id, ctx).await {
            tracing::error!("Failed to delete resource from Solid pod: {}", e);
        }
    }
}
