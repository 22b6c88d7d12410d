//! Dev test-data loading and session hydration.
//!
//! A fresh session is hydrated on its first authenticated request: from the
//! user's pod when Solid integration is enabled, otherwise from dev test
//! data. Conformance resources are loaded once at startup and are not
//! session-scoped.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use crate::context::AccessTokenContext;
use crate::fhir::{Resource, ResourceType};
use crate::pod::PodClient;
use crate::registry::ConformanceRegistry;
use crate::session::Session;

/// Embedded dev documents, used when no test data directory is configured.
fn embedded(resource_type: ResourceType) -> &'static [&'static str] {
    match resource_type {
        ResourceType::Patient => &[include_str!("testdata/patient-example.json")],
        ResourceType::Observation => &[
            include_str!("testdata/observation-bodyweight.json"),
            include_str!("testdata/observation-heartrate.json"),
        ],
        ResourceType::QuestionnaireResponse => {
            &[include_str!("testdata/questionnaireresponse-example.json")]
        }
        ResourceType::Questionnaire => &[include_str!("testdata/questionnaire-daily-mood.json")],
        _ => &[],
    }
}

/// Loads dev resources from an optional directory, falling back to the
/// embedded documents.
#[derive(Debug, Clone)]
pub struct DataLoader {
    path: String,
}

impl DataLoader {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn load_type(&self, resource_type: ResourceType) -> Vec<Resource> {
        if self.path.is_empty() {
            return embedded(resource_type)
                .iter()
                .filter_map(|text| parse_document(text, "<embedded>"))
                .collect();
        }

        let dir = Path::new(&self.path).join(resource_type.as_str());
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("No {} test data in {:?}: {}", resource_type, dir, e);
                return Vec::new();
            }
        };

        let mut resources = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(text) => {
                    if let Some(resource) = parse_document(&text, &path.display().to_string()) {
                        resources.push(resource);
                    }
                }
                Err(e) => tracing::warn!("Failed to read {:?}: {}", path, e),
            }
        }
        resources
    }
}

fn parse_document(text: &str, source: &str) -> Option<Resource> {
    match serde_json::from_str(text).map_err(|e| e.to_string()).and_then(|value| {
        Resource::from_value(value).map_err(|e| e.to_string())
    }) {
        Ok(resource) => Some(resource),
        Err(e) => {
            tracing::warn!("Failed to parse test data from {}: {}", source, e);
            None
        }
    }
}

/// Store a hydrated resource into a session, assigning an id when the
/// document carries none and keeping any version already stamped on it.
pub fn store_into_session(session: &Session, resource_type: ResourceType, mut resource: Resource) {
    let id = match resource.id().filter(|id| !id.is_empty()) {
        Some(id) => id.to_string(),
        None => session.next_id(resource_type.as_str()).to_string(),
    };
    resource.set_id(&id);

    let version = resource.version().unwrap_or(1);
    resource.stamp_meta(version, Utc::now());

    session.store(resource_type.as_str(), &id, version, resource);
    tracing::debug!(
        "Stored {}/{} version {} in session {}",
        resource_type,
        id,
        version,
        session.session_key()
    );
}

/// Hydrates new sessions on first use.
pub struct Hydrator {
    pod: Arc<PodClient>,
    loader: DataLoader,
}

impl Hydrator {
    pub fn new(pod: Arc<PodClient>, loader: DataLoader) -> Self {
        Self { pod, loader }
    }

    /// Load all user-data resources into the session and mark it hydrated.
    /// The caller holds the session's hydration latch.
    pub async fn hydrate(&self, session: &Session, ctx: &AccessTokenContext) {
        tracing::info!("Loading resources for session {}", session.session_key());

        if self.pod.is_enabled() {
            self.pod.ensure_containers(ctx).await;
            for resource_type in ResourceType::USER_DATA {
                for resource in self.pod.load_resources(resource_type.as_str(), ctx).await {
                    store_into_session(session, resource_type, resource);
                }
            }
        } else {
            for resource_type in ResourceType::USER_DATA {
                for resource in self.loader.load_type(resource_type) {
                    store_into_session(session, resource_type, resource);
                }
            }
        }

        session.set_hydrated(true);
    }
}

/// Startup load of the shared conformance registry: static Questionnaires
/// from dev data, profiles and guide metadata from the IG package.
pub async fn load_conformance_registry(
    loader: &DataLoader,
    ig_url: &str,
) -> ConformanceRegistry {
    let mut registry = ConformanceRegistry::new();

    for questionnaire in loader.load_type(ResourceType::Questionnaire) {
        registry.store(questionnaire);
    }
    tracing::info!(
        "Loaded {} static Questionnaires",
        registry.count(ResourceType::Questionnaire)
    );

    if let Err(e) = crate::ig::load_ig_package(ig_url, &mut registry).await {
        tracing::error!("Failed to load IG package from {}: {}", ig_url, e);
    }

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_embedded_defaults() {
        let loader = DataLoader::new("");
        assert_eq!(loader.load_type(ResourceType::Patient).len(), 1);
        assert_eq!(loader.load_type(ResourceType::Observation).len(), 2);
        assert_eq!(loader.load_type(ResourceType::QuestionnaireResponse).len(), 1);
        assert_eq!(loader.load_type(ResourceType::Questionnaire).len(), 1);
        assert_eq!(loader.load_type(ResourceType::StructureDefinition).len(), 0);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let loader = DataLoader::new("/nonexistent/testdata");
        assert!(loader.load_type(ResourceType::Patient).is_empty());
    }

    #[test]
    fn test_store_into_session_keeps_document_id() {
        let session = Session::new("s1");
        let resource = Resource::from_value(json!({
            "resourceType": "Patient", "id": "pod-abc"
        }))
        .unwrap();

        store_into_session(&session, ResourceType::Patient, resource);

        let stored = session.get("Patient", "pod-abc", None).unwrap();
        assert_eq!(stored.version(), Some(1));
    }

    #[test]
    fn test_store_into_session_assigns_missing_id() {
        let session = Session::new("s1");
        let resource = Resource::from_value(json!({"resourceType": "Patient"})).unwrap();

        store_into_session(&session, ResourceType::Patient, resource);

        let stored = session.get("Patient", "1", None).unwrap();
        assert_eq!(stored.id(), Some("1"));
    }

    #[test]
    fn test_store_into_session_respects_existing_version() {
        let session = Session::new("s1");
        let resource = Resource::from_value(json!({
            "resourceType": "Patient", "id": "x",
            "meta": {"versionId": "4"}
        }))
        .unwrap();

        store_into_session(&session, ResourceType::Patient, resource);

        assert_eq!(session.latest_version("Patient", "x"), Some(4));
    }
}
