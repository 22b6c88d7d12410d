use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub mod bundle;

/// Resource types served by this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Patient,
    Observation,
    Questionnaire,
    QuestionnaireResponse,
    StructureDefinition,
    ImplementationGuide,
}

impl ResourceType {
    pub const ALL: [ResourceType; 6] = [
        ResourceType::Patient,
        ResourceType::Observation,
        ResourceType::Questionnaire,
        ResourceType::QuestionnaireResponse,
        ResourceType::StructureDefinition,
        ResourceType::ImplementationGuide,
    ];

    /// Session-scoped types, hydrated from the pod and written through.
    pub const USER_DATA: [ResourceType; 3] = [
        ResourceType::Patient,
        ResourceType::Observation,
        ResourceType::QuestionnaireResponse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Patient => "Patient",
            ResourceType::Observation => "Observation",
            ResourceType::Questionnaire => "Questionnaire",
            ResourceType::QuestionnaireResponse => "QuestionnaireResponse",
            ResourceType::StructureDefinition => "StructureDefinition",
            ResourceType::ImplementationGuide => "ImplementationGuide",
        }
    }

    /// Per-session user data, as opposed to the shared startup registries.
    pub fn is_user_data(&self) -> bool {
        matches!(
            self,
            ResourceType::Patient | ResourceType::Observation | ResourceType::QuestionnaireResponse
        )
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Patient" => Ok(ResourceType::Patient),
            "Observation" => Ok(ResourceType::Observation),
            "Questionnaire" => Ok(ResourceType::Questionnaire),
            "QuestionnaireResponse" => Ok(ResourceType::QuestionnaireResponse),
            "StructureDefinition" => Ok(ResourceType::StructureDefinition),
            "ImplementationGuide" => Ok(ResourceType::ImplementationGuide),
            _ => Err(()),
        }
    }
}

/// Errors that can occur constructing a Resource from API input
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("Expected a JSON object")]
    NotAnObject,
    #[error("Missing resourceType element")]
    MissingType,
    #[error("Body resourceType '{body}' does not match '{expected}'")]
    TypeMismatch { body: String, expected: &'static str },
}

/// A FHIR resource held as its parsed JSON object.
///
/// `clone()` is the deep copy used at every provider boundary: a value
/// handed out or taken in never aliases the stored one.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource(Map<String, Value>);

impl Resource {
    /// Parse API input, requiring a `resourceType` matching `expected`.
    pub fn from_body(value: Value, expected: ResourceType) -> Result<Self, ResourceError> {
        let resource = Self::from_value(value)?;
        let body_type = resource.resource_type().unwrap_or_default().to_string();
        if body_type != expected.as_str() {
            return Err(ResourceError::TypeMismatch { body: body_type, expected: expected.as_str() });
        }
        Ok(resource)
    }

    /// Wrap an already-trusted JSON object (loader, pod, registry paths).
    pub fn from_value(value: Value) -> Result<Self, ResourceError> {
        match value {
            Value::Object(map) => {
                if !map.get("resourceType").map(Value::is_string).unwrap_or(false) {
                    return Err(ResourceError::MissingType);
                }
                Ok(Self(map))
            }
            _ => Err(ResourceError::NotAnObject),
        }
    }

    pub fn resource_type(&self) -> Option<&str> {
        self.0.get("resourceType").and_then(Value::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.0.insert("id".to_string(), Value::String(id.into()));
    }

    /// `meta.versionId`, parsed. Stored as a string on the wire.
    pub fn version(&self) -> Option<u64> {
        self.0
            .get("meta")
            .and_then(|m| m.get("versionId"))
            .and_then(Value::as_str)
            .and_then(|v| v.parse().ok())
    }

    /// Stamp `meta.versionId` and `meta.lastUpdated`, preserving any other
    /// meta elements the caller supplied.
    pub fn stamp_meta(&mut self, version: u64, last_updated: DateTime<Utc>) {
        let meta = self
            .0
            .entry("meta".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !meta.is_object() {
            *meta = Value::Object(Map::new());
        }
        let meta = meta.as_object_mut().unwrap();
        meta.insert("versionId".to_string(), Value::String(version.to_string()));
        meta.insert(
            "lastUpdated".to_string(),
            Value::String(last_updated.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Field as string, if present and a string.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Resource> for Value {
    fn from(resource: Resource) -> Self {
        resource.into_value()
    }
}
