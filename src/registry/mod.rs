//! Static conformance registry.
//!
//! Questionnaire definitions, profiles, and implementation-guide metadata are
//! shared resources, not user data. The registry is populated once at
//! startup, before the router exists, and then published read-only behind an
//! `Arc` - the opposite ownership regime from the session store.

use std::collections::HashMap;

use crate::fhir::{Resource, ResourceType};

#[derive(Debug, Default)]
pub struct ConformanceRegistry {
    questionnaires: HashMap<String, Resource>,
    structure_definitions: HashMap<String, Resource>,
    implementation_guides: HashMap<String, Resource>,
}

impl ConformanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a conformance resource, keyed by id (falling back to `name`).
    /// Resources with neither are skipped.
    pub fn store(&mut self, resource: Resource) {
        let Some(map) = self.map_for_type_mut(resource.resource_type()) else {
            tracing::warn!(
                "Not a conformance resource type: {:?}, skipping",
                resource.resource_type()
            );
            return;
        };

        let key = resource
            .id()
            .filter(|id| !id.is_empty())
            .or_else(|| resource.str_field("name").filter(|n| !n.is_empty()))
            .map(str::to_string);

        match key {
            Some(key) => {
                tracing::debug!(
                    "Stored {}: {} (url: {})",
                    resource.resource_type().unwrap_or_default(),
                    key,
                    resource.str_field("url").unwrap_or("-")
                );
                map.insert(key, resource);
            }
            None => {
                tracing::warn!("Conformance resource has no id or name, skipping");
            }
        }
    }

    pub fn get(&self, resource_type: ResourceType, id: &str) -> Option<Resource> {
        self.map_for_type(resource_type)?.get(id).cloned()
    }

    pub fn all(&self, resource_type: ResourceType) -> Vec<Resource> {
        self.map_for_type(resource_type)
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn count(&self, resource_type: ResourceType) -> usize {
        self.map_for_type(resource_type).map_or(0, HashMap::len)
    }

    fn map_for_type(&self, resource_type: ResourceType) -> Option<&HashMap<String, Resource>> {
        match resource_type {
            ResourceType::Questionnaire => Some(&self.questionnaires),
            ResourceType::StructureDefinition => Some(&self.structure_definitions),
            ResourceType::ImplementationGuide => Some(&self.implementation_guides),
            _ => None,
        }
    }

    fn map_for_type_mut(
        &mut self,
        resource_type: Option<&str>,
    ) -> Option<&mut HashMap<String, Resource>> {
        match resource_type {
            Some("Questionnaire") => Some(&mut self.questionnaires),
            Some("StructureDefinition") => Some(&mut self.structure_definitions),
            Some("ImplementationGuide") => Some(&mut self.implementation_guides),
            _ => None,
        }
    }
}
