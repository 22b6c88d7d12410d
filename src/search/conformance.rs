//! Search filters for the shared conformance resources served from the
//! startup registry: Questionnaire, StructureDefinition, ImplementationGuide.

use crate::fhir::{Resource, ResourceType};

use super::{array_at, matches_any_identifier, str_at, SearchQuery};

pub fn filter(
    resource_type: ResourceType,
    resources: Vec<Resource>,
    query: &SearchQuery,
) -> Vec<Resource> {
    resources
        .into_iter()
        .filter(|r| matches(resource_type, r, query))
        .collect()
}

fn matches(resource_type: ResourceType, resource: &Resource, query: &SearchQuery) -> bool {
    let value = resource.to_value();

    if let Some(url) = query.uri("url") {
        if str_at(&value, &["url"]) != Some(url) {
            return false;
        }
    }
    if let Some(id) = query.token("_id") {
        if resource.id() != Some(id.value.as_str()) {
            return false;
        }
    }
    if let Some(name) = query.string("name") {
        let matched = str_at(&value, &["name"])
            .is_some_and(|n| n.to_lowercase().contains(&name.to_lowercase()));
        if !matched {
            return false;
        }
    }
    if let Some(status) = query.token("status") {
        if !status.matches_ignore_case(str_at(&value, &["status"])) {
            return false;
        }
    }

    // Questionnaire-only parameters
    if resource_type == ResourceType::Questionnaire {
        if let Some(identifier) = query.token("identifier") {
            if !matches_any_identifier(array_at(&value, "identifier"), &identifier) {
                return false;
            }
        }
        if let Some(title) = query.string("title") {
            let matched = str_at(&value, &["title"])
                .is_some_and(|t| t.to_lowercase().contains(&title.to_lowercase()));
            if !matched {
                return false;
            }
        }
    }

    // StructureDefinition-only parameter
    if resource_type == ResourceType::StructureDefinition {
        if let Some(type_param) = query.token("type") {
            if str_at(&value, &["type"]) != Some(type_param.value.as_str()) {
                return false;
            }
        }
    }

    true
}
