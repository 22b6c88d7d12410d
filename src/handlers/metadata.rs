//! Server capability statement.

use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::fhir::ResourceType;

const SERVER_NAME: &str = "WellData Ephemeral FHIR Server";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Declared search parameters per resource type.
fn search_params(resource_type: ResourceType) -> &'static [(&'static str, &'static str)] {
    match resource_type {
        ResourceType::Patient => &[
            ("identifier", "token"),
            ("name", "string"),
            ("family", "string"),
            ("given", "string"),
            ("birthdate", "date"),
        ],
        ResourceType::Observation => &[
            ("subject", "reference"),
            ("code", "token"),
            ("date", "date"),
            ("status", "token"),
            ("category", "token"),
        ],
        ResourceType::Questionnaire => &[
            ("url", "uri"),
            ("identifier", "token"),
            ("name", "string"),
            ("title", "string"),
            ("status", "token"),
            ("_id", "token"),
        ],
        ResourceType::QuestionnaireResponse => &[
            ("subject", "reference"),
            ("questionnaire", "reference"),
            ("status", "token"),
            ("authored", "date"),
            ("author", "reference"),
        ],
        ResourceType::StructureDefinition => &[
            ("url", "uri"),
            ("name", "string"),
            ("type", "token"),
            ("status", "token"),
            ("_id", "token"),
        ],
        ResourceType::ImplementationGuide => &[
            ("url", "uri"),
            ("name", "string"),
            ("status", "token"),
            ("_id", "token"),
        ],
    }
}

fn interactions(resource_type: ResourceType) -> Vec<&'static str> {
    if resource_type.is_user_data() {
        vec!["read", "vread", "create", "update", "delete", "search-type"]
    } else {
        vec!["read", "search-type"]
    }
}

/// GET /fhir/metadata - public capability document.
pub async fn capability_statement() -> Json<Value> {
    let resources: Vec<Value> = ResourceType::ALL
        .into_iter()
        .map(|rt| {
            json!({
                "type": rt.as_str(),
                "interaction": interactions(rt)
                    .into_iter()
                    .map(|code| json!({ "code": code }))
                    .collect::<Vec<_>>(),
                "searchParam": search_params(rt)
                    .iter()
                    .map(|(name, kind)| json!({ "name": name, "type": kind }))
                    .collect::<Vec<_>>(),
            })
        })
        .collect();

    Json(json!({
        "resourceType": "CapabilityStatement",
        "status": "active",
        "date": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        "kind": "instance",
        "software": {
            "name": SERVER_NAME,
            "version": SERVER_VERSION,
        },
        "fhirVersion": "4.0.1",
        "format": ["application/fhir+json"],
        "rest": [{
            "mode": "server",
            "resource": resources,
        }]
    }))
}
