//! Patient search: identifier, name, family, given, birthdate.

use serde_json::Value;

use crate::fhir::Resource;

use super::{array_at, matches_any_identifier, parse_point, str_at, SearchQuery};

pub fn filter(resources: Vec<Resource>, query: &SearchQuery) -> Vec<Resource> {
    resources.into_iter().filter(|p| matches(p, query)).collect()
}

fn matches(patient: &Resource, query: &SearchQuery) -> bool {
    let value = patient.to_value();

    if let Some(identifier) = query.token("identifier") {
        if !matches_any_identifier(array_at(&value, "identifier"), &identifier) {
            return false;
        }
    }
    if let Some(name) = query.string("name") {
        if !matches_name(&value, name) {
            return false;
        }
    }
    if let Some(family) = query.string("family") {
        let found = array_at(&value, "name").any(|n| {
            str_at(n, &["family"]).is_some_and(|f| contains_ignore_case(f, family))
        });
        if !found {
            return false;
        }
    }
    if let Some(given) = query.string("given") {
        let found = array_at(&value, "name")
            .flat_map(|n| array_at(n, "given"))
            .filter_map(Value::as_str)
            .any(|g| contains_ignore_case(g, given));
        if !found {
            return false;
        }
    }
    if let Some(birthdate) = query.date_range("birthdate") {
        let born = patient.str_field("birthDate").and_then(parse_point);
        if !birthdate.matches(born) {
            return false;
        }
    }
    true
}

/// `name` matches over the concatenation of family and given parts.
fn matches_name(patient: &Value, search: &str) -> bool {
    array_at(patient, "name").any(|n| {
        let mut full = String::new();
        if let Some(family) = str_at(n, &["family"]) {
            full.push_str(family);
            full.push(' ');
        }
        for given in array_at(n, "given").filter_map(Value::as_str) {
            full.push_str(given);
            full.push(' ');
        }
        contains_ignore_case(&full, search)
    })
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
