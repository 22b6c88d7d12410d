//! Observation search: subject, code, date, status, category.

use crate::fhir::Resource;

use super::{array_at, matches_any_coding, parse_point, str_at, SearchQuery};

pub fn filter(resources: Vec<Resource>, query: &SearchQuery) -> Vec<Resource> {
    resources.into_iter().filter(|o| matches(o, query)).collect()
}

fn matches(observation: &Resource, query: &SearchQuery) -> bool {
    let value = observation.to_value();

    if let Some(subject) = query.reference("subject") {
        if !subject.matches(str_at(&value, &["subject", "reference"])) {
            return false;
        }
    }
    if let Some(code) = query.token("code") {
        let Some(concept) = value.get("code") else { return false };
        if !matches_any_coding(concept, &code) {
            return false;
        }
    }
    if let Some(date) = query.date_range("date") {
        let effective = str_at(&value, &["effectiveDateTime"]).and_then(parse_point);
        if !date.matches(effective) {
            return false;
        }
    }
    if let Some(status) = query.token("status") {
        if !status.matches_ignore_case(str_at(&value, &["status"])) {
            return false;
        }
    }
    if let Some(category) = query.token("category") {
        let found = array_at(&value, "category").any(|c| matches_any_coding(c, &category));
        if !found {
            return false;
        }
    }
    true
}
