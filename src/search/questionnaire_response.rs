//! QuestionnaireResponse search: subject, questionnaire, status, authored, author.

use crate::fhir::Resource;

use super::{parse_point, str_at, SearchQuery};

pub fn filter(resources: Vec<Resource>, query: &SearchQuery) -> Vec<Resource> {
    resources.into_iter().filter(|qr| matches(qr, query)).collect()
}

fn matches(response: &Resource, query: &SearchQuery) -> bool {
    let value = response.to_value();

    if let Some(subject) = query.reference("subject") {
        if !subject.matches(str_at(&value, &["subject", "reference"])) {
            return false;
        }
    }
    if let Some(questionnaire) = query.reference("questionnaire") {
        // Canonical reference, stored as a plain string element
        if !questionnaire.matches_canonical(str_at(&value, &["questionnaire"])) {
            return false;
        }
    }
    if let Some(status) = query.token("status") {
        if !status.matches_ignore_case(str_at(&value, &["status"])) {
            return false;
        }
    }
    if let Some(authored) = query.date_range("authored") {
        let timestamp = str_at(&value, &["authored"]).and_then(parse_point);
        if !authored.matches(timestamp) {
            return false;
        }
    }
    if let Some(author) = query.reference("author") {
        if !author.matches(str_at(&value, &["author", "reference"])) {
            return false;
        }
    }
    true
}
