use serde_json::{json, Value};

use super::Resource;

/// Build a searchset Bundle from a result set.
pub fn searchset(resources: Vec<Resource>) -> Value {
    let entries: Vec<Value> = resources
        .into_iter()
        .map(|r| json!({ "resource": r.into_value() }))
        .collect();

    json!({
        "resourceType": "Bundle",
        "type": "searchset",
        "total": entries.len(),
        "entry": entries,
    })
}
