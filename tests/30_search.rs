mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

async fn create(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    resource_type: &str,
    body: Value,
) -> Result<()> {
    let res = client
        .post(format!("{}/fhir/{}", base_url, resource_type))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    Ok(())
}

fn observation(code: &str, subject: &str) -> Value {
    json!({
        "resourceType": "Observation",
        "status": "final",
        "code": {"coding": [{"system": "http://snomed.info/sct", "code": code}]},
        "subject": {"reference": subject},
        "effectiveDateTime": "2024-03-10T08:30:00Z"
    })
}

#[tokio::test]
async fn search_observations_by_code() -> Result<()> {
    let server = common::spawn_server().await?;
    let client = reqwest::Client::new();
    let token = common::token("search-1");

    create(&client, &server.base_url, &token, "Observation", observation("27113001", "Patient/1")).await?;
    create(&client, &server.base_url, &token, "Observation", observation("27113001", "Patient/1")).await?;
    create(&client, &server.base_url, &token, "Observation", observation("60621009", "Patient/1")).await?;

    let bundle = client
        .get(format!("{}/fhir/Observation?code=27113001", server.base_url))
        .bearer_auth(&token)
        .send()
        .await?
        .json::<Value>()
        .await?;
    assert_eq!(bundle["total"], 2);

    let bundle = client
        .get(format!("{}/fhir/Observation?code=60621009", server.base_url))
        .bearer_auth(&token)
        .send()
        .await?
        .json::<Value>()
        .await?;
    assert_eq!(bundle["total"], 1);
    Ok(())
}

#[tokio::test]
async fn search_observations_by_subject_and_status() -> Result<()> {
    let server = common::spawn_server().await?;
    let client = reqwest::Client::new();
    let token = common::token("search-2");

    create(&client, &server.base_url, &token, "Observation", observation("27113001", "Patient/1")).await?;
    create(&client, &server.base_url, &token, "Observation", observation("27113001", "Patient/2")).await?;

    let bundle = client
        .get(format!("{}/fhir/Observation?subject=1", server.base_url))
        .bearer_auth(&token)
        .send()
        .await?
        .json::<Value>()
        .await?;
    assert_eq!(bundle["total"], 1);

    let bundle = client
        .get(format!("{}/fhir/Observation?status=FINAL", server.base_url))
        .bearer_auth(&token)
        .send()
        .await?
        .json::<Value>()
        .await?;
    assert_eq!(bundle["total"], 2);
    Ok(())
}

#[tokio::test]
async fn search_observations_by_date_range() -> Result<()> {
    let server = common::spawn_server().await?;
    let client = reqwest::Client::new();
    let token = common::token("search-3");

    create(&client, &server.base_url, &token, "Observation", observation("27113001", "Patient/1")).await?;

    let bundle = client
        .get(format!(
            "{}/fhir/Observation?date=ge2024-01-01&date=lt2024-06-01",
            server.base_url
        ))
        .bearer_auth(&token)
        .send()
        .await?
        .json::<Value>()
        .await?;
    assert_eq!(bundle["total"], 1);

    let bundle = client
        .get(format!("{}/fhir/Observation?date=ge2025-01-01", server.base_url))
        .bearer_auth(&token)
        .send()
        .await?
        .json::<Value>()
        .await?;
    assert_eq!(bundle["total"], 0);
    Ok(())
}

#[tokio::test]
async fn search_patients_by_name_and_birthdate() -> Result<()> {
    let server = common::spawn_server().await?;
    let client = reqwest::Client::new();
    let token = common::token("search-4");

    create(
        &client,
        &server.base_url,
        &token,
        "Patient",
        json!({
            "resourceType": "Patient",
            "name": [{"family": "Doe", "given": ["Jane"]}],
            "birthDate": "1980-06-15"
        }),
    )
    .await?;
    create(
        &client,
        &server.base_url,
        &token,
        "Patient",
        json!({
            "resourceType": "Patient",
            "name": [{"family": "Smith", "given": ["John"]}],
            "birthDate": "1990-01-01"
        }),
    )
    .await?;

    for (query, expected) in [
        ("name=doe", 1),
        ("name=jane", 1),
        ("family=smi", 1),
        ("given=jane", 1),
        ("birthdate=1980-06-15", 1),
        ("birthdate=ge1985-01-01", 1),
        ("family=doe&birthdate=1990-01-01", 0),
        ("name=nobody", 0),
    ] {
        let bundle = client
            .get(format!("{}/fhir/Patient?{}", server.base_url, query))
            .bearer_auth(&token)
            .send()
            .await?
            .json::<Value>()
            .await?;
        assert_eq!(bundle["total"], expected, "query {}", query);
    }
    Ok(())
}

#[tokio::test]
async fn search_by_id_parameter() -> Result<()> {
    let server = common::spawn_server().await?;
    let client = reqwest::Client::new();
    let token = common::token("search-5");

    create(&client, &server.base_url, &token, "Patient", json!({"resourceType": "Patient"})).await?;

    let bundle = client
        .get(format!("{}/fhir/Patient?_id=1", server.base_url))
        .bearer_auth(&token)
        .send()
        .await?
        .json::<Value>()
        .await?;
    assert_eq!(bundle["total"], 1);

    let bundle = client
        .get(format!("{}/fhir/Patient?_id=99", server.base_url))
        .bearer_auth(&token)
        .send()
        .await?
        .json::<Value>()
        .await?;
    assert_eq!(bundle["total"], 0);
    Ok(())
}

#[tokio::test]
async fn search_questionnaire_responses() -> Result<()> {
    let server = common::spawn_server().await?;
    let client = reqwest::Client::new();
    let token = common::token("search-6");

    create(
        &client,
        &server.base_url,
        &token,
        "QuestionnaireResponse",
        json!({
            "resourceType": "QuestionnaireResponse",
            "questionnaire": "http://welldata.example.org/Questionnaire/daily-mood",
            "status": "completed",
            "subject": {"reference": "Patient/1"},
            "authored": "2024-05-02T10:00:00Z"
        }),
    )
    .await?;

    for (query, expected) in [
        ("questionnaire=daily-mood", 1),
        ("status=completed", 1),
        ("subject=1", 1),
        ("authored=ge2024-05-01", 1),
        ("authored=lt2024-05-01", 0),
        ("questionnaire=sleep", 0),
    ] {
        let bundle = client
            .get(format!("{}/fhir/QuestionnaireResponse?{}", server.base_url, query))
            .bearer_auth(&token)
            .send()
            .await?
            .json::<Value>()
            .await?;
        assert_eq!(bundle["total"], expected, "query {}", query);
    }
    Ok(())
}

#[tokio::test]
async fn search_conformance_resources_publicly() -> Result<()> {
    let server = common::spawn_server().await?;
    let client = reqwest::Client::new();

    for (path, expected) in [
        ("/fhir/Questionnaire?url=http://welldata.example.org/Questionnaire/daily-mood", 1),
        ("/fhir/Questionnaire?name=dailymood", 1),
        ("/fhir/Questionnaire?title=mood", 1),
        ("/fhir/Questionnaire?_id=daily-mood", 1),
        ("/fhir/Questionnaire?status=retired", 0),
        ("/fhir/StructureDefinition?type=Observation", 1),
        ("/fhir/StructureDefinition?type=Patient", 0),
        ("/fhir/ImplementationGuide?name=welldata", 1),
    ] {
        let bundle = client
            .get(format!("{}{}", server.base_url, path))
            .send()
            .await?
            .json::<Value>()
            .await?;
        assert_eq!(bundle["total"], expected, "path {}", path);
    }
    Ok(())
}
