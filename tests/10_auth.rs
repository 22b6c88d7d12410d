mod common;

use anyhow::Result;
use chrono::Utc;
use reqwest::StatusCode;

#[tokio::test]
async fn health_endpoint_responds() -> Result<()> {
    let server = common::spawn_server().await?;
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/health", server.base_url)).send().await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn missing_authorization_is_unauthorized() -> Result<()> {
    let server = common::spawn_server().await?;
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/fhir/Patient", server.base_url)).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["resourceType"], "OperationOutcome");
    Ok(())
}

#[tokio::test]
async fn empty_bearer_is_unauthorized() -> Result<()> {
    let server = common::spawn_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/fhir/Patient", server.base_url))
        .header("Authorization", "Bearer ")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn non_bearer_scheme_is_unauthorized() -> Result<()> {
    let server = common::spawn_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/fhir/Patient", server.base_url))
        .header("Authorization", "Basic dXNlcjpwYXNz")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn undecodable_token_is_unauthorized() -> Result<()> {
    let server = common::spawn_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/fhir/Patient", server.base_url))
        .header("Authorization", "Bearer not-a-jwt")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn expired_token_is_unauthorized() -> Result<()> {
    let server = common::spawn_server().await?;
    let client = reqwest::Client::new();

    let expired = common::make_token(
        "expired-token",
        "https://pod.example.com/u1#me",
        Some(Utc::now().timestamp() - 1),
    );
    let res = client
        .get(format!("{}/fhir/Patient", server.base_url))
        .bearer_auth(&expired)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // The rejected token never created a session
    assert!(server.state.sessions.active_keys().is_empty());
    Ok(())
}

#[tokio::test]
async fn valid_token_reaches_protected_endpoint() -> Result<()> {
    let server = common::spawn_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/fhir/Patient", server.base_url))
        .bearer_auth(common::token("valid-1"))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["resourceType"], "Bundle");
    Ok(())
}

#[tokio::test]
async fn token_without_jti_uses_digest_session_key() -> Result<()> {
    let server = common::spawn_server().await?;
    let client = reqwest::Client::new();

    let token = common::make_token(
        "",
        "https://pod.example.com/u1#me",
        Some(Utc::now().timestamp() + 3600),
    );
    let res = client
        .get(format!("{}/fhir/Patient", server.base_url))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(server.state.sessions.active_keys().len(), 1);
    Ok(())
}

#[tokio::test]
async fn public_endpoints_need_no_authorization() -> Result<()> {
    let server = common::spawn_server().await?;
    let client = reqwest::Client::new();

    for path in [
        "/fhir/metadata",
        "/fhir/Questionnaire",
        "/fhir/Questionnaire/daily-mood",
        "/fhir/StructureDefinition",
        "/fhir/StructureDefinition/welldata-observation",
        "/fhir/ImplementationGuide",
        "/fhir/ImplementationGuide/welldata",
    ] {
        let res = client.get(format!("{}{}", server.base_url, path)).send().await?;
        assert_eq!(res.status(), StatusCode::OK, "expected 200 for {}", path);
    }
    Ok(())
}

#[tokio::test]
async fn questionnaire_response_is_not_public() -> Result<()> {
    let server = common::spawn_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/fhir/QuestionnaireResponse", server.base_url))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn metadata_is_a_capability_statement() -> Result<()> {
    let server = common::spawn_server().await?;
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/fhir/metadata", server.base_url)).send().await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["resourceType"], "CapabilityStatement");
    assert_eq!(body["fhirVersion"], "4.0.1");
    Ok(())
}
