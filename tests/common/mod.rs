use anyhow::Result;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use serde_json::json;

use welldata_fhir::config::AppConfig;
use welldata_fhir::fhir::Resource;
use welldata_fhir::registry::ConformanceRegistry;
use welldata_fhir::server::{app, AppState};

pub struct TestServer {
    pub base_url: String,
    /// Handle into the running server's state, for assertions that HTTP
    /// does not expose (active session keys, manual sweeps).
    pub state: AppState,
}

/// Config for tests: Solid disabled, and a test data path that loads
/// nothing so sessions hydrate empty.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default_config();
    config.testdata.path = "/nonexistent-testdata".to_string();
    config
}

/// Spawn the app in-process on an ephemeral port.
pub async fn spawn_server() -> Result<TestServer> {
    spawn_server_with(test_config()).await
}

pub async fn spawn_server_with(config: AppConfig) -> Result<TestServer> {
    let state = AppState::build_with_registry(config, conformance_registry()).await?;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let server_state = state.clone();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app(server_state)).await;
    });

    Ok(TestServer { base_url: format!("http://{}", addr), state })
}

/// A small conformance registry so the public endpoints have content.
fn conformance_registry() -> ConformanceRegistry {
    let mut registry = ConformanceRegistry::new();
    registry.store(
        Resource::from_value(json!({
            "resourceType": "Questionnaire",
            "id": "daily-mood",
            "url": "http://welldata.example.org/Questionnaire/daily-mood",
            "name": "DailyMood",
            "title": "Daily mood check-in",
            "status": "active"
        }))
        .unwrap(),
    );
    registry.store(
        Resource::from_value(json!({
            "resourceType": "StructureDefinition",
            "id": "welldata-observation",
            "url": "http://welldata.example.org/StructureDefinition/welldata-observation",
            "name": "WellDataObservation",
            "type": "Observation",
            "status": "draft"
        }))
        .unwrap(),
    );
    registry.store(
        Resource::from_value(json!({
            "resourceType": "ImplementationGuide",
            "id": "welldata",
            "url": "http://welldata.example.org/ImplementationGuide/welldata",
            "name": "WellDataIg",
            "status": "draft"
        }))
        .unwrap(),
    );
    registry
}

/// Mint an unsigned JWT; the server decodes without verification.
pub fn make_token(jti: &str, sub: &str, exp: Option<i64>) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let mut claims = json!({ "jti": jti, "sub": sub });
    if let Some(exp) = exp {
        claims["exp"] = json!(exp);
    }
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    format!("{}.{}.signature", header, payload)
}

/// A valid token for an hour, for a default test subject.
pub fn token(jti: &str) -> String {
    make_token(
        jti,
        "https://pod.example.com/u1#me",
        Some(Utc::now().timestamp() + 3600),
    )
}
