use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub solid: SolidConfig,
    pub ig: IgConfig,
    pub testdata: TestDataConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolidConfig {
    /// Enables pod write-through and hydration. When false, every pod
    /// operation is a no-op and sessions hydrate from dev test data.
    pub enabled: bool,
    /// Container path under the pod root that holds the FHIR hierarchy.
    pub fhir_container_path: String,
    /// Connect timeout for pod HTTP calls, in seconds.
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgConfig {
    /// URL of a packaged implementation guide archive (.tgz).
    /// Empty means the conformance registry starts without IG resources.
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestDataConfig {
    /// Directory holding dev resources as {ResourceType}/{name}.json.
    /// Empty means the embedded defaults are used.
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub sweep_interval_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::default_config().with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("SERVER_PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Ok(v) = env::var("WELLDATA_SOLID_ENABLED") {
            self.solid.enabled = v.parse().unwrap_or(self.solid.enabled);
        }
        if let Ok(v) = env::var("WELLDATA_SOLID_FHIR_CONTAINER_PATH") {
            self.solid.fhir_container_path = v;
        }
        if let Ok(v) = env::var("WELLDATA_POD_TIMEOUT_SECS") {
            self.solid.timeout_secs = v.parse().unwrap_or(self.solid.timeout_secs);
        }
        if let Ok(v) = env::var("WELLDATA_IG_URL") {
            self.ig.url = v;
        }
        if let Ok(v) = env::var("WELLDATA_TESTDATA_PATH") {
            self.testdata.path = v;
        }
        if let Ok(v) = env::var("WELLDATA_SESSION_SWEEP_INTERVAL_SECS") {
            self.session.sweep_interval_secs =
                v.parse().unwrap_or(self.session.sweep_interval_secs);
        }
        self
    }

    pub fn default_config() -> Self {
        Self {
            server: ServerConfig { port: 8080 },
            solid: SolidConfig {
                enabled: false,
                fhir_container_path: "/weare/fhir".to_string(),
                timeout_secs: 30,
            },
            ig: IgConfig { url: String::new() },
            testdata: TestDataConfig { path: String::new() },
            session: SessionConfig { sweep_interval_secs: 300 },
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
