//! Client for the user's Solid pod.
//!
//! The pod stores FHIR resources as RDF/Turtle files under an LDP container
//! hierarchy:
//!
//! `<pod>/weare/fhir/Patient/<id>.ttl`, `<pod>/weare/fhir/Observation/<id>.ttl`, ...
//!
//! The pod base URL is derived from the WebID in the access token's subject
//! claim. All calls carry the user's bearer token; write failures are
//! reported to the caller, which logs and keeps the in-memory state.

use std::time::Duration;

use crate::config::SolidConfig;
use crate::context::AccessTokenContext;
use crate::fhir::Resource;
use crate::rdf::{self, RdfError};

#[derive(Debug, thiserror::Error)]
pub enum PodError {
    #[error("No WebID available to derive the pod URL")]
    NoWebId,
    #[error("Pod request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Pod returned status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("RDF conversion failed: {0}")]
    Rdf(#[from] RdfError),
}

pub struct PodClient {
    http: reqwest::Client,
    config: SolidConfig,
}

impl PodClient {
    pub fn new(config: SolidConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Derive the pod base URL from a WebID:
    /// `https://pod-host/profile/card#me` -> `https://pod-host`.
    pub fn pod_base_url(subject: &str) -> Option<String> {
        let url = reqwest::Url::parse(subject).ok()?;
        let host = url.host_str()?;
        Some(match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        })
    }

    fn container_url(&self, ctx: &AccessTokenContext, resource_type: &str) -> Result<String, PodError> {
        let base = Self::pod_base_url(&ctx.subject).ok_or(PodError::NoWebId)?;
        Ok(format!("{}{}/{}/", base, self.config.fhir_container_path, resource_type))
    }

    fn resource_url(
        &self,
        ctx: &AccessTokenContext,
        resource_type: &str,
        id: &str,
    ) -> Result<String, PodError> {
        Ok(format!("{}{}.ttl", self.container_url(ctx, resource_type)?, id))
    }

    /// Load all resources of a type from the pod. Individual failures are
    /// logged and skipped; a missing container means no resources yet.
    pub async fn load_resources(
        &self,
        resource_type: &str,
        ctx: &AccessTokenContext,
    ) -> Vec<Resource> {
        if !self.is_enabled() {
            tracing::debug!("Solid pod integration disabled, skipping resource loading");
            return Vec::new();
        }

        let container_url = match self.container_url(ctx, resource_type) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("Cannot build container URL for {}: {}", resource_type, e);
                return Vec::new();
            }
        };
        tracing::debug!("Loading {} resources from {}", resource_type, container_url);

        let urls = match self.list_container(&container_url, &ctx.token).await {
            Ok(urls) => urls,
            Err(e) => {
                tracing::error!("Failed to list {} container: {}", resource_type, e);
                return Vec::new();
            }
        };

        let mut resources = Vec::new();
        for url in urls {
            if !url.ends_with(".ttl") {
                continue;
            }
            match self.load_resource(&url, &ctx.token).await {
                Ok(resource) => resources.push(resource),
                Err(e) => tracing::warn!("Failed to load resource from {}: {}", url, e),
            }
        }
        tracing::debug!("Loaded {} {} resources from pod", resources.len(), resource_type);
        resources
    }

    async fn list_container(&self, container_url: &str, token: &str) -> Result<Vec<String>, PodError> {
        let response = self
            .http
            .get(container_url)
            .header("Accept", "text/turtle")
            .bearer_auth(token)
            .send()
            .await?;

        match response.status().as_u16() {
            200 => {
                let body = response.text().await?;
                Ok(rdf::container_contents(&body, container_url)?)
            }
            404 => {
                // Container does not exist yet; no resources of this type
                tracing::debug!("Container {} does not exist yet", container_url);
                Ok(Vec::new())
            }
            status => Err(PodError::Status { status, url: container_url.to_string() }),
        }
    }

    async fn load_resource(&self, url: &str, token: &str) -> Result<Resource, PodError> {
        let response = self
            .http
            .get(url)
            .header("Accept", "text/turtle")
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(PodError::Status { status, url: url.to_string() });
        }
        let body = response.text().await?;
        Ok(rdf::turtle_to_resource(&body, url)?)
    }

    /// Write a resource through to the pod.
    pub async fn save_resource(
        &self,
        resource: &Resource,
        ctx: &AccessTokenContext,
    ) -> Result<(), PodError> {
        if !self.is_enabled() {
            tracing::debug!("Solid pod integration disabled, skipping resource save");
            return Ok(());
        }

        let resource_type = resource.resource_type().unwrap_or_default();
        let id = resource.id().ok_or(RdfError::MissingId)?;
        let url = self.resource_url(ctx, resource_type, id)?;
        tracing::debug!("Saving {}/{} to {}", resource_type, id, url);

        let turtle = rdf::resource_to_turtle(resource)?;

        // Re-parse locally before sending; failure here is a serializer bug
        // and must not corrupt the pod
        if let Err(e) = rdf::validate_turtle(&turtle) {
            tracing::error!(
                "Invalid Turtle generated for {}/{}: {}\nContent:\n{}",
                resource_type,
                id,
                e,
                turtle
            );
            return Err(PodError::Rdf(e));
        }

        let response = self
            .http
            .put(&url)
            .header("Content-Type", "text/turtle")
            .bearer_auth(&ctx.token)
            .body(turtle)
            .send()
            .await?;

        if response.status().is_success() {
            tracing::debug!("Saved {} to pod", url);
            Ok(())
        } else {
            Err(PodError::Status { status: response.status().as_u16(), url })
        }
    }

    /// Delete a resource from the pod. A 404 counts as success.
    pub async fn delete_resource(
        &self,
        resource_type: &str,
        id: &str,
        ctx: &AccessTokenContext,
    ) -> Result<(), PodError> {
        if !self.is_enabled() {
            tracing::debug!("Solid pod integration disabled, skipping resource delete");
            return Ok(());
        }

        let url = self.resource_url(ctx, resource_type, id)?;
        tracing::debug!("Deleting {} from pod", url);

        let response = self.http.delete(&url).bearer_auth(&ctx.token).send().await?;
        let status = response.status().as_u16();
        if response.status().is_success() || status == 404 {
            tracing::debug!("Deleted {} from pod", url);
            Ok(())
        } else {
            Err(PodError::Status { status, url })
        }
    }

    /// Ensure the container hierarchy exists before the first write.
    pub async fn ensure_containers(&self, ctx: &AccessTokenContext) {
        if !self.is_enabled() {
            return;
        }
        let Some(base) = Self::pod_base_url(&ctx.subject) else {
            tracing::warn!("Cannot ensure container structure - no WebID available");
            return;
        };
        tracing::info!("Ensuring pod container structure exists at {}", base);

        let mut containers = vec![
            (format!("{}/weare/", base), "WellData Health Data".to_string()),
            (
                format!("{}{}/", base, self.config.fhir_container_path),
                "FHIR Resources".to_string(),
            ),
        ];
        for resource_type in crate::fhir::ResourceType::USER_DATA {
            if let Ok(url) = self.container_url(ctx, resource_type.as_str()) {
                containers.push((url, format!("{} Resources", resource_type)));
            }
        }

        for (url, title) in containers {
            if let Err(e) = self.create_container_if_missing(&url, &title, &ctx.token).await {
                tracing::warn!("Failed to create container {}: {}", url, e);
            }
        }
    }

    async fn create_container_if_missing(
        &self,
        container_url: &str,
        title: &str,
        token: &str,
    ) -> Result<(), PodError> {
        let head = self.http.head(container_url).bearer_auth(token).send().await?;
        if head.status().as_u16() != 404 {
            return Ok(());
        }

        let turtle = format!(
            "@prefix ldp: <http://www.w3.org/ns/ldp#> .\n\
             @prefix dcterms: <http://purl.org/dc/terms/> .\n\
             <> a ldp:BasicContainer ;\n   dcterms:title \"{}\" .\n",
            title
        );

        let response = self
            .http
            .put(container_url)
            .header("Content-Type", "text/turtle")
            .header("Link", "<http://www.w3.org/ns/ldp#BasicContainer>; rel=\"type\"")
            .bearer_auth(token)
            .body(turtle)
            .send()
            .await?;

        if response.status().is_success() {
            tracing::debug!("Created container: {}", container_url);
            Ok(())
        } else {
            Err(PodError::Status {
                status: response.status().as_u16(),
                url: container_url.to_string(),
            })
        }
    }
}
