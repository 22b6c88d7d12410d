//! Implementation guide package loading.
//!
//! Downloads an npm-style FHIR package (`.tgz`), walks the `package/`
//! entries, and collects StructureDefinition and ImplementationGuide
//! resources into the conformance registry.

use std::io::Read;

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use tar::Archive;

use crate::fhir::Resource;
use crate::registry::ConformanceRegistry;

/// Download and load the configured IG package. An empty URL skips loading.
pub async fn load_ig_package(url: &str, registry: &mut ConformanceRegistry) -> Result<()> {
    if url.is_empty() {
        tracing::info!("No IG package URL configured, skipping IG loading");
        return Ok(());
    }

    tracing::info!("Loading IG package from: {}", url);
    let data = download_package(url).await?;
    let (sd_count, ig_count) = load_package_bytes(&data, registry)?;
    tracing::info!(
        "Loaded {} StructureDefinitions, {} ImplementationGuides from IG package",
        sd_count,
        ig_count
    );
    Ok(())
}

async fn download_package(url: &str) -> Result<Vec<u8>> {
    let response = reqwest::get(url).await.context("package download failed")?;
    if !response.status().is_success() {
        bail!("Failed to download package: HTTP {}", response.status());
    }
    let bytes = response.bytes().await?;
    tracing::debug!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}

/// Extract conformance resources from the raw `.tgz` bytes.
pub fn load_package_bytes(
    data: &[u8],
    registry: &mut ConformanceRegistry,
) -> Result<(usize, usize)> {
    let mut archive = Archive::new(GzDecoder::new(data));
    let mut sd_count = 0;
    let mut ig_count = 0;

    for entry in archive.entries().context("invalid tar archive")? {
        let mut entry = entry?;
        if entry.header().entry_type().is_dir() {
            continue;
        }

        let name = entry.path()?.to_string_lossy().to_string();
        if !name.ends_with(".json") {
            continue;
        }

        // Only files in the package root count; skip example/, xml/, ...
        let relative = name.strip_prefix("package/").unwrap_or(&name);
        if relative.contains('/') || relative.starts_with('.') || relative == "package.json" {
            continue;
        }

        let is_structure_definition = relative.starts_with("StructureDefinition-");
        let is_implementation_guide = relative.starts_with("ImplementationGuide-");
        if !is_structure_definition && !is_implementation_guide {
            continue;
        }

        let mut content = String::new();
        entry.read_to_string(&mut content)?;

        match serde_json::from_str(&content).map_err(anyhow::Error::from).and_then(|v| {
            Resource::from_value(v).map_err(anyhow::Error::from)
        }) {
            Ok(resource) => {
                tracing::debug!(
                    "Loaded {} from {}",
                    resource.resource_type().unwrap_or_default(),
                    name
                );
                registry.store(resource);
                if is_structure_definition {
                    sd_count += 1;
                } else {
                    ig_count += 1;
                }
            }
            Err(e) => {
                tracing::warn!("Failed to parse resource from {}: {}", name, e);
            }
        }
    }

    Ok((sd_count, ig_count))
}
