//! Loads the gateway configuration and model catalog from the filesystem.
//!
//! Mirrors the security posture of the gateway's original single-file config
//! loader: the path must resolve inside the current working directory, the
//! file is capped in size before it's read, and schema validation runs
//! before the caller ever sees a value.

use std::fs;
use std::path::Path;

use log::{debug, warn};

use crate::models::catalog::ModelDefinition;

use super::settings::GatewayConfig;

const MAX_CONFIG_SIZE: u64 = 10 * 1024 * 1024;
const CATALOG_FETCH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Loads and validates the gateway configuration.
///
/// Path resolution order: `GATEWAY_CONFIG_PATH` env var, else `./config.json`.
pub fn load_gateway_config() -> Result<GatewayConfig, Box<dyn std::error::Error>> {
    let config_path =
        std::env::var("GATEWAY_CONFIG_PATH").unwrap_or_else(|_| "./config.json".to_string());

    let data = read_local_file_bounded(&config_path)?;
    let config: GatewayConfig = serde_json::from_str(&data)
        .map_err(|e| format!("invalid gateway config JSON: {}", e))?;
    config.validate()?;

    debug!(
        "loaded gateway config with {} providers",
        config.providers.len()
    );
    Ok(config)
}

/// Loads the model catalog from `GATEWAY_CATALOG_PATH` (default
/// `./catalog.json`), applying `overrides` and validating every entry.
///
/// Per §4.3, the source is either a local path or a URL: `http://`/`https://`
/// prefixes are fetched with a bounded timeout, everything else is treated as
/// a local path. The hot-reload watcher only ever polls a local path -- its
/// job is to notice a changed mtime, which a URL doesn't have -- so a
/// catalog served from a URL is load-time only and won't hot-reload.
pub async fn load_catalog(
    overrides: &[crate::models::catalog::ModelOverride],
) -> Result<Vec<ModelDefinition>, Box<dyn std::error::Error>> {
    let catalog_path = catalog_path();
    if is_url(&catalog_path) {
        load_catalog_from_url(&catalog_path, overrides).await
    } else {
        load_catalog_from_path(&catalog_path, overrides)
    }
}

fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Fetches the catalog document over HTTP(S) with [`CATALOG_FETCH_TIMEOUT`]
/// as the bound on the whole request, then validates it exactly like a
/// locally-loaded catalog.
async fn load_catalog_from_url(
    url: &str,
    overrides: &[crate::models::catalog::ModelOverride],
) -> Result<Vec<ModelDefinition>, Box<dyn std::error::Error>> {
    let client = reqwest::Client::builder()
        .timeout(CATALOG_FETCH_TIMEOUT)
        .build()?;
    let response = client.get(url).send().await?.error_for_status()?;
    let data = response.text().await?;

    let mut models: Vec<ModelDefinition> = serde_json::from_str(&data)
        .map_err(|e| format!("invalid catalog JSON fetched from '{}': {}", url, e))?;
    apply_overrides(&mut models, overrides)?;
    validate_catalog(&models)?;

    debug!("loaded catalog with {} models from {}", models.len(), url);
    Ok(models)
}

/// Default catalog path, resolved the same way [`load_catalog`] resolves it.
/// Exposed so the hot-reload watcher can poll the same file it was loaded
/// from without duplicating the env var lookup.
pub fn catalog_path() -> String {
    std::env::var("GATEWAY_CATALOG_PATH").unwrap_or_else(|_| "./catalog.json".to_string())
}

/// Loads and validates the catalog at an explicit path, applying `overrides`.
pub fn load_catalog_from_path(
    catalog_path: &str,
    overrides: &[crate::models::catalog::ModelOverride],
) -> Result<Vec<ModelDefinition>, Box<dyn std::error::Error>> {
    let data = read_local_file_bounded(catalog_path)?;
    let mut models: Vec<ModelDefinition> = serde_json::from_str(&data)
        .map_err(|e| format!("invalid catalog JSON: {}", e))?;

    apply_overrides(&mut models, overrides)?;
    validate_catalog(&models)?;

    debug!("loaded catalog with {} models", models.len());
    Ok(models)
}

fn validate_catalog(models: &[ModelDefinition]) -> Result<(), Box<dyn std::error::Error>> {
    for m in models {
        m.validate()?;
    }

    let mut seen = std::collections::HashSet::new();
    for m in models {
        if !seen.insert(m.name.clone()) {
            return Err(format!("duplicate model name '{}' in catalog", m.name).into());
        }
    }
    Ok(())
}

fn apply_overrides(
    models: &mut [ModelDefinition],
    overrides: &[crate::models::catalog::ModelOverride],
) -> Result<(), String> {
    for patch in overrides {
        let target = models
            .iter_mut()
            .find(|m| m.name == patch.name)
            .ok_or_else(|| format!("override for unknown model '{}'", patch.name))?;
        patch.apply(target)?;
    }
    Ok(())
}

/// Reads a local file after verifying it resolves inside the current
/// working directory and does not exceed the size cap.
fn read_local_file_bounded(raw_path: &str) -> Result<String, Box<dyn std::error::Error>> {
    let path = Path::new(raw_path);

    if !path.exists() {
        return Err(format!("cannot resolve path '{}'", raw_path).into());
    }

    let canonical_path = path
        .canonicalize()
        .map_err(|e| format!("cannot resolve path '{}': {}", raw_path, e))?;

    let current_dir =
        std::env::current_dir().map_err(|e| format!("cannot get current directory: {}", e))?;

    if !canonical_path.starts_with(&current_dir) {
        warn!("path '{}' is outside working directory", raw_path);
        return Err("path outside working directory".into());
    }

    let metadata = fs::metadata(&canonical_path)
        .map_err(|e| format!("cannot read file metadata: {}", e))?;

    if metadata.len() > MAX_CONFIG_SIZE {
        return Err(format!(
            "file too large: {} bytes (max {} bytes)",
            metadata.len(),
            MAX_CONFIG_SIZE
        )
        .into());
    }

    fs::read_to_string(&canonical_path).map_err(|e| format!("cannot read file: {}", e).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn rejects_missing_file() {
        let err = read_local_file_bounded("./definitely-not-here.json").unwrap_err();
        assert!(err.to_string().contains("cannot resolve"));
    }

    #[test]
    fn url_detection_covers_both_schemes() {
        assert!(is_url("https://example.com/catalog.json"));
        assert!(is_url("http://example.com/catalog.json"));
        assert!(!is_url("./catalog.json"));
        assert!(!is_url("/etc/catalog.json"));
    }

    #[test]
    fn reads_a_small_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(b"{\"ok\":true}").unwrap();

        let cwd = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let result = read_local_file_bounded("./cfg.json");
        std::env::set_current_dir(cwd).unwrap();

        assert_eq!(result.unwrap(), "{\"ok\":true}");
    }
}
