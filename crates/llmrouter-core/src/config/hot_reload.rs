//! Catalog hot-reload: zero-downtime updates to the model registry.
//!
//! Mirrors the gateway's original config-watcher shape -- poll the source
//! file's mtime on an interval, reload and validate on change, publish the
//! result on a broadcast channel -- but retargets it onto the catalog and
//! [`ModelRegistry`], whose [`ModelRegistry::reload`] already swaps its
//! snapshot atomically via `arc-swap`. The watcher is the thing that decides
//! *when* to call `reload`; the registry is the thing that makes the call
//! itself safe to do concurrently with in-flight requests.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use log::{error, info, warn};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::models::catalog::ModelOverride;

use super::loader::load_catalog_from_path;
use super::validation::ConfigValidator;
use crate::services::registry::ModelRegistry;

const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// One successful reload, broadcast to anyone subscribed.
#[derive(Debug, Clone)]
pub struct CatalogUpdate {
    pub version: u64,
    pub model_count: usize,
}

/// Polls a catalog file for changes and reloads the registry in place when
/// it does. Construct one per process; `start_watching` spawns the polling
/// task and returns its handle so the caller can abort it on shutdown.
pub struct CatalogWatcher {
    registry: Arc<ModelRegistry>,
    catalog_path: PathBuf,
    overrides: Vec<ModelOverride>,
    update_sender: broadcast::Sender<CatalogUpdate>,
    version_counter: AtomicU64,
}

impl CatalogWatcher {
    pub fn new(registry: Arc<ModelRegistry>, catalog_path: impl Into<PathBuf>, overrides: Vec<ModelOverride>) -> Self {
        let (update_sender, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self {
            registry,
            catalog_path: catalog_path.into(),
            overrides,
            update_sender,
            version_counter: AtomicU64::new(0),
        }
    }

    /// Subscribes to reload notifications. Lagging receivers miss older
    /// updates but always see the most recent one once they catch up.
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogUpdate> {
        self.update_sender.subscribe()
    }

    /// Spawns the background polling task. Dropping or aborting the
    /// returned handle stops watching; the registry keeps serving whatever
    /// snapshot was last loaded.
    pub fn start_watching(self: Arc<Self>, poll_interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut last_modified = get_file_modified_time(&self.catalog_path);
            let mut interval = tokio::time::interval(poll_interval);
            loop {
                interval.tick().await;
                let modified = get_file_modified_time(&self.catalog_path);
                if modified == last_modified {
                    continue;
                }
                last_modified = modified;
                match self.reload() {
                    Ok(update) => info!(
                        "catalog reload: version={} models={}",
                        update.version, update.model_count
                    ),
                    Err(e) => warn!("catalog reload failed, keeping previous snapshot: {}", e),
                }
            }
        })
    }

    /// Reloads immediately, outside the poll loop -- used by an admin
    /// endpoint that wants synchronous feedback instead of waiting for the
    /// next tick.
    pub fn reload(&self) -> Result<CatalogUpdate, Box<dyn std::error::Error>> {
        let path = self
            .catalog_path
            .to_str()
            .ok_or("catalog path is not valid UTF-8")?;

        let models = load_catalog_from_path(path, &self.overrides)?;

        let result = ConfigValidator::validate_comprehensive(
            &catalog_only_config(&self.overrides),
            &models,
        );
        for warning in &result.warnings {
            warn!("catalog reload warning: {}", warning);
        }
        if !result.is_valid {
            return Err(format!("catalog failed validation: {}", result.errors.join("; ")).into());
        }

        let model_count = models.len();
        self.registry.reload(models, &self.overrides)?;

        let version = self.version_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let update = CatalogUpdate { version, model_count };

        // No receivers is not an error: nothing is subscribed yet, or
        // everyone who cared has already disconnected.
        let _ = self.update_sender.send(update.clone());
        Ok(update)
    }
}

/// A placeholder config carrying only what [`ConfigValidator`] needs to run
/// its catalog-shaped checks when reloading outside the normal startup path,
/// where the full [`super::settings::GatewayConfig`] isn't in scope.
fn catalog_only_config(_overrides: &[ModelOverride]) -> super::settings::GatewayConfig {
    super::settings::GatewayConfig {
        version: 1,
        providers: Default::default(),
        routing: Default::default(),
        circuit_breaker: Default::default(),
        model_overrides: Vec::new(),
        model_requests_per_minute: Some(1),
        state_store: Default::default(),
    }
}

fn get_file_modified_time(path: &std::path::Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).map_err(|e| {
        error!("failed to read catalog file metadata: {}", e);
        e
    }).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_catalog(path: &std::path::Path, models_json: &str) {
        let mut f = fs::File::create(path).unwrap();
        f.write_all(models_json.as_bytes()).unwrap();
    }

    fn sample_catalog() -> &'static str {
        r#"[{"name":"a","provider":"groq","model":"a-upstream","context_size":8192,"max_output_tokens":2048,"weight":1}]"#
    }

    #[test]
    fn reload_publishes_an_update_and_swaps_the_registry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        write_catalog(&path, sample_catalog());

        let cwd = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();

        let registry = ModelRegistry::new(vec![]).unwrap();
        let watcher = CatalogWatcher::new(registry.clone(), path, Vec::new());
        let mut rx = watcher.subscribe();

        let update = watcher.reload().unwrap();
        assert_eq!(update.model_count, 1);
        assert_eq!(registry.all().len(), 1);
        assert_eq!(rx.try_recv().unwrap().version, 1);

        std::env::set_current_dir(cwd).unwrap();
    }

    #[test]
    fn reload_rejects_a_catalog_with_duplicate_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        write_catalog(
            &path,
            r#"[
                {"name":"a","provider":"groq","model":"a1","context_size":8192,"max_output_tokens":2048,"weight":1},
                {"name":"a","provider":"openai","model":"a2","context_size":8192,"max_output_tokens":2048,"weight":1}
            ]"#,
        );

        let cwd = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();

        let registry = ModelRegistry::new(vec![]).unwrap();
        let watcher = CatalogWatcher::new(registry, path, Vec::new());
        assert!(watcher.reload().is_err());

        std::env::set_current_dir(cwd).unwrap();
    }

    #[test]
    fn file_modified_time_changes_are_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        write_catalog(&path, sample_catalog());

        let first = get_file_modified_time(&path);
        assert!(first.is_some());

        std::thread::sleep(Duration::from_millis(10));
        write_catalog(&path, sample_catalog());
        let second = get_file_modified_time(&path);
        assert!(second.is_some());
    }
}
