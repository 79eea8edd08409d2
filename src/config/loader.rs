use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use super::AppConfig;
use crate::error::Error;

/// Load a config file into a loose value, switching the parser on the
/// file extension.
pub fn load_config_value(path: &Path) -> anyhow::Result<Value> {
    let content = std::fs::read_to_string(path)?;
    let value = if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };
    Ok(value)
}

/// Per-module configuration overlays, loaded lazily and cached for the
/// remainder of the process. Concurrent first access to the same module is
/// safe: the entry API keeps the first inserted snapshot.
#[derive(Default)]
pub struct ModuleConfigCache {
    inner: DashMap<String, Arc<AppConfig>>,
}

impl ModuleConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The merged configuration for `module`. The overlay file is
    /// `<conf_path>/<module>/config.{yaml,yml,json}`; a missing file means
    /// the module simply inherits the base configuration.
    pub fn module_config(
        &self,
        module: &str,
        base: &Arc<AppConfig>,
        conf_path: Option<&Path>,
    ) -> Result<Arc<AppConfig>, Error> {
        if let Some(cached) = self.inner.get(module) {
            return Ok(Arc::clone(cached.value()));
        }

        let merged = match conf_path.map(|p| p.join(module)) {
            Some(dir) => match Self::find_overlay(&dir) {
                Some(file) => {
                    let overlay = load_config_value(&file)
                        .map_err(|e| Error::Config(format!("{}: {}", file.display(), e)))?;
                    debug!(module = %module, file = %file.display(), "module config loaded");
                    Arc::new(base.merged_with(&overlay)?)
                }
                None => base.clone(),
            },
            None => base.clone(),
        };

        let entry = self.inner.entry(module.to_string()).or_insert(merged);
        Ok(Arc::clone(entry.value()))
    }

    fn find_overlay(dir: &Path) -> Option<std::path::PathBuf> {
        ["config.yaml", "config.yml", "config.json"]
            .iter()
            .map(|name| dir.join(name))
            .find(|p| p.is_file())
    }

    /// Drop every cached overlay; part of the explicit reset lifecycle.
    pub fn reset(&self) {
        self.inner.clear();
    }
}
