//! Manifest loading. The manifest is read once at startup; anything wrong
//! with it is a [`ConfigError`] and must stop the process from serving.

use crate::config::HybridConfig;
use crate::error::ConfigError;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexPlan {
    #[serde(default)]
    pub hybrid: HybridConfig,
}

/// The subset of the index manifest the retrieval core consumes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default)]
    pub index_plan: IndexPlan,
}

impl Manifest {
    /// Parse and validate a manifest document
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let manifest: Manifest = serde_json::from_str(raw)?;
        manifest
            .index_plan
            .hybrid
            .validate()
            .map_err(ConfigError::Invalid)?;
        Ok(manifest)
    }

    /// Read, parse and validate the manifest at `path`
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest = Self::from_json_str(&raw)?;

        info!(
            "Loaded manifest {} (version {}, fusion method {})",
            path.display(),
            manifest.version.as_deref().unwrap_or("unversioned"),
            manifest.hybrid().fusion.method.as_str()
        );

        Ok(manifest)
    }

    pub fn hybrid(&self) -> &HybridConfig {
        &self.index_plan.hybrid
    }

    /// Hand off the hybrid configuration as the shared, immutable handle
    /// the orchestrator is constructed with.
    pub fn into_shared(self) -> Arc<HybridConfig> {
        Arc::new(self.index_plan.hybrid)
    }
}
