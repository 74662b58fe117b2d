use std::path::{Path, PathBuf};

use cqrsgen_core::{Asset, Registry};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::infra::InfraConfig;

pub const MANIFEST_FILE: &str = "manifest.json";

/// Executable name every deployed function starts.
pub const HANDLER: &str = "bootstrap";

/// Custom runtime the executables run on.
pub const RUNTIME: &str = "provided.al2023";

/// Name of the mutation's function descriptor.
pub const MUTATION_NAME: &str = "Mutation";

/// Deployment document handed to infrastructure tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentManifest {
    pub service: String,
    pub bucket: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<MethodEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<MethodEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutations: Option<MethodEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<MethodEntry>,
}

/// One deployable function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodEntry {
    pub name: String,
    /// Empty until the asset is published.
    #[serde(rename = "remoteKey")]
    pub remote_key: String,
    pub handler: String,
    pub runtime: String,
}

impl MethodEntry {
    fn new(name: &str, asset: &dyn Asset) -> Self {
        Self {
            name: name.to_string(),
            remote_key: asset.remote_key().unwrap_or_default().to_string(),
            handler: HANDLER.to_string(),
            runtime: RUNTIME.to_string(),
        }
    }
}

impl DeploymentManifest {
    pub fn from_registry(registry: &Registry, infra: &InfraConfig) -> Self {
        let entries = |assets: Vec<&dyn Asset>| -> Vec<MethodEntry> {
            assets
                .into_iter()
                .map(|asset| MethodEntry::new(asset.name(), asset))
                .collect()
        };

        Self {
            service: infra.context.name.clone(),
            bucket: infra.context.bucket.clone(),
            events: registry
                .mutation()
                .map(|m| m.event_names())
                .unwrap_or_default(),
            commands: entries(registry.commands().iter().map(|c| c as &dyn Asset).collect()),
            queries: entries(registry.queries().iter().map(|q| q as &dyn Asset).collect()),
            mutations: registry
                .mutation()
                .map(|m| MethodEntry::new(MUTATION_NAME, m)),
            functions: Vec::new(),
        }
    }

    pub fn to_json(&self) -> Result<String, PipelineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the manifest as `<output_root>/manifest.json`.
    pub async fn write(&self, output_root: &Path) -> Result<PathBuf, PipelineError> {
        tokio::fs::create_dir_all(output_root).await?;
        let path = output_root.join(MANIFEST_FILE);
        tokio::fs::write(&path, self.to_json()?).await?;
        tracing::info!(
            path = %path.display(),
            commands = self.commands.len(),
            queries = self.queries.len(),
            events = self.events.len(),
            "Manifest written"
        );
        Ok(path)
    }
}
