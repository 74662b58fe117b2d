use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::PipelineError;

/// Infrastructure app config (`cdk.json`).
pub const INFRA_FILE: &str = "cdk.json";

/// Directory under the infra config's directory that holds every output.
pub const OUTPUT_DIR: &str = "cdk.out";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfraConfig {
    pub app: String,
    pub context: InfraContext,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfraContext {
    pub name: String,
    pub bucket: String,
}

/// A parsed infra config and the directory it was found in.
#[derive(Debug, Clone)]
pub struct DiscoveredInfra {
    pub config: InfraConfig,
    pub dir: PathBuf,
}

impl DiscoveredInfra {
    pub fn output_root(&self) -> PathBuf {
        self.dir.join(OUTPUT_DIR)
    }
}

/// Search `root` recursively for [`INFRA_FILE`]; the first match in
/// name-sorted walk order wins.
///
/// A directory that cannot be read before a match is found fails the search.
pub fn discover(root: &Path) -> Result<DiscoveredInfra, PipelineError> {
    let walk = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_skipped(entry.file_name()));

    let mut found = None;
    for entry in walk {
        let entry = entry.map_err(|e| PipelineError::ConfigParse {
            path: e.path().unwrap_or(root).to_path_buf(),
            reason: format!("searching for {INFRA_FILE}: {e}"),
        })?;
        if entry.file_type().is_file() && entry.file_name() == INFRA_FILE {
            found = Some(entry.into_path());
            break;
        }
    }
    let path = found.ok_or_else(|| PipelineError::ConfigNotFound {
        file: INFRA_FILE.to_string(),
        root: root.to_path_buf(),
    })?;

    tracing::info!(path = %path.display(), "Found infra config");
    let config = load(&path)?;
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf());
    let dir = std::path::absolute(&dir)?;
    Ok(DiscoveredInfra { config, dir })
}

pub fn load(path: &Path) -> Result<InfraConfig, PipelineError> {
    let parse_error = |reason: String| PipelineError::ConfigParse {
        path: path.to_path_buf(),
        reason,
    };
    let content = std::fs::read_to_string(path).map_err(|e| parse_error(e.to_string()))?;
    serde_json::from_str(&content).map_err(|e| parse_error(e.to_string()))
}

// Build output and dependency trees never hold the project's infra config.
fn is_skipped(name: &std::ffi::OsStr) -> bool {
    name == OUTPUT_DIR || name == "target" || name == "node_modules" || name == ".git"
}
