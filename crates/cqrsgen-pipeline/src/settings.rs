use std::path::{Path, PathBuf};

use cqrsgen_core::{Registry, ServiceDecl};
use serde::Deserialize;

use crate::error::PipelineError;
use crate::store::{BlobStore, LocalBlobStore};

pub const SETTINGS_FILE: &str = "cqrsgen.toml";

/// Project settings and service declarations, read from `cqrsgen.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub build: BuildSettings,
    #[serde(default)]
    pub publish: PublishSettings,
    #[serde(default)]
    pub templates: TemplateSettings,
    #[serde(default)]
    pub commands: Vec<ServiceDecl>,
    #[serde(default)]
    pub queries: Vec<ServiceDecl>,
    pub mutation: Option<ServiceDecl>,
}

#[derive(Debug, Deserialize)]
pub struct BuildSettings {
    #[serde(default = "default_cargo_bin")]
    pub cargo_bin: String,
    #[serde(default = "default_target")]
    pub target: String,
    /// Crate defining the declared services.
    #[serde(default = "default_crate_path")]
    pub crate_path: PathBuf,
    #[serde(default = "default_runtime_version")]
    pub runtime_version: String,
}

fn default_cargo_bin() -> String {
    "cargo".into()
}
fn default_target() -> String {
    "x86_64-unknown-linux-musl".into()
}
fn default_crate_path() -> PathBuf {
    PathBuf::from(".")
}
fn default_runtime_version() -> String {
    "0.13".into()
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            cargo_bin: default_cargo_bin(),
            target: default_target(),
            crate_path: default_crate_path(),
            runtime_version: default_runtime_version(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PublishSettings {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub store: StoreSettings,
}

fn default_prefix() -> String {
    "assets/".into()
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            store: StoreSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreSettings {
    /// Directory standing in for the bucket.
    Local { root: PathBuf },
    /// `PUT`/`HEAD` against `<endpoint>/<bucket>/<key>`.
    Http {
        endpoint: String,
        /// Environment variable holding a bearer token.
        token_env: Option<String>,
    },
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self::Local {
            root: PathBuf::from("cdk.out/bucket"),
        }
    }
}

impl StoreSettings {
    /// Open the configured store for `bucket`. Relative local roots resolve
    /// against `base_dir`.
    pub fn open(&self, bucket: &str, base_dir: &Path) -> Result<Box<dyn BlobStore>, PipelineError> {
        match self {
            Self::Local { root } => Ok(Box::new(LocalBlobStore::new(base_dir.join(root).join(bucket)))),
            #[cfg(feature = "http")]
            Self::Http { endpoint, token_env } => {
                let token = token_env.as_deref().and_then(|var| std::env::var(var).ok());
                Ok(Box::new(crate::store::HttpBlobStore::new(
                    endpoint.clone(),
                    bucket.to_string(),
                    token,
                )))
            }
            #[cfg(not(feature = "http"))]
            Self::Http { .. } => Err(PipelineError::NotImplemented(
                "http blob store requires the `http` feature".into(),
            )),
        }
    }
}

/// Template overrides; paths are relative to the settings file.
#[derive(Debug, Default, Deserialize)]
pub struct TemplateSettings {
    pub resolver: Option<PathBuf>,
    pub mutation: Option<PathBuf>,
    pub cargo_manifest: Option<PathBuf>,
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path).map_err(|e| PipelineError::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| PipelineError::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Register every declared service.
    pub fn registry(&self) -> Result<Registry, PipelineError> {
        let mut registry = Registry::new();
        for decl in &self.commands {
            registry.add_commands(decl.clone())?;
        }
        for decl in &self.queries {
            registry.add_queries(decl.clone())?;
        }
        if let Some(decl) = &self.mutation {
            registry.add_mutation(decl.clone())?;
        }
        Ok(registry)
    }
}
