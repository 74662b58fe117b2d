use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::method::Method;
use crate::mutation::Mutation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Command,
    Query,
    Mutation,
    /// Declared but unsupported: no template and no build path exist for it.
    Function,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Command => "command",
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Function => "function",
        })
    }
}

/// Typed view of an asset for code generation.
#[derive(Debug, Clone, Copy)]
pub enum AssetSource<'a> {
    Method(&'a Method),
    Mutation(&'a Mutation),
}

/// A unit of generated, compiled and deployed work.
pub trait Asset: Send + Sync {
    fn kind(&self) -> AssetKind;
    fn name(&self) -> &str;
    /// Content hash of the asset's module path and name, fixed at registration.
    fn key(&self) -> &str;
    fn package_name(&self) -> &str;
    fn source(&self) -> AssetSource<'_>;

    fn artifacts(&self) -> &Artifacts;
    fn artifacts_mut(&mut self) -> &mut Artifacts;

    fn build_path(&self) -> Option<&Path> {
        self.artifacts().build_path()
    }

    fn remote_key(&self) -> Option<&str> {
        self.artifacts().remote_key()
    }

    fn set_build_path(&mut self, path: PathBuf) -> Result<(), RegistryError> {
        let name = self.name().to_string();
        self.artifacts_mut().set_build_path(&name, path)
    }

    fn set_remote_key(&mut self, key: String) -> Result<(), RegistryError> {
        let name = self.name().to_string();
        self.artifacts_mut().set_remote_key(&name, key)
    }
}

/// Build and publish results attached to an asset. Each is set at most once,
/// build path first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifacts {
    build_path: Option<PathBuf>,
    remote_key: Option<String>,
}

impl Artifacts {
    pub fn build_path(&self) -> Option<&Path> {
        self.build_path.as_deref()
    }

    pub fn remote_key(&self) -> Option<&str> {
        self.remote_key.as_deref()
    }

    fn set_build_path(&mut self, asset: &str, path: PathBuf) -> Result<(), RegistryError> {
        if self.build_path.is_some() {
            return Err(RegistryError::AlreadyBuilt(asset.to_string()));
        }
        self.build_path = Some(path);
        Ok(())
    }

    fn set_remote_key(&mut self, asset: &str, key: String) -> Result<(), RegistryError> {
        if self.build_path.is_none() {
            return Err(RegistryError::NotBuilt(asset.to_string()));
        }
        if self.remote_key.is_some() {
            return Err(RegistryError::AlreadyPublished(asset.to_string()));
        }
        self.remote_key = Some(key);
        Ok(())
    }
}
