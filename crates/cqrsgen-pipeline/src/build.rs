use std::path::{Path, PathBuf};
use std::sync::Arc;

use cqrsgen_core::{Asset, AssetSource, Registry, ServiceRef};

use crate::archive::archive_binary;
use crate::compiler::{BIN_NAME, CompileJob, Compiler};
use crate::error::PipelineError;
use crate::progress::{Phase, RunProgress};
use crate::template::{Fields, TemplateSet};

/// Subdirectory of the output root holding asset packages and archives.
pub const ASSETS_DIR: &str = "assets";

/// Drives templates, compiler and archiver over every registered asset.
///
/// Output layout:
/// ```text
/// output_root/
///   assets/
///     <asset key>/
///       Cargo.toml
///       src/main.rs
///       bootstrap          -- compiled executable
///     <binary sha256>.tar.gz
/// ```
pub struct Builder {
    output_root: PathBuf,
    templates: TemplateSet,
    compiler: Box<dyn Compiler>,
    crate_path: PathBuf,
    runtime_version: String,
    progress: Arc<RunProgress>,
}

impl Builder {
    pub fn new(output_root: PathBuf, templates: TemplateSet, compiler: Box<dyn Compiler>) -> Self {
        Self {
            output_root,
            templates,
            compiler,
            crate_path: PathBuf::from("."),
            runtime_version: "0.13".into(),
            progress: Arc::new(RunProgress::new()),
        }
    }

    /// Crate defining the services, referenced by path from every asset
    /// package, and the `lambda_runtime` version those packages depend on.
    pub fn with_service_crate(mut self, crate_path: PathBuf, runtime_version: impl Into<String>) -> Self {
        self.crate_path = crate_path;
        self.runtime_version = runtime_version.into();
        self
    }

    pub fn with_progress(mut self, progress: Arc<RunProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.output_root.join(ASSETS_DIR)
    }

    /// Create the output root. An existing one is reused.
    pub async fn init(&self) -> Result<(), PipelineError> {
        tokio::fs::create_dir_all(&self.output_root).await?;
        tracing::debug!(path = %self.output_root.display(), "Output root ready");
        Ok(())
    }

    /// Remove the output root and everything under it.
    pub async fn clean(&self) -> Result<(), PipelineError> {
        if tokio::fs::try_exists(&self.output_root).await? {
            tokio::fs::remove_dir_all(&self.output_root).await?;
            tracing::info!(path = %self.output_root.display(), "Output removed");
        }
        Ok(())
    }

    /// Build every asset in registry order, attaching each archive path.
    ///
    /// Stops at the first failure. Assets built before it keep their paths.
    pub async fn build(&self, registry: &mut Registry) -> Result<(), PipelineError> {
        let mut assets = registry.assets_mut();
        self.progress.phase_started(Phase::Build, assets.len());

        for asset in assets.iter_mut() {
            let archive = self.build_asset(&**asset).await?;
            let archive_name = archive
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            asset.set_build_path(archive)?;
            self.progress.record_built(asset.kind(), asset.name(), &archive_name);
        }

        self.progress.phase_finished(Phase::Build);
        Ok(())
    }

    async fn build_asset(&self, asset: &dyn Asset) -> Result<PathBuf, PipelineError> {
        let package_dir = self.assets_dir().join(asset.key());
        tracing::info!(
            kind = %asset.kind(),
            asset = %asset.name(),
            key = %asset.key(),
            "Building asset"
        );

        let source = self.templates.render(asset)?;
        let manifest = self
            .templates
            .render_cargo_manifest(asset, &self.package_fields(asset))?;

        let src_dir = package_dir.join("src");
        tokio::fs::create_dir_all(&src_dir).await?;
        tokio::fs::write(src_dir.join("main.rs"), source).await?;
        tokio::fs::write(package_dir.join("Cargo.toml"), manifest).await?;

        let binary = package_dir.join(BIN_NAME);
        let job = CompileJob {
            asset: asset.name().to_string(),
            package_dir,
            output: binary.clone(),
        };
        self.compiler.compile(&job).await?;

        archive_binary(&binary, &self.assets_dir(), BIN_NAME)
    }

    fn package_fields(&self, asset: &dyn Asset) -> Fields {
        let key = asset.key();
        Fields::new()
            .text("name", asset.name())
            .text("crate_name", format!("asset-{}", key.get(..16).unwrap_or(key)))
            .text("bin_name", BIN_NAME)
            .text("service_crate", service_of(asset).crate_name())
            .text("crate_path", self.crate_path.display().to_string())
            .text("runtime_version", self.runtime_version.as_str())
    }
}

fn service_of(asset: &dyn Asset) -> &ServiceRef {
    match asset.source() {
        AssetSource::Method(method) => method.service(),
        AssetSource::Mutation(mutation) => mutation.service(),
    }
}
