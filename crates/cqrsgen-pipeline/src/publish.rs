use std::sync::Arc;

use cqrsgen_core::{Asset, Registry};

use crate::error::PipelineError;
use crate::progress::{Phase, RunProgress};
use crate::store::BlobStore;

pub const DEFAULT_PREFIX: &str = "assets/";

/// Uploads built archives under content-addressed keys.
pub struct Publisher {
    store: Box<dyn BlobStore>,
    prefix: String,
    progress: Arc<RunProgress>,
}

impl Publisher {
    pub fn new(store: Box<dyn BlobStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            progress: Arc::new(RunProgress::new()),
        }
    }

    pub fn with_progress(mut self, progress: Arc<RunProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Publish every built asset in registry order, attaching each remote key.
    ///
    /// The first failure aborts the remaining uploads; nothing is retried or
    /// rolled back.
    pub async fn publish(&self, registry: &mut Registry) -> Result<(), PipelineError> {
        let mut assets = registry.assets_mut();
        self.progress.phase_started(Phase::Publish, assets.len());

        for asset in assets.iter_mut() {
            let key = self.publish_asset(&**asset).await?;
            asset.set_remote_key(key)?;
        }

        self.progress.phase_finished(Phase::Publish);
        Ok(())
    }

    async fn publish_asset(&self, asset: &dyn Asset) -> Result<String, PipelineError> {
        let archive = asset.build_path().ok_or_else(|| PipelineError::PublishFailure {
            key: asset.name().to_string(),
            reason: "asset has not been built".into(),
        })?;
        let file_name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| PipelineError::PublishFailure {
                key: asset.name().to_string(),
                reason: format!("archive path {} has no file name", archive.display()),
            })?;
        let key = format!("{}{}", self.prefix, file_name);

        if self.store.exists(&key).await? {
            self.progress.record_skipped(asset.name(), &key);
            return Ok(key);
        }

        tracing::info!(asset = %asset.name(), key = %key, "Uploading archive");
        let bytes = self.store.upload(&key, archive).await?;
        self.progress.record_published(asset.name(), &key, bytes);
        Ok(key)
    }
}
