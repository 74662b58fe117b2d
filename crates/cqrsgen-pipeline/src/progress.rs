use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cqrsgen_core::AssetKind;

/// One step of a run, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    PhaseStarted { phase: Phase, total: usize },
    AssetBuilt { kind: AssetKind, name: String, archive: String },
    AssetPublished { name: String, remote_key: String, bytes: u64 },
    AssetSkipped { name: String, remote_key: String },
    PhaseFinished { phase: Phase },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Build,
    Publish,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Build => "build",
            Self::Publish => "publish",
        })
    }
}

/// Receives progress events. Implementations can draw bars, forward to a
/// UI, or simply log.
pub trait ProgressSink: Send + Sync {
    fn event(&self, event: &ProgressEvent);
}

/// Emits every event as a tracing event.
#[derive(Debug, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::PhaseStarted { phase, total } => {
                tracing::info!(%phase, total, "Phase started");
            }
            ProgressEvent::AssetBuilt { kind, name, archive } => {
                tracing::info!(%kind, asset = %name, %archive, "Asset built");
            }
            ProgressEvent::AssetPublished { name, remote_key, bytes } => {
                tracing::info!(asset = %name, %remote_key, bytes, "Asset published");
            }
            ProgressEvent::AssetSkipped { name, remote_key } => {
                tracing::info!(asset = %name, %remote_key, "Already published, skipping upload");
            }
            ProgressEvent::PhaseFinished { phase } => {
                tracing::info!(%phase, "Phase finished");
            }
        }
    }
}

/// Counters for one run. Thread-safe so a shared handle can be read while
/// a phase is in flight.
pub struct RunProgress {
    pub assets_built: AtomicU64,
    pub assets_published: AtomicU64,
    pub uploads_skipped: AtomicU64,
    pub bytes_uploaded: AtomicU64,
    sink: Option<Arc<dyn ProgressSink>>,
}

impl std::fmt::Debug for RunProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunProgress")
            .field("assets_built", &self.assets_built)
            .field("assets_published", &self.assets_published)
            .field("uploads_skipped", &self.uploads_skipped)
            .field("bytes_uploaded", &self.bytes_uploaded)
            .finish()
    }
}

impl Default for RunProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl RunProgress {
    pub fn new() -> Self {
        Self {
            assets_built: AtomicU64::new(0),
            assets_published: AtomicU64::new(0),
            uploads_skipped: AtomicU64::new(0),
            bytes_uploaded: AtomicU64::new(0),
            sink: None,
        }
    }

    pub fn with_sink(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink: Some(sink),
            ..Self::new()
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(sink) = &self.sink {
            sink.event(&event);
        }
    }

    pub fn phase_started(&self, phase: Phase, total: usize) {
        self.emit(ProgressEvent::PhaseStarted { phase, total });
    }

    pub fn phase_finished(&self, phase: Phase) {
        self.emit(ProgressEvent::PhaseFinished { phase });
    }

    pub fn record_built(&self, kind: AssetKind, name: &str, archive: &str) {
        self.assets_built.fetch_add(1, Ordering::Relaxed);
        self.emit(ProgressEvent::AssetBuilt {
            kind,
            name: name.to_string(),
            archive: archive.to_string(),
        });
    }

    pub fn record_published(&self, name: &str, remote_key: &str, bytes: u64) {
        self.assets_published.fetch_add(1, Ordering::Relaxed);
        self.bytes_uploaded.fetch_add(bytes, Ordering::Relaxed);
        self.emit(ProgressEvent::AssetPublished {
            name: name.to_string(),
            remote_key: remote_key.to_string(),
            bytes,
        });
    }

    /// The object was already in the store; counts as published.
    pub fn record_skipped(&self, name: &str, remote_key: &str) {
        self.assets_published.fetch_add(1, Ordering::Relaxed);
        self.uploads_skipped.fetch_add(1, Ordering::Relaxed);
        self.emit(ProgressEvent::AssetSkipped {
            name: name.to_string(),
            remote_key: remote_key.to_string(),
        });
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            assets_built: self.assets_built.load(Ordering::Relaxed),
            assets_published: self.assets_published.load(Ordering::Relaxed),
            uploads_skipped: self.uploads_skipped.load(Ordering::Relaxed),
            bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of the run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProgressSnapshot {
    pub assets_built: u64,
    pub assets_published: u64,
    pub uploads_skipped: u64,
    pub bytes_uploaded: u64,
}
