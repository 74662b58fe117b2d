//! Build pipeline for cqrsgen.
//!
//! A run moves every registered asset through the same phases:
//!
//! 1. [`build::Builder`] renders the asset's entry point from a
//!    [`template::TemplateSet`], compiles it with a [`compiler::Compiler`]
//!    and archives the executable under its content hash,
//! 2. [`publish::Publisher`] uploads each archive to a [`store::BlobStore`],
//! 3. [`manifest::DeploymentManifest`] describes the result for the
//!    infrastructure app found by [`infra::discover`].

pub mod archive;
pub mod build;
pub mod compiler;
pub mod error;
pub mod infra;
pub mod manifest;
pub mod progress;
pub mod publish;
pub mod settings;
pub mod store;
pub mod template;

pub use build::Builder;
pub use compiler::{CargoCompiler, CompileJob, Compiler};
pub use error::{BuildFailureCause, PipelineError};
pub use infra::{DiscoveredInfra, InfraConfig};
pub use manifest::DeploymentManifest;
pub use progress::{LogSink, ProgressSink, RunProgress};
pub use publish::Publisher;
pub use settings::Settings;
pub use store::{BlobStore, LocalBlobStore};
pub use template::TemplateSet;

#[cfg(feature = "http")]
pub use store::HttpBlobStore;
