use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cqrsgen_core::Registry;
use cqrsgen_pipeline::infra::{self, DiscoveredInfra};
use cqrsgen_pipeline::settings::{SETTINGS_FILE, Settings};
use cqrsgen_pipeline::{
    Builder, CargoCompiler, DeploymentManifest, LogSink, Publisher, RunProgress, TemplateSet,
};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(
    name = "cqrsgen",
    version,
    about = "cqrsgen: generate, build and publish CQRS service functions"
)]
struct Cli {
    /// Project settings declaring the services
    #[arg(long, short, default_value = SETTINGS_FILE)]
    config: PathBuf,

    /// Directory searched for the infra config (defaults to the current directory)
    #[arg(long)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Build every asset, publish the archives and write the manifest (default)
    Deploy,
    /// Render and compile every asset without publishing
    Build,
    /// Print the manifest for the declared services
    Manifest,
    /// Delete the output directory
    Clean,
}

/// Everything a command needs, resolved once from the settings file and
/// the discovered infra config.
struct Project {
    settings: Settings,
    base_dir: PathBuf,
    infra: DiscoveredInfra,
    progress: Arc<RunProgress>,
}

impl Project {
    fn load(config: &Path, root: Option<PathBuf>) -> Result<Self> {
        let settings = Settings::from_file(config)?;
        let parent = config
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let base_dir = std::path::absolute(parent).context("resolving settings directory")?;
        let root = match root {
            Some(root) => root,
            None => std::env::current_dir().context("reading current directory")?,
        };
        let infra = infra::discover(&root)?;

        tracing::info!(
            service = %infra.config.context.name,
            bucket = %infra.config.context.bucket,
            output = %infra.output_root().display(),
            "Loaded project"
        );

        Ok(Self {
            settings,
            base_dir,
            infra,
            progress: Arc::new(RunProgress::with_sink(Arc::new(LogSink))),
        })
    }

    fn registry(&self) -> Result<Registry> {
        let registry = self.settings.registry()?;
        if registry.is_empty() {
            tracing::warn!("No services declared");
        }
        Ok(registry)
    }

    fn builder(&self) -> Result<Builder> {
        let build = &self.settings.build;
        let output_root = self.infra.output_root();
        let templates = TemplateSet::from_settings(&self.settings.templates, &self.base_dir)?;
        let compiler = CargoCompiler::new(build.target.clone())
            .with_bin(build.cargo_bin.clone())
            .with_target_dir(output_root.join("target"));

        Ok(Builder::new(output_root, templates, Box::new(compiler))
            .with_service_crate(
                self.base_dir.join(&build.crate_path),
                build.runtime_version.clone(),
            )
            .with_progress(self.progress.clone()))
    }

    fn publisher(&self) -> Result<Publisher> {
        let publish = &self.settings.publish;
        let store = publish
            .store
            .open(&self.infra.config.context.bucket, &self.infra.dir)?;
        Ok(Publisher::new(store, publish.prefix.clone()).with_progress(self.progress.clone()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so `cqrsgen manifest` output on stdout stays clean
    fmt()
        .with_env_filter(EnvFilter::from_env("CQRSGEN_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Deploy);

    let project = Project::load(&cli.config, cli.root)
        .with_context(|| format!("loading project from {}", cli.config.display()))?;

    match command {
        Commands::Deploy => deploy(&project).await,
        Commands::Build => {
            let mut registry = project.registry()?;
            let builder = project.builder()?;
            builder.init().await?;
            builder.build(&mut registry).await?;
            Ok(())
        }
        Commands::Manifest => {
            let registry = project.registry()?;
            let manifest = DeploymentManifest::from_registry(&registry, &project.infra.config);
            println!("{}", manifest.to_json()?);
            Ok(())
        }
        Commands::Clean => {
            project.builder()?.clean().await?;
            Ok(())
        }
    }
}

async fn deploy(project: &Project) -> Result<()> {
    let mut registry = project.registry()?;
    let builder = project.builder()?;
    let publisher = project.publisher()?;

    builder.init().await?;
    builder.build(&mut registry).await.context("build failed")?;
    publisher.publish(&mut registry).await.context("publish failed")?;

    let manifest = DeploymentManifest::from_registry(&registry, &project.infra.config);
    let path = manifest.write(builder.output_root()).await?;

    let snapshot = project.progress.snapshot();
    tracing::info!(
        built = snapshot.assets_built,
        published = snapshot.assets_published,
        skipped = snapshot.uploads_skipped,
        bytes = snapshot.bytes_uploaded,
        "Deploy complete"
    );
    println!("{}", path.display());
    Ok(())
}
