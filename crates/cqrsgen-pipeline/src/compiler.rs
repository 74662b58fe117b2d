use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;

use crate::error::{BuildFailureCause, PipelineError};

/// Name of the executable inside every asset package and archive.
pub const BIN_NAME: &str = "bootstrap";

/// One scaffolded asset package to compile.
#[derive(Debug, Clone)]
pub struct CompileJob {
    pub asset: String,
    /// Directory holding `Cargo.toml` and `src/main.rs`.
    pub package_dir: PathBuf,
    /// Where the stripped executable must end up.
    pub output: PathBuf,
}

/// Turns an asset package into a single executable.
///
/// The cargo implementation shells out; tests substitute a stub.
pub trait Compiler: Send + Sync {
    fn compile<'a>(
        &'a self,
        job: &'a CompileJob,
    ) -> Pin<Box<dyn Future<Output = Result<(), PipelineError>> + Send + 'a>>;
}

/// Runs `cargo build --release --target <triple>` in the asset package.
///
/// Output streams are inherited so compiler diagnostics reach the terminal.
/// There is no timeout: a hung build hangs the run.
pub struct CargoCompiler {
    cargo_bin: String,
    target: String,
    target_dir: Option<PathBuf>,
}

impl CargoCompiler {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            cargo_bin: "cargo".into(),
            target: target.into(),
            target_dir: None,
        }
    }

    /// Override the path to the cargo binary.
    /// Useful when `~/.cargo/bin` is not on PATH.
    pub fn with_bin(mut self, path: impl Into<String>) -> Self {
        self.cargo_bin = path.into();
        self
    }

    /// Share one cargo target directory across all asset packages.
    pub fn with_target_dir(mut self, dir: PathBuf) -> Self {
        self.target_dir = Some(dir);
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    fn args(&self) -> Vec<String> {
        vec![
            "build".into(),
            "--release".into(),
            "--target".into(),
            self.target.clone(),
            "--bin".into(),
            BIN_NAME.into(),
        ]
    }

    fn built_binary(&self, package_dir: &Path) -> PathBuf {
        self.target_dir
            .clone()
            .unwrap_or_else(|| package_dir.join("target"))
            .join(&self.target)
            .join("release")
            .join(BIN_NAME)
    }

    async fn run(&self, job: &CompileJob) -> Result<(), PipelineError> {
        let args = self.args();
        let failure = |cause: BuildFailureCause| PipelineError::BuildFailure {
            command: self.cargo_bin.clone(),
            args: args.clone(),
            cause,
        };

        tracing::info!(
            asset = %job.asset,
            command = %self.cargo_bin,
            args = %args.join(" "),
            dir = %job.package_dir.display(),
            "exec"
        );

        let mut command = tokio::process::Command::new(&self.cargo_bin);
        command
            .args(&args)
            .current_dir(&job.package_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(dir) = &self.target_dir {
            command.env("CARGO_TARGET_DIR", dir);
        }

        let status = command
            .status()
            .await
            .map_err(|e| failure(BuildFailureCause::Spawn(e)))?;
        if !status.success() {
            return Err(failure(BuildFailureCause::Exit(status.code())));
        }

        let built = self.built_binary(&job.package_dir);
        if !built.exists() {
            return Err(failure(BuildFailureCause::MissingOutput(built)));
        }
        tokio::fs::copy(&built, &job.output).await?;
        Ok(())
    }
}

impl Compiler for CargoCompiler {
    fn compile<'a>(
        &'a self,
        job: &'a CompileJob,
    ) -> Pin<Box<dyn Future<Output = Result<(), PipelineError>> + Send + 'a>> {
        Box::pin(self.run(job))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn job(dir: &Path) -> CompileJob {
        CompileJob {
            asset: "place_order".into(),
            package_dir: dir.to_path_buf(),
            output: dir.join(BIN_NAME),
        }
    }

    #[test]
    fn binary_location_follows_target_dir() {
        let compiler = CargoCompiler::new("x86_64-unknown-linux-musl");
        assert_eq!(
            compiler.built_binary(Path::new("/pkg")),
            PathBuf::from("/pkg/target/x86_64-unknown-linux-musl/release/bootstrap")
        );

        let shared = compiler.with_target_dir(PathBuf::from("/out/target"));
        assert_eq!(
            shared.built_binary(Path::new("/pkg")),
            PathBuf::from("/out/target/x86_64-unknown-linux-musl/release/bootstrap")
        );
    }

    #[tokio::test]
    async fn missing_compiler_is_a_spawn_failure() {
        let tmp = TempDir::new().unwrap();
        let compiler = CargoCompiler::new("x86_64-unknown-linux-musl")
            .with_bin("/nonexistent/cqrsgen-test/cargo");

        let err = compiler.compile(&job(tmp.path())).await.unwrap_err();
        match err {
            PipelineError::BuildFailure {
                command,
                args,
                cause: BuildFailureCause::Spawn(_),
            } => {
                assert_eq!(command, "/nonexistent/cqrsgen-test/cargo");
                assert_eq!(args[0], "build");
                assert!(args.contains(&"x86_64-unknown-linux-musl".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_a_build_failure() {
        let tmp = TempDir::new().unwrap();
        let compiler = CargoCompiler::new("x86_64-unknown-linux-musl").with_bin("false");

        let err = compiler.compile(&job(tmp.path())).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::BuildFailure {
                cause: BuildFailureCause::Exit(Some(1)),
                ..
            }
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn success_without_binary_is_a_build_failure() {
        let tmp = TempDir::new().unwrap();
        let compiler = CargoCompiler::new("x86_64-unknown-linux-musl").with_bin("true");

        let err = compiler.compile(&job(tmp.path())).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::BuildFailure {
                cause: BuildFailureCause::MissingOutput(_),
                ..
            }
        ));
    }
}
