//! Pipeline tests: settings → registry → build → publish → manifest.
//!
//! The default tests swap the compiler for a stub that writes fake
//! executables. `real_cargo_build` compiles an actual asset package and is
//! skipped by default.
//!
//! ## Prerequisites for the ignored test
//! - network access to crates.io
//! - `rustup target add x86_64-unknown-linux-musl`
//!
//! ## Run
//! ```bash
//! cargo test -p cqrsgen-pipeline --test pipeline -- --ignored --nocapture
//! ```

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use cqrsgen_core::Asset;
use cqrsgen_pipeline::archive::read_entries;
use cqrsgen_pipeline::compiler::{CargoCompiler, CompileJob, Compiler};
use cqrsgen_pipeline::infra;
use cqrsgen_pipeline::manifest::DeploymentManifest;
use cqrsgen_pipeline::progress::RunProgress;
use cqrsgen_pipeline::publish::Publisher;
use cqrsgen_pipeline::settings::{SETTINGS_FILE, Settings};
use cqrsgen_pipeline::template::TemplateSet;
use cqrsgen_pipeline::{Builder, PipelineError};
use tempfile::TempDir;

const SETTINGS: &str = r#"
[build]
crate_path = "shop"

[[commands]]
module = "shop::commands"
name = "Commands"
methods = [
    { name = "place_order", inputs = ["ctx", "shop::model::NewOrder"], outputs = ["shop::model::OrderId", "error"] },
    { name = "cancel_order", inputs = ["ctx", "&shop::model::OrderId"], outputs = ["error"] },
]

[[queries]]
module = "shop::queries"
name = "Queries"
methods = [
    { name = "get_order", inputs = ["ctx", "&shop::model::OrderId"], outputs = ["shop::model::Order", "error"] },
    { name = "list_orders", inputs = ["ctx"], outputs = ["Vec<shop::model::Order>", "error"] },
]

[mutation]
module = "shop::mutations"
name = "Orders"
methods = [
    { name = "new", outputs = ["Self", "error"] },
    { name = "on_order_placed", inputs = ["ctx", "&shop::events::OrderPlaced"], outputs = ["error"] },
    { name = "on_order_cancelled", inputs = ["ctx", "&shop::events::OrderCancelled"], outputs = ["error"] },
    { name = "push", inputs = ["ctx"], outputs = ["error"] },
]
"#;

const INFRA: &str = r#"{"app": "npx ts-node bin/app.ts", "context": {"name": "shop", "bucket": "shop-artifacts"}}"#;

/// Writes the package's `src/main.rs` as the "executable".
struct EchoCompiler;

impl Compiler for EchoCompiler {
    fn compile<'a>(
        &'a self,
        job: &'a CompileJob,
    ) -> Pin<Box<dyn Future<Output = Result<(), PipelineError>> + Send + 'a>> {
        Box::pin(async move {
            tokio::fs::copy(job.package_dir.join("src/main.rs"), &job.output).await?;
            Ok(())
        })
    }
}

fn project(root: &Path) {
    std::fs::write(root.join(SETTINGS_FILE), SETTINGS).unwrap();
    let infra_dir = root.join("infra");
    std::fs::create_dir_all(&infra_dir).unwrap();
    std::fs::write(infra_dir.join(infra::INFRA_FILE), INFRA).unwrap();
}

#[tokio::test]
async fn deploy_with_stub_compiler() {
    let tmp = TempDir::new().unwrap();
    project(tmp.path());

    let settings = Settings::from_file(&tmp.path().join(SETTINGS_FILE)).unwrap();
    let mut registry = settings.registry().unwrap();
    let found = infra::discover(tmp.path()).unwrap();
    let output_root = found.output_root();
    assert!(output_root.ends_with("infra/cdk.out"));

    let progress = Arc::new(RunProgress::new());
    let builder = Builder::new(
        output_root.clone(),
        TemplateSet::from_settings(&settings.templates, tmp.path()).unwrap(),
        Box::new(EchoCompiler),
    )
    .with_service_crate(tmp.path().join(&settings.build.crate_path), "0.13")
    .with_progress(progress.clone());

    builder.init().await.unwrap();
    builder.build(&mut registry).await.unwrap();

    // Each archive holds exactly the rendered entry point.
    let mutation = registry.mutation().unwrap();
    let entries = read_entries(mutation.build_path().unwrap()).unwrap();
    assert_eq!(entries.len(), 1);
    let source = String::from_utf8(entries[0].2.clone()).unwrap();
    assert!(source.contains("\"OrderPlaced\" =>"));
    assert!(source.contains("\"OrderCancelled\" =>"));
    assert_eq!(source.matches("svc.push(ctx)").count(), 1);

    let list_orders = registry.queries()[1].build_path().unwrap();
    let source = String::from_utf8(read_entries(list_orders).unwrap()[0].2.clone()).unwrap();
    assert!(source.contains("LambdaEvent<serde_json::Value>"));
    assert!(source.contains("let output: Vec<model::Order>"));

    let store = settings
        .publish
        .store
        .open(&found.config.context.bucket, &found.dir)
        .unwrap();
    let publisher = Publisher::new(store, settings.publish.prefix.clone()).with_progress(progress.clone());
    publisher.publish(&mut registry).await.unwrap();

    let manifest = DeploymentManifest::from_registry(&registry, &found.config);
    let path = manifest.write(&output_root).await.unwrap();

    let snapshot = progress.snapshot();
    assert_eq!(snapshot.assets_built, 5);
    assert_eq!(snapshot.assets_published, 5);

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(json["service"], "shop");
    assert_eq!(json["bucket"], "shop-artifacts");
    assert_eq!(json["events"], serde_json::json!(["OrderPlaced", "OrderCancelled"]));
    assert_eq!(json["commands"].as_array().unwrap().len(), 2);
    assert_eq!(json["queries"][0]["name"], "get_order");
    assert_eq!(json["queries"][1]["name"], "list_orders");
    assert_eq!(json["mutations"]["name"], "Mutation");
    assert!(json.get("functions").is_none());

    // Remote keys point at objects in the local bucket.
    let bucket = found.dir.join("cdk.out/bucket/shop-artifacts");
    for asset in registry.assets() {
        let key = asset.remote_key().unwrap();
        assert!(key.starts_with("assets/"));
        assert!(bucket.join(key).exists(), "{key} missing");
    }
}

#[tokio::test]
async fn missing_infra_config_fails_before_any_build() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join(SETTINGS_FILE), SETTINGS).unwrap();

    assert!(matches!(
        infra::discover(tmp.path()),
        Err(PipelineError::ConfigNotFound { .. })
    ));
}

#[tokio::test]
#[ignore = "needs network access and the x86_64-unknown-linux-musl target"]
async fn real_cargo_build() {
    let tmp = TempDir::new().unwrap();
    let shop = tmp.path().join("shop");
    std::fs::create_dir_all(shop.join("src")).unwrap();
    std::fs::write(
        shop.join("Cargo.toml"),
        "[package]\nname = \"shop\"\nversion = \"0.1.0\"\nedition = \"2021\"\n\n\
         [dependencies]\nlambda_runtime = \"0.13\"\n",
    )
    .unwrap();
    std::fs::write(
        shop.join("src/lib.rs"),
        r#"pub mod commands {
    use lambda_runtime::{Context, Error};

    pub struct Commands;

    impl Commands {
        pub fn new() -> Result<Self, Error> {
            Ok(Self)
        }

        pub async fn ping(&self, _ctx: &Context, name: String) -> Result<String, Error> {
            Ok(format!("pong {name}"))
        }
    }
}
"#,
    )
    .unwrap();

    let settings: Settings = toml::from_str(
        r#"
[[commands]]
module = "shop::commands"
name = "Commands"
methods = [{ name = "ping", inputs = ["ctx", "String"], outputs = ["String", "error"] }]
"#,
    )
    .unwrap();
    let mut registry = settings.registry().unwrap();

    let output_root = tmp.path().join("cdk.out");
    let compiler = CargoCompiler::new(settings.build.target.clone())
        .with_target_dir(output_root.join("target"));
    let builder = Builder::new(output_root, TemplateSet::builtin().unwrap(), Box::new(compiler))
        .with_service_crate(shop, settings.build.runtime_version.clone());

    builder.build(&mut registry).await.unwrap();

    let archive = registry.assets()[0].build_path().unwrap().to_path_buf();
    let entries = read_entries(&archive).unwrap();
    assert_eq!(entries[0].0, "bootstrap");
    assert_eq!(entries[0].1, 0o755);
    assert!(entries[0].2.starts_with(b"\x7fELF"));
}
