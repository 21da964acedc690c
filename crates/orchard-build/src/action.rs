//! `builder` モジュールのアクション

use crate::config::{BuildSpec, DEFAULT_SPEC_DIR};
use crate::docker::DockerEngine;
use crate::invoker::{BuildEngine, BuildOptions};
use crate::pipeline::build_image;
use anyhow::{Context as _, bail};
use async_trait::async_trait;
use orchard_core::{Action, Context, DEFAULT_ACTION, Module};
use std::path::PathBuf;
use std::sync::Arc;

/// モジュール名
pub const BUILDER_MODULE: &str = "builder";

/// `build` アクションのフラグ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFlags {
    pub no_cache: bool,
    pub spec_dir: PathBuf,
}

impl Default for BuildFlags {
    fn default() -> Self {
        Self {
            no_cache: false,
            spec_dir: PathBuf::from(DEFAULT_SPEC_DIR),
        }
    }
}

impl BuildFlags {
    /// `--nocache` と `--specdir <path>` を解釈する。それ以外は警告して無視
    pub fn parse(args: &[String]) -> anyhow::Result<Self> {
        let mut flags = Self::default();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--nocache" => flags.no_cache = true,
                "--specdir" => match iter.next() {
                    Some(dir) => flags.spec_dir = PathBuf::from(dir),
                    None => bail!("--specdir requires a path"),
                },
                other => tracing::warn!("Ignoring unknown argument: {}", other),
            }
        }
        Ok(flags)
    }
}

/// イメージをビルドするアクション
#[derive(Default)]
pub struct BuildAction {
    engine: Option<Arc<dyn BuildEngine>>,
}

impl BuildAction {
    /// 実行時にローカルの Docker に接続する
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine(engine: Arc<dyn BuildEngine>) -> Self {
        Self {
            engine: Some(engine),
        }
    }

    fn engine(&self) -> anyhow::Result<Arc<dyn BuildEngine>> {
        match &self.engine {
            Some(engine) => Ok(Arc::clone(engine)),
            None => Ok(Arc::new(DockerEngine::connect()?)),
        }
    }
}

#[async_trait]
impl Action for BuildAction {
    async fn run(&self, ctx: &Context, args: &[String]) -> anyhow::Result<()> {
        let flags = BuildFlags::parse(args)?;
        let options = BuildOptions {
            no_cache: flags.no_cache,
            spec_dir: flags.spec_dir,
            registry_credential: ctx.registry_credential().map(str::to_string),
        };

        let spec = BuildSpec::load(&options.spec_dir)?;
        let engine = self.engine()?;

        let summary = build_image(ctx.log(), engine.as_ref(), &spec, &options)
            .await
            .with_context(|| format!("Failed to build image {}", spec.image_tag))?;

        match &summary.image_id {
            Some(id) => ctx.log().info(&format!(
                "Image {} built successfully ({})\n",
                summary.image_tag, id
            )),
            None => ctx
                .log()
                .info(&format!("Image {} built successfully\n", summary.image_tag)),
        }
        Ok(())
    }
}

/// `builder` モジュール（`build` と既定アクション）
pub fn builder_module() -> Module {
    builder_module_with(Arc::new(BuildAction::new()))
}

pub fn builder_module_with(action: Arc<BuildAction>) -> Module {
    Module::new(BUILDER_MODULE)
        .with_action("build", action.clone())
        .with_action(DEFAULT_ACTION, action)
}
