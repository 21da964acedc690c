//! Orchard image build
//!
//! ビルド設定ディレクトリの `config.yml` から Docker イメージを 1 つビルドする。
//!
//! ```text
//! BuildSpec::load ─▶ ContextBuilder ─▶ BuildInvoker ─▶ EventStreamDecoder
//!   (config.yml)      (tar.gz, 一時dir)   (BuildEngine)     (進捗 → Logger)
//! ```
//!
//! エンジンは `BuildEngine` トレイトで抽象化しており、通常は bollard を使う
//! `DockerEngine` が入る。

pub mod action;
pub mod config;
pub mod context;
pub mod decoder;
pub mod docker;
pub mod error;
pub mod event;
pub mod invoker;
pub mod pipeline;

#[cfg(test)]
mod testing;

pub use action::{BUILDER_MODULE, BuildAction, BuildFlags, builder_module, builder_module_with};
pub use config::{BuildSpec, CONFIG_FILENAME, DEFAULT_SPEC_DIR, expand_home};
pub use context::{CONTEXT_ARCHIVE_NAME, ContextArchive, ContextBuilder};
pub use decoder::{DecodeOutcome, DecoderState, EventStreamDecoder};
pub use docker::DockerEngine;
pub use error::{BuildError, Result};
pub use event::{BuildEvent, ProgressDetail, WireEvent};
pub use invoker::{
    BuildArgs, BuildEngine, BuildInvoker, BuildOptions, BuildRequest, BuildStream,
    REGISTRY_CREDENTIAL_ENV,
};
pub use pipeline::{BuildSummary, build_image};
