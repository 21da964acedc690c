//! Orchard core
//!
//! CLI から各モジュールのアクションへ処理を振り分けるための共通部品。
//!
//! ```text
//! orchard <module> [action] [args...]
//!            │        │
//!            ▼        ▼
//!        Registry ─▶ Module ─▶ Action::run(&Context, args)
//! ```
//!
//! `Context` はロガーと現在のプロファイルをアクションに渡します。

pub mod component;
pub mod context;
pub mod error;
pub mod logger;
pub mod registry;

pub use component::{ComponentAction, ComponentHandler, CompositeHandler};
pub use context::{Component, Context, Profile};
pub use error::{CoreError, Result};
pub use logger::{ConsoleLogger, LogLevel, LogRecord, Logger, RecordingLogger};
pub use registry::{Action, DEFAULT_ACTION, Module, Registry};
