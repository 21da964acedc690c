//! モジュール・アクションの登録と解決
//!
//! 起動時に `Registry` を一度だけ組み立て、ディスパッチャに参照で渡す。
//! 名前の一覧はエラーメッセージとヘルプ用に登録順で保持する。

use crate::context::Context;
use crate::error::{CoreError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// アクション名が省略されたときに使う名前
pub const DEFAULT_ACTION: &str = "default";

/// 実行可能なアクション
#[async_trait]
pub trait Action: Send + Sync {
    async fn run(&self, ctx: &Context, args: &[String]) -> anyhow::Result<()>;
}

/// 名前付きアクションの集合
pub struct Module {
    name: String,
    actions: HashMap<String, Arc<dyn Action>>,
    names: Vec<String>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: HashMap::new(),
            names: Vec::new(),
        }
    }

    /// アクションを登録（同名は上書き、順序は最初の登録位置のまま）
    pub fn with_action(mut self, name: impl Into<String>, action: Arc<dyn Action>) -> Self {
        let name = name.into();
        if self.actions.insert(name.clone(), action).is_none() {
            self.names.push(name);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action(&self, name: &str) -> Option<&Arc<dyn Action>> {
        self.actions.get(name)
    }

    pub fn action_names(&self) -> &[String] {
        &self.names
    }
}

/// モジュールのレジストリ
#[derive(Default)]
pub struct Registry {
    modules: HashMap<String, Module>,
    names: Vec<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: Module) -> &mut Self {
        let name = module.name().to_string();
        if self.modules.insert(name.clone(), module).is_none() {
            self.names.push(name);
        }
        self
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    /// 登録順のモジュール名
    pub fn module_names(&self) -> &[String] {
        &self.names
    }

    /// `module [action] [args...]` からアクションと残りの引数を解決
    pub fn resolve<'a>(
        &self,
        args: &'a [String],
    ) -> Result<(&Module, &Arc<dyn Action>, &'a [String])> {
        let (module_name, rest) = args.split_first().ok_or_else(|| CoreError::MissingModule {
            available: self.names.clone(),
        })?;

        let module = self
            .module(module_name)
            .ok_or_else(|| CoreError::ModuleNotFound {
                name: module_name.clone(),
                available: self.names.clone(),
            })?;

        let (action_name, action_args) = match rest.split_first() {
            Some((name, tail)) => (name.as_str(), tail),
            None => (DEFAULT_ACTION, rest),
        };

        let action = module
            .action(action_name)
            .ok_or_else(|| CoreError::ActionNotFound {
                module: module.name().to_string(),
                action: action_name.to_string(),
                available: module.action_names().to_vec(),
            })?;

        Ok((module, action, action_args))
    }

    /// アクションを解決して実行
    pub async fn dispatch(&self, ctx: &Context, args: &[String]) -> Result<()> {
        let (module, action, action_args) = self.resolve(args)?;
        tracing::debug!(module = module.name(), args = ?action_args, "Dispatching action");

        action
            .run(ctx, action_args)
            .await
            .map_err(CoreError::ActionFailed)
    }
}
