//! コンポーネント単位のアクション
//!
//! `all` または名前を列挙して、プロファイル上のコンポーネントごとに
//! ハンドラを実行する。失敗時に続行するかどうかは `continue_on_error`
//! で明示的に指定する。

use crate::context::{Component, Context};
use crate::error::CoreError;
use crate::registry::Action;
use async_trait::async_trait;
use std::sync::Arc;

/// コンポーネント 1 つに対する処理
#[async_trait]
pub trait ComponentHandler: Send + Sync {
    async fn handle(&self, ctx: &Context, component: &Component) -> anyhow::Result<()>;
}

pub struct ComponentAction {
    handler: Arc<dyn ComponentHandler>,
    continue_on_error: bool,
}

impl ComponentAction {
    pub fn new(handler: Arc<dyn ComponentHandler>) -> Self {
        Self {
            handler,
            continue_on_error: false,
        }
    }

    /// 失敗したコンポーネントをログに出して残りを続行するか
    pub fn continue_on_error(mut self, enabled: bool) -> Self {
        self.continue_on_error = enabled;
        self
    }

    fn report(&self, ctx: &Context, err: anyhow::Error) -> anyhow::Result<()> {
        if self.continue_on_error {
            ctx.log().error(&format!("{:#}\n", err));
            Ok(())
        } else {
            Err(err)
        }
    }
}

#[async_trait]
impl Action for ComponentAction {
    async fn run(&self, ctx: &Context, args: &[String]) -> anyhow::Result<()> {
        let profile = ctx.profile();

        if args.is_empty() {
            return Err(CoreError::MissingComponentName {
                available: profile.component_names(),
            }
            .into());
        }

        // all は常に全件を実行し、失敗はログに残すだけ
        if args[0] == "all" {
            for component in &profile.components {
                if let Err(e) = self.handler.handle(ctx, component).await {
                    ctx.log().error(&format!("{:#}\n", e));
                }
            }
            return Ok(());
        }

        for name in args {
            match profile.component(name) {
                Some(component) => {
                    if let Err(e) = self.handler.handle(ctx, component).await {
                        self.report(ctx, e)?;
                    }
                }
                None => {
                    let err = CoreError::ComponentNotFound {
                        name: name.clone(),
                        available: profile.component_names(),
                    };
                    self.report(ctx, err.into())?;
                }
            }
        }

        Ok(())
    }
}

/// 複数のハンドラを順に実行し、最初の失敗で止める
pub struct CompositeHandler {
    handlers: Vec<Arc<dyn ComponentHandler>>,
}

impl CompositeHandler {
    pub fn new(handlers: Vec<Arc<dyn ComponentHandler>>) -> Self {
        Self { handlers }
    }
}

#[async_trait]
impl ComponentHandler for CompositeHandler {
    async fn handle(&self, ctx: &Context, component: &Component) -> anyhow::Result<()> {
        for handler in &self.handlers {
            handler.handle(ctx, component).await?;
        }
        Ok(())
    }
}
