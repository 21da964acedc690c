use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Missing module name. Available modules: {}", .available.join(", "))]
    MissingModule { available: Vec<String> },

    #[error("Module {name} does not exist. Available modules: {}", .available.join(", "))]
    ModuleNotFound {
        name: String,
        available: Vec<String>,
    },

    #[error("Missing action '{action}'. Available actions: {}", .available.join(", "))]
    ActionNotFound {
        module: String,
        action: String,
        available: Vec<String>,
    },

    #[error("Missing component name. Available components: {}", .available.join(", "))]
    MissingComponentName { available: Vec<String> },

    #[error("Component {name} has not been found. Available components: {}", .available.join(", "))]
    ComponentNotFound {
        name: String,
        available: Vec<String>,
    },

    #[error("{0:#}")]
    ActionFailed(anyhow::Error),
}

impl CoreError {
    /// プロセス終了コード
    ///
    /// モジュール・アクションの解決失敗は 1、アクション自体の失敗は 2。
    pub fn exit_code(&self) -> i32 {
        match self {
            CoreError::MissingModule { .. }
            | CoreError::ModuleNotFound { .. }
            | CoreError::ActionNotFound { .. } => 1,
            _ => 2,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
