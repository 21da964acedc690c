use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Unable to determine build configuration: {} does not exist", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Unable to parse config file {}: {message}", .path.display())]
    ConfigParse { path: PathBuf, message: String },

    #[error("Missing build parameters: {}", .missing.join(", "))]
    MissingBuildParameter { missing: Vec<&'static str> },

    #[error("Build context archive error: {0}")]
    Archive(String),

    #[error("Docker engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Build request failed: {0}")]
    BuildRequest(String),

    #[error("Unable to decode build output: {0}")]
    Decode(String),

    #[error("build error: {0}")]
    BuildFailure(String),
}

impl BuildError {
    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            BuildError::ConfigNotFound(path) => {
                format!(
                    "{}\n\
                     \n\
                     解決方法:\n\
                     1. ビルド設定ディレクトリを作成してください: {}\n\
                     2. もしくは --specdir で別のディレクトリを指定してください",
                    self,
                    path.display()
                )
            }
            BuildError::MissingBuildParameter { .. } => {
                format!(
                    "{}\n\
                     \n\
                     config.yml に image, buildRoot, dockerfile を指定してください。",
                    self
                )
            }
            BuildError::EngineUnavailable(_) => {
                format!(
                    "{}\n\
                     \n\
                     解決方法:\n\
                     • Dockerが起動しているか確認してください\n\
                     • docker ps コマンドが正常に動作するか確認してください",
                    self
                )
            }
            BuildError::BuildFailure(_) => {
                format!("{}\n\nDockerfileの内容を確認してください。", self)
            }
            _ => format!("{}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
