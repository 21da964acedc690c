use crate::logger::Logger;
use std::sync::Arc;

/// プロファイルに定義されたデプロイ単位
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Component {
    pub name: String,
}

impl Component {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// 現在有効なプロファイル（読み取り専用）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub components: Vec<Component>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            components: Vec::new(),
        }
    }
}

impl Profile {
    pub fn new(name: impl Into<String>, components: Vec<Component>) -> Self {
        Self {
            name: name.into(),
            components,
        }
    }

    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }

    /// 定義順のコンポーネント名
    pub fn component_names(&self) -> Vec<String> {
        self.components.iter().map(|c| c.name.clone()).collect()
    }
}

/// アクション実行時に渡されるコンテキスト
#[derive(Clone)]
pub struct Context {
    log: Arc<dyn Logger>,
    profile: Arc<Profile>,
    registry_credential: Option<String>,
}

impl Context {
    pub fn new(log: Arc<dyn Logger>, profile: Profile) -> Self {
        Self {
            log,
            profile: Arc::new(profile),
            registry_credential: None,
        }
    }

    /// ビルド時に渡すレジストリ認証情報を設定
    ///
    /// 環境変数の読み取りは呼び出し側（CLI）で行う。
    pub fn with_registry_credential(mut self, credential: Option<String>) -> Self {
        self.registry_credential = credential;
        self
    }

    pub fn log(&self) -> &dyn Logger {
        self.log.as_ref()
    }

    pub fn logger(&self) -> Arc<dyn Logger> {
        Arc::clone(&self.log)
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn registry_credential(&self) -> Option<&str> {
        self.registry_credential.as_deref()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("profile", &self.profile.name)
            .field(
                "registry_credential",
                &self.registry_credential.as_ref().map(|_| "***"),
            )
            .finish()
    }
}
