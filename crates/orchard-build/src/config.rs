//! ビルド設定の読み込み
//!
//! ビルド設定ディレクトリ内の `config.yml` を読み、`BuildSpec` に正規化します。
//!
//! ```yaml
//! image: app:1
//! buildRoot: ~/projects/app
//! dockerfile: ~/projects/app/Dockerfile
//! ```

use crate::error::{BuildError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// `--specdir` 省略時のビルド設定ディレクトリ
pub const DEFAULT_SPEC_DIR: &str = "_builder";

/// ビルド設定ディレクトリ内の設定ファイル名
pub const CONFIG_FILENAME: &str = "config.yml";

/// config.yml の構造
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildDescriptor {
    image: Option<String>,
    build_root: Option<String>,
    dockerfile: Option<String>,
}

/// 1 回のビルドに必要な情報（パスは解決済み）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpec {
    pub image_tag: String,
    pub build_root: PathBuf,
    pub dockerfile: PathBuf,
}

impl BuildSpec {
    /// ビルド設定ディレクトリから BuildSpec を読み込む
    #[instrument(skip(spec_dir), fields(spec_dir = %spec_dir.display()))]
    pub fn load(spec_dir: &Path) -> Result<BuildSpec> {
        let spec_dir = expand_home(spec_dir);
        if !spec_dir.exists() {
            return Err(BuildError::ConfigNotFound(spec_dir));
        }
        let spec_dir =
            std::path::absolute(&spec_dir).map_err(|_| BuildError::ConfigNotFound(spec_dir))?;

        let config_path = spec_dir.join(CONFIG_FILENAME);
        let content =
            std::fs::read_to_string(&config_path).map_err(|e| BuildError::ConfigParse {
                path: config_path.clone(),
                message: e.to_string(),
            })?;

        let descriptor = parse_descriptor(&content).map_err(|e| BuildError::ConfigParse {
            path: config_path.clone(),
            message: e.to_string(),
        })?;

        let spec = Self::from_descriptor(descriptor, &spec_dir)?;
        debug!(
            image = %spec.image_tag,
            build_root = %spec.build_root.display(),
            dockerfile = %spec.dockerfile.display(),
            "Build spec loaded"
        );
        Ok(spec)
    }

    /// 3 項目がすべて空でないことを確認
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.image_tag.trim().is_empty() {
            missing.push("image");
        }
        if self.build_root.as_os_str().is_empty() {
            missing.push("buildRoot");
        }
        if self.dockerfile.as_os_str().is_empty() {
            missing.push("dockerfile");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(BuildError::MissingBuildParameter { missing })
        }
    }

    fn from_descriptor(descriptor: BuildDescriptor, spec_dir: &Path) -> Result<BuildSpec> {
        let image = non_empty(descriptor.image);
        let build_root = non_empty(descriptor.build_root);
        let dockerfile = non_empty(descriptor.dockerfile);

        let mut missing = Vec::new();
        if image.is_none() {
            missing.push("image");
        }
        if build_root.is_none() {
            missing.push("buildRoot");
        }
        if dockerfile.is_none() {
            missing.push("dockerfile");
        }

        match (image, build_root, dockerfile) {
            (Some(image_tag), Some(build_root), Some(dockerfile)) => Ok(BuildSpec {
                image_tag,
                build_root: resolve_path(&build_root, spec_dir),
                dockerfile: resolve_path(&dockerfile, spec_dir),
            }),
            _ => Err(BuildError::MissingBuildParameter { missing }),
        }
    }
}

fn parse_descriptor(content: &str) -> std::result::Result<BuildDescriptor, serde_yaml::Error> {
    // 空ファイルは「全項目なし」として扱う
    if content.trim().is_empty() {
        return Ok(BuildDescriptor::default());
    }
    serde_yaml::from_str(content)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `~` と `~/...` をホームディレクトリに展開
pub fn expand_home(path: &Path) -> PathBuf {
    let Some(home) = dirs::home_dir() else {
        return path.to_path_buf();
    };
    match path.strip_prefix("~") {
        Ok(rest) if rest.as_os_str().is_empty() => home,
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// ホーム展開し、相対パスはビルド設定ディレクトリ基準で解決
fn resolve_path(value: &str, spec_dir: &Path) -> PathBuf {
    let expanded = expand_home(Path::new(value));
    if expanded.is_absolute() {
        expanded
    } else {
        spec_dir.join(expanded)
    }
}
