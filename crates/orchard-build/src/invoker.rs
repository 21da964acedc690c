//! ビルドリクエストの組み立てと送信

use crate::config::{BuildSpec, DEFAULT_SPEC_DIR};
use crate::context::ContextArchive;
use crate::error::{BuildError, Result};
use crate::event::WireEvent;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

/// アーカイブ内の Dockerfile 名
pub const DOCKERFILE_NAME: &str = "Dockerfile";

/// レジストリ認証情報を渡すビルド引数
pub const REGISTRY_CREDENTIAL_ARG: &str = "mvn_password";

/// レジストリ認証情報を読む環境変数（CLI 側で参照）
pub const REGISTRY_CREDENTIAL_ENV: &str = "ARTIFACTORY_PASSWORD";

/// キャッシュ無効化トークンのビルド引数
pub const CACHE_BUST_ARG: &str = "CACHEBUST";

/// ビルドオプション
#[derive(Clone, PartialEq, Eq)]
pub struct BuildOptions {
    pub no_cache: bool,
    pub spec_dir: PathBuf,
    pub registry_credential: Option<String>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            no_cache: false,
            spec_dir: PathBuf::from(DEFAULT_SPEC_DIR),
            registry_credential: None,
        }
    }
}

impl std::fmt::Debug for BuildOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildOptions")
            .field("no_cache", &self.no_cache)
            .field("spec_dir", &self.spec_dir)
            .field(
                "registry_credential",
                &self.registry_credential.as_ref().map(|_| "***"),
            )
            .finish()
    }
}

/// キャッシュ無効化トークン（Unix 秒）
pub fn cache_bust_token(now: DateTime<Utc>) -> String {
    now.timestamp().to_string()
}

/// ビルド引数（値なしの引数も表現できる）
#[derive(Clone, Default, PartialEq, Eq)]
pub struct BuildArgs(BTreeMap<String, Option<String>>);

impl BuildArgs {
    /// 認証情報とキャッシュ無効化トークンを常に含むビルド引数
    ///
    /// トークンは no_cache と無関係に毎回入る。これを参照する Dockerfile の
    /// 命令だけが毎回キャッシュを外れる。
    pub fn new(registry_credential: Option<&str>, now: DateTime<Utc>) -> Self {
        let mut args = BTreeMap::new();
        args.insert(
            REGISTRY_CREDENTIAL_ARG.to_string(),
            registry_credential.map(str::to_string),
        );
        args.insert(CACHE_BUST_ARG.to_string(), Some(cache_bust_token(now)));
        Self(args)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Option<String>) {
        self.0.insert(name.into(), value);
    }

    /// 引数がなければ `None`、値なしの引数なら `Some(None)`
    pub fn get(&self, name: &str) -> Option<Option<&str>> {
        self.0.get(name).map(|v| v.as_deref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// エンジンに渡す形式（値なしの引数は空文字列で送る）
    ///
    /// 認証情報がなくても `mvn_password` は必ず送るので、Dockerfile 側の
    /// ARG 既定値は使われない。
    pub fn to_engine_args(&self) -> HashMap<String, String> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), v.clone().unwrap_or_default()))
            .collect()
    }
}

impl std::fmt::Debug for BuildArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 認証情報はログに出さない
        f.debug_map()
            .entries(self.0.iter().map(|(k, v)| {
                let shown = match v {
                    Some(_) if k == REGISTRY_CREDENTIAL_ARG => Some("***"),
                    other => other.as_deref(),
                };
                (k, shown)
            }))
            .finish()
    }
}

/// エンジンに送るビルドリクエスト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub tags: Vec<String>,
    pub dockerfile: String,
    pub build_args: BuildArgs,
    pub no_cache: bool,
    /// 成功時に中間コンテナを削除
    pub remove: bool,
    /// 失敗時も中間コンテナを削除
    pub force_remove: bool,
    pub suppress_output: bool,
    pub pull_parent: bool,
}

pub type EventStream<'a> = BoxStream<'a, Result<WireEvent>>;

/// コンテナエンジンのビルドエンドポイント
#[async_trait]
pub trait BuildEngine: Send + Sync {
    /// 接続確認（失敗は `EngineUnavailable`）
    async fn ping(&self) -> Result<()>;

    /// ビルドを開始し、出力イベントのストリームを返す
    fn build(&self, request: BuildRequest, context: Bytes) -> EventStream<'_>;
}

/// 実行中のビルド出力
///
/// レスポンスストリームを所有する。アーカイブは送信前に全体をメモリに
/// 読み込むため、ファイルハンドルは `invoke` の中で閉じている。
pub struct BuildStream<'a> {
    events: EventStream<'a>,
}

impl Stream for BuildStream<'_> {
    type Item = Result<WireEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_next_unpin(cx)
    }
}

pub struct BuildInvoker<'e> {
    engine: &'e dyn BuildEngine,
    clock: fn() -> DateTime<Utc>,
}

impl<'e> BuildInvoker<'e> {
    pub fn new(engine: &'e dyn BuildEngine) -> Self {
        Self {
            engine,
            clock: Utc::now,
        }
    }

    /// 現在時刻の取得元を差し替える
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// ビルドリクエストを組み立てる
    pub fn request(&self, spec: &BuildSpec, options: &BuildOptions) -> BuildRequest {
        BuildRequest {
            tags: vec![spec.image_tag.clone()],
            dockerfile: DOCKERFILE_NAME.to_string(),
            build_args: BuildArgs::new(options.registry_credential.as_deref(), (self.clock)()),
            no_cache: options.no_cache,
            remove: true,
            force_remove: true,
            suppress_output: false,
            pull_parent: false,
        }
    }

    /// アーカイブを読み込んでビルドを送信する
    pub async fn invoke(
        &self,
        archive: &ContextArchive,
        spec: &BuildSpec,
        options: &BuildOptions,
    ) -> Result<BuildStream<'e>> {
        // リクエストボディは全体をバッファする
        let data = tokio::fs::read(archive.path()).await.map_err(|e| {
            BuildError::BuildRequest(format!(
                "failed to read build context {}: {}",
                archive.path().display(),
                e
            ))
        })?;

        self.engine.ping().await?;

        let request = self.request(spec, options);
        tracing::info!("Building image: {}", spec.image_tag);
        tracing::debug!("Build request: {:?}", request);

        let engine: &'e dyn BuildEngine = self.engine;
        let events = engine.build(request, Bytes::from(data));
        Ok(BuildStream { events })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextBuilder;
    use crate::testing::FakeEngine;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::tempdir;

    fn fixed_clock() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn spec() -> BuildSpec {
        BuildSpec {
            image_tag: "app:1".to_string(),
            build_root: PathBuf::from("/proj"),
            dockerfile: PathBuf::from("/proj/Dockerfile"),
        }
    }

    #[test]
    fn test_request_for_app_descriptor() {
        let engine = FakeEngine::from_log("");
        let invoker = BuildInvoker::new(&engine).with_clock(fixed_clock);
        let options = BuildOptions {
            registry_credential: Some("s3cret".to_string()),
            ..Default::default()
        };

        let request = invoker.request(&spec(), &options);

        assert_eq!(request.tags, vec!["app:1".to_string()]);
        assert_eq!(request.dockerfile, "Dockerfile");
        assert_eq!(request.build_args.get(REGISTRY_CREDENTIAL_ARG), Some(Some("s3cret")));
        assert_eq!(request.build_args.get(CACHE_BUST_ARG), Some(Some("1700000000")));
        assert!(!request.no_cache);
        assert!(request.remove);
        assert!(request.force_remove);
        assert!(!request.suppress_output);
        assert!(!request.pull_parent);
    }

    #[test]
    fn test_cache_bust_token_changes_every_second_regardless_of_no_cache() {
        let t0 = fixed_clock();
        let t1 = t0 + chrono::Duration::seconds(1);

        let a = BuildArgs::new(None, t0);
        let b = BuildArgs::new(None, t1);
        assert_ne!(a.get(CACHE_BUST_ARG), b.get(CACHE_BUST_ARG));

        let engine = FakeEngine::from_log("");
        let invoker = BuildInvoker::new(&engine);
        for no_cache in [false, true] {
            let options = BuildOptions {
                no_cache,
                ..Default::default()
            };
            let request = invoker.request(&spec(), &options);
            assert!(request.build_args.contains(CACHE_BUST_ARG));
            assert_eq!(request.no_cache, no_cache);
        }
    }

    #[test]
    fn test_missing_credential_is_sent_as_empty_string() {
        let args = BuildArgs::new(None, fixed_clock());

        assert_eq!(args.get(REGISTRY_CREDENTIAL_ARG), Some(None));
        let engine_args = args.to_engine_args();
        assert_eq!(
            engine_args.get(REGISTRY_CREDENTIAL_ARG).map(String::as_str),
            Some("")
        );
        assert_eq!(engine_args.get(CACHE_BUST_ARG).map(String::as_str), Some("1700000000"));
    }

    #[test]
    fn test_debug_hides_credential() {
        let args = BuildArgs::new(Some("s3cret"), fixed_clock());
        let options = BuildOptions {
            registry_credential: Some("s3cret".to_string()),
            ..Default::default()
        };

        assert!(!format!("{:?}", args).contains("s3cret"));
        assert!(!format!("{:?}", options).contains("s3cret"));
    }

    #[tokio::test]
    async fn test_invoke_sends_archive_and_request() {
        let root = tempdir().unwrap();
        let dockerfile = root.path().join("Dockerfile");
        fs::write(&dockerfile, "FROM alpine").unwrap();
        let archive = ContextBuilder::create_context(root.path(), &dockerfile).unwrap();

        let engine = FakeEngine::from_log(r#"{"stream":"Step 1/1 : FROM alpine\n"}"#);
        let invoker = BuildInvoker::new(&engine).with_clock(fixed_clock);

        let mut stream = invoker
            .invoke(&archive, &spec(), &BuildOptions::default())
            .await
            .unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.stream.as_deref(), Some("Step 1/1 : FROM alpine\n"));
        assert!(stream.next().await.is_none());

        let requests = engine.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tags, vec!["app:1".to_string()]);
        assert_eq!(engine.context_sizes(), vec![archive.size() as usize]);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_invoke_does_not_hold_archive_open() {
        let root = tempdir().unwrap();
        let dockerfile = root.path().join("Dockerfile");
        fs::write(&dockerfile, "FROM alpine").unwrap();
        let archive = ContextBuilder::create_context(root.path(), &dockerfile).unwrap();

        let engine = FakeEngine::from_log(r#"{"stream":"Step 1/1 : FROM alpine\n"}"#);
        let invoker = BuildInvoker::new(&engine);
        let stream = invoker
            .invoke(&archive, &spec(), &BuildOptions::default())
            .await
            .unwrap();

        let open = fs::read_dir("/proc/self/fd")
            .unwrap()
            .filter_map(|e| fs::read_link(e.ok()?.path()).ok())
            .filter(|target| target.starts_with(archive.dir()))
            .count();
        assert_eq!(open, 0);
        drop(stream);
    }

    #[tokio::test]
    async fn test_invoke_engine_unavailable() {
        let root = tempdir().unwrap();
        let dockerfile = root.path().join("Dockerfile");
        fs::write(&dockerfile, "FROM alpine").unwrap();
        let archive = ContextBuilder::create_context(root.path(), &dockerfile).unwrap();

        let engine = FakeEngine::unreachable();
        let invoker = BuildInvoker::new(&engine);

        let err = invoker
            .invoke(&archive, &spec(), &BuildOptions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BuildError::EngineUnavailable(_)));
        assert!(engine.requests().is_empty());
    }
}
