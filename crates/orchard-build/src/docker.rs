//! bollard を使った Docker エンジン実装

use crate::error::{BuildError, Result};
use crate::event::WireEvent;
use crate::invoker::{BuildEngine, BuildRequest, EventStream};
use async_trait::async_trait;
use bollard::Docker;
use bollard::errors::Error as DockerError;
use bollard::models::BuildInfo;
use bytes::Bytes;
use futures_util::StreamExt;
use http_body_util::{Either, Full};

pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// ローカルの Docker デーモンに接続
    ///
    /// ここでは通信しない。到達確認は `ping` で行う。
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| BuildError::EngineUnavailable(e.to_string()))?;
        Ok(Self::new(docker))
    }
}

#[async_trait]
impl BuildEngine for DockerEngine {
    async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| BuildError::EngineUnavailable(e.to_string()))
    }

    fn build(&self, request: BuildRequest, context: Bytes) -> EventStream<'_> {
        let mut tags = request.tags.into_iter();
        let tag = tags.next().unwrap_or_default();
        let extra: Vec<String> = tags.collect();
        if !extra.is_empty() {
            tracing::warn!("Only the first tag is applied, ignoring: {:?}", extra);
        }

        #[allow(deprecated)]
        let options = bollard::image::BuildImageOptions::<String> {
            dockerfile: request.dockerfile,
            t: tag,
            q: request.suppress_output,
            nocache: request.no_cache,
            rm: request.remove,
            forcerm: request.force_remove,
            pull: request.pull_parent,
            buildargs: request.build_args.to_engine_args(),
            ..Default::default()
        };

        let body = Full::new(context);
        self.docker
            .build_image(options, None, Some(Either::Left(body)))
            .map(into_wire_event)
            .boxed()
    }
}

/// bollard の出力 1 件を `WireEvent` に変換
///
/// bollard は `error` を持つイベントを `DockerStreamError` に置き換えて返す。
/// メッセージが空のものは致命的ではないので、無視されるイベントとして流す。
fn into_wire_event(item: std::result::Result<BuildInfo, DockerError>) -> Result<WireEvent> {
    match item {
        Ok(info) => Ok(WireEvent::from(info)),
        Err(DockerError::DockerStreamError { error }) if error.is_empty() => {
            Ok(WireEvent::default())
        }
        Err(e) => Err(classify_error(e)),
    }
}

/// bollard のエラーをビルドのエラー分類に変換
pub fn classify_error(err: DockerError) -> BuildError {
    match err {
        DockerError::DockerStreamError { error } => BuildError::BuildFailure(error),
        DockerError::JsonDataError { .. } | DockerError::JsonSerdeError { .. } => {
            BuildError::Decode(err.to_string())
        }
        DockerError::DockerResponseServerError {
            status_code,
            message,
        } => BuildError::BuildRequest(format!("{} (status {})", message, status_code)),
        DockerError::IOError { .. }
        | DockerError::HyperResponseError { .. }
        | DockerError::RequestTimeoutError => BuildError::EngineUnavailable(err.to_string()),
        _ => BuildError::BuildRequest(err.to_string()),
    }
}
