//! ビルドパイプライン
//!
//! 読み込み済みの `BuildSpec` を受け取り、コンテキスト作成 → 送信 → 出力デコード
//! を順に実行する。一時ディレクトリ・ファイルハンドル・レスポンスストリームは
//! どの経路で抜けても解放される。

use crate::config::BuildSpec;
use crate::context::{ContextArchive, ContextBuilder};
use crate::decoder::{DecodeOutcome, EventStreamDecoder};
use crate::error::Result;
use crate::invoker::{BuildEngine, BuildInvoker, BuildOptions};
use orchard_core::Logger;
use tracing::instrument;

/// ビルド成功時の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    pub image_tag: String,
    /// `Successfully built <id>` が出力された場合のみ
    pub image_id: Option<String>,
    pub events: usize,
}

/// イメージを 1 つビルドする
#[instrument(skip_all, fields(image = %spec.image_tag))]
pub async fn build_image(
    log: &dyn Logger,
    engine: &dyn BuildEngine,
    spec: &BuildSpec,
    options: &BuildOptions,
) -> Result<BuildSummary> {
    spec.validate()?;

    log.debug(&format!(
        "Build parameters:\n  image: {}\n  buildRoot: {}\n  dockerfile: {}\n  noCache: {}\n",
        spec.image_tag,
        spec.build_root.display(),
        spec.dockerfile.display(),
        options.no_cache
    ));

    log.debug(&format!(
        "Creating context tar from {} ...\n",
        spec.build_root.display()
    ));
    let archive = ContextBuilder::create_context(&spec.build_root, &spec.dockerfile)?;
    log.debug(&format!("Context tar: {}\n", archive.path().display()));

    // ストリームは submit の中で drop され、その後にアーカイブを消す
    let result = submit(log, engine, &archive, spec, options).await;

    if let Err(e) = archive.close() {
        tracing::warn!("{}", e);
    }

    let outcome = result?;
    Ok(BuildSummary {
        image_tag: spec.image_tag.clone(),
        image_id: outcome.image_id,
        events: outcome.events,
    })
}

async fn submit(
    log: &dyn Logger,
    engine: &dyn BuildEngine,
    archive: &ContextArchive,
    spec: &BuildSpec,
    options: &BuildOptions,
) -> Result<DecodeOutcome> {
    let invoker = BuildInvoker::new(engine);
    let mut stream = invoker.invoke(archive, spec, options).await?;
    EventStreamDecoder::new(log).decode(&mut stream).await
}
