//! ビルド出力のイベント
//!
//! Docker のビルド API は 1 種類の JSON オブジェクトにログ行・進捗・エラーを
//! 詰めて返してくる。`WireEvent` がその生の形、`BuildEvent` が分類後の形。

use crate::error::{BuildError, Result};
use serde::Deserialize;

/// 成功時に出力される行の接頭辞（後ろにイメージIDが続く）
pub const SUCCESS_MARKER: &str = "Successfully built ";

/// ビルドAPIが返す生のイベント
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEvent {
    pub stream: Option<String>,
    pub status: Option<String>,
    pub progress: Option<String>,
    pub progress_detail: Option<ProgressDetail>,
    pub error: Option<String>,
    pub error_detail: Option<ErrorDetail>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ProgressDetail {
    pub current: Option<i64>,
    pub total: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ErrorDetail {
    pub code: Option<i64>,
    pub message: Option<String>,
}

/// 分類済みのイベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// ビルドステップのログ行（改行を含めてそのまま）
    StreamLine(String),
    /// pull 等のステータスと進捗
    StatusUpdate {
        status: String,
        progress: String,
        detail: ProgressDetail,
    },
    /// ビルド失敗
    ErrorEvent(String),
}

impl BuildEvent {
    /// `Successfully built <id>` の行ならイメージIDを返す
    pub fn image_id(&self) -> Option<&str> {
        match self {
            BuildEvent::StreamLine(line) => success_image_id(line),
            _ => None,
        }
    }
}

/// ログ行が成功マーカーならイメージIDを取り出す
pub fn success_image_id(line: &str) -> Option<&str> {
    line.strip_prefix(SUCCESS_MARKER)
        .map(str::trim)
        .filter(|id| !id.is_empty())
}

impl WireEvent {
    pub fn from_json(data: &str) -> Result<WireEvent> {
        serde_json::from_str(data).map_err(|e| BuildError::Decode(e.to_string()))
    }

    /// エラー > ステータス/進捗 > ログ行 の優先順で分類する
    ///
    /// どれにも当てはまらなければ `None`。
    pub fn classify(&self) -> Option<BuildEvent> {
        if let Some(message) = self.error_message() {
            return Some(BuildEvent::ErrorEvent(message.to_string()));
        }

        let status = self.status.as_deref().unwrap_or_default();
        let progress = self.progress.as_deref().unwrap_or_default();
        if !status.is_empty() || !progress.is_empty() {
            return Some(BuildEvent::StatusUpdate {
                status: status.to_string(),
                progress: progress.to_string(),
                detail: self.progress_detail.unwrap_or_default(),
            });
        }

        let stream = self.stream.as_deref().unwrap_or_default();
        let line = stream.strip_suffix('\n').unwrap_or(stream);
        if !line.is_empty() {
            return Some(BuildEvent::StreamLine(stream.to_string()));
        }

        None
    }

    fn error_message(&self) -> Option<&str> {
        self.error
            .as_deref()
            .filter(|m| !m.is_empty())
            .or_else(|| {
                self.error_detail
                    .as_ref()
                    .and_then(|d| d.message.as_deref())
                    .filter(|m| !m.is_empty())
            })
    }
}

impl From<bollard::models::BuildInfo> for WireEvent {
    fn from(info: bollard::models::BuildInfo) -> Self {
        WireEvent {
            stream: info.stream,
            status: info.status,
            progress: info.progress,
            progress_detail: info.progress_detail.map(|d| ProgressDetail {
                current: d.current,
                total: d.total,
            }),
            error: info.error,
            error_detail: info.error_detail.map(|d| ErrorDetail {
                code: d.code,
                message: d.message,
            }),
        }
    }
}

/// 連結された JSON オブジェクト列（改行区切りでなくてもよい）を順に読む
///
/// 壊れたオブジェクトに当たった時点でエラーを 1 つ積んで止まる。
pub fn parse_event_log(data: &[u8]) -> Vec<Result<WireEvent>> {
    let mut events = Vec::new();
    for item in serde_json::Deserializer::from_slice(data).into_iter::<WireEvent>() {
        match item {
            Ok(event) => events.push(Ok(event)),
            Err(e) => {
                events.push(Err(BuildError::Decode(e.to_string())));
                break;
            }
        }
    }
    events
}
