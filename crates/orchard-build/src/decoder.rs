//! ビルド出力ストリームのデコード
//!
//! イベントを到着順に 1 つずつ分類し、進捗をロガーへ流す。
//! エラーイベントを受け取った時点でそれ以降は読まない。

use crate::error::{BuildError, Result};
use crate::event::{BuildEvent, WireEvent, success_image_id};
use futures_util::{Stream, StreamExt};
use orchard_core::Logger;

/// デコーダの状態（Success / Failed からは遷移しない）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Running,
    Success,
    Failed,
}

/// ストリームを最後まで読んだ結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeOutcome {
    /// `Successfully built <id>` から拾ったイメージID
    pub image_id: Option<String>,
    /// 受け取ったイベント数（無視したものも含む）
    pub events: usize,
}

pub struct EventStreamDecoder<'a> {
    log: &'a dyn Logger,
    state: DecoderState,
    outcome: DecodeOutcome,
}

impl<'a> EventStreamDecoder<'a> {
    pub fn new(log: &'a dyn Logger) -> Self {
        Self {
            log,
            state: DecoderState::Running,
            outcome: DecodeOutcome::default(),
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// ストリームが終わるか、致命的なイベントが来るまで読む
    pub async fn decode<S>(&mut self, stream: &mut S) -> Result<DecodeOutcome>
    where
        S: Stream<Item = Result<WireEvent>> + Unpin,
    {
        if self.state != DecoderState::Running {
            return Err(BuildError::Decode(format!(
                "decoder already finished ({:?})",
                self.state
            )));
        }

        while let Some(item) = stream.next().await {
            let event = match item {
                Ok(event) => event,
                Err(e) => return Err(self.fail(e)),
            };
            self.handle(&event)?;
        }

        self.state = DecoderState::Success;
        tracing::debug!(events = self.outcome.events, "Build stream finished");
        Ok(self.outcome.clone())
    }

    fn handle(&mut self, event: &WireEvent) -> Result<()> {
        self.outcome.events += 1;

        match event.classify() {
            Some(BuildEvent::ErrorEvent(message)) => {
                return Err(self.fail(BuildError::BuildFailure(message)));
            }
            Some(BuildEvent::StatusUpdate {
                status,
                progress,
                detail,
            }) => {
                self.log.debug(&format!("\r{}: {}", status, progress));
                // current が 0 のときは新しいレイヤー/ステップの開始
                if detail.current.unwrap_or(0) == 0 {
                    self.log.debug("\n");
                }
            }
            Some(BuildEvent::StreamLine(text)) => {
                if let Some(id) = success_image_id(&text) {
                    self.outcome.image_id = Some(id.to_string());
                }
                self.log.debug(&text);
            }
            None => {
                tracing::trace!("Ignoring empty build event");
            }
        }

        Ok(())
    }

    fn fail(&mut self, err: BuildError) -> BuildError {
        self.state = DecoderState::Failed;
        tracing::debug!(error = %err, "Build stream aborted");
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::parse_event_log;
    use futures_util::stream;
    use orchard_core::{LogLevel, RecordingLogger};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn events(data: &str) -> Vec<Result<WireEvent>> {
        parse_event_log(data.as_bytes())
    }

    #[tokio::test]
    async fn test_stream_lines_only_reach_success() {
        let log = RecordingLogger::new();
        let mut decoder = EventStreamDecoder::new(&log);
        let mut s = stream::iter(events(
            r#"{"stream":"Step 1/2 : FROM alpine\n"}{"stream":"\n"}{"stream":"Step 2/2 : RUN true\n"}"#,
        ));

        let outcome = decoder.decode(&mut s).await.unwrap();

        assert_eq!(decoder.state(), DecoderState::Success);
        assert_eq!(outcome.image_id, None);
        assert_eq!(outcome.events, 3);
        assert_eq!(
            log.output(LogLevel::Debug),
            "Step 1/2 : FROM alpine\nStep 2/2 : RUN true\n"
        );
    }

    #[tokio::test]
    async fn test_success_marker_is_recorded_but_not_terminal() {
        let log = RecordingLogger::new();
        let mut decoder = EventStreamDecoder::new(&log);
        let mut s = stream::iter(events(
            r#"{"stream":"Successfully built 3f2a1b\n"}{"stream":"Successfully tagged app:1\n"}"#,
        ));

        let outcome = decoder.decode(&mut s).await.unwrap();

        assert_eq!(outcome.image_id.as_deref(), Some("3f2a1b"));
        assert!(log.output(LogLevel::Debug).ends_with("Successfully tagged app:1\n"));
    }

    #[tokio::test]
    async fn test_status_updates_and_layer_breaks() {
        let log = RecordingLogger::new();
        let mut decoder = EventStreamDecoder::new(&log);
        let mut s = stream::iter(events(
            r#"{"status":"Pulling fs layer","progressDetail":{}}
{"status":"Downloading","progress":"[=>  ]","progressDetail":{"current":5,"total":10}}
{"status":"Download complete","progressDetail":{"current":0}}"#,
        ));

        decoder.decode(&mut s).await.unwrap();

        assert_eq!(
            log.output(LogLevel::Debug),
            "\rPulling fs layer: \n\rDownloading: [=>  ]\rDownload complete: \n"
        );
    }

    #[tokio::test]
    async fn test_error_event_halts_without_reading_further() {
        let log = RecordingLogger::new();
        let mut decoder = EventStreamDecoder::new(&log);
        let polled = Arc::new(AtomicUsize::new(0));
        let counter = polled.clone();
        let mut s = stream::iter(events(
            r#"{"stream":"Step 1/3 : FROM alpine\n"}
{"error":"The command '/bin/sh -c false' returned a non-zero code: 1","errorDetail":{"code":1}}
{"status":"Downloading","progress":"[==>]"}
{"stream":"Step 3/3 : never\n"}"#,
        ))
        .inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let err = decoder.decode(&mut s).await.unwrap_err();

        match err {
            BuildError::BuildFailure(msg) => assert!(msg.contains("non-zero code: 1")),
            other => panic!("expected BuildFailure, got {:?}", other),
        }
        assert_eq!(decoder.state(), DecoderState::Failed);
        assert_eq!(polled.load(Ordering::SeqCst), 2);
        assert_eq!(log.output(LogLevel::Debug), "Step 1/3 : FROM alpine\n");
    }

    #[tokio::test]
    async fn test_malformed_event_is_decode_error() {
        let log = RecordingLogger::new();
        let mut decoder = EventStreamDecoder::new(&log);
        let mut s = stream::iter(events(r#"{"stream":"Step 1\n"}{"stream": 12"#));

        let err = decoder.decode(&mut s).await.unwrap_err();

        assert!(matches!(err, BuildError::Decode(_)));
        assert_eq!(decoder.state(), DecoderState::Failed);
        // 失敗前の出力は残る
        assert_eq!(log.output(LogLevel::Debug), "Step 1\n");
    }

    #[tokio::test]
    async fn test_terminal_states_are_absorbing() {
        let log = RecordingLogger::new();
        let mut decoder = EventStreamDecoder::new(&log);
        let mut failing = stream::iter(events(r#"{"error":"boom"}"#));
        tokio_test::assert_err!(decoder.decode(&mut failing).await);

        let mut ok = stream::iter(events(r#"{"stream":"fine\n"}"#));
        tokio_test::assert_err!(decoder.decode(&mut ok).await);
        assert_eq!(decoder.state(), DecoderState::Failed);
        assert_eq!(log.output(LogLevel::Debug), "");

        let mut decoder = EventStreamDecoder::new(&log);
        let mut empty = stream::iter(Vec::<Result<WireEvent>>::new());
        tokio_test::assert_ok!(decoder.decode(&mut empty).await);
        assert_eq!(decoder.state(), DecoderState::Success);

        let mut late_error = stream::iter(events(r#"{"error":"late"}"#));
        tokio_test::assert_err!(decoder.decode(&mut late_error).await);
        assert_eq!(decoder.state(), DecoderState::Success);
    }

    #[tokio::test]
    async fn test_transport_error_mid_stream_is_returned() {
        let log = RecordingLogger::new();
        let mut decoder = EventStreamDecoder::new(&log);
        let mut s = stream::iter(vec![
            Ok(WireEvent {
                stream: Some("Step 1\n".to_string()),
                ..Default::default()
            }),
            Err(BuildError::EngineUnavailable("connection reset".to_string())),
        ]);

        let err = decoder.decode(&mut s).await.unwrap_err();
        assert!(matches!(err, BuildError::EngineUnavailable(_)));
        assert_eq!(decoder.state(), DecoderState::Failed);
    }
}
