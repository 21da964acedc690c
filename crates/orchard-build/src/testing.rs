//! テスト用のインメモリエンジン

use crate::error::{BuildError, Result};
use crate::event::parse_event_log;
use crate::invoker::{BuildEngine, BuildRequest, EventStream};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use std::sync::Mutex;

/// 記録済みのビルド出力を再生し、受け取ったリクエストを保存する
pub(crate) struct FakeEngine {
    log: String,
    reachable: bool,
    requests: Mutex<Vec<BuildRequest>>,
    contexts: Mutex<Vec<Bytes>>,
}

impl FakeEngine {
    pub(crate) fn from_log(log: &str) -> Self {
        Self {
            log: log.to_string(),
            reachable: true,
            requests: Mutex::new(Vec::new()),
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::from_log("")
        }
    }

    pub(crate) fn requests(&self) -> Vec<BuildRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn contexts(&self) -> Vec<Bytes> {
        self.contexts.lock().unwrap().clone()
    }

    pub(crate) fn context_sizes(&self) -> Vec<usize> {
        self.contexts().iter().map(|c| c.len()).collect()
    }
}

#[async_trait]
impl BuildEngine for FakeEngine {
    async fn ping(&self) -> Result<()> {
        if self.reachable {
            Ok(())
        } else {
            Err(BuildError::EngineUnavailable(
                "Cannot connect to the Docker daemon".to_string(),
            ))
        }
    }

    fn build(&self, request: BuildRequest, context: Bytes) -> EventStream<'_> {
        self.requests.lock().unwrap().push(request);
        self.contexts.lock().unwrap().push(context);
        futures_util::stream::iter(parse_event_log(self.log.as_bytes())).boxed()
    }
}
