//! ユーザー向け出力
//!
//! ビルドの進捗など、ユーザーに見せる出力はこのトレイト経由で書き出す。
//! 内部の診断ログは `tracing` を使う。

use colored::Colorize;
use std::io::Write;
use std::sync::Mutex;

/// レベル付きロガー
///
/// メッセージは改行を含めてそのまま出力される（`print!` と同じ扱い）。
pub trait Logger: Send + Sync {
    fn debug(&self, message: &str);
    fn info(&self, message: &str);
    fn error(&self, message: &str);
}

/// 標準出力・標準エラーに書き出すロガー
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleLogger;

impl ConsoleLogger {
    pub fn new() -> Self {
        Self
    }
}

impl Logger for ConsoleLogger {
    fn debug(&self, message: &str) {
        let mut stdout = std::io::stdout().lock();
        // 進捗行は "\r" で上書きするため、都度 flush する
        let _ = write!(stdout, "{}", message);
        let _ = stdout.flush();
    }

    fn info(&self, message: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "{}", message.cyan());
        let _ = stdout.flush();
    }

    fn error(&self, message: &str) {
        eprint!("{}", message.red());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
}

/// 出力をメモリに記録するロガー（テスト用）
#[derive(Debug, Default)]
pub struct RecordingLogger {
    records: Mutex<Vec<LogRecord>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// 指定レベルのメッセージを連結して返す
    pub fn output(&self, level: LogLevel) -> String {
        self.records()
            .into_iter()
            .filter(|r| r.level == level)
            .map(|r| r.message)
            .collect()
    }

    fn push(&self, level: LogLevel, message: &str) {
        if let Ok(mut records) = self.records.lock() {
            records.push(LogRecord {
                level,
                message: message.to_string(),
            });
        }
    }
}

impl Logger for RecordingLogger {
    fn debug(&self, message: &str) {
        self.push(LogLevel::Debug, message);
    }

    fn info(&self, message: &str) {
        self.push(LogLevel::Info, message);
    }

    fn error(&self, message: &str) {
        self.push(LogLevel::Error, message);
    }
}
