use crate::domain::port::{LogLevel, Logger};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// ログエントリ
/// `Logger` ポートで受け取った値を tracing のイベントに変換する前の中間表現
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub component: String,
    pub message: String,
    pub correlation_id: Option<Uuid>,
    // 出力順を安定させるため BTreeMap で保持する
    pub context: BTreeMap<String, String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, component: &str, message: &str) -> Self {
        Self {
            level,
            component: component.to_string(),
            message: message.to_string(),
            correlation_id: None,
            context: BTreeMap::new(),
        }
    }

    /// 相関IDを設定
    pub fn with_correlation_id(mut self, correlation_id: Option<Uuid>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// 追加コンテキストを設定
    pub fn with_context(mut self, context: Option<HashMap<String, String>>) -> Self {
        if let Some(context) = context {
            self.context.extend(context);
        }
        self
    }

    /// 追加コンテキストを `key=value` 形式で連結する
    pub fn context_string(&self) -> String {
        self.context
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// tracing のイベントとして出力する
    pub fn emit(&self) {
        let correlation_id = self
            .correlation_id
            .map(|id| id.to_string())
            .unwrap_or_default();
        let context = self.context_string();

        match self.level {
            LogLevel::Debug => tracing::debug!(
                component = %self.component,
                correlation_id = %correlation_id,
                context = %context,
                "{}",
                self.message
            ),
            LogLevel::Info => tracing::info!(
                component = %self.component,
                correlation_id = %correlation_id,
                context = %context,
                "{}",
                self.message
            ),
            LogLevel::Warning => tracing::warn!(
                component = %self.component,
                correlation_id = %correlation_id,
                context = %context,
                "{}",
                self.message
            ),
            LogLevel::Error => tracing::error!(
                component = %self.component,
                correlation_id = %correlation_id,
                context = %context,
                "{}",
                self.message
            ),
        }
    }
}

/// tracing によるログ実装
/// 出力先と書式は main で初期化する subscriber に従う
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl TracingLogger {
    pub fn new() -> Self {
        Self
    }

    fn log(
        &self,
        level: LogLevel,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    ) {
        LogEntry::new(level, component, message)
            .with_correlation_id(correlation_id)
            .with_context(context)
            .emit();
    }
}

impl Logger for TracingLogger {
    fn debug(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    ) {
        self.log(LogLevel::Debug, component, message, correlation_id, context);
    }

    fn info(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    ) {
        self.log(LogLevel::Info, component, message, correlation_id, context);
    }

    fn warn(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    ) {
        self.log(LogLevel::Warning, component, message, correlation_id, context);
    }

    fn error(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    ) {
        self.log(LogLevel::Error, component, message, correlation_id, context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_entry_creation() {
        let entry = LogEntry::new(LogLevel::Info, "TestComponent", "Test message");

        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.message, "Test message");
        assert_eq!(entry.component, "TestComponent");
        assert!(entry.correlation_id.is_none());
        assert!(entry.context.is_empty());
    }

    #[test]
    fn test_context_string_is_sorted_by_key() {
        let mut context = HashMap::new();
        context.insert("quantity".to_string(), "5".to_string());
        context.insert("idempotency_key".to_string(), "k-1".to_string());
        let entry = LogEntry::new(LogLevel::Info, "TestComponent", "Test message")
            .with_context(Some(context));

        assert_eq!(entry.context_string(), "idempotency_key=k-1, quantity=5");
    }

    #[test]
    fn test_tracing_logger_without_subscriber() {
        // subscriber が未設定でも出力は破棄されるだけで失敗しない
        let logger = TracingLogger::new();
        let mut context = HashMap::new();
        context.insert("key1".to_string(), "value1".to_string());
        logger.info("TestComponent", "Test message", Some(Uuid::new_v4()), Some(context));
        logger.error("TestComponent", "Test error", None, None);
    }
}
