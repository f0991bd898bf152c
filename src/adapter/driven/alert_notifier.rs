use crate::domain::alert::{AlertSeverity, StockAlert};
use crate::domain::port::{AlertError, AlertNotifier};
use async_trait::async_trait;

/// ログ出力によるアラート通知
/// 外部のアラート生成機能が接続されていない環境で、判定結果を `alert` ターゲットへ出す
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingAlertNotifier;

impl LoggingAlertNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AlertNotifier for LoggingAlertNotifier {
    async fn notify(&self, alert: StockAlert) -> Result<(), AlertError> {
        let payload =
            serde_json::to_string(&alert).map_err(|e| AlertError::DeliveryFailed(e.to_string()))?;
        match alert.severity {
            AlertSeverity::Critical => tracing::error!(
                target: "alert",
                correlation_id = %alert.correlation_id,
                "{}",
                payload
            ),
            AlertSeverity::Warning => tracing::warn!(
                target: "alert",
                correlation_id = %alert.correlation_id,
                "{}",
                payload
            ),
        }
        Ok(())
    }
}
