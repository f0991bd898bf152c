use crate::domain::port::{AuditEntry, AuditSink};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// チャネル経由の監査ログ実装
///
/// 呼び出し元は有界キューに積むだけで待たない。キューが満杯、または書き込み側が
/// 終了している場合はエントリを破棄し、警告ログと破棄件数のカウントだけを残す
#[derive(Clone)]
pub struct ChannelAuditSink {
    sender: mpsc::Sender<AuditEntry>,
    dropped: Arc<AtomicU64>,
}

impl ChannelAuditSink {
    /// 監査ログのキューを作成
    ///
    /// # Arguments
    /// * `capacity` - キューに保持できる最大件数
    ///
    /// # Returns
    /// 送信側と、書き込みタスクに渡す受信側
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AuditEntry>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            receiver,
        )
    }

    /// 破棄したエントリの件数
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl AuditSink for ChannelAuditSink {
    fn submit(&self, entry: AuditEntry) {
        match self.sender.try_send(entry) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(entry)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    key = %entry.key,
                    correlation_id = %entry.correlation_id,
                    "Audit queue is full; entry dropped"
                );
            }
            Err(mpsc::error::TrySendError::Closed(entry)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    key = %entry.key,
                    correlation_id = %entry.correlation_id,
                    "Audit writer has stopped; entry dropped"
                );
            }
        }
    }
}

/// 監査ログの書き込みタスクを起動する
/// 受け取ったエントリを JSON にして `audit` ターゲットへ出力する
pub fn spawn_audit_writer(mut receiver: mpsc::Receiver<AuditEntry>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(entry) = receiver.recv().await {
            match serde_json::to_string(&entry) {
                Ok(json) => tracing::info!(target: "audit", "{}", json),
                Err(e) => tracing::error!(
                    target: "audit",
                    correlation_id = %entry.correlation_id,
                    "Failed to serialize audit entry: {}",
                    e
                ),
            }
        }
        tracing::debug!(target: "audit", "Audit writer stopped");
    })
}
