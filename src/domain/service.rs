// ドメインサービス
// 複数の在庫レコードと台帳にまたがる処理を実装

mod idempotency_guard;
mod transaction_coordinator;

pub use idempotency_guard::{IdempotencyCheck, IdempotencyGuard};
pub use transaction_coordinator::{CommittedChange, StockChange, TransactionCoordinator};

use crate::domain::error::DomainError;
use crate::domain::port::RepositoryError;

/// 在庫操作の実行中に発生するエラー
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StockOperationError {
    /// ビジネスルール違反（変更は一切行われていない）
    #[error(transparent)]
    Rejected(#[from] DomainError),
    /// 永続化の失敗（トランザクションはロールバック済み）
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    /// 冪等性キーの競合後に、先行した書き込みを読み戻せなかった
    #[error("Idempotency key conflict could not be resolved: {key}")]
    UnresolvedConflict { key: String },
}
