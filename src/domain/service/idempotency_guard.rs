use crate::domain::error::DomainError;
use crate::domain::model::{IdempotencyKey, MovementType, StockMovement};
use crate::domain::port::MovementLedger;
use crate::domain::service::StockOperationError;
use std::sync::Arc;

/// 冪等性チェックの結果
#[derive(Debug, Clone, PartialEq)]
pub enum IdempotencyCheck {
    /// 未処理のキー。操作を続行してよい
    Proceed,
    /// 処理済みのキー。保存済みの台帳エントリをそのまま返す
    Replay(StockMovement),
}

/// 冪等性ガード
/// 台帳の冪等性キーを参照し、再送されたリクエストの二重適用を防ぐ
///
/// キャッシュは持たない。重複の最終判定は台帳の一意制約で行い、
/// 競合に負けた側は `recover` で勝者のエントリを読み戻す
pub struct IdempotencyGuard {
    ledger: Arc<dyn MovementLedger>,
}

impl IdempotencyGuard {
    pub fn new(ledger: Arc<dyn MovementLedger>) -> Self {
        Self { ledger }
    }

    /// 冪等性キーが処理済みかどうかを確認する
    ///
    /// # Arguments
    /// * `key` - クライアントが指定した冪等性キー
    /// * `requested` - これから実行する操作の種別
    ///
    /// # Returns
    /// * `Ok(IdempotencyCheck::Proceed)` - 未処理
    /// * `Ok(IdempotencyCheck::Replay)` - 同じ種別の操作で処理済み
    /// * `Err(StockOperationError::Rejected)` - 別の種別の操作で使用済みのキー
    pub async fn check(
        &self,
        key: &IdempotencyKey,
        requested: MovementType,
    ) -> Result<IdempotencyCheck, StockOperationError> {
        match self.ledger.find_by_idempotency_key(key).await? {
            Some(existing) => {
                ensure_same_type(key, &existing, requested)?;
                Ok(IdempotencyCheck::Replay(existing))
            }
            None => Ok(IdempotencyCheck::Proceed),
        }
    }

    /// 一意制約違反の後に、先行したリクエストの台帳エントリを読み戻す
    pub async fn recover(
        &self,
        key: &IdempotencyKey,
        requested: MovementType,
    ) -> Result<StockMovement, StockOperationError> {
        let existing = self
            .ledger
            .find_by_idempotency_key(key)
            .await?
            .ok_or_else(|| StockOperationError::UnresolvedConflict {
                key: key.to_string(),
            })?;
        ensure_same_type(key, &existing, requested)?;
        Ok(existing)
    }
}

fn ensure_same_type(
    key: &IdempotencyKey,
    existing: &StockMovement,
    requested: MovementType,
) -> Result<(), DomainError> {
    if existing.movement_type() != requested {
        return Err(DomainError::IdempotencyKeyReused {
            key: key.to_string(),
            existing: existing.movement_type(),
            requested,
        });
    }
    Ok(())
}
