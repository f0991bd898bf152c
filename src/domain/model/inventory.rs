use crate::domain::error::DomainError;
use crate::domain::model::{AdjustmentDelta, LocationId, ProductBatchId, Quantity, StockKey};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// 在庫レコードの状態
/// 論理削除はタイムスタンプの有無ではなく明示的な状態として表す
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordState {
    Active,
    Deleted {
        #[serde(rename = "deletedAt")]
        deleted_at: DateTime<Utc>,
    },
}

/// 在庫レコード集約
/// (製品バッチ, ロケーション) ごとの利用可能数と引当数を管理する
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRecord {
    #[serde(flatten)]
    key: StockKey,
    available_qty: u32,
    reserved_qty: u32,
    state: RecordState,
}

impl InventoryRecord {
    /// 数量0の新しい在庫レコードを作成
    pub fn new(key: StockKey) -> Self {
        Self {
            key,
            available_qty: 0,
            reserved_qty: 0,
            state: RecordState::Active,
        }
    }

    /// 永続化された値から在庫レコードを復元
    pub fn restore(key: StockKey, available_qty: u32, reserved_qty: u32, state: RecordState) -> Self {
        Self {
            key,
            available_qty,
            reserved_qty,
            state,
        }
    }

    pub fn key(&self) -> StockKey {
        self.key
    }

    pub fn product_batch_id(&self) -> ProductBatchId {
        self.key.product_batch_id()
    }

    pub fn location_id(&self) -> LocationId {
        self.key.location_id()
    }

    /// 利用可能数を取得
    pub fn available_qty(&self) -> u32 {
        self.available_qty
    }

    /// 引当数を取得
    pub fn reserved_qty(&self) -> u32 {
        self.reserved_qty
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, RecordState::Active)
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            RecordState::Active => None,
            RecordState::Deleted { deleted_at } => Some(deleted_at),
        }
    }

    /// 変更可能なレコードかどうかを検証する
    /// すべての変更操作はこの判定を通る
    ///
    /// # Returns
    /// * `Ok(())` - 有効なレコード
    /// * `Err(DomainError::RecordDeleted)` - 論理削除済み
    pub fn ensure_active(&self) -> Result<(), DomainError> {
        match self.state {
            RecordState::Active => Ok(()),
            RecordState::Deleted { .. } => Err(DomainError::RecordDeleted { key: self.key }),
        }
    }

    /// 指定された数量の在庫が利用可能かチェック
    pub fn has_available_stock(&self, quantity: u32) -> bool {
        self.available_qty >= quantity
    }

    /// 入庫する
    ///
    /// # Arguments
    /// * `quantity` - 入庫数量
    pub fn receive(&mut self, quantity: Quantity) -> Result<(), DomainError> {
        self.ensure_active()?;
        self.available_qty = self
            .available_qty
            .checked_add(quantity.value())
            .ok_or_else(|| DomainError::QuantityOverflow {
                field: "availableQty".to_string(),
            })?;
        Ok(())
    }

    /// 出庫する
    ///
    /// # Returns
    /// * `Ok(())` - 出庫成功
    /// * `Err(DomainError::InsufficientStock)` - 利用可能数の不足（数量は変わらない）
    pub fn dispatch(&mut self, quantity: Quantity) -> Result<(), DomainError> {
        self.ensure_active()?;
        if !self.has_available_stock(quantity.value()) {
            return Err(DomainError::InsufficientStock {
                available: self.available_qty,
                requested: quantity.value(),
            });
        }
        self.available_qty -= quantity.value();
        Ok(())
    }

    /// 利用可能数を増減する
    /// 減算の結果が負になる場合は在庫不足
    pub fn adjust(&mut self, delta: AdjustmentDelta) -> Result<(), DomainError> {
        self.ensure_active()?;
        if delta.is_increase() {
            self.available_qty = self
                .available_qty
                .checked_add(delta.magnitude())
                .ok_or_else(|| DomainError::QuantityOverflow {
                    field: "availableQty".to_string(),
                })?;
        } else {
            if !self.has_available_stock(delta.magnitude()) {
                return Err(DomainError::InsufficientStock {
                    available: self.available_qty,
                    requested: delta.magnitude(),
                });
            }
            self.available_qty -= delta.magnitude();
        }
        Ok(())
    }

    /// 在庫を引き当てる（利用可能数→引当数）
    pub fn reserve(&mut self, quantity: Quantity) -> Result<(), DomainError> {
        self.ensure_active()?;
        if !self.has_available_stock(quantity.value()) {
            return Err(DomainError::InsufficientStock {
                available: self.available_qty,
                requested: quantity.value(),
            });
        }
        let reserved = self
            .reserved_qty
            .checked_add(quantity.value())
            .ok_or_else(|| DomainError::QuantityOverflow {
                field: "reservedQty".to_string(),
            })?;
        self.available_qty -= quantity.value();
        self.reserved_qty = reserved;
        Ok(())
    }

    /// 引当を解除する（引当数→利用可能数）
    pub fn release(&mut self, quantity: Quantity) -> Result<(), DomainError> {
        self.ensure_active()?;
        if self.reserved_qty < quantity.value() {
            return Err(DomainError::InsufficientReserved {
                reserved: self.reserved_qty,
                requested: quantity.value(),
            });
        }
        let available = self
            .available_qty
            .checked_add(quantity.value())
            .ok_or_else(|| DomainError::QuantityOverflow {
                field: "availableQty".to_string(),
            })?;
        self.reserved_qty -= quantity.value();
        self.available_qty = available;
        Ok(())
    }

    /// 数量を直接上書きする（棚卸し補正用）
    /// 引当数を省略した場合は現在値を維持する
    pub fn overwrite(&mut self, available_qty: u32, reserved_qty: Option<u32>) -> Result<(), DomainError> {
        self.ensure_active()?;
        self.available_qty = available_qty;
        if let Some(reserved_qty) = reserved_qty {
            self.reserved_qty = reserved_qty;
        }
        Ok(())
    }

    /// 論理削除する
    /// 残数量が0である必要はない
    pub fn soft_delete(&mut self, deleted_at: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_active()?;
        self.state = RecordState::Deleted { deleted_at };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with(available: u32, reserved: u32) -> InventoryRecord {
        let key = StockKey::new(ProductBatchId::new(), LocationId::new());
        InventoryRecord::restore(key, available, reserved, RecordState::Active)
    }

    fn qty(value: i64) -> Quantity {
        Quantity::new("quantity", value).unwrap()
    }

    #[test]
    fn test_new_record_is_empty_and_active() {
        let key = StockKey::new(ProductBatchId::new(), LocationId::new());
        let record = InventoryRecord::new(key);
        assert_eq!(record.key(), key);
        assert_eq!(record.available_qty(), 0);
        assert_eq!(record.reserved_qty(), 0);
        assert!(record.is_active());
    }

    #[test]
    fn test_receive_and_dispatch() {
        let mut record = record_with(0, 0);
        record.receive(qty(100)).unwrap();
        assert_eq!(record.available_qty(), 100);
        record.dispatch(qty(30)).unwrap();
        assert_eq!(record.available_qty(), 70);
    }

    #[test]
    fn test_dispatch_exact_quantity() {
        let mut record = record_with(10, 0);
        record.dispatch(qty(10)).unwrap();
        assert_eq!(record.available_qty(), 0);
    }

    #[test]
    fn test_dispatch_insufficient_stock() {
        let mut record = record_with(10, 5);
        let result = record.dispatch(qty(11));
        assert_eq!(
            result.unwrap_err(),
            DomainError::InsufficientStock {
                available: 10,
                requested: 11
            }
        );
        assert_eq!(record.available_qty(), 10); // 在庫数は変わらない
    }

    #[test]
    fn test_receive_overflow() {
        let mut record = record_with(u32::MAX, 0);
        assert!(matches!(
            record.receive(qty(1)),
            Err(DomainError::QuantityOverflow { .. })
        ));
        assert_eq!(record.available_qty(), u32::MAX);
    }

    #[test]
    fn test_adjust_positive_and_negative() {
        let mut record = record_with(5, 0);
        record.adjust(AdjustmentDelta::new(3).unwrap()).unwrap();
        assert_eq!(record.available_qty(), 8);
        record.adjust(AdjustmentDelta::new(-8).unwrap()).unwrap();
        assert_eq!(record.available_qty(), 0);
    }

    #[test]
    fn test_adjust_below_zero_fails() {
        let mut record = record_with(5, 2);
        let result = record.adjust(AdjustmentDelta::new(-6).unwrap());
        assert_eq!(
            result.unwrap_err(),
            DomainError::InsufficientStock {
                available: 5,
                requested: 6
            }
        );
    }

    #[test]
    fn test_reserve_and_release() {
        let mut record = record_with(100, 0);
        record.reserve(qty(40)).unwrap();
        assert_eq!((record.available_qty(), record.reserved_qty()), (60, 40));
        record.release(qty(10)).unwrap();
        assert_eq!((record.available_qty(), record.reserved_qty()), (70, 30));
    }

    #[test]
    fn test_reserve_more_than_available_fails() {
        let mut record = record_with(3, 0);
        assert!(matches!(
            record.reserve(qty(4)),
            Err(DomainError::InsufficientStock { .. })
        ));
        assert_eq!((record.available_qty(), record.reserved_qty()), (3, 0));
    }

    #[test]
    fn test_release_more_than_reserved_fails() {
        let mut record = record_with(10, 2);
        assert_eq!(
            record.release(qty(3)).unwrap_err(),
            DomainError::InsufficientReserved {
                reserved: 2,
                requested: 3
            }
        );
    }

    #[test]
    fn test_overwrite_keeps_reserved_when_omitted() {
        let mut record = record_with(10, 4);
        record.overwrite(25, None).unwrap();
        assert_eq!((record.available_qty(), record.reserved_qty()), (25, 4));
        record.overwrite(0, Some(0)).unwrap();
        assert_eq!((record.available_qty(), record.reserved_qty()), (0, 0));
    }

    #[test]
    fn test_deleted_record_rejects_every_mutation() {
        let mut record = record_with(10, 0);
        record.soft_delete(Utc::now()).unwrap();
        assert!(!record.is_active());
        assert!(record.deleted_at().is_some());

        let key = record.key();
        let deleted = DomainError::RecordDeleted { key };
        assert_eq!(record.receive(qty(1)).unwrap_err(), deleted);
        assert_eq!(record.dispatch(qty(1)).unwrap_err(), deleted);
        assert_eq!(record.reserve(qty(1)).unwrap_err(), deleted);
        assert_eq!(record.overwrite(1, None).unwrap_err(), deleted);
        assert_eq!(record.soft_delete(Utc::now()).unwrap_err(), deleted);
        assert_eq!(record.available_qty(), 10);
    }
}
