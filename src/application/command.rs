// 在庫操作のコマンドと結果
// 数量や冪等性キーは未検証の値として受け取り、サービス内で値オブジェクトに変換する

use crate::domain::model::{
    AdjustmentReason, InventoryRecord, LocationId, MovementFilter, MovementType, OrderId,
    ProductBatchId, StockMovement, UserId,
};

/// 入庫
#[derive(Debug, Clone)]
pub struct ReceiveStock {
    pub product_batch_id: ProductBatchId,
    pub location_id: LocationId,
    pub quantity: i64,
    pub created_by_id: Option<UserId>,
    pub idempotency_key: String,
    pub note: Option<String>,
}

/// 出庫
#[derive(Debug, Clone)]
pub struct DispatchStock {
    pub product_batch_id: ProductBatchId,
    pub location_id: LocationId,
    pub quantity: i64,
    pub created_by_id: Option<UserId>,
    pub idempotency_key: String,
    pub note: Option<String>,
}

/// 在庫調整（符号付き）
#[derive(Debug, Clone)]
pub struct AdjustStock {
    pub product_batch_id: ProductBatchId,
    pub location_id: LocationId,
    pub adjustment_quantity: i64,
    pub reason: AdjustmentReason,
    pub created_by_id: Option<UserId>,
    pub idempotency_key: String,
    pub note: Option<String>,
}

/// ロケーション間の移動
#[derive(Debug, Clone)]
pub struct TransferStock {
    pub product_batch_id: ProductBatchId,
    pub from_location_id: LocationId,
    pub to_location_id: LocationId,
    pub quantity: i64,
    pub created_by_id: Option<UserId>,
    pub idempotency_key: String,
    pub note: Option<String>,
}

/// 受注への引当
#[derive(Debug, Clone)]
pub struct ReserveStock {
    pub product_batch_id: ProductBatchId,
    pub location_id: LocationId,
    pub quantity: i64,
    pub order_id: OrderId,
    pub created_by_id: Option<UserId>,
    pub idempotency_key: String,
    pub note: Option<String>,
}

/// 引当の解除
#[derive(Debug, Clone)]
pub struct ReleaseStock {
    pub product_batch_id: ProductBatchId,
    pub location_id: LocationId,
    pub quantity: i64,
    pub order_id: OrderId,
    pub created_by_id: Option<UserId>,
    pub idempotency_key: String,
    pub note: Option<String>,
}

/// 数量の直接更新（棚卸し補正）
#[derive(Debug, Clone)]
pub struct UpdateQuantity {
    pub product_batch_id: ProductBatchId,
    pub location_id: LocationId,
    pub available_qty: i64,
    pub reserved_qty: Option<i64>,
}

/// 在庫レコードの論理削除
#[derive(Debug, Clone)]
pub struct DeleteRecord {
    pub product_batch_id: ProductBatchId,
    pub location_id: LocationId,
}

/// 移動履歴の検索条件
#[derive(Debug, Clone, Default)]
pub struct MovementHistoryQuery {
    pub product_batch_id: ProductBatchId,
    pub movement_type: Option<MovementType>,
    pub location_id: Option<LocationId>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl MovementHistoryQuery {
    pub fn filter(&self) -> MovementFilter {
        MovementFilter {
            movement_type: self.movement_type,
            location_id: self.location_id,
        }
    }
}

/// 在庫移動操作の結果
#[derive(Debug, Clone, PartialEq)]
pub struct MovementOutcome {
    /// 今回適用した、または再送により返した台帳エントリ
    pub movement: StockMovement,
    /// 単一ロケーション操作の在庫レコード
    pub inventory: Option<InventoryRecord>,
    /// 移動元の在庫レコード（移動のみ）
    pub from_inventory: Option<InventoryRecord>,
    /// 移動先の在庫レコード（移動のみ）
    pub to_inventory: Option<InventoryRecord>,
    /// 冪等性キーの再送で、何も変更しなかった
    pub idempotent: bool,
}

impl MovementOutcome {
    /// 台帳エントリと、その影響キー順の在庫レコードから結果を作成
    pub(crate) fn new(
        movement: StockMovement,
        records: Vec<Option<InventoryRecord>>,
        idempotent: bool,
    ) -> Self {
        let mut records = records.into_iter();
        let first = records.next().flatten();
        let second = records.next().flatten();
        match movement.movement_type() {
            MovementType::Transfer => Self {
                movement,
                inventory: None,
                from_inventory: first,
                to_inventory: second,
                idempotent,
            },
            _ => Self {
                movement,
                inventory: first,
                from_inventory: None,
                to_inventory: None,
                idempotent,
            },
        }
    }

    /// 新たに適用された操作かどうか
    pub fn applied(&self) -> bool {
        !self.idempotent
    }
}
