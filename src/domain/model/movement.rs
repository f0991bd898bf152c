use crate::domain::error::DomainError;
use crate::domain::model::{
    AdjustmentReason, IdempotencyKey, LocationId, MovementId, OrderId, ProductBatchId, StockKey,
    UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 在庫移動の種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    Receive,
    Dispatch,
    Adjust,
    Transfer,
    Reserve,
    Release,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Receive => "RECEIVE",
            MovementType::Dispatch => "DISPATCH",
            MovementType::Adjust => "ADJUST",
            MovementType::Transfer => "TRANSFER",
            MovementType::Reserve => "RESERVE",
            MovementType::Release => "RELEASE",
        }
    }

    /// 文字列から移動種別を作成
    pub fn from_string(s: &str) -> Result<Self, DomainError> {
        match s {
            "RECEIVE" => Ok(MovementType::Receive),
            "DISPATCH" => Ok(MovementType::Dispatch),
            "ADJUST" => Ok(MovementType::Adjust),
            "TRANSFER" => Ok(MovementType::Transfer),
            "RESERVE" => Ok(MovementType::Reserve),
            "RELEASE" => Ok(MovementType::Release),
            _ => Err(DomainError::InvalidValue {
                field: "movementType".to_string(),
                reason: format!("unknown movement type: {}", s),
            }),
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 移動が参照するロケーション
/// 移動は1ロケーション、または移動元・移動先の2ロケーションを参照する
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementLocation {
    Single(LocationId),
    Transfer { from: LocationId, to: LocationId },
}

/// 在庫移動（台帳エントリ）
/// 受け付けた操作ごとに一度だけ作成され、以後は変更されない
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockMovement {
    id: MovementId,
    product_batch_id: ProductBatchId,
    movement_type: MovementType,
    location: MovementLocation,
    quantity: i64,
    idempotency_key: IdempotencyKey,
    created_by_id: Option<UserId>,
    order_id: Option<OrderId>,
    reason: Option<AdjustmentReason>,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl StockMovement {
    /// 新しい台帳エントリを作成
    ///
    /// # Arguments
    /// * `product_batch_id` - 製品バッチID
    /// * `movement_type` - 移動種別
    /// * `location` - 参照するロケーション
    /// * `quantity` - 数量（調整のみ符号付き）
    /// * `idempotency_key` - 冪等性キー
    pub fn new(
        product_batch_id: ProductBatchId,
        movement_type: MovementType,
        location: MovementLocation,
        quantity: i64,
        idempotency_key: IdempotencyKey,
    ) -> Self {
        Self {
            id: MovementId::new(),
            product_batch_id,
            movement_type,
            location,
            quantity,
            idempotency_key,
            created_by_id: None,
            order_id: None,
            reason: None,
            note: None,
            created_at: Utc::now(),
        }
    }

    /// 永続化された値から台帳エントリを復元
    #[allow(clippy::too_many_arguments)]
    pub fn reconstruct(
        id: MovementId,
        product_batch_id: ProductBatchId,
        movement_type: MovementType,
        location: MovementLocation,
        quantity: i64,
        idempotency_key: IdempotencyKey,
        created_by_id: Option<UserId>,
        order_id: Option<OrderId>,
        reason: Option<AdjustmentReason>,
        note: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            product_batch_id,
            movement_type,
            location,
            quantity,
            idempotency_key,
            created_by_id,
            order_id,
            reason,
            note,
            created_at,
        }
    }

    pub fn with_created_by(mut self, created_by_id: Option<UserId>) -> Self {
        self.created_by_id = created_by_id;
        self
    }

    pub fn with_order(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_reason(mut self, reason: AdjustmentReason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }

    /// 作成日時を上書きする
    /// 台帳の並び順はこの値で決まるため、行ロック取得後の時刻を設定する
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn id(&self) -> MovementId {
        self.id
    }

    pub fn product_batch_id(&self) -> ProductBatchId {
        self.product_batch_id
    }

    pub fn movement_type(&self) -> MovementType {
        self.movement_type
    }

    pub fn location(&self) -> MovementLocation {
        self.location
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn idempotency_key(&self) -> &IdempotencyKey {
        &self.idempotency_key
    }

    pub fn created_by_id(&self) -> Option<UserId> {
        self.created_by_id
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn reason(&self) -> Option<AdjustmentReason> {
        self.reason
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// この移動が影響した在庫レコードのキー
    /// 移動の場合は移動元・移動先の順
    pub fn affected_keys(&self) -> Vec<StockKey> {
        match self.location {
            MovementLocation::Single(location_id) => {
                vec![StockKey::new(self.product_batch_id, location_id)]
            }
            MovementLocation::Transfer { from, to } => vec![
                StockKey::new(self.product_batch_id, from),
                StockKey::new(self.product_batch_id, to),
            ],
        }
    }

    /// 指定ロケーションに関係する移動かどうか（移動元・移動先のどちらでもよい）
    pub fn involves_location(&self, location_id: LocationId) -> bool {
        match self.location {
            MovementLocation::Single(id) => id == location_id,
            MovementLocation::Transfer { from, to } => from == location_id || to == location_id,
        }
    }
}

/// 移動履歴の絞り込み条件
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MovementFilter {
    pub movement_type: Option<MovementType>,
    pub location_id: Option<LocationId>,
}

impl MovementFilter {
    pub fn matches(&self, movement: &StockMovement) -> bool {
        if let Some(movement_type) = self.movement_type {
            if movement.movement_type() != movement_type {
                return false;
            }
        }
        if let Some(location_id) = self.location_id {
            if !movement.involves_location(location_id) {
                return false;
            }
        }
        true
    }
}
