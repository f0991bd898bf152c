use crate::application::command::{
    AdjustStock, DeleteRecord, DispatchStock, MovementHistoryQuery, ReceiveStock, ReleaseStock,
    ReserveStock, TransferStock, UpdateQuantity,
};
use crate::application::ApplicationError;
use crate::domain::model::{
    AdjustmentReason, LocationId, MovementType, OrderId, ProductBatchId, UserId,
};
use serde::Deserialize;
use uuid::Uuid;

/// 1行分のリクエスト
/// 呼び出し元の識別情報と、`action` で判別される操作本体からなる
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEnvelope {
    #[serde(default)]
    pub correlation_id: Option<Uuid>,
    #[serde(default)]
    pub actor_id: Option<UserId>,
    #[serde(flatten)]
    pub action: ActionRequest,
}

/// 操作の種類
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ActionRequest {
    Receive(MovementRequest),
    Dispatch(MovementRequest),
    Adjust(AdjustRequest),
    Transfer(TransferRequest),
    Reserve(OrderMovementRequest),
    Release(OrderMovementRequest),
    UpdateQuantity(UpdateQuantityRequest),
    Delete(RecordKeyRequest),
    GetInventory(RecordKeyRequest),
    ByLocation(LocationListRequest),
    ByBatch(BatchListRequest),
    Movements(MovementHistoryRequest),
}

impl ActionRequest {
    /// ログ出力用の操作名
    pub fn name(&self) -> &'static str {
        match self {
            ActionRequest::Receive(_) => "receive",
            ActionRequest::Dispatch(_) => "dispatch",
            ActionRequest::Adjust(_) => "adjust",
            ActionRequest::Transfer(_) => "transfer",
            ActionRequest::Reserve(_) => "reserve",
            ActionRequest::Release(_) => "release",
            ActionRequest::UpdateQuantity(_) => "updateQuantity",
            ActionRequest::Delete(_) => "delete",
            ActionRequest::GetInventory(_) => "getInventory",
            ActionRequest::ByLocation(_) => "byLocation",
            ActionRequest::ByBatch(_) => "byBatch",
            ActionRequest::Movements(_) => "movements",
        }
    }
}

/// 入庫・出庫のリクエストDTO
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementRequest {
    pub product_batch_id: ProductBatchId,
    pub location_id: LocationId,
    pub quantity: i64,
    #[serde(default)]
    pub created_by_id: Option<UserId>,
    pub idempotency_key: String,
    #[serde(default)]
    pub note: Option<String>,
}

impl MovementRequest {
    pub fn into_receive(self) -> ReceiveStock {
        ReceiveStock {
            product_batch_id: self.product_batch_id,
            location_id: self.location_id,
            quantity: self.quantity,
            created_by_id: self.created_by_id,
            idempotency_key: self.idempotency_key,
            note: self.note,
        }
    }

    pub fn into_dispatch(self) -> DispatchStock {
        DispatchStock {
            product_batch_id: self.product_batch_id,
            location_id: self.location_id,
            quantity: self.quantity,
            created_by_id: self.created_by_id,
            idempotency_key: self.idempotency_key,
            note: self.note,
        }
    }
}

/// 在庫調整のリクエストDTO
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustRequest {
    pub product_batch_id: ProductBatchId,
    pub location_id: LocationId,
    pub adjustment_quantity: i64,
    pub reason: String,
    #[serde(default)]
    pub created_by_id: Option<UserId>,
    pub idempotency_key: String,
    #[serde(default)]
    pub note: Option<String>,
}

impl TryFrom<AdjustRequest> for AdjustStock {
    type Error = ApplicationError;

    fn try_from(request: AdjustRequest) -> Result<Self, Self::Error> {
        Ok(AdjustStock {
            product_batch_id: request.product_batch_id,
            location_id: request.location_id,
            adjustment_quantity: request.adjustment_quantity,
            reason: AdjustmentReason::from_string(&request.reason)?,
            created_by_id: request.created_by_id,
            idempotency_key: request.idempotency_key,
            note: request.note,
        })
    }
}

/// ロケーション間移動のリクエストDTO
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub product_batch_id: ProductBatchId,
    pub from_location_id: LocationId,
    pub to_location_id: LocationId,
    pub quantity: i64,
    #[serde(default)]
    pub created_by_id: Option<UserId>,
    pub idempotency_key: String,
    #[serde(default)]
    pub note: Option<String>,
}

impl From<TransferRequest> for TransferStock {
    fn from(request: TransferRequest) -> Self {
        TransferStock {
            product_batch_id: request.product_batch_id,
            from_location_id: request.from_location_id,
            to_location_id: request.to_location_id,
            quantity: request.quantity,
            created_by_id: request.created_by_id,
            idempotency_key: request.idempotency_key,
            note: request.note,
        }
    }
}

/// 引当・引当解除のリクエストDTO
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderMovementRequest {
    pub product_batch_id: ProductBatchId,
    pub location_id: LocationId,
    pub quantity: i64,
    pub order_id: OrderId,
    #[serde(default)]
    pub created_by_id: Option<UserId>,
    pub idempotency_key: String,
    #[serde(default)]
    pub note: Option<String>,
}

impl OrderMovementRequest {
    pub fn into_reserve(self) -> ReserveStock {
        ReserveStock {
            product_batch_id: self.product_batch_id,
            location_id: self.location_id,
            quantity: self.quantity,
            order_id: self.order_id,
            created_by_id: self.created_by_id,
            idempotency_key: self.idempotency_key,
            note: self.note,
        }
    }

    pub fn into_release(self) -> ReleaseStock {
        ReleaseStock {
            product_batch_id: self.product_batch_id,
            location_id: self.location_id,
            quantity: self.quantity,
            order_id: self.order_id,
            created_by_id: self.created_by_id,
            idempotency_key: self.idempotency_key,
            note: self.note,
        }
    }
}

/// 数量の直接更新のリクエストDTO
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuantityRequest {
    pub product_batch_id: ProductBatchId,
    pub location_id: LocationId,
    pub available_qty: i64,
    #[serde(default)]
    pub reserved_qty: Option<i64>,
}

impl From<UpdateQuantityRequest> for UpdateQuantity {
    fn from(request: UpdateQuantityRequest) -> Self {
        UpdateQuantity {
            product_batch_id: request.product_batch_id,
            location_id: request.location_id,
            available_qty: request.available_qty,
            reserved_qty: request.reserved_qty,
        }
    }
}

/// (製品バッチ, ロケーション) を指定するリクエストDTO
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordKeyRequest {
    pub product_batch_id: ProductBatchId,
    pub location_id: LocationId,
}

impl From<RecordKeyRequest> for DeleteRecord {
    fn from(request: RecordKeyRequest) -> Self {
        DeleteRecord {
            product_batch_id: request.product_batch_id,
            location_id: request.location_id,
        }
    }
}

/// ロケーション内在庫一覧のリクエストDTO
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationListRequest {
    pub location_id: LocationId,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// 製品バッチの在庫一覧のリクエストDTO
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchListRequest {
    pub product_batch_id: ProductBatchId,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// 移動履歴のリクエストDTO
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementHistoryRequest {
    pub product_batch_id: ProductBatchId,
    #[serde(default)]
    pub movement_type: Option<String>,
    #[serde(default)]
    pub location_id: Option<LocationId>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

impl TryFrom<MovementHistoryRequest> for MovementHistoryQuery {
    type Error = ApplicationError;

    fn try_from(request: MovementHistoryRequest) -> Result<Self, Self::Error> {
        let movement_type = request
            .movement_type
            .as_deref()
            .map(MovementType::from_string)
            .transpose()?;
        Ok(MovementHistoryQuery {
            product_batch_id: request.product_batch_id,
            movement_type,
            location_id: request.location_id,
            page: request.page,
            limit: request.limit,
        })
    }
}
