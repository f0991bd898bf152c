use crate::application::command::MovementOutcome;
use crate::application::{ApplicationError, ErrorKind};
use crate::domain::model::{InventoryRecord, MovementLocation, Page, StockMovement};
use serde::Serialize;

/// 在庫レコードのレスポンスDTO
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRecordResponse {
    pub product_batch_id: String,
    pub location_id: String,
    pub available_qty: u32,
    pub reserved_qty: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<String>,
}

impl InventoryRecordResponse {
    /// ドメインオブジェクトからInventoryRecordResponseを作成
    pub fn from_record(record: &InventoryRecord) -> Self {
        Self {
            product_batch_id: record.product_batch_id().to_string(),
            location_id: record.location_id().to_string(),
            available_qty: record.available_qty(),
            reserved_qty: record.reserved_qty(),
            deleted_at: record.deleted_at().map(|at| at.to_rfc3339()),
        }
    }
}

/// 台帳エントリのレスポンスDTO
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementResponse {
    pub id: String,
    pub product_batch_id: String,
    pub movement_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_location_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_location_id: Option<String>,
    pub quantity: i64,
    pub idempotency_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: String,
}

impl MovementResponse {
    /// ドメインオブジェクトからMovementResponseを作成
    pub fn from_movement(movement: &StockMovement) -> Self {
        let (location_id, from_location_id, to_location_id) = match movement.location() {
            MovementLocation::Single(id) => (Some(id.to_string()), None, None),
            MovementLocation::Transfer { from, to } => {
                (None, Some(from.to_string()), Some(to.to_string()))
            }
        };

        Self {
            id: movement.id().to_string(),
            product_batch_id: movement.product_batch_id().to_string(),
            movement_type: movement.movement_type().to_string(),
            location_id,
            from_location_id,
            to_location_id,
            quantity: movement.quantity(),
            idempotency_key: movement.idempotency_key().to_string(),
            created_by_id: movement.created_by_id().map(|id| id.to_string()),
            order_id: movement.order_id().map(|id| id.to_string()),
            reason: movement.reason().map(|reason| reason.to_string()),
            note: movement.note().map(str::to_string),
            created_at: movement.created_at().to_rfc3339(),
        }
    }
}

/// ページ単位のレスポンスDTO
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

impl<T> PageResponse<T> {
    pub fn from_page<U>(page: Page<U>, convert: impl Fn(&U) -> T) -> Self {
        let total_pages = page.total_pages();
        Self {
            items: page.items.iter().map(convert).collect(),
            total: page.total,
            page: page.page,
            limit: page.limit,
            total_pages,
        }
    }
}

/// エラーのレスポンスDTO
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
}

/// 1行分のレスポンス
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory: Option<InventoryRecordResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub movement: Option<MovementResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_inventory: Option<InventoryRecordResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_inventory: Option<InventoryRecordResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventories: Option<PageResponse<InventoryRecordResponse>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub movements: Option<PageResponse<MovementResponse>>,
    pub idempotent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

impl ActionResponse {
    /// 在庫移動操作の結果から作成
    pub fn from_outcome(outcome: &MovementOutcome) -> Self {
        Self {
            success: true,
            inventory: outcome
                .inventory
                .as_ref()
                .map(InventoryRecordResponse::from_record),
            movement: Some(MovementResponse::from_movement(&outcome.movement)),
            from_inventory: outcome
                .from_inventory
                .as_ref()
                .map(InventoryRecordResponse::from_record),
            to_inventory: outcome
                .to_inventory
                .as_ref()
                .map(InventoryRecordResponse::from_record),
            idempotent: outcome.idempotent,
            ..Self::default()
        }
    }

    /// 単一の在庫レコードから作成
    pub fn from_record(record: &InventoryRecord) -> Self {
        Self {
            success: true,
            inventory: Some(InventoryRecordResponse::from_record(record)),
            ..Self::default()
        }
    }

    pub fn from_inventory_page(page: Page<InventoryRecord>) -> Self {
        Self {
            success: true,
            inventories: Some(PageResponse::from_page(
                page,
                InventoryRecordResponse::from_record,
            )),
            ..Self::default()
        }
    }

    pub fn from_movement_page(page: Page<StockMovement>) -> Self {
        Self {
            success: true,
            movements: Some(PageResponse::from_page(page, MovementResponse::from_movement)),
            ..Self::default()
        }
    }

    /// エラーから作成
    /// メッセージには呼び出し元に見せてよい内容のみを含める
    pub fn from_error(err: &ApplicationError) -> Self {
        Self {
            success: false,
            error: Some(ErrorResponse {
                kind: err.kind(),
                message: err.to_string(),
            }),
            ..Self::default()
        }
    }
}
