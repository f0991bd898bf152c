use crate::domain::model::{LocationId, MovementType, StockKey};

/// ドメイン層のエラー型
/// ビジネスルール違反を表現する
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainError {
    /// 無効な数量（例: 0以下の数量、0の調整数量）
    #[error("Invalid quantity for {field}: {reason}")]
    InvalidQuantity { field: String, reason: String },
    /// 無効な値（例: 空の冪等性キー、範囲外のページ指定）
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
    /// 利用可能在庫の不足
    #[error("Insufficient stock: available {available}, requested {requested}")]
    InsufficientStock { available: u32, requested: u32 },
    /// 引当済み在庫の不足
    #[error("Insufficient reserved stock: reserved {reserved}, requested {requested}")]
    InsufficientReserved { reserved: u32, requested: u32 },
    /// 移動元と移動先が同じロケーション
    #[error("Source and destination locations must differ: {location_id}")]
    SameLocation { location_id: LocationId },
    /// 在庫レコードが存在しない
    #[error("Inventory record not found: {key}")]
    RecordNotFound { key: StockKey },
    /// 論理削除済みの在庫レコードは操作できない
    #[error("Inventory record has been deleted: {key}")]
    RecordDeleted { key: StockKey },
    /// 数量の上限超過
    #[error("Quantity overflow for {field}")]
    QuantityOverflow { field: String },
    /// 冪等性キーが別の種類の操作で使用済み
    #[error("Idempotency key {key} was already used for {existing}, not {requested}")]
    IdempotencyKeyReused {
        key: String,
        existing: MovementType,
        requested: MovementType,
    },
}
