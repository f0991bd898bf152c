use crate::domain::error::DomainError;
use crate::domain::model::LocationId;
use crate::domain::port::RepositoryError;
use crate::domain::service::StockOperationError;
use serde::Serialize;

/// 呼び出し元へ返すエラーの分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    InsufficientStock,
    InsufficientReserved,
    Conflict,
    Internal,
}

/// アプリケーション層のエラー型
/// ドメインエラーとリポジトリエラーを呼び出し元向けの分類に変換する
///
/// `Display` は呼び出し元に見せてよい内容のみを含む。
/// 永続化層のエラー本文は `Internal` の内部に保持し、ログ出力にのみ使う
#[derive(Debug, thiserror::Error)]
pub enum ApplicationError {
    /// 参照先（製品バッチ、ロケーション、ユーザー、在庫レコード）が存在しない
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    /// 入力値が不正
    #[error("Invalid {field}: {reason}")]
    InvalidArgument { field: String, reason: String },
    /// 利用可能在庫の不足
    #[error("Insufficient stock: available {available}, requested {requested}")]
    InsufficientStock { available: u32, requested: u32 },
    /// 引当済み在庫の不足
    #[error("Insufficient reserved stock: reserved {reserved}, requested {requested}")]
    InsufficientReserved { reserved: u32, requested: u32 },
    /// 移動元と移動先が同じ
    #[error("Source and destination locations must differ: {location_id}")]
    SameLocation { location_id: LocationId },
    /// 冪等性キーの競合を解決できなかった
    #[error("Request with idempotency key {idempotency_key} conflicted with a concurrent request, retry with the same key")]
    Conflict { idempotency_key: String },
    /// 永続化の失敗
    #[error("Internal error, retry with the same idempotency key")]
    Internal(#[source] RepositoryError),
}

impl ApplicationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApplicationError::NotFound { .. } => ErrorKind::NotFound,
            ApplicationError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            ApplicationError::SameLocation { .. } => ErrorKind::InvalidArgument,
            ApplicationError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            ApplicationError::InsufficientReserved { .. } => ErrorKind::InsufficientReserved,
            ApplicationError::Conflict { .. } => ErrorKind::Conflict,
            ApplicationError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// 入力値エラーを作成するヘルパー
    pub fn invalid_argument(field: &str, reason: impl Into<String>) -> Self {
        ApplicationError::InvalidArgument {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

// From実装でエラー変換を簡潔に
impl From<DomainError> for ApplicationError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidQuantity { field, reason }
            | DomainError::InvalidValue { field, reason } => {
                ApplicationError::InvalidArgument { field, reason }
            }
            DomainError::InsufficientStock {
                available,
                requested,
            } => ApplicationError::InsufficientStock {
                available,
                requested,
            },
            DomainError::InsufficientReserved {
                reserved,
                requested,
            } => ApplicationError::InsufficientReserved {
                reserved,
                requested,
            },
            DomainError::SameLocation { location_id } => {
                ApplicationError::SameLocation { location_id }
            }
            DomainError::RecordNotFound { key } | DomainError::RecordDeleted { key } => {
                ApplicationError::NotFound {
                    entity: "InventoryRecord",
                    id: key.to_string(),
                }
            }
            DomainError::QuantityOverflow { field } => ApplicationError::InvalidArgument {
                field,
                reason: format!("resulting quantity would exceed {}", u32::MAX),
            },
            err @ DomainError::IdempotencyKeyReused { .. } => ApplicationError::InvalidArgument {
                field: "idempotencyKey".to_string(),
                reason: err.to_string(),
            },
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::DuplicateKey { key } => ApplicationError::Conflict {
                idempotency_key: key,
            },
            other => ApplicationError::Internal(other),
        }
    }
}

impl From<StockOperationError> for ApplicationError {
    fn from(err: StockOperationError) -> Self {
        match err {
            StockOperationError::Rejected(err) => err.into(),
            StockOperationError::Repository(err) => err.into(),
            StockOperationError::UnresolvedConflict { key } => ApplicationError::Conflict {
                idempotency_key: key,
            },
        }
    }
}
