// アプリケーション層
// ユースケースの実行とエラーの変換を担当

pub mod command;
pub mod error;
pub mod service;

pub use error::{ApplicationError, ErrorKind};
pub use service::{InventoryQueryService, PaginationSettings, StockMovementService};
