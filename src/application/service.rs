// アプリケーションサービス

mod inventory_query_service;
mod stock_movement_service;

pub use inventory_query_service::{InventoryQueryService, PaginationSettings};
pub use stock_movement_service::StockMovementService;
