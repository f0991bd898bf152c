// ドメインモデル（エンティティと値オブジェクト）

mod value_objects;
mod inventory;
mod movement;

pub use value_objects::{
    ProductBatchId, LocationId, UserId, OrderId, MovementId,
    StockKey,
    Quantity, AdjustmentDelta,
    IdempotencyKey,
    AdjustmentReason,
    PageRequest, Page,
};

pub use inventory::{InventoryRecord, RecordState};
pub use movement::{MovementFilter, MovementLocation, MovementType, StockMovement};
