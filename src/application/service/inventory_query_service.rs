use crate::application::command::MovementHistoryQuery;
use crate::application::ApplicationError;
use crate::domain::model::{
    InventoryRecord, LocationId, Page, PageRequest, ProductBatchId, StockKey, StockMovement,
};
use crate::domain::port::{InventoryRecordStore, MovementLedger};
use std::sync::Arc;

/// ページングの既定値と上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationSettings {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
        }
    }
}

impl PaginationSettings {
    /// リクエストのページ指定を検証する
    /// 上限を超える件数は切り詰めずにエラーにする
    pub fn request(
        &self,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> Result<PageRequest, ApplicationError> {
        PageRequest::new(page, limit, self.default_limit, self.max_limit)
            .map_err(ApplicationError::from)
    }
}

/// 在庫クエリサービス
/// 読み取り専用の在庫操作を提供する。論理削除済みのレコードは返さない
pub struct InventoryQueryService {
    records: Arc<dyn InventoryRecordStore>,
    ledger: Arc<dyn MovementLedger>,
    pagination: PaginationSettings,
}

impl InventoryQueryService {
    /// 新しい在庫クエリサービスを作成
    ///
    /// # Arguments
    /// * `records` - 在庫レコードの読み取りポート
    /// * `ledger` - 在庫移動台帳の読み取りポート
    /// * `pagination` - ページングの既定値と上限
    pub fn new(
        records: Arc<dyn InventoryRecordStore>,
        ledger: Arc<dyn MovementLedger>,
        pagination: PaginationSettings,
    ) -> Self {
        Self {
            records,
            ledger,
            pagination,
        }
    }

    /// (製品バッチ, ロケーション) の在庫レコードを取得
    ///
    /// # Returns
    /// * `Ok(InventoryRecord)` - 有効な在庫レコード
    /// * `Err(ApplicationError::NotFound)` - 存在しない、または論理削除済み
    pub async fn get_inventory(
        &self,
        product_batch_id: ProductBatchId,
        location_id: LocationId,
    ) -> Result<InventoryRecord, ApplicationError> {
        let key = StockKey::new(product_batch_id, location_id);
        self.records
            .find_by_key(key)
            .await?
            .filter(InventoryRecord::is_active)
            .ok_or_else(|| ApplicationError::NotFound {
                entity: "InventoryRecord",
                id: key.to_string(),
            })
    }

    /// ロケーション内の在庫を取得
    /// 製品バッチIDの昇順で並べて返す
    pub async fn get_inventory_by_location(
        &self,
        location_id: LocationId,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Page<InventoryRecord>, ApplicationError> {
        let request = self.pagination.request(page, limit)?;
        self.records
            .find_by_location(location_id, request)
            .await
            .map_err(ApplicationError::from)
    }

    /// 製品バッチの在庫をロケーションごとに取得
    /// ロケーションIDの昇順で並べて返す
    pub async fn get_inventory_by_batch(
        &self,
        product_batch_id: ProductBatchId,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Page<InventoryRecord>, ApplicationError> {
        let request = self.pagination.request(page, limit)?;
        self.records
            .find_by_batch(product_batch_id, request)
            .await
            .map_err(ApplicationError::from)
    }

    /// 製品バッチの移動履歴を取得
    /// 作成日時の降順で並べて返す
    pub async fn get_movement_history(
        &self,
        query: MovementHistoryQuery,
    ) -> Result<Page<StockMovement>, ApplicationError> {
        let request = self.pagination.request(query.page, query.limit)?;
        self.ledger
            .find_by_batch(query.product_batch_id, query.filter(), request)
            .await
            .map_err(ApplicationError::from)
    }
}
