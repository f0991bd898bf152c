use crate::adapter::database_error::DatabaseError;
use crate::adapter::driven::mysql_movement_ledger::insert_movement;
use crate::domain::model::{
    InventoryRecord, LocationId, Page, PageRequest, ProductBatchId, RecordState, StockKey,
    StockMovement,
};
use crate::domain::port::{
    InventoryRecordStore, RepositoryError, StockTransaction, TransactionManager,
};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::HashSet;
use uuid::Uuid;

// MySQL関連のインポート
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, Pool, Row, Transaction};

const RECORD_COLUMNS: &str =
    "product_batch_id, location_id, available_qty, reserved_qty, deleted_at, placeholder_token";

/// データベースの行から在庫レコードを復元する
fn record_from_row(row: &MySqlRow) -> Result<InventoryRecord, RepositoryError> {
    let product_batch_id = ProductBatchId::from_string(row.get("product_batch_id")).map_err(|e| {
        RepositoryError::FetchFailed(format!("製品バッチIDの解析に失敗しました: {}", e))
    })?;
    let location_id = LocationId::from_string(row.get("location_id")).map_err(|e| {
        RepositoryError::FetchFailed(format!("ロケーションIDの解析に失敗しました: {}", e))
    })?;
    let state = match row.get::<Option<NaiveDateTime>, _>("deleted_at") {
        Some(deleted_at) => RecordState::Deleted {
            deleted_at: deleted_at.and_utc(),
        },
        None => RecordState::Active,
    };

    Ok(InventoryRecord::restore(
        StockKey::new(product_batch_id, location_id),
        row.get::<u32, _>("available_qty"),
        row.get::<u32, _>("reserved_qty"),
        state,
    ))
}

/// MySQL在庫ストア
/// inventory_records テーブルの参照とトランザクションの開始を担当する
#[derive(Clone)]
pub struct MySqlStockStore {
    pool: Pool<MySql>,
}

impl MySqlStockStore {
    /// 新しいMySQL在庫ストアを作成
    ///
    /// # Arguments
    /// * `pool` - MySQLコネクションプール
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    async fn find_page(
        &self,
        filter_column: &str,
        filter_value: String,
        order_column: &str,
        page: PageRequest,
    ) -> Result<Page<InventoryRecord>, RepositoryError> {
        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM inventory_records \
             WHERE {} = ? AND deleted_at IS NULL AND placeholder_token IS NULL",
            filter_column
        ))
        .bind(&filter_value)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_sqlx("在庫件数の取得に失敗しました", e))?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM inventory_records \
             WHERE {} = ? AND deleted_at IS NULL AND placeholder_token IS NULL \
             ORDER BY {} ASC LIMIT ? OFFSET ?",
            RECORD_COLUMNS, filter_column, order_column
        ))
        .bind(&filter_value)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_sqlx("在庫一覧の取得に失敗しました", e))?;

        let items = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, total.max(0) as u64, page))
    }
}

#[async_trait]
impl InventoryRecordStore for MySqlStockStore {
    async fn find_by_key(&self, key: StockKey) -> Result<Option<InventoryRecord>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM inventory_records \
             WHERE product_batch_id = ? AND location_id = ? AND placeholder_token IS NULL",
            RECORD_COLUMNS
        ))
        .bind(key.product_batch_id().to_string())
        .bind(key.location_id().to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_sqlx("在庫の取得に失敗しました", e))?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn find_by_location(
        &self,
        location_id: LocationId,
        page: PageRequest,
    ) -> Result<Page<InventoryRecord>, RepositoryError> {
        self.find_page("location_id", location_id.to_string(), "product_batch_id", page)
            .await
    }

    async fn find_by_batch(
        &self,
        product_batch_id: ProductBatchId,
        page: PageRequest,
    ) -> Result<Page<InventoryRecord>, RepositoryError> {
        self.find_page(
            "product_batch_id",
            product_batch_id.to_string(),
            "location_id",
            page,
        )
        .await
    }
}

#[async_trait]
impl TransactionManager for MySqlStockStore {
    async fn begin(&self) -> Result<Box<dyn StockTransaction>, RepositoryError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DatabaseError::from_sqlx("トランザクションの開始に失敗しました", e))?;
        Ok(Box::new(MySqlStockTransaction {
            tx,
            token: Uuid::new_v4().to_string(),
            locked: HashSet::new(),
            placeholders: HashSet::new(),
        }))
    }
}

/// MySQLトランザクション
///
/// 存在しない行もロックできるよう、トランザクション固有のトークン付きで仮の行を挿入してから
/// `SELECT ... FOR UPDATE` する。トークンが自分のものであれば、その行は元々存在しなかった。
/// 書き込まれなかった仮の行はコミット前に削除する
struct MySqlStockTransaction {
    tx: Transaction<'static, MySql>,
    token: String,
    locked: HashSet<StockKey>,
    placeholders: HashSet<StockKey>,
}

#[async_trait]
impl StockTransaction for MySqlStockTransaction {
    async fn lock_record(
        &mut self,
        key: StockKey,
    ) -> Result<Option<InventoryRecord>, RepositoryError> {
        // 既存の行はそのまま排他ロックされ、ない場合は仮の行が挿入される
        sqlx::query(
            r#"
            INSERT INTO inventory_records
                (product_batch_id, location_id, available_qty, reserved_qty, placeholder_token)
            VALUES (?, ?, 0, 0, ?)
            ON DUPLICATE KEY UPDATE product_batch_id = product_batch_id
            "#,
        )
        .bind(key.product_batch_id().to_string())
        .bind(key.location_id().to_string())
        .bind(&self.token)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DatabaseError::from_sqlx("在庫行のロックに失敗しました", e))?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM inventory_records \
             WHERE product_batch_id = ? AND location_id = ? FOR UPDATE",
            RECORD_COLUMNS
        ))
        .bind(key.product_batch_id().to_string())
        .bind(key.location_id().to_string())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| DatabaseError::from_sqlx("在庫行のロックに失敗しました", e))?;

        self.locked.insert(key);
        let token: Option<String> = row.get("placeholder_token");
        if token.as_deref() == Some(self.token.as_str()) {
            self.placeholders.insert(key);
            return Ok(None);
        }
        record_from_row(&row).map(Some)
    }

    async fn upsert_record(&mut self, record: &InventoryRecord) -> Result<(), RepositoryError> {
        let key = record.key();
        if !self.locked.contains(&key) {
            return Err(RepositoryError::OperationFailed(format!(
                "record {} is not locked by this transaction",
                key
            )));
        }

        sqlx::query(
            r#"
            UPDATE inventory_records
            SET available_qty = ?, reserved_qty = ?, deleted_at = ?, placeholder_token = NULL
            WHERE product_batch_id = ? AND location_id = ?
            "#,
        )
        .bind(record.available_qty())
        .bind(record.reserved_qty())
        .bind(record.deleted_at().map(|at| at.naive_utc()))
        .bind(key.product_batch_id().to_string())
        .bind(key.location_id().to_string())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DatabaseError::from_sqlx("在庫の保存に失敗しました", e))?;

        self.placeholders.remove(&key);
        Ok(())
    }

    async fn append_movement(&mut self, movement: &StockMovement) -> Result<(), RepositoryError> {
        insert_movement(&mut self.tx, movement).await
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let mut this = *self;
        for key in &this.placeholders {
            sqlx::query(
                "DELETE FROM inventory_records \
                 WHERE product_batch_id = ? AND location_id = ? AND placeholder_token = ?",
            )
            .bind(key.product_batch_id().to_string())
            .bind(key.location_id().to_string())
            .bind(&this.token)
            .execute(&mut *this.tx)
            .await
            .map_err(|e| DatabaseError::from_sqlx("仮の在庫行の削除に失敗しました", e))?;
        }

        this.tx
            .commit()
            .await
            .map_err(|e| DatabaseError::from_sqlx("トランザクションのコミットに失敗しました", e))?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| DatabaseError::from_sqlx("トランザクションのロールバックに失敗しました", e))?;
        Ok(())
    }
}
