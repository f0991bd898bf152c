use crate::adapter::database_error::DatabaseError;
use crate::domain::model::{
    AdjustmentReason, IdempotencyKey, LocationId, MovementFilter, MovementId, MovementLocation,
    MovementType, OrderId, Page, PageRequest, ProductBatchId, StockMovement, UserId,
};
use crate::domain::port::{MovementLedger, RepositoryError};
use async_trait::async_trait;
use chrono::NaiveDateTime;

// MySQL関連のインポート
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, Pool, QueryBuilder, Row, Transaction};

const MOVEMENT_COLUMNS: &str = "id, product_batch_id, movement_type, location_id, \
     from_location_id, to_location_id, quantity, idempotency_key, created_by_id, order_id, \
     reason, note, created_at";

/// 省略可能なID列を解析する
fn parse_optional_id<T>(
    row: &MySqlRow,
    column: &str,
    parse: impl Fn(&str) -> Result<T, uuid::Error>,
) -> Result<Option<T>, RepositoryError> {
    row.get::<Option<String>, _>(column)
        .map(|value| {
            parse(&value).map_err(|e| {
                RepositoryError::FetchFailed(format!("{} の解析に失敗しました: {}", column, e))
            })
        })
        .transpose()
}

/// データベースの行から台帳エントリを復元する
fn movement_from_row(row: &MySqlRow) -> Result<StockMovement, RepositoryError> {
    let id = MovementId::from_string(row.get("id"))
        .map_err(|e| RepositoryError::FetchFailed(format!("移動IDの解析に失敗しました: {}", e)))?;
    let product_batch_id = ProductBatchId::from_string(row.get("product_batch_id")).map_err(|e| {
        RepositoryError::FetchFailed(format!("製品バッチIDの解析に失敗しました: {}", e))
    })?;
    let movement_type = MovementType::from_string(row.get("movement_type")).map_err(|e| {
        RepositoryError::FetchFailed(format!("移動種別の解析に失敗しました: {}", e))
    })?;

    let location_id = parse_optional_id(row, "location_id", LocationId::from_string)?;
    let from_location_id = parse_optional_id(row, "from_location_id", LocationId::from_string)?;
    let to_location_id = parse_optional_id(row, "to_location_id", LocationId::from_string)?;
    let location = match (location_id, from_location_id, to_location_id) {
        (Some(location_id), None, None) => MovementLocation::Single(location_id),
        (None, Some(from), Some(to)) => MovementLocation::Transfer { from, to },
        _ => {
            return Err(RepositoryError::FetchFailed(format!(
                "移動 {} のロケーションが不正です",
                id
            )))
        }
    };

    let idempotency_key = IdempotencyKey::new(row.get::<String, _>("idempotency_key"))
        .map_err(|e| {
            RepositoryError::FetchFailed(format!("冪等性キーの解析に失敗しました: {}", e))
        })?;
    let reason = row
        .get::<Option<String>, _>("reason")
        .map(|value| AdjustmentReason::from_string(&value))
        .transpose()
        .map_err(|e| RepositoryError::FetchFailed(format!("調整理由の解析に失敗しました: {}", e)))?;

    Ok(StockMovement::reconstruct(
        id,
        product_batch_id,
        movement_type,
        location,
        row.get::<i64, _>("quantity"),
        idempotency_key,
        parse_optional_id(row, "created_by_id", UserId::from_string)?,
        parse_optional_id(row, "order_id", OrderId::from_string)?,
        reason,
        row.get::<Option<String>, _>("note"),
        row.get::<NaiveDateTime, _>("created_at").and_utc(),
    ))
}

/// トランザクション内で台帳エントリを追加する
/// 冪等性キーの一意制約違反は `RepositoryError::DuplicateKey` として返す
pub(crate) async fn insert_movement(
    tx: &mut Transaction<'static, MySql>,
    movement: &StockMovement,
) -> Result<(), RepositoryError> {
    let (location_id, from_location_id, to_location_id) = match movement.location() {
        MovementLocation::Single(location_id) => (Some(location_id), None, None),
        MovementLocation::Transfer { from, to } => (None, Some(from), Some(to)),
    };

    let result = sqlx::query(
        r#"
        INSERT INTO stock_movements
            (id, product_batch_id, movement_type, location_id, from_location_id, to_location_id,
             quantity, idempotency_key, created_by_id, order_id, reason, note, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(movement.id().to_string())
    .bind(movement.product_batch_id().to_string())
    .bind(movement.movement_type().as_str())
    .bind(location_id.map(|id| id.to_string()))
    .bind(from_location_id.map(|id| id.to_string()))
    .bind(to_location_id.map(|id| id.to_string()))
    .bind(movement.quantity())
    .bind(movement.idempotency_key().as_str())
    .bind(movement.created_by_id().map(|id| id.to_string()))
    .bind(movement.order_id().map(|id| id.to_string()))
    .bind(movement.reason().map(|reason| reason.as_str()))
    .bind(movement.note())
    .bind(movement.created_at().naive_utc())
    .execute(&mut **tx)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(e) => match DatabaseError::from_sqlx("在庫移動の保存に失敗しました", e) {
            DatabaseError::UniqueViolation(_) => Err(RepositoryError::DuplicateKey {
                key: movement.idempotency_key().to_string(),
            }),
            other => Err(other.into()),
        },
    }
}

/// MySQL在庫移動台帳
/// stock_movements テーブルの参照を担当する。追加はトランザクション経由で行う
#[derive(Clone)]
pub struct MySqlMovementLedger {
    pool: Pool<MySql>,
}

impl MySqlMovementLedger {
    /// 新しいMySQL在庫移動台帳を作成
    ///
    /// # Arguments
    /// * `pool` - MySQLコネクションプール
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    fn push_filter(
        builder: &mut QueryBuilder<'_, MySql>,
        product_batch_id: ProductBatchId,
        filter: MovementFilter,
    ) {
        builder
            .push(" WHERE product_batch_id = ")
            .push_bind(product_batch_id.to_string());
        if let Some(movement_type) = filter.movement_type {
            builder
                .push(" AND movement_type = ")
                .push_bind(movement_type.as_str());
        }
        if let Some(location_id) = filter.location_id {
            let location_id = location_id.to_string();
            builder
                .push(" AND (location_id = ")
                .push_bind(location_id.clone())
                .push(" OR from_location_id = ")
                .push_bind(location_id.clone())
                .push(" OR to_location_id = ")
                .push_bind(location_id)
                .push(")");
        }
    }
}

#[async_trait]
impl MovementLedger for MySqlMovementLedger {
    async fn find_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<StockMovement>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM stock_movements WHERE idempotency_key = ?",
            MOVEMENT_COLUMNS
        ))
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_sqlx("在庫移動の取得に失敗しました", e))?;

        row.as_ref().map(movement_from_row).transpose()
    }

    async fn find_by_batch(
        &self,
        product_batch_id: ProductBatchId,
        filter: MovementFilter,
        page: PageRequest,
    ) -> Result<Page<StockMovement>, RepositoryError> {
        let mut count = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM stock_movements");
        Self::push_filter(&mut count, product_batch_id, filter);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx("在庫移動件数の取得に失敗しました", e))?;

        let mut select =
            QueryBuilder::<MySql>::new(format!("SELECT {} FROM stock_movements", MOVEMENT_COLUMNS));
        Self::push_filter(&mut select, product_batch_id, filter);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());

        let rows = select
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx("在庫移動履歴の取得に失敗しました", e))?;

        let items = rows
            .iter()
            .map(movement_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, total.max(0) as u64, page))
    }
}
