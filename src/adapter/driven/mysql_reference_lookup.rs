use crate::adapter::database_error::DatabaseError;
use crate::domain::model::{LocationId, ProductBatchId, UserId};
use crate::domain::port::{BatchInfo, ReferenceLookup, RepositoryError};
use async_trait::async_trait;
use chrono::NaiveDateTime;

// MySQL関連のインポート
use sqlx::{MySql, Pool, Row};

/// MySQL参照データ照会
/// 製品バッチ・ロケーション・ユーザーの存在確認を担当する
#[derive(Clone)]
pub struct MySqlReferenceLookup {
    pool: Pool<MySql>,
}

impl MySqlReferenceLookup {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    async fn exists(&self, table: &str, id: String) -> Result<bool, RepositoryError> {
        let found: Option<i32> =
            sqlx::query_scalar(&format!("SELECT 1 FROM {} WHERE id = ? LIMIT 1", table))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    DatabaseError::from_sqlx(&format!("{} の参照に失敗しました", table), e)
                })?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl ReferenceLookup for MySqlReferenceLookup {
    async fn find_batch(
        &self,
        product_batch_id: ProductBatchId,
    ) -> Result<Option<BatchInfo>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, min_stock_level, expiry_date FROM product_batches WHERE id = ?",
        )
        .bind(product_batch_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_sqlx("製品バッチの取得に失敗しました", e))?;

        Ok(row.map(|row| BatchInfo {
            id: product_batch_id,
            min_stock_level: row.get::<Option<i32>, _>("min_stock_level").map(i64::from),
            expires_at: row
                .get::<Option<NaiveDateTime>, _>("expiry_date")
                .map(|at| at.and_utc()),
        }))
    }

    async fn location_exists(&self, location_id: LocationId) -> Result<bool, RepositoryError> {
        self.exists("locations", location_id.to_string()).await
    }

    async fn user_exists(&self, user_id: UserId) -> Result<bool, RepositoryError> {
        self.exists("users", user_id.to_string()).await
    }
}
