use crate::domain::error::DomainError;
use crate::domain::model::{InventoryRecord, StockKey, StockMovement};
use crate::domain::port::{Logger, RepositoryError, TransactionManager};
use crate::domain::service::StockOperationError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// トランザクション内で書き込む変更内容
#[derive(Debug, Clone, PartialEq)]
pub struct StockChange {
    records: Vec<InventoryRecord>,
    movement: Option<StockMovement>,
}

impl StockChange {
    /// 更新後の在庫レコードから変更内容を作成
    pub fn new(records: Vec<InventoryRecord>) -> Self {
        Self {
            records,
            movement: None,
        }
    }

    /// 同じトランザクションで追記する台帳エントリを設定
    pub fn with_movement(mut self, movement: StockMovement) -> Self {
        self.movement = Some(movement);
        self
    }
}

/// コミット済みの変更
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedChange {
    /// ロック取得時点のレコード（要求されたキーの順）
    pub before: Vec<Option<InventoryRecord>>,
    /// 書き込んだレコード
    pub records: Vec<InventoryRecord>,
    /// 追記した台帳エントリ
    pub movement: Option<StockMovement>,
}

/// トランザクションコーディネーター
///
/// 「ロック → 現在値の読み取り → 検証 → 書き込み → 台帳追記 → コミット」を
/// 1つのトランザクションで実行する。
///
/// * 複数のキーは `StockKey` の順序（製品バッチID、ロケーションID）でロックする
/// * 検証で拒否された場合、書き込みは行わない
/// * 制限時間を超えた場合、トランザクションは破棄されロールバックされる
pub struct TransactionCoordinator {
    transactions: Arc<dyn TransactionManager>,
    timeout: Duration,
    logger: Option<Arc<dyn Logger>>,
}

const COMPONENT: &str = "TransactionCoordinator";

impl TransactionCoordinator {
    /// 新しいコーディネーターを作成
    ///
    /// # Arguments
    /// * `transactions` - トランザクションを開始するポート
    /// * `timeout` - 1トランザクションの制限時間
    pub fn new(transactions: Arc<dyn TransactionManager>, timeout: Duration) -> Self {
        Self {
            transactions,
            timeout,
            logger: None,
        }
    }

    /// ロールバック失敗などを出力するロガーを設定
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// キーをロックし、`plan` が求めた変更を原子的に適用する
    ///
    /// # Arguments
    /// * `keys` - ロックする在庫レコードのキー
    /// * `plan` - ロック済みレコード（`keys` と同じ順）から変更内容を求める
    ///
    /// # Returns
    /// * `Ok(CommittedChange)` - コミット成功
    /// * `Err(StockOperationError::Rejected)` - `plan` がビジネスルール違反を返した
    /// * `Err(StockOperationError::Repository)` - 永続化の失敗または制限時間超過
    pub async fn execute<F>(
        &self,
        keys: &[StockKey],
        plan: F,
    ) -> Result<CommittedChange, StockOperationError>
    where
        F: FnOnce(Vec<Option<InventoryRecord>>) -> Result<StockChange, DomainError> + Send,
    {
        let started = Instant::now();
        match tokio::time::timeout(self.timeout, self.run(keys, plan)).await {
            Ok(result) => result,
            Err(_) => Err(RepositoryError::Timeout {
                elapsed_ms: started.elapsed().as_millis() as u64,
            }
            .into()),
        }
    }

    async fn run<F>(
        &self,
        keys: &[StockKey],
        plan: F,
    ) -> Result<CommittedChange, StockOperationError>
    where
        F: FnOnce(Vec<Option<InventoryRecord>>) -> Result<StockChange, DomainError> + Send,
    {
        let mut lock_order = keys.to_vec();
        lock_order.sort();
        lock_order.dedup();

        let mut tx = self.transactions.begin().await?;

        let mut locked = HashMap::with_capacity(lock_order.len());
        for key in lock_order {
            let record = tx.lock_record(key).await?;
            locked.insert(key, record);
        }

        let before: Vec<Option<InventoryRecord>> = keys
            .iter()
            .map(|key| locked.get(key).cloned().flatten())
            .collect();

        let change = match plan(before.clone()) {
            Ok(change) => change,
            Err(rejection) => {
                // 拒否理由を優先して返す
                if let Err(err) = tx.rollback().await {
                    if let Some(logger) = &self.logger {
                        let mut context = HashMap::new();
                        context.insert("error".to_string(), err.to_string());
                        context.insert("rejection".to_string(), rejection.to_string());
                        logger.error(COMPONENT, "Rollback failed", None, Some(context));
                    }
                }
                return Err(rejection.into());
            }
        };

        for record in &change.records {
            if !locked.contains_key(&record.key()) {
                return Err(RepositoryError::OperationFailed(format!(
                    "record {} was not locked in this transaction",
                    record.key()
                ))
                .into());
            }
            tx.upsert_record(record).await?;
        }

        if let Some(movement) = &change.movement {
            tx.append_movement(movement).await?;
        }

        tx.commit().await?;

        Ok(CommittedChange {
            before,
            records: change.records,
            movement: change.movement,
        })
    }
}
