use crate::domain::model::{
    IdempotencyKey, InventoryRecord, LocationId, MovementFilter, Page, PageRequest,
    ProductBatchId, StockKey, StockMovement, UserId,
};
use crate::domain::port::{
    BatchInfo, InventoryRecordStore, MovementLedger, ReferenceLookup, RepositoryError,
    StockTransaction, TransactionManager,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// 製品バッチの参照データ
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedBatch {
    pub id: ProductBatchId,
    #[serde(default)]
    pub min_stock_level: Option<i64>,
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
}

/// インメモリストアに読み込む参照データ
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceSeed {
    #[serde(default)]
    pub batches: Vec<SeedBatch>,
    #[serde(default)]
    pub locations: Vec<LocationId>,
    #[serde(default)]
    pub users: Vec<UserId>,
}

#[derive(Default)]
struct StoreData {
    records: BTreeMap<StockKey, InventoryRecord>,
    movements: Vec<StockMovement>,
    idempotency_index: HashMap<String, usize>,
    batches: HashMap<ProductBatchId, BatchInfo>,
    locations: HashSet<LocationId>,
    users: HashSet<UserId>,
}

#[derive(Default)]
struct StoreState {
    data: Mutex<StoreData>,
    row_locks: Mutex<HashMap<StockKey, Arc<AsyncMutex<()>>>>,
}

impl StoreState {
    fn data(&self) -> Result<MutexGuard<'_, StoreData>, RepositoryError> {
        self.data
            .lock()
            .map_err(|_| RepositoryError::OperationFailed("in-memory store is poisoned".to_string()))
    }

    fn row_lock(&self, key: StockKey) -> Result<Arc<AsyncMutex<()>>, RepositoryError> {
        let mut locks = self
            .row_locks
            .lock()
            .map_err(|_| RepositoryError::OperationFailed("lock table is poisoned".to_string()))?;
        Ok(locks
            .entry(key)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone())
    }

    /// 誰も保持・待機していない行ロックを破棄する
    fn prune_row_locks(&self, keys: &[StockKey]) {
        let Ok(mut locks) = self.row_locks.lock() else {
            return;
        };
        for key in keys {
            if locks
                .get(key)
                .is_some_and(|lock| Arc::strong_count(lock) == 1)
            {
                locks.remove(key);
            }
        }
    }
}

/// インメモリの在庫ストア
///
/// 在庫レコード・台帳・参照データをプロセス内に保持する。
/// キーごとの非同期ロックで行ロックを再現し、書き込みはコミット時にまとめて反映する
#[derive(Clone, Default)]
pub struct InMemoryStockStore {
    state: Arc<StoreState>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 製品バッチを登録
    pub fn add_batch(&self, batch: BatchInfo) -> Result<(), RepositoryError> {
        self.state.data()?.batches.insert(batch.id, batch);
        Ok(())
    }

    /// ロケーションを登録
    pub fn add_location(&self, location_id: LocationId) -> Result<(), RepositoryError> {
        self.state.data()?.locations.insert(location_id);
        Ok(())
    }

    /// ユーザーを登録
    pub fn add_user(&self, user_id: UserId) -> Result<(), RepositoryError> {
        self.state.data()?.users.insert(user_id);
        Ok(())
    }

    /// 参照データをまとめて登録
    pub fn load_seed(&self, seed: ReferenceSeed) -> Result<(), RepositoryError> {
        let mut data = self.state.data()?;
        for batch in seed.batches {
            data.batches.insert(
                batch.id,
                BatchInfo {
                    id: batch.id,
                    min_stock_level: batch.min_stock_level,
                    expires_at: batch.expiry_date,
                },
            );
        }
        data.locations.extend(seed.locations);
        data.users.extend(seed.users);
        Ok(())
    }

    /// 台帳エントリの総数
    pub fn movement_count(&self) -> Result<usize, RepositoryError> {
        Ok(self.state.data()?.movements.len())
    }

    fn page_records(
        &self,
        request: PageRequest,
        predicate: impl Fn(&InventoryRecord) -> bool,
        sort_key: impl Fn(&InventoryRecord) -> String,
    ) -> Result<Page<InventoryRecord>, RepositoryError> {
        let mut matched: Vec<InventoryRecord> = self
            .state
            .data()?
            .records
            .values()
            .filter(|record| record.is_active() && predicate(record))
            .cloned()
            .collect();
        matched.sort_by_key(|record| sort_key(record));
        Ok(paginate(matched, request))
    }
}

fn paginate<T>(items: Vec<T>, request: PageRequest) -> Page<T> {
    let total = items.len() as u64;
    let items = items
        .into_iter()
        .skip(request.offset() as usize)
        .take(request.limit() as usize)
        .collect();
    Page::new(items, total, request)
}

#[async_trait]
impl InventoryRecordStore for InMemoryStockStore {
    async fn find_by_key(&self, key: StockKey) -> Result<Option<InventoryRecord>, RepositoryError> {
        Ok(self.state.data()?.records.get(&key).cloned())
    }

    async fn find_by_location(
        &self,
        location_id: LocationId,
        page: PageRequest,
    ) -> Result<Page<InventoryRecord>, RepositoryError> {
        // MySQL実装と同じく文字列表現の昇順
        self.page_records(
            page,
            |record| record.location_id() == location_id,
            |record| record.product_batch_id().to_string(),
        )
    }

    async fn find_by_batch(
        &self,
        product_batch_id: ProductBatchId,
        page: PageRequest,
    ) -> Result<Page<InventoryRecord>, RepositoryError> {
        self.page_records(
            page,
            |record| record.product_batch_id() == product_batch_id,
            |record| record.location_id().to_string(),
        )
    }
}

#[async_trait]
impl MovementLedger for InMemoryStockStore {
    async fn find_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<StockMovement>, RepositoryError> {
        let data = self.state.data()?;
        Ok(data
            .idempotency_index
            .get(key.as_str())
            .and_then(|index| data.movements.get(*index))
            .cloned())
    }

    async fn find_by_batch(
        &self,
        product_batch_id: ProductBatchId,
        filter: MovementFilter,
        page: PageRequest,
    ) -> Result<Page<StockMovement>, RepositoryError> {
        // 追記順に保持しているので、逆順にすると作成日時の降順になる
        let matched: Vec<StockMovement> = self
            .state
            .data()?
            .movements
            .iter()
            .rev()
            .filter(|movement| {
                movement.product_batch_id() == product_batch_id && filter.matches(movement)
            })
            .cloned()
            .collect();
        Ok(paginate(matched, page))
    }
}

#[async_trait]
impl ReferenceLookup for InMemoryStockStore {
    async fn find_batch(
        &self,
        product_batch_id: ProductBatchId,
    ) -> Result<Option<BatchInfo>, RepositoryError> {
        Ok(self.state.data()?.batches.get(&product_batch_id).copied())
    }

    async fn location_exists(&self, location_id: LocationId) -> Result<bool, RepositoryError> {
        Ok(self.state.data()?.locations.contains(&location_id))
    }

    async fn user_exists(&self, user_id: UserId) -> Result<bool, RepositoryError> {
        Ok(self.state.data()?.users.contains(&user_id))
    }
}

#[async_trait]
impl TransactionManager for InMemoryStockStore {
    async fn begin(&self) -> Result<Box<dyn StockTransaction>, RepositoryError> {
        Ok(Box::new(InMemoryTransaction {
            state: self.state.clone(),
            guards: HashMap::new(),
            staged_records: Vec::new(),
            staged_movements: Vec::new(),
        }))
    }
}

/// インメモリのトランザクション
/// 破棄されるとロックを解放し、ステージした変更は捨てる
struct InMemoryTransaction {
    state: Arc<StoreState>,
    guards: HashMap<StockKey, OwnedMutexGuard<()>>,
    staged_records: Vec<InventoryRecord>,
    staged_movements: Vec<StockMovement>,
}

impl InMemoryTransaction {
    fn staged_record(&self, key: StockKey) -> Option<&InventoryRecord> {
        self.staged_records.iter().rev().find(|record| record.key() == key)
    }

    fn is_duplicate(&self, data: &StoreData, movement: &StockMovement) -> bool {
        let key = movement.idempotency_key().as_str();
        data.idempotency_index.contains_key(key)
            || self
                .staged_movements
                .iter()
                .any(|staged| staged.idempotency_key().as_str() == key)
    }
}

#[async_trait]
impl StockTransaction for InMemoryTransaction {
    async fn lock_record(
        &mut self,
        key: StockKey,
    ) -> Result<Option<InventoryRecord>, RepositoryError> {
        if !self.guards.contains_key(&key) {
            let row_lock = self.state.row_lock(key)?;
            let guard = row_lock.lock_owned().await;
            self.guards.insert(key, guard);
        }
        if let Some(record) = self.staged_record(key) {
            return Ok(Some(record.clone()));
        }
        let record = self.state.data()?.records.get(&key).cloned();
        Ok(record)
    }

    async fn upsert_record(&mut self, record: &InventoryRecord) -> Result<(), RepositoryError> {
        if !self.guards.contains_key(&record.key()) {
            return Err(RepositoryError::OperationFailed(format!(
                "record {} is not locked by this transaction",
                record.key()
            )));
        }
        self.staged_records.push(record.clone());
        Ok(())
    }

    async fn append_movement(&mut self, movement: &StockMovement) -> Result<(), RepositoryError> {
        let duplicate = {
            let data = self.state.data()?;
            self.is_duplicate(&data, movement)
        };
        if duplicate {
            return Err(RepositoryError::DuplicateKey {
                key: movement.idempotency_key().to_string(),
            });
        }
        self.staged_movements.push(movement.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let mut data = self.state.data()?;
        // 一意制約はコミット時にも確認する
        for movement in &self.staged_movements {
            if data
                .idempotency_index
                .contains_key(movement.idempotency_key().as_str())
            {
                return Err(RepositoryError::DuplicateKey {
                    key: movement.idempotency_key().to_string(),
                });
            }
        }
        for record in &self.staged_records {
            data.records.insert(record.key(), record.clone());
        }
        for movement in &self.staged_movements {
            let index = data.movements.len();
            data.idempotency_index
                .insert(movement.idempotency_key().to_string(), index);
            data.movements.push(movement.clone());
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        Ok(())
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        let keys: Vec<StockKey> = self.guards.keys().copied().collect();
        self.guards.clear();
        self.state.prune_row_locks(&keys);
    }
}
