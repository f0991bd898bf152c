use stock_movement_engine::adapter::driven::{InMemoryStockStore, TracingLogger};
use stock_movement_engine::application::command::{
    AdjustStock, DeleteRecord, DispatchStock, MovementHistoryQuery, ReceiveStock, ReleaseStock,
    ReserveStock, TransferStock, UpdateQuantity,
};
use stock_movement_engine::application::service::{
    InventoryQueryService, PaginationSettings, StockMovementService,
};
use stock_movement_engine::application::{ApplicationError, ErrorKind};
use stock_movement_engine::domain::alert::{
    AlertSeverity, StockAlert, StockAlertKind, StockAlertPolicy,
};
use stock_movement_engine::domain::context::RequestContext;
use stock_movement_engine::domain::model::{
    AdjustmentReason, IdempotencyKey, LocationId, MovementFilter, MovementType, OrderId, Page,
    PageRequest, ProductBatchId, StockKey, StockMovement, UserId,
};
use stock_movement_engine::domain::port::{
    AlertError, AlertNotifier, AuditAction, AuditEntry, AuditSink, BatchInfo,
    InventoryRecordStore, MovementLedger, RepositoryError, TransactionManager,
};
use stock_movement_engine::domain::service::{IdempotencyGuard, TransactionCoordinator};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// テスト用の監査ログ記録
#[derive(Default)]
struct RecordingAudit {
    entries: Mutex<Vec<AuditEntry>>,
}

impl RecordingAudit {
    fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }
}

impl AuditSink for RecordingAudit {
    fn submit(&self, entry: AuditEntry) {
        self.entries.lock().unwrap().push(entry);
    }
}

// テスト用のアラート通知記録
#[derive(Default)]
struct RecordingAlerts {
    alerts: Mutex<Vec<StockAlert>>,
    fail: bool,
}

impl RecordingAlerts {
    fn failing() -> Self {
        Self {
            alerts: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    fn alerts(&self) -> Vec<StockAlert> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertNotifier for RecordingAlerts {
    async fn notify(&self, alert: StockAlert) -> Result<(), AlertError> {
        self.alerts.lock().unwrap().push(alert);
        if self.fail {
            return Err(AlertError::DeliveryFailed("alert service unavailable".to_string()));
        }
        Ok(())
    }
}

// 先頭の何回かだけ冪等性キーの検索で何も返さない台帳
// 並行リクエストに先を越された状況を再現する
struct StaleLedger {
    inner: InMemoryStockStore,
    stale_reads: AtomicUsize,
}

impl StaleLedger {
    fn new(inner: InMemoryStockStore, stale_reads: usize) -> Self {
        Self {
            inner,
            stale_reads: AtomicUsize::new(stale_reads),
        }
    }
}

#[async_trait]
impl MovementLedger for StaleLedger {
    async fn find_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<StockMovement>, RepositoryError> {
        let stale = self
            .stale_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Ok(None);
        }
        self.inner.find_by_idempotency_key(key).await
    }

    async fn find_by_batch(
        &self,
        product_batch_id: ProductBatchId,
        filter: MovementFilter,
        page: PageRequest,
    ) -> Result<Page<StockMovement>, RepositoryError> {
        MovementLedger::find_by_batch(&self.inner, product_batch_id, filter, page).await
    }
}

struct Harness {
    store: InMemoryStockStore,
    service: Arc<StockMovementService>,
    queries: InventoryQueryService,
    audit: Arc<RecordingAudit>,
    alerts: Arc<RecordingAlerts>,
    batch: ProductBatchId,
    locations: Vec<LocationId>,
    user: UserId,
}

impl Harness {
    fn new() -> Self {
        Self::build(None, None, Arc::new(RecordingAlerts::default()))
    }

    fn build(
        min_stock_level: Option<i64>,
        expires_at: Option<chrono::DateTime<Utc>>,
        alerts: Arc<RecordingAlerts>,
    ) -> Self {
        let store = InMemoryStockStore::new();
        let batch = ProductBatchId::new();
        let locations: Vec<LocationId> = (0..3).map(|_| LocationId::new()).collect();
        let user = UserId::new();
        store
            .add_batch(BatchInfo {
                id: batch,
                min_stock_level,
                expires_at,
            })
            .unwrap();
        for location in &locations {
            store.add_location(*location).unwrap();
        }
        store.add_user(user).unwrap();

        let audit = Arc::new(RecordingAudit::default());
        let service = service_with_ledger(&store, Arc::new(store.clone()))
            .with_audit(audit.clone())
            .with_alerts(alerts.clone(), StockAlertPolicy::default());
        let shared = Arc::new(store.clone());
        let queries =
            InventoryQueryService::new(shared.clone(), shared, PaginationSettings::default());

        Self {
            store,
            service: Arc::new(service),
            queries,
            audit,
            alerts,
            batch,
            locations,
            user,
        }
    }

    fn key(&self, location: usize) -> StockKey {
        StockKey::new(self.batch, self.locations[location])
    }

    fn receive(&self, location: usize, quantity: i64, idempotency_key: &str) -> ReceiveStock {
        ReceiveStock {
            product_batch_id: self.batch,
            location_id: self.locations[location],
            quantity,
            created_by_id: None,
            idempotency_key: idempotency_key.to_string(),
            note: None,
        }
    }

    fn dispatch(&self, location: usize, quantity: i64, idempotency_key: &str) -> DispatchStock {
        DispatchStock {
            product_batch_id: self.batch,
            location_id: self.locations[location],
            quantity,
            created_by_id: None,
            idempotency_key: idempotency_key.to_string(),
            note: None,
        }
    }

    fn reserve(&self, quantity: i64, order_id: OrderId, idempotency_key: &str) -> ReserveStock {
        ReserveStock {
            product_batch_id: self.batch,
            location_id: self.locations[0],
            quantity,
            order_id,
            created_by_id: None,
            idempotency_key: idempotency_key.to_string(),
            note: None,
        }
    }

    fn release(&self, quantity: i64, order_id: OrderId, idempotency_key: &str) -> ReleaseStock {
        ReleaseStock {
            product_batch_id: self.batch,
            location_id: self.locations[0],
            quantity,
            order_id,
            created_by_id: None,
            idempotency_key: idempotency_key.to_string(),
            note: None,
        }
    }

    fn transfer(&self, from: usize, to: usize, quantity: i64, idempotency_key: &str) -> TransferStock {
        TransferStock {
            product_batch_id: self.batch,
            from_location_id: self.locations[from],
            to_location_id: self.locations[to],
            quantity,
            created_by_id: None,
            idempotency_key: idempotency_key.to_string(),
            note: None,
        }
    }

    fn adjust(&self, quantity: i64, idempotency_key: &str) -> AdjustStock {
        AdjustStock {
            product_batch_id: self.batch,
            location_id: self.locations[0],
            adjustment_quantity: quantity,
            reason: AdjustmentReason::CountError,
            created_by_id: None,
            idempotency_key: idempotency_key.to_string(),
            note: None,
        }
    }

    async fn quantities(&self, location: usize) -> Option<(u32, u32)> {
        self.store
            .find_by_key(self.key(location))
            .await
            .unwrap()
            .map(|record| (record.available_qty(), record.reserved_qty()))
    }
}

fn service_with_ledger(
    store: &InMemoryStockStore,
    ledger: Arc<dyn MovementLedger>,
) -> StockMovementService {
    let shared = Arc::new(store.clone());
    StockMovementService::new(
        shared.clone(),
        IdempotencyGuard::new(ledger),
        TransactionCoordinator::new(shared.clone(), Duration::from_secs(5)),
        shared,
        Arc::new(TracingLogger::new()),
    )
}

fn kind(result: Result<impl std::fmt::Debug, ApplicationError>) -> ErrorKind {
    result.unwrap_err().kind()
}

#[tokio::test]
async fn test_receive_reserve_release_dispatch_scenario() {
    let h = Harness::new();
    let ctx = RequestContext::new();
    let order = OrderId::new();

    // 1. 新規レコードへの入庫
    let received = h.service.receive(&ctx, h.receive(0, 100, "s-1")).await.unwrap();
    assert!(!received.idempotent);
    assert_eq!(h.quantities(0).await, Some((100, 0)));
    let inventory = received.inventory.unwrap();
    assert_eq!(inventory.available_qty(), 100);
    assert_eq!(received.movement.movement_type(), MovementType::Receive);

    // 2. 引当
    h.service.reserve(&ctx, h.reserve(40, order, "s-2")).await.unwrap();
    assert_eq!(h.quantities(0).await, Some((60, 40)));

    // 3. 引当解除
    h.service.release(&ctx, h.release(10, order, "s-3")).await.unwrap();
    assert_eq!(h.quantities(0).await, Some((70, 30)));

    // 4. 出庫
    h.service.dispatch(&ctx, h.dispatch(0, 70, "s-4")).await.unwrap();
    assert_eq!(h.quantities(0).await, Some((0, 30)));

    // 5. 在庫不足
    let err = h
        .service
        .dispatch(&ctx, h.dispatch(0, 1, "s-5"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApplicationError::InsufficientStock {
            available: 0,
            requested: 1
        }
    ));

    // 6. 入庫の再送は何も変更しない
    let replay = h.service.receive(&ctx, h.receive(0, 100, "s-1")).await.unwrap();
    assert!(replay.idempotent);
    assert_eq!(replay.movement.id(), received.movement.id());
    assert_eq!(replay.inventory.unwrap().available_qty(), 0);
    assert_eq!(h.quantities(0).await, Some((0, 30)));
    assert_eq!(h.store.movement_count().unwrap(), 4);
}

#[tokio::test]
async fn test_dispatch_and_reserve_boundaries() {
    let h = Harness::new();
    let ctx = RequestContext::new();
    h.service.receive(&ctx, h.receive(0, 10, "b-1")).await.unwrap();

    assert_eq!(
        kind(h.service.dispatch(&ctx, h.dispatch(0, 11, "b-2")).await),
        ErrorKind::InsufficientStock
    );
    assert_eq!(
        kind(h.service.reserve(&ctx, h.reserve(11, OrderId::new(), "b-3")).await),
        ErrorKind::InsufficientStock
    );

    h.service
        .reserve(&ctx, h.reserve(10, OrderId::new(), "b-4"))
        .await
        .unwrap();
    assert_eq!(h.quantities(0).await, Some((0, 10)));

    assert_eq!(
        kind(h.service.release(&ctx, h.release(11, OrderId::new(), "b-5")).await),
        ErrorKind::InsufficientReserved
    );
    // 失敗した操作は台帳に残らない
    assert_eq!(h.store.movement_count().unwrap(), 2);
}

#[tokio::test]
async fn test_dispatch_from_absent_record_is_insufficient_stock() {
    let h = Harness::new();
    let err = h
        .service
        .dispatch(&RequestContext::new(), h.dispatch(1, 1, "absent-1"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ApplicationError::InsufficientStock {
            available: 0,
            requested: 1
        }
    ));
    assert_eq!(h.quantities(1).await, None);
}

#[tokio::test]
async fn test_invalid_input_is_rejected_before_lookups() {
    let h = Harness::new();
    let ctx = RequestContext::new();

    assert_eq!(
        kind(h.service.adjust(&ctx, h.adjust(0, "v-1")).await),
        ErrorKind::InvalidArgument
    );
    assert_eq!(
        kind(h.service.receive(&ctx, h.receive(0, 0, "v-2")).await),
        ErrorKind::InvalidArgument
    );
    assert_eq!(
        kind(h.service.receive(&ctx, h.receive(0, -5, "v-3")).await),
        ErrorKind::InvalidArgument
    );
    assert_eq!(
        kind(h.service.receive(&ctx, h.receive(0, 5, "   ")).await),
        ErrorKind::InvalidArgument
    );

    // 移動元と移動先が同じ場合は、存在しない製品バッチでも入力エラーになる
    let mut same = h.transfer(0, 0, 5, "v-4");
    same.product_batch_id = ProductBatchId::new();
    let err = h.service.transfer(&ctx, same).await.unwrap_err();
    assert!(matches!(err, ApplicationError::SameLocation { .. }));
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert_eq!(h.store.movement_count().unwrap(), 0);
}

#[tokio::test]
async fn test_missing_references_are_not_found() {
    let h = Harness::new();
    let ctx = RequestContext::new();

    let mut unknown_batch = h.receive(0, 5, "r-1");
    unknown_batch.product_batch_id = ProductBatchId::new();
    let err = h.service.receive(&ctx, unknown_batch).await.unwrap_err();
    assert!(matches!(
        err,
        ApplicationError::NotFound {
            entity: "ProductBatch",
            ..
        }
    ));

    let mut unknown_location = h.receive(0, 5, "r-2");
    unknown_location.location_id = LocationId::new();
    let err = h.service.receive(&ctx, unknown_location).await.unwrap_err();
    assert!(matches!(err, ApplicationError::NotFound { entity: "Location", .. }));

    let mut unknown_user = h.receive(0, 5, "r-3");
    unknown_user.created_by_id = Some(UserId::new());
    let err = h.service.receive(&ctx, unknown_user).await.unwrap_err();
    assert!(matches!(err, ApplicationError::NotFound { entity: "User", .. }));

    let mut unknown_destination = h.transfer(0, 1, 5, "r-4");
    unknown_destination.to_location_id = LocationId::new();
    assert_eq!(
        kind(h.service.transfer(&ctx, unknown_destination).await),
        ErrorKind::NotFound
    );

    assert_eq!(h.store.movement_count().unwrap(), 0);
}

#[tokio::test]
async fn test_creator_defaults_to_request_actor() {
    let h = Harness::new();
    let ctx = RequestContext::new().with_actor(Some(h.user));

    let outcome = h.service.receive(&ctx, h.receive(0, 5, "actor-1")).await.unwrap();
    assert_eq!(outcome.movement.created_by_id(), Some(h.user));

    let entries = h.audit.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].actor_id, Some(h.user));
    assert_eq!(entries[0].correlation_id, ctx.correlation_id());
}

#[tokio::test]
async fn test_adjustment_reason_and_direction() {
    let h = Harness::new();
    let ctx = RequestContext::new();

    let increased = h.service.adjust(&ctx, h.adjust(15, "adj-1")).await.unwrap();
    assert_eq!(increased.movement.reason(), Some(AdjustmentReason::CountError));
    assert_eq!(h.quantities(0).await, Some((15, 0)));

    let decreased = h.service.adjust(&ctx, h.adjust(-5, "adj-2")).await.unwrap();
    assert_eq!(decreased.movement.quantity(), -5);
    assert_eq!(h.quantities(0).await, Some((10, 0)));

    assert_eq!(
        kind(h.service.adjust(&ctx, h.adjust(-11, "adj-3")).await),
        ErrorKind::InsufficientStock
    );
}

#[tokio::test]
async fn test_transfer_moves_stock_and_records_one_entry() {
    let h = Harness::new();
    let ctx = RequestContext::new();
    h.service.receive(&ctx, h.receive(0, 30, "t-1")).await.unwrap();

    let outcome = h.service.transfer(&ctx, h.transfer(0, 1, 12, "t-2")).await.unwrap();
    assert_eq!(outcome.from_inventory.unwrap().available_qty(), 18);
    assert_eq!(outcome.to_inventory.unwrap().available_qty(), 12);
    assert!(outcome.inventory.is_none());
    assert_eq!(h.store.movement_count().unwrap(), 2);

    let err = h
        .service
        .transfer(&ctx, h.transfer(0, 1, 19, "t-3"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApplicationError::InsufficientStock {
            available: 18,
            requested: 19
        }
    ));
    assert_eq!(h.quantities(0).await, Some((18, 0)));
    assert_eq!(h.quantities(1).await, Some((12, 0)));

    // 移動の再送は移動元・移動先の現在値を返す
    let replay = h.service.transfer(&ctx, h.transfer(0, 1, 12, "t-2")).await.unwrap();
    assert!(replay.idempotent);
    assert_eq!(replay.to_inventory.unwrap().available_qty(), 12);
}

#[tokio::test]
async fn test_idempotency_key_reused_for_another_operation() {
    let h = Harness::new();
    let ctx = RequestContext::new();
    h.service.receive(&ctx, h.receive(0, 10, "shared")).await.unwrap();

    let err = h
        .service
        .dispatch(&ctx, h.dispatch(0, 1, "shared"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(h.quantities(0).await, Some((10, 0)));
}

#[tokio::test]
async fn test_idempotency_keys_differing_in_case_are_distinct() {
    let h = Harness::new();
    let ctx = RequestContext::new();

    let upper = h.service.receive(&ctx, h.receive(0, 5, "Rcv-A1")).await.unwrap();
    let lower = h.service.receive(&ctx, h.receive(0, 7, "rcv-a1")).await.unwrap();

    assert!(upper.applied());
    assert!(lower.applied());
    assert_ne!(upper.movement.id(), lower.movement.id());
    assert_eq!(h.quantities(0).await, Some((12, 0)));
    assert_eq!(h.store.movement_count().unwrap(), 2);

    // 前後の空白を含むキーは別のキーとして扱わず、入力エラーにする
    assert_eq!(
        kind(h.service.receive(&ctx, h.receive(0, 1, " Rcv-A1")).await),
        ErrorKind::InvalidArgument
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_movement_timestamp_follows_lock_order() {
    let h = Harness::new();
    let ctx = RequestContext::new();
    h.service.receive(&ctx, h.receive(0, 10, "o-1")).await.unwrap();

    // 別のトランザクションが行ロックを保持している間に2件の操作を待たせる
    let mut holder = h.store.begin().await.unwrap();
    holder.lock_record(h.key(0)).await.unwrap();

    let service = h.service.clone();
    let command = h.dispatch(0, 3, "o-2");
    let first = tokio::spawn(async move {
        service.dispatch(&RequestContext::new(), command).await
    });
    tokio::time::sleep(Duration::from_millis(30)).await;

    let service = h.service.clone();
    let command = h.receive(0, 5, "o-3");
    let second = tokio::spawn(async move {
        service.receive(&RequestContext::new(), command).await
    });
    tokio::time::sleep(Duration::from_millis(30)).await;

    let released_at = Utc::now();
    holder.rollback().await.unwrap();

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert!(first.movement.created_at() >= released_at);
    assert!(second.movement.created_at() >= first.movement.created_at());
    assert_eq!(h.quantities(0).await, Some((12, 0)));

    let history = h
        .queries
        .get_movement_history(MovementHistoryQuery {
            product_batch_id: h.batch,
            ..MovementHistoryQuery::default()
        })
        .await
        .unwrap();
    let keys: Vec<&str> = history
        .items
        .iter()
        .map(|movement| movement.idempotency_key().as_str())
        .collect();
    assert_eq!(keys, vec!["o-3", "o-2", "o-1"]);
    let stamps: Vec<_> = history.items.iter().map(|m| m.created_at()).collect();
    assert!(stamps.windows(2).all(|pair| pair[0] >= pair[1]));
}

#[tokio::test]
async fn test_lost_race_returns_winner_result() {
    let h = Harness::new();
    let ctx = RequestContext::new();
    let first = h.service.receive(&ctx, h.receive(0, 10, "race-1")).await.unwrap();

    // 冪等性チェックでは未処理に見え、台帳の一意制約で競合する
    let stale = service_with_ledger(&h.store, Arc::new(StaleLedger::new(h.store.clone(), 1)));
    let replay = stale.receive(&ctx, h.receive(0, 10, "race-1")).await.unwrap();

    assert!(replay.idempotent);
    assert_eq!(replay.movement.id(), first.movement.id());
    assert_eq!(h.quantities(0).await, Some((10, 0)));
    assert_eq!(h.store.movement_count().unwrap(), 1);
}

#[tokio::test]
async fn test_unreadable_winner_is_conflict() {
    let h = Harness::new();
    let ctx = RequestContext::new();
    h.service.receive(&ctx, h.receive(0, 10, "race-2")).await.unwrap();

    let stale = service_with_ledger(
        &h.store,
        Arc::new(StaleLedger::new(h.store.clone(), usize::MAX)),
    );
    let err = stale.receive(&ctx, h.receive(0, 10, "race-2")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(h.quantities(0).await, Some((10, 0)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_retries_apply_once() {
    let h = Harness::new();
    let mut handles = Vec::new();
    for _ in 0..10 {
        let service = h.service.clone();
        let command = h.receive(0, 7, "concurrent-1");
        handles.push(tokio::spawn(async move {
            service.receive(&RequestContext::new(), command).await
        }));
    }

    let mut applied = 0;
    let mut movement_ids = Vec::new();
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        if outcome.applied() {
            applied += 1;
        }
        movement_ids.push(outcome.movement.id());
    }

    assert_eq!(applied, 1);
    movement_ids.dedup();
    assert_eq!(movement_ids.len(), 1);
    assert_eq!(h.quantities(0).await, Some((7, 0)));
    assert_eq!(h.store.movement_count().unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dispatch_never_oversells() {
    let h = Harness::new();
    h.service
        .receive(&RequestContext::new(), h.receive(0, 10, "stock"))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..20 {
        let service = h.service.clone();
        let command = h.dispatch(0, 1, &format!("dispatch-{}", i));
        handles.push(tokio::spawn(async move {
            service.dispatch(&RequestContext::new(), command).await
        }));
    }

    let mut succeeded = 0;
    let mut insufficient = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(err) => {
                assert_eq!(err.kind(), ErrorKind::InsufficientStock);
                insufficient += 1;
            }
        }
    }

    assert_eq!(succeeded, 10);
    assert_eq!(insufficient, 10);
    assert_eq!(h.quantities(0).await, Some((0, 0)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_transfers_do_not_deadlock() {
    let h = Harness::new();
    let ctx = RequestContext::new();
    h.service.receive(&ctx, h.receive(0, 100, "a")).await.unwrap();
    h.service.receive(&ctx, h.receive(1, 100, "b")).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..20 {
        let service = h.service.clone();
        let command = if i % 2 == 0 {
            h.transfer(0, 1, 3, &format!("ab-{}", i))
        } else {
            h.transfer(1, 0, 3, &format!("ba-{}", i))
        };
        handles.push(tokio::spawn(async move {
            service.transfer(&RequestContext::new(), command).await
        }));
    }

    let all = async {
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    };
    tokio::time::timeout(Duration::from_secs(10), all)
        .await
        .expect("opposite transfers deadlocked");

    let (a, _) = h.quantities(0).await.unwrap();
    let (b, _) = h.quantities(1).await.unwrap();
    assert_eq!(a + b, 200);
    assert_eq!(a, 100);
}

#[tokio::test]
async fn test_update_quantity_and_soft_delete() {
    let h = Harness::new();
    let ctx = RequestContext::new();
    let order = OrderId::new();
    h.service.receive(&ctx, h.receive(0, 50, "u-1")).await.unwrap();
    h.service.reserve(&ctx, h.reserve(5, order, "u-2")).await.unwrap();

    // 引当数を省略すると現在値を維持する
    let updated = h
        .service
        .update_quantity(
            &ctx,
            UpdateQuantity {
                product_batch_id: h.batch,
                location_id: h.locations[0],
                available_qty: 42,
                reserved_qty: None,
            },
        )
        .await
        .unwrap();
    assert_eq!((updated.available_qty(), updated.reserved_qty()), (42, 5));
    // 直接更新は台帳に記録しない
    assert_eq!(h.store.movement_count().unwrap(), 2);

    let err = h
        .service
        .update_quantity(
            &ctx,
            UpdateQuantity {
                product_batch_id: h.batch,
                location_id: h.locations[0],
                available_qty: -1,
                reserved_qty: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let delete = DeleteRecord {
        product_batch_id: h.batch,
        location_id: h.locations[0],
    };
    let deleted = h.service.delete(&ctx, delete.clone()).await.unwrap();
    assert!(!deleted.is_active());

    // 論理削除後は参照も変更もできない
    assert_eq!(
        kind(h.queries.get_inventory(h.batch, h.locations[0]).await),
        ErrorKind::NotFound
    );
    assert_eq!(
        kind(h.service.receive(&ctx, h.receive(0, 1, "u-3")).await),
        ErrorKind::NotFound
    );
    assert_eq!(kind(h.service.delete(&ctx, delete).await), ErrorKind::NotFound);

    let listing = h
        .queries
        .get_inventory_by_location(h.locations[0], None, None)
        .await
        .unwrap();
    assert_eq!(listing.total, 0);

    let actions: Vec<AuditAction> = h.audit.entries().iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::Movement(MovementType::Receive),
            AuditAction::Movement(MovementType::Reserve),
            AuditAction::UpdateQuantity,
            AuditAction::Delete,
        ]
    );
}

#[tokio::test]
async fn test_delete_of_absent_record_is_not_found() {
    let h = Harness::new();
    let err = h
        .service
        .delete(
            &RequestContext::new(),
            DeleteRecord {
                product_batch_id: h.batch,
                location_id: h.locations[2],
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_inventory_listings_are_paged_and_ordered() {
    let h = Harness::new();
    let ctx = RequestContext::new();
    for (i, location) in [0usize, 1, 2].iter().enumerate() {
        h.service
            .receive(&ctx, h.receive(*location, 5, &format!("l-{}", i)))
            .await
            .unwrap();
    }

    let first = h
        .queries
        .get_inventory_by_batch(h.batch, Some(1), Some(2))
        .await
        .unwrap();
    assert_eq!(first.total, 3);
    assert_eq!(first.total_pages(), 2);
    assert_eq!(first.items.len(), 2);

    let second = h
        .queries
        .get_inventory_by_batch(h.batch, Some(2), Some(2))
        .await
        .unwrap();
    assert_eq!(second.items.len(), 1);

    let mut ids: Vec<String> = first
        .items
        .iter()
        .chain(second.items.iter())
        .map(|record| record.location_id().to_string())
        .collect();
    let listed = ids.clone();
    ids.sort();
    assert_eq!(listed, ids);

    assert_eq!(
        kind(h.queries.get_inventory_by_batch(h.batch, None, Some(101)).await),
        ErrorKind::InvalidArgument
    );
    assert_eq!(
        kind(h.queries.get_inventory_by_batch(h.batch, Some(0), None).await),
        ErrorKind::InvalidArgument
    );
}

#[tokio::test]
async fn test_movement_history_is_newest_first_and_filtered() {
    let h = Harness::new();
    let ctx = RequestContext::new();
    h.service.receive(&ctx, h.receive(0, 20, "h-1")).await.unwrap();
    h.service
        .reserve(&ctx, h.reserve(2, OrderId::new(), "h-2"))
        .await
        .unwrap();
    h.service.transfer(&ctx, h.transfer(0, 1, 5, "h-3")).await.unwrap();
    h.service.receive(&ctx, h.receive(2, 1, "h-4")).await.unwrap();

    let all = h
        .queries
        .get_movement_history(MovementHistoryQuery {
            product_batch_id: h.batch,
            ..MovementHistoryQuery::default()
        })
        .await
        .unwrap();
    let keys: Vec<&str> = all
        .items
        .iter()
        .map(|movement| movement.idempotency_key().as_str())
        .collect();
    assert_eq!(keys, vec!["h-4", "h-3", "h-2", "h-1"]);

    // 移動先として関係する移動も含む
    let at_destination = h
        .queries
        .get_movement_history(MovementHistoryQuery {
            product_batch_id: h.batch,
            location_id: Some(h.locations[1]),
            ..MovementHistoryQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(at_destination.total, 1);
    assert_eq!(
        at_destination.items[0].movement_type(),
        MovementType::Transfer
    );

    let receipts = h
        .queries
        .get_movement_history(MovementHistoryQuery {
            product_batch_id: h.batch,
            movement_type: Some(MovementType::Receive),
            limit: Some(1),
            ..MovementHistoryQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(receipts.total, 2);
    assert_eq!(receipts.total_pages(), 2);
    assert_eq!(receipts.items[0].idempotency_key().as_str(), "h-4");
}

#[tokio::test]
async fn test_low_stock_alerts_fire_on_escalation_only() {
    let alerts = Arc::new(RecordingAlerts::default());
    let h = Harness::build(Some(10), None, alerts.clone());
    let ctx = RequestContext::new();

    h.service.receive(&ctx, h.receive(0, 20, "a-1")).await.unwrap();
    assert!(alerts.alerts().is_empty());

    // 20 → 8: 警告
    h.service.dispatch(&ctx, h.dispatch(0, 12, "a-2")).await.unwrap();
    // 8 → 4: 緊急（10 * 0.5 = 5 以下）
    h.service.dispatch(&ctx, h.dispatch(0, 4, "a-3")).await.unwrap();
    // 4 → 3: すでに緊急なので通知しない
    h.service.dispatch(&ctx, h.dispatch(0, 1, "a-4")).await.unwrap();

    let severities: Vec<AlertSeverity> = alerts.alerts().iter().map(|a| a.severity).collect();
    assert_eq!(severities, vec![AlertSeverity::Warning, AlertSeverity::Critical]);
    assert!(matches!(
        alerts.alerts()[0].kind,
        StockAlertKind::LowStock { min_stock_level: 10 }
    ));
    assert_eq!(alerts.alerts()[1].available_qty, 4);
}

#[tokio::test]
async fn test_expiry_alert_on_receiving_location() {
    let alerts = Arc::new(RecordingAlerts::default());
    let expires_at = Utc::now() + ChronoDuration::days(3);
    let h = Harness::build(None, Some(expires_at), alerts.clone());
    let ctx = RequestContext::new();

    h.service.receive(&ctx, h.receive(0, 20, "e-1")).await.unwrap();
    h.service.transfer(&ctx, h.transfer(0, 1, 5, "e-2")).await.unwrap();
    h.service.dispatch(&ctx, h.dispatch(1, 1, "e-3")).await.unwrap();

    let received = alerts.alerts();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].key, h.key(0));
    assert_eq!(received[1].key, h.key(1));
    for alert in &received {
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert!(matches!(
            alert.kind,
            StockAlertKind::ExpiringSoon {
                days_until_expiry: 3
            }
        ));
    }
}

#[tokio::test]
async fn test_alert_failure_does_not_fail_operation() {
    let alerts = Arc::new(RecordingAlerts::failing());
    let h = Harness::build(Some(100), None, alerts.clone());

    let outcome = h
        .service
        .receive(&RequestContext::new(), h.receive(0, 10, "f-1"))
        .await
        .unwrap();

    assert!(outcome.applied());
    assert_eq!(alerts.alerts().len(), 1);
    assert_eq!(h.quantities(0).await, Some((10, 0)));
}

#[tokio::test]
async fn test_audit_receives_before_and_after_snapshots() {
    let h = Harness::new();
    let ctx = RequestContext::new();
    h.service.receive(&ctx, h.receive(0, 10, "au-1")).await.unwrap();
    h.service.transfer(&ctx, h.transfer(0, 1, 4, "au-2")).await.unwrap();
    // 再送は監査対象外
    h.service.receive(&ctx, h.receive(0, 10, "au-1")).await.unwrap();

    let entries = h.audit.entries();
    assert_eq!(entries.len(), 3);

    assert!(entries[0].before.is_none());
    assert_eq!(entries[0].after.as_ref().unwrap().available_qty(), 10);

    let source = &entries[1];
    assert_eq!(source.key, h.key(0));
    assert_eq!(source.before.as_ref().unwrap().available_qty(), 10);
    assert_eq!(source.after.as_ref().unwrap().available_qty(), 6);

    let destination = &entries[2];
    assert_eq!(destination.key, h.key(1));
    assert!(destination.before.is_none());
    assert_eq!(destination.after.as_ref().unwrap().available_qty(), 4);
}
