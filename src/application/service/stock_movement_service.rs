use crate::application::command::{
    AdjustStock, DeleteRecord, DispatchStock, MovementOutcome, ReceiveStock, ReleaseStock,
    ReserveStock, TransferStock, UpdateQuantity,
};
use crate::application::ApplicationError;
use crate::domain::alert::{StockAlert, StockAlertKind, StockAlertPolicy};
use crate::domain::context::RequestContext;
use crate::domain::error::DomainError;
use crate::domain::model::{
    AdjustmentDelta, IdempotencyKey, InventoryRecord, LocationId, MovementLocation, MovementType,
    ProductBatchId, Quantity, StockKey, StockMovement, UserId,
};
use crate::domain::port::{
    AlertNotifier, AuditAction, AuditEntry, AuditSink, BatchInfo, InventoryRecordStore, Logger,
    ReferenceLookup, RepositoryError,
};
use crate::domain::service::{
    CommittedChange, IdempotencyCheck, IdempotencyGuard, StockChange, StockOperationError,
    TransactionCoordinator,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

const COMPONENT: &str = "StockMovementService";

/// 台帳に記録する操作の内容
struct MovementRequest {
    keys: Vec<StockKey>,
    movement: StockMovement,
    created_by_id: Option<UserId>,
}

/// 在庫移動アプリケーションサービス
///
/// 各操作は次の順で処理する。
/// 1. 入力値の検証（参照先の確認より前）
/// 2. 冪等性チェック（処理済みなら保存済みの結果を返して終了）
/// 3. 製品バッチ・ロケーション・ユーザーの存在確認
/// 4. トランザクション内でのロック・検証・書き込み・台帳追記
/// 5. 監査ログとアラート通知（失敗しても操作は成功として扱う）
pub struct StockMovementService {
    records: Arc<dyn InventoryRecordStore>,
    guard: IdempotencyGuard,
    coordinator: TransactionCoordinator,
    references: Arc<dyn ReferenceLookup>,
    logger: Arc<dyn Logger>,
    audit: Option<Arc<dyn AuditSink>>,
    alerts: Option<Arc<dyn AlertNotifier>>,
    alert_policy: StockAlertPolicy,
}

impl StockMovementService {
    /// 新しい在庫移動サービスを作成
    ///
    /// # Arguments
    /// * `records` - 在庫レコードの読み取りポート
    /// * `guard` - 冪等性ガード
    /// * `coordinator` - トランザクションコーディネーター
    /// * `references` - 製品バッチ・ロケーション・ユーザーの存在確認
    /// * `logger` - ロガー
    pub fn new(
        records: Arc<dyn InventoryRecordStore>,
        guard: IdempotencyGuard,
        coordinator: TransactionCoordinator,
        references: Arc<dyn ReferenceLookup>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            records,
            guard,
            coordinator,
            references,
            logger,
            audit: None,
            alerts: None,
            alert_policy: StockAlertPolicy::default(),
        }
    }

    /// 監査ログの送信先を設定
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// アラート通知先と判定ポリシーを設定
    pub fn with_alerts(mut self, alerts: Arc<dyn AlertNotifier>, policy: StockAlertPolicy) -> Self {
        self.alerts = Some(alerts);
        self.alert_policy = policy;
        self
    }

    /// 入庫する
    /// 在庫レコードが存在しない場合は作成する
    pub async fn receive(
        &self,
        ctx: &RequestContext,
        command: ReceiveStock,
    ) -> Result<MovementOutcome, ApplicationError> {
        let quantity = Quantity::new("quantity", command.quantity)?;
        let idempotency_key = IdempotencyKey::new(command.idempotency_key)?;
        let key = StockKey::new(command.product_batch_id, command.location_id);
        let created_by_id = command.created_by_id.or(ctx.actor_id());

        let movement = StockMovement::new(
            key.product_batch_id(),
            MovementType::Receive,
            MovementLocation::Single(key.location_id()),
            i64::from(quantity.value()),
            idempotency_key,
        )
        .with_created_by(created_by_id)
        .with_note(command.note);

        let request = MovementRequest {
            keys: vec![key],
            movement,
            created_by_id,
        };
        self.apply_movement(ctx, request, move |records| {
            let mut record = materialize(records, &[key]).remove(0);
            record.receive(quantity)?;
            Ok(vec![record])
        })
        .await
    }

    /// 出庫する
    ///
    /// # Returns
    /// * `Err(ApplicationError::InsufficientStock)` - 利用可能数の不足（在庫レコードがない場合は利用可能数0）
    pub async fn dispatch(
        &self,
        ctx: &RequestContext,
        command: DispatchStock,
    ) -> Result<MovementOutcome, ApplicationError> {
        let quantity = Quantity::new("quantity", command.quantity)?;
        let idempotency_key = IdempotencyKey::new(command.idempotency_key)?;
        let key = StockKey::new(command.product_batch_id, command.location_id);
        let created_by_id = command.created_by_id.or(ctx.actor_id());

        let movement = StockMovement::new(
            key.product_batch_id(),
            MovementType::Dispatch,
            MovementLocation::Single(key.location_id()),
            i64::from(quantity.value()),
            idempotency_key,
        )
        .with_created_by(created_by_id)
        .with_note(command.note);

        let request = MovementRequest {
            keys: vec![key],
            movement,
            created_by_id,
        };
        self.apply_movement(ctx, request, move |records| {
            let mut record = materialize(records, &[key]).remove(0);
            record.dispatch(quantity)?;
            Ok(vec![record])
        })
        .await
    }

    /// 利用可能数を増減する
    /// 正の調整で在庫レコードが存在しない場合は作成する
    pub async fn adjust(
        &self,
        ctx: &RequestContext,
        command: AdjustStock,
    ) -> Result<MovementOutcome, ApplicationError> {
        let delta = AdjustmentDelta::new(command.adjustment_quantity)?;
        let idempotency_key = IdempotencyKey::new(command.idempotency_key)?;
        let key = StockKey::new(command.product_batch_id, command.location_id);
        let created_by_id = command.created_by_id.or(ctx.actor_id());

        let movement = StockMovement::new(
            key.product_batch_id(),
            MovementType::Adjust,
            MovementLocation::Single(key.location_id()),
            delta.value(),
            idempotency_key,
        )
        .with_created_by(created_by_id)
        .with_reason(command.reason)
        .with_note(command.note);

        let request = MovementRequest {
            keys: vec![key],
            movement,
            created_by_id,
        };
        self.apply_movement(ctx, request, move |records| {
            let mut record = materialize(records, &[key]).remove(0);
            record.adjust(delta)?;
            Ok(vec![record])
        })
        .await
    }

    /// ロケーション間で在庫を移動する
    /// 移動元と移動先は1つのトランザクションで更新し、台帳には1件のTRANSFERを記録する
    pub async fn transfer(
        &self,
        ctx: &RequestContext,
        command: TransferStock,
    ) -> Result<MovementOutcome, ApplicationError> {
        if command.from_location_id == command.to_location_id {
            return Err(DomainError::SameLocation {
                location_id: command.from_location_id,
            }
            .into());
        }
        let quantity = Quantity::new("quantity", command.quantity)?;
        let idempotency_key = IdempotencyKey::new(command.idempotency_key)?;
        let from = StockKey::new(command.product_batch_id, command.from_location_id);
        let to = StockKey::new(command.product_batch_id, command.to_location_id);
        let created_by_id = command.created_by_id.or(ctx.actor_id());

        let movement = StockMovement::new(
            command.product_batch_id,
            MovementType::Transfer,
            MovementLocation::Transfer {
                from: command.from_location_id,
                to: command.to_location_id,
            },
            i64::from(quantity.value()),
            idempotency_key,
        )
        .with_created_by(created_by_id)
        .with_note(command.note);

        let request = MovementRequest {
            keys: vec![from, to],
            movement,
            created_by_id,
        };
        self.apply_movement(ctx, request, move |records| {
            let mut records = materialize(records, &[from, to]);
            let mut destination = records.remove(1);
            let mut source = records.remove(0);
            source.dispatch(quantity)?;
            destination.receive(quantity)?;
            Ok(vec![source, destination])
        })
        .await
    }

    /// 受注に在庫を引き当てる
    pub async fn reserve(
        &self,
        ctx: &RequestContext,
        command: ReserveStock,
    ) -> Result<MovementOutcome, ApplicationError> {
        let quantity = Quantity::new("quantity", command.quantity)?;
        let idempotency_key = IdempotencyKey::new(command.idempotency_key)?;
        let key = StockKey::new(command.product_batch_id, command.location_id);
        let created_by_id = command.created_by_id.or(ctx.actor_id());

        let movement = StockMovement::new(
            key.product_batch_id(),
            MovementType::Reserve,
            MovementLocation::Single(key.location_id()),
            i64::from(quantity.value()),
            idempotency_key,
        )
        .with_created_by(created_by_id)
        .with_order(command.order_id)
        .with_note(command.note);

        let request = MovementRequest {
            keys: vec![key],
            movement,
            created_by_id,
        };
        self.apply_movement(ctx, request, move |records| {
            let mut record = materialize(records, &[key]).remove(0);
            record.reserve(quantity)?;
            Ok(vec![record])
        })
        .await
    }

    /// 引当を解除する
    ///
    /// # Returns
    /// * `Err(ApplicationError::InsufficientReserved)` - 引当数の不足
    pub async fn release(
        &self,
        ctx: &RequestContext,
        command: ReleaseStock,
    ) -> Result<MovementOutcome, ApplicationError> {
        let quantity = Quantity::new("quantity", command.quantity)?;
        let idempotency_key = IdempotencyKey::new(command.idempotency_key)?;
        let key = StockKey::new(command.product_batch_id, command.location_id);
        let created_by_id = command.created_by_id.or(ctx.actor_id());

        let movement = StockMovement::new(
            key.product_batch_id(),
            MovementType::Release,
            MovementLocation::Single(key.location_id()),
            i64::from(quantity.value()),
            idempotency_key,
        )
        .with_created_by(created_by_id)
        .with_order(command.order_id)
        .with_note(command.note);

        let request = MovementRequest {
            keys: vec![key],
            movement,
            created_by_id,
        };
        self.apply_movement(ctx, request, move |records| {
            let mut record = materialize(records, &[key]).remove(0);
            record.release(quantity)?;
            Ok(vec![record])
        })
        .await
    }

    /// 数量を直接上書きする
    /// 台帳には記録せず、監査ログにのみ残す。引当数を省略した場合は現在値を維持する
    pub async fn update_quantity(
        &self,
        ctx: &RequestContext,
        command: UpdateQuantity,
    ) -> Result<InventoryRecord, ApplicationError> {
        let available_qty = non_negative("availableQty", command.available_qty)?;
        let reserved_qty = command
            .reserved_qty
            .map(|value| non_negative("reservedQty", value))
            .transpose()?;
        let key = StockKey::new(command.product_batch_id, command.location_id);

        self.logger.info(
            COMPONENT,
            "Processing UPDATE_QUANTITY",
            Some(ctx.correlation_id()),
            Some(key_context(key)),
        );

        let batch = self.resolve_batch(key.product_batch_id()).await?;
        self.resolve_location(key.location_id()).await?;

        let started = Instant::now();
        let result = self
            .coordinator
            .execute(&[key], move |records| {
                let mut record = materialize(records, &[key]).remove(0);
                record.overwrite(available_qty, reserved_qty)?;
                Ok(StockChange::new(vec![record]))
            })
            .await;

        let committed = self.finish(ctx, "UPDATE_QUANTITY", started, result)?;
        self.after_commit(ctx, AuditAction::UpdateQuantity, &committed, Some(&batch))
            .await;
        first_record(committed)
    }

    /// 在庫レコードを論理削除する
    /// 残数量が0である必要はない
    pub async fn delete(
        &self,
        ctx: &RequestContext,
        command: DeleteRecord,
    ) -> Result<InventoryRecord, ApplicationError> {
        let key = StockKey::new(command.product_batch_id, command.location_id);

        self.logger.info(
            COMPONENT,
            "Processing DELETE",
            Some(ctx.correlation_id()),
            Some(key_context(key)),
        );

        let deleted_at = Utc::now();
        let started = Instant::now();
        let result = self
            .coordinator
            .execute(&[key], move |records| {
                let mut record = records
                    .into_iter()
                    .next()
                    .flatten()
                    .ok_or(DomainError::RecordNotFound { key })?;
                record.soft_delete(deleted_at)?;
                Ok(StockChange::new(vec![record]))
            })
            .await;

        let committed = self.finish(ctx, "DELETE", started, result)?;
        self.after_commit(ctx, AuditAction::Delete, &committed, None)
            .await;
        first_record(committed)
    }

    /// 台帳に記録する操作の共通処理
    async fn apply_movement<F>(
        &self,
        ctx: &RequestContext,
        request: MovementRequest,
        plan: F,
    ) -> Result<MovementOutcome, ApplicationError>
    where
        F: FnOnce(Vec<Option<InventoryRecord>>) -> Result<Vec<InventoryRecord>, DomainError>
            + Send,
    {
        let movement_type = request.movement.movement_type();
        let idempotency_key = request.movement.idempotency_key().clone();
        let correlation_id = ctx.correlation_id();

        let mut context = HashMap::new();
        context.insert("movement_type".to_string(), movement_type.to_string());
        context.insert(
            "idempotency_key".to_string(),
            idempotency_key.to_string(),
        );
        context.insert(
            "product_batch_id".to_string(),
            request.movement.product_batch_id().to_string(),
        );
        self.logger.info(
            COMPONENT,
            &format!("Processing {}", movement_type),
            Some(correlation_id),
            Some(context),
        );

        // 冪等性チェック: 処理済みのキーなら何も変更せずに結果を返す
        match self.guard.check(&idempotency_key, movement_type).await {
            Ok(IdempotencyCheck::Replay(existing)) => {
                return self.replay(ctx, existing).await;
            }
            Ok(IdempotencyCheck::Proceed) => {}
            Err(err) => return Err(self.report(ctx, movement_type.as_str(), err)),
        }

        let batch = self
            .resolve_references(&request.keys, request.created_by_id)
            .await?;

        let movement = request.movement;
        let started = Instant::now();
        let result = self
            .coordinator
            .execute(&request.keys, move |records| {
                let updated = plan(records)?;
                // ロック取得後の時刻で記録し、台帳の順序をコミット順に揃える
                let movement = movement.with_created_at(Utc::now());
                Ok(StockChange::new(updated).with_movement(movement))
            })
            .await;

        let committed = match result {
            Err(StockOperationError::Repository(RepositoryError::DuplicateKey { .. })) => {
                // 同じキーの並行リクエストが先にコミットした
                let mut context = HashMap::new();
                context.insert(
                    "idempotency_key".to_string(),
                    idempotency_key.to_string(),
                );
                self.logger.info(
                    COMPONENT,
                    "Idempotency key conflict, returning the winning request's result",
                    Some(correlation_id),
                    Some(context),
                );
                let existing = self
                    .guard
                    .recover(&idempotency_key, movement_type)
                    .await
                    .map_err(|err| self.report(ctx, movement_type.as_str(), err))?;
                return self.replay(ctx, existing).await;
            }
            other => self.finish(ctx, movement_type.as_str(), started, other)?,
        };

        self.after_commit(
            ctx,
            AuditAction::Movement(movement_type),
            &committed,
            Some(&batch),
        )
        .await;

        let movement = committed.movement.clone().ok_or_else(|| {
            ApplicationError::Internal(RepositoryError::OperationFailed(
                "committed change is missing its ledger entry".to_string(),
            ))
        })?;
        let records = committed.records.into_iter().map(Some).collect();
        Ok(MovementOutcome::new(movement, records, false))
    }

    /// 保存済みの台帳エントリと現在の在庫レコードから再送の結果を作成する
    async fn replay(
        &self,
        ctx: &RequestContext,
        movement: StockMovement,
    ) -> Result<MovementOutcome, ApplicationError> {
        let mut records = Vec::new();
        for key in movement.affected_keys() {
            let record = self
                .records
                .find_by_key(key)
                .await
                .map_err(|err| self.report(ctx, "REPLAY", err.into()))?;
            records.push(record);
        }

        let mut context = HashMap::new();
        context.insert(
            "idempotency_key".to_string(),
            movement.idempotency_key().to_string(),
        );
        context.insert("movement_id".to_string(), movement.id().to_string());
        self.logger.debug(
            COMPONENT,
            "Idempotency check: key already processed, returning stored result",
            Some(ctx.correlation_id()),
            Some(context),
        );

        Ok(MovementOutcome::new(movement, records, true))
    }

    /// 参照先の存在を確認し、製品バッチ情報を返す
    async fn resolve_references(
        &self,
        keys: &[StockKey],
        created_by_id: Option<UserId>,
    ) -> Result<BatchInfo, ApplicationError> {
        let batch_id = keys
            .first()
            .map(StockKey::product_batch_id)
            .ok_or_else(|| ApplicationError::invalid_argument("productBatchId", "missing"))?;
        let batch = self.resolve_batch(batch_id).await?;
        for key in keys {
            self.resolve_location(key.location_id()).await?;
        }
        if let Some(user_id) = created_by_id {
            if !self.references.user_exists(user_id).await? {
                return Err(ApplicationError::NotFound {
                    entity: "User",
                    id: user_id.to_string(),
                });
            }
        }
        Ok(batch)
    }

    async fn resolve_batch(
        &self,
        product_batch_id: ProductBatchId,
    ) -> Result<BatchInfo, ApplicationError> {
        self.references
            .find_batch(product_batch_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound {
                entity: "ProductBatch",
                id: product_batch_id.to_string(),
            })
    }

    async fn resolve_location(&self, location_id: LocationId) -> Result<(), ApplicationError> {
        if self.references.location_exists(location_id).await? {
            Ok(())
        } else {
            Err(ApplicationError::NotFound {
                entity: "Location",
                id: location_id.to_string(),
            })
        }
    }

    /// トランザクションの結果をログに出力し、エラーを変換する
    fn finish(
        &self,
        ctx: &RequestContext,
        operation: &str,
        started: Instant,
        result: Result<CommittedChange, StockOperationError>,
    ) -> Result<CommittedChange, ApplicationError> {
        match result {
            Ok(committed) => {
                let mut context = HashMap::new();
                context.insert(
                    "execution_time_ms".to_string(),
                    started.elapsed().as_millis().to_string(),
                );
                if let Some(movement) = &committed.movement {
                    context.insert("movement_id".to_string(), movement.id().to_string());
                }
                self.logger.info(
                    COMPONENT,
                    &format!("{} committed", operation),
                    Some(ctx.correlation_id()),
                    Some(context),
                );
                Ok(committed)
            }
            Err(err) => Err(self.report(ctx, operation, err)),
        }
    }

    /// 失敗をログに出力する
    /// ビジネスルール違反は警告、永続化の失敗はエラー本文を含めてエラーとして出力する
    fn report(
        &self,
        ctx: &RequestContext,
        operation: &str,
        err: StockOperationError,
    ) -> ApplicationError {
        let mut context = HashMap::new();
        context.insert("operation".to_string(), operation.to_string());
        context.insert("error".to_string(), err.to_string());
        match &err {
            StockOperationError::Rejected(_) => self.logger.warn(
                COMPONENT,
                &format!("{} rejected: {}", operation, err),
                Some(ctx.correlation_id()),
                Some(context),
            ),
            StockOperationError::Repository(_) | StockOperationError::UnresolvedConflict { .. } => {
                self.logger.error(
                    COMPONENT,
                    &format!("{} failed: {}", operation, err),
                    Some(ctx.correlation_id()),
                    Some(context),
                )
            }
        }
        err.into()
    }

    /// コミット後の監査ログとアラート通知
    async fn after_commit(
        &self,
        ctx: &RequestContext,
        action: AuditAction,
        committed: &CommittedChange,
        batch: Option<&BatchInfo>,
    ) {
        if let Some(audit) = &self.audit {
            for (before, after) in committed.before.iter().zip(committed.records.iter()) {
                audit.submit(AuditEntry {
                    action,
                    key: after.key(),
                    before: before.clone(),
                    after: Some(after.clone()),
                    actor_id: ctx.actor_id(),
                    correlation_id: ctx.correlation_id(),
                    recorded_at: Utc::now(),
                });
            }
        }

        let (Some(alerts), Some(batch)) = (&self.alerts, batch) else {
            return;
        };
        for alert in self.evaluate_alerts(ctx, action, committed, batch) {
            if let Err(err) = alerts.notify(alert).await {
                let mut context = HashMap::new();
                context.insert("error".to_string(), err.to_string());
                self.logger.warn(
                    COMPONENT,
                    "Alert notification failed",
                    Some(ctx.correlation_id()),
                    Some(context),
                );
            }
        }
    }

    /// 閾値を跨いだ低在庫と、入荷先での期限切れ間近を判定する
    fn evaluate_alerts(
        &self,
        ctx: &RequestContext,
        action: AuditAction,
        committed: &CommittedChange,
        batch: &BatchInfo,
    ) -> Vec<StockAlert> {
        let mut alerts = Vec::new();
        for (before, after) in committed.before.iter().zip(committed.records.iter()) {
            if !after.is_active() {
                continue;
            }
            if let Some(alert) = self.alert_policy.low_stock_crossing(
                after.key(),
                before.as_ref().map(InventoryRecord::available_qty),
                after.available_qty(),
                batch.min_stock_level,
                ctx.correlation_id(),
            ) {
                alerts.push(alert);
            }
        }

        // 在庫が入ってきたロケーションについて有効期限を判定する
        let receiving = match action {
            AuditAction::Movement(MovementType::Receive) => committed.records.first(),
            AuditAction::Movement(MovementType::Transfer) => committed.records.get(1),
            _ => None,
        };
        if let (Some(record), Some(expires_at)) = (receiving, batch.expires_at) {
            let days = StockAlertPolicy::days_until_expiry(expires_at, Utc::now());
            if let Some(severity) = self.alert_policy.expiry_severity(days) {
                alerts.push(StockAlert {
                    key: record.key(),
                    kind: StockAlertKind::ExpiringSoon {
                        days_until_expiry: days,
                    },
                    severity,
                    available_qty: record.available_qty(),
                    correlation_id: ctx.correlation_id(),
                });
            }
        }
        alerts
    }
}

/// ロック済みのレコードを取り出す。存在しないキーは数量0の新規レコードにする
fn materialize(records: Vec<Option<InventoryRecord>>, keys: &[StockKey]) -> Vec<InventoryRecord> {
    records
        .into_iter()
        .zip(keys.iter())
        .map(|(record, key)| record.unwrap_or_else(|| InventoryRecord::new(*key)))
        .collect()
}

fn non_negative(field: &str, value: i64) -> Result<u32, ApplicationError> {
    u32::try_from(value).map_err(|_| {
        ApplicationError::invalid_argument(
            field,
            format!("must be between 0 and {}, got {}", u32::MAX, value),
        )
    })
}

fn first_record(committed: CommittedChange) -> Result<InventoryRecord, ApplicationError> {
    committed.records.into_iter().next().ok_or_else(|| {
        ApplicationError::Internal(RepositoryError::OperationFailed(
            "committed change has no record".to_string(),
        ))
    })
}

fn key_context(key: StockKey) -> HashMap<String, String> {
    let mut context = HashMap::new();
    context.insert(
        "product_batch_id".to_string(),
        key.product_batch_id().to_string(),
    );
    context.insert("location_id".to_string(), key.location_id().to_string());
    context
}
