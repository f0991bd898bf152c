// 出力ポート
// ドメイン層が外部に依存する機能をトレイトとして定義
// アダプター層でこれらのトレイトを実装する

use crate::domain::alert::StockAlert;
use crate::domain::model::{
    IdempotencyKey, InventoryRecord, LocationId, MovementFilter, MovementType, Page, PageRequest,
    ProductBatchId, StockKey, StockMovement, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// ログレベル
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// ロガートレイト
/// ログ出力を抽象化するポート
pub trait Logger: Send + Sync {
    /// デバッグレベルのログを出力
    fn debug(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    );

    /// 情報レベルのログを出力
    fn info(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    );

    /// 警告レベルのログを出力
    fn warn(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    );

    /// エラーレベルのログを出力
    fn error(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    );
}

/// リポジトリエラー型
/// リポジトリ操作で発生するエラーを表現する
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum RepositoryError {
    /// データベース接続に失敗
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    /// 操作に失敗
    #[error("Operation failed: {0}")]
    OperationFailed(String),
    /// データの取得に失敗
    #[error("Fetch failed: {0}")]
    FetchFailed(String),
    /// 冪等性キーの一意制約違反（別のリクエストが先に同じキーで書き込んだ）
    #[error("Duplicate idempotency key: {key}")]
    DuplicateKey { key: String },
    /// トランザクションが制限時間内に完了しなかった
    #[error("Transaction timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

/// 在庫レコードの読み取りポート
/// ロックを取らない参照用。変更は `StockTransaction` 経由でのみ行う
#[async_trait]
pub trait InventoryRecordStore: Send + Sync {
    /// キーで在庫レコードを取得する（論理削除済みも含む）
    ///
    /// # Returns
    /// * `Ok(Some(InventoryRecord))` - レコードが見つかった
    /// * `Ok(None)` - レコードが存在しない
    /// * `Err(RepositoryError)` - 取得失敗
    async fn find_by_key(&self, key: StockKey) -> Result<Option<InventoryRecord>, RepositoryError>;

    /// ロケーション内の有効な在庫レコードを取得する
    /// 製品バッチIDの昇順で並べて返す
    async fn find_by_location(
        &self,
        location_id: LocationId,
        page: PageRequest,
    ) -> Result<Page<InventoryRecord>, RepositoryError>;

    /// 製品バッチの有効な在庫レコードを取得する
    /// ロケーションIDの昇順で並べて返す
    async fn find_by_batch(
        &self,
        product_batch_id: ProductBatchId,
        page: PageRequest,
    ) -> Result<Page<InventoryRecord>, RepositoryError>;
}

/// 在庫移動台帳の読み取りポート
/// 追記はトランザクション内で `StockTransaction::append_movement` により行う
#[async_trait]
pub trait MovementLedger: Send + Sync {
    /// 冪等性キーで台帳エントリを検索する
    async fn find_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<StockMovement>, RepositoryError>;

    /// 製品バッチの移動履歴を取得する
    /// 作成日時の降順で並べて返す
    async fn find_by_batch(
        &self,
        product_batch_id: ProductBatchId,
        filter: MovementFilter,
        page: PageRequest,
    ) -> Result<Page<StockMovement>, RepositoryError>;
}

/// トランザクションを開始するポート
#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// 新しいトランザクションを開始する
    async fn begin(&self) -> Result<Box<dyn StockTransaction>, RepositoryError>;
}

/// 在庫レコードと台帳をまとめて更新するトランザクション
///
/// `commit` されずに破棄された場合、すべての変更は取り消され、取得したロックは解放される
#[async_trait]
pub trait StockTransaction: Send {
    /// 在庫レコードを排他ロックして取得する
    /// レコードが存在しない場合もキーをロックし、`None` を返す
    async fn lock_record(&mut self, key: StockKey)
        -> Result<Option<InventoryRecord>, RepositoryError>;

    /// 在庫レコードを作成または更新する（ロック済みのキーに限る）
    async fn upsert_record(&mut self, record: &InventoryRecord) -> Result<(), RepositoryError>;

    /// 台帳エントリを追記する
    ///
    /// # Returns
    /// * `Err(RepositoryError::DuplicateKey)` - 同じ冪等性キーのエントリが既に存在する
    async fn append_movement(&mut self, movement: &StockMovement) -> Result<(), RepositoryError>;

    /// 変更を確定する
    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;

    /// 変更を取り消す
    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError>;
}

/// 製品バッチの参照情報（アラート判定に使う属性のみ）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchInfo {
    pub id: ProductBatchId,
    pub min_stock_level: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// 製品バッチ・ロケーション・ユーザーの存在確認ポート
#[async_trait]
pub trait ReferenceLookup: Send + Sync {
    async fn find_batch(
        &self,
        product_batch_id: ProductBatchId,
    ) -> Result<Option<BatchInfo>, RepositoryError>;

    async fn location_exists(&self, location_id: LocationId) -> Result<bool, RepositoryError>;

    async fn user_exists(&self, user_id: UserId) -> Result<bool, RepositoryError>;
}

/// 監査対象の操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Movement(MovementType),
    UpdateQuantity,
    Delete,
}

/// 監査ログに渡す変更前後のスナップショット
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub action: AuditAction,
    pub key: StockKey,
    pub before: Option<InventoryRecord>,
    pub after: Option<InventoryRecord>,
    pub actor_id: Option<UserId>,
    pub correlation_id: Uuid,
    pub recorded_at: DateTime<Utc>,
}

/// 監査ログポート
/// 投げっぱなしで使う。呼び出し元を待たせたり失敗させたりしてはならない
pub trait AuditSink: Send + Sync {
    fn submit(&self, entry: AuditEntry);
}

/// アラート通知エラー
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("Alert delivery failed: {0}")]
    DeliveryFailed(String),
}

/// アラート生成機能への通知ポート
#[async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn notify(&self, alert: StockAlert) -> Result<(), AlertError>;
}
