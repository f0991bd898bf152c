use stock_movement_engine::adapter::driven::{
    spawn_audit_writer, ChannelAuditSink, InMemoryStockStore, LoggingAlertNotifier,
    MySqlMovementLedger, MySqlReferenceLookup, MySqlStockStore, ReferenceSeed, TracingLogger,
};
use stock_movement_engine::adapter::driver::ActionDispatcher;
use stock_movement_engine::adapter::{DatabaseConfig, DatabaseMigration, EngineConfig, StoreKind};
use stock_movement_engine::application::service::{InventoryQueryService, StockMovementService};
use stock_movement_engine::domain::port::{
    InventoryRecordStore, MovementLedger, ReferenceLookup, TransactionManager,
};
use stock_movement_engine::domain::service::{IdempotencyGuard, TransactionCoordinator};

use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

/// 選択した永続化実装のポート一式
struct StorePorts {
    records: Arc<dyn InventoryRecordStore>,
    ledger: Arc<dyn MovementLedger>,
    transactions: Arc<dyn TransactionManager>,
    references: Arc<dyn ReferenceLookup>,
}

/// ログ出力を初期化する
/// 標準出力はレスポンス専用のため、ログは標準エラー出力へ書く
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn mysql_ports() -> Result<StorePorts, Box<dyn std::error::Error>> {
    let config = DatabaseConfig::from_env()?;
    tracing::info!(host = %config.host, port = config.port, "Database configuration loaded");

    // 接続プールを作成
    let pool = MySqlPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.connection_string())
        .await?;

    // マイグレーションを実行
    DatabaseMigration::new(pool.clone()).run().await?;

    let store = Arc::new(MySqlStockStore::new(pool.clone()));
    Ok(StorePorts {
        records: store.clone(),
        ledger: Arc::new(MySqlMovementLedger::new(pool.clone())),
        transactions: store,
        references: Arc::new(MySqlReferenceLookup::new(pool)),
    })
}

async fn memory_ports(config: &EngineConfig) -> Result<StorePorts, Box<dyn std::error::Error>> {
    let store = Arc::new(InMemoryStockStore::new());
    if let Some(path) = &config.seed_file {
        let raw = tokio::fs::read_to_string(path).await?;
        let seed: ReferenceSeed = serde_json::from_str(&raw)?;
        tracing::info!(
            batches = seed.batches.len(),
            locations = seed.locations.len(),
            users = seed.users.len(),
            "Reference data loaded"
        );
        store.load_seed(seed)?;
    }
    Ok(StorePorts {
        records: store.clone(),
        ledger: store.clone(),
        transactions: store.clone(),
        references: store,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .envファイルから環境変数を読み込む
    dotenvy::dotenv().ok();
    init_tracing();

    let config = EngineConfig::from_env()?;
    tracing::info!(store = ?config.store, "Starting stock movement engine");

    let ports = match config.store {
        StoreKind::MySql => mysql_ports().await?,
        StoreKind::Memory => memory_ports(&config).await?,
    };

    // 監査ログの書き込みタスクを起動
    let (audit_sink, audit_receiver) = ChannelAuditSink::new(config.audit_queue_capacity);
    let audit_writer = spawn_audit_writer(audit_receiver);

    let logger = Arc::new(TracingLogger::new());
    let coordinator = TransactionCoordinator::new(ports.transactions, config.transaction_timeout)
        .with_logger(logger.clone());
    let movement_service = StockMovementService::new(
        ports.records.clone(),
        IdempotencyGuard::new(ports.ledger.clone()),
        coordinator,
        ports.references,
        logger,
    )
    .with_audit(Arc::new(audit_sink))
    .with_alerts(Arc::new(LoggingAlertNotifier::new()), config.alert_policy);
    let query_service = InventoryQueryService::new(ports.records, ports.ledger, config.pagination);
    let dispatcher = ActionDispatcher::new(Arc::new(movement_service), Arc::new(query_service));

    // 1行1アクションで読み取り、1行1レスポンスで返す
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = dispatcher.handle_line(&line).await;
        let mut json = serde_json::to_string(&response)?;
        json.push('\n');
        stdout.write_all(json.as_bytes()).await?;
        stdout.flush().await?;
    }

    // 送信側をすべて破棄して、書き込みタスクに残りのエントリを出力させる
    drop(dispatcher);
    audit_writer.await?;
    tracing::info!("Input closed, shutting down");
    Ok(())
}
