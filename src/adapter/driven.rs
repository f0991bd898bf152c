// 駆動される側アダプター（ストア・台帳・ログなどの実装）

mod alert_notifier;
mod audit_sink;
mod in_memory_stock_store;
mod mysql_movement_ledger;
mod mysql_reference_lookup;
mod mysql_stock_store;
mod tracing_logger;

pub use alert_notifier::LoggingAlertNotifier;
pub use audit_sink::{spawn_audit_writer, ChannelAuditSink};
pub use in_memory_stock_store::{InMemoryStockStore, ReferenceSeed, SeedBatch};
pub use mysql_movement_ledger::MySqlMovementLedger;
pub use mysql_reference_lookup::MySqlReferenceLookup;
pub use mysql_stock_store::MySqlStockStore;
pub use tracing_logger::{LogEntry, TracingLogger};
