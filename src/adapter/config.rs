// 環境変数から読み取る設定
// .envファイルの読み込みは起動時に dotenvy で行う

use crate::application::PaginationSettings;
use crate::domain::alert::StockAlertPolicy;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// 設定エラー
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// 環境変数を読み取り、未設定の場合はデフォルト値を使う
fn env_or<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

/// データベース接続設定を管理する構造体
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// 環境変数から設定を読み取る
    /// 環境変数が設定されていない場合はデフォルト値を使用
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_or("DATABASE_HOST", "localhost".to_string())?,
            port: env_or("DATABASE_PORT", 3306)?,
            database: env_or("DATABASE_NAME", "inventory_db".to_string())?,
            username: env_or("DATABASE_USER", "inventory_user".to_string())?,
            password: env_or("DATABASE_PASSWORD", "inventory_password".to_string())?,
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10)?,
        })
    }

    /// MySQL接続文字列を生成
    pub fn connection_string(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }
}

/// 永続化の実装
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    MySql,
    Memory,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" => Ok(StoreKind::MySql),
            "memory" => Ok(StoreKind::Memory),
            other => Err(format!("expected mysql or memory, got {}", other)),
        }
    }
}

/// 在庫移動エンジンの設定
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub store: StoreKind,
    pub pagination: PaginationSettings,
    pub transaction_timeout: Duration,
    pub alert_policy: StockAlertPolicy,
    pub audit_queue_capacity: usize,
    /// インメモリストアに読み込む参照データ（製品バッチ・ロケーション・ユーザー）
    pub seed_file: Option<PathBuf>,
}

impl EngineConfig {
    /// 環境変数から設定を読み取る
    ///
    /// # Returns
    /// * `Err(ConfigError::InvalidValue)` - 数値として解釈できない、または範囲外の値
    pub fn from_env() -> Result<Self, ConfigError> {
        let default_limit: u32 = env_or("INVENTORY_DEFAULT_PAGE_LIMIT", 20)?;
        let max_limit: u32 = env_or("INVENTORY_MAX_PAGE_LIMIT", 100)?;
        if default_limit == 0 || default_limit > max_limit {
            return Err(ConfigError::InvalidValue(format!(
                "INVENTORY_DEFAULT_PAGE_LIMIT must be between 1 and {}, got {}",
                max_limit, default_limit
            )));
        }

        let timeout_ms: u64 = env_or("INVENTORY_TX_TIMEOUT_MS", 5000)?;
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "INVENTORY_TX_TIMEOUT_MS must be positive".to_string(),
            ));
        }

        let critical_ratio: f64 = env_or("ALERT_CRITICAL_RATIO", 0.5)?;
        if !critical_ratio.is_finite() || critical_ratio <= 0.0 || critical_ratio > 1.0 {
            return Err(ConfigError::InvalidValue(format!(
                "ALERT_CRITICAL_RATIO must be in (0, 1], got {}",
                critical_ratio
            )));
        }

        let expiry_critical_days: i64 = env_or("ALERT_EXPIRY_CRITICAL_DAYS", 7)?;
        let expiry_warning_days: i64 = env_or("ALERT_EXPIRY_WARNING_DAYS", 30)?;
        if expiry_critical_days > expiry_warning_days {
            return Err(ConfigError::InvalidValue(format!(
                "ALERT_EXPIRY_CRITICAL_DAYS ({}) must not exceed ALERT_EXPIRY_WARNING_DAYS ({})",
                expiry_critical_days, expiry_warning_days
            )));
        }

        let audit_queue_capacity: usize = env_or("AUDIT_QUEUE_CAPACITY", 1024)?;
        if audit_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "AUDIT_QUEUE_CAPACITY must be positive".to_string(),
            ));
        }

        Ok(Self {
            store: env_or("INVENTORY_STORE", StoreKind::MySql)?,
            pagination: PaginationSettings {
                default_limit,
                max_limit,
            },
            transaction_timeout: Duration::from_millis(timeout_ms),
            alert_policy: StockAlertPolicy {
                critical_ratio,
                expiry_critical_days,
                expiry_warning_days,
            },
            audit_queue_capacity,
            seed_file: env::var("INVENTORY_SEED_FILE")
                .ok()
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}
