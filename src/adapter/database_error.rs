use crate::domain::port::RepositoryError;

/// データベースエラー型
/// データベース操作で発生するエラーを表現する
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DatabaseError {
    /// データベース接続エラー
    #[error("Database connection error: {0}")]
    ConnectionError(String),
    /// SQLクエリエラー
    #[error("Database query error: {0}")]
    QueryError(String),
    /// 一意制約違反
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),
    /// マイグレーションエラー
    #[error("Migration error: {0}")]
    MigrationError(String),
}

impl DatabaseError {
    /// sqlxのエラーを分類する
    ///
    /// # Arguments
    /// * `context` - 失敗した操作の説明
    /// * `err` - sqlxのエラー
    pub fn from_sqlx(context: &str, err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DatabaseError::UniqueViolation(format!("{}: {}", context, err))
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseError::ConnectionError(format!("{}: {}", context, err))
            }
            _ => DatabaseError::QueryError(format!("{}: {}", context, err)),
        }
    }
}

/// DatabaseErrorからRepositoryErrorへの変換
impl From<DatabaseError> for RepositoryError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::ConnectionError(msg) => RepositoryError::ConnectionFailed(msg),
            DatabaseError::QueryError(msg) => RepositoryError::OperationFailed(msg),
            DatabaseError::UniqueViolation(msg) => RepositoryError::OperationFailed(msg),
            DatabaseError::MigrationError(msg) => RepositoryError::OperationFailed(msg),
        }
    }
}
