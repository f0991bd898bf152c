use crate::domain::model::UserId;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// リクエストコンテキスト
/// 呼び出し元の識別情報を各操作へ明示的に渡す（グローバル状態は使わない）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    correlation_id: Uuid,
    actor_id: Option<UserId>,
    received_at: DateTime<Utc>,
}

impl RequestContext {
    /// 新しい相関IDでコンテキストを作成
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            actor_id: None,
            received_at: Utc::now(),
        }
    }

    /// 呼び出し元から受け取った相関IDを設定
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// 操作を行うユーザーを設定
    pub fn with_actor(mut self, actor_id: Option<UserId>) -> Self {
        self.actor_id = actor_id;
        self
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn actor_id(&self) -> Option<UserId> {
        self.actor_id
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
