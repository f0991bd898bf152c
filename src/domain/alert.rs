// 在庫アラート判定
// 通知の生成・整形は外部のアラート生成機能が担当する

use crate::domain::model::StockKey;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// アラートの重大度
/// `Warning < Critical` の順序を持つ
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// アラートの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockAlertKind {
    /// 利用可能数が最低在庫数を下回った
    LowStock {
        #[serde(rename = "minStockLevel")]
        min_stock_level: i64,
    },
    /// バッチの有効期限が近い（0以下は期限切れ）
    ExpiringSoon {
        #[serde(rename = "daysUntilExpiry")]
        days_until_expiry: i64,
    },
}

/// アラート生成機能へ渡す通知内容
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAlert {
    pub key: StockKey,
    pub kind: StockAlertKind,
    pub severity: AlertSeverity,
    pub available_qty: u32,
    pub correlation_id: Uuid,
}

/// アラート判定ポリシー
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StockAlertPolicy {
    /// 最低在庫数に対する「緊急」閾値の比率
    pub critical_ratio: f64,
    /// 期限までの日数がこの値以下なら「緊急」
    pub expiry_critical_days: i64,
    /// 期限までの日数がこの値以下なら「警告」
    pub expiry_warning_days: i64,
}

impl Default for StockAlertPolicy {
    fn default() -> Self {
        Self {
            critical_ratio: 0.5,
            expiry_critical_days: 7,
            expiry_warning_days: 30,
        }
    }
}

impl StockAlertPolicy {
    /// 低在庫の重大度を判定する
    ///
    /// * `available <= min * critical_ratio` → 緊急
    /// * `available <= min` → 警告
    /// * 最低在庫数が未設定または0以下 → 判定しない
    pub fn low_stock_severity(
        &self,
        available_qty: u32,
        min_stock_level: Option<i64>,
    ) -> Option<AlertSeverity> {
        let min_stock = min_stock_level.filter(|min| *min > 0)?;
        let critical_threshold = min_stock as f64 * self.critical_ratio;
        let available = f64::from(available_qty);

        if available <= critical_threshold {
            Some(AlertSeverity::Critical)
        } else if available <= min_stock as f64 {
            Some(AlertSeverity::Warning)
        } else {
            None
        }
    }

    /// 有効期限までの日数（切り上げ）
    pub fn days_until_expiry(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        let millis = (expires_at - now).num_milliseconds();
        (millis as f64 / 86_400_000.0).ceil() as i64
    }

    /// 期限切れ間近の重大度を判定する
    pub fn expiry_severity(&self, days_until_expiry: i64) -> Option<AlertSeverity> {
        if days_until_expiry <= self.expiry_critical_days {
            Some(AlertSeverity::Critical)
        } else if days_until_expiry <= self.expiry_warning_days {
            Some(AlertSeverity::Warning)
        } else {
            None
        }
    }

    /// 操作前後の利用可能数から、新たに閾値を跨いだ低在庫アラートを求める
    /// 重大度が上がった場合のみ通知対象とする
    pub fn low_stock_crossing(
        &self,
        key: StockKey,
        before_qty: Option<u32>,
        after_qty: u32,
        min_stock_level: Option<i64>,
        correlation_id: Uuid,
    ) -> Option<StockAlert> {
        let after = self.low_stock_severity(after_qty, min_stock_level)?;
        let before = before_qty.and_then(|qty| self.low_stock_severity(qty, min_stock_level));
        if before.is_some_and(|before| before >= after) {
            return None;
        }
        Some(StockAlert {
            key,
            kind: StockAlertKind::LowStock {
                min_stock_level: min_stock_level.unwrap_or_default(),
            },
            severity: after,
            available_qty: after_qty,
            correlation_id,
        })
    }
}
