use crate::domain::error::DomainError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;

/// UUIDをラップした識別子型を定義する
macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// 新しい一意の識別子を生成
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// UUIDから識別子を作成
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// 文字列から識別子を作成
            pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
                let uuid = Uuid::parse_str(s)?;
                Ok(Self(uuid))
            }

            /// 内部のUUIDを取得
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

uuid_identifier!(
    /// 製品バッチ（ロット）の一意識別子
    ProductBatchId
);
uuid_identifier!(
    /// 保管ロケーションの一意識別子
    LocationId
);
uuid_identifier!(
    /// ユーザーの一意識別子
    UserId
);
uuid_identifier!(
    /// 受注の一意識別子（引当・引当解除で参照）
    OrderId
);
uuid_identifier!(
    /// 在庫移動（台帳エントリ）の一意識別子
    MovementId
);

/// 在庫レコードのキー
/// (製品バッチID, ロケーションID) の組で一意
///
/// 導出された `Ord` は製品バッチID→ロケーションIDの辞書式順序で、
/// 複数行をロックする際の全順序として使う
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockKey {
    product_batch_id: ProductBatchId,
    location_id: LocationId,
}

impl StockKey {
    pub fn new(product_batch_id: ProductBatchId, location_id: LocationId) -> Self {
        Self {
            product_batch_id,
            location_id,
        }
    }

    pub fn product_batch_id(&self) -> ProductBatchId {
        self.product_batch_id
    }

    pub fn location_id(&self) -> LocationId {
        self.location_id
    }
}

impl fmt::Display for StockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.product_batch_id, self.location_id)
    }
}

/// 移動数量を表す値オブジェクト
/// 1以上である必要がある
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    /// リクエスト値から数量を作成
    ///
    /// # Arguments
    /// * `field` - エラー報告用のフィールド名
    /// * `value` - リクエストで受け取った数量
    ///
    /// # Returns
    /// * `Ok(Quantity)` - 1以上かつu32の範囲内
    /// * `Err(DomainError::InvalidQuantity)` - 0以下または範囲外
    pub fn new(field: &str, value: i64) -> Result<Self, DomainError> {
        if value <= 0 {
            return Err(DomainError::InvalidQuantity {
                field: field.to_string(),
                reason: format!("must be greater than zero, got {}", value),
            });
        }
        let value = u32::try_from(value).map_err(|_| DomainError::InvalidQuantity {
            field: field.to_string(),
            reason: format!("must not exceed {}, got {}", u32::MAX, value),
        })?;
        Ok(Self(value))
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 調整数量（符号付き、0は不可）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdjustmentDelta(i64);

impl AdjustmentDelta {
    /// 調整数量を作成
    /// 0の場合と、絶対値がu32に収まらない場合はエラー
    pub fn new(value: i64) -> Result<Self, DomainError> {
        if value == 0 {
            return Err(DomainError::InvalidQuantity {
                field: "adjustmentQuantity".to_string(),
                reason: "must not be zero".to_string(),
            });
        }
        if value.unsigned_abs() > u64::from(u32::MAX) {
            return Err(DomainError::InvalidQuantity {
                field: "adjustmentQuantity".to_string(),
                reason: format!("magnitude must not exceed {}, got {}", u32::MAX, value),
            });
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    /// 増加方向の調整かどうか
    pub fn is_increase(&self) -> bool {
        self.0 > 0
    }

    /// 調整量の絶対値
    pub fn magnitude(&self) -> u32 {
        // 構築時に範囲を検証済み
        self.0.unsigned_abs() as u32
    }
}

/// 冪等性キー
/// クライアントが再送時に同じ値を送ることで重複適用を防ぐ。
/// 値はバイト単位で比較し、正規化しない
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// 永続化カラムの最大長
    pub const MAX_LENGTH: usize = 255;

    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::InvalidValue {
                field: "idempotencyKey".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if value.trim() != value {
            return Err(DomainError::InvalidValue {
                field: "idempotencyKey".to_string(),
                reason: "must not have leading or trailing whitespace".to_string(),
            });
        }
        if value.chars().count() > Self::MAX_LENGTH {
            return Err(DomainError::InvalidValue {
                field: "idempotencyKey".to_string(),
                reason: format!("must be at most {} characters", Self::MAX_LENGTH),
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 調整理由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    Damage,
    Expiry,
    Theft,
    CountError,
    Other,
}

impl AdjustmentReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentReason::Damage => "damage",
            AdjustmentReason::Expiry => "expiry",
            AdjustmentReason::Theft => "theft",
            AdjustmentReason::CountError => "count_error",
            AdjustmentReason::Other => "other",
        }
    }

    /// 文字列から調整理由を作成
    pub fn from_string(s: &str) -> Result<Self, DomainError> {
        match s {
            "damage" => Ok(AdjustmentReason::Damage),
            "expiry" => Ok(AdjustmentReason::Expiry),
            "theft" => Ok(AdjustmentReason::Theft),
            "count_error" => Ok(AdjustmentReason::CountError),
            "other" => Ok(AdjustmentReason::Other),
            _ => Err(DomainError::InvalidValue {
                field: "reason".to_string(),
                reason: format!("unknown adjustment reason: {}", s),
            }),
        }
    }
}

impl fmt::Display for AdjustmentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ページ指定
/// ページ番号は1始まり
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    /// ページ指定を作成
    ///
    /// # Arguments
    /// * `page` - ページ番号（省略時は1）
    /// * `limit` - 1ページあたりの件数（省略時は `default_limit`）
    /// * `default_limit` - 既定の件数
    /// * `max_limit` - 許容する最大件数（超過はエラー）
    pub fn new(
        page: Option<i64>,
        limit: Option<i64>,
        default_limit: u32,
        max_limit: u32,
    ) -> Result<Self, DomainError> {
        let page = page.unwrap_or(1);
        if page < 1 || page > i64::from(u32::MAX) {
            return Err(DomainError::InvalidValue {
                field: "page".to_string(),
                reason: format!("must be a positive integer, got {}", page),
            });
        }
        let limit = limit.unwrap_or(i64::from(default_limit));
        if limit < 1 || limit > i64::from(max_limit) {
            return Err(DomainError::InvalidValue {
                field: "limit".to_string(),
                reason: format!("must be between 1 and {}, got {}", max_limit, limit),
            });
        }
        Ok(Self {
            page: page as u32,
            limit: limit as u32,
        })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// 読み飛ばす件数
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

/// ページ単位の検索結果
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            page: request.page(),
            limit: request.limit(),
        }
    }

    /// 総ページ数（切り上げ）
    pub fn total_pages(&self) -> u64 {
        if self.limit == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.limit))
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
        }
    }
}
