use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 支払いデータモデル
///
/// 導出された請求期間のうち、実体化された期間に対してのみ行が存在する
/// （全期間分を事前作成することはない）。(subscription_id, period_index)
/// が一意キー。
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Payment {
    pub id: i64,
    pub subscription_id: i64,
    pub period_index: u32,              // 導出スケジュール内の0始まりの位置
    pub is_paid: bool,                  // 支払い済みかどうか
    pub payment_date: Option<NaiveDate>, // 支払い日（未払いの場合はNULL）
    pub amount: f64,                    // 行作成時点の料金スナップショット
    pub created_at: String,             // RFC3339形式（JST）
}
