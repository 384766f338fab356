use crate::features::subscriptions::schedule;
use crate::shared::errors::{AppError, AppResult};
use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 支払いサイクル
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    /// 月払い
    Monthly,
    /// 年払い
    Yearly,
}

impl BillingCycle {
    /// データベースに保存する文字列表現を取得する
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Yearly => "yearly",
        }
    }
}

impl fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingCycle {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(BillingCycle::Monthly),
            "yearly" => Ok(BillingCycle::Yearly),
            _ => Err(AppError::validation(format!(
                "支払いサイクルは'monthly'または'yearly'である必要があります: {s}"
            ))),
        }
    }
}

impl ToSql for BillingCycle {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for BillingCycle {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|_| FromSqlError::InvalidType)
    }
}

/// サブスクリプションデータモデル
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub name: String,                   // サービス名
    pub monthly_cost: Option<f64>,      // 月額料金（月払いの場合に必須）
    pub yearly_cost: Option<f64>,       // 年額料金（年払いの場合に必須）
    pub billing_cycle: BillingCycle,    // "monthly" または "yearly"
    pub start_date: NaiveDate,          // 契約開始日（過去・未来とも許容）
    pub renewal_date: NaiveDate,        // 次回更新日（導出キャッシュ、保存時に再計算）
    pub duration_months: Option<u32>,   // 契約期間（月数、月払いの場合）
    pub duration_years: Option<u32>,    // 契約期間（年数、年払いの場合）
    pub is_active: bool,                // 有効/解約済み
    pub auto_renewal: bool,             // 自動更新
    pub category_id: Option<i64>,       // カテゴリーID（categoriesテーブルへの参照）
    pub created_at: String,             // RFC3339形式（JST）
    pub updated_at: String,             // RFC3339形式（JST）
}

impl Subscription {
    /// 支払いサイクルに応じた1期間あたりの料金を取得する
    pub fn current_cost(&self) -> f64 {
        match self.billing_cycle {
            BillingCycle::Monthly => self.monthly_cost.unwrap_or(0.0),
            BillingCycle::Yearly => self.yearly_cost.unwrap_or(0.0),
        }
    }

    /// 契約期間全体の支払い回数を取得する
    ///
    /// 月払いなら契約月数、年払いなら契約年数がそのまま支払い回数になる。
    pub fn period_count(&self) -> Option<u32> {
        match self.billing_cycle {
            BillingCycle::Monthly => self.duration_months,
            BillingCycle::Yearly => self.duration_years,
        }
    }

    /// 契約終了日を計算する
    ///
    /// # 戻り値
    /// 最終請求期間の終了日（終了日当日は契約期間に含まない）
    pub fn ending_date(&self) -> Option<NaiveDate> {
        self.period_count()
            .map(|count| schedule::advance(self.start_date, self.billing_cycle, count))
    }

    /// 契約期間全体の合計金額を計算する
    pub fn total_cost(&self) -> f64 {
        self.period_count().unwrap_or(0) as f64 * self.current_cost()
    }
}

/// サブスクリプション作成用DTO
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSubscriptionDto {
    pub name: String,
    pub monthly_cost: Option<f64>,
    pub yearly_cost: Option<f64>,
    pub billing_cycle: BillingCycle,
    pub start_date: NaiveDate,
    pub duration_months: Option<u32>,
    pub duration_years: Option<u32>,
    pub auto_renewal: Option<bool>, // 未指定の場合はtrue
    pub category_id: Option<i64>,
}

/// サブスクリプション更新用DTO
#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateSubscriptionDto {
    pub name: Option<String>,
    pub monthly_cost: Option<f64>,
    pub yearly_cost: Option<f64>,
    pub billing_cycle: Option<BillingCycle>,
    pub start_date: Option<NaiveDate>,
    pub duration_months: Option<u32>,
    pub duration_years: Option<u32>,
    pub auto_renewal: Option<bool>,
    pub category_id: Option<i64>,
}

/// スケジュール定義フィールドの組み合わせを検証する
///
/// # 引数
/// * `billing_cycle` - 支払いサイクル
/// * `duration_months` - 契約月数
/// * `duration_years` - 契約年数
/// * `monthly_cost` - 月額料金
/// * `yearly_cost` - 年額料金
///
/// # 戻り値
/// 成功時はOk(())、不整合がある場合はバリデーションエラー
///
/// # 検証ルール
/// - 契約期間は月数・年数のどちらか一方のみ設定し、支払いサイクルと単位を一致させる
/// - 支払いサイクルに対応する料金フィールドは正の数値で必須
pub fn validate_schedule_fields(
    billing_cycle: BillingCycle,
    duration_months: Option<u32>,
    duration_years: Option<u32>,
    monthly_cost: Option<f64>,
    yearly_cost: Option<f64>,
) -> AppResult<()> {
    if duration_months.is_some() && duration_years.is_some() {
        return Err(AppError::validation(
            "契約期間は月数・年数のどちらか一方のみ指定できます",
        ));
    }

    match billing_cycle {
        BillingCycle::Monthly => {
            match duration_months {
                Some(months) if months > 0 => {}
                Some(_) => {
                    return Err(AppError::validation("契約月数は正の整数である必要があります"));
                }
                None => {
                    return Err(AppError::validation("月払いの場合は契約月数が必要です"));
                }
            }
            match monthly_cost {
                Some(cost) if cost > 0.0 => {}
                _ => {
                    return Err(AppError::validation(
                        "月払いの場合は正の月額料金が必要です",
                    ));
                }
            }
        }
        BillingCycle::Yearly => {
            match duration_years {
                Some(years) if years > 0 => {}
                Some(_) => {
                    return Err(AppError::validation("契約年数は正の整数である必要があります"));
                }
                None => {
                    return Err(AppError::validation("年払いの場合は契約年数が必要です"));
                }
            }
            match yearly_cost {
                Some(cost) if cost > 0.0 => {}
                _ => {
                    return Err(AppError::validation(
                        "年払いの場合は正の年額料金が必要です",
                    ));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monthly_subscription() -> Subscription {
        Subscription {
            id: 1,
            user_id: 1,
            name: "動画配信サービス".to_string(),
            monthly_cost: Some(1000.0),
            yearly_cost: None,
            billing_cycle: BillingCycle::Monthly,
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            renewal_date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            duration_months: Some(6),
            duration_years: None,
            is_active: true,
            auto_renewal: true,
            category_id: None,
            created_at: "2025-01-01T00:00:00+09:00".to_string(),
            updated_at: "2025-01-01T00:00:00+09:00".to_string(),
        }
    }

    #[test]
    fn test_billing_cycle_round_trip() {
        assert_eq!(BillingCycle::Monthly.as_str(), "monthly");
        assert_eq!(BillingCycle::Yearly.as_str(), "yearly");
        assert_eq!(
            "monthly".parse::<BillingCycle>().unwrap(),
            BillingCycle::Monthly
        );
        assert_eq!(
            "yearly".parse::<BillingCycle>().unwrap(),
            BillingCycle::Yearly
        );
        assert!("weekly".parse::<BillingCycle>().is_err());
    }

    #[test]
    fn test_current_cost_follows_cycle() {
        let mut sub = monthly_subscription();
        assert_eq!(sub.current_cost(), 1000.0);

        sub.billing_cycle = BillingCycle::Yearly;
        sub.yearly_cost = Some(10000.0);
        assert_eq!(sub.current_cost(), 10000.0);
    }

    #[test]
    fn test_period_count_and_total_cost() {
        let sub = monthly_subscription();
        assert_eq!(sub.period_count(), Some(6));
        assert_eq!(sub.total_cost(), 6000.0);
    }

    #[test]
    fn test_ending_date() {
        let sub = monthly_subscription();
        assert_eq!(
            sub.ending_date(),
            Some(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap())
        );
    }

    #[test]
    fn test_validate_schedule_fields_ok() {
        assert!(validate_schedule_fields(
            BillingCycle::Monthly,
            Some(6),
            None,
            Some(1000.0),
            None
        )
        .is_ok());

        assert!(validate_schedule_fields(
            BillingCycle::Yearly,
            None,
            Some(2),
            None,
            Some(10000.0)
        )
        .is_ok());
    }

    #[test]
    fn test_validate_schedule_fields_both_durations() {
        let result = validate_schedule_fields(
            BillingCycle::Monthly,
            Some(6),
            Some(1),
            Some(1000.0),
            None,
        );
        assert!(matches!(result.unwrap_err(), AppError::Validation(_)));
    }

    #[test]
    fn test_validate_schedule_fields_unit_mismatch() {
        // 月払いなのに年数だけ指定されている
        let result =
            validate_schedule_fields(BillingCycle::Monthly, None, Some(1), Some(1000.0), None);
        assert!(matches!(result.unwrap_err(), AppError::Validation(_)));

        // 年払いなのに月数だけ指定されている
        let result =
            validate_schedule_fields(BillingCycle::Yearly, Some(12), None, None, Some(10000.0));
        assert!(matches!(result.unwrap_err(), AppError::Validation(_)));
    }

    #[test]
    fn test_validate_schedule_fields_missing_cost() {
        let result = validate_schedule_fields(BillingCycle::Monthly, Some(6), None, None, None);
        assert!(matches!(result.unwrap_err(), AppError::Validation(_)));

        let result =
            validate_schedule_fields(BillingCycle::Monthly, Some(6), None, Some(0.0), None);
        assert!(matches!(result.unwrap_err(), AppError::Validation(_)));
    }

    #[test]
    fn test_validate_schedule_fields_zero_duration() {
        let result =
            validate_schedule_fields(BillingCycle::Monthly, Some(0), None, Some(1000.0), None);
        assert!(matches!(result.unwrap_err(), AppError::Validation(_)));
    }
}
