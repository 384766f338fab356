use crate::features::payments::repository as payments;
use crate::features::subscriptions::models::{BillingCycle, Subscription};
use crate::features::subscriptions::repository as subscriptions;
use crate::features::subscriptions::schedule::{self, PeriodBounds};
use crate::shared::errors::AppResult;
use chrono::{NaiveDate, Utc};
use chrono_tz::Asia::Tokyo;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 請求期間の表示分類
///
/// 表示優先順位は Paid > Current > OverdueUnpaid > FutureUnpaid。
/// 未来の未払い期間を延滞として表示してはならない。
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PeriodClassification {
    /// 支払い済み
    Paid,
    /// 現在の請求期間
    Current,
    /// 期限超過・未払い
    OverdueUnpaid,
    /// 未来・未払い
    FutureUnpaid,
}

/// サブスクリプション全体の支払い状況
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverallPaymentStatus {
    /// 全期間支払い済み
    Completed,
    /// 経過済み期間に未払いがある
    Overdue,
    /// 経過済み期間はすべて支払い済み
    OnTrack,
    /// 開始前で支払いなし
    NotStarted,
}

/// 表示用の請求期間
///
/// 導出された期間境界と実在する支払い行を突き合わせた結果。
/// 永続化されることはない。
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BillingPeriod {
    pub index: usize,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub is_current: bool,
    pub is_paid: bool,
    pub amount: f64,
    pub classification: PeriodClassification,
}

/// 支払い状況サマリー
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StatusSummary {
    pub total_cost: f64,
    pub paid_count: u32,
    pub remaining: u32,
    pub overall_status: OverallPaymentStatus,
}

/// 請求期間を分類する
///
/// # 引数
/// * `is_paid` - 支払い行が存在し支払い済みか
/// * `is_current` - 今日が属する期間か
/// * `period_end` - 期間終了日（この日自体は期間に含まない）
/// * `today` - 判定基準日
///
/// # 戻り値
/// 表示分類（Paid > Current > OverdueUnpaid > FutureUnpaid の優先順位）
pub fn classify_period(
    is_paid: bool,
    is_current: bool,
    period_end: NaiveDate,
    today: NaiveDate,
) -> PeriodClassification {
    if is_paid {
        PeriodClassification::Paid
    } else if is_current {
        PeriodClassification::Current
    } else if period_end <= today {
        PeriodClassification::OverdueUnpaid
    } else {
        PeriodClassification::FutureUnpaid
    }
}

/// 経過済み期間数を求める
///
/// 終了日が今日以前の期間の数。期間は前から順に経過するため、
/// 経過済み期間のインデックスは常に 0..elapsed の接頭辞になる。
fn elapsed_period_count(periods: &[PeriodBounds], today: NaiveDate) -> u32 {
    match schedule::current_period_index(periods, today) {
        Some(current) => current as u32,
        None => match schedule::schedule_end(periods) {
            Some(end) if today >= end => periods.len() as u32,
            _ => 0,
        },
    }
}

/// 現在・経過済み期間の支払い行を実体化する
///
/// 有効なサブスクリプションに対してのみ実行する（解約済みの場合は
/// 履歴を凍結し、新たな行は作らない）。未来の期間には触れない。
fn materialize_elapsed(
    conn: &Connection,
    subscription: &Subscription,
    periods: &[PeriodBounds],
    today: NaiveDate,
) -> AppResult<()> {
    if !subscription.is_active || periods.is_empty() {
        return Ok(());
    }

    let up_to = match schedule::current_period_index(periods, today) {
        Some(current) => Some(current as u32),
        None => match schedule::schedule_end(periods) {
            Some(end) if today >= end => Some(periods.len() as u32 - 1),
            _ => None, // 開始前: 実体化する期間がない
        },
    };

    if let Some(up_to) = up_to {
        payments::ensure_materialized(conn, subscription, up_to)?;
    }

    Ok(())
}

/// 表示用の請求期間一覧を取得する（今日基準）
pub fn billing_periods(
    conn: &Connection,
    subscription: &Subscription,
) -> AppResult<Vec<BillingPeriod>> {
    // JSTで今日の日付を取得
    let today = Utc::now().with_timezone(&Tokyo).date_naive();
    billing_periods_at(conn, subscription, today)
}

/// 表示用の請求期間一覧を取得する
///
/// # 引数
/// * `conn` - データベース接続
/// * `subscription` - サブスクリプション
/// * `today` - 判定基準日
///
/// # 戻り値
/// 分類済みの請求期間リスト、または失敗時はエラー
///
/// # 処理内容
/// 1. スケジュール計算で期間境界を導出する
/// 2. 現在・経過済み期間の支払い行を実体化する（延滞判定を正確にするため、
///    状態照会のたびに実行する）
/// 3. 支払い行と突き合わせて各期間を分類する
pub fn billing_periods_at(
    conn: &Connection,
    subscription: &Subscription,
    today: NaiveDate,
) -> AppResult<Vec<BillingPeriod>> {
    let periods = schedule::periods_for(subscription);
    if periods.is_empty() {
        log::debug!(
            "請求期間が導出されませんでした: subscription_id={}",
            subscription.id
        );
        return Ok(Vec::new());
    }

    materialize_elapsed(conn, subscription, &periods, today)?;

    let rows = payments::find_all(conn, subscription.id)?;
    let rows_by_index: HashMap<u32, _> = rows.into_iter().map(|p| (p.period_index, p)).collect();

    let current = schedule::current_period_index(&periods, today);

    let result = periods
        .iter()
        .map(|bounds| {
            let row = rows_by_index.get(&(bounds.index as u32));
            let is_paid = row.map(|p| p.is_paid).unwrap_or(false);
            let is_current = current == Some(bounds.index);
            BillingPeriod {
                index: bounds.index,
                period_start: bounds.start,
                period_end: bounds.end,
                is_current,
                is_paid,
                amount: row
                    .map(|p| p.amount)
                    .unwrap_or_else(|| subscription.current_cost()),
                classification: classify_period(is_paid, is_current, bounds.end, today),
            }
        })
        .collect();

    Ok(result)
}

/// 支払い状況サマリーを取得する（今日基準）
pub fn status_summary(conn: &Connection, subscription: &Subscription) -> AppResult<StatusSummary> {
    // JSTで今日の日付を取得
    let today = Utc::now().with_timezone(&Tokyo).date_naive();
    status_summary_at(conn, subscription, today)
}

/// 支払い状況サマリーを取得する
///
/// # 引数
/// * `conn` - データベース接続
/// * `subscription` - サブスクリプション
/// * `today` - 判定基準日
///
/// # 戻り値
/// 合計金額・支払い済み件数・残り件数・全体状況、または失敗時はエラー
///
/// 支払い済み件数は現在のスケジュール範囲内の行のみを数える。
/// スケジュール変更前の残留行が数えられることはない。
pub fn status_summary_at(
    conn: &Connection,
    subscription: &Subscription,
    today: NaiveDate,
) -> AppResult<StatusSummary> {
    let total = subscription.period_count().unwrap_or(0);
    let periods = schedule::periods_for(subscription);

    materialize_elapsed(conn, subscription, &periods, today)?;

    let paid_count = payments::paid_count_in_range(conn, subscription.id, total)?;

    let overall_status = if total == 0 {
        OverallPaymentStatus::NotStarted
    } else if paid_count >= total {
        OverallPaymentStatus::Completed
    } else if today < periods[0].start {
        OverallPaymentStatus::NotStarted
    } else {
        let elapsed = elapsed_period_count(&periods, today);
        let paid_elapsed = payments::paid_count_in_range(conn, subscription.id, elapsed)?;
        if paid_elapsed < elapsed {
            OverallPaymentStatus::Overdue
        } else {
            OverallPaymentStatus::OnTrack
        }
    };

    Ok(StatusSummary {
        total_cost: subscription.total_cost(),
        paid_count,
        remaining: total - paid_count.min(total),
        overall_status,
    })
}

/// 支払い進捗率（パーセント）を取得する
///
/// # 引数
/// * `conn` - データベース接続
/// * `subscription` - サブスクリプション
///
/// # 戻り値
/// 0〜100の進捗率、または失敗時はエラー
pub fn progress_percentage(conn: &Connection, subscription: &Subscription) -> AppResult<u32> {
    let total = subscription.period_count().unwrap_or(0);
    if total == 0 {
        return Ok(0);
    }
    let paid = payments::paid_count_in_range(conn, subscription.id, total)?;
    Ok(paid * 100 / total)
}

/// 月額換算の料金を計算する
///
/// 年払いの場合は年額の12分の1を返す。
pub fn monthly_equivalent_cost(subscription: &Subscription) -> f64 {
    match subscription.billing_cycle {
        BillingCycle::Monthly => subscription.monthly_cost.unwrap_or(0.0),
        BillingCycle::Yearly => subscription.yearly_cost.unwrap_or(0.0) / 12.0,
    }
}

/// 支払いサイクルを切り替えた場合の年間差額を計算する
///
/// # 戻り値
/// 月払いの場合: 年払いに切り替えたときに節約できる金額
/// 年払いの場合: 月払いに切り替えたときに増える金額
/// 比較対象の料金が未設定の場合は0
pub fn cycle_switch_difference(subscription: &Subscription) -> f64 {
    let monthly = subscription.monthly_cost.unwrap_or(0.0);
    let yearly = subscription.yearly_cost.unwrap_or(0.0);

    match subscription.billing_cycle {
        BillingCycle::Monthly if yearly > 0.0 => monthly * 12.0 - yearly,
        BillingCycle::Yearly if monthly > 0.0 => monthly * 12.0 - yearly,
        _ => 0.0,
    }
}

/// 次回更新日までの日数を取得する
///
/// # 引数
/// * `subscription` - サブスクリプション
/// * `today` - 判定基準日
///
/// # 戻り値
/// 更新日までの日数（過ぎている場合は負数）。解約済みの場合はNone。
pub fn days_until_renewal(subscription: &Subscription, today: NaiveDate) -> Option<i64> {
    if !subscription.is_active {
        return None;
    }
    Some((subscription.renewal_date - today).num_days())
}

/// 指定日数以内に更新されるかを判定する
///
/// 更新日をすでに過ぎている場合はfalse。
pub fn is_renewing_within(subscription: &Subscription, days: i64, today: NaiveDate) -> bool {
    match days_until_renewal(subscription, today) {
        Some(remaining) if remaining >= 0 => remaining <= days,
        _ => false,
    }
}

/// ユーザーの有効なサブスクリプションの月額換算合計を計算する
///
/// # 引数
/// * `conn` - データベース接続
/// * `user_id` - ユーザーID
///
/// # 戻り値
/// 月額換算の合計金額、または失敗時はエラー
pub fn monthly_total_for_user(conn: &Connection, user_id: i64) -> AppResult<f64> {
    let subscriptions = subscriptions::find_all(conn, user_id, true)?;

    let total = subscriptions
        .iter()
        .fold(0.0, |acc, sub| acc + monthly_equivalent_cost(sub));

    Ok(total)
}
