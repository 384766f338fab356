use crate::features::subscriptions::models::{BillingCycle, Subscription};
use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// 導出された請求期間の境界
///
/// 期間は半開区間 [start, end) で表す。end当日は次の期間に属する。
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PeriodBounds {
    pub index: usize,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// 開始日から指定期間数だけ進めた日付を計算する
///
/// # 引数
/// * `start` - 基準日
/// * `cycle` - 支払いサイクル
/// * `steps` - 進める期間数
///
/// # 戻り値
/// 基準日から steps 期間後の日付
///
/// 月末開始の場合は短い月の末日に丸められる（1月31日 + 1ヶ月 = 2月28日/29日）。
pub fn advance(start: NaiveDate, cycle: BillingCycle, steps: u32) -> NaiveDate {
    let months = match cycle {
        BillingCycle::Monthly => steps,
        BillingCycle::Yearly => steps.saturating_mul(12),
    };
    start
        .checked_add_months(Months::new(months))
        .unwrap_or(start)
}

/// 請求期間の一覧を導出する
///
/// # 引数
/// * `start_date` - 契約開始日
/// * `cycle` - 支払いサイクル
/// * `count` - 期間数（契約月数または契約年数）
///
/// # 戻り値
/// 開始日順の請求期間リスト
///
/// 期間 i は [start_date + i サイクル, start_date + (i+1) サイクル) を占める。
/// 各期間の境界は常に契約開始日から数え直すため、月末丸めによるずれが
/// 累積することはない。純粋関数であり、読み取りのたびに呼んでよい。
pub fn compute_periods(
    start_date: NaiveDate,
    cycle: BillingCycle,
    count: u32,
) -> Vec<PeriodBounds> {
    (0..count)
        .map(|i| PeriodBounds {
            index: i as usize,
            start: advance(start_date, cycle, i),
            end: advance(start_date, cycle, i + 1),
        })
        .collect()
}

/// サブスクリプションの請求期間一覧を導出する
pub fn periods_for(subscription: &Subscription) -> Vec<PeriodBounds> {
    compute_periods(
        subscription.start_date,
        subscription.billing_cycle,
        subscription.period_count().unwrap_or(0),
    )
}

/// 今日が属する請求期間のインデックスを求める
///
/// # 引数
/// * `periods` - 請求期間リスト
/// * `today` - 判定基準日
///
/// # 戻り値
/// 今日を含む期間のインデックス。最初の期間より前、または最後の期間の
/// 終了日以降の場合はNone（開始日当日は含み、終了日当日は含まない）。
pub fn current_period_index(periods: &[PeriodBounds], today: NaiveDate) -> Option<usize> {
    periods
        .iter()
        .position(|p| p.start <= today && today < p.end)
}

/// スケジュール全体の終了日を取得する
///
/// # 引数
/// * `periods` - 請求期間リスト
///
/// # 戻り値
/// 最終期間の終了日。期間が空の場合はNone。
pub fn schedule_end(periods: &[PeriodBounds]) -> Option<NaiveDate> {
    periods.last().map(|p| p.end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_compute_periods_monthly() {
        // 2025-01-01開始、月払い6ヶ月 → [2025-01-01, 2025-02-01) 〜 [2025-06-01, 2025-07-01)
        let periods = compute_periods(date(2025, 1, 1), BillingCycle::Monthly, 6);

        assert_eq!(periods.len(), 6);
        assert_eq!(periods[0].start, date(2025, 1, 1));
        assert_eq!(periods[0].end, date(2025, 2, 1));
        assert_eq!(periods[5].start, date(2025, 6, 1));
        assert_eq!(periods[5].end, date(2025, 7, 1));
    }

    #[test]
    fn test_compute_periods_yearly() {
        let periods = compute_periods(date(2025, 3, 15), BillingCycle::Yearly, 2);

        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].start, date(2025, 3, 15));
        assert_eq!(periods[0].end, date(2026, 3, 15));
        assert_eq!(periods[1].start, date(2026, 3, 15));
        assert_eq!(periods[1].end, date(2027, 3, 15));
    }

    #[test]
    fn test_compute_periods_month_end_clamping() {
        // 1月31日開始: 2月は28日に丸められるが、3月の境界は開始日から数え直すため3月31日
        let periods = compute_periods(date(2025, 1, 31), BillingCycle::Monthly, 3);

        assert_eq!(periods[0].end, date(2025, 2, 28));
        assert_eq!(periods[1].start, date(2025, 2, 28));
        assert_eq!(periods[1].end, date(2025, 3, 31));
        assert_eq!(periods[2].end, date(2025, 4, 30));
    }

    #[test]
    fn test_compute_periods_deterministic() {
        let a = compute_periods(date(2025, 1, 1), BillingCycle::Monthly, 12);
        let b = compute_periods(date(2025, 1, 1), BillingCycle::Monthly, 12);
        assert_eq!(a, b);
    }

    #[test]
    fn test_current_period_index_mid_period() {
        let periods = compute_periods(date(2025, 1, 1), BillingCycle::Monthly, 6);

        // 2025-03-15 は [2025-03-01, 2025-04-01) に属する
        assert_eq!(current_period_index(&periods, date(2025, 3, 15)), Some(2));
    }

    #[test]
    fn test_current_period_index_boundary_belongs_to_later_period() {
        let periods = compute_periods(date(2025, 1, 1), BillingCycle::Monthly, 6);

        // 期間境界当日は後の期間に属する
        assert_eq!(current_period_index(&periods, date(2025, 2, 1)), Some(1));
        assert_eq!(current_period_index(&periods, date(2025, 1, 1)), Some(0));
    }

    #[test]
    fn test_current_period_index_outside_schedule() {
        let periods = compute_periods(date(2025, 1, 1), BillingCycle::Monthly, 6);

        // 開始前はどの期間にも属さない
        assert_eq!(current_period_index(&periods, date(2024, 12, 31)), None);
        // 最終期間の終了日以降もどの期間にも属さない
        assert_eq!(current_period_index(&periods, date(2025, 7, 1)), None);
        assert_eq!(current_period_index(&periods, date(2026, 1, 1)), None);
    }

    #[test]
    fn test_schedule_end() {
        let periods = compute_periods(date(2025, 1, 1), BillingCycle::Monthly, 6);
        assert_eq!(schedule_end(&periods), Some(date(2025, 7, 1)));
        assert_eq!(schedule_end(&[]), None);
    }

    #[quickcheck]
    fn prop_compute_periods_is_pure(
        year_off: u8,
        month0: u8,
        day0: u8,
        count0: u8,
        yearly: bool,
    ) -> bool {
        let start = date(
            2000 + (year_off % 80) as i32,
            1 + (month0 % 12) as u32,
            1 + (day0 % 28) as u32,
        );
        let cycle = if yearly {
            BillingCycle::Yearly
        } else {
            BillingCycle::Monthly
        };
        let count = 1 + (count0 % 60) as u32;

        compute_periods(start, cycle, count) == compute_periods(start, cycle, count)
    }

    #[quickcheck]
    fn prop_periods_are_contiguous_and_ordered(
        year_off: u8,
        month0: u8,
        day0: u8,
        count0: u8,
        yearly: bool,
    ) -> bool {
        let start = date(
            2000 + (year_off % 80) as i32,
            1 + (month0 % 12) as u32,
            1 + (day0 % 28) as u32,
        );
        let cycle = if yearly {
            BillingCycle::Yearly
        } else {
            BillingCycle::Monthly
        };
        let count = 1 + (count0 % 60) as u32;

        let periods = compute_periods(start, cycle, count);

        periods.len() == count as usize
            && periods.windows(2).all(|w| w[0].end == w[1].start)
            && periods.iter().all(|p| p.start < p.end)
            && periods.iter().enumerate().all(|(i, p)| p.index == i)
    }
}
