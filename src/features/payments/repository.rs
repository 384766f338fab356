use super::models::Payment;
use crate::features::subscriptions::models::Subscription;
use crate::features::subscriptions::schedule;
use crate::shared::errors::{AppError, AppResult};
use chrono::{NaiveDate, Utc};
use chrono_tz::Asia::Tokyo;
use rusqlite::{params, Connection};

/// 一意制約違反を整合性エラーとして分類する
///
/// (subscription_id, period_index) の重複はユーザー起因ではなく
/// ロジックバグを示すため、データベースエラーとは区別する。
fn map_insert_error(e: rusqlite::Error) -> AppError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            AppError::integrity(format!("支払い行の一意制約に違反しました: {e}"))
        }
        _ => AppError::Database(e),
    }
}

/// サブスクリプションの支払い一覧を取得する
///
/// # 引数
/// * `conn` - データベース接続
/// * `subscription_id` - サブスクリプションID
///
/// # 戻り値
/// 期間インデックス順の支払いリスト、または失敗時はエラー
pub fn find_all(conn: &Connection, subscription_id: i64) -> AppResult<Vec<Payment>> {
    let mut stmt = conn.prepare(
        "SELECT id, subscription_id, period_index, is_paid, payment_date, amount, created_at
         FROM payments WHERE subscription_id = ?1 ORDER BY period_index",
    )?;
    let payments = stmt.query_map(params![subscription_id], |row| {
        Ok(Payment {
            id: row.get(0)?,
            subscription_id: row.get(1)?,
            period_index: row.get(2)?,
            is_paid: row.get::<_, i64>(3)? != 0,
            payment_date: row.get(4)?,
            amount: row.get(5)?,
            created_at: row.get(6)?,
        })
    })?;

    payments
        .collect::<Result<Vec<_>, _>>()
        .map_err(AppError::Database)
}

/// 期間インデックスで支払いを取得する
///
/// # 引数
/// * `conn` - データベース接続
/// * `subscription_id` - サブスクリプションID
/// * `period_index` - 期間インデックス
///
/// # 戻り値
/// 支払い（行が存在しない場合はNone）、または失敗時はエラー
pub fn find_by_index(
    conn: &Connection,
    subscription_id: i64,
    period_index: u32,
) -> AppResult<Option<Payment>> {
    match conn.query_row(
        "SELECT id, subscription_id, period_index, is_paid, payment_date, amount, created_at
         FROM payments WHERE subscription_id = ?1 AND period_index = ?2",
        params![subscription_id, period_index],
        |row| {
            Ok(Payment {
                id: row.get(0)?,
                subscription_id: row.get(1)?,
                period_index: row.get(2)?,
                is_paid: row.get::<_, i64>(3)? != 0,
                payment_date: row.get(4)?,
                amount: row.get(5)?,
                created_at: row.get(6)?,
            })
        },
    ) {
        Ok(payment) => Ok(Some(payment)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(AppError::Database(e)),
    }
}

/// 現在のスケジュール範囲内の支払い済み件数を取得する
///
/// スケジュール変更前の残留行がインデックス範囲外に存在しても
/// 集計に含めない。
///
/// # 引数
/// * `conn` - データベース接続
/// * `subscription_id` - サブスクリプションID
/// * `period_count` - 現在のスケジュールの期間数
///
/// # 戻り値
/// 支払い済み件数、または失敗時はエラー
pub fn paid_count_in_range(
    conn: &Connection,
    subscription_id: i64,
    period_count: u32,
) -> AppResult<u32> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM payments
         WHERE subscription_id = ?1 AND is_paid = 1 AND period_index < ?2",
        params![subscription_id, period_count],
        |row| row.get(0),
    )?;
    Ok(count as u32)
}

/// サブスクリプションの全支払い行を削除する（トランザクションなし）
///
/// 呼び出し側のトランザクション内で使用する。単独で呼ぶ場合は
/// `reset_for_new_schedule` を使用すること。
pub fn delete_all(conn: &Connection, subscription_id: i64) -> AppResult<usize> {
    let deleted = conn.execute(
        "DELETE FROM payments WHERE subscription_id = ?1",
        params![subscription_id],
    )?;
    Ok(deleted)
}

/// スケジュール変更に伴い全支払い行を削除する
///
/// # 引数
/// * `conn` - データベース接続
/// * `subscription_id` - サブスクリプションID
///
/// # 戻り値
/// 削除された行数、または失敗時はエラー
///
/// 削除は単一トランザクションで実行され、部分的な削除が観測されることはない。
/// 失敗時は全件ロールバックされる。
pub fn reset_for_new_schedule(conn: &Connection, subscription_id: i64) -> AppResult<usize> {
    let tx = conn.unchecked_transaction()?;
    let deleted = delete_all(&tx, subscription_id)?;
    tx.commit()?;

    log::info!(
        "スケジュール変更により支払い行をリセットしました: subscription_id={}, deleted={}",
        subscription_id,
        deleted
    );

    Ok(deleted)
}

/// 不足している支払い行を作成する（トランザクションなし）
///
/// インデックス 0..=up_to_index のうち行が存在しないものに対して、
/// 未払い行（payment_date=NULL、料金は現時点のスナップショット）を作成する。
/// up_to_index より先の期間には決して行を作らない。
fn materialize_missing(
    conn: &Connection,
    subscription: &Subscription,
    up_to_index: u32,
    now: &str,
) -> AppResult<usize> {
    let mut stmt = conn.prepare(
        "SELECT period_index FROM payments
         WHERE subscription_id = ?1 AND period_index <= ?2",
    )?;
    let existing = stmt
        .query_map(params![subscription.id, up_to_index], |row| {
            row.get::<_, u32>(0)
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut created = 0;
    for index in 0..=up_to_index {
        if existing.contains(&index) {
            continue;
        }
        conn.execute(
            "INSERT INTO payments (subscription_id, period_index, is_paid, payment_date, amount, created_at)
             VALUES (?1, ?2, 0, NULL, ?3, ?4)",
            params![subscription.id, index, subscription.current_cost(), now],
        )
        .map_err(map_insert_error)?;
        created += 1;
    }

    if created > 0 {
        log::debug!(
            "支払い行を実体化しました: subscription_id={}, up_to_index={}, created={}",
            subscription.id,
            up_to_index,
            created
        );
    }

    Ok(created)
}

/// 現在・過去の請求期間の支払い行を実体化する
///
/// # 引数
/// * `conn` - データベース接続
/// * `subscription` - サブスクリプション
/// * `up_to_index` - 実体化する最大の期間インデックス（このインデックスを含む）
///
/// # 戻り値
/// 新規作成された行数、または失敗時はエラー
///
/// 冪等操作であり、既存の行には触れない。未来の期間を先行作成する
/// ことはない（キャッシュフィルとしての契約）。
pub fn ensure_materialized(
    conn: &Connection,
    subscription: &Subscription,
    up_to_index: u32,
) -> AppResult<usize> {
    // JSTで現在時刻を取得
    let now = Utc::now().with_timezone(&Tokyo).to_rfc3339();

    let tx = conn.unchecked_transaction()?;
    let created = materialize_missing(&tx, subscription, up_to_index, &now)?;
    tx.commit()?;

    Ok(created)
}

/// 請求期間を支払い済みにする（今日基準）
///
/// # 引数
/// * `conn` - データベース接続
/// * `subscription` - サブスクリプション
/// * `period_index` - 期間インデックス
/// * `payment_date` - 支払い日（未指定の場合は今日）
///
/// # 戻り値
/// 更新された支払い、または失敗時はエラー
pub fn mark_paid(
    conn: &Connection,
    subscription: &Subscription,
    period_index: u32,
    payment_date: Option<NaiveDate>,
) -> AppResult<Payment> {
    // JSTで今日の日付を取得
    let today = Utc::now().with_timezone(&Tokyo).date_naive();
    mark_paid_at(conn, subscription, period_index, payment_date, today)
}

/// 請求期間を支払い済みにする
///
/// # 引数
/// * `conn` - データベース接続
/// * `subscription` - サブスクリプション
/// * `period_index` - 期間インデックス
/// * `payment_date` - 支払い日（未指定の場合は`today`）
/// * `today` - 判定基準日
///
/// # 戻り値
/// 更新された支払い、または失敗時はエラー
///
/// # エラー
/// * 解約済みサブスクリプションに対する操作はバリデーションエラー
/// * スケジュール範囲外のインデックスは請求期間エラー
/// * 現在の期間より先の期間（先払い）は請求期間エラー
///
/// 行が存在しない場合は実体化してから更新する。すでに支払い済みの
/// 行に対しては支払い日を更新するだけの冪等操作となる。
pub fn mark_paid_at(
    conn: &Connection,
    subscription: &Subscription,
    period_index: u32,
    payment_date: Option<NaiveDate>,
    today: NaiveDate,
) -> AppResult<Payment> {
    if !subscription.is_active {
        return Err(AppError::validation(
            "解約済みのサブスクリプションの支払いは変更できません",
        ));
    }

    let total = subscription.period_count().unwrap_or(0);
    if period_index >= total {
        return Err(AppError::invalid_period(format!(
            "期間インデックス {period_index} はスケジュール範囲外です（期間数: {total}）"
        )));
    }

    let periods = schedule::periods_for(subscription);
    let markable_limit = match schedule::current_period_index(&periods, today) {
        Some(current) => current as u32,
        None => {
            // スケジュール終了後は全期間が過去であり、どの期間も支払い可能。
            // 開始前は現在の期間が存在せず、先払いになるため拒否する。
            match schedule::schedule_end(&periods) {
                Some(end) if today >= end => total - 1,
                _ => {
                    return Err(AppError::invalid_period(
                        "未来の請求期間を支払い済みにすることはできません",
                    ));
                }
            }
        }
    };

    if period_index > markable_limit {
        return Err(AppError::invalid_period(
            "未来の請求期間を支払い済みにすることはできません",
        ));
    }

    // JSTで現在時刻を取得
    let now = Utc::now().with_timezone(&Tokyo).to_rfc3339();
    let paid_on = payment_date.unwrap_or(today);

    let tx = conn.unchecked_transaction()?;
    materialize_missing(&tx, subscription, period_index, &now)?;
    tx.execute(
        "UPDATE payments SET is_paid = 1, payment_date = ?1
         WHERE subscription_id = ?2 AND period_index = ?3",
        params![paid_on, subscription.id, period_index],
    )?;
    tx.commit()?;

    log::info!(
        "支払いを記録しました: subscription_id={}, period_index={}, payment_date={}",
        subscription.id,
        period_index,
        paid_on
    );

    find_by_index(conn, subscription.id, period_index)?
        .ok_or_else(|| AppError::not_found("支払い"))
}

/// 請求期間を未払いに戻す
///
/// # 引数
/// * `conn` - データベース接続
/// * `subscription` - サブスクリプション
/// * `period_index` - 期間インデックス
///
/// # 戻り値
/// 成功時はOk(())、失敗時はエラー
///
/// 支払い日をクリアし未払い状態に戻す。行が存在しない、またはすでに
/// 未払いの場合は何もしない（冪等操作）。
pub fn mark_unpaid(
    conn: &Connection,
    subscription: &Subscription,
    period_index: u32,
) -> AppResult<()> {
    if !subscription.is_active {
        return Err(AppError::validation(
            "解約済みのサブスクリプションの支払いは変更できません",
        ));
    }

    let tx = conn.unchecked_transaction()?;
    let updated = tx.execute(
        "UPDATE payments SET is_paid = 0, payment_date = NULL
         WHERE subscription_id = ?1 AND period_index = ?2",
        params![subscription.id, period_index],
    )?;
    tx.commit()?;

    if updated > 0 {
        log::info!(
            "支払いを未払いに戻しました: subscription_id={}, period_index={}",
            subscription.id,
            period_index
        );
    }

    Ok(())
}
