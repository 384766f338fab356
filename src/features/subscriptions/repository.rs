use super::models::{
    validate_schedule_fields, BillingCycle, CreateSubscriptionDto, Subscription,
    UpdateSubscriptionDto,
};
use crate::features::payments::repository as payments;
use crate::features::subscriptions::schedule;
use crate::shared::errors::{AppError, AppResult};
use chrono::{NaiveDate, Utc};
use chrono_tz::Asia::Tokyo;
use rusqlite::{params, Connection};

/// スケジュール定義フィールドが変更されたかを判定する
///
/// # 引数
/// * `original` - 保存済みのサブスクリプション
/// * `start_date` - 保存しようとしている契約開始日
/// * `billing_cycle` - 保存しようとしている支払いサイクル
/// * `duration_months` - 保存しようとしている契約月数
/// * `duration_years` - 保存しようとしている契約年数
///
/// # 戻り値
/// いずれかのスケジュール定義フィールドが変わる場合はtrue
///
/// この4フィールドのいずれかが変わると導出される請求期間が無効になる
/// ため、支払い履歴のリセットが必要になる。
pub fn schedule_changed(
    original: &Subscription,
    start_date: NaiveDate,
    billing_cycle: BillingCycle,
    duration_months: Option<u32>,
    duration_years: Option<u32>,
) -> bool {
    original.start_date != start_date
        || original.billing_cycle != billing_cycle
        || original.duration_months != duration_months
        || original.duration_years != duration_years
}

/// サブスクリプションを作成する
///
/// # 引数
/// * `conn` - データベース接続
/// * `dto` - サブスクリプション作成用DTO
/// * `user_id` - ユーザーID
///
/// # 戻り値
/// 作成されたサブスクリプション、または失敗時はエラー
///
/// 次回更新日は契約開始日 + 1サイクルとして計算する。作成時点では
/// 支払い行が存在しないため、リセットは行わない。
pub fn create(
    conn: &Connection,
    dto: CreateSubscriptionDto,
    user_id: i64,
) -> AppResult<Subscription> {
    if dto.name.trim().is_empty() {
        return Err(AppError::validation("サービス名は必須です"));
    }

    validate_schedule_fields(
        dto.billing_cycle,
        dto.duration_months,
        dto.duration_years,
        dto.monthly_cost,
        dto.yearly_cost,
    )?;

    // JSTで現在時刻を取得
    let now = Utc::now().with_timezone(&Tokyo).to_rfc3339();

    let renewal_date = schedule::advance(dto.start_date, dto.billing_cycle, 1);
    let auto_renewal = dto.auto_renewal.unwrap_or(true);

    conn.execute(
        "INSERT INTO subscriptions (user_id, name, monthly_cost, yearly_cost, billing_cycle,
                                    start_date, renewal_date, duration_months, duration_years,
                                    is_active, auto_renewal, category_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10, ?11, ?12, ?13)",
        params![
            user_id,
            dto.name,
            dto.monthly_cost,
            dto.yearly_cost,
            dto.billing_cycle,
            dto.start_date,
            renewal_date,
            dto.duration_months,
            dto.duration_years,
            auto_renewal,
            dto.category_id,
            now,
            now
        ],
    )?;

    let id = conn.last_insert_rowid();

    log::info!(
        "サブスクリプションを作成しました: id={}, user_id={}, cycle={}",
        id,
        user_id,
        dto.billing_cycle
    );

    find_by_id(conn, id, user_id)
}

/// IDでサブスクリプションを取得する
///
/// # 引数
/// * `conn` - データベース接続
/// * `id` - サブスクリプションID
/// * `user_id` - ユーザーID
///
/// # 戻り値
/// サブスクリプション、または失敗時はエラー
pub fn find_by_id(conn: &Connection, id: i64, user_id: i64) -> AppResult<Subscription> {
    conn.query_row(
        "SELECT id, user_id, name, monthly_cost, yearly_cost, billing_cycle, start_date,
                renewal_date, duration_months, duration_years, is_active, auto_renewal,
                category_id, created_at, updated_at
         FROM subscriptions WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
        |row| {
            Ok(Subscription {
                id: row.get(0)?,
                user_id: row.get(1)?,
                name: row.get(2)?,
                monthly_cost: row.get(3)?,
                yearly_cost: row.get(4)?,
                billing_cycle: row.get(5)?,
                start_date: row.get(6)?,
                renewal_date: row.get(7)?,
                duration_months: row.get(8)?,
                duration_years: row.get(9)?,
                is_active: row.get::<_, i64>(10)? != 0,
                auto_renewal: row.get::<_, i64>(11)? != 0,
                category_id: row.get(12)?,
                created_at: row.get(13)?,
                updated_at: row.get(14)?,
            })
        },
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            AppError::NotFound(format!("ID {id} のサブスクリプションが見つかりません"))
        }
        _ => AppError::Database(e),
    })
}

/// サブスクリプション一覧を取得する
///
/// # 引数
/// * `conn` - データベース接続
/// * `user_id` - ユーザーID
/// * `active_only` - 有効なサブスクリプションのみを取得するか
///
/// # 戻り値
/// サブスクリプションのリスト、または失敗時はエラー
pub fn find_all(
    conn: &Connection,
    user_id: i64,
    active_only: bool,
) -> AppResult<Vec<Subscription>> {
    let query = if active_only {
        "SELECT id, user_id, name, monthly_cost, yearly_cost, billing_cycle, start_date,
                renewal_date, duration_months, duration_years, is_active, auto_renewal,
                category_id, created_at, updated_at
         FROM subscriptions WHERE user_id = ?1 AND is_active = 1 ORDER BY name"
    } else {
        "SELECT id, user_id, name, monthly_cost, yearly_cost, billing_cycle, start_date,
                renewal_date, duration_months, duration_years, is_active, auto_renewal,
                category_id, created_at, updated_at
         FROM subscriptions WHERE user_id = ?1 ORDER BY name"
    };

    let mut stmt = conn.prepare(query)?;
    let subscriptions = stmt.query_map([user_id], |row| {
        Ok(Subscription {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            monthly_cost: row.get(3)?,
            yearly_cost: row.get(4)?,
            billing_cycle: row.get(5)?,
            start_date: row.get(6)?,
            renewal_date: row.get(7)?,
            duration_months: row.get(8)?,
            duration_years: row.get(9)?,
            is_active: row.get::<_, i64>(10)? != 0,
            auto_renewal: row.get::<_, i64>(11)? != 0,
            category_id: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    })?;

    subscriptions
        .collect::<Result<Vec<_>, _>>()
        .map_err(AppError::Database)
}

/// サブスクリプションを更新する
///
/// # 引数
/// * `conn` - データベース接続
/// * `id` - サブスクリプションID
/// * `dto` - サブスクリプション更新用DTO
/// * `user_id` - ユーザーID
///
/// # 戻り値
/// 更新されたサブスクリプション、または失敗時はエラー
///
/// 保存前にスケジュール定義フィールド（契約開始日・支払いサイクル・
/// 契約期間）の変更を検出し、変更がある場合は同一トランザクション内で
/// 既存の支払い行をすべて削除する。次回更新日は変更の有無にかかわらず
/// 再計算する。
pub fn update(
    conn: &Connection,
    id: i64,
    dto: UpdateSubscriptionDto,
    user_id: i64,
) -> AppResult<Subscription> {
    // JSTで現在時刻を取得
    let now = Utc::now().with_timezone(&Tokyo).to_rfc3339();

    // 既存のサブスクリプションを取得
    let existing = find_by_id(conn, id, user_id)?;

    // 更新するフィールドを決定
    let name = dto.name.unwrap_or_else(|| existing.name.clone());
    let monthly_cost = dto.monthly_cost.or(existing.monthly_cost);
    let yearly_cost = dto.yearly_cost.or(existing.yearly_cost);
    let billing_cycle = dto.billing_cycle.unwrap_or(existing.billing_cycle);
    let start_date = dto.start_date.unwrap_or(existing.start_date);
    let auto_renewal = dto.auto_renewal.unwrap_or(existing.auto_renewal);
    let category_id = dto.category_id.or(existing.category_id);

    // サイクル変更時は契約期間を引き継がず、DTOの値のみ使用する
    let (duration_months, duration_years) = if billing_cycle == existing.billing_cycle {
        (
            dto.duration_months.or(existing.duration_months),
            dto.duration_years.or(existing.duration_years),
        )
    } else {
        (dto.duration_months, dto.duration_years)
    };

    if name.trim().is_empty() {
        return Err(AppError::validation("サービス名は必須です"));
    }

    validate_schedule_fields(
        billing_cycle,
        duration_months,
        duration_years,
        monthly_cost,
        yearly_cost,
    )?;

    let changed = schedule_changed(
        &existing,
        start_date,
        billing_cycle,
        duration_months,
        duration_years,
    );

    // 次回更新日は常に再計算する（キャッシュであり真実の源ではない）
    let renewal_date = schedule::advance(start_date, billing_cycle, 1);

    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "UPDATE subscriptions
         SET name = ?1, monthly_cost = ?2, yearly_cost = ?3, billing_cycle = ?4,
             start_date = ?5, renewal_date = ?6, duration_months = ?7, duration_years = ?8,
             auto_renewal = ?9, category_id = ?10, updated_at = ?11
         WHERE id = ?12 AND user_id = ?13",
        params![
            name,
            monthly_cost,
            yearly_cost,
            billing_cycle,
            start_date,
            renewal_date,
            duration_months,
            duration_years,
            auto_renewal,
            category_id,
            now,
            id,
            user_id
        ],
    )?;

    if changed {
        log::info!(
            "スケジュール定義フィールドの変更を検出しました: id={}, start_date={}→{}, \
             billing_cycle={}→{}, duration_months={:?}→{:?}, duration_years={:?}→{:?}",
            id,
            existing.start_date,
            start_date,
            existing.billing_cycle,
            billing_cycle,
            existing.duration_months,
            duration_months,
            existing.duration_years,
            duration_years
        );

        let deleted = payments::delete_all(&tx, id)?;
        log::info!(
            "スケジュール変更により支払い行をリセットしました: subscription_id={}, deleted={}",
            id,
            deleted
        );
    }

    tx.commit()?;

    find_by_id(conn, id, user_id)
}

/// サブスクリプションの有効状態を切り替える
///
/// # 引数
/// * `conn` - データベース接続
/// * `id` - サブスクリプションID
/// * `user_id` - ユーザーID
///
/// # 戻り値
/// 更新されたサブスクリプション、または失敗時はエラー
///
/// 解約はソフトデリートとして扱う。支払い行は履歴表示のために残る。
pub fn toggle_active(conn: &Connection, id: i64, user_id: i64) -> AppResult<Subscription> {
    // JSTで現在時刻を取得
    let now = Utc::now().with_timezone(&Tokyo).to_rfc3339();

    let updated = conn.execute(
        "UPDATE subscriptions SET is_active = NOT is_active, updated_at = ?1
         WHERE id = ?2 AND user_id = ?3",
        params![now, id, user_id],
    )?;

    if updated == 0 {
        return Err(AppError::NotFound(format!(
            "ID {id} のサブスクリプションが見つかりません"
        )));
    }

    find_by_id(conn, id, user_id)
}

/// サブスクリプションを削除する
///
/// # 引数
/// * `conn` - データベース接続
/// * `id` - サブスクリプションID
/// * `user_id` - ユーザーID
///
/// # 戻り値
/// 成功時はOk(())、失敗時はエラー
///
/// 支払い行も同一トランザクション内で削除する。
pub fn delete(conn: &Connection, id: i64, user_id: i64) -> AppResult<()> {
    let tx = conn.unchecked_transaction()?;

    let rows_affected = tx.execute(
        "DELETE FROM subscriptions WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;

    if rows_affected == 0 {
        return Err(AppError::NotFound(format!(
            "ID {id} のサブスクリプションが見つかりません"
        )));
    }

    payments::delete_all(&tx, id)?;
    tx.commit()?;

    log::info!("サブスクリプションを削除しました: id={}, user_id={}", id, user_id);

    Ok(())
}
