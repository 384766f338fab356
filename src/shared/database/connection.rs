use crate::shared::errors::AppResult;
use rusqlite::Connection;
use std::path::Path;

/// データベース接続を初期化し、テーブルを作成する
///
/// # 引数
/// * `database_path` - データベースファイルのパス
///
/// # 戻り値
/// データベース接続、または失敗時はエラー
///
/// # 処理内容
/// 1. データベース接続の開設
/// 2. テーブル作成とインデックス作成
/// 3. 初期カテゴリデータの投入
pub fn initialize_database(database_path: &Path) -> AppResult<Connection> {
    // データベース接続を開く
    let conn = Connection::open(database_path)?;

    // テーブルを作成
    create_tables(&conn)?;

    log::info!("データベースを初期化しました: {:?}", database_path);

    Ok(conn)
}

/// インメモリデータベース接続を作成する（テスト用）
///
/// # 戻り値
/// インメモリデータベース接続、または失敗時はエラー
pub fn create_in_memory_connection() -> AppResult<Connection> {
    let conn = Connection::open_in_memory()?;
    create_tables(&conn)?;
    Ok(conn)
}

/// データベーステーブルを作成する
///
/// # 引数
/// * `conn` - データベース接続
///
/// # 戻り値
/// 成功時はOk(())、失敗時はエラー
pub fn create_tables(conn: &Connection) -> AppResult<()> {
    create_subscriptions_table(conn)?;
    create_payments_table(conn)?;
    create_categories_table(conn)?;
    create_indexes(conn)?;

    Ok(())
}

/// サブスクリプションテーブルを作成する
fn create_subscriptions_table(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subscriptions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            monthly_cost REAL,
            yearly_cost REAL,
            billing_cycle TEXT NOT NULL CHECK(billing_cycle IN ('monthly', 'yearly')),
            start_date TEXT NOT NULL,
            renewal_date TEXT NOT NULL,
            duration_months INTEGER,
            duration_years INTEGER,
            is_active INTEGER NOT NULL DEFAULT 1,
            auto_renewal INTEGER NOT NULL DEFAULT 1,
            category_id INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

/// 支払いテーブルを作成する
///
/// (subscription_id, period_index) の一意制約で、同一請求期間への
/// 重複行の作成を防ぐ。
fn create_payments_table(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS payments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subscription_id INTEGER NOT NULL,
            period_index INTEGER NOT NULL,
            is_paid INTEGER NOT NULL DEFAULT 0,
            payment_date TEXT,
            amount REAL NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(subscription_id, period_index)
        )",
        [],
    )?;

    Ok(())
}

/// カテゴリテーブルを作成する
fn create_categories_table(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            color TEXT NOT NULL,
            icon TEXT
        )",
        [],
    )?;

    // テーブルが空の場合、初期カテゴリデータを挿入
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))?;

    if count == 0 {
        insert_default_categories(conn)?;
    }

    Ok(())
}

/// インデックスを作成する
fn create_indexes(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subscriptions_user ON subscriptions(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subscriptions_active ON subscriptions(is_active)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_subscription ON payments(subscription_id)",
        [],
    )?;

    Ok(())
}

/// デフォルトカテゴリを挿入する
fn insert_default_categories(conn: &Connection) -> AppResult<()> {
    let categories = [
        ("動画配信", "#EF4444", "🎬"),
        ("音楽", "#8B5CF6", "🎵"),
        ("クラウドストレージ", "#3B82F6", "☁️"),
        ("ソフトウェア", "#10B981", "💻"),
        ("ニュース・雑誌", "#F59E0B", "📰"),
        ("その他", "#6B7280", "📋"),
    ];

    for (name, color, icon) in categories.iter() {
        conn.execute(
            "INSERT INTO categories (name, color, icon) VALUES (?1, ?2, ?3)",
            [name, color, icon],
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_create_tables() {
        let conn = Connection::open_in_memory().unwrap();

        // テーブル作成が成功することを確認
        let result = create_tables(&conn);
        assert!(result.is_ok());

        // 各テーブルが作成されていることを確認
        let tables = ["subscriptions", "payments", "categories"];
        for table in &tables {
            let count: i64 = conn
                .query_row(
                    &format!(
                        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='{table}'"
                    ),
                    [],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "テーブル {table} が作成されていません");
        }
    }

    #[test]
    fn test_create_tables_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        // 2回実行してもエラーにならないことを確認
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();

        // デフォルトカテゴリが重複挿入されないことを確認
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 6);
    }

    #[test]
    fn test_payments_unique_constraint() {
        let conn = create_in_memory_connection().unwrap();

        conn.execute(
            "INSERT INTO payments (subscription_id, period_index, is_paid, payment_date, amount, created_at)
             VALUES (1, 0, 0, NULL, 500.0, '2025-01-01T00:00:00+09:00')",
            [],
        )
        .unwrap();

        // 同じ (subscription_id, period_index) の挿入は一意制約違反になる
        let result = conn.execute(
            "INSERT INTO payments (subscription_id, period_index, is_paid, payment_date, amount, created_at)
             VALUES (1, 0, 0, NULL, 500.0, '2025-01-01T00:00:00+09:00')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_initialize_database_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test_subscriptions.db");

        let conn = initialize_database(&db_path).unwrap();
        drop(conn);

        // ファイルが作成されていることを確認
        assert!(db_path.exists());

        // 再オープンしてもテーブルが残っていることを確認
        let conn = initialize_database(&db_path).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='subscriptions'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
