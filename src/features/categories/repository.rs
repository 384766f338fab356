use super::models::Category;
use crate::shared::errors::{AppError, AppResult};
use rusqlite::{params, Connection};

/// カテゴリ一覧を取得する
///
/// # 引数
/// * `conn` - データベース接続
///
/// # 戻り値
/// カテゴリのリスト、または失敗時はエラー
pub fn find_all(conn: &Connection) -> AppResult<Vec<Category>> {
    let mut stmt = conn.prepare("SELECT id, name, color, icon FROM categories ORDER BY id")?;
    let categories = stmt.query_map([], |row| {
        Ok(Category {
            id: row.get(0)?,
            name: row.get(1)?,
            color: row.get(2)?,
            icon: row.get(3)?,
        })
    })?;

    categories
        .collect::<Result<Vec<_>, _>>()
        .map_err(AppError::Database)
}

/// IDでカテゴリを取得する
///
/// # 引数
/// * `conn` - データベース接続
/// * `id` - カテゴリID
///
/// # 戻り値
/// カテゴリ、または失敗時はエラー
pub fn find_by_id(conn: &Connection, id: i64) -> AppResult<Category> {
    conn.query_row(
        "SELECT id, name, color, icon FROM categories WHERE id = ?1",
        params![id],
        |row| {
            Ok(Category {
                id: row.get(0)?,
                name: row.get(1)?,
                color: row.get(2)?,
                icon: row.get(3)?,
            })
        },
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => AppError::not_found("カテゴリ"),
        _ => AppError::Database(e),
    })
}
