pub mod config;
pub mod features;
pub mod shared;

use log::info;
use rusqlite::Connection;
use shared::errors::{AppError, AppResult};
use std::sync::{Mutex, MutexGuard};

pub use features::categories::models::Category;
pub use features::payments::models::Payment;
pub use features::subscriptions::models::{
    BillingCycle, CreateSubscriptionDto, Subscription, UpdateSubscriptionDto,
};
pub use features::subscriptions::schedule::PeriodBounds;
pub use features::subscriptions::status::{
    BillingPeriod, OverallPaymentStatus, PeriodClassification, StatusSummary,
};

/// アプリケーション状態（データベース接続を保持）
pub struct AppState {
    pub db: Mutex<Connection>,
}

impl AppState {
    /// データベース接続を取得する
    ///
    /// # 戻り値
    /// 接続のロックガード、またはロック取得失敗時はエラー
    pub fn connection(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|e| AppError::concurrency(format!("データベースロックエラー: {e}")))
    }
}

/// アプリケーションを初期化する
///
/// # 戻り値
/// データベース接続を保持するアプリケーション状態、または失敗時はエラー
///
/// # 処理内容
/// 1. ログシステムを初期化
/// 2. 環境設定とデータベースパスを解決
/// 3. データベースを初期化（テーブル作成・初期データ投入）
pub fn initialize() -> AppResult<AppState> {
    // ログシステムを初期化
    config::initialize_logging();

    info!("アプリケーション初期化を開始します...");

    let init_result = config::initialize_application()?;

    // アプリ起動時にデータベースを初期化
    info!("データベースを初期化しています...");
    let conn = shared::database::connection::initialize_database(&init_result.database_path)
        .map_err(|e| {
            log::error!("データベースの初期化に失敗しました: {}", e.details());
            e
        })?;

    config::log_initialization_complete(&init_result);

    Ok(AppState {
        db: Mutex::new(conn),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::database::connection::create_in_memory_connection;

    #[test]
    fn test_app_state_connection() {
        let conn = create_in_memory_connection().unwrap();
        let state = AppState {
            db: Mutex::new(conn),
        };

        let guard = state.connection().unwrap();
        let count: i64 = guard
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='payments'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
