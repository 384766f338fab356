use crate::config::environment::{get_database_filename, get_environment, Environment, EnvironmentConfig};
use crate::shared::errors::{AppError, AppResult};
use log::info;
use std::path::PathBuf;

/// アプリケーション初期化の結果
#[derive(Debug, Clone)]
pub struct InitializationResult {
    /// データベースファイルのパス
    pub database_path: PathBuf,
    /// 実行環境
    pub environment: Environment,
}

/// アプリケーション全体の初期化を実行する
///
/// # 戻り値
/// 初期化結果、または失敗時はエラー
///
/// # 処理内容
/// 1. .envファイルの読み込み（存在する場合）
/// 2. アプリケーションデータディレクトリの確保
/// 3. 環境に応じたデータベースファイルパスの決定
pub fn initialize_application() -> AppResult<InitializationResult> {
    // 環境変数を読み込み（.envファイルがある場合）
    if dotenv::dotenv().is_err() {
        // .envファイルがない場合は無視（本番環境では環境変数が直接設定される）
        log::warn!(".envファイルが見つかりません。環境変数が直接設定されていることを確認してください。");
    } else {
        info!(".envファイルを読み込みました");
    }

    let environment = get_environment();
    let database_path = resolve_database_path(&environment)?;

    Ok(InitializationResult {
        database_path,
        environment,
    })
}

/// アプリデータディレクトリ内のデータベースファイルパスを決定する
///
/// # 引数
/// * `environment` - 実行環境
///
/// # 戻り値
/// データベースファイルのパス、または失敗時はエラー
fn resolve_database_path(environment: &Environment) -> AppResult<PathBuf> {
    // アプリケーションデータディレクトリを取得
    let data_dir = dirs::data_dir()
        .ok_or_else(|| AppError::configuration("データディレクトリの取得に失敗しました"))?
        .join("subscription-tracker");

    // ディレクトリが存在しない場合は作成
    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir).map_err(|e| {
            AppError::configuration(format!("アプリデータディレクトリの作成に失敗: {e}"))
        })?;
        info!("アプリケーションデータディレクトリを作成: {:?}", data_dir);
    }

    Ok(data_dir.join(get_database_filename(environment)))
}

/// ログシステムを初期化する
///
/// LOG_LEVEL 環境変数に応じたレベルで env_logger を設定する。
pub fn initialize_logging() {
    let env_config = EnvironmentConfig::from_env();

    let log_level = match env_config.log_level.to_lowercase().as_str() {
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "info" => log::LevelFilter::Info,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_secs()
        .format_module_path(false)
        .format_target(false)
        .init();

    info!(
        "ログシステムを初期化しました: level={}, environment={:?}",
        env_config.log_level, env_config.environment
    );
}

/// 初期化完了ログを出力する
///
/// # 引数
/// * `result` - 初期化結果
pub fn log_initialization_complete(result: &InitializationResult) {
    info!(
        "アプリケーション初期化が完了しました: environment={:?}, database={:?}",
        result.environment, result.database_path
    );
}
