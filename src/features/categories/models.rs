use serde::{Deserialize, Serialize};

/// サブスクリプションのカテゴリ
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub icon: Option<String>,
}
