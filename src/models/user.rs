use serde::{Deserialize, Serialize};

/// Пользователь, подтвержденный внешним сервисом авторизации.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub id: i64,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub role: String,
}
