//! JSON models shared by the API service and the Telegram bot.
//!
//! Every response body is an [`Envelope`]; on errors the payload is an
//! [`ErrorData`] whose `message` is what clients show to users.

use serde::{Deserialize, Serialize};

/// Body of `POST /create_user`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInit {
    pub username: String,
    pub chat_id: String,
    pub system_prompt: String,
}

/// Body of `POST /predict`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPrompt {
    pub username: String,
    pub prompt: String,
}

/// Body of `POST /set_prompt`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserNewPrompt {
    pub username: String,
    pub new_prompt: String,
}

/// Body of `POST /remove_user`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    pub username: String,
}

/// A registered user as returned by `/get_user` and `/get_all_users`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub username: String,
    pub chat_id: String,
    pub system_prompt: String,
    /// Unix seconds
    pub creation_date: f64,
}

/// One turn of a user's conversation with the assistant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// "user" or "assistant"
    pub role: String,
    pub content: String,
    pub created_at: String,
}

/// Wrapper used for every response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageData {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusData {
    pub status: String,
}

/// Answer of `/predict` with the ids of the documents it was grounded on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictData {
    pub response: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsersData {
    pub users: Vec<UserInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryData {
    pub messages: Vec<HistoryEntry>,
}

/// Error payload (`data` of a non-2xx response)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    pub message: String,
    #[serde(default)]
    pub error_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_loc: Option<Vec<String>>,
}
