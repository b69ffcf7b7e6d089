//! HTTP client for the CryptoPulse API service.

use std::time::Duration;

use common::api::{
    Envelope, ErrorData, MessageData, PredictData, UserInit, UserNewPrompt, UserPrompt, UserInfo,
    UsersData,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

/// Outcome of a call that reached the API
#[derive(Debug, Clone, PartialEq)]
pub enum ApiReply<T> {
    Ok(T),
    /// Non-2xx answer; carries the `message` of the error envelope
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response body: {0}")]
    Decode(String),
}

pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("PulseBot/0.1.0")
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    async fn read_reply<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<ApiReply<T>, ClientError> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            let envelope: Envelope<T> =
                serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))?;
            return Ok(ApiReply::Ok(envelope.data));
        }

        let message = serde_json::from_str::<Envelope<ErrorData>>(&body)
            .map(|e| e.data.message)
            .unwrap_or_else(|_| "Unknown error".to_string());
        Ok(ApiReply::Rejected(message))
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<ApiReply<T>, ClientError> {
        let response = self.http.post(self.url(endpoint)).json(body).send().await?;
        Self::read_reply(response).await
    }

    pub async fn create_user(
        &self,
        username: &str,
        chat_id: &str,
        system_prompt: &str,
    ) -> Result<ApiReply<MessageData>, ClientError> {
        let body = UserInit {
            username: username.to_string(),
            chat_id: chat_id.to_string(),
            system_prompt: system_prompt.to_string(),
        };
        self.post("create_user", &body).await
    }

    pub async fn set_prompt(
        &self,
        username: &str,
        new_prompt: &str,
    ) -> Result<ApiReply<MessageData>, ClientError> {
        let body = UserNewPrompt {
            username: username.to_string(),
            new_prompt: new_prompt.to_string(),
        };
        self.post("set_prompt", &body).await
    }

    pub async fn predict(
        &self,
        username: &str,
        prompt: &str,
    ) -> Result<ApiReply<PredictData>, ClientError> {
        let body = UserPrompt {
            username: username.to_string(),
            prompt: prompt.to_string(),
        };
        self.post("predict", &body).await
    }

    /// Registered users; any non-2xx answer counts as no users
    pub async fn get_all_users(&self) -> Result<Vec<UserInfo>, ClientError> {
        let response = self.http.get(self.url("get_all_users")).send().await?;
        match Self::read_reply::<UsersData>(response).await? {
            ApiReply::Ok(data) => Ok(data.users),
            ApiReply::Rejected(message) => {
                warn!("get_all_users rejected: {}", message);
                Ok(Vec::new())
            }
        }
    }
}
