//! Error taxonomy of the HTTP API.
//!
//! Each variant maps to an HTTP status and a stable `error_key` that ends up
//! in the JSON error envelope.

use common::api::{Envelope, ErrorData};
use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use thiserror::Error;

use crate::rag::RagError;
use crate::users::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation {
        message: String,
        loc: Option<Vec<String>>,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> Status {
        match self {
            ApiError::Validation { .. } => Status::BadRequest,
            ApiError::NotFound(_) => Status::NotFound,
            ApiError::Conflict(_) => Status::Conflict,
            ApiError::Unavailable(_) => Status::ServiceUnavailable,
            ApiError::Upstream(_) => Status::BadGateway,
            ApiError::Internal(_) => Status::InternalServerError,
        }
    }

    pub fn error_key(&self) -> &'static str {
        match self {
            ApiError::Validation { .. } => "execution_params_validation_error",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Unavailable(_) => "service_unavailable",
            ApiError::Upstream(_) => "upstream_error",
            ApiError::Internal(_) => "general_logic_error",
        }
    }

    pub fn to_body(&self) -> Envelope<ErrorData> {
        let loc = match self {
            ApiError::Validation { loc, .. } => loc.clone(),
            _ => None,
        };
        Envelope::new(ErrorData {
            message: self.to_string(),
            error_key: Some(self.error_key().to_string()),
            error_loc: loc,
        })
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        if self.status().code >= 500 {
            tracing::error!(error_key = self.error_key(), "request failed: {}", self);
        } else {
            tracing::debug!(error_key = self.error_key(), "request rejected: {}", self);
        }
        (self.status(), Json(self.to_body())).respond_to(req)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => ApiError::NotFound(e.to_string()),
            StoreError::AlreadyExists(_) => ApiError::Conflict(e.to_string()),
            StoreError::Validation { ref field, .. } => ApiError::Validation {
                loc: Some(vec!["body".to_string(), field.to_string()]),
                message: e.to_string(),
            },
            StoreError::Database(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(format!("{e:#}"))
    }
}

impl From<RagError> for ApiError {
    fn from(e: RagError) -> Self {
        match e {
            RagError::EmptyQuestion => ApiError::Validation {
                message: e.to_string(),
                loc: Some(vec!["body".to_string(), "prompt".to_string()]),
            },
            RagError::EmptyIndex => ApiError::Unavailable(e.to_string()),
            RagError::Embedding(_) => ApiError::Internal(e.to_string()),
            RagError::Generation(_) => ApiError::Upstream(e.to_string()),
        }
    }
}
