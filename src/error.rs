use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("{0}")]
    BadRequest(String),
    #[error("Insufficient balance. Fund the chat to continue.")]
    InsufficientBalance,
    #[error("bad gateway: {0}")]
    BadGateway(String),
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = match self {
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Unauthorized => StatusCode::UNAUTHORIZED,
            ChatError::Forbidden => StatusCode::FORBIDDEN,
            ChatError::BadRequest(_) | ChatError::InsufficientBalance => StatusCode::BAD_REQUEST,
            ChatError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ChatError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!(?self);
        (status, self.to_string()).into_response()
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
