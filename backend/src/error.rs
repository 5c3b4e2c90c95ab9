use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

/// Error taxonomy for the negotiation core.
///
/// Authorization failures and validation failures map to distinct HTTP
/// statuses so clients can tell "you can't do that" from "bad input".
#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("caller is not a participant of this {0}")]
    NotAuthorized(&'static str),
    #[error("cannot open a conversation on your own listing")]
    SelfConversation,
    #[error("amount must be a positive number of cents")]
    InvalidAmount,
    #[error("offer is no longer pending")]
    AlreadyDecided,
    #[error("listing is already sold")]
    ListingAlreadySold,
    #[error("message body is empty")]
    EmptyMessage,
    #[error("a listing carries at most 5 images")]
    TooManyImages,
    #[error("stored record is invalid: {0}")]
    InvalidRecord(String),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("database connection error: {0}")]
    Connection(#[from] diesel::result::ConnectionError),
}

impl IntoResponse for MarketError {
    fn into_response(self) -> Response {
        let status = match self {
            MarketError::NotFound(_) => StatusCode::NOT_FOUND,
            MarketError::NotAuthorized(_) => StatusCode::FORBIDDEN,
            MarketError::SelfConversation
            | MarketError::InvalidAmount
            | MarketError::EmptyMessage
            | MarketError::TooManyImages => StatusCode::BAD_REQUEST,
            MarketError::AlreadyDecided | MarketError::ListingAlreadySold => StatusCode::CONFLICT,
            MarketError::InvalidRecord(_)
            | MarketError::Database(_)
            | MarketError::Connection(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("storage failure: {}", self);
            // don't leak storage internals to clients
            return (status, "internal error".to_string()).into_response();
        }
        (status, self.to_string()).into_response()
    }
}
