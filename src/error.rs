// src/error.rs
use crate::db::StorageError;
use crate::market::lookup::LookupError;
use crate::market_client::ClientError;
use thiserror::Error;
use warp::http::StatusCode;
use warp::reject::Reject;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown sort property: {0}")]
pub struct UnknownSortProperty(pub String);

/// Service level failures surfaced to HTTP callers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("No market data found. Check if stock symbols fetched properly.")]
    NoMarketData,

    #[error("Symbols are not valid. Given symbols are '{0}'")]
    InvalidSymbols(String),

    #[error(transparent)]
    UnknownSortProperty(#[from] UnknownSortProperty),

    #[error("{resource} not found with {field} : '{value}'")]
    ResourceNotFound {
        resource: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("{resource} not deleted with {field} : '{value}'")]
    ResourceNotDeleted {
        resource: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("User could not found.")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("Market data service failure: {0}")]
    MarketDataUnavailable(String),

    #[error("Portfolio values are out of range for stock symbol '{0}'")]
    ValueOutOfRange(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AppError {
    pub fn not_found(resource: &'static str, field: &'static str, value: impl Into<String>) -> Self {
        AppError::ResourceNotFound {
            resource,
            field,
            value: value.into(),
        }
    }

    pub fn not_deleted(
        resource: &'static str,
        field: &'static str,
        value: impl Into<String>,
    ) -> Self {
        AppError::ResourceNotDeleted {
            resource,
            field,
            value: value.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NoMarketData => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidSymbols(_) => StatusCode::BAD_REQUEST,
            AppError::UnknownSortProperty(_) => StatusCode::BAD_REQUEST,
            AppError::ResourceNotFound { .. } => StatusCode::NO_CONTENT,
            AppError::ResourceNotDeleted { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::MarketDataUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ValueOutOfRange(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<LookupError> for AppError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::NoMarketData => AppError::NoMarketData,
            LookupError::InvalidSymbols(given) => AppError::InvalidSymbols(given),
        }
    }
}

impl From<ClientError> for AppError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::InvalidSymbols(given) => AppError::InvalidSymbols(given),
            other => AppError::MarketDataUnavailable(other.to_string()),
        }
    }
}

/// An `AppError` together with the request path it occurred on.
#[derive(Debug)]
pub struct ApiRejection {
    pub error: AppError,
    pub path: String,
}

impl Reject for ApiRejection {}

pub fn reject(error: AppError, path: &str) -> warp::Rejection {
    warp::reject::custom(ApiRejection {
        error,
        path: path.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_http_status() {
        assert_eq!(AppError::NoMarketData.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            AppError::InvalidSymbols("X,Y".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(UnknownSortProperty("foo".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::not_found("Stocks", "userId", "u1").status(),
            StatusCode::NO_CONTENT
        );
    }

    #[test]
    fn messages_name_the_offending_input() {
        let err = AppError::from(UnknownSortProperty("volume".into()));
        assert_eq!(err.to_string(), "Unknown sort property: volume");

        let err = AppError::not_found("Transactions", "userId", "u1");
        assert_eq!(err.to_string(), "Transactions not found with userId : 'u1'");
    }

    #[test]
    fn client_invalid_symbols_stays_a_client_error() {
        let err = AppError::from(ClientError::InvalidSymbols("A,B".into()));
        assert!(matches!(err, AppError::InvalidSymbols(ref s) if s == "A,B"));

        let err = AppError::from(ClientError::Timeout);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
