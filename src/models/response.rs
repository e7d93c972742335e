//! Uniform response envelope returned by public fetch operations.

use serde::Serialize;

/// Outcome flag of a [`Response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failed,
}

/// Request parameters echoed back alongside the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metadata {
    pub exchange: String,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numb_candles: Option<usize>,
}

/// `{status, data, metadata, error}` envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response<T> {
    pub status: Status,
    pub data: Option<T>,
    pub metadata: Metadata,
    pub error: Option<String>,
}

impl<T> Response<T> {
    /// Wraps a successful result.
    pub fn success(data: T, metadata: Metadata) -> Self {
        Self {
            status: Status::Success,
            data: Some(data),
            metadata,
            error: None,
        }
    }

    /// Wraps a failure message; `data` is always `None`.
    pub fn failed(error: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            status: Status::Failed,
            data: None,
            metadata,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}
