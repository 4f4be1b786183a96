//! RPC error taxonomy
//!
//! Every failure a handler can produce ends up as an [`RpcError`]. The kind
//! decides the JSON-RPC code and the HTTP status; the message is what the
//! client sees.

use axum::http::StatusCode;
use sidecar_ast::ParseError;
use sidecar_duck::{StoreError, StoreErrorKind};
use sidecar_ir::DataError;
use thiserror::Error;

use crate::txn::TxError;

/// Standard JSON-RPC error codes plus the sidecar's server-defined range
pub struct ErrorCodes;

impl ErrorCodes {
    /// Parse error - invalid JSON
    pub const PARSE_ERROR: i32 = -32700;
    /// Not a valid request object
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const MALFORMED_QUERY: i32 = -32001;
    pub const UNSUPPORTED_OPERATION: i32 = -32002;
    pub const STORE_UNAVAILABLE: i32 = -32003;
    pub const NOT_FOUND: i32 = -32004;
    pub const CONFLICT: i32 = -32005;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MethodNotFound,
    InvalidParams,
    MalformedQuery,
    UnsupportedOperation,
    NotFound,
    /// Concurrent write conflict or an aborted transaction
    Conflict,
    StoreUnavailable,
    Internal,
}

impl ErrorKind {
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::MethodNotFound => ErrorCodes::METHOD_NOT_FOUND,
            ErrorKind::InvalidParams => ErrorCodes::INVALID_PARAMS,
            ErrorKind::MalformedQuery => ErrorCodes::MALFORMED_QUERY,
            ErrorKind::UnsupportedOperation => ErrorCodes::UNSUPPORTED_OPERATION,
            ErrorKind::NotFound => ErrorCodes::NOT_FOUND,
            ErrorKind::Conflict => ErrorCodes::CONFLICT,
            ErrorKind::StoreUnavailable => ErrorCodes::STORE_UNAVAILABLE,
            ErrorKind::Internal => ErrorCodes::INTERNAL_ERROR,
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::MethodNotFound | ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidParams
            | ErrorKind::MalformedQuery
            | ErrorKind::UnsupportedOperation => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Metric label
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::MethodNotFound => "method_not_found",
            ErrorKind::InvalidParams => "invalid_params",
            ErrorKind::MalformedQuery => "malformed_query",
            ErrorKind::UnsupportedOperation => "unsupported_operation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::Internal => "internal",
        }
    }

    /// Kinds whose detail stays in the server log
    fn is_opaque(self) -> bool {
        matches!(self, ErrorKind::StoreUnavailable | ErrorKind::Internal)
    }
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct RpcError {
    pub kind: ErrorKind,
    pub message: String,
    /// Full cause for opaque kinds; logged, never sent
    pub detail: Option<String>,
}

impl RpcError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParams, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(ErrorKind::MethodNotFound, format!("Method not found: {method}"))
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::opaque(ErrorKind::Internal, detail.into())
    }

    fn opaque(kind: ErrorKind, detail: String) -> Self {
        let message = match kind {
            ErrorKind::StoreUnavailable => "Store unavailable",
            _ => "Internal error",
        };
        Self {
            kind,
            message: message.to_string(),
            detail: Some(detail),
        }
    }

    pub fn code(&self) -> i32 {
        self.kind.code()
    }

    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }

    /// Log at the level the kind deserves
    pub fn log(&self, method: &str) {
        if self.kind.is_opaque() {
            tracing::error!(
                method,
                kind = self.kind.as_str(),
                detail = self.detail.as_deref().unwrap_or(&self.message),
                "rpc failed"
            );
        } else {
            tracing::warn!(method, kind = self.kind.as_str(), error = %self.message, "rpc rejected");
        }
    }
}

impl From<ParseError> for RpcError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::Unsupported(_) => Self::new(ErrorKind::UnsupportedOperation, e.to_string()),
            ParseError::ArgumentCount { .. } => Self::invalid_params(e.to_string()),
            ParseError::Syntax(_) | ParseError::Pest(_) => {
                Self::new(ErrorKind::MalformedQuery, e.to_string())
            }
        }
    }
}

impl From<StoreError> for RpcError {
    fn from(e: StoreError) -> Self {
        match e.kind() {
            StoreErrorKind::NotFound => Self::not_found(e.to_string()),
            StoreErrorKind::Rejected => Self::invalid_params(e.to_string()),
            StoreErrorKind::Conflict => Self::new(ErrorKind::Conflict, e.to_string()),
            StoreErrorKind::Unavailable => Self::opaque(ErrorKind::StoreUnavailable, e.to_string()),
            StoreErrorKind::Other => Self::internal(e.to_string()),
        }
    }
}

impl From<DataError> for RpcError {
    fn from(e: DataError) -> Self {
        Self::invalid_params(e.to_string())
    }
}

impl From<TxError> for RpcError {
    fn from(e: TxError) -> Self {
        match e {
            TxError::NotFound(_) => Self::not_found(e.to_string()),
            TxError::Store(inner) => inner.into(),
        }
    }
}
