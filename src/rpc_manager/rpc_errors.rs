use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_rpc_client_api::request::{RpcError, RpcResponseErrorData};
use thiserror::Error;

/// RPC transport error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Transport-level errors (network, connection)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    /// Timeout errors
    #[error("Timeout after {timeout_ms}ms (endpoint: {endpoint})")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// RPC response errors (from the RPC server)
    #[error("RPC response error: {message} (endpoint: {endpoint}, code: {code:?})")]
    RpcResponse {
        endpoint: String,
        message: String,
        code: Option<i64>,
    },

    /// Rate limit exceeded
    #[error("Rate limit exceeded (endpoint: {endpoint})")]
    RateLimitExceeded { endpoint: String },

    #[error("Blockhash not found (endpoint: {endpoint})")]
    BlockhashNotFound { endpoint: String },

    /// Node-side preflight simulation refused the transaction
    #[error("Preflight rejected: {message} (endpoint: {endpoint})")]
    PreflightRejected {
        endpoint: String,
        message: String,
        logs: Vec<String>,
    },

    /// Account data could not be decoded
    #[error("Decode error for {account}: {message}")]
    Decode { account: String, message: String },
}

impl TransportError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Transport { .. } => true,
            TransportError::Timeout { .. } => true,
            TransportError::RateLimitExceeded { .. } => true,
            TransportError::BlockhashNotFound { .. } => true,

            TransportError::PreflightRejected { .. } => false,
            TransportError::Decode { .. } => false,

            // Retry on server errors (5xx)
            TransportError::RpcResponse { code, .. } => {
                matches!(code, Some(c) if (500..600).contains(c))
            }
        }
    }

    /// Get the endpoint associated with this error, if any
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            TransportError::Transport { endpoint, .. } => Some(endpoint),
            TransportError::Timeout { endpoint, .. } => Some(endpoint),
            TransportError::RpcResponse { endpoint, .. } => Some(endpoint),
            TransportError::RateLimitExceeded { endpoint } => Some(endpoint),
            TransportError::BlockhashNotFound { endpoint } => Some(endpoint),
            TransportError::PreflightRejected { endpoint, .. } => Some(endpoint),
            TransportError::Decode { .. } => None,
        }
    }

    /// Create from ClientError with context
    pub fn from_client_error(err: ClientError, endpoint: &str) -> Self {
        // Preflight failures carry the simulation result; keep its logs
        if let ClientErrorKind::RpcError(RpcError::RpcResponseError {
            message,
            data: RpcResponseErrorData::SendTransactionPreflightFailure(result),
            ..
        }) = err.kind()
        {
            return TransportError::PreflightRejected {
                endpoint: endpoint.to_string(),
                message: message.clone(),
                logs: result.logs.clone().unwrap_or_default(),
            };
        }

        let err_str = err.to_string().to_lowercase();

        // Classify based on error message
        if err_str.contains("blockhash not found") {
            TransportError::BlockhashNotFound {
                endpoint: endpoint.to_string(),
            }
        } else if err_str.contains("rate limit")
            || err_str.contains("too many requests")
            || err_str.contains("429")
        {
            TransportError::RateLimitExceeded {
                endpoint: endpoint.to_string(),
            }
        } else if err_str.contains("timeout") || err_str.contains("timed out") {
            TransportError::Timeout {
                endpoint: endpoint.to_string(),
                timeout_ms: 0,
            }
        } else if err_str.contains("connection") || err_str.contains("error sending request") {
            TransportError::Transport {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        } else {
            // Extract error code if available
            let code = err_str
                .split("code:")
                .nth(1)
                .and_then(|s| s.split_whitespace().next())
                .and_then(|s| s.trim_end_matches(',').parse::<i64>().ok());

            TransportError::RpcResponse {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
                code,
            }
        }
    }
}

/// Extract a program's custom error code from a rendered transaction error
///
/// Matches both `Custom(6000)` (debug form) and
/// `custom program error: 0x1770` (display form).
pub fn custom_error_code(detail: &str) -> Option<u32> {
    if let Some(start) = detail.find("Custom(") {
        let digits: String = detail[start + "Custom(".len()..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        return digits.parse().ok();
    }
    if let Some(start) = detail.find("custom program error: 0x") {
        let hex: String = detail[start + "custom program error: 0x".len()..]
            .chars()
            .take_while(|c| c.is_ascii_hexdigit())
            .collect();
        return u32::from_str_radix(&hex, 16).ok();
    }
    None
}
