//! RPC Manager Module
//!
//! Solana JSON-RPC transport for the submission engine, plus the error
//! classification shared by every read-only collaborator.

pub mod rpc_errors;
pub mod rpc_transport;

// Re-exports for convenience
pub use rpc_errors::{custom_error_code, TransportError};
pub use rpc_transport::RpcTransport;
