//! Error types for the receipt and print-dispatch subsystem.

use thiserror::Error;

/// Failure taxonomy for the print path.
///
/// Every broker-path failure is caught by the dispatcher and converted into
/// a fallback invocation; none of these variants is fatal to the host.
#[derive(Debug, Error)]
pub enum PrintError {
    /// The broker client library could not be obtained.
    #[error("broker library load failed: {0}")]
    ScriptLoad(String),

    /// The broker refused the connection (not running, or trust rejected).
    #[error("broker connection rejected: {0}")]
    ConnectionRejected(String),

    /// No usable printer could be resolved through the broker.
    #[error("printer not found: {0}")]
    PrinterNotFound(String),

    /// The job was built but could not be handed to the broker.
    #[error("print dispatch failed: {0}")]
    Dispatch(String),

    /// The order feed could not be fetched or parsed.
    #[error("order feed fetch failed: {0}")]
    FeedFetch(String),

    /// The print-settings store failed to read or write.
    #[error("settings store: {0}")]
    Settings(String),
}

/// Result type for print operations.
pub type PrintResult<T> = Result<T, PrintError>;
