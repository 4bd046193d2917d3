//! Error types for the core crate.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Address string could not be parsed.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Package id outside the known package table.
    #[error("Unknown package id: {0} (must be between 0 and 3)")]
    UnknownPackage(u8),

    /// Unknown epoch kind string.
    #[error("Unknown epoch kind: {0} (expected 'standard' or 'vip')")]
    UnknownEpochKind(String),

    /// Unknown stake status string.
    #[error("Unknown stake status: {0}")]
    UnknownStakeStatus(String),

    /// Integer amount could not be parsed.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

/// Result type alias for CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;
