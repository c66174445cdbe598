//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts, stock accounting). Infrastructure concerns belong
/// elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Authorization failure at the domain boundary.
    #[error("unauthorized")]
    Unauthorized,

    /// An allocation or reservation asked for more than the pool can give.
    ///
    /// Carries enough detail for the caller to act: which variant, how much
    /// was requested, how much was actually available at decision time.
    #[error("insufficient stock for variant {variant}: requested {requested}, available {available}")]
    InsufficientStock {
        variant: String,
        requested: i64,
        available: i64,
    },

    /// An allocation to a sellable tier is missing a required price field.
    #[error("missing price for variant {variant}: {field} is required and must be positive")]
    MissingPrice { variant: String, field: &'static str },

    /// A remittance was attempted without a captured signature reference.
    #[error("missing signature: remittance requires a captured signature before any ledger mutation")]
    MissingSignature,

    /// A state machine was asked to make a transition its current state
    /// forbids (e.g. deciding an already-resolved request). Indicates stale
    /// client state; not recoverable by retry.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn insufficient_stock(
        variant: impl core::fmt::Display,
        requested: i64,
        available: i64,
    ) -> Self {
        Self::InsufficientStock {
            variant: variant.to_string(),
            requested,
            available,
        }
    }

    pub fn missing_price(variant: impl core::fmt::Display, field: &'static str) -> Self {
        Self::MissingPrice {
            variant: variant.to_string(),
            field,
        }
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition(msg.into())
    }
}
