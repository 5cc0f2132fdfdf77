//! # Catalog Errors
//!
//! Failure types at the two seams of the crate: talking to a store, and
//! driving the catalog screen.

use thiserror::Error;

/// An external store operation failed
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport-level failure (connect, TLS, body read)
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with a non-success status
    #[error("store responded with {status}: {body}")]
    Status { status: u16, body: String },

    /// A payload could not be encoded or decoded
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// Local database failure
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),

    /// The store closed the live listener (e.g. rules now deny reads)
    #[error("subscription cancelled by the store: {0}")]
    Cancelled(String),

    #[error("authentication failed: {0}")]
    Auth(String),
}

/// A catalog screen operation failed
#[derive(Debug, Error)]
pub enum ScreenError {
    /// Price text is not a non-negative integer
    #[error("invalid price {0:?}: expected a whole, non-negative number")]
    InvalidPrice(String),

    /// No entry with this id in the current list
    #[error("no product with id {0}")]
    UnknownEntry(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
