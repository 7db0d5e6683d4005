// src/error.rs
//! Error taxonomy for the ingestion pipeline.
//!
//! Per-message failures (`ParseError`) are contained to that message; the
//! cycle-level variants (`CycleError`) abort a whole poll cycle and are
//! retried on the next tick. "Not a transaction" is deliberately NOT here —
//! it is a classification outcome (`extract::Outcome::NotATransaction`), so
//! callers cannot mistake it for a failure.

use thiserror::Error;

/// A rule matched the message's subject but the body or date did not have the
/// expected shape. Surfaces template drift; the cursor is not advanced past
/// the message, so it is retried next cycle.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The amount pattern captured something that is not a number.
    #[error("failed to parse amount {capture:?}: {source}")]
    BadAmount {
        capture: String,
        source: std::num::ParseFloatError,
    },

    /// The body matched neither the amount nor the description shape the
    /// rule expects.
    #[error("failed to parse transaction details: amount: {amount}, description: {description:?}")]
    MissingFields { amount: f64, description: String },

    /// The `Date:` header could not be parsed as an email date.
    #[error("failed to parse date {raw:?}")]
    BadDate { raw: String },
}

/// Cursor store failures. A missing backing file is NOT an error (fresh
/// start); anything else means the slot is unreadable or corrupt and the
/// cycle must not run against a guessed cursor.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("could not read cursor state from {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("cursor state at {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        source: serde_json::Error,
    },
}

/// Failures that abort an entire poll cycle. The cursor is left unchanged
/// (beyond what was already advanced in memory) and the cycle is retried on
/// the next scheduled tick.
#[derive(Debug, Error)]
pub enum CycleError {
    /// Mailbox or credential refresh is unreachable/rejecting. Transport
    /// failures from collaborators arrive as `anyhow::Error` by contract.
    #[error("transport failure: {0:#}")]
    Transport(#[from] anyhow::Error),

    #[error(transparent)]
    State(#[from] StateError),

    /// The stored cursor id was not found in the fetched page: more than a
    /// page of messages arrived since the last successful run.
    #[error("last message id not found in fetched page: {id}")]
    CursorOutOfWindow { id: String },
}
