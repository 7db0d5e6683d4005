// src/model.rs
//! Data contracts shared across the pipeline. No logic lives here.

use std::fmt;

/// A decoded email: headers of interest plus the best-effort plain-text body.
/// Produced once by the body decoder and treated as immutable downstream.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub subject: String,
    pub from: String,
    /// Raw `Date:` header value, e.g. "Fri, 14 Nov 2025 20:59:28 +0530 (IST)".
    pub date: String,
    pub body: String,
}

/// One extracted bank transaction, in the ledger's wire shape.
///
/// Invariant: `amount != 0.0` and `description` is non-empty and trimmed.
/// The extractor is the only producer and enforces both before handing a
/// value out.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Transaction {
    pub amount: f64,
    pub description: String,
    /// Canonical `YYYY-MM-DD`.
    pub transaction_date: String,
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Amount: {:.2}, Description: {}, Date: {}",
            self.amount, self.description, self.transaction_date
        )
    }
}
