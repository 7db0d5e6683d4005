// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod config;
pub mod cursor;
pub mod decode;
pub mod error;
pub mod extract;
pub mod gmail;
pub mod health;
pub mod ledger;
pub mod mailbox;
pub mod metrics;
pub mod model;
pub mod poll;

// ---- Re-exports for stable public API ----
pub use crate::cursor::{Cursor, CursorStore};
pub use crate::error::{CycleError, ParseError, StateError};
pub use crate::extract::{Outcome, RuleSet};
pub use crate::health::Health;
pub use crate::ledger::{HttpLedgerClient, LedgerSink, RecordingLedger};
pub use crate::mailbox::{FixtureMailbox, Mailbox, RawMessage};
pub use crate::model::{Message, Transaction};
pub use crate::poll::{run_cycle, run_once, CycleReport};
