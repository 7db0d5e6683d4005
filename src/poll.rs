// src/poll.rs
//! Poll-cycle orchestration: fetch the page, bound the window by the cursor,
//! process oldest-to-newest, forward matches, advance and persist the cursor.
//!
//! One cycle at a time on a single task; sequencing is what makes per-message
//! cursor advancement correct.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cursor::{Cursor, CursorStore};
use crate::decode;
use crate::error::CycleError;
use crate::extract::{Outcome, RuleSet};
use crate::health::Health;
use crate::ledger::LedgerSink;
use crate::mailbox::Mailbox;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("poll_cycles_total", "Completed poll cycles.");
        describe_counter!("poll_cycle_errors_total", "Poll cycles aborted by an error.");
        describe_counter!(
            "poll_forwarded_total",
            "Transactions forwarded to the ledger."
        );
        describe_counter!(
            "poll_skipped_total",
            "Messages disposed of as not-a-transaction."
        );
        describe_counter!(
            "poll_parse_errors_total",
            "Messages whose rule matched but whose body/date shape did not."
        );
        describe_counter!("poll_forward_errors_total", "Ledger submission failures.");
        describe_counter!("poll_fetch_errors_total", "Message fetch failures.");
        describe_histogram!("poll_cycle_ms", "Poll cycle duration in milliseconds.");
        describe_gauge!("poll_last_run_ts", "Unix ts when the last cycle ran.");
    });
}

/// Short anonymized fingerprint for log lines; subjects and bodies are never
/// logged raw.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// What one cycle did, for logs and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Message summaries returned by the page fetch.
    pub fetched: usize,
    /// Messages newer than the cursor, i.e. actually processed.
    pub window: usize,
    pub forwarded: usize,
    pub skipped: usize,
    pub parse_failures: usize,
    pub forward_failures: usize,
    pub fetch_failures: usize,
}

/// Bound the processing window by the cursor. `ids` is newest-first, as
/// listed by the provider. An empty cursor takes the whole page; otherwise
/// only ids strictly newer than the cursor's position qualify. A set cursor
/// that is absent from the page means more than a page arrived since the
/// last successful run; the cycle must fail rather than guess.
fn processing_window<'a>(ids: &'a [String], cursor: &Cursor) -> Result<&'a [String], CycleError> {
    if cursor.is_empty() {
        return Ok(ids);
    }
    match ids.iter().position(|id| *id == cursor.last_message_id) {
        Some(i) => Ok(&ids[..i]),
        None => Err(CycleError::CursorOutOfWindow {
            id: cursor.last_message_id.clone(),
        }),
    }
}

/// Run one poll cycle against the given collaborators, advancing `cursor` in
/// memory as messages are disposed of. Persistence is the caller's job.
///
/// The window is processed oldest-to-newest so the cursor moves
/// monotonically through time. The first unresolved message (fetch failure,
/// parse error, or forwarding failure) ends the window: the cursor never
/// advances past it, and the remaining newer messages wait for the next
/// cycle, which bounds duplicate forwarding.
pub async fn run_cycle(
    mailbox: &dyn Mailbox,
    rules: &RuleSet,
    ledger: &dyn LedgerSink,
    cursor: &mut Cursor,
    page_size: u32,
) -> Result<CycleReport, CycleError> {
    ensure_metrics_described();

    mailbox.refresh_access().await?;

    let ids = mailbox.list_recent_ids(page_size).await?;
    let window = processing_window(&ids, cursor)?;

    let mut report = CycleReport {
        fetched: ids.len(),
        window: window.len(),
        ..CycleReport::default()
    };

    for id in window.iter().rev() {
        let raw = match mailbox.fetch(id).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(target: "poll", id = %id, error = ?e, "could not fetch message");
                counter!("poll_fetch_errors_total").increment(1);
                report.fetch_failures += 1;
                break;
            }
        };

        let msg = decode::decode_message(&raw);
        match rules.extract(&msg) {
            Ok(Outcome::NotATransaction) => {
                cursor.advance_to(id);
                counter!("poll_skipped_total").increment(1);
                report.skipped += 1;
            }
            Ok(Outcome::Transaction(txn)) => {
                info!(
                    target: "poll",
                    id = %id,
                    amount = txn.amount,
                    date = %txn.transaction_date,
                    "forwarding transaction"
                );
                match ledger.submit(&txn).await {
                    Ok(()) => {
                        cursor.advance_to(id);
                        counter!("poll_forwarded_total").increment(1);
                        report.forwarded += 1;
                    }
                    Err(e) => {
                        warn!(target: "poll", id = %id, error = ?e, "failed to forward transaction");
                        counter!("poll_forward_errors_total").increment(1);
                        report.forward_failures += 1;
                        break;
                    }
                }
            }
            Err(e) => {
                // Template drift: the rule matched the subject but not the
                // body/date shape. Surface it and retry next cycle.
                warn!(
                    target: "poll",
                    id = %id,
                    subject_fp = %anon_hash(&msg.subject),
                    error = %e,
                    "failed to parse transaction"
                );
                counter!("poll_parse_errors_total").increment(1);
                report.parse_failures += 1;
                break;
            }
        }
    }

    gauge!("poll_last_run_ts").set(chrono::Utc::now().timestamp().max(0) as f64);
    Ok(report)
}

/// Load the cursor, run one cycle, persist the cursor, record health.
/// The cursor is persisted once per cycle regardless of per-message
/// failures; a save failure is reported but does not fail the cycle.
pub async fn run_once(
    mailbox: &dyn Mailbox,
    rules: &RuleSet,
    ledger: &dyn LedgerSink,
    store: &CursorStore,
    health: &Health,
    page_size: u32,
) -> Result<CycleReport, CycleError> {
    let mut cursor = match store.load() {
        Ok(cursor) => cursor,
        Err(e) => {
            health.record_failure(e.to_string());
            return Err(e.into());
        }
    };

    let result = run_cycle(mailbox, rules, ledger, &mut cursor, page_size).await;

    if let Err(e) = store.save(&cursor) {
        warn!(target: "poll", error = %e, "could not persist cursor");
    }

    match &result {
        Ok(report) => {
            health.record_success();
            counter!("poll_cycles_total").increment(1);
            info!(
                target: "poll",
                fetched = report.fetched,
                window = report.window,
                forwarded = report.forwarded,
                skipped = report.skipped,
                parse_failures = report.parse_failures,
                "poll cycle complete"
            );
        }
        Err(e) => {
            health.record_failure(e.to_string());
            counter!("poll_cycle_errors_total").increment(1);
            warn!(target: "poll", error = %e, "poll cycle failed, will be retried");
        }
    }

    result
}

/// Spawn the background loop: one cycle per tick, cycles never overlap.
pub fn spawn_poll_loop(
    mailbox: Arc<dyn Mailbox>,
    rules: Arc<RuleSet>,
    ledger: Arc<dyn LedgerSink>,
    store: CursorStore,
    health: Health,
    interval: std::time::Duration,
    page_size: u32,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let t0 = std::time::Instant::now();
            let _ = run_once(
                mailbox.as_ref(),
                &rules,
                ledger.as_ref(),
                &store,
                &health,
                page_size,
            )
            .await;
            histogram!("poll_cycle_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        }
    })
}
