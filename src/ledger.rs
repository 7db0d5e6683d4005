// src/ledger.rs
//! Downstream ledger collaborator: the sink trait the poller consumes, the
//! HTTP client the binary wires in, and a recording double for tests/tools.

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::model::Transaction;

/// Where extracted transactions go. Failures are logged by the poller and
/// the message is retried next cycle; implementations must not panic.
#[async_trait::async_trait]
pub trait LedgerSink: Send + Sync {
    async fn submit(&self, txn: &Transaction) -> Result<()>;
}

/// HTTP client for the ledger's transactions endpoint.
#[derive(Clone)]
pub struct HttpLedgerClient {
    addr: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl HttpLedgerClient {
    pub fn new(addr: String) -> Self {
        Self {
            addr,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }
}

#[async_trait::async_trait]
impl LedgerSink for HttpLedgerClient {
    async fn submit(&self, txn: &Transaction) -> Result<()> {
        let url = format!("{}/api/transactions", self.addr);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&url)
                .timeout(self.timeout)
                .json(txn)
                .send()
                .await;

            match res {
                Ok(rsp) => {
                    if let Err(e) = rsp.error_for_status_ref() {
                        if attempt < self.max_retries {
                            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1)))
                                .await;
                            continue;
                        }
                        let body = rsp.text().await.unwrap_or_default();
                        return Err(anyhow!("ledger rejected transaction: {e}: {body}"));
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    return Err(e).context("ledger request failed");
                }
            }
        }
    }
}

// --- Test helper ---

/// Records submissions; can be told to fail the next N calls to exercise
/// the at-least-once retry path.
pub struct RecordingLedger {
    submitted: Mutex<Vec<Transaction>>,
    fail_next: AtomicU32,
}

impl RecordingLedger {
    pub fn new() -> Self {
        Self {
            submitted: Mutex::new(Vec::new()),
            fail_next: AtomicU32::new(0),
        }
    }

    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn submitted(&self) -> Vec<Transaction> {
        self.submitted.lock().unwrap().clone()
    }
}

impl Default for RecordingLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LedgerSink for RecordingLedger {
    async fn submit(&self, txn: &Transaction) -> Result<()> {
        if self.fail_next.load(Ordering::SeqCst) > 0 {
            self.fail_next.fetch_sub(1, Ordering::SeqCst);
            anyhow::bail!("injected ledger failure");
        }
        self.submitted.lock().unwrap().push(txn.clone());
        Ok(())
    }
}
