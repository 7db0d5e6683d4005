// src/mailbox.rs
//! Mailbox collaborator boundary: the trait the poller consumes, the raw
//! payload types it hands to the decoder, and a fixture implementation for
//! tests/tools.

use anyhow::Result;
use std::collections::HashSet;
use std::sync::Mutex;

/// A single name/value header as delivered by the provider.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// One node of the provider's payload tree: a MIME-type tag plus either
/// inline base64url data, further sub-parts, or both.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct MessagePart {
    pub mime_type: String,
    /// Inline data in the provider's URL-safe, unpadded base64 variant.
    pub data: Option<String>,
    pub parts: Vec<MessagePart>,
}

/// A fetched message before decoding: headers plus the payload tree.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RawMessage {
    pub id: String,
    pub headers: Vec<Header>,
    pub payload: MessagePart,
}

impl RawMessage {
    /// Case-sensitive header lookup with the provider client's historical
    /// fallback: a missing header yields `"<Name> not found"`. A missing
    /// `Date` then fails date normalization downstream, which is the
    /// intended surfacing.
    pub fn header(&self, name: &str) -> String {
        self.headers
            .iter()
            .find(|h| h.name == name)
            .map(|h| h.value.clone())
            .unwrap_or_else(|| format!("{name} not found"))
    }
}

/// The mail provider, seen from the poller. Implementations own transport,
/// credentials, and refresh mechanics; all failures are transport-class.
#[async_trait::async_trait]
pub trait Mailbox: Send + Sync {
    /// Refresh the access credential if the provider requires it. A failure
    /// here stalls the whole pipeline and aborts the cycle.
    async fn refresh_access(&self) -> Result<()>;

    /// Ids of the most recent messages, newest first, at most `page_size`.
    async fn list_recent_ids(&self, page_size: u32) -> Result<Vec<String>>;

    /// Full content for one message.
    async fn fetch(&self, id: &str) -> Result<RawMessage>;
}

// --- Test helper ---

/// In-memory mailbox for tests/tools. Holds messages newest-first, like the
/// provider's listing order.
pub struct FixtureMailbox {
    messages: Mutex<Vec<RawMessage>>,
    fail_fetch: Mutex<HashSet<String>>,
}

impl FixtureMailbox {
    pub fn new(newest_first: Vec<RawMessage>) -> Self {
        Self {
            messages: Mutex::new(newest_first),
            fail_fetch: Mutex::new(HashSet::new()),
        }
    }

    /// Prepend a message, making it the newest in the mailbox.
    pub fn push_newest(&self, raw: RawMessage) {
        self.messages.lock().unwrap().insert(0, raw);
    }

    /// Make `fetch(id)` fail until cleared, to exercise retry paths.
    pub fn fail_fetch_of(&self, id: &str) {
        self.fail_fetch.lock().unwrap().insert(id.to_string());
    }

    pub fn clear_fetch_failures(&self) {
        self.fail_fetch.lock().unwrap().clear();
    }

    /// A single-part text/plain message with the body already transfer
    /// encoded the way the provider would deliver it.
    pub fn plain_message(id: &str, subject: &str, from: &str, date: &str, body: &str) -> RawMessage {
        RawMessage {
            id: id.to_string(),
            headers: vec![
                Header {
                    name: "Subject".into(),
                    value: subject.to_string(),
                },
                Header {
                    name: "From".into(),
                    value: from.to_string(),
                },
                Header {
                    name: "Date".into(),
                    value: date.to_string(),
                },
            ],
            payload: MessagePart {
                mime_type: "text/plain".into(),
                data: Some(crate::decode::encode_base64url(body.as_bytes())),
                parts: Vec::new(),
            },
        }
    }
}

#[async_trait::async_trait]
impl Mailbox for FixtureMailbox {
    async fn refresh_access(&self) -> Result<()> {
        Ok(())
    }

    async fn list_recent_ids(&self, page_size: u32) -> Result<Vec<String>> {
        let msgs = self.messages.lock().unwrap();
        Ok(msgs
            .iter()
            .take(page_size as usize)
            .map(|m| m.id.clone())
            .collect())
    }

    async fn fetch(&self, id: &str) -> Result<RawMessage> {
        if self.fail_fetch.lock().unwrap().contains(id) {
            anyhow::bail!("could not get message: {id}: injected failure");
        }
        let msgs = self.messages.lock().unwrap();
        msgs.iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("could not get message: {id}: not found"))
    }
}
