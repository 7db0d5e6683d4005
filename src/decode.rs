// src/decode.rs
//! Best-effort body decoding.
//!
//! The decoder's contract is partial success by design: a part that fails to
//! decode contributes no text, and the walk never aborts the pipeline. The
//! result is the best plain-text string we can produce, possibly empty.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;

use crate::mailbox::{MessagePart, RawMessage};
use crate::model::Message;

/// Decode the provider's URL-safe, unpadded base64 variant: re-pad to a
/// multiple of 4 with `=`, substitute `-`→`+` and `_`→`/`, then decode with
/// the standard alphabet. Already-padded input passes through unchanged.
pub fn decode_base64url(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let padding = (4 - data.len() % 4) % 4;
    let mut s = String::with_capacity(data.len() + padding);
    s.push_str(data);
    for _ in 0..padding {
        s.push('=');
    }
    let s = s.replace('-', "+").replace('_', "/");
    STANDARD.decode(s)
}

/// Inverse of [`decode_base64url`], producing the unpadded URL-safe form the
/// provider delivers. Used by fixtures and tests.
pub fn encode_base64url(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Walk the payload tree and accumulate a plain-text body.
///
/// The current part's own inline data is decoded and appended. Sub-parts are
/// scanned top-to-bottom: a `text/plain` sub-part that decodes replaces the
/// accumulated body (last plain-text part wins); any other sub-part recurses
/// and appends. Decode failures on an individual part are swallowed.
pub fn extract_body(payload: &MessagePart) -> String {
    let mut body = String::new();

    if let Some(data) = payload.data.as_deref() {
        if !data.is_empty() {
            if let Ok(bytes) = decode_base64url(data) {
                body.push_str(&String::from_utf8_lossy(&bytes));
            }
        }
    }

    for part in &payload.parts {
        if part.mime_type == "text/plain" {
            if let Some(data) = part.data.as_deref() {
                if !data.is_empty() {
                    if let Ok(bytes) = decode_base64url(data) {
                        body = String::from_utf8_lossy(&bytes).into_owned();
                    }
                }
            }
        } else {
            body.push_str(&extract_body(part));
        }
    }

    body
}

/// Build the canonical [`Message`] from a fetched raw message.
pub fn decode_message(raw: &RawMessage) -> Message {
    Message {
        subject: raw.header("Subject"),
        from: raw.header("From"),
        date: raw.header("Date"),
        body: extract_body(&raw.payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::Header;

    fn part(mime: &str, text: Option<&str>, parts: Vec<MessagePart>) -> MessagePart {
        MessagePart {
            mime_type: mime.to_string(),
            data: text.map(|t| encode_base64url(t.as_bytes())),
            parts,
        }
    }

    #[test]
    fn base64url_roundtrip_without_padding() {
        // "a" encodes to one unpadded char pair; exercise all pad widths
        for s in ["", "a", "ab", "abc", "abcd", "Rs.250.00 has been debited"] {
            let enc = encode_base64url(s.as_bytes());
            assert!(!enc.contains('='));
            assert_eq!(decode_base64url(&enc).unwrap(), s.as_bytes());
        }
    }

    #[test]
    fn base64url_substitutes_url_safe_alphabet() {
        // 0xfb 0xef encodes to "--8" in the URL-safe alphabet
        let enc = encode_base64url(&[0xfb, 0xef]);
        assert!(enc.contains('-') || enc.contains('_'));
        assert_eq!(decode_base64url(&enc).unwrap(), vec![0xfb, 0xef]);
    }

    #[test]
    fn base64url_accepts_already_padded_input() {
        assert_eq!(decode_base64url("aGVsbG8=").unwrap(), b"hello");
    }

    #[test]
    fn single_part_body_is_decoded() {
        let p = part("text/plain", Some("hello world"), vec![]);
        assert_eq!(extract_body(&p), "hello world");
    }

    #[test]
    fn plain_part_wins_over_html_sibling() {
        let p = part(
            "multipart/alternative",
            None,
            vec![
                part("text/html", Some("<html><b>Rs.10</b></html>"), vec![]),
                part("text/plain", Some("Rs.10 debited"), vec![]),
            ],
        );
        assert_eq!(extract_body(&p), "Rs.10 debited");
    }

    #[test]
    fn plain_part_replaces_accumulated_html_even_when_listed_first() {
        let p = part(
            "multipart/alternative",
            None,
            vec![
                part("text/plain", Some("plain body"), vec![]),
                part("text/html", Some("<p>html body</p>"), vec![]),
            ],
        );
        // html sibling appends after the replacement; plain content is kept
        assert!(extract_body(&p).starts_with("plain body"));
    }

    #[test]
    fn last_plain_part_wins() {
        let p = part(
            "multipart/mixed",
            None,
            vec![
                part("text/plain", Some("first"), vec![]),
                part("text/plain", Some("second"), vec![]),
            ],
        );
        assert_eq!(extract_body(&p), "second");
    }

    #[test]
    fn nested_multipart_is_walked() {
        let inner = part(
            "multipart/alternative",
            None,
            vec![part("text/plain", Some("nested text"), vec![])],
        );
        let p = part("multipart/mixed", None, vec![inner]);
        assert_eq!(extract_body(&p), "nested text");
    }

    #[test]
    fn undecodable_part_contributes_nothing() {
        let mut bad = part("text/plain", None, vec![]);
        bad.data = Some("!!!not base64!!!".to_string());
        let p = part(
            "multipart/mixed",
            None,
            vec![bad, part("text/html", Some("fallback"), vec![])],
        );
        assert_eq!(extract_body(&p), "fallback");
    }

    #[test]
    fn empty_payload_yields_empty_body() {
        let p = part("text/plain", None, vec![]);
        assert_eq!(extract_body(&p), "");
    }

    #[test]
    fn decode_message_extracts_headers_with_fallback() {
        let raw = RawMessage {
            id: "m1".into(),
            headers: vec![Header {
                name: "Subject".into(),
                value: "hello".into(),
            }],
            payload: part("text/plain", Some("body"), vec![]),
        };
        let msg = decode_message(&raw);
        assert_eq!(msg.subject, "hello");
        assert_eq!(msg.from, "From not found");
        assert_eq!(msg.date, "Date not found");
        assert_eq!(msg.body, "body");
    }
}
