// src/extract.rs
//! Transaction extraction: an ordered registry of per-bank rules.
//!
//! A rule is declarative data — a subject fragment that classifies the
//! message plus two capture-group patterns for the amount and the
//! description. New bank templates are added by appending a rule, not by
//! touching control flow.
//!
//! The registry is order-sensitive: the FIRST rule whose subject fragment
//! appears in the message subject is selected, so rules must use distinct,
//! non-overlapping subject fragments. Keep that in mind when adding rules.

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc2822;
use time::macros::format_description;

use crate::error::ParseError;
use crate::model::{Message, Transaction};

pub const DEFAULT_RULES_PATH: &str = "config/rules.toml";
pub const ENV_RULES_PATH: &str = "BANKMAIL_RULES_PATH";

/// Classification result. "Not a transaction" is a first-class outcome, not
/// an error: the message was seen and disposed of, with nothing to forward.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Transaction(Transaction),
    NotATransaction,
}

/// One bank's email template: subject classifier + amount/description
/// capture patterns.
#[derive(Debug)]
pub struct Rule {
    pub name: String,
    subject_contains: String,
    amount_re: Regex,
    description_re: Regex,
}

impl Rule {
    pub fn new(
        name: &str,
        subject_contains: &str,
        amount_pattern: &str,
        description_pattern: &str,
    ) -> Result<Self> {
        let amount_re = Regex::new(amount_pattern)
            .map_err(|e| anyhow!("rule `{name}` amount regex error: {e}"))?;
        let description_re = Regex::new(description_pattern)
            .map_err(|e| anyhow!("rule `{name}` description regex error: {e}"))?;
        Ok(Self {
            name: name.to_string(),
            subject_contains: subject_contains.to_string(),
            amount_re,
            description_re,
        })
    }

    fn matches_subject(&self, subject: &str) -> bool {
        subject.contains(&self.subject_contains)
    }

    fn parse(&self, msg: &Message) -> Result<Transaction, ParseError> {
        let mut amount = 0.0f64;
        if let Some(caps) = self.amount_re.captures(&msg.body) {
            if let Some(m) = caps.get(1) {
                amount = m.as_str().parse::<f64>().map_err(|e| ParseError::BadAmount {
                    capture: m.as_str().to_string(),
                    source: e,
                })?;
            }
        }

        // Alternation patterns may populate different groups depending on
        // which branch matched; take the first non-empty one.
        let mut description = String::new();
        if let Some(caps) = self.description_re.captures(&msg.body) {
            for i in 1..caps.len() {
                if let Some(m) = caps.get(i) {
                    if !m.as_str().is_empty() {
                        description = m.as_str().trim().to_string();
                        break;
                    }
                }
            }
        }

        if amount == 0.0 || description.is_empty() {
            return Err(ParseError::MissingFields {
                amount,
                description,
            });
        }

        Ok(Transaction {
            amount,
            description,
            transaction_date: normalize_date(&msg.date)?,
        })
    }
}

/// Strip an optional trailing parenthesized timezone-name annotation (e.g.
/// `"(IST)"`), parse the remainder as an RFC 2822 email date, and reformat
/// to canonical `YYYY-MM-DD`.
pub fn normalize_date(raw: &str) -> Result<String, ParseError> {
    let cut = raw.find(" (").map_or(raw, |i| &raw[..i]);
    let parsed = time::OffsetDateTime::parse(cut.trim(), &Rfc2822).map_err(|_| {
        ParseError::BadDate {
            raw: raw.to_string(),
        }
    })?;
    parsed
        .format(format_description!("[year]-[month]-[day]"))
        .map_err(|_| ParseError::BadDate {
            raw: raw.to_string(),
        })
}

/* ----------------------------
Rules file schema (from TOML)
---------------------------- */

#[derive(Debug, Deserialize)]
struct RulesFile {
    rules: Vec<RuleCfg>,
}

#[derive(Debug, Deserialize)]
struct RuleCfg {
    name: String,
    subject_contains: String,
    /// Regex whose first capture group yields the numeric amount.
    amount: String,
    /// Regex whose first non-empty capture group yields the description.
    description: String,
}

/// The ordered rule registry. Registry order determines precedence: the
/// first subject match wins.
#[derive(Debug)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// The built-in bank templates.
    pub fn builtin() -> Self {
        let rules = vec![
            Rule::new(
                "hdfc_upi",
                "You have done a UPI txn",
                r"Rs\.(\d+(?:\.\d+)?) has been debited",
                r"to VPA\s+\S+\s+(.+?)\s+on\s+",
            ),
            Rule::new(
                "hdfc_credit_card",
                "debited via Credit Card",
                r"Rs\.(\d+(?:\.\d+)?) is debited from",
                r"towards\s+([^\s]+(?:\s+[^\s]+)*?)\s+on\s+",
            ),
            Rule::new(
                "dcb_debit",
                "DCB Bank email alert: Account debit intimation",
                r"INR\s+(\d+\.?\d*)\s+on",
                r"(?:at\s+VS/\d+/[\d:]+/(.+?)\s+\.|on account of (.+?)\.\s+Available)",
            ),
        ];
        // Built-in patterns are fixed literals; a compile failure here is a
        // programming error, not an input error.
        Self {
            rules: rules
                .into_iter()
                .collect::<Result<Vec<_>>>()
                .expect("built-in rules compile"),
        }
    }

    /// Load a registry from a TOML document. Rule order in the file is the
    /// precedence order.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let file: RulesFile = toml::from_str(toml_str).context("parsing rules toml")?;
        let rules = file
            .rules
            .iter()
            .map(|r| Rule::new(&r.name, &r.subject_contains, &r.amount, &r.description))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading rules from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Resolve the registry the way config files are resolved elsewhere:
    /// 1) $BANKMAIL_RULES_PATH (must exist if set)
    /// 2) config/rules.toml
    /// 3) built-in templates
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_RULES_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::from_file(&pb);
            }
            return Err(anyhow!("BANKMAIL_RULES_PATH points to non-existent path"));
        }
        let default = PathBuf::from(DEFAULT_RULES_PATH);
        if default.exists() {
            return Self::from_file(&default);
        }
        Ok(Self::builtin())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Classify and extract. The first rule whose subject fragment matches
    /// is applied; no match yields `Outcome::NotATransaction`.
    pub fn extract(&self, msg: &Message) -> Result<Outcome, ParseError> {
        for rule in &self.rules {
            if rule.matches_subject(&msg.subject) {
                return rule.parse(msg).map(Outcome::Transaction);
            }
        }
        Ok(Outcome::NotATransaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(subject: &str, body: &str) -> Message {
        Message {
            subject: subject.to_string(),
            from: "alerts@bank.example".to_string(),
            date: "Fri, 14 Nov 2025 20:59:28 +0530 (IST)".to_string(),
            body: body.to_string(),
        }
    }

    fn expect_txn(out: Result<Outcome, ParseError>) -> Transaction {
        match out.expect("no parse error") {
            Outcome::Transaction(t) => t,
            Outcome::NotATransaction => panic!("expected a transaction"),
        }
    }

    #[test]
    fn upi_debit_extracts_amount_and_vendor() {
        let rules = RuleSet::builtin();
        let m = msg(
            "You have done a UPI txn on your HDFC Bank account",
            "Dear Customer, Rs.250.00 has been debited from account 1234 \
             to VPA foo@bank John Doe on 01-01-24. Reference number 999.",
        );
        let t = expect_txn(rules.extract(&m));
        assert!((t.amount - 250.00).abs() < f64::EPSILON);
        assert_eq!(t.description, "John Doe");
        assert_eq!(t.transaction_date, "2025-11-14");
    }

    #[test]
    fn credit_card_debit_extracts_merchant() {
        let rules = RuleSet::builtin();
        let m = msg(
            "Alert: you have been debited via Credit Card",
            "Rs.1549.50 is debited from your HDFC Bank Credit Card towards Amazon Pay India on 01-01-24.",
        );
        let t = expect_txn(rules.extract(&m));
        assert!((t.amount - 1549.50).abs() < f64::EPSILON);
        assert_eq!(t.description, "Amazon Pay India");
    }

    #[test]
    fn dcb_pos_branch_populates_first_group() {
        let rules = RuleSet::builtin();
        let m = msg(
            "DCB Bank email alert: Account debit intimation",
            "Your account is debited with INR 500.00 on 14-11-25 at VS/123456/11:20/AMAZON . Ref 1.",
        );
        let t = expect_txn(rules.extract(&m));
        assert!((t.amount - 500.00).abs() < f64::EPSILON);
        assert_eq!(t.description, "AMAZON");
    }

    #[test]
    fn dcb_account_of_branch_populates_second_group() {
        let rules = RuleSet::builtin();
        let m = msg(
            "DCB Bank email alert: Account debit intimation",
            "Your account is debited with INR 250 on 14-11-25 on account of ATM Withdrawal. Available balance is INR 9000.",
        );
        let t = expect_txn(rules.extract(&m));
        assert!((t.amount - 250.0).abs() < f64::EPSILON);
        assert_eq!(t.description, "ATM Withdrawal");
    }

    #[test]
    fn unmatched_subject_is_not_a_transaction() {
        let rules = RuleSet::builtin();
        let m = msg("Your monthly statement is ready", "Rs.250.00 has been debited");
        assert_eq!(rules.extract(&m).unwrap(), Outcome::NotATransaction);
    }

    #[test]
    fn matched_subject_without_amount_is_a_parse_error() {
        let rules = RuleSet::builtin();
        let m = msg(
            "You have done a UPI txn on your account",
            "Dear Customer, your request to VPA foo@bank John Doe on 01-01-24 was received.",
        );
        let err = rules.extract(&m).unwrap_err();
        match err {
            ParseError::MissingFields { amount, .. } => assert_eq!(amount, 0.0),
            other => panic!("expected MissingFields, got {other:?}"),
        }
    }

    #[test]
    fn matched_subject_without_description_is_a_parse_error() {
        let rules = RuleSet::builtin();
        let m = msg(
            "You have done a UPI txn on your account",
            "Rs.99.00 has been debited from your account.",
        );
        let err = rules.extract(&m).unwrap_err();
        match err {
            ParseError::MissingFields { description, .. } => assert!(description.is_empty()),
            other => panic!("expected MissingFields, got {other:?}"),
        }
    }

    #[test]
    fn non_numeric_amount_capture_is_a_parse_error() {
        let rule = Rule::new("custom", "txn", r"amount (\S+) charged", r"by (.+?)\s").unwrap();
        let rules = RuleSet { rules: vec![rule] };
        let m = msg("txn alert", "amount twelve charged by Someone today");
        assert!(matches!(
            rules.extract(&m).unwrap_err(),
            ParseError::BadAmount { .. }
        ));
    }

    #[test]
    fn description_is_trimmed() {
        let rule = Rule::new("custom", "txn", r"Rs\.(\d+)", r"desc:(.*)").unwrap();
        let rules = RuleSet { rules: vec![rule] };
        let m = msg("txn alert", "Rs.10 spent, desc:  spaced out  ");
        let t = expect_txn(rules.extract(&m));
        assert_eq!(t.description, "spaced out");
    }

    #[test]
    fn first_subject_match_wins() {
        let a = Rule::new("broad", "debit", r"A (\d+)", r"A-(\w+)").unwrap();
        let b = Rule::new("narrow", "debit alert", r"B (\d+)", r"B-(\w+)").unwrap();
        let rules = RuleSet { rules: vec![a, b] };
        // Subject matches both fragments; the earlier rule must be applied.
        let m = msg("debit alert from bank", "A 5 A-first B 7 B-second");
        let t = expect_txn(rules.extract(&m));
        assert_eq!(t.description, "first");
        assert!((t.amount - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn date_with_timezone_annotation_normalizes() {
        let d = normalize_date("Fri, 14 Nov 2025 20:59:28 +0530 (IST)").unwrap();
        assert_eq!(d, "2025-11-14");
    }

    #[test]
    fn date_without_annotation_normalizes() {
        let d = normalize_date("Mon, 2 Jan 2023 09:05:00 +0000").unwrap();
        assert_eq!(d, "2023-01-02");
    }

    #[test]
    fn unparseable_date_is_a_parse_error() {
        assert!(matches!(
            normalize_date("yesterday, more or less"),
            Err(ParseError::BadDate { .. })
        ));
    }

    #[test]
    fn rules_load_from_toml_in_file_order() {
        let doc = r#"
[[rules]]
name = "first"
subject_contains = "alert"
amount = 'X (\d+)'
description = 'X-(\w+)'

[[rules]]
name = "second"
subject_contains = "alert from bank"
amount = 'Y (\d+)'
description = 'Y-(\w+)'
"#;
        let rules = RuleSet::from_toml_str(doc).unwrap();
        assert_eq!(rules.len(), 2);
        let m = msg("alert from bank", "X 1 X-one Y 2 Y-two");
        let t = expect_txn(rules.extract(&m));
        assert_eq!(t.description, "one");
    }

    #[serial_test::serial]
    #[test]
    fn load_default_uses_env_then_fallbacks() {
        use std::{env, fs};

        // Isolate CWD in a temp dir so a real config/ in the repo does not
        // interfere.
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();

        env::remove_var(ENV_RULES_PATH);

        // No files in the temp CWD → built-ins.
        let rules = RuleSet::load_default().unwrap();
        assert_eq!(rules.len(), 3);

        // Env takes precedence.
        let p = tmp.path().join("rules.toml");
        fs::write(
            &p,
            r#"
[[rules]]
name = "only"
subject_contains = "x"
amount = '(\d+)'
description = '(\w+)'
"#,
        )
        .unwrap();
        env::set_var(ENV_RULES_PATH, p.display().to_string());
        let rules = RuleSet::load_default().unwrap();
        assert_eq!(rules.len(), 1);
        env::remove_var(ENV_RULES_PATH);

        // Restore CWD.
        env::set_current_dir(&old).unwrap();
    }

    #[test]
    fn bad_rule_regex_names_the_rule() {
        let doc = r#"
[[rules]]
name = "broken"
subject_contains = "x"
amount = '('
description = 'y'
"#;
        let err = RuleSet::from_toml_str(doc).unwrap_err();
        assert!(err.to_string().contains("broken"), "got: {err}");
    }
}
