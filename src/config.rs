// src/config.rs
//! Process configuration from environment variables (a `.env` file is
//! loaded by the binary before this runs). Every knob has a default so a
//! bare `bankmail` starts against localhost.

use std::path::PathBuf;
use std::time::Duration;

pub const ENV_POLL_INTERVAL_SECS: &str = "BANKMAIL_POLL_INTERVAL_SECS";
pub const ENV_PAGE_SIZE: &str = "BANKMAIL_PAGE_SIZE";
pub const ENV_LEDGER_ADDR: &str = "BANKMAIL_LEDGER_ADDR";
pub const ENV_LISTEN_ADDR: &str = "BANKMAIL_LISTEN_ADDR";
pub const ENV_STATE_PATH: &str = "BANKMAIL_STATE_PATH";
pub const ENV_CREDENTIALS_PATH: &str = "BANKMAIL_CREDENTIALS_PATH";
pub const ENV_TOKEN_PATH: &str = "BANKMAIL_TOKEN_PATH";

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_LEDGER_ADDR: &str = "http://localhost:3333";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8999";
pub const DEFAULT_STATE_PATH: &str = ".last_read_state.json";
pub const DEFAULT_CREDENTIALS_PATH: &str = "credentials.json";
pub const DEFAULT_TOKEN_PATH: &str = ".token.json";

#[derive(Debug, Clone)]
pub struct Settings {
    pub poll_interval: Duration,
    /// Upper bound on how many message summaries one cycle fetches.
    pub page_size: u32,
    pub ledger_addr: String,
    pub listen_addr: String,
    pub state_path: PathBuf,
    pub credentials_path: PathBuf,
    pub token_path: PathBuf,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            poll_interval: Duration::from_secs(
                parse_env(ENV_POLL_INTERVAL_SECS).unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            ),
            page_size: parse_env(ENV_PAGE_SIZE).unwrap_or(DEFAULT_PAGE_SIZE),
            ledger_addr: env_or(ENV_LEDGER_ADDR, DEFAULT_LEDGER_ADDR),
            listen_addr: env_or(ENV_LISTEN_ADDR, DEFAULT_LISTEN_ADDR),
            state_path: PathBuf::from(env_or(ENV_STATE_PATH, DEFAULT_STATE_PATH)),
            credentials_path: PathBuf::from(env_or(
                ENV_CREDENTIALS_PATH,
                DEFAULT_CREDENTIALS_PATH,
            )),
            token_path: PathBuf::from(env_or(ENV_TOKEN_PATH, DEFAULT_TOKEN_PATH)),
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[serial_test::serial]
    #[test]
    fn defaults_apply_without_env() {
        for k in [
            ENV_POLL_INTERVAL_SECS,
            ENV_PAGE_SIZE,
            ENV_LEDGER_ADDR,
            ENV_LISTEN_ADDR,
            ENV_STATE_PATH,
            ENV_CREDENTIALS_PATH,
            ENV_TOKEN_PATH,
        ] {
            env::remove_var(k);
        }

        let s = Settings::from_env();
        assert_eq!(s.poll_interval, Duration::from_secs(30));
        assert_eq!(s.page_size, 100);
        assert_eq!(s.ledger_addr, DEFAULT_LEDGER_ADDR);
        assert_eq!(s.state_path, PathBuf::from(DEFAULT_STATE_PATH));
    }

    #[serial_test::serial]
    #[test]
    fn env_overrides_and_garbage_falls_back() {
        env::set_var(ENV_POLL_INTERVAL_SECS, "5");
        env::set_var(ENV_PAGE_SIZE, "not-a-number");
        env::set_var(ENV_LEDGER_ADDR, "http://ledger:9000");

        let s = Settings::from_env();
        assert_eq!(s.poll_interval, Duration::from_secs(5));
        assert_eq!(s.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(s.ledger_addr, "http://ledger:9000");

        env::remove_var(ENV_POLL_INTERVAL_SECS);
        env::remove_var(ENV_PAGE_SIZE);
        env::remove_var(ENV_LEDGER_ADDR);
    }
}
