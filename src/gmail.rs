// src/gmail.rs
//! Gmail collaborator: OAuth credential/token plumbing plus a thin REST
//! client implementing [`Mailbox`]. The core never sees any of this except
//! through the trait.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::mailbox::{Header, Mailbox, MessagePart, RawMessage};

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

/// Consider a token stale slightly before its actual expiry.
const EXPIRY_SLACK_SECS: i64 = 10;

/* ----------------------------
OAuth credentials (credentials.json)
---------------------------- */

/// One OAuth client registration, in Google's download format (either the
/// `installed` or `web` variant).
#[derive(Debug, Clone, Deserialize)]
pub struct OauthApp {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<OauthApp>,
    web: Option<OauthApp>,
}

impl OauthApp {
    pub fn from_json(data: &str) -> Result<Self> {
        let file: CredentialsFile =
            serde_json::from_str(data).context("parsing oauth credentials")?;
        file.installed
            .or(file.web)
            .ok_or_else(|| anyhow!("credentials file has neither `installed` nor `web` client"))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("could not read credentials: {}", path.display()))?;
        Self::from_json(&data)
    }

    fn redirect_uri(&self) -> &str {
        self.redirect_uris
            .first()
            .map_or("http://localhost:8999/oauth2callback", String::as_str)
    }
}

/* ----------------------------
Token persistence (.token.json)
---------------------------- */

#[derive(Debug, Clone, serde::Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub refresh_token: String,
    pub expiry: DateTime<Utc>,
}

impl Token {
    pub fn valid(&self) -> bool {
        !self.access_token.is_empty()
            && self.expiry > Utc::now() + ChronoDuration::seconds(EXPIRY_SLACK_SECS)
    }
}

/// Wire shape of the provider's token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl TokenResponse {
    /// Absolute-expiry token; the refresh token survives a refresh response
    /// that omits it.
    fn into_token(self, previous_refresh: Option<&str>) -> Token {
        Token {
            access_token: self.access_token,
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            refresh_token: self
                .refresh_token
                .or_else(|| previous_refresh.map(str::to_string))
                .unwrap_or_default(),
            expiry: Utc::now() + ChronoDuration::seconds(self.expires_in),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// No token file means nobody has completed the login flow yet.
    pub fn load(&self) -> Result<Token> {
        let data = std::fs::read_to_string(&self.path).with_context(|| {
            format!(
                "could not read token at {}; visit /login to authorize",
                self.path.display()
            )
        })?;
        serde_json::from_str(&data).context("failed to unmarshal token")
    }

    pub fn save(&self, token: &Token) -> Result<()> {
        let data = serde_json::to_string(token).context("cannot marshal token")?;
        std::fs::write(&self.path, data)
            .with_context(|| format!("failed to save token to {}", self.path.display()))
    }
}

/* ----------------------------
Auth state + refresh
---------------------------- */

/// Owns the OAuth client registration and the current token. Shared between
/// the poll loop (refresh path) and the HTTP surface (login/callback path).
pub struct GmailAuth {
    app: OauthApp,
    store: TokenStore,
    http: Client,
    token: RwLock<Option<Token>>,
}

impl GmailAuth {
    pub fn new(app: OauthApp, store: TokenStore) -> Self {
        Self {
            app,
            store,
            http: Client::new(),
            token: RwLock::new(None),
        }
    }

    /// The provider consent URL the login flow redirects to. `access_type=
    /// offline` + `prompt=consent` so the exchange yields a refresh token.
    pub fn auth_url(&self) -> Result<String> {
        let url = reqwest::Url::parse_with_params(
            &self.app.auth_uri,
            &[
                ("client_id", self.app.client_id.as_str()),
                ("redirect_uri", self.app.redirect_uri()),
                ("response_type", "code"),
                ("scope", GMAIL_READONLY_SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .context("building auth url")?;
        Ok(url.into())
    }

    /// Exchange an authorization code for a token and persist it.
    pub async fn exchange_code(&self, code: &str) -> Result<()> {
        let resp: TokenResponse = self
            .http
            .post(&self.app.token_uri)
            .form(&[
                ("code", code),
                ("client_id", self.app.client_id.as_str()),
                ("client_secret", self.app.client_secret.as_str()),
                ("redirect_uri", self.app.redirect_uri()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .context("token exchange request failed")?
            .error_for_status()
            .context("token exchange rejected")?
            .json()
            .await
            .context("parsing token exchange response")?;

        let token = resp.into_token(None);
        self.store.save(&token)?;
        *self.token.write().await = Some(token);
        Ok(())
    }

    /// Return a fresh access token, refreshing via the refresh-token grant
    /// when the cached one has expired.
    pub async fn ensure_fresh(&self) -> Result<String> {
        {
            let guard = self.token.read().await;
            if let Some(token) = guard.as_ref() {
                if token.valid() {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let mut guard = self.token.write().await;
        // Another caller may have refreshed while we waited for the lock.
        if let Some(token) = guard.as_ref() {
            if token.valid() {
                return Ok(token.access_token.clone());
            }
        }

        let current = match guard.clone() {
            Some(token) => token,
            None => self.store.load()?,
        };
        if current.valid() {
            let access = current.access_token.clone();
            *guard = Some(current);
            return Ok(access);
        }

        if current.refresh_token.is_empty() {
            return Err(anyhow!("token expired and no refresh token on file"));
        }

        info!(target: "gmail", "token expired, refreshing...");
        let resp: TokenResponse = self
            .http
            .post(&self.app.token_uri)
            .form(&[
                ("client_id", self.app.client_id.as_str()),
                ("client_secret", self.app.client_secret.as_str()),
                ("refresh_token", current.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .context("failed to refresh token")?
            .error_for_status()
            .context("token refresh rejected")?
            .json()
            .await
            .context("parsing token refresh response")?;

        let token = resp.into_token(Some(&current.refresh_token));
        self.store.save(&token)?;
        let access = token.access_token.clone();
        *guard = Some(token);
        info!(target: "gmail", "token refreshed successfully");
        Ok(access)
    }
}

/* ----------------------------
REST client
---------------------------- */

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    payload: GmailPart,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailPart {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<GmailHeader>,
    #[serde(default)]
    body: Option<GmailBody>,
    #[serde(default)]
    parts: Vec<GmailPart>,
}

#[derive(Debug, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct GmailBody {
    #[serde(default)]
    data: Option<String>,
}

fn convert_part(part: GmailPart) -> MessagePart {
    MessagePart {
        mime_type: part.mime_type,
        data: part.body.and_then(|b| b.data).filter(|d| !d.is_empty()),
        parts: part.parts.into_iter().map(convert_part).collect(),
    }
}

/// [`Mailbox`] over the Gmail REST API for a single `users/me` mailbox.
pub struct GmailMailbox {
    auth: Arc<GmailAuth>,
    http: Client,
    base: String,
}

impl GmailMailbox {
    pub fn new(auth: Arc<GmailAuth>) -> Self {
        Self {
            auth,
            http: Client::new(),
            base: GMAIL_API_BASE.to_string(),
        }
    }

    /// Point the client at a different API base (tests/tools).
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }
}

#[async_trait::async_trait]
impl Mailbox for GmailMailbox {
    async fn refresh_access(&self) -> Result<()> {
        self.auth.ensure_fresh().await.map(|_| ())
    }

    async fn list_recent_ids(&self, page_size: u32) -> Result<Vec<String>> {
        let access = self.auth.ensure_fresh().await?;
        let url = format!("{}/users/me/messages", self.base);
        let resp: ListResponse = self
            .http
            .get(&url)
            .bearer_auth(access)
            .query(&[("maxResults", page_size.to_string())])
            .send()
            .await
            .context("could not retrieve messages")?
            .error_for_status()
            .context("message list rejected")?
            .json()
            .await
            .context("parsing message list")?;
        Ok(resp.messages.into_iter().map(|m| m.id).collect())
    }

    async fn fetch(&self, id: &str) -> Result<RawMessage> {
        let access = self.auth.ensure_fresh().await?;
        let url = format!("{}/users/me/messages/{}", self.base, id);
        let msg: GmailMessage = self
            .http
            .get(&url)
            .bearer_auth(access)
            .send()
            .await
            .with_context(|| format!("could not get message: {id}"))?
            .error_for_status()
            .with_context(|| format!("message get rejected: {id}"))?
            .json()
            .await
            .with_context(|| format!("parsing message: {id}"))?;

        let headers = msg
            .payload
            .headers
            .iter()
            .map(|h| Header {
                name: h.name.clone(),
                value: h.value.clone(),
            })
            .collect();

        Ok(RawMessage {
            id: msg.id,
            headers,
            payload: convert_part(msg.payload),
        })
    }
}
