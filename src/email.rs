use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::fs;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info};
use url::Url;

use crate::error::HuntError;

/// Which messages to look at: a label (folder) and a recency window, capped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailQuery {
    pub label: String,
    pub newer_than_days: u32,
    pub max_results: usize,
}

impl MailQuery {
    /// Gmail search syntax, e.g. `label:"JOBS/Inbound" newer_than:60d`.
    pub fn gmail_query(&self) -> String {
        format!("label:\"{}\" newer_than:{}d", self.label, self.newer_than_days)
    }

    /// IMAP search criterion for the same window, e.g. `SINCE 18-Aug-2026`.
    pub fn imap_query(&self) -> String {
        let since = chrono::Utc::now() - chrono::Duration::days(self.newer_than_days as i64);
        format!("SINCE {}", since.format("%d-%b-%Y"))
    }
}

/// Where candidate messages come from.
pub trait MailSource {
    /// Ids of candidate messages, newest first, at most `query.max_results`.
    fn list_candidate_ids(&mut self, query: &MailQuery) -> Result<Vec<String>>;

    /// Raw MIME bytes of one message.
    fn get_raw_message(&mut self, id: &str) -> Result<Vec<u8>>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

// --- IMAP ---

pub struct EmailConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl EmailConfig {
    pub fn gmail(username: &str, app_password: &str) -> Self {
        Self {
            server: "imap.gmail.com".to_string(),
            port: 993,
            username: username.to_string(),
            password: app_password.trim().to_string(),
        }
    }

    pub fn from_password_file(
        server: &str,
        port: u16,
        username: &str,
        password_file: &Path,
    ) -> Result<Self> {
        let password =
            fs::read_to_string(password_file).map_err(|e| HuntError::UnreadableCredentials {
                path: password_file.to_path_buf(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            server: server.to_string(),
            port,
            ..Self::gmail(username, &password)
        })
    }
}

/// IMAP mailbox; Gmail exposes labels as folders, so the label is selected as a mailbox.
/// Ids are `<uidvalidity>:<uid>` so they stay valid across sessions.
pub struct ImapSource {
    session: imap::Session<native_tls::TlsStream<TcpStream>>,
    uid_validity: u32,
}

impl ImapSource {
    pub fn connect(config: &EmailConfig) -> Result<Self> {
        let tls = native_tls::TlsConnector::builder().build()?;

        let addr = (config.server.as_str(), config.port);
        let tcp = TcpStream::connect(addr).context("Failed to connect to IMAP server")?;
        tcp.set_read_timeout(Some(Duration::from_secs(30)))?;
        tcp.set_write_timeout(Some(Duration::from_secs(30)))?;
        let tls_stream = tls.connect(&config.server, tcp)?;

        let client = imap::Client::new(tls_stream);
        let session = client
            .login(&config.username, &config.password)
            .map_err(|e| anyhow!("Login failed: {}", e.0))?;

        info!(server = %config.server, user = %config.username, "connected to IMAP");
        Ok(Self {
            session,
            uid_validity: 0,
        })
    }
}

impl MailSource for ImapSource {
    fn list_candidate_ids(&mut self, query: &MailQuery) -> Result<Vec<String>> {
        let mailbox = self
            .session
            .select(&query.label)
            .map_err(|e| HuntError::remote(format!("select {}", query.label), e))?;
        self.uid_validity = mailbox.uid_validity.unwrap_or(0);

        let criteria = query.imap_query();
        debug!(criteria = %criteria, "IMAP search");
        let mut uids: Vec<u32> = self
            .session
            .uid_search(&criteria)
            .map_err(|e| HuntError::remote("IMAP search", e))?
            .into_iter()
            .collect();
        uids.sort_unstable_by(|a, b| b.cmp(a));
        uids.truncate(query.max_results);

        Ok(uids
            .into_iter()
            .map(|uid| format!("{}:{}", self.uid_validity, uid))
            .collect())
    }

    fn get_raw_message(&mut self, id: &str) -> Result<Vec<u8>> {
        let (validity, uid) = id
            .split_once(':')
            .ok_or_else(|| anyhow!("malformed IMAP id: {}", id))?;
        if validity != self.uid_validity.to_string() {
            return Err(anyhow!("IMAP id {} belongs to another UIDVALIDITY", id));
        }

        let messages = self
            .session
            .uid_fetch(uid, "RFC822")
            .map_err(|e| HuntError::remote(format!("fetch {}", id), e))?;
        messages
            .iter()
            .find_map(|m| m.body().map(<[u8]>::to_vec))
            .ok_or_else(|| anyhow!("message {} has no body", id))
    }

    fn close(&mut self) -> Result<()> {
        self.session.logout()?;
        Ok(())
    }
}

// --- Gmail API ---

const GMAIL_API: &str = "https://gmail.googleapis.com/gmail/v1/users";

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    raw: String,
}

/// Gmail REST API with a ready-made OAuth bearer token.
pub struct GmailSource {
    client: Client,
    user: String,
    token: String,
}

impl GmailSource {
    pub fn new(user: &str, token: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            user: user.to_string(),
            token: token.trim().to_string(),
        })
    }

    fn messages_url(&self, id: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(GMAIL_API)?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| anyhow!("Gmail base URL cannot hold a path"))?;
            path.push(&self.user).push("messages");
            if let Some(id) = id {
                path.push(id);
            }
        }
        Ok(url)
    }

    fn get_json<T: for<'de> Deserialize<'de>>(&self, what: &str, url: Url) -> Result<T> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .map_err(|e| HuntError::remote(what, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(HuntError::remote(what, format!("HTTP {}: {}", status, body.trim())).into());
        }
        Ok(response.json()?)
    }
}

/// Decodes Gmail's `raw` field (base64url, padding optional).
pub fn decode_raw(raw: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(raw.trim().trim_end_matches('='))
        .context("message is not valid base64url")
}

impl MailSource for GmailSource {
    fn list_candidate_ids(&mut self, query: &MailQuery) -> Result<Vec<String>> {
        let mut url = self.messages_url(None)?;
        url.query_pairs_mut()
            .append_pair("q", &query.gmail_query())
            .append_pair("maxResults", &query.max_results.to_string());
        debug!(query = %query.gmail_query(), "Gmail search");
        let list: MessageList = self.get_json("Gmail list", url)?;
        Ok(list
            .messages
            .into_iter()
            .take(query.max_results)
            .map(|m| m.id)
            .collect())
    }

    fn get_raw_message(&mut self, id: &str) -> Result<Vec<u8>> {
        let mut url = self.messages_url(Some(id))?;
        url.query_pairs_mut().append_pair("format", "raw");
        let message: RawMessage = self.get_json(&format!("Gmail get {}", id), url)?;
        decode_raw(&message.raw)
    }
}

// --- Unreachable source ---

/// Stands in for a source that could not be opened, so the run still prepares the
/// store and reports. Every call fails with the original reason.
pub struct UnavailableSource {
    reason: String,
}

impl UnavailableSource {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl MailSource for UnavailableSource {
    fn list_candidate_ids(&mut self, _query: &MailQuery) -> Result<Vec<String>> {
        Err(HuntError::remote("open mail source", &self.reason).into())
    }

    fn get_raw_message(&mut self, id: &str) -> Result<Vec<u8>> {
        Err(HuntError::remote(format!("fetch {}", id), &self.reason).into())
    }
}

// --- Directory of .eml files ---

/// A directory of `<id>.eml` files; the label is ignored, recency uses file mtime.
pub struct DirSource {
    dir: PathBuf,
}

impl DirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl MailSource for DirSource {
    fn list_candidate_ids(&mut self, query: &MailQuery) -> Result<Vec<String>> {
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(u64::from(query.newer_than_days) * 86_400))
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut found = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read mail directory: {}", self.dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("eml") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let modified = fs::metadata(&path)?.modified()?;
            if modified >= cutoff {
                found.push((modified, stem.to_string()));
            }
        }

        found.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        found.truncate(query.max_results);
        Ok(found.into_iter().map(|(_, id)| id).collect())
    }

    fn get_raw_message(&mut self, id: &str) -> Result<Vec<u8>> {
        if id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(anyhow!("invalid message id: {}", id));
        }
        let path = self.dir.join(format!("{}.eml", id));
        fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))
    }
}
