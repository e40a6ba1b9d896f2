//! Remote mirrors of the ledger.
//!
//! Writes go to a repository through the GitHub contents API, one JSON file
//! per record with the photo stripped. Reads come back from the police
//! channel the webhook posts into.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{configured, Config};
use crate::error::{Error, Result};
use crate::record::{SubmissionRecord, TranscriptEntry};

/// Metadata key holding the channel to read back from.
pub const CHANNEL_METADATA_KEY: &str = "police_channel_id";

/// Messages requested per read-back.
const READ_LIMIT: u32 = 100;

const USER_AGENT: &str = concat!("confession-booth/", env!("CARGO_PKG_VERSION"));

/// Which stage of a confession a published record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// The initial confession.
    Initial,
    /// The confession with its transcript attached.
    Complete,
}

/// A named value on a remote entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteField {
    /// Field label.
    pub name: String,
    /// Field value.
    pub value: String,
}

/// A record as read back from the remote channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Card title.
    pub title: String,
    /// Named values.
    pub fields: Vec<RemoteField>,
    /// When the message was posted, as reported by the remote.
    pub timestamp: String,
}

/// Write side of the mirror.
#[async_trait]
pub trait RemoteArchive: Send + Sync {
    /// Publish `record`. Implementations must not send the photo.
    async fn publish(&self, record: &SubmissionRecord, kind: ArchiveKind) -> Result<()>;
}

/// Read side of the mirror.
#[async_trait]
pub trait RemoteReader: Send + Sync {
    /// Fetch entries, oldest first.
    async fn fetch(&self) -> Result<Vec<RemoteEntry>>;
}

/// On-disk shape of an archived record.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ArchiveDocument<'a> {
    name: &'a str,
    address: &'a str,
    crime: &'a str,
    timestamp: String,
    ip: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    chat_history: Option<&'a [TranscriptEntry]>,
}

#[derive(Debug, Serialize)]
struct ContentsRequest<'a> {
    message: String,
    content: &'a str,
}

/// Publishes records into `crimes/` of a GitHub repository.
#[derive(Debug, Clone)]
pub struct GitHubArchive {
    client: Client,
    api_url: String,
    token: String,
    owner: String,
    repo: String,
}

impl GitHubArchive {
    /// Create an archive client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        api_url: &str,
        token: &str,
        owner: &str,
        repo: &str,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(timeout)
                .user_agent(USER_AGENT)
                .build()?,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    /// Build from configuration. `None` unless token, owner and repository
    /// are all configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        let mirror = &config.mirror;
        let (Some(token), Some(owner), Some(repo)) = (
            configured(mirror.github_token.as_ref()),
            configured(mirror.repo_owner.as_ref()),
            configured(mirror.repo_name.as_ref()),
        ) else {
            debug!("GitHub archive not configured");
            return Ok(None);
        };
        Self::new(
            &mirror.github_api_url,
            token,
            owner,
            repo,
            config.mirror_timeout(),
        )
        .map(Some)
    }

    /// Repository path a record is stored at.
    #[must_use]
    pub fn file_path(record: &SubmissionRecord, kind: ArchiveKind) -> String {
        let prefix = match kind {
            ArchiveKind::Initial => "",
            ArchiveKind::Complete => "complete_",
        };
        format!(
            "crimes/{prefix}{}_{}.json",
            record.timestamp_key().replace(':', "-"),
            record.identity
        )
    }

    /// Pretty JSON for the archived file. Never contains the photo.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn document(record: &SubmissionRecord) -> Result<String> {
        let doc = ArchiveDocument {
            name: &record.report.display_name,
            address: &record.report.address,
            crime: &record.report.description,
            timestamp: record.timestamp_key(),
            ip: record.identity.as_str(),
            chat_history: record.transcript.as_deref(),
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }
}

#[async_trait]
impl RemoteArchive for GitHubArchive {
    async fn publish(&self, record: &SubmissionRecord, kind: ArchiveKind) -> Result<()> {
        let path = Self::file_path(record, kind);
        let url = format!(
            "{}/repos/{}/{}/contents/{path}",
            self.api_url, self.owner, self.repo
        );
        let encoded = STANDARD.encode(Self::document(record)?);
        let message = match kind {
            ArchiveKind::Initial => format!("Add confession: {}", record.report.display_name),
            ArchiveKind::Complete => {
                format!("Complete confession: {}", record.report.display_name)
            }
        };

        let response = self
            .client
            .put(url)
            .header(header::AUTHORIZATION, format!("token {}", self.token))
            .json(&ContentsRequest {
                message,
                content: &encoded,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::RemoteStatus {
                service: "github",
                status: response.status().as_u16(),
            });
        }
        info!(%path, "Record archived");
        Ok(())
    }
}

#[derive(Deserialize)]
struct ChannelMessage {
    #[serde(default)]
    timestamp: String,
    #[serde(default)]
    embeds: Vec<MessageEmbed>,
}

#[derive(Deserialize)]
struct MessageEmbed {
    title: Option<String>,
    #[serde(default)]
    fields: Vec<RemoteField>,
}

/// Reads the police channel back through the Discord bot API.
#[derive(Debug, Clone)]
pub struct DiscordChannelReader {
    client: Client,
    api_url: String,
    token: String,
    channel_id: String,
}

impl DiscordChannelReader {
    /// Create a reader for `channel_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_url: &str, token: &str, channel_id: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(timeout)
                .user_agent(USER_AGENT)
                .build()?,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            channel_id: channel_id.to_string(),
        })
    }

    /// Build from configuration and the stored channel id. `None` unless the
    /// bot token, guild and channel are all known.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &Config, channel_id: Option<&str>) -> Result<Option<Self>> {
        let mirror = &config.mirror;
        let channel_id = channel_id.map(str::trim).filter(|c| !c.is_empty());
        let (Some(token), Some(_guild), Some(channel_id)) = (
            configured(mirror.discord_bot_token.as_ref()),
            configured(mirror.discord_guild_id.as_ref()),
            channel_id,
        ) else {
            debug!("Channel read-back not configured");
            return Ok(None);
        };
        Self::new(
            &mirror.discord_api_url,
            token,
            channel_id,
            config.mirror_timeout(),
        )
        .map(Some)
    }
}

#[async_trait]
impl RemoteReader for DiscordChannelReader {
    async fn fetch(&self) -> Result<Vec<RemoteEntry>> {
        let url = format!("{}/channels/{}/messages", self.api_url, self.channel_id);
        let response = self
            .client
            .get(url)
            .query(&[("limit", READ_LIMIT)])
            .header(header::AUTHORIZATION, format!("Bot {}", self.token))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::RemoteStatus {
                service: "discord",
                status: response.status().as_u16(),
            });
        }

        let messages: Vec<ChannelMessage> = response.json().await?;
        let entries: Vec<RemoteEntry> = messages
            .into_iter()
            .rev()
            .filter_map(|message| {
                let embed = message.embeds.into_iter().next()?;
                Some(RemoteEntry {
                    title: embed.title.unwrap_or_else(|| "Unknown".to_string()),
                    fields: embed.fields,
                    timestamp: message.timestamp,
                })
            })
            .collect();
        debug!(count = entries.len(), "Fetched remote entries");
        Ok(entries)
    }
}
