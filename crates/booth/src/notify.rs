//! Outward notifications.
//!
//! Booth events are posted to a Discord-style webhook as embeds. The
//! complete confession is followed by a second multipart message carrying
//! the photo. Delivery is best effort: callers log failures and carry on.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{multipart, Client};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::record::{truncate_field, SubmissionRecord, FIELD_LIMIT};

/// Embed color for confessions.
pub const COLOR_RED: u32 = 16_711_680;

/// Embed color for denials.
pub const COLOR_YELLOW: u32 = 16_776_960;

/// Kinds of booth events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Initial confession, before any conversation.
    Confession,
    /// The subject denied committing a crime.
    Denial,
    /// Confession with the legal-representative transcript and photo.
    CompleteConfession,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Confession => write!(f, "CONFESSION"),
            Self::Denial => write!(f, "DENIAL"),
            Self::CompleteConfession => write!(f, "COMPLETE_CONFESSION"),
        }
    }
}

/// One named value in an embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedField {
    /// Field label.
    pub name: String,
    /// Field value.
    pub value: String,
    /// Whether the field may sit beside its neighbours.
    pub inline: bool,
}

impl EmbedField {
    fn new(name: &str, value: impl Into<String>, inline: bool) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
            inline,
        }
    }
}

/// Embed footer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedFooter {
    /// Footer text.
    pub text: String,
}

/// A rich message card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Embed {
    /// Card title.
    pub title: String,
    /// Card description.
    pub description: String,
    /// Named values.
    pub fields: Vec<EmbedField>,
    /// Side-bar color.
    pub color: u32,
    /// Optional footer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    /// Optional ISO-8601 timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// A photo sent as a separate upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoAttachment {
    /// File name shown to recipients.
    pub file_name: String,
    /// Message text sent with the file.
    pub caption: String,
    /// JPEG bytes.
    pub bytes: Vec<u8>,
}

/// A complete outward message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Which event this is.
    pub kind: EventKind,
    /// Plain message text above the embed.
    pub content: Option<String>,
    /// The embed.
    pub embed: Embed,
    /// Photo to upload after the embed.
    pub photo: Option<PhotoAttachment>,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    embeds: [&'a Embed; 1],
}

fn or_default(value: &str, default: &str) -> String {
    if value.trim().is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

fn report_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

impl Notification {
    /// The initial confession report.
    #[must_use]
    pub fn confession(record: &SubmissionRecord) -> Self {
        let report = &record.report;
        Self {
            kind: EventKind::Confession,
            content: None,
            embed: Embed {
                title: "🚨 CRIME CONFESSION REPORTED".to_string(),
                description: "New suspect confession received".to_string(),
                fields: vec![
                    EmbedField::new("👤 Suspect Name", or_default(&report.display_name, "Unknown"), false),
                    EmbedField::new("📍 Location Address", or_default(&report.address, "Unknown"), false),
                    EmbedField::new(
                        "⚠️ Crime Description",
                        or_default(&report.description, "Not provided"),
                        false,
                    ),
                    EmbedField::new("⏰ Report Time", report_time(record.submitted_at), false),
                ],
                color: COLOR_RED,
                footer: None,
                timestamp: None,
            },
            photo: None,
        }
    }

    /// A denial, recorded at `at`.
    #[must_use]
    pub fn denial(at: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::Denial,
            content: None,
            embed: Embed {
                title: "⚠️ SUSPECT DENIAL RECORDED".to_string(),
                description:
                    "Suspect denied committing a crime - potential suspect under investigation"
                        .to_string(),
                fields: vec![
                    EmbedField::new("📝 Report Type", EventKind::Denial.to_string(), false),
                    EmbedField::new("⏰ Report Time", report_time(at), false),
                ],
                color: COLOR_YELLOW,
                footer: None,
                timestamp: None,
            },
            photo: None,
        }
    }

    /// The full record with transcript, followed by a photo upload.
    ///
    /// The transcript field is truncated to [`FIELD_LIMIT`] characters; the
    /// record itself is not modified.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPhoto`] if the photo cannot be decoded.
    pub fn complete_confession(record: &SubmissionRecord, footer: &str) -> Result<Self> {
        let report = &record.report;
        let transcript = record
            .render_transcript("\n\n")
            .unwrap_or_else(|| "No chat transcript available".to_string());

        let photo = report.photo_bytes()?.map(|bytes| PhotoAttachment {
            file_name: format!("suspect_{}.jpg", report.file_safe_name()),
            caption: format!("📸 **SUSPECT PHOTO: {}**", report.display_name),
            bytes,
        });

        Ok(Self {
            kind: EventKind::CompleteConfession,
            content: Some("**🚨 NEW COMPLETE CONFESSION RECEIVED 🚨**".to_string()),
            embed: Embed {
                title: "🚨 COMPLETE CONFESSION REPORT".to_string(),
                description: "**Full Interrogation Record with Photo**".to_string(),
                fields: vec![
                    EmbedField::new("👤 Suspect Name", or_default(&report.display_name, "Unknown"), true),
                    EmbedField::new("📍 Address", or_default(&report.address, "Unknown"), true),
                    EmbedField::new(
                        "⚠️ Crime Description",
                        or_default(&report.description, "Not provided"),
                        false,
                    ),
                    EmbedField::new(
                        "💬 Legal Chat Transcript",
                        truncate_field(&transcript, FIELD_LIMIT),
                        false,
                    ),
                    EmbedField::new("⏰ Report Time", report_time(record.submitted_at), false),
                ],
                color: COLOR_RED,
                footer: Some(EmbedFooter {
                    text: footer.to_string(),
                }),
                timestamp: Some(record.submitted_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            },
            photo,
        })
    }

    /// Look a field value up by label.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.embed
            .fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

/// Delivers notifications somewhere.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one notification.
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Posts notifications to a webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    /// Create a notifier for `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url: url.into(),
        })
    }

    async fn post_embed(&self, notification: &Notification) -> Result<()> {
        let payload = WebhookPayload {
            content: notification.content.as_deref(),
            embeds: [&notification.embed],
        };
        let response = self.client.post(&self.url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(Error::RemoteStatus {
                service: "webhook",
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }

    async fn post_photo(&self, photo: &PhotoAttachment) -> Result<()> {
        let part = multipart::Part::bytes(photo.bytes.clone())
            .file_name(photo.file_name.clone())
            .mime_str("image/jpeg")?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("content", photo.caption.clone());

        let response = self.client.post(&self.url).multipart(form).send().await?;
        if !response.status().is_success() {
            return Err(Error::RemoteStatus {
                service: "webhook photo upload",
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    /// Posts the embed, then the photo if any. The photo is attempted even if
    /// the embed failed; the first failure is returned.
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let embed = self.post_embed(notification).await;
        match &embed {
            Ok(()) => info!(kind = %notification.kind, "Notification delivered"),
            Err(e) => warn!(kind = %notification.kind, error = %e, "Notification failed"),
        }

        let photo = match &notification.photo {
            Some(photo) => {
                let result = self.post_photo(photo).await;
                match &result {
                    Ok(()) => info!(file = %photo.file_name, "Suspect photo delivered"),
                    Err(e) => warn!(error = %e, "Photo upload failed"),
                }
                result
            }
            None => Ok(()),
        };

        embed.and(photo)
    }
}

/// Used when no webhook is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        debug!(kind = %notification.kind, "Webhook not configured; notification skipped");
        Ok(())
    }
}
