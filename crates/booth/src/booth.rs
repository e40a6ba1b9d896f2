//! The submission orchestrator.
//!
//! [`Booth`] sequences one session's side effects: identity, quota gate,
//! ledger write, then outward notification and archive. Only the ledger
//! write can fail a submission; everything outward is best effort.

use std::fmt;
use std::time::Duration;

use chrono::{SubsecRound, Utc};
use tracing::{debug, info, warn};

use crate::config::{Config, QuotaConfig};
use crate::conversation::{Conversation, Persona, Reply};
use crate::error::{Error, Result};
use crate::identity::{IdentityResolver, PublicAddressResolver};
use crate::ledger::{Ledger, LedgerEntry};
use crate::mirror::{
    ArchiveKind, DiscordChannelReader, GitHubArchive, RemoteArchive, RemoteReader,
    CHANNEL_METADATA_KEY,
};
use crate::notify::{DisabledNotifier, Notification, Notifier, WebhookNotifier};
use crate::quota::{Admission, DenialReason, OverridePrompt, QuotaStatus, RateLimiter};
use crate::record::{CrimeReport, Identity, SubmissionRecord, TranscriptEntry};
use crate::responder::{GeminiProvider, Responder, TextProvider};
use crate::storage::{self, SharedStorage, Storage};

/// What the subject typed into the confession form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfessionForm {
    /// Full name.
    pub name: String,
    /// Address.
    pub address: String,
    /// Description of the crime.
    pub crime: String,
    /// Captured photo as a data URL.
    pub photo: Option<String>,
}

impl ConfessionForm {
    /// Check that every field is filled in.
    ///
    /// Fields are checked in form order and the first problem is reported.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the first missing field.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("name", "❌ Please enter your full name"));
        }
        if self.address.trim().is_empty() {
            return Err(Error::validation("address", "❌ Please enter your address"));
        }
        if self.crime.trim().is_empty() {
            return Err(Error::validation("crime", "❌ Please describe the crime"));
        }
        if self.photo.as_deref().map_or(true, |p| p.trim().is_empty()) {
            return Err(Error::validation("photo", "❌ Please capture a photo first"));
        }
        Ok(())
    }

    fn into_report(self) -> CrimeReport {
        CrimeReport {
            display_name: self.name.trim().to_string(),
            address: self.address.trim().to_string(),
            description: self.crime.trim().to_string(),
            photo: self.photo,
        }
    }
}

/// How a confession attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// Stored; the record is what was written.
    Accepted(SubmissionRecord),
    /// Turned away by the quota gate. Nothing was stored.
    Denied(DenialReason),
}

/// One booth and everything it talks to.
pub struct Booth<P = GeminiProvider> {
    identity: Box<dyn IdentityResolver>,
    limiter: RateLimiter,
    ledger: Ledger,
    storage: SharedStorage,
    notifier: Box<dyn Notifier>,
    archive: Option<Box<dyn RemoteArchive>>,
    responder: Option<Responder<P>>,
    footer: String,
}

impl<P> fmt::Debug for Booth<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Booth")
            .field("limiter", &self.limiter)
            .field("ledger", &self.ledger)
            .field("archive", &self.archive.is_some())
            .field("responder", &self.responder.is_some())
            .field("footer", &self.footer)
            .finish_non_exhaustive()
    }
}

impl Booth<GeminiProvider> {
    /// Open the configured database and wire up every configured
    /// collaborator.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or an HTTP client
    /// cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let storage = storage::shared(Storage::open(config.database_path())?);
        Self::from_config_with_storage(config, storage)
    }

    /// Like [`from_config`](Self::from_config) over an already open store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or an HTTP client
    /// cannot be built.
    pub fn from_config_with_storage(config: &Config, storage: SharedStorage) -> Result<Self> {
        let resolver =
            PublicAddressResolver::new(&config.identity.lookup_url, config.identity_timeout())?;
        let mut booth = Self::new(storage.clone(), &config.quota, Box::new(resolver))
            .with_footer(config.footer());

        match config.webhook_url() {
            Some(url) => {
                booth = booth.with_notifier(Box::new(WebhookNotifier::new(
                    url,
                    config.notify_timeout(),
                )?));
            }
            None => info!("Webhook not configured; notifications disabled"),
        }

        if let Some(archive) = GitHubArchive::from_config(config)? {
            booth = booth.with_archive(Box::new(archive));
        }

        let channel = storage::lock(&storage)?.metadata(CHANNEL_METADATA_KEY)?;
        if let Some(reader) = DiscordChannelReader::from_config(config, channel.as_deref())? {
            booth = booth.with_reader(Box::new(reader), config.mirror_timeout());
        }

        if config.api_keys().is_empty() {
            info!("No API keys configured; conversations will use canned replies");
        } else {
            booth = booth.with_responder(Responder::from_config(config)?);
        }

        Ok(booth)
    }
}

impl<P> Booth<P>
where
    P: TextProvider,
{
    /// A booth with local storage only. Notifications are dropped and
    /// conversations use canned replies until collaborators are attached.
    #[must_use]
    pub fn new(
        storage: SharedStorage,
        quota: &QuotaConfig,
        identity: Box<dyn IdentityResolver>,
    ) -> Self {
        Self {
            identity,
            limiter: RateLimiter::new(storage.clone(), quota),
            ledger: Ledger::new(storage.clone()),
            storage,
            notifier: Box::new(DisabledNotifier),
            archive: None,
            responder: None,
            footer: "Police Department - Confession Booth".to_string(),
        }
    }

    /// Send notifications through `notifier`.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Publish records to `archive`.
    #[must_use]
    pub fn with_archive(mut self, archive: Box<dyn RemoteArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Merge `reader`'s entries into [`crimes`](Self::crimes).
    #[must_use]
    pub fn with_reader(mut self, reader: Box<dyn RemoteReader>, timeout: Duration) -> Self {
        self.ledger = self.ledger.with_reader(reader, timeout);
        self
    }

    /// Generate conversation replies with `responder`.
    #[must_use]
    pub fn with_responder(mut self, responder: Responder<P>) -> Self {
        self.responder = Some(responder);
        self
    }

    /// Footer text for complete-confession notifications.
    #[must_use]
    pub fn with_footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = footer.into();
        self
    }

    /// The quota gate.
    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// The ledger.
    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// The underlying store.
    #[must_use]
    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    /// The responder, if one is configured.
    #[must_use]
    pub fn responder(&self) -> Option<&Responder<P>> {
        self.responder.as_ref()
    }

    /// Who is at the booth, falling back to a synthetic identity.
    pub async fn identity(&self) -> Identity {
        self.identity.resolve_or_synthetic().await
    }

    /// Validate, gate, store and announce a confession.
    ///
    /// `prompt` is asked for the override secret only when the normal quota
    /// is spent and the maximum is not.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an incomplete form (nothing else
    /// happens), or a storage error if the quota or the record could not be
    /// persisted. When the record itself fails, the quota slot is released
    /// again. Notification and archive failures are only logged.
    pub async fn submit_confession(
        &self,
        form: ConfessionForm,
        prompt: &dyn OverridePrompt,
    ) -> Result<SubmissionOutcome> {
        form.validate()?;

        let identity = self.identity().await;
        let now = Utc::now().trunc_subsecs(3);
        match self.limiter.admit_at(&identity, prompt, now)? {
            Admission::Allowed {
                unlocked_now,
                remaining,
            } => debug!(%identity, unlocked_now, remaining, "Submission admitted"),
            Admission::Denied(reason) => {
                info!(%identity, ?reason, "Submission denied");
                return Ok(SubmissionOutcome::Denied(reason));
            }
        }

        let record = SubmissionRecord::new(identity, form.into_report(), now);
        if let Err(e) = self.ledger.append(&record) {
            if let Err(release) = self.limiter.release_at(&record.identity, now) {
                warn!(error = %release, "Quota slot not released");
            }
            return Err(e);
        }
        info!(key = %record.timestamp_key(), "Confession recorded");

        self.announce(&Notification::confession(&record)).await;
        self.publish(&record, ArchiveKind::Initial).await;

        Ok(SubmissionOutcome::Accepted(record))
    }

    /// Attach the legal-representative transcript to a stored confession.
    ///
    /// The stored row is replaced in place and the complete record is
    /// announced with its photo and archived without it.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the record could not be updated.
    pub async fn attach_transcript(
        &self,
        record: &SubmissionRecord,
        transcript: Vec<TranscriptEntry>,
    ) -> Result<SubmissionRecord> {
        let complete = record.clone().with_transcript(transcript);
        let upsert = self.ledger.upsert_by_timestamp(&complete)?;
        debug!(?upsert, "Transcript attached");

        match Notification::complete_confession(&complete, &self.footer) {
            Ok(notification) => self.announce(&notification).await,
            Err(e) => warn!(error = %e, "Complete confession not announced"),
        }
        self.publish(&complete, ArchiveKind::Complete).await;

        Ok(complete)
    }

    /// Announce a denial and open the interrogation.
    pub async fn record_denial(&self) -> Conversation {
        self.announce(&Notification::denial(Utc::now())).await;
        Conversation::new(Persona::Officer)
    }

    /// Open a conversation with the legal representative.
    #[must_use]
    pub fn legal_counsel(&self) -> Conversation {
        Conversation::new(Persona::LegalRep)
    }

    /// Send one line in `conversation`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for blank input.
    pub async fn chat(&self, conversation: &mut Conversation, text: &str) -> Result<Reply> {
        conversation.send(self.responder.as_ref(), text).await
    }

    /// The merged crime ledger.
    ///
    /// # Errors
    ///
    /// Returns an error only if local storage cannot be read.
    pub async fn crimes(&self) -> Result<Vec<LedgerEntry>> {
        self.ledger.read_all().await
    }

    /// Today's quota standing for whoever is at the booth.
    ///
    /// # Errors
    ///
    /// Returns an error if the quota state cannot be read.
    pub async fn quota_status(&self) -> Result<(Identity, QuotaStatus)> {
        let identity = self.identity().await;
        let status = self.limiter.status(&identity)?;
        Ok((identity, status))
    }

    async fn announce(&self, notification: &Notification) {
        if let Err(e) = self.notifier.notify(notification).await {
            debug!(kind = %notification.kind, error = %e, "Notification not delivered");
        }
    }

    async fn publish(&self, record: &SubmissionRecord, kind: ArchiveKind) {
        let Some(archive) = &self.archive else {
            return;
        };
        if let Err(e) = archive.publish(&record.without_photo(), kind).await {
            warn!(error = %e, ?kind, "Archive publish failed");
        }
    }
}
