//! Per-identity daily submission quota.
//!
//! Each identity gets `normal_limit` submissions per UTC day. Once those are
//! used, a shared override secret raises the ceiling to `max_limit` for that
//! identity. The unlock persists, but the count resets at UTC midnight
//! because "today" is recomputed from the clock on every check.
//!
//! The gate is a two-phase protocol: [`RateLimiter::check_quota`] either
//! admits (and records) or reports that an override is needed, and
//! [`RateLimiter::submit_override`] settles the second phase. The interactive
//! [`RateLimiter::check_and_consume`] composes both around an
//! [`OverridePrompt`].
//!
//! All limits here are client-side policy. Anyone with access to the
//! database file can reset them.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::config::{configured, QuotaConfig};
use crate::error::Result;
use crate::record::Identity;
use crate::storage::{self, QuotaTx, SharedStorage};

/// Stored quota history for one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyQuotaState {
    /// Whose history this is.
    pub identity: Identity,
    /// Every recorded submission, oldest first.
    pub submissions: Vec<DateTime<Utc>>,
    /// Whether the override secret was ever accepted.
    pub override_unlocked: bool,
}

impl DailyQuotaState {
    /// Submissions recorded on the given UTC day.
    #[must_use]
    pub fn count_on(&self, day: NaiveDate) -> u32 {
        let count = self
            .submissions
            .iter()
            .filter(|at| at.date_naive() == day)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }
}

/// Result of the first phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    /// Admitted and recorded.
    Allowed {
        /// Submissions today, including this one.
        used: u32,
        /// Ceiling that applied.
        limit: u32,
    },
    /// Normal quota used up; an override would admit this submission.
    NeedsOverride {
        /// Submissions today.
        used: u32,
        /// Submissions the override would unlock for today.
        unlockable: u32,
    },
    /// Absolute ceiling reached. No override helps.
    Exhausted {
        /// The ceiling.
        limit: u32,
    },
}

/// Result of the second phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideOutcome {
    /// Admitted and recorded.
    Accepted {
        /// Submissions still available today after this one.
        remaining: u32,
    },
    /// Secret did not match. Nothing changed.
    Rejected,
    /// Absolute ceiling reached. Nothing changed.
    Exhausted {
        /// The ceiling.
        limit: u32,
    },
}

/// Why a submission was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// The normal quota is spent and the override was refused.
    OverrideRejected {
        /// The normal limit that was hit.
        normal_limit: u32,
    },
    /// The normal quota is spent and no secret was entered.
    OverrideDeclined {
        /// The normal limit that was hit.
        normal_limit: u32,
    },
    /// The absolute maximum is spent.
    DailyMaximum {
        /// The maximum.
        max_limit: u32,
    },
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OverrideRejected { .. } => {
                write!(f, "❌ Invalid password. No more confessions allowed today.")
            }
            Self::OverrideDeclined { normal_limit } => write!(
                f,
                "❌ Daily limit reached ({normal_limit} confessions). No more confessions allowed today."
            ),
            Self::DailyMaximum { max_limit } => write!(
                f,
                "❌ Maximum daily limit reached ({max_limit} confessions). Please try again tomorrow."
            ),
        }
    }
}

/// Result of the full interactive gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The submission may proceed.
    Allowed {
        /// Whether the override was accepted during this call.
        unlocked_now: bool,
        /// Submissions still available today after this one.
        remaining: u32,
    },
    /// The submission must not proceed.
    Denied(DenialReason),
}

impl Admission {
    /// Whether the submission may proceed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Context handed to an [`OverridePrompt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverrideRequest {
    /// The limit that was just hit.
    pub normal_limit: u32,
    /// How many more submissions the override unlocks today.
    pub unlockable: u32,
}

impl OverrideRequest {
    /// Text suitable for a password dialog.
    #[must_use]
    pub fn message(&self) -> String {
        format!(
            "🔒 You have reached your daily limit ({} confessions).\n\nEnter password to unlock {} more confessions:",
            self.normal_limit, self.unlockable
        )
    }
}

/// Asks whoever is at the booth for the override secret.
///
/// Returning `None` means the person cancelled.
pub trait OverridePrompt {
    /// Ask for the secret.
    fn request_override(&self, request: &OverrideRequest) -> Option<String>;
}

/// A prompt that never supplies a secret.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrompt;

impl OverridePrompt for NoPrompt {
    fn request_override(&self, _request: &OverrideRequest) -> Option<String> {
        None
    }
}

/// Snapshot for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    /// Submissions today.
    pub used_today: u32,
    /// Whether the override is unlocked.
    pub unlocked: bool,
    /// Ceiling that currently applies.
    pub limit: u32,
}

impl QuotaStatus {
    /// Submissions still available today under the current ceiling.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used_today)
    }
}

/// Daily quota gate backed by the booth database.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    storage: SharedStorage,
    normal_limit: u32,
    max_limit: u32,
    override_secret: Option<String>,
}

impl RateLimiter {
    /// Create a limiter over shared storage.
    #[must_use]
    pub fn new(storage: SharedStorage, config: &QuotaConfig) -> Self {
        let override_secret = configured(config.override_secret.as_ref()).map(str::to_string);
        if override_secret.is_none() {
            debug!("No override secret configured; overrides will always be rejected");
        }
        Self {
            storage,
            normal_limit: config.normal_limit,
            max_limit: config.max_limit.max(config.normal_limit),
            override_secret,
        }
    }

    /// The per-day limit without override.
    #[must_use]
    pub fn normal_limit(&self) -> u32 {
        self.normal_limit
    }

    /// The per-day limit with override.
    #[must_use]
    pub fn max_limit(&self) -> u32 {
        self.max_limit
    }

    /// First phase, evaluated against the current time.
    ///
    /// # Errors
    ///
    /// Returns an error if the quota state cannot be read or written.
    pub fn check_quota(&self, identity: &Identity) -> Result<QuotaDecision> {
        self.check_quota_at(identity, Utc::now())
    }

    /// First phase, evaluated at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the quota state cannot be read or written.
    pub fn check_quota_at(&self, identity: &Identity, now: DateTime<Utc>) -> Result<QuotaDecision> {
        let decision = storage::lock(&self.storage)?.quota_transaction(|tx| {
            let (used, unlocked) = self.today(tx, identity, now)?;
            let decision = if used < self.normal_limit {
                tx.record(identity, now)?;
                QuotaDecision::Allowed {
                    used: used + 1,
                    limit: if unlocked { self.max_limit } else { self.normal_limit },
                }
            } else if used < self.max_limit && unlocked {
                tx.record(identity, now)?;
                QuotaDecision::Allowed {
                    used: used + 1,
                    limit: self.max_limit,
                }
            } else if used < self.max_limit {
                QuotaDecision::NeedsOverride {
                    used,
                    unlockable: self.max_limit - self.normal_limit,
                }
            } else {
                QuotaDecision::Exhausted {
                    limit: self.max_limit,
                }
            };
            Ok(decision)
        })?;

        debug!(%identity, ?decision, "Quota checked");
        Ok(decision)
    }

    /// Second phase, evaluated against the current time.
    ///
    /// # Errors
    ///
    /// Returns an error if the quota state cannot be read or written.
    pub fn submit_override(&self, identity: &Identity, secret: &str) -> Result<OverrideOutcome> {
        self.submit_override_at(identity, secret, Utc::now())
    }

    /// Second phase, evaluated at `now`.
    ///
    /// Re-reads the state, so it is safe to call without a preceding
    /// [`check_quota`](Self::check_quota). If the submission would be admitted
    /// anyway, the secret is not consulted.
    ///
    /// # Errors
    ///
    /// Returns an error if the quota state cannot be read or written.
    pub fn submit_override_at(
        &self,
        identity: &Identity,
        secret: &str,
        now: DateTime<Utc>,
    ) -> Result<OverrideOutcome> {
        let outcome = storage::lock(&self.storage)?.quota_transaction(|tx| {
            let (used, unlocked) = self.today(tx, identity, now)?;
            if used >= self.max_limit {
                return Ok(OverrideOutcome::Exhausted {
                    limit: self.max_limit,
                });
            }
            if used < self.normal_limit || unlocked {
                tx.record(identity, now)?;
                let limit = if unlocked { self.max_limit } else { self.normal_limit };
                return Ok(OverrideOutcome::Accepted {
                    remaining: limit.saturating_sub(used + 1),
                });
            }
            if self.override_secret.as_deref() != Some(secret) {
                return Ok(OverrideOutcome::Rejected);
            }
            tx.unlock(identity, now)?;
            tx.record(identity, now)?;
            Ok(OverrideOutcome::Accepted {
                remaining: self.max_limit - (used + 1),
            })
        })?;

        match outcome {
            OverrideOutcome::Accepted { remaining } => {
                info!(%identity, remaining, "Quota override accepted");
            }
            OverrideOutcome::Rejected => warn!(%identity, "Quota override rejected"),
            OverrideOutcome::Exhausted { .. } => debug!(%identity, "Override attempted at maximum"),
        }
        Ok(outcome)
    }

    /// Give back the slot recorded for `identity` at `at`.
    ///
    /// Used when an admitted submission could not be stored. An override
    /// unlocked on the way stays unlocked.
    ///
    /// # Errors
    ///
    /// Returns an error if the quota state cannot be written.
    pub fn release_at(&self, identity: &Identity, at: DateTime<Utc>) -> Result<bool> {
        let released =
            storage::lock(&self.storage)?.quota_transaction(|tx| tx.release(identity, at))?;
        if released {
            info!(%identity, "Quota slot released");
        }
        Ok(released)
    }

    /// Full interactive gate: returns whether the submission may proceed.
    ///
    /// # Errors
    ///
    /// Returns an error if the quota state cannot be read or written.
    pub fn check_and_consume(&self, identity: &Identity, prompt: &dyn OverridePrompt) -> Result<bool> {
        self.check_and_consume_at(identity, prompt, Utc::now())
    }

    /// [`check_and_consume`](Self::check_and_consume) evaluated at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the quota state cannot be read or written.
    pub fn check_and_consume_at(
        &self,
        identity: &Identity,
        prompt: &dyn OverridePrompt,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self.admit_at(identity, prompt, now)?.is_allowed())
    }

    /// Full interactive gate with the reason for a denial.
    ///
    /// The prompt is only consulted when an override could help.
    ///
    /// # Errors
    ///
    /// Returns an error if the quota state cannot be read or written.
    pub fn admit(&self, identity: &Identity, prompt: &dyn OverridePrompt) -> Result<Admission> {
        self.admit_at(identity, prompt, Utc::now())
    }

    /// [`admit`](Self::admit) evaluated at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the quota state cannot be read or written.
    pub fn admit_at(
        &self,
        identity: &Identity,
        prompt: &dyn OverridePrompt,
        now: DateTime<Utc>,
    ) -> Result<Admission> {
        match self.check_quota_at(identity, now)? {
            QuotaDecision::Allowed { used, limit } => Ok(Admission::Allowed {
                unlocked_now: false,
                remaining: limit.saturating_sub(used),
            }),
            QuotaDecision::Exhausted { limit } => Ok(Admission::Denied(DenialReason::DailyMaximum {
                max_limit: limit,
            })),
            QuotaDecision::NeedsOverride { unlockable, .. } => {
                let request = OverrideRequest {
                    normal_limit: self.normal_limit,
                    unlockable,
                };
                let Some(secret) = prompt.request_override(&request) else {
                    return Ok(Admission::Denied(DenialReason::OverrideDeclined {
                        normal_limit: self.normal_limit,
                    }));
                };
                Ok(match self.submit_override_at(identity, &secret, now)? {
                    OverrideOutcome::Accepted { remaining } => Admission::Allowed {
                        unlocked_now: true,
                        remaining,
                    },
                    OverrideOutcome::Rejected => {
                        Admission::Denied(DenialReason::OverrideRejected {
                            normal_limit: self.normal_limit,
                        })
                    }
                    OverrideOutcome::Exhausted { limit } => {
                        Admission::Denied(DenialReason::DailyMaximum { max_limit: limit })
                    }
                })
            }
        }
    }

    /// Current standing for display.
    ///
    /// # Errors
    ///
    /// Returns an error if the quota state cannot be read.
    pub fn status(&self, identity: &Identity) -> Result<QuotaStatus> {
        self.status_at(identity, Utc::now())
    }

    /// [`status`](Self::status) evaluated at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the quota state cannot be read.
    pub fn status_at(&self, identity: &Identity, now: DateTime<Utc>) -> Result<QuotaStatus> {
        let state = storage::lock(&self.storage)?.quota_state(identity)?;
        let used_today = state.count_on(now.date_naive());
        Ok(QuotaStatus {
            used_today,
            unlocked: state.override_unlocked,
            limit: if state.override_unlocked {
                self.max_limit
            } else {
                self.normal_limit
            },
        })
    }

    fn today(&self, tx: &QuotaTx<'_>, identity: &Identity, now: DateTime<Utc>) -> Result<(u32, bool)> {
        let (start, end) = utc_day_bounds(now);
        Ok((tx.count_between(identity, start, end)?, tx.is_unlocked(identity)?))
    }
}

/// Half-open `[midnight, next midnight)` UTC window containing `now`.
#[must_use]
pub fn utc_day_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map_or(now, |midnight| midnight.and_utc());
    (start, start + Duration::days(1))
}
