//! `confession_booth` - An interactive confession kiosk
//!
//! This library provides the booth's core: the per-identity daily quota
//! gate, the crime ledger with its remote mirror, the rotating-credential
//! responder behind the officer and legal-representative conversations, and
//! the orchestrator that sequences a submission.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod booth;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod logging;
pub mod mirror;
pub mod notify;
pub mod poster;
pub mod quota;
pub mod record;
pub mod responder;
pub mod session;
pub mod storage;

pub use booth::{Booth, ConfessionForm, SubmissionOutcome};
pub use config::Config;
pub use conversation::{Conversation, Persona, Reply};
pub use error::{Error, Result};
pub use ledger::{Ledger, LedgerEntry};
pub use logging::init_logging;
pub use quota::{Admission, DenialReason, OverridePrompt, QuotaDecision, RateLimiter};
pub use record::{CrimeReport, Identity, SubmissionRecord, TranscriptEntry};
pub use responder::{CredentialPool, Responder};
pub use storage::{Storage, StorageStats};
