//! Conversations with the AI-played counterpart.
//!
//! The counterpart is either the interrogating officer (after a denial) or
//! the legal representative (after a confession). Transcript entries hold
//! the bare text; the persona prefix is only added for display.

use std::fmt;

use tracing::warn;

use crate::error::{Error, Result};
use crate::record::{Speaker, TranscriptEntry};
use crate::responder::{Responder, TextProvider};

/// Status shown when a canned reply was used.
pub const DEGRADED_STATUS: &str = "⚠️ Chat continues (API limited)";

/// Who the subject is talking to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Persona {
    /// Interrogating officer.
    Officer,
    /// State-appointed legal representative.
    LegalRep,
}

impl Persona {
    /// System instruction sent with every turn.
    #[must_use]
    pub fn system_prompt(self) -> &'static str {
        match self {
            Self::Officer => {
                "You are a police interrogation officer. Keep responses brief (1-2 sentences). \
                 Be professional but empathetic."
            }
            Self::LegalRep => {
                "You are a Legal Representative protecting a suspect's rights. Respond \
                 supportively and protectively. Keep responses 1-2 sentences."
            }
        }
    }

    /// Display prefix for the counterpart's lines.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Officer => "🚔 Officer AI: ",
            Self::LegalRep => "📋 Legal Rep: ",
        }
    }

    /// Opening line.
    #[must_use]
    pub fn greeting(self) -> &'static str {
        match self {
            Self::Officer => "You chose not to confess. We have evidence. Please explain yourself.",
            Self::LegalRep => {
                "I am your state-appointed legal representative. My role is to ensure your \
                 rights are protected during this interrogation. How can I help you?"
            }
        }
    }

    /// Reply used when the provider is unavailable.
    #[must_use]
    pub fn fallback(self) -> &'static str {
        match self {
            Self::Officer => "Continue with your statement.",
            Self::LegalRep => "I understand. Please continue, and I'll protect your interests.",
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Officer => write!(f, "officer"),
            Self::LegalRep => write!(f, "legal representative"),
        }
    }
}

/// The counterpart's answer to one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply text without the persona prefix.
    pub text: String,
    /// Whether this is the canned fallback.
    pub degraded: bool,
}

/// A running conversation and its transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    persona: Persona,
    transcript: Vec<TranscriptEntry>,
}

impl Conversation {
    /// Start a conversation with the persona's greeting.
    #[must_use]
    pub fn new(persona: Persona) -> Self {
        Self {
            persona,
            transcript: vec![TranscriptEntry::counterpart(persona.greeting())],
        }
    }

    /// The persona.
    #[must_use]
    pub fn persona(&self) -> Persona {
        self.persona
    }

    /// Transcript so far, greeting included.
    #[must_use]
    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// Consume the conversation, keeping the transcript.
    #[must_use]
    pub fn into_transcript(self) -> Vec<TranscriptEntry> {
        self.transcript
    }

    /// Format one transcript entry for display.
    #[must_use]
    pub fn display(&self, entry: &TranscriptEntry) -> String {
        match entry.speaker {
            Speaker::Subject => format!("👤 You: {}", entry.text),
            Speaker::Counterpart => format!("{}{}", self.persona.prefix(), entry.text),
        }
    }

    /// Send one line and record both sides.
    ///
    /// Without a responder, or when it fails, the persona's fallback is used
    /// and the reply is marked degraded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for blank input; nothing is recorded.
    pub async fn send<P>(&mut self, responder: Option<&Responder<P>>, text: &str) -> Result<Reply>
    where
        P: TextProvider,
    {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::validation("message", "Message must not be empty"));
        }
        self.transcript.push(TranscriptEntry::subject(text));

        let generated = match responder {
            Some(responder) => responder
                .respond(text, self.persona.system_prompt())
                .await
                .map_err(|e| {
                    warn!(persona = %self.persona, error = %e, "Using fallback reply");
                    e
                })
                .ok(),
            None => None,
        };

        let reply = match generated {
            Some(text) => Reply {
                text: text.trim().to_string(),
                degraded: false,
            },
            None => Reply {
                text: self.persona.fallback().to_string(),
                degraded: true,
            },
        };
        self.transcript
            .push(TranscriptEntry::counterpart(reply.text.clone()));
        Ok(reply)
    }
}
