//! Screen flow of one booth session.
//!
//! ```text
//! Question --confess--> Form --submitted--> WantedPoster --closed--> LawyerConsent
//!     |                                                                   |
//!     +--deny--> Interrogation --closed--> Done <--closed-- LawyerChat <--+
//! ```

use std::fmt;

use crate::error::{Error, Result};

/// Where the session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Screen {
    /// "Did you commit a crime?"
    #[default]
    Question,
    /// Confession form and photo capture.
    Form,
    /// Generated wanted poster.
    WantedPoster,
    /// Offer of a legal representative.
    LawyerConsent,
    /// Conversation with the legal representative.
    LawyerChat,
    /// Conversation with the officer after a denial.
    Interrogation,
    /// Session over.
    Done,
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Question => "question",
            Self::Form => "form",
            Self::WantedPoster => "wanted poster",
            Self::LawyerConsent => "lawyer consent",
            Self::LawyerChat => "lawyer chat",
            Self::Interrogation => "interrogation",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Something the subject did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Answered yes.
    Confess,
    /// Answered no.
    Deny,
    /// The confession was accepted.
    Submitted,
    /// The confession was turned away by the quota gate.
    Rejected,
    /// Closed the wanted poster.
    PosterClosed,
    /// Answered the legal-representative offer.
    Consent(bool),
    /// Closed a conversation.
    ChatClosed,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Confess => write!(f, "confess"),
            Self::Deny => write!(f, "deny"),
            Self::Submitted => write!(f, "submit"),
            Self::Rejected => write!(f, "reject"),
            Self::PosterClosed => write!(f, "close the poster"),
            Self::Consent(_) => write!(f, "answer the consent"),
            Self::ChatClosed => write!(f, "close the chat"),
        }
    }
}

impl Screen {
    /// The screen `event` leads to, if it is valid here.
    ///
    /// The legal representative is shown whichever way consent is answered.
    #[must_use]
    pub fn next(self, event: Event) -> Option<Self> {
        use Event as E;
        use Screen as S;

        match (self, event) {
            (S::Question, E::Confess) => Some(S::Form),
            (S::Question, E::Deny) => Some(S::Interrogation),
            (S::Form, E::Submitted) => Some(S::WantedPoster),
            (S::Form, E::Rejected) => Some(S::Question),
            (S::WantedPoster, E::PosterClosed) => Some(S::LawyerConsent),
            (S::LawyerConsent, E::Consent(_)) => Some(S::LawyerChat),
            (S::LawyerChat | S::Interrogation, E::ChatClosed) => Some(S::Done),
            _ => None,
        }
    }
}

/// Tracks the current screen.
#[derive(Debug, Clone, Default)]
pub struct Session {
    screen: Screen,
    consented: Option<bool>,
}

impl Session {
    /// A session on the opening question.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current screen.
    #[must_use]
    pub fn screen(&self) -> Screen {
        self.screen
    }

    /// How the subject answered the legal-representative offer.
    #[must_use]
    pub fn consented(&self) -> Option<bool> {
        self.consented
    }

    /// Apply `event` and return the new screen.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if the event makes no sense on
    /// the current screen; the session is left unchanged.
    pub fn apply(&mut self, event: Event) -> Result<Screen> {
        let next = self
            .screen
            .next(event)
            .ok_or_else(|| Error::InvalidTransition {
                screen: self.screen.to_string(),
                event: event.to_string(),
            })?;
        if let Event::Consent(answer) = event {
            self.consented = Some(answer);
        }
        self.screen = next;
        Ok(next)
    }

    /// Whether the session is over.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.screen == Screen::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confession_path() {
        let mut session = Session::new();
        assert_eq!(session.apply(Event::Confess).unwrap(), Screen::Form);
        assert_eq!(session.apply(Event::Submitted).unwrap(), Screen::WantedPoster);
        assert_eq!(session.apply(Event::PosterClosed).unwrap(), Screen::LawyerConsent);
        assert_eq!(session.apply(Event::Consent(true)).unwrap(), Screen::LawyerChat);
        assert_eq!(session.consented(), Some(true));
        assert_eq!(session.apply(Event::ChatClosed).unwrap(), Screen::Done);
        assert!(session.is_done());
    }

    #[test]
    fn test_declined_consent_still_reaches_chat() {
        assert_eq!(
            Screen::LawyerConsent.next(Event::Consent(false)),
            Some(Screen::LawyerChat)
        );
    }

    #[test]
    fn test_denial_path() {
        let mut session = Session::new();
        assert_eq!(session.apply(Event::Deny).unwrap(), Screen::Interrogation);
        assert_eq!(session.apply(Event::ChatClosed).unwrap(), Screen::Done);
    }

    #[test]
    fn test_rejected_submission_returns_to_question() {
        assert_eq!(Screen::Form.next(Event::Rejected), Some(Screen::Question));
    }

    #[test]
    fn test_invalid_transition_leaves_state() {
        let mut session = Session::new();
        let err = session.apply(Event::PosterClosed).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(err.to_string(), "cannot close the poster from the question screen");
        assert_eq!(session.screen(), Screen::Question);
    }

    #[test]
    fn test_done_is_terminal() {
        for event in [Event::Confess, Event::Deny, Event::ChatClosed] {
            assert_eq!(Screen::Done.next(event), None);
        }
    }
}
