//! Text generation with credential rotation.
//!
//! A [`Responder`] owns a [`CredentialPool`] and a [`TextProvider`]. Every
//! failed call advances the pool's cursor by one (wrapping), so the next
//! call, from any conversation sharing this responder, uses the next
//! credential. The responder never retries on its own; callers decide
//! whether to try again or fall back to a canned reply.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result};

/// Header carrying the Gemini API key.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// A backend that turns an instruction and one user turn into text.
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Generate a reply using `credential`.
    ///
    /// `index` is the credential's position in the pool, for error reporting.
    async fn generate(
        &self,
        credential: &str,
        index: usize,
        system_instruction: &str,
        user_text: &str,
    ) -> Result<String>;
}

/// Interchangeable credentials with a rotating cursor.
#[derive(Debug)]
pub struct CredentialPool {
    credentials: Vec<String>,
    cursor: AtomicUsize,
}

impl CredentialPool {
    /// Create a pool starting at the first credential.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `credentials` is empty.
    pub fn new(credentials: Vec<String>) -> Result<Self> {
        if credentials.is_empty() {
            return Err(Error::config("responder.api_keys must contain at least one key"));
        }
        Ok(Self {
            credentials,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Number of credentials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Always false; an empty pool cannot be constructed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Index of the active credential.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    /// The active credential and its index.
    #[must_use]
    pub fn current(&self) -> (usize, &str) {
        let index = self.cursor() % self.credentials.len();
        (index, &self.credentials[index])
    }

    /// Move to the next credential, wrapping. Returns the new index.
    pub fn advance(&self) -> usize {
        let len = self.credentials.len();
        let previous = self
            .cursor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some((c + 1) % len))
            .unwrap_or_else(|c| c);
        (previous + 1) % len
    }
}

/// Calls a provider with the active credential, rotating on failure.
#[derive(Debug)]
pub struct Responder<P> {
    provider: P,
    pool: CredentialPool,
}

impl<P> Responder<P>
where
    P: TextProvider,
{
    /// Create a responder.
    #[must_use]
    pub fn new(provider: P, pool: CredentialPool) -> Self {
        Self { provider, pool }
    }

    /// The credential pool.
    #[must_use]
    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    /// Ask the provider for a reply to `user_text`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for blank input (the cursor is not
    /// touched), otherwise whatever the provider failed with, after
    /// advancing the cursor.
    pub async fn respond(&self, user_text: &str, system_instruction: &str) -> Result<String> {
        if user_text.trim().is_empty() {
            return Err(Error::validation("message", "Message must not be empty"));
        }

        let (index, credential) = self.pool.current();
        debug!(provider = self.provider.name(), index, "Requesting reply");

        match self
            .provider
            .generate(credential, index, system_instruction, user_text)
            .await
        {
            Ok(text) => Ok(text),
            Err(e) => {
                let next = self.pool.advance();
                warn!(
                    provider = self.provider.name(),
                    error = %e,
                    "Reply failed; switched to credential index {next}"
                );
                Err(e)
            }
        }
    }
}

impl Responder<GeminiProvider> {
    /// Build a Gemini-backed responder from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no API keys are configured or the HTTP client
    /// cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let provider = GeminiProvider::new(
            &config.responder.base_url,
            &config.responder.model,
            config.responder_timeout(),
        )?;
        Ok(Self::new(provider, CredentialPool::new(config.api_keys())?))
    }
}

/// Google Generative Language `generateContent` client.
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: Client,
    base_url: String,
    model: String,
}

impl GeminiProvider {
    /// Create a provider with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
            .filter(|t| !t.trim().is_empty())
    }
}

#[async_trait]
impl TextProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn generate(
        &self,
        credential: &str,
        index: usize,
        system_instruction: &str,
        user_text: &str,
    ) -> Result<String> {
        let body = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: [Part {
                    text: system_instruction,
                }],
            },
            contents: [Content {
                role: Some("user"),
                parts: [Part { text: user_text }],
            }],
        };

        let response = self
            .client
            .post(self.url())
            .header(API_KEY_HEADER, credential)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::ProviderRateLimited { index });
        }
        if !status.is_success() {
            return Err(Error::RemoteStatus {
                service: "gemini",
                status: status.as_u16(),
            });
        }

        let payload: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::provider(format!("malformed response: {e}")))?;
        payload
            .first_text()
            .ok_or_else(|| Error::provider("response had no usable text"))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Provider that replays scripted results and records credentials used.
    struct Scripted {
        results: Mutex<Vec<Result<String>>>,
        used: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(mut results: Vec<Result<String>>) -> Self {
            results.reverse();
            Self {
                results: Mutex::new(results),
                used: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TextProvider for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn generate(
            &self,
            credential: &str,
            _index: usize,
            _system_instruction: &str,
            _user_text: &str,
        ) -> Result<String> {
            self.used.lock().unwrap().push(credential.to_string());
            self.results
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok("default".to_string()))
        }
    }

    fn pool(n: usize) -> CredentialPool {
        CredentialPool::new((0..n).map(|i| format!("key-{i}")).collect()).unwrap()
    }

    fn fail() -> Result<String> {
        Err(Error::provider("boom"))
    }

    #[test]
    fn test_empty_pool_rejected() {
        let err = CredentialPool::new(Vec::new()).unwrap_err();
        assert!(err.to_string().contains("api_keys"));
    }

    #[test]
    fn test_advance_wraps() {
        let pool = pool(3);
        assert_eq!(pool.advance(), 1);
        assert_eq!(pool.advance(), 2);
        assert_eq!(pool.advance(), 0);
        assert_eq!(pool.current(), (0, "key-0"));
    }

    #[tokio::test]
    async fn test_k_failures_rotate_k_mod_len() {
        let provider = Scripted::new((0..7).map(|_| fail()).collect());
        let responder = Responder::new(provider, pool(3));

        for _ in 0..7 {
            assert!(responder.respond("hello", "be brief").await.is_err());
        }
        assert_eq!(responder.pool().cursor(), 7 % 3);
    }

    #[tokio::test]
    async fn test_success_keeps_cursor() {
        let provider = Scripted::new(vec![fail(), Ok("hi there".to_string())]);
        let responder = Responder::new(provider, pool(4));

        assert!(responder.respond("hello", "sys").await.is_err());
        assert_eq!(responder.pool().cursor(), 1);

        assert_eq!(responder.respond("hello", "sys").await.unwrap(), "hi there");
        assert_eq!(responder.pool().cursor(), 1);
    }

    #[tokio::test]
    async fn test_failure_switches_credential_for_next_call() {
        let provider = Scripted::new(vec![fail(), Ok("ok".to_string())]);
        let responder = Responder::new(provider, pool(2));

        let _ = responder.respond("first", "sys").await;
        let _ = responder.respond("second", "sys").await;

        let used = responder.provider.used.lock().unwrap().clone();
        assert_eq!(used, vec!["key-0".to_string(), "key-1".to_string()]);
    }

    #[tokio::test]
    async fn test_no_internal_retry() {
        let provider = Scripted::new(vec![fail()]);
        let responder = Responder::new(provider, pool(3));

        assert!(responder.respond("hello", "sys").await.is_err());
        assert_eq!(responder.provider.used.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_input_does_not_rotate() {
        let provider = Scripted::new(Vec::new());
        let responder = Responder::new(provider, pool(2));

        let err = responder.respond("   ", "sys").await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(responder.pool().cursor(), 0);
        assert!(responder.provider.used.lock().unwrap().is_empty());
    }

    #[test]
    fn test_request_shape() {
        let body = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: [Part { text: "sys" }],
            },
            contents: [Content {
                role: Some("user"),
                parts: [Part { text: "hi" }],
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "sys");
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hi");
    }

    #[test]
    fn test_first_text_extraction() {
        let ok: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hello"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(ok.first_text().as_deref(), Some("Hello"));

        for body in [
            r"{}",
            r#"{"candidates":[]}"#,
            r#"{"candidates":[{"content":{"parts":[]}}]}"#,
            r#"{"candidates":[{"content":{"parts":[{"text":"  "}]}}]}"#,
            r#"{"candidates":[{"finishReason":"SAFETY"}]}"#,
        ] {
            let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
            assert!(parsed.first_text().is_none(), "{body}");
        }
    }

    #[test]
    fn test_from_config_requires_keys() {
        let config = Config::default();
        assert!(Responder::from_config(&config).is_err());
    }
}
