//! Identity resolution.
//!
//! The booth partitions quotas by the caller's public address. Lookup is
//! best effort: when it fails, a synthetic identity is substituted so the
//! flow never blocks on a third party.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::record::Identity;

/// Something that can tell us who is at the booth.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Look the identity up.
    async fn resolve(&self) -> Result<Identity>;

    /// Look the identity up, substituting a synthetic one on failure.
    async fn resolve_or_synthetic(&self) -> Identity {
        match self.resolve().await {
            Ok(identity) => identity,
            Err(e) => {
                let fallback = Identity::synthetic(Utc::now());
                warn!(error = %e, %fallback, "Identity lookup failed; using synthetic identity");
                fallback
            }
        }
    }
}

/// Resolves the public address through an ipify-style JSON endpoint.
#[derive(Debug, Clone)]
pub struct PublicAddressResolver {
    client: Client,
    url: String,
}

#[derive(Deserialize)]
struct AddressResponse {
    ip: String,
}

impl PublicAddressResolver {
    /// Create a resolver for `url`, which must answer `{"ip": "..."}`.
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
}

#[async_trait]
impl IdentityResolver for PublicAddressResolver {
    async fn resolve(&self) -> Result<Identity> {
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(Error::RemoteStatus {
                service: "identity lookup",
                status: response.status().as_u16(),
            });
        }
        let body: AddressResponse = response.json().await?;
        let ip = body.ip.trim();
        if ip.is_empty() {
            return Err(Error::internal("identity lookup returned an empty address"));
        }
        debug!(ip, "Resolved identity");
        Ok(Identity::new(ip))
    }
}

/// Always resolves to the same identity. Useful for kiosks with a known
/// address and for tests.
#[derive(Debug, Clone)]
pub struct FixedIdentity(pub Identity);

#[async_trait]
impl IdentityResolver for FixedIdentity {
    async fn resolve(&self) -> Result<Identity> {
        Ok(self.0.clone())
    }
}
