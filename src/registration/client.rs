//! HTTP registration against the platform
//!
//! 1. Load the persisted service id (missing or unreadable records are ignored)
//! 2. POST /register/{service|agent} with bearer auth
//! 3. Validate the response carries an id
//! 4. Persist the id, then hand the identity back to the caller

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::identity::{RegistrationOptions, ServiceIdentity, ServiceKind};
use super::store::IdentityStore;
use crate::error::{Error, Result};

/// Request body for POST /register/{kind}
#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a Value>,
    version: i64,
}

/// Response body for POST /register/{kind}
#[derive(Debug, Default, Deserialize)]
struct RegisterResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    version: i64,
}

/// Registers services and agents with the platform
#[derive(Debug, Clone)]
pub struct RegistrationClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl RegistrationClient {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("orra-sdk/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Register `name` as `kind`, reusing and then updating the stored identity
    pub async fn register(
        &self,
        store: &dyn IdentityStore,
        kind: ServiceKind,
        name: &str,
        options: &RegistrationOptions,
    ) -> Result<ServiceIdentity> {
        let previous_id = match store.load() {
            Ok(id) => id,
            Err(e) => {
                debug!(error = %e, "Ignoring unreadable persisted identity");
                None
            }
        };

        let url = format!("{}/register/{}", self.api_url, kind.as_str());
        let body = RegisterRequest {
            id: previous_id.as_deref(),
            name,
            description: options.description.as_deref(),
            schema: options.schema.as_ref(),
            version: options.version,
        };

        debug!(url = %url, kind = %kind, service_name = name, known_id = ?previous_id, "Registering");

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(Error::Registration {
                kind: kind.to_string(),
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                body: text,
            });
        }

        // An empty or unreadable body carries no identifier either
        let parsed = match serde_json::from_str::<RegisterResponse>(&text) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, body = %text, kind = %kind, "Unreadable registration response");
                RegisterResponse::default()
            }
        };

        let service_id = match parsed.id {
            Some(id) if !id.is_empty() => id,
            _ => {
                return Err(Error::RegistrationMissingId {
                    kind: kind.to_string(),
                })
            }
        };

        store
            .save(&service_id)
            .map_err(|e| Error::persistence(e.to_string()))?;

        info!(service_id = %service_id, version = parsed.version, kind = %kind, service_name = name, "Registered with platform");

        Ok(ServiceIdentity {
            service_id,
            version: parsed.version,
            kind,
            name: name.to_string(),
            description: options.description.clone(),
            schema: options.schema.clone(),
        })
    }
}
