//! Identity model shared by registration and the session

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// What kind of worker is registering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    #[default]
    Service,
    Agent,
}

impl ServiceKind {
    /// Path segment used by `POST /register/{kind}`
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Service => "service",
            ServiceKind::Agent => "agent",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "service" => Ok(ServiceKind::Service),
            "agent" => Ok(ServiceKind::Agent),
            other => Err(Error::config_field_invalid(
                "service.kind",
                format!("Unknown kind '{}'. Valid: service, agent", other),
            )),
        }
    }
}

/// Optional registration metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrationOptions {
    /// Human readable description shown by the platform
    pub description: Option<String>,

    /// JSON schema describing task input and output
    pub schema: Option<Value>,

    /// Last known version; the platform answers with the current one
    pub version: i64,
}

impl RegistrationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }
}

/// Identity assigned by the platform after a successful registration
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceIdentity {
    pub service_id: String,
    pub version: i64,
    pub kind: ServiceKind,
    pub name: String,
    pub description: Option<String>,
    pub schema: Option<Value>,
}
