//! Provider configuration.
//!
//! The configure payload is parsed into [`ProviderConfig`]. Credentials and
//! region left unset fall back to `CXCLOUD_*` environment variables, and every
//! retrying call site reads its window from [`RetryTimeouts`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;
use crate::schema::{Attribute, Block, Diagnostic, NestedBlock, Schema};
use crate::state::from_state;

/// Environment variable for the OAuth client id.
pub const ENV_OAUTHCLIENT_ID: &str = "CXCLOUD_OAUTHCLIENT_ID";
/// Environment variable for the OAuth client secret.
pub const ENV_OAUTHCLIENT_SECRET: &str = "CXCLOUD_OAUTHCLIENT_SECRET";
/// Environment variable for a pre-issued access token.
pub const ENV_ACCESS_TOKEN: &str = "CXCLOUD_ACCESS_TOKEN";
/// Environment variable for the region.
pub const ENV_REGION: &str = "CXCLOUD_REGION";

/// Region used when neither configuration nor environment names one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Regions the platform is deployed in.
pub const REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-2",
    "ca-central-1",
    "sa-east-1",
    "eu-west-1",
    "eu-west-2",
    "eu-central-1",
    "eu-central-2",
    "ap-south-1",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ap-southeast-2",
    "me-central-1",
];

/// Deadline and poll interval of one kind of retrying call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryWindow {
    /// Upper bound on total retry time, in seconds.
    pub timeout_seconds: u64,
    /// Delay between attempts, in milliseconds.
    pub poll_interval_ms: u64,
}

impl RetryWindow {
    /// Create a window.
    pub const fn new(timeout_seconds: u64, poll_interval_ms: u64) -> Self {
        Self {
            timeout_seconds,
            poll_interval_ms,
        }
    }

    /// The deadline as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// The poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Retry windows per call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryTimeouts {
    /// Reads after create or update.
    pub read: RetryWindow,
    /// Delete confirmation.
    pub delete: RetryWindow,
    /// Data source lookups and waits for auto-generated objects.
    pub lookup: RetryWindow,
    /// Versioned writes that lost a race.
    pub version_conflict: RetryWindow,
    /// Action creates rejected while the parent integration settles.
    pub create: RetryWindow,
}

impl Default for RetryTimeouts {
    fn default() -> Self {
        Self {
            read: RetryWindow::new(300, 2000),
            delete: RetryWindow::new(30, 2000),
            lookup: RetryWindow::new(15, 1000),
            version_conflict: RetryWindow::new(30, 500),
            create: RetryWindow::new(30, 500),
        }
    }
}

/// Parsed provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// OAuth client id.
    #[serde(default)]
    pub oauthclient_id: Option<String>,
    /// OAuth client secret.
    #[serde(default)]
    pub oauthclient_secret: Option<String>,
    /// Pre-issued access token; takes precedence over client credentials.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Platform region.
    #[serde(default)]
    pub region: String,
    /// Retry windows.
    #[serde(default)]
    pub timeouts: RetryTimeouts,
}

impl ProviderConfig {
    /// Parse the configure payload, falling back to the process environment.
    pub fn from_value(config: &Value) -> Result<Self, ProviderError> {
        Self::from_value_with_env(config, |key| std::env::var(key).ok())
    }

    /// Parse the configure payload, falling back to `env` for unset values.
    pub fn from_value_with_env<F>(config: &Value, env: F) -> Result<Self, ProviderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut parsed: ProviderConfig = from_state(config)?;
        parsed.apply_env(&env);

        let errors: Vec<String> = parsed
            .diagnostics()
            .into_iter()
            .map(|d| d.summary)
            .collect();
        if !errors.is_empty() {
            return Err(ProviderError::Configuration(errors.join("; ")));
        }
        Ok(parsed)
    }

    fn apply_env<F>(&mut self, env: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|v| !v.is_empty());
        if is_blank(&self.oauthclient_id) {
            self.oauthclient_id = lookup(ENV_OAUTHCLIENT_ID);
        }
        if is_blank(&self.oauthclient_secret) {
            self.oauthclient_secret = lookup(ENV_OAUTHCLIENT_SECRET);
        }
        if is_blank(&self.access_token) {
            self.access_token = lookup(ENV_ACCESS_TOKEN);
        }
        if self.region.is_empty() {
            self.region = lookup(ENV_REGION).unwrap_or_else(|| DEFAULT_REGION.to_string());
        }
    }

    /// Problems that make the configuration unusable.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        if !REGIONS.contains(&self.region.as_str()) {
            diagnostics.push(
                Diagnostic::error(format!("Unknown region \"{}\"", self.region))
                    .with_detail(format!("Expected one of [{}]", REGIONS.join(", ")))
                    .with_attribute("region"),
            );
        }

        let has_client_credentials =
            !is_blank(&self.oauthclient_id) && !is_blank(&self.oauthclient_secret);
        if is_blank(&self.access_token) && !has_client_credentials {
            diagnostics.push(
                Diagnostic::error(
                    "Either access_token or both oauthclient_id and oauthclient_secret must be set",
                )
                .with_detail(format!(
                    "Set them in the provider block or through {}, {}, or {}",
                    ENV_ACCESS_TOKEN, ENV_OAUTHCLIENT_ID, ENV_OAUTHCLIENT_SECRET
                )),
            );
        }

        diagnostics
    }

    /// A configuration with an access token and default windows.
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self {
            oauthclient_id: None,
            oauthclient_secret: None,
            access_token: Some("test-token".to_string()),
            region: DEFAULT_REGION.to_string(),
            timeouts: RetryTimeouts::default(),
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, str::is_empty)
}

fn window_block(description: &str) -> NestedBlock {
    NestedBlock::single(
        Block::new()
            .with_description(description)
            .with_attribute(
                "timeout_seconds",
                Attribute::required_int64()
                    .with_int_range(1, 3600)
                    .with_description("Upper bound on total retry time"),
            )
            .with_attribute(
                "poll_interval_ms",
                Attribute::required_int64()
                    .with_int_range(1, 60_000)
                    .with_description("Delay between attempts"),
            ),
    )
}

/// Schema of the provider configuration block.
pub fn provider_config_schema() -> Schema {
    Schema::v0()
        .with_attribute(
            "oauthclient_id",
            Attribute::optional_string().with_description(format!(
                "OAuth client id. Can be set with {}.",
                ENV_OAUTHCLIENT_ID
            )),
        )
        .with_attribute(
            "oauthclient_secret",
            Attribute::optional_string().sensitive().with_description(format!(
                "OAuth client secret. Can be set with {}.",
                ENV_OAUTHCLIENT_SECRET
            )),
        )
        .with_attribute(
            "access_token",
            Attribute::optional_string().sensitive().with_description(format!(
                "Pre-issued access token. Can be set with {}.",
                ENV_ACCESS_TOKEN
            )),
        )
        .with_attribute(
            "region",
            Attribute::optional_string()
                .with_allowed_values(REGIONS)
                .with_description(format!(
                    "Platform region. Can be set with {}. Defaults to {}.",
                    ENV_REGION, DEFAULT_REGION
                )),
        )
        .with_block(
            "timeouts",
            NestedBlock::single(
                Block::new()
                    .with_block("read", window_block("Reads after create or update"))
                    .with_block("delete", window_block("Delete confirmation"))
                    .with_block("lookup", window_block("Lookups by name"))
                    .with_block(
                        "version_conflict",
                        window_block("Versioned writes that lost a race"),
                    )
                    .with_block("create", window_block("Action creates")),
            ),
        )
}
