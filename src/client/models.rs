//! Wire models for the integrations API.
//!
//! Field names follow the platform's camelCase JSON. Only the fields the
//! provider reads or writes are modelled.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Integration type whose integrations own a custom auth action.
pub const CUSTOM_REST_ACTIONS_TYPE: &str = "custom-rest-actions";

/// Credential type that makes the platform generate a custom auth action.
pub const USER_DEFINED_OAUTH_TYPE: &str = "userDefinedOAuth";

/// Credential slot inspected for the custom auth precheck.
pub const BASIC_AUTH_CREDENTIAL_KEY: &str = "basicAuth";

/// Id of the custom auth action the platform generates for an integration.
pub fn custom_auth_action_id(integration_id: &str) -> String {
    format!("customAuth_-_{}", integration_id)
}

/// Desired lifecycle state of an integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntendedState {
    /// Integration is active.
    Enabled,
    /// Integration exists but is inactive.
    #[default]
    Disabled,
    /// Integration is marked for removal.
    Deleted,
}

impl IntendedState {
    /// All accepted values, in schema order.
    pub const ALL: [&'static str; 3] = ["ENABLED", "DISABLED", "DELETED"];

    /// The wire name of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "ENABLED",
            Self::Disabled => "DISABLED",
            Self::Deleted => "DELETED",
        }
    }
}

/// An integration instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Integration {
    pub id: String,
    pub name: String,
    pub integration_type: String,
    #[serde(default)]
    pub intended_state: IntendedState,
}

/// Request body for creating an integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntegrationRequest {
    pub integration_type: String,
}

/// Patch body for attributes that can only change through PATCH.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationPatch {
    pub intended_state: IntendedState,
}

/// Reference to a stored credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRef {
    pub id: String,
}

/// The current configuration of an integration.
///
/// `version` must echo the latest server value on PUT; a stale value is
/// rejected with a version mismatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub properties: Value,
    #[serde(default)]
    pub advanced: Value,
    #[serde(default)]
    pub credentials: BTreeMap<String, CredentialRef>,
    #[serde(default)]
    pub version: i64,
}

/// A stored credential. Secret field values are never returned by reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub id: String,
    pub name: String,
    pub credential_type: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

/// Create/update body for a credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialInput {
    pub name: String,
    pub credential_type: String,
    pub fields: BTreeMap<String, String>,
}

/// Outbound request configuration of an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RequestConfig {
    #[serde(default)]
    pub request_url_template: String,
    #[serde(default)]
    pub request_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_template: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Response translation configuration of an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResponseConfig {
    #[serde(default)]
    pub translation_map: BTreeMap<String, String>,
    #[serde(default)]
    pub translation_map_defaults: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_template: Option<String>,
}

/// Request/response configuration of an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ActionConfig {
    #[serde(default)]
    pub request: RequestConfig,
    #[serde(default)]
    pub response: ResponseConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i64>,
}

/// Input and success-output JSON schemas of an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ActionContract {
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub output: Value,
}

/// A published action or an action draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub integration_id: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub config: ActionConfig,
    #[serde(default)]
    pub contract: ActionContract,
    #[serde(default)]
    pub version: i64,
}

/// Create body for actions and drafts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionInput {
    pub name: String,
    pub category: String,
    pub integration_id: String,
    pub secure: bool,
    pub config: ActionConfig,
    pub contract: ActionContract,
}

/// Update body for published actions; `version` must be current.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub version: i64,
    pub config: ActionConfig,
}

/// Update body for drafts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftUpdate {
    pub name: String,
    pub category: String,
    pub secure: bool,
    pub config: ActionConfig,
    pub contract: ActionContract,
}

/// Template files stored alongside an action's configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateFile {
    /// Velocity template for the outbound request body.
    Request,
    /// Velocity template for the translated success response.
    Success,
}

impl TemplateFile {
    /// The file name used by the template endpoint.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Request => "requesttemplate.vm",
            Self::Success => "successtemplate.vm",
        }
    }
}
