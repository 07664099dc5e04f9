//! Request/response configuration shared by actions, drafts, and custom auth
//! actions, plus the fetch-and-overlay read they all use.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::client::models::{
    Action, ActionConfig, ActionContract, ActionUpdate, RequestConfig, ResponseConfig,
    TemplateFile,
};
use crate::client::{ApiClients, ApiResult};
use crate::error::ProviderError;
use crate::retry::{Outcome, RetryPolicy};
use crate::schema::{Attribute, Block, NestedBlock, Schema};

use super::OperationContext;

pub(crate) const DEFAULT_REQUEST_TEMPLATE: &str = "${input.rawRequest}";
pub(crate) const DEFAULT_SUCCESS_TEMPLATE: &str = "${rawResult}";
const REQUEST_TYPES: &[&str] = &["GET", "PUT", "POST", "PATCH", "DELETE"];

fn default_request_template() -> String {
    DEFAULT_REQUEST_TEMPLATE.to_string()
}

fn default_success_template() -> String {
    DEFAULT_SUCCESS_TEMPLATE.to_string()
}

/// The `config_request` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct RequestBlock {
    pub request_url_template: String,
    pub request_type: String,
    #[serde(default = "default_request_template")]
    pub request_template: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl RequestBlock {
    fn from_config(config: &RequestConfig) -> Self {
        Self {
            request_url_template: config.request_url_template.clone(),
            request_type: config.request_type.clone(),
            request_template: config
                .request_template
                .clone()
                .unwrap_or_else(default_request_template),
            headers: config.headers.clone(),
        }
    }

    fn to_config(&self) -> RequestConfig {
        RequestConfig {
            request_url_template: self.request_url_template.clone(),
            request_type: self.request_type.clone(),
            request_template: Some(self.request_template.clone()),
            headers: self.headers.clone(),
        }
    }
}

/// The `config_response` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ResponseBlock {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub translation_map: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub translation_map_defaults: BTreeMap<String, String>,
    #[serde(default = "default_success_template")]
    pub success_template: String,
}

impl ResponseBlock {
    fn from_config(config: &ResponseConfig) -> Self {
        Self {
            translation_map: config.translation_map.clone(),
            translation_map_defaults: config.translation_map_defaults.clone(),
            success_template: config
                .success_template
                .clone()
                .unwrap_or_else(default_success_template),
        }
    }

    fn to_config(&self) -> ResponseConfig {
        ResponseConfig {
            translation_map: self.translation_map.clone(),
            translation_map_defaults: self.translation_map_defaults.clone(),
            success_template: Some(self.success_template.clone()),
        }
    }
}

/// Overlay the configured blocks onto `base`, keeping parts left unset.
pub(crate) fn merge_config(
    base: ActionConfig,
    request: Option<&RequestBlock>,
    response: Option<&ResponseBlock>,
    timeout_seconds: Option<i64>,
) -> ActionConfig {
    ActionConfig {
        request: request.map(RequestBlock::to_config).unwrap_or(base.request),
        response: response.map(ResponseBlock::to_config).unwrap_or(base.response),
        timeout_seconds: timeout_seconds.or(base.timeout_seconds),
    }
}

/// Flatten an action's config into its two blocks.
pub(crate) fn flatten_config(config: &ActionConfig) -> (RequestBlock, ResponseBlock) {
    (
        RequestBlock::from_config(&config.request),
        ResponseBlock::from_config(&config.response),
    )
}

/// Parse a JSON schema document held in a string attribute.
pub(crate) fn parse_json_attribute(name: &str, raw: &str) -> Result<Value, ProviderError> {
    serde_json::from_str(raw)
        .map_err(|e| ProviderError::Validation(format!("{} is not valid JSON: {}", name, e)))
}

pub(crate) fn parse_contract(input: &str, output: &str) -> Result<ActionContract, ProviderError> {
    Ok(ActionContract {
        input: parse_json_attribute("contract_input", input)?,
        output: parse_json_attribute("contract_output", output)?,
    })
}

/// Compact JSON text for a contract document; empty documents become `{}`.
pub(crate) fn contract_text(value: &Value) -> Result<String, ProviderError> {
    if value.is_null() {
        return Ok("{}".to_string());
    }
    Ok(serde_json::to_string(value)?)
}

pub(crate) fn request_block() -> NestedBlock {
    NestedBlock::single(
        Block::new()
            .with_description("How the action calls the remote endpoint")
            .with_attribute(
                "request_url_template",
                Attribute::required_string().with_description("URL that may include placeholders"),
            )
            .with_attribute(
                "request_type",
                Attribute::required_string().with_allowed_values(REQUEST_TYPES),
            )
            .with_attribute(
                "request_template",
                Attribute::optional_string().with_default(json!(DEFAULT_REQUEST_TEMPLATE)),
            )
            .with_attribute("headers", Attribute::optional_string_map()),
    )
    .with_max_items(1)
}

pub(crate) fn response_block() -> NestedBlock {
    NestedBlock::single(
        Block::new()
            .with_description("How the action maps the remote response")
            .with_attribute("translation_map", Attribute::optional_string_map())
            .with_attribute("translation_map_defaults", Attribute::optional_string_map())
            .with_attribute(
                "success_template",
                Attribute::optional_string().with_default(json!(DEFAULT_SUCCESS_TEMPLATE)),
            ),
    )
    .with_max_items(1)
}

/// Schema of actions and drafts. Published actions cannot change their
/// contracts or `secure` flag in place.
pub(crate) fn action_schema(description: &str, contract_updatable: bool) -> Schema {
    let fixed = |attr: Attribute| {
        if contract_updatable {
            attr
        } else {
            attr.with_force_new()
        }
    };
    Schema::v0()
        .with_description(description)
        .with_attribute("id", Attribute::computed_string())
        .with_attribute("name", Attribute::required_string())
        .with_attribute("category", Attribute::required_string())
        .with_attribute(
            "integration_id",
            Attribute::required_string().with_force_new(),
        )
        .with_attribute(
            "secure",
            fixed(Attribute::optional_bool().with_default(json!(false))),
        )
        .with_attribute(
            "config_timeout_seconds",
            Attribute::optional_int64().with_int_range(1, 60),
        )
        .with_attribute("contract_input", fixed(Attribute::required_json()))
        .with_attribute("contract_output", fixed(Attribute::required_json()))
        .with_block("config_request", request_block())
        .with_block("config_response", response_block())
}

/// State of an action or draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ActionState {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    pub category: String,
    pub integration_id: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_timeout_seconds: Option<i64>,
    pub contract_input: String,
    pub contract_output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_request: Option<RequestBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_response: Option<ResponseBlock>,
}

impl ActionState {
    pub fn from_action(action: &Action) -> Result<Self, ProviderError> {
        let (request, response) = flatten_config(&action.config);
        Ok(Self {
            id: action.id.clone(),
            name: action.name.clone(),
            category: action.category.clone(),
            integration_id: action.integration_id.clone(),
            secure: action.secure,
            config_timeout_seconds: action.config.timeout_seconds,
            contract_input: contract_text(&action.contract.input)?,
            contract_output: contract_text(&action.contract.output)?,
            config_request: Some(request),
            config_response: Some(response),
        })
    }

    pub fn config(&self) -> ActionConfig {
        merge_config(
            ActionConfig::default(),
            self.config_request.as_ref(),
            self.config_response.as_ref(),
            self.config_timeout_seconds,
        )
    }

    pub fn contract(&self) -> Result<ActionContract, ProviderError> {
        parse_contract(&self.contract_input, &self.contract_output)
    }
}

/// Which collection an action lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActionKind {
    Published,
    Draft,
}

impl ActionKind {
    pub fn noun(&self) -> &'static str {
        match self {
            Self::Published => "action",
            Self::Draft => "action draft",
        }
    }

    pub async fn get(&self, clients: &ApiClients, id: &str) -> ApiResult<Action> {
        match self {
            Self::Published => clients.actions.get_action(id).await,
            Self::Draft => clients.drafts.get_draft(id).await,
        }
    }

    async fn template(&self, clients: &ApiClients, id: &str, file: TemplateFile) -> ApiResult<String> {
        match self {
            Self::Published => clients.actions.get_action_template(id, file).await,
            Self::Draft => clients.drafts.get_draft_template(id, file).await,
        }
    }
}

/// Fetch an action, waiting out read lag, and fill in its template bodies.
pub(crate) async fn read_action(
    ctx: &OperationContext,
    kind: ActionKind,
    id: &str,
    policy: &RetryPolicy,
) -> Result<Action, ProviderError> {
    let clients = &ctx.clients;
    let mut action = ctx
        .retry_read(policy, format!("reading {} {}", kind.noun(), id), || async move {
            policy.classify(kind.get(clients, id).await)
        })
        .await?;

    let request = kind.template(clients, id, TemplateFile::Request).await?;
    let success = kind.template(clients, id, TemplateFile::Success).await?;
    action.config.request.request_template = Some(request);
    action.config.response.success_template = Some(success);
    Ok(action)
}

/// Update a published action, retrying when another writer bumps its version.
pub(crate) async fn update_published(
    ctx: &OperationContext,
    id: &str,
    name: Option<&str>,
    category: Option<&str>,
    config: &ActionConfig,
) -> Result<Action, ProviderError> {
    let policy = ctx.version_policy()?;
    let policy = &policy;
    let clients = &ctx.clients;
    ctx.retry(policy, format!("updating action {}", id), || async move {
        let current = match clients.actions.get_action(id).await {
            Ok(current) => current,
            Err(err) => return Outcome::Fatal(err.into()),
        };
        let update = ActionUpdate {
            name: name.map(str::to_string),
            category: category.map(str::to_string),
            version: current.version,
            config: config.clone(),
        };
        policy.classify(clients.actions.update_action(id, &update).await)
    })
    .await
}
