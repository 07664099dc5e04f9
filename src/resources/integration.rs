//! `cxcloud_integration`: an integration instance and its current config.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::client::models::{
    CreateIntegrationRequest, CredentialRef, IntegrationConfig, IntegrationPatch, IntendedState,
    Integration,
};
use crate::client::ApiError;
use crate::error::ProviderError;
use crate::retry::RetryPolicy;
use crate::schema::{Attribute, Block, NestedBlock, Schema};
use crate::state::{from_state, require_id, to_state};

use super::action_config::parse_json_attribute;
use super::{ManagedResource, OperationContext};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ConfigBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    properties: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    advanced: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    credentials: BTreeMap<String, String>,
}

impl ConfigBlock {
    fn from_remote(config: &IntegrationConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            name: Some(config.name.clone()),
            notes: config.notes.clone(),
            properties: document_text(&config.properties)?,
            advanced: document_text(&config.advanced)?,
            credentials: config
                .credentials
                .iter()
                .map(|(key, cred)| (key.clone(), cred.id.clone()))
                .collect(),
        })
    }

    fn properties(&self) -> Result<Option<Value>, ProviderError> {
        self.properties
            .as_deref()
            .map(|raw| parse_json_attribute("config.properties", raw))
            .transpose()
    }

    fn advanced(&self) -> Result<Option<Value>, ProviderError> {
        self.advanced
            .as_deref()
            .map(|raw| parse_json_attribute("config.advanced", raw))
            .transpose()
    }

    /// Whether applying `other` would change the remote config.
    fn differs_from(&self, other: &ConfigBlock) -> Result<bool, ProviderError> {
        Ok(self.name != other.name
            || self.notes != other.notes
            || self.credentials != other.credentials
            || self.properties()? != other.properties()?
            || self.advanced()? != other.advanced()?)
    }
}

/// Empty documents are left out of state.
fn document_text(value: &Value) -> Result<Option<String>, ProviderError> {
    match value {
        Value::Null => Ok(None),
        Value::Object(map) if map.is_empty() => Ok(None),
        other => Ok(Some(serde_json::to_string(other)?)),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct IntegrationState {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    id: String,
    integration_type: String,
    #[serde(default)]
    intended_state: IntendedState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    config: Option<ConfigBlock>,
}

impl IntegrationState {
    fn from_remote(
        integration: Integration,
        config: &IntegrationConfig,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            id: integration.id,
            integration_type: integration.integration_type,
            intended_state: integration.intended_state,
            config: Some(ConfigBlock::from_remote(config)?),
        })
    }
}

/// Version conflicts and a config that is not readable yet both clear up.
fn config_write_retryable(err: &ApiError) -> bool {
    err.is_version_mismatch() || err.is_not_found()
}

/// Replace the integration's current config, merging over fields left unset.
async fn write_config(
    ctx: &OperationContext,
    id: &str,
    block: &ConfigBlock,
) -> Result<IntegrationConfig, ProviderError> {
    let properties = block.properties()?;
    let advanced = block.advanced()?;
    let credentials: BTreeMap<String, CredentialRef> = block
        .credentials
        .iter()
        .map(|(key, cred)| (key.clone(), CredentialRef { id: cred.clone() }))
        .collect();

    let window = ctx.timeouts.version_conflict;
    let policy = RetryPolicy::new(window.timeout(), window.poll_interval(), config_write_retryable)?;
    let policy = &policy;
    let clients = &ctx.clients;
    let (properties, advanced, credentials) = (&properties, &advanced, &credentials);

    ctx.retry(policy, format!("updating config of integration {}", id), || async move {
        let current = match clients.integrations.get_integration_config(id).await {
            Ok(current) => current,
            Err(err) => return policy.classify(Err(err)),
        };
        let next = IntegrationConfig {
            name: block.name.clone().unwrap_or_else(|| current.name.clone()),
            notes: block.notes.clone(),
            properties: properties.clone().unwrap_or_else(|| current.properties.clone()),
            advanced: advanced.clone().unwrap_or_else(|| current.advanced.clone()),
            credentials: credentials.clone(),
            version: current.version,
        };
        policy.classify(clients.integrations.put_integration_config(id, &next).await)
    })
    .await
}

async fn set_intended_state(
    ctx: &OperationContext,
    id: &str,
    intended_state: IntendedState,
) -> Result<(), ProviderError> {
    let policy = ctx.read_policy()?;
    let policy = &policy;
    let clients = &ctx.clients;
    let patch = &IntegrationPatch { intended_state };
    ctx.retry(
        policy,
        format!("setting state of integration {}", id),
        || async move { policy.classify(clients.integrations.patch_integration(id, patch).await) },
    )
    .await?;
    info!(id, intended_state = intended_state.as_str(), "Updated integration state");
    Ok(())
}

/// Integration instances.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntegrationResource;

#[async_trait]
impl ManagedResource for IntegrationResource {
    fn type_name(&self) -> &'static str {
        "cxcloud_integration"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("An integration instance")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "integration_type",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("Integration type id, e.g. custom-rest-actions"),
            )
            .with_attribute(
                "intended_state",
                Attribute::optional_string()
                    .with_default(json!(IntendedState::default().as_str()))
                    .with_allowed_values(&IntendedState::ALL),
            )
            .with_block(
                "config",
                NestedBlock::single(
                    Block::new()
                        .with_attribute("name", Attribute::optional_computed_string())
                        .with_attribute("notes", Attribute::optional_string())
                        .with_attribute("properties", Attribute::optional_json())
                        .with_attribute("advanced", Attribute::optional_json())
                        .with_attribute(
                            "credentials",
                            Attribute::optional_string_map()
                                .with_description("Credential ids keyed by credential name"),
                        ),
                ),
            )
    }

    async fn create(&self, ctx: &OperationContext, planned: Value) -> Result<Value, ProviderError> {
        let state: IntegrationState = from_state(&planned)?;
        let integration = ctx
            .clients
            .integrations
            .create_integration(&CreateIntegrationRequest {
                integration_type: state.integration_type.clone(),
            })
            .await?;
        let id = integration.id.as_str();
        info!(id, integration_type = %integration.integration_type, "Created integration");

        let finished = async {
            if let Some(config) = &state.config {
                write_config(ctx, id, config).await?;
            }
            if state.intended_state != integration.intended_state {
                set_intended_state(ctx, id, state.intended_state).await?;
            }
            self.read(ctx, json!({ "id": id })).await
        }
        .await;

        match finished {
            Ok(state) => Ok(state),
            Err(err) => {
                let clients = &ctx.clients;
                Err(ctx
                    .discard_failed_create(
                        format!("integration {}", id),
                        err,
                        clients.integrations.delete_integration(id),
                        || async move { clients.integrations.get_integration(id).await.map(|_| ()) },
                    )
                    .await)
            },
        }
    }

    async fn read(&self, ctx: &OperationContext, current: Value) -> Result<Value, ProviderError> {
        let id = require_id(&current)?;
        debug!(id, "Reading integration");
        let policy = ctx.read_policy()?;
        let policy = &policy;
        let clients = &ctx.clients;

        let integration = ctx
            .retry_read(policy, format!("reading integration {}", id), || async move {
                policy.classify(clients.integrations.get_integration(id).await)
            })
            .await?;
        let config = ctx
            .retry_read(
                policy,
                format!("reading config of integration {}", id),
                || async move { policy.classify(clients.integrations.get_integration_config(id).await) },
            )
            .await?;

        to_state(&IntegrationState::from_remote(integration, &config)?)
    }

    async fn update(
        &self,
        ctx: &OperationContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let id = require_id(&prior)?;
        let before: IntegrationState = from_state(&prior)?;
        let after: IntegrationState = from_state(&planned)?;

        if let Some(config) = &after.config {
            let changed = match &before.config {
                Some(previous) => config.differs_from(previous)?,
                None => true,
            };
            if changed {
                let written = write_config(ctx, id, config).await?;
                info!(id, version = written.version, "Updated integration config");
            }
        }
        if after.intended_state != before.intended_state {
            set_intended_state(ctx, id, after.intended_state).await?;
        }
        self.read(ctx, json!({ "id": id })).await
    }

    async fn delete(&self, ctx: &OperationContext, current: Value) -> Result<(), ProviderError> {
        let id = require_id(&current)?;
        let clients = &ctx.clients;
        ctx.delete_and_confirm(
            format!("integration {}", id),
            clients.integrations.delete_integration(id),
            || async move { clients.integrations.get_integration(id).await.map(|_| ()) },
        )
        .await?;
        info!(id, "Deleted integration");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::context;
    use crate::testing::MemoryPlatform;

    fn planned() -> Value {
        json!({
            "integration_type": "custom-rest-actions",
            "intended_state": "ENABLED",
            "config": {
                "name": "Weather API",
                "notes": "managed",
                "properties": "{\"region\": \"eu\"}",
                "credentials": {"basicAuth": "credential-0042"}
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_writes_config_and_state() {
        let platform = MemoryPlatform::new();
        let ctx = context(&platform);

        let state = IntegrationResource.create(&ctx, planned()).await.unwrap();
        let id = state["id"].as_str().unwrap();

        let integration = platform.integration(id).unwrap();
        assert_eq!(integration.name, "Weather API");
        assert_eq!(integration.intended_state, IntendedState::Enabled);

        let config = platform.integration_config(id).unwrap();
        assert_eq!(config.properties, json!({"region": "eu"}));
        assert_eq!(config.credentials["basicAuth"].id, "credential-0042");

        assert_eq!(state["intended_state"], "ENABLED");
        assert_eq!(state["config"]["properties"], "{\"region\":\"eu\"}");
        assert!(state["config"].get("advanced").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_config_write_removes_integration() {
        let platform = MemoryPlatform::new();
        let ctx = context(&platform);
        platform.fail_next_call("put_integration_config", ApiError::new(500, "boom"));

        let err = IntegrationResource.create(&ctx, planned()).await.unwrap_err();

        assert!(matches!(err, ProviderError::Unavailable(_)), "{:?}", err);
        assert_eq!(platform.calls("create_integration"), 1);
        assert_eq!(platform.calls("delete_integration"), 1);
        assert!(platform.integration("integration-0001").is_none());
        assert!(platform.integration_config("integration-0001").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_without_config_uses_defaults() {
        let platform = MemoryPlatform::new();
        let ctx = context(&platform);

        let state = IntegrationResource
            .create(&ctx, json!({"integration_type": "purecloud-data-actions"}))
            .await
            .unwrap();

        assert_eq!(state["intended_state"], "DISABLED");
        assert_eq!(state["config"]["name"], "purecloud-data-actions");
        assert_eq!(platform.calls("put_integration_config"), 0);
        assert_eq!(platform.calls("patch_integration"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_write_retries_version_conflicts() {
        let platform = MemoryPlatform::new();
        let ctx = context(&platform);
        platform.force_version_conflicts(2);

        IntegrationResource.create(&ctx, planned()).await.unwrap();

        assert_eq!(platform.calls("put_integration_config"), 3);
        assert_eq!(platform.calls("get_integration_config"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_only_touches_what_changed() {
        let platform = MemoryPlatform::new();
        let ctx = context(&platform);
        let prior = IntegrationResource.create(&ctx, planned()).await.unwrap();
        let puts = platform.calls("put_integration_config");

        let mut next = prior.clone();
        next["intended_state"] = json!("DISABLED");
        next["config"]["properties"] = json!("{ \"region\" : \"eu\" }");
        let state = IntegrationResource
            .update(&ctx, prior.clone(), next)
            .await
            .unwrap();

        assert_eq!(state["intended_state"], "DISABLED");
        assert_eq!(platform.calls("put_integration_config"), puts);
        assert_eq!(platform.calls("patch_integration"), 2);

        let mut next = state.clone();
        next["config"]["notes"] = json!("changed");
        let state = IntegrationResource.update(&ctx, state, next).await.unwrap();
        assert_eq!(state["config"]["notes"], "changed");
        assert_eq!(platform.calls("put_integration_config"), puts + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_waits_out_read_lag() {
        let platform = MemoryPlatform::new().with_read_lag(2);
        let ctx = context(&platform);

        let state = IntegrationResource
            .create(&ctx, json!({"integration_type": "purecloud-data-actions"}))
            .await
            .unwrap();

        assert!(state["id"].is_string());
        assert_eq!(platform.calls("get_integration"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_confirms_removal() {
        let platform = MemoryPlatform::new().with_delete_lag(1);
        let ctx = context(&platform);
        let state = IntegrationResource.create(&ctx, planned()).await.unwrap();
        let id = state["id"].as_str().unwrap().to_string();

        IntegrationResource.delete(&ctx, state.clone()).await.unwrap();
        assert!(platform.integration(&id).is_none());

        IntegrationResource.delete(&ctx, state).await.unwrap();
        assert_eq!(platform.calls("delete_integration"), 2);
    }
}
