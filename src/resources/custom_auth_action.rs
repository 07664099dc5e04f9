//! `cxcloud_integration_custom_auth_action`: the auth action the platform
//! generates for custom REST integrations.
//!
//! The platform creates the action together with its integration and never
//! lets it be deleted. "Creating" the resource adopts the generated action and
//! applies the configured blocks; deleting it only forgets it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::client::models::{
    custom_auth_action_id, BASIC_AUTH_CREDENTIAL_KEY, CUSTOM_REST_ACTIONS_TYPE,
    USER_DEFINED_OAUTH_TYPE,
};
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};
use crate::state::{from_state, require_id, to_state};

use super::action_config::{
    flatten_config, merge_config, read_action, request_block, response_block, update_published,
    ActionKind, RequestBlock, ResponseBlock,
};
use super::{ManagedResource, OperationContext};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CustomAuthState {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    id: String,
    integration_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    config_request: Option<RequestBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    config_response: Option<ResponseBlock>,
}

/// Check that the integration is set up for a custom auth action: it must be a
/// custom REST integration whose basic auth credential is user-defined OAuth.
async fn ensure_custom_auth_allowed(
    ctx: &OperationContext,
    integration_id: &str,
) -> Result<(), ProviderError> {
    let policy = ctx.read_policy()?;
    let policy = &policy;
    let clients = &ctx.clients;
    let not_allowed = || {
        ProviderError::InvalidRequest(format!(
            "configuration of integration {} does not allow for a custom auth data action",
            integration_id
        ))
    };

    let integration = ctx
        .retry_read(
            policy,
            format!("reading integration {}", integration_id),
            || async move { policy.classify(clients.integrations.get_integration(integration_id).await) },
        )
        .await?;
    if integration.integration_type != CUSTOM_REST_ACTIONS_TYPE {
        debug!(
            integration_id,
            integration_type = %integration.integration_type,
            "Integration type has no custom auth action"
        );
        return Err(not_allowed());
    }

    let config = ctx
        .retry_read(
            policy,
            format!("reading config of integration {}", integration_id),
            || async move {
                policy.classify(clients.integrations.get_integration_config(integration_id).await)
            },
        )
        .await?;
    let Some(credential_ref) = config.credentials.get(BASIC_AUTH_CREDENTIAL_KEY) else {
        debug!(integration_id, "Integration has no basic auth credential");
        return Err(not_allowed());
    };
    let credential_id = credential_ref.id.as_str();

    let credential = ctx
        .retry_read(
            policy,
            format!("reading credential {}", credential_id),
            || async move { policy.classify(clients.credentials.get_credential(credential_id).await) },
        )
        .await?;
    if credential.credential_type != USER_DEFINED_OAUTH_TYPE {
        debug!(
            integration_id,
            credential_type = %credential.credential_type,
            "Basic auth credential is not user-defined OAuth"
        );
        return Err(not_allowed());
    }
    Ok(())
}

/// Custom auth actions of custom REST integrations.
#[derive(Debug, Default, Clone, Copy)]
pub struct CustomAuthActionResource;

impl CustomAuthActionResource {
    /// Apply the configured name and blocks to the generated action.
    async fn apply(
        &self,
        ctx: &OperationContext,
        id: &str,
        state: &CustomAuthState,
    ) -> Result<Value, ProviderError> {
        let current = read_action(ctx, ActionKind::Published, id, &ctx.lookup_policy()?).await?;
        let name = state.name.clone().unwrap_or_else(|| current.name.clone());
        let config = merge_config(
            current.config,
            state.config_request.as_ref(),
            state.config_response.as_ref(),
            None,
        );

        let action = update_published(ctx, id, Some(name.as_str()), None, &config).await?;
        info!(id, version = action.version, "Updated custom auth action");
        self.read(ctx, json!({ "id": id })).await
    }
}

#[async_trait]
impl ManagedResource for CustomAuthActionResource {
    fn type_name(&self) -> &'static str {
        "cxcloud_integration_custom_auth_action"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("The custom auth action of a custom REST integration")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "integration_id",
                Attribute::required_string().with_force_new(),
            )
            .with_attribute(
                "name",
                Attribute::optional_computed_string()
                    .with_description("Defaults to the name the platform generated"),
            )
            .with_block("config_request", request_block())
            .with_block("config_response", response_block())
    }

    async fn create(&self, ctx: &OperationContext, planned: Value) -> Result<Value, ProviderError> {
        let state: CustomAuthState = from_state(&planned)?;
        ensure_custom_auth_allowed(ctx, &state.integration_id).await?;

        let id = custom_auth_action_id(&state.integration_id);
        debug!(id = %id, "Adopting generated custom auth action");
        self.apply(ctx, &id, &state).await
    }

    async fn read(&self, ctx: &OperationContext, current: Value) -> Result<Value, ProviderError> {
        let id = require_id(&current)?;
        debug!(id, "Reading custom auth action");
        let action = read_action(ctx, ActionKind::Published, id, &ctx.read_policy()?).await?;
        let (request, response) = flatten_config(&action.config);
        to_state(&CustomAuthState {
            id: action.id,
            integration_id: action.integration_id,
            name: Some(action.name),
            config_request: Some(request),
            config_response: Some(response),
        })
    }

    async fn update(
        &self,
        ctx: &OperationContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let id = require_id(&prior)?;
        let state: CustomAuthState = from_state(&planned)?;
        self.apply(ctx, id, &state).await
    }

    async fn delete(&self, _ctx: &OperationContext, current: Value) -> Result<(), ProviderError> {
        let id = require_id(&current)?;
        warn!(
            id,
            "Custom auth actions cannot be deleted; removing it from state only"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::models::{CreateIntegrationRequest, CredentialInput, IntegrationConfig};
    use crate::client::{ApiError, CredentialsApi, IntegrationsApi};
    use crate::resources::test_support::context;
    use crate::testing::MemoryPlatform;
    use std::collections::BTreeMap;

    async fn custom_rest_integration(platform: &MemoryPlatform, credential_type: &str) -> String {
        let credential = platform
            .create_credential(&CredentialInput {
                name: "auth".into(),
                credential_type: credential_type.into(),
                fields: BTreeMap::new(),
            })
            .await
            .unwrap();
        let integration = platform
            .create_integration(&CreateIntegrationRequest {
                integration_type: CUSTOM_REST_ACTIONS_TYPE.into(),
            })
            .await
            .unwrap();
        let mut credentials = BTreeMap::new();
        credentials.insert(
            BASIC_AUTH_CREDENTIAL_KEY.to_string(),
            crate::client::models::CredentialRef { id: credential.id },
        );
        platform
            .put_integration_config(
                &integration.id,
                &IntegrationConfig {
                    name: "Auth API".into(),
                    credentials,
                    version: 1,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        integration.id
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_adopts_generated_action() {
        let platform = MemoryPlatform::new();
        let ctx = context(&platform);
        let integration_id = custom_rest_integration(&platform, USER_DEFINED_OAUTH_TYPE).await;

        let state = CustomAuthActionResource
            .create(
                &ctx,
                json!({
                    "integration_id": integration_id,
                    "config_request": {
                        "request_url_template": "https://auth.example.com/token",
                        "request_type": "POST",
                        "request_template": "grant_type=client_credentials"
                    }
                }),
            )
            .await
            .unwrap();

        let id = custom_auth_action_id(&integration_id);
        assert_eq!(state["id"], id.as_str());
        assert_eq!(state["name"], format!("Custom Auth - {}", integration_id));
        assert_eq!(state["integration_id"], integration_id.as_str());
        assert_eq!(
            state["config_request"]["request_template"],
            "grant_type=client_credentials"
        );
        assert_eq!(
            platform.action(&id).unwrap().config.request.request_type,
            "POST"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_waits_for_lagging_integration_config() {
        let platform = MemoryPlatform::new();
        let ctx = context(&platform);
        let integration_id = custom_rest_integration(&platform, USER_DEFINED_OAUTH_TYPE).await;
        platform.fail_next_call(
            "get_integration_config",
            ApiError::not_found("integration config", &integration_id),
        );

        let state = CustomAuthActionResource
            .create(&ctx, json!({ "integration_id": integration_id }))
            .await
            .unwrap();

        assert_eq!(state["id"], custom_auth_action_id(&integration_id).as_str());
        assert_eq!(platform.calls("get_integration_config"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_rejects_wrong_credential_type() {
        let platform = MemoryPlatform::new();
        let ctx = context(&platform);
        let integration_id = custom_rest_integration(&platform, "basicAuth").await;

        let err = CustomAuthActionResource
            .create(&ctx, json!({"integration_id": integration_id}))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::InvalidRequest(_)));
        assert!(err.message().contains("does not allow for a custom auth data action"));
        assert_eq!(platform.calls("update_action"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_rejects_other_integration_types() {
        let platform = MemoryPlatform::new();
        let ctx = context(&platform);
        let integration = platform
            .create_integration(&CreateIntegrationRequest {
                integration_type: "purecloud-data-actions".into(),
            })
            .await
            .unwrap();

        let err = CustomAuthActionResource
            .create(&ctx, json!({"integration_id": integration.id}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rename_keeps_existing_config() {
        let platform = MemoryPlatform::new();
        let ctx = context(&platform);
        let integration_id = custom_rest_integration(&platform, USER_DEFINED_OAUTH_TYPE).await;
        let prior = CustomAuthActionResource
            .create(
                &ctx,
                json!({
                    "integration_id": integration_id,
                    "config_response": {"success_template": "{\"token\": ${rawResult}}"}
                }),
            )
            .await
            .unwrap();

        let state = CustomAuthActionResource
            .update(
                &ctx,
                prior.clone(),
                json!({"id": prior["id"], "integration_id": integration_id, "name": "Token"}),
            )
            .await
            .unwrap();

        assert_eq!(state["name"], "Token");
        assert_eq!(
            state["config_response"]["success_template"],
            "{\"token\": ${rawResult}}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_leaves_action_in_place() {
        let platform = MemoryPlatform::new();
        let ctx = context(&platform);
        let integration_id = custom_rest_integration(&platform, USER_DEFINED_OAUTH_TYPE).await;
        let id = custom_auth_action_id(&integration_id);

        CustomAuthActionResource
            .delete(&ctx, json!({"id": id}))
            .await
            .unwrap();

        assert!(platform.action(&id).is_some());
        assert_eq!(platform.calls("delete_action"), 0);
    }
}
