//! `cxcloud_integration_action`: a published data action.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::client::models::ActionInput;
use crate::error::ProviderError;
use crate::schema::Schema;
use crate::state::{from_state, require_id, to_state};

use super::action_config::{self, read_action, update_published, ActionKind, ActionState};
use super::{ManagedResource, OperationContext};

/// Published integration actions.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntegrationActionResource;

#[async_trait]
impl ManagedResource for IntegrationActionResource {
    fn type_name(&self) -> &'static str {
        "cxcloud_integration_action"
    }

    fn schema(&self) -> Schema {
        action_config::action_schema("A published integration action", false)
    }

    async fn create(&self, ctx: &OperationContext, planned: Value) -> Result<Value, ProviderError> {
        let state: ActionState = from_state(&planned)?;
        let input = ActionInput {
            name: state.name.clone(),
            category: state.category.clone(),
            integration_id: state.integration_id.clone(),
            secure: state.secure,
            config: state.config(),
            contract: state.contract()?,
        };

        let policy = ctx.create_policy()?;
        let policy = &policy;
        let clients = &ctx.clients;
        let input = &input;
        let action = ctx
            .retry(
                policy,
                format!("creating action {}", state.name),
                || async move { policy.classify(clients.actions.create_action(input).await) },
            )
            .await?;

        info!(id = %action.id, name = %action.name, "Created integration action");

        let id = action.id.as_str();
        match self.read(ctx, json!({ "id": id })).await {
            Ok(state) => Ok(state),
            Err(err) => Err(ctx
                .discard_failed_create(
                    format!("action {}", id),
                    err,
                    clients.actions.delete_action(id),
                    || async move { clients.actions.get_action(id).await.map(|_| ()) },
                )
                .await),
        }
    }

    async fn read(&self, ctx: &OperationContext, current: Value) -> Result<Value, ProviderError> {
        let id = require_id(&current)?;
        debug!(id, "Reading integration action");
        let action = read_action(ctx, ActionKind::Published, id, &ctx.read_policy()?).await?;
        to_state(&ActionState::from_action(&action)?)
    }

    async fn update(
        &self,
        ctx: &OperationContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let id = require_id(&prior)?;
        let state: ActionState = from_state(&planned)?;

        let action = update_published(
            ctx,
            id,
            Some(state.name.as_str()),
            Some(state.category.as_str()),
            &state.config(),
        )
        .await?;

        info!(id, version = action.version, "Updated integration action");
        self.read(ctx, json!({ "id": id })).await
    }

    async fn delete(&self, ctx: &OperationContext, current: Value) -> Result<(), ProviderError> {
        let id = require_id(&current)?;
        let clients = &ctx.clients;
        ctx.delete_and_confirm(
            format!("action {}", id),
            clients.actions.delete_action(id),
            || async move { clients.actions.get_action(id).await.map(|_| ()) },
        )
        .await?;
        info!(id, "Deleted integration action");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::models::CreateIntegrationRequest;
    use crate::client::{ApiError, IntegrationsApi};
    use crate::resources::test_support::context;
    use crate::testing::MemoryPlatform;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_failed_read_back_removes_action() {
        let platform = MemoryPlatform::new();
        let ctx = context(&platform);
        let integration_id = integration(&platform).await;
        platform.fail_next_call("get_action_template", ApiError::new(500, "template store down"));

        let err = IntegrationActionResource
            .create(&ctx, planned(&integration_id))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Unavailable(_)), "{:?}", err);
        assert_eq!(platform.calls("delete_action"), 1);
        assert!(platform.action("action-0002").is_none());
        assert!(platform.integration(&integration_id).is_some());
    }

    async fn integration(platform: &MemoryPlatform) -> String {
        platform
            .create_integration(&CreateIntegrationRequest {
                integration_type: "purecloud-data-actions".into(),
            })
            .await
            .unwrap()
            .id
    }

    fn planned(integration_id: &str) -> Value {
        json!({
            "name": "Lookup",
            "category": "Custom",
            "integration_id": integration_id,
            "secure": false,
            "contract_input": "{\"type\": \"object\"}",
            "contract_output": "{\"type\": \"object\"}",
            "config_request": {
                "request_url_template": "https://example.com/${input.id}",
                "request_type": "GET",
                "request_template": "${input.rawRequest}"
            },
            "config_response": {
                "translation_map": {"name": "$.name"},
                "success_template": "${rawResult}"
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_and_read_back_templates() {
        let platform = MemoryPlatform::new();
        let ctx = context(&platform);
        let integration_id = integration(&platform).await;

        let state = IntegrationActionResource
            .create(&ctx, planned(&integration_id))
            .await
            .unwrap();

        assert_eq!(state["name"], "Lookup");
        assert_eq!(state["config_request"]["request_template"], "${input.rawRequest}");
        assert_eq!(state["config_response"]["success_template"], "${rawResult}");
        assert_eq!(state["contract_input"], "{\"type\":\"object\"}");
        assert_eq!(platform.calls("get_action_template"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_retries_while_integration_settles() {
        let platform = MemoryPlatform::new();
        let ctx = context(&platform);
        let integration_id = integration(&platform).await;
        platform.reject_action_creates(2);

        let start = tokio::time::Instant::now();
        let state = IntegrationActionResource
            .create(&ctx, planned(&integration_id))
            .await
            .unwrap();

        assert!(state["id"].is_string());
        assert_eq!(platform.calls("create_action"), 3);
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_waits_out_read_lag() {
        let platform = MemoryPlatform::new().with_read_lag(3);
        let ctx = context(&platform);
        let integration_id = integration(&platform).await;

        let state = IntegrationActionResource
            .create(&ctx, planned(&integration_id))
            .await
            .unwrap();

        assert_eq!(state["integration_id"], integration_id.as_str());
        assert_eq!(platform.calls("get_action"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_survives_version_conflicts() {
        let platform = MemoryPlatform::new();
        let ctx = context(&platform);
        let integration_id = integration(&platform).await;
        let prior = IntegrationActionResource
            .create(&ctx, planned(&integration_id))
            .await
            .unwrap();

        platform.force_version_conflicts(2);
        let mut next = prior.clone();
        next["name"] = json!("Lookup v2");
        next["config_request"]["request_type"] = json!("POST");

        let state = IntegrationActionResource
            .update(&ctx, prior.clone(), next)
            .await
            .unwrap();

        assert_eq!(state["name"], "Lookup v2");
        assert_eq!(state["config_request"]["request_type"], "POST");
        assert_eq!(platform.calls("update_action"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_template_is_not_found() {
        let platform = MemoryPlatform::new();
        let ctx = context(&platform);
        let integration_id = integration(&platform).await;
        let state = IntegrationActionResource
            .create(&ctx, planned(&integration_id))
            .await
            .unwrap();

        platform.fail_next_call(
            "get_action_template",
            ApiError::not_found("requesttemplate.vm", state["id"].as_str().unwrap()),
        );
        let err = IntegrationActionResource.read(&ctx, state).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_waits_for_removal() {
        let platform = MemoryPlatform::new().with_delete_lag(2);
        let ctx = context(&platform);
        let integration_id = integration(&platform).await;
        let state = IntegrationActionResource
            .create(&ctx, planned(&integration_id))
            .await
            .unwrap();
        let id = state["id"].as_str().unwrap().to_string();

        IntegrationActionResource.delete(&ctx, state).await.unwrap();

        assert!(platform.action(&id).is_none());
        assert_eq!(platform.calls("delete_action"), 1);
    }
}
