//! `cxcloud_integration_action_draft`: an unpublished action.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::client::models::{ActionInput, DraftUpdate};
use crate::error::ProviderError;
use crate::schema::Schema;
use crate::state::{from_state, require_id, to_state};

use super::action_config::{self, read_action, ActionKind, ActionState};
use super::{ManagedResource, OperationContext};

/// Action drafts. Unlike published actions, every attribute but the parent
/// integration can change in place.
#[derive(Debug, Default, Clone, Copy)]
pub struct ActionDraftResource;

#[async_trait]
impl ManagedResource for ActionDraftResource {
    fn type_name(&self) -> &'static str {
        "cxcloud_integration_action_draft"
    }

    fn schema(&self) -> Schema {
        action_config::action_schema("An unpublished integration action", true)
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

        let clients = &ctx.clients;
        let draft = clients.drafts.create_draft(&input).await?;
        info!(id = %draft.id, name = %draft.name, "Created action draft");

        let id = draft.id.as_str();
        match self.read(ctx, json!({ "id": id })).await {
            Ok(state) => Ok(state),
            Err(err) => Err(ctx
                .discard_failed_create(
                    format!("action draft {}", id),
                    err,
                    clients.drafts.delete_draft(id),
                    || async move { clients.drafts.get_draft(id).await.map(|_| ()) },
                )
                .await),
        }
    }

    async fn read(&self, ctx: &OperationContext, current: Value) -> Result<Value, ProviderError> {
        let id = require_id(&current)?;
        debug!(id, "Reading action draft");
        let draft = read_action(ctx, ActionKind::Draft, id, &ctx.read_policy()?).await?;
        to_state(&ActionState::from_action(&draft)?)
    }

    async fn update(
        &self,
        ctx: &OperationContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let id = require_id(&prior)?;
        let state: ActionState = from_state(&planned)?;
        let update = DraftUpdate {
            name: state.name.clone(),
            category: state.category.clone(),
            secure: state.secure,
            config: state.config(),
            contract: state.contract()?,
        };

        ctx.clients.drafts.update_draft(id, &update).await?;
        info!(id, "Updated action draft");
        self.read(ctx, json!({ "id": id })).await
    }

    async fn delete(&self, ctx: &OperationContext, current: Value) -> Result<(), ProviderError> {
        let id = require_id(&current)?;
        let clients = &ctx.clients;
        ctx.delete_and_confirm(
            format!("action draft {}", id),
            clients.drafts.delete_draft(id),
            || async move { clients.drafts.get_draft(id).await.map(|_| ()) },
        )
        .await?;
        info!(id, "Deleted action draft");
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

    #[tokio::test(start_paused = true)]
    async fn test_failed_read_back_removes_draft() {
        let platform = MemoryPlatform::new();
        let ctx = context(&platform);
        let planned = draft_state(&platform).await;
        platform.fail_next_call("get_draft", ApiError::new(500, "boom"));

        let err = ActionDraftResource.create(&ctx, planned).await.unwrap_err();

        assert!(matches!(err, ProviderError::Unavailable(_)), "{:?}", err);
        assert_eq!(platform.calls("delete_draft"), 1);
        assert!(platform.draft("draft-0002").is_none());
    }

    async fn draft_state(platform: &MemoryPlatform) -> Value {
        let integration_id = platform
            .create_integration(&CreateIntegrationRequest {
                integration_type: "purecloud-data-actions".into(),
            })
            .await
            .unwrap()
            .id;
        json!({
            "name": "Draft lookup",
            "category": "Custom",
            "integration_id": integration_id,
            "secure": false,
            "contract_input": "{}",
            "contract_output": "{}",
            "config_request": {
                "request_url_template": "https://example.com",
                "request_type": "POST",
                "request_template": "{\"q\": \"${input.q}\"}"
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_draft_lifecycle() {
        let platform = MemoryPlatform::new();
        let ctx = context(&platform);
        let planned = draft_state(&platform).await;

        let created = ActionDraftResource.create(&ctx, planned).await.unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(
            created["config_request"]["request_template"],
            "{\"q\": \"${input.q}\"}"
        );
        assert_eq!(created["config_response"]["success_template"], "${rawResult}");

        let mut next = created.clone();
        next["secure"] = json!(true);
        next["contract_output"] = json!("{\"type\":\"object\"}");
        let updated = ActionDraftResource
            .update(&ctx, created, next)
            .await
            .unwrap();
        assert_eq!(updated["secure"], true);
        assert_eq!(updated["contract_output"], "{\"type\":\"object\"}");
        assert!(platform.draft(&id).unwrap().secure);

        ActionDraftResource.delete(&ctx, updated).await.unwrap();
        assert!(platform.draft(&id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_rejects_invalid_contract() {
        let platform = MemoryPlatform::new();
        let ctx = context(&platform);
        let mut planned = draft_state(&platform).await;
        planned["contract_input"] = json!("{not json");

        let err = ActionDraftResource.create(&ctx, planned).await.unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
        assert_eq!(platform.calls("create_draft"), 0);
    }
}
