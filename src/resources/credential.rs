//! `cxcloud_integration_credential`: a stored credential.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::client::models::{Credential, CredentialInput};
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};
use crate::state::{from_state, require_id, to_state};

use super::{ManagedResource, OperationContext};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CredentialState {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    id: String,
    name: String,
    credential_type_name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    fields: BTreeMap<String, String>,
}

impl CredentialState {
    fn input(&self) -> CredentialInput {
        CredentialInput {
            name: self.name.clone(),
            credential_type: self.credential_type_name.clone(),
            fields: self.fields.clone(),
        }
    }

    /// The API never returns field values, so they come from the caller.
    fn from_remote(credential: Credential, fields: BTreeMap<String, String>) -> Self {
        Self {
            id: credential.id,
            name: credential.name,
            credential_type_name: credential.credential_type,
            fields,
        }
    }
}

fn known_fields(state: &Value) -> BTreeMap<String, String> {
    state
        .get("fields")
        .and_then(|f| serde_json::from_value(f.clone()).ok())
        .unwrap_or_default()
}

/// Credentials referenced from integration configs.
#[derive(Debug, Default, Clone, Copy)]
pub struct CredentialResource;

#[async_trait]
impl ManagedResource for CredentialResource {
    fn type_name(&self) -> &'static str {
        "cxcloud_integration_credential"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A credential that integrations can reference")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("name", Attribute::required_string())
            .with_attribute(
                "credential_type_name",
                Attribute::required_string()
                    .with_description("Credential type, e.g. basicAuth or userDefinedOAuth"),
            )
            .with_attribute("fields", Attribute::optional_string_map().sensitive())
    }

    async fn create(&self, ctx: &OperationContext, planned: Value) -> Result<Value, ProviderError> {
        let state: CredentialState = from_state(&planned)?;
        let clients = &ctx.clients;
        let credential = clients.credentials.create_credential(&state.input()).await?;
        info!(id = %credential.id, name = %credential.name, "Created credential");

        let id = credential.id.as_str();
        let finished = async {
            let mut current = to_state(&state)?;
            current["id"] = Value::String(id.to_string());
            self.read(ctx, current).await
        }
        .await;

        match finished {
            Ok(state) => Ok(state),
            Err(err) => Err(ctx
                .discard_failed_create(
                    format!("credential {}", id),
                    err,
                    clients.credentials.delete_credential(id),
                    || async move { clients.credentials.get_credential(id).await.map(|_| ()) },
                )
                .await),
        }
    }

    async fn read(&self, ctx: &OperationContext, current: Value) -> Result<Value, ProviderError> {
        let id = require_id(&current)?;
        debug!(id, "Reading credential");
        let policy = ctx.read_policy()?;
        let policy = &policy;
        let clients = &ctx.clients;
        let credential = ctx
            .retry_read(policy, format!("reading credential {}", id), || async move {
                policy.classify(clients.credentials.get_credential(id).await)
            })
            .await?;
        to_state(&CredentialState::from_remote(credential, known_fields(&current)))
    }

    async fn update(
        &self,
        ctx: &OperationContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let id = require_id(&prior)?;
        let state: CredentialState = from_state(&planned)?;
        ctx.clients
            .credentials
            .update_credential(id, &state.input())
            .await?;
        info!(id, "Updated credential");

        let mut current = to_state(&state)?;
        current["id"] = Value::String(id.to_string());
        self.read(ctx, current).await
    }

    async fn delete(&self, ctx: &OperationContext, current: Value) -> Result<(), ProviderError> {
        let id = require_id(&current)?;
        let clients = &ctx.clients;
        ctx.delete_and_confirm(
            format!("credential {}", id),
            clients.credentials.delete_credential(id),
            || async move { clients.credentials.get_credential(id).await.map(|_| ()) },
        )
        .await?;
        info!(id, "Deleted credential");
        Ok(())
    }
}
