//! Read-only lookups.
//!
//! Name lookups list every object of a kind and pick the exact match. A name
//! that matches nothing is polled within the lookup window, since the object
//! may have been created moments earlier in the same run.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::client::models::custom_auth_action_id;
use crate::client::ApiResult;
use crate::error::ProviderError;
use crate::resources::OperationContext;
use crate::retry::Outcome;
use crate::schema::{Attribute, Schema};

/// A data source type the provider serves.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// The type name hosts use.
    fn type_name(&self) -> &'static str;

    /// The data source schema.
    fn schema(&self) -> Schema;

    /// Resolve `config` to the data source's full state.
    async fn read(&self, ctx: &OperationContext, config: Value) -> Result<Value, ProviderError>;
}

/// Every data source type, in registration order.
pub fn all() -> Vec<Arc<dyn DataSource>> {
    vec![
        Arc::new(NameLookup::INTEGRATION),
        Arc::new(NameLookup::ACTION),
        Arc::new(NameLookup::CREDENTIAL),
        Arc::new(CustomAuthActionLookup),
    ]
}

fn required_str<'a>(config: &'a Value, key: &str) -> Result<&'a str, ProviderError> {
    config
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ProviderError::Validation(format!("{} is required", key)))
}

/// Which listing a [`NameLookup`] searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Listing {
    Integrations,
    Actions,
    Credentials,
}

/// Resolve an object's id from its exact name.
#[derive(Debug, Clone, Copy)]
pub struct NameLookup {
    type_name: &'static str,
    noun: &'static str,
    listing: Listing,
}

impl NameLookup {
    /// `cxcloud_integration`
    pub const INTEGRATION: Self = Self {
        type_name: "cxcloud_integration",
        noun: "integration",
        listing: Listing::Integrations,
    };

    /// `cxcloud_integration_action`
    pub const ACTION: Self = Self {
        type_name: "cxcloud_integration_action",
        noun: "integration action",
        listing: Listing::Actions,
    };

    /// `cxcloud_integration_credential`
    pub const CREDENTIAL: Self = Self {
        type_name: "cxcloud_integration_credential",
        noun: "credential",
        listing: Listing::Credentials,
    };

    async fn list(&self, ctx: &OperationContext) -> ApiResult<Vec<(String, String)>> {
        let clients = &ctx.clients;
        Ok(match self.listing {
            Listing::Integrations => clients
                .integrations
                .list_integrations()
                .await?
                .into_iter()
                .map(|i| (i.id, i.name))
                .collect(),
            Listing::Actions => clients
                .actions
                .list_actions()
                .await?
                .into_iter()
                .map(|a| (a.id, a.name))
                .collect(),
            Listing::Credentials => clients
                .credentials
                .list_credentials()
                .await?
                .into_iter()
                .map(|c| (c.id, c.name))
                .collect(),
        })
    }
}

/// Poll `list` until an entry named `name` shows up and return its id.
async fn find_by_name<F, Fut>(
    ctx: &OperationContext,
    noun: &str,
    name: &str,
    mut list: F,
) -> Result<String, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResult<Vec<(String, String)>>>,
{
    let policy = ctx.lookup_policy()?;
    ctx.retry_read(&policy, format!("looking up {} {:?}", noun, name), || {
        let listing = list();
        async move {
            match listing.await {
                Ok(entries) => match entries.into_iter().find(|(_, n)| n == name) {
                    Some((id, _)) => Outcome::Success(id),
                    None => Outcome::Retryable(ProviderError::NotFound(format!(
                        "no {} named {:?}",
                        noun, name
                    ))),
                },
                Err(err) => Outcome::Fatal(err.into()),
            }
        }
    })
    .await
}

#[async_trait]
impl DataSource for NameLookup {
    fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description(format!("Look up a {} by exact name", self.noun))
            .with_attribute("name", Attribute::required_string())
            .with_attribute("id", Attribute::computed_string())
    }

    async fn read(&self, ctx: &OperationContext, config: Value) -> Result<Value, ProviderError> {
        let name = required_str(&config, "name")?;
        let id = find_by_name(ctx, self.noun, name, || self.list(ctx)).await?;
        debug!(data_source = self.type_name, name, id = %id, "Resolved name");
        Ok(json!({ "name": name, "id": id }))
    }
}

/// Resolve the generated custom auth action of an integration.
#[derive(Debug, Default, Clone, Copy)]
pub struct CustomAuthActionLookup;

#[async_trait]
impl DataSource for CustomAuthActionLookup {
    fn type_name(&self) -> &'static str {
        "cxcloud_integration_custom_auth_action"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Look up the custom auth action of an integration")
            .with_attribute("parent_integration_id", Attribute::required_string())
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("name", Attribute::computed_string())
    }

    async fn read(&self, ctx: &OperationContext, config: Value) -> Result<Value, ProviderError> {
        let parent = required_str(&config, "parent_integration_id")?;
        let id = custom_auth_action_id(parent);
        let id = id.as_str();
        let policy = ctx.lookup_policy()?;
        let policy = &policy;
        let clients = &ctx.clients;

        let action = ctx
            .retry_read(
                policy,
                format!("looking up custom auth action of integration {}", parent),
                || async move { policy.classify(clients.actions.get_action(id).await) },
            )
            .await?;
        Ok(json!({
            "parent_integration_id": parent,
            "id": action.id,
            "name": action.name,
        }))
    }
}
