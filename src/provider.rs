//! The integrations provider.
//!
//! [`IntegrationsProvider`] routes host calls to the registered resources and
//! data sources. It holds the configuration set by `configure`, connects the
//! API clients on first use, and owns the shutdown token that `stop` cancels.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::client::{ClientFactory, LazyClients};
use crate::config::{provider_config_schema, ProviderConfig};
use crate::data_sources::{self, DataSource};
use crate::error::ProviderError;
use crate::plan::plan_resource;
use crate::resources::{self, ManagedResource, OperationContext};
use crate::schema::{has_errors, Diagnostic, ProviderSchema};
use crate::service::ProviderService;
use crate::types::{ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities};
use crate::validation::validate;

/// Provider for integrations, their actions, and credentials.
pub struct IntegrationsProvider {
    clients: LazyClients,
    config: OnceLock<ProviderConfig>,
    shutdown: CancellationToken,
    resources: BTreeMap<&'static str, Arc<dyn ManagedResource>>,
    data_sources: BTreeMap<&'static str, Arc<dyn DataSource>>,
}

impl IntegrationsProvider {
    /// Create an unconfigured provider that connects through `factory`.
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            clients: LazyClients::new(factory),
            config: OnceLock::new(),
            shutdown: CancellationToken::new(),
            resources: resources::all()
                .into_iter()
                .map(|r| (r.type_name(), r))
                .collect(),
            data_sources: data_sources::all()
                .into_iter()
                .map(|d| (d.type_name(), d))
                .collect(),
        }
    }

    /// The configuration, once `configure` has succeeded.
    pub fn config(&self) -> Option<&ProviderConfig> {
        self.config.get()
    }

    /// Whether the API clients have been connected.
    pub fn is_connected(&self) -> bool {
        self.clients.is_connected()
    }

    fn resource(&self, resource_type: &str) -> Result<&Arc<dyn ManagedResource>, ProviderError> {
        self.resources.get(resource_type).ok_or_else(|| {
            ProviderError::UnknownResource(format!("unknown resource type: {}", resource_type))
        })
    }

    fn data_source(&self, data_source_type: &str) -> Result<&Arc<dyn DataSource>, ProviderError> {
        self.data_sources.get(data_source_type).ok_or_else(|| {
            ProviderError::UnknownResource(format!(
                "unknown data source type: {}",
                data_source_type
            ))
        })
    }

    /// Build the context for one operation, connecting on first use.
    async fn context(&self) -> Result<OperationContext, ProviderError> {
        let config = self.config.get().ok_or_else(|| {
            ProviderError::Configuration("provider has not been configured".to_string())
        })?;
        let clients = self.clients.get(config).await?;
        Ok(OperationContext {
            clients: clients.clone(),
            timeouts: config.timeouts,
            cancel: self.shutdown.child_token(),
        })
    }

    fn check_config(config: &Value) -> (Option<ProviderConfig>, Vec<Diagnostic>) {
        let mut diagnostics = validate(&provider_config_schema(), config);
        if has_errors(&diagnostics) {
            return (None, diagnostics);
        }
        match ProviderConfig::from_value(config) {
            Ok(parsed) => (Some(parsed), diagnostics),
            Err(err) => {
                diagnostics.push(
                    Diagnostic::error("Invalid provider configuration").with_detail(err.message()),
                );
                (None, diagnostics)
            },
        }
    }
}

#[async_trait::async_trait]
impl ProviderService for IntegrationsProvider {
    fn schema(&self) -> ProviderSchema {
        let schema = ProviderSchema::new().with_provider_config(provider_config_schema());
        let schema = self
            .resources
            .iter()
            .fold(schema, |schema, (name, r)| schema.with_resource(*name, r.schema()));
        self.data_sources
            .iter()
            .fold(schema, |schema, (name, d)| schema.with_data_source(*name, d.schema()))
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            resources: self.resources.keys().map(|k| k.to_string()).collect(),
            data_sources: self.data_sources.keys().map(|k| k.to_string()).collect(),
            capabilities: ServerCapabilities { plan_destroy: true },
        }
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(Self::check_config(&config).1)
    }

    #[instrument(skip_all)]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let (parsed, mut diagnostics) = Self::check_config(&config);
        let Some(parsed) = parsed else {
            warn!("Rejected provider configuration");
            return Ok(diagnostics);
        };

        let region = parsed.region.clone();
        if self.config.set(parsed).is_err() {
            warn!("Provider is already configured; keeping the first configuration");
            diagnostics.push(
                Diagnostic::warning("Provider already configured")
                    .with_detail("The first configuration stays in effect"),
            );
            return Ok(diagnostics);
        }
        info!(region = %region, "Provider configured");
        Ok(diagnostics)
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        info!("Stopping provider; cancelling in-flight operations");
        self.shutdown.cancel();
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let resource = self.resource(resource_type)?;
        Ok(validate(&resource.schema(), &config))
    }

    #[instrument(skip(self, prior_state, proposed_state, _config))]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let resource = self.resource(resource_type)?;
        let plan = plan_resource(&resource.schema(), prior_state.as_ref(), &proposed_state);
        debug!(
            changes = plan.changes.len(),
            requires_replace = plan.requires_replace,
            "Planned resource"
        );
        Ok(plan)
    }

    #[instrument(skip(self, planned_state))]
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let ctx = self.context().await?;
        resource.create(&ctx, planned_state).await
    }

    #[instrument(skip(self, current_state))]
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let ctx = self.context().await?;
        resource.read(&ctx, current_state).await
    }

    #[instrument(skip(self, prior_state, planned_state))]
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let ctx = self.context().await?;
        resource.update(&ctx, prior_state, planned_state).await
    }

    #[instrument(skip(self, current_state))]
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let resource = self.resource(resource_type)?;
        let ctx = self.context().await?;
        resource.delete(&ctx, current_state).await
    }

    #[instrument(skip(self))]
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let resource = self.resource(resource_type)?;
        let ctx = self.context().await?;
        let state = resource.read(&ctx, json!({ "id": id })).await?;
        info!(id, "Imported resource");
        Ok(vec![ImportedResource::new(resource_type, state)])
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let data_source = self.data_source(data_source_type)?;
        Ok(validate(&data_source.schema(), &config))
    }

    #[instrument(skip(self, config))]
    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let data_source = self.data_source(data_source_type)?;
        let ctx = self.context().await?;
        data_source.read(&ctx, config).await
    }
}
