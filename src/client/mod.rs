//! Access to the platform's integrations API.
//!
//! Each API area is a capability trait so that handlers depend only on what
//! they call, and tests can substitute an in-memory implementation (see
//! [`crate::testing::MemoryPlatform`]). Building the HTTP implementations is
//! left to the host; this crate only consumes the traits.

#[allow(missing_docs)]
pub mod models;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use models::{
    Action, ActionInput, ActionUpdate, CreateIntegrationRequest, Credential, CredentialInput,
    DraftUpdate, Integration, IntegrationConfig, IntegrationPatch, TemplateFile,
};

/// Result alias for platform calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// An error response from the platform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("API error {status}: {message}")]
pub struct ApiError {
    /// HTTP status code.
    pub status: u16,
    /// Platform error code, when one was returned.
    pub code: Option<String>,
    /// Human-readable message.
    pub message: String,
}

impl ApiError {
    /// Create an error with the given status and message.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            code: None,
            message: message.into(),
        }
    }

    /// A 404 for the given object.
    pub fn not_found(kind: &str, id: &str) -> Self {
        Self::new(404, format!("{} {} not found", kind, id)).with_code("not.found")
    }

    /// A 409 version conflict.
    pub fn version_mismatch(sent: i64, current: i64) -> Self {
        Self::new(
            409,
            format!(
                "Version {} does not match the current version {}",
                sent, current
            ),
        )
        .with_code("conflict")
    }

    /// Attach a platform error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// HTTP 404.
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// HTTP 400.
    pub fn is_bad_request(&self) -> bool {
        self.status == 400
    }

    /// The write carried a stale version.
    pub fn is_version_mismatch(&self) -> bool {
        self.status == 409
            || self
                .message
                .to_ascii_lowercase()
                .contains("does not match the current version")
    }
}

impl From<ApiError> for ProviderError {
    fn from(err: ApiError) -> Self {
        let msg = err.to_string();
        match err.status {
            400 => ProviderError::InvalidRequest(msg),
            401 | 403 => ProviderError::PermissionDenied(msg),
            404 => ProviderError::NotFound(msg),
            409 => ProviderError::FailedPrecondition(msg),
            429 => ProviderError::ResourceExhausted(msg),
            500..=599 => ProviderError::Unavailable(msg),
            _ => ProviderError::Sdk(msg),
        }
    }
}

/// Integration instances and their current configuration.
#[async_trait]
pub trait IntegrationsApi: Send + Sync {
    /// List every integration.
    async fn list_integrations(&self) -> ApiResult<Vec<Integration>>;
    /// Create an integration of the given type.
    async fn create_integration(&self, request: &CreateIntegrationRequest)
        -> ApiResult<Integration>;
    /// Get an integration by id.
    async fn get_integration(&self, id: &str) -> ApiResult<Integration>;
    /// Patch PATCH-only attributes.
    async fn patch_integration(&self, id: &str, patch: &IntegrationPatch)
        -> ApiResult<Integration>;
    /// Delete an integration.
    async fn delete_integration(&self, id: &str) -> ApiResult<()>;
    /// Get the current configuration, including its version.
    async fn get_integration_config(&self, id: &str) -> ApiResult<IntegrationConfig>;
    /// Replace the current configuration.
    async fn put_integration_config(
        &self,
        id: &str,
        config: &IntegrationConfig,
    ) -> ApiResult<IntegrationConfig>;
}

/// Stored credentials referenced by integration configs.
#[async_trait]
pub trait CredentialsApi: Send + Sync {
    /// List every credential.
    async fn list_credentials(&self) -> ApiResult<Vec<Credential>>;
    /// Create a credential.
    async fn create_credential(&self, input: &CredentialInput) -> ApiResult<Credential>;
    /// Get a credential by id (without field values).
    async fn get_credential(&self, id: &str) -> ApiResult<Credential>;
    /// Replace a credential.
    async fn update_credential(&self, id: &str, input: &CredentialInput)
        -> ApiResult<Credential>;
    /// Delete a credential.
    async fn delete_credential(&self, id: &str) -> ApiResult<()>;
}

/// Published integration actions, including custom auth actions.
#[async_trait]
pub trait ActionsApi: Send + Sync {
    /// List every published action.
    async fn list_actions(&self) -> ApiResult<Vec<Action>>;
    /// Create and publish an action.
    async fn create_action(&self, input: &ActionInput) -> ApiResult<Action>;
    /// Get an action by id. Template bodies are served separately.
    async fn get_action(&self, id: &str) -> ApiResult<Action>;
    /// Get one of the action's template files.
    async fn get_action_template(&self, id: &str, file: TemplateFile) -> ApiResult<String>;
    /// Update an action; the update must carry the current version.
    async fn update_action(&self, id: &str, update: &ActionUpdate) -> ApiResult<Action>;
    /// Delete an action.
    async fn delete_action(&self, id: &str) -> ApiResult<()>;
}

/// Unpublished action drafts.
#[async_trait]
pub trait DraftsApi: Send + Sync {
    /// List every draft.
    async fn list_drafts(&self) -> ApiResult<Vec<Action>>;
    /// Create a draft.
    async fn create_draft(&self, input: &ActionInput) -> ApiResult<Action>;
    /// Get a draft by id. Template bodies are served separately.
    async fn get_draft(&self, id: &str) -> ApiResult<Action>;
    /// Get one of the draft's template files.
    async fn get_draft_template(&self, id: &str, file: TemplateFile) -> ApiResult<String>;
    /// Update a draft.
    async fn update_draft(&self, id: &str, update: &DraftUpdate) -> ApiResult<Action>;
    /// Delete a draft.
    async fn delete_draft(&self, id: &str) -> ApiResult<()>;
}

/// One client per capability, shared by every handler of a provider.
#[derive(Clone)]
pub struct ApiClients {
    /// Integrations and their configs.
    pub integrations: Arc<dyn IntegrationsApi>,
    /// Credentials.
    pub credentials: Arc<dyn CredentialsApi>,
    /// Published actions.
    pub actions: Arc<dyn ActionsApi>,
    /// Action drafts.
    pub drafts: Arc<dyn DraftsApi>,
}

impl fmt::Debug for ApiClients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClients").finish_non_exhaustive()
    }
}

/// Builds the client set from the provider configuration.
pub trait ClientFactory: Send + Sync + 'static {
    /// Connect to the platform described by `config`.
    fn connect(&self, config: &ProviderConfig) -> Result<ApiClients, ProviderError>;
}

/// Lazily-connected client set.
///
/// The first caller runs the factory; concurrent first callers wait for that
/// single initialization. Later calls only read the cell. A failed connect
/// leaves the cell empty so the next call tries again.
pub struct LazyClients {
    factory: Arc<dyn ClientFactory>,
    cell: OnceCell<ApiClients>,
}

impl LazyClients {
    /// Create an empty cell backed by `factory`.
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            cell: OnceCell::new(),
        }
    }

    /// Get the clients, connecting on first use.
    pub async fn get(&self, config: &ProviderConfig) -> Result<&ApiClients, ProviderError> {
        self.cell
            .get_or_try_init(|| async {
                debug!(region = %config.region, "Connecting API clients");
                let clients = self.factory.connect(config)?;
                info!(region = %config.region, "API clients ready");
                Ok::<_, ProviderError>(clients)
            })
            .await
    }

    /// Whether a connection has been made.
    pub fn is_connected(&self) -> bool {
        self.cell.initialized()
    }
}
