//! Managed resource types.
//!
//! Each resource implements [`ManagedResource`] over JSON state; the provider
//! looks them up by type name and hands them an [`OperationContext`] carrying
//! the connected clients, the configured retry windows, and the operation's
//! cancellation token.

mod action_config;
mod action_draft;
mod credential;
mod custom_auth_action;
mod integration;
mod integration_action;

pub use action_draft::ActionDraftResource;
pub use credential::CredentialResource;
pub use custom_auth_action::CustomAuthActionResource;
pub use integration::IntegrationResource;
pub use integration_action::IntegrationActionResource;

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::{ApiClients, ApiResult};
use crate::config::RetryTimeouts;
use crate::error::ProviderError;
use crate::retry::{self, execute_with_retry, Outcome, RetryError, RetryPolicy};
use crate::schema::Schema;

/// Everything a resource handler needs for one operation.
#[derive(Debug, Clone)]
pub struct OperationContext {
    /// Connected platform clients.
    pub clients: ApiClients,
    /// Configured retry windows.
    pub timeouts: RetryTimeouts,
    /// Cancelled when the provider stops.
    pub cancel: CancellationToken,
}

impl OperationContext {
    /// Policy for reads that follow a write.
    pub fn read_policy(&self) -> Result<RetryPolicy, ProviderError> {
        RetryPolicy::read_after_write(self.timeouts.read)
    }

    /// Policy for waiting on objects the platform creates on its own.
    pub fn lookup_policy(&self) -> Result<RetryPolicy, ProviderError> {
        RetryPolicy::read_after_write(self.timeouts.lookup)
    }

    /// Policy for versioned writes.
    pub fn version_policy(&self) -> Result<RetryPolicy, ProviderError> {
        RetryPolicy::optimistic_concurrency(self.timeouts.version_conflict)
    }

    /// Policy for creates rejected while a parent settles.
    pub fn create_policy(&self) -> Result<RetryPolicy, ProviderError> {
        RetryPolicy::create_conflict(self.timeouts.create)
    }

    /// Run `operation` under `policy`, naming `what` in timeout and cancel errors.
    pub async fn retry<T, F, Fut>(
        &self,
        policy: &RetryPolicy,
        what: impl Display,
        operation: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Outcome<T, ProviderError>>,
    {
        execute_with_retry(&self.cancel, policy, operation)
            .await
            .map_err(|e| e.describe(what))
    }

    /// Like [`retry`](Self::retry), but a "not found" that outlives the window
    /// is returned as [`ProviderError::NotFound`] so the host drops the resource.
    pub async fn retry_read<T, F, Fut>(
        &self,
        policy: &RetryPolicy,
        what: impl Display,
        operation: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Outcome<T, ProviderError>>,
    {
        execute_with_retry(&self.cancel, policy, operation)
            .await
            .map_err(|e| match e {
                RetryError::Timeout { last, .. } if last.is_not_found() => last,
                other => other.describe(what),
            })
    }

    /// Issue a delete, then poll `probe` until the object is gone.
    ///
    /// A 404 from the delete itself means the object was already removed.
    pub async fn delete_and_confirm<D, F, Fut>(
        &self,
        what: impl Display,
        delete: D,
        probe: F,
    ) -> Result<(), ProviderError>
    where
        D: Future<Output = ApiResult<()>>,
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<()>>,
    {
        match delete.await {
            Ok(()) => {},
            Err(err) if err.is_not_found() => {
                debug!(target: "cxcloud_integrations::resources", "{} already deleted", what);
                return Ok(());
            },
            Err(err) => return Err(err.into()),
        }
        let policy = RetryPolicy::delete_confirmation(self.timeouts.delete)?;
        retry::confirm_deleted(&self.cancel, &policy, probe)
            .await
            .map_err(|e| e.describe(format_args!("waiting for {} to be deleted", what)))
    }

    /// Remove an object whose create did not complete, then hand back `err`.
    ///
    /// Cleanup is best effort: a failed cleanup is logged and `err` is still
    /// what the caller sees.
    pub async fn discard_failed_create<D, F, Fut>(
        &self,
        what: impl Display,
        err: ProviderError,
        delete: D,
        probe: F,
    ) -> ProviderError
    where
        D: Future<Output = ApiResult<()>>,
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<()>>,
    {
        warn!(error = %err, "Create of {} did not complete; removing it", what);
        if let Err(cleanup) = self.delete_and_confirm(&what, delete, probe).await {
            warn!(error = %cleanup, "Could not remove {} after a failed create", what);
        }
        err
    }
}

/// A resource type the provider manages.
#[async_trait]
pub trait ManagedResource: Send + Sync {
    /// The type name hosts use, e.g. `cxcloud_integration`.
    fn type_name(&self) -> &'static str;

    /// The resource schema.
    fn schema(&self) -> Schema;

    /// Create the remote object and return its state.
    async fn create(&self, ctx: &OperationContext, planned: Value) -> Result<Value, ProviderError>;

    /// Refresh state from the remote object.
    async fn read(&self, ctx: &OperationContext, current: Value) -> Result<Value, ProviderError>;

    /// Apply `planned` over `prior` and return the new state.
    async fn update(
        &self,
        ctx: &OperationContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError>;

    /// Remove the remote object.
    async fn delete(&self, ctx: &OperationContext, current: Value) -> Result<(), ProviderError>;
}

/// Every resource type, in registration order.
pub fn all() -> Vec<Arc<dyn ManagedResource>> {
    vec![
        Arc::new(IntegrationResource),
        Arc::new(IntegrationActionResource),
        Arc::new(ActionDraftResource),
        Arc::new(CredentialResource),
        Arc::new(CustomAuthActionResource),
    ]
}
