//! CX Cloud Integrations
//!
//! Provider resources for integrations, their data actions, action drafts,
//! and credentials, built on a retry controller for an eventually-consistent
//! platform.
//!
//! # Overview
//!
//! - **Retry controller** ([`retry`]): runs an attempt until it succeeds,
//!   fails fatally, runs out its deadline, or is cancelled. Policies decide
//!   which platform errors are worth another attempt.
//! - **Resources** ([`resources`]): `cxcloud_integration`,
//!   `cxcloud_integration_action`, `cxcloud_integration_action_draft`,
//!   `cxcloud_integration_custom_auth_action`, and
//!   `cxcloud_integration_credential`.
//! - **Data sources** ([`data_sources`]): name lookups and the generated
//!   custom auth action of an integration.
//! - **Provider** ([`IntegrationsProvider`]): the [`ProviderService`]
//!   implementation that routes host calls to the above.
//! - **Testing** ([`testing`]): an in-memory platform and a harness that drives
//!   a provider without a host.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use cxcloud_integrations::{init_logging, IntegrationsProvider, ProviderService};
//!
//! init_logging();
//! let provider = IntegrationsProvider::new(Arc::new(my_client_factory));
//! provider.configure(serde_json::json!({"access_token": token})).await?;
//! let state = provider
//!     .create("cxcloud_integration", serde_json::json!({
//!         "integration_type": "purecloud-data-actions",
//!         "intended_state": "ENABLED",
//!     }))
//!     .await?;
//! ```
//!
//! # Retry windows
//!
//! | window             | timeout | poll    |
//! |--------------------|---------|---------|
//! | `read`             | 300 s   | 2000 ms |
//! | `delete`           | 30 s    | 2000 ms |
//! | `lookup`           | 15 s    | 1000 ms |
//! | `version_conflict` | 30 s    | 500 ms  |
//! | `create`           | 30 s    | 500 ms  |
//!
//! Each can be overridden in the provider's `timeouts` block.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod data_sources;
pub mod error;
pub mod logging;
pub mod plan;
pub mod provider;
pub mod resources;
pub mod retry;
pub mod schema;
pub mod service;
pub mod state;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use client::{ApiClients, ApiError, ApiResult, ClientFactory};
pub use config::{ProviderConfig, RetryTimeouts, RetryWindow};
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use plan::plan_resource;
pub use provider::IntegrationsProvider;
pub use retry::{execute_with_retry, Outcome, RetryError, RetryPolicy};
pub use schema::ProviderSchema;
pub use service::ProviderService;
pub use types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities,
};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tokio_util::sync::CancellationToken;
pub use tracing;
