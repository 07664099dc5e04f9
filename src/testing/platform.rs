//! In-memory implementation of the platform API.
//!
//! [`MemoryPlatform`] implements every capability trait and [`ClientFactory`],
//! so a provider can be exercised end to end without a network. It can also
//! misbehave the way the real platform does: objects that stay invisible for
//! a few reads after create, objects that linger after delete, versioned
//! writes that lose a race, and action creates rejected with HTTP 400.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::client::models::{
    custom_auth_action_id, Action, ActionConfig, ActionInput, ActionUpdate, CreateIntegrationRequest,
    Credential, CredentialInput, DraftUpdate, IntendedState, Integration, IntegrationConfig,
    IntegrationPatch, TemplateFile, CUSTOM_REST_ACTIONS_TYPE,
};
use crate::client::{
    ActionsApi, ApiClients, ApiError, ApiResult, ClientFactory, CredentialsApi, DraftsApi,
    IntegrationsApi,
};
use crate::config::ProviderConfig;
use crate::error::ProviderError;

struct Stored<T> {
    value: T,
    hidden_reads: u32,
    lingering_reads: Option<u32>,
}

impl<T> Stored<T> {
    fn new(value: T, hidden_reads: u32) -> Self {
        Self {
            value,
            hidden_reads,
            lingering_reads: None,
        }
    }

    fn is_deleted(&self) -> bool {
        self.lingering_reads.is_some()
    }
}

/// Read through a get-by-id endpoint, applying read and delete lag.
fn read_stored<T: Clone>(
    map: &mut BTreeMap<String, Stored<T>>,
    kind: &str,
    id: &str,
) -> ApiResult<T> {
    let Some(stored) = map.get_mut(id) else {
        return Err(ApiError::not_found(kind, id));
    };
    if stored.hidden_reads > 0 {
        stored.hidden_reads -= 1;
        return Err(ApiError::not_found(kind, id));
    }
    match stored.lingering_reads {
        None => Ok(stored.value.clone()),
        Some(0) => {
            map.remove(id);
            Err(ApiError::not_found(kind, id))
        },
        Some(n) => {
            stored.lingering_reads = Some(n - 1);
            Ok(stored.value.clone())
        },
    }
}

fn live<T>(map: &BTreeMap<String, Stored<T>>, id: &str) -> bool {
    map.get(id).is_some_and(|s| !s.is_deleted())
}

fn listed<T: Clone>(map: &BTreeMap<String, Stored<T>>) -> Vec<T> {
    map.values()
        .filter(|s| !s.is_deleted())
        .map(|s| s.value.clone())
        .collect()
}

#[derive(Default)]
struct PlatformState {
    next_id: u64,
    integrations: BTreeMap<String, Stored<Integration>>,
    configs: BTreeMap<String, IntegrationConfig>,
    credentials: BTreeMap<String, Stored<Credential>>,
    actions: BTreeMap<String, Stored<Action>>,
    drafts: BTreeMap<String, Stored<Action>>,
    read_lag: u32,
    delete_lag: u32,
    version_conflicts: u32,
    create_rejections: u32,
    failures: VecDeque<(&'static str, ApiError)>,
    calls: HashMap<&'static str, usize>,
    connections: usize,
}

impl PlatformState {
    /// Record a call and return an injected failure, if one is queued for it.
    fn enter(&mut self, method: &'static str) -> ApiResult<()> {
        *self.calls.entry(method).or_default() += 1;
        match self.failures.iter().position(|(m, _)| *m == method) {
            Some(pos) => match self.failures.remove(pos) {
                Some((_, err)) => Err(err),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }

    fn new_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{:04}", prefix, self.next_id)
    }

    /// Simulate a concurrent writer winning the race for a versioned object.
    fn take_version_conflict(&mut self, current: &mut i64, sent: i64) -> ApiResult<()> {
        if self.version_conflicts > 0 {
            self.version_conflicts -= 1;
            *current += 1;
            return Err(ApiError::version_mismatch(sent, *current));
        }
        if sent != *current {
            return Err(ApiError::version_mismatch(sent, *current));
        }
        Ok(())
    }

    fn remove_stored<T>(map: &mut BTreeMap<String, Stored<T>>, id: &str, lag: u32) {
        if lag == 0 {
            map.remove(id);
        } else if let Some(stored) = map.get_mut(id) {
            stored.lingering_reads = Some(lag);
        }
    }
}

/// An in-memory platform shared by every client it hands out.
#[derive(Clone, Default)]
pub struct MemoryPlatform {
    state: Arc<Mutex<PlatformState>>,
}

impl MemoryPlatform {
    /// Create an empty, well-behaved platform.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PlatformState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// New objects answer 404 for their first `reads` gets.
    pub fn with_read_lag(self, reads: u32) -> Self {
        self.lock().read_lag = reads;
        self
    }

    /// Deleted objects keep answering gets `reads` more times.
    pub fn with_delete_lag(self, reads: u32) -> Self {
        self.lock().delete_lag = reads;
        self
    }

    /// Reject the next `count` versioned writes as if another writer won.
    pub fn force_version_conflicts(&self, count: u32) {
        self.lock().version_conflicts = count;
    }

    /// Reject the next `count` action creates with HTTP 400.
    pub fn reject_action_creates(&self, count: u32) {
        self.lock().create_rejections = count;
    }

    /// Fail the next call to `method` with `error`.
    pub fn fail_next_call(&self, method: &'static str, error: ApiError) {
        self.lock().failures.push_back((method, error));
    }

    /// Number of calls made to `method`.
    pub fn calls(&self, method: &str) -> usize {
        self.lock().calls.get(method).copied().unwrap_or(0)
    }

    /// Number of client sets handed out.
    pub fn connections(&self) -> usize {
        self.lock().connections
    }

    /// Stored integration, bypassing lag.
    pub fn integration(&self, id: &str) -> Option<Integration> {
        let state = self.lock();
        state
            .integrations
            .get(id)
            .filter(|s| !s.is_deleted())
            .map(|s| s.value.clone())
    }

    /// Stored integration config, bypassing lag.
    pub fn integration_config(&self, id: &str) -> Option<IntegrationConfig> {
        self.lock().configs.get(id).cloned()
    }

    /// Stored action including its templates, bypassing lag.
    pub fn action(&self, id: &str) -> Option<Action> {
        let state = self.lock();
        state
            .actions
            .get(id)
            .filter(|s| !s.is_deleted())
            .map(|s| s.value.clone())
    }

    /// Stored draft including its templates, bypassing lag.
    pub fn draft(&self, id: &str) -> Option<Action> {
        let state = self.lock();
        state
            .drafts
            .get(id)
            .filter(|s| !s.is_deleted())
            .map(|s| s.value.clone())
    }

    /// Stored credential including its field values, bypassing lag.
    pub fn credential(&self, id: &str) -> Option<Credential> {
        let state = self.lock();
        state
            .credentials
            .get(id)
            .filter(|s| !s.is_deleted())
            .map(|s| s.value.clone())
    }
}

fn strip_templates(mut action: Action) -> Action {
    action.config.request.request_template = None;
    action.config.response.success_template = None;
    action
}

fn template_of(action: &Action, file: TemplateFile) -> String {
    match file {
        TemplateFile::Request => action.config.request.request_template.clone(),
        TemplateFile::Success => action.config.response.success_template.clone(),
    }
    .unwrap_or_default()
}

fn action_from_input(id: String, input: &ActionInput) -> Action {
    Action {
        id,
        name: input.name.clone(),
        category: input.category.clone(),
        integration_id: input.integration_id.clone(),
        secure: input.secure,
        config: input.config.clone(),
        contract: input.contract.clone(),
        version: 1,
    }
}

#[async_trait]
impl IntegrationsApi for MemoryPlatform {
    async fn list_integrations(&self) -> ApiResult<Vec<Integration>> {
        let mut state = self.lock();
        state.enter("list_integrations")?;
        Ok(listed(&state.integrations))
    }

    async fn create_integration(
        &self,
        request: &CreateIntegrationRequest,
    ) -> ApiResult<Integration> {
        let mut state = self.lock();
        state.enter("create_integration")?;
        let id = state.new_id("integration");
        let integration = Integration {
            id: id.clone(),
            name: request.integration_type.clone(),
            integration_type: request.integration_type.clone(),
            intended_state: IntendedState::Disabled,
        };
        let lag = state.read_lag;
        state
            .integrations
            .insert(id.clone(), Stored::new(integration.clone(), lag));
        state.configs.insert(
            id.clone(),
            IntegrationConfig {
                name: integration.name.clone(),
                version: 1,
                ..Default::default()
            },
        );

        if request.integration_type == CUSTOM_REST_ACTIONS_TYPE {
            let auth_id = custom_auth_action_id(&id);
            let action = Action {
                id: auth_id.clone(),
                name: format!("Custom Auth - {}", id),
                category: integration.name.clone(),
                integration_id: id.clone(),
                secure: false,
                config: ActionConfig::default(),
                contract: Default::default(),
                version: 1,
            };
            state.actions.insert(auth_id, Stored::new(action, lag));
        }
        Ok(integration)
    }

    async fn get_integration(&self, id: &str) -> ApiResult<Integration> {
        let mut state = self.lock();
        state.enter("get_integration")?;
        read_stored(&mut state.integrations, "integration", id)
    }

    async fn patch_integration(
        &self,
        id: &str,
        patch: &IntegrationPatch,
    ) -> ApiResult<Integration> {
        let mut state = self.lock();
        state.enter("patch_integration")?;
        if !live(&state.integrations, id) {
            return Err(ApiError::not_found("integration", id));
        }
        match state.integrations.get_mut(id) {
            Some(stored) => {
                stored.value.intended_state = patch.intended_state;
                Ok(stored.value.clone())
            },
            None => Err(ApiError::not_found("integration", id)),
        }
    }

    async fn delete_integration(&self, id: &str) -> ApiResult<()> {
        let mut state = self.lock();
        state.enter("delete_integration")?;
        if !live(&state.integrations, id) {
            return Err(ApiError::not_found("integration", id));
        }
        let lag = state.delete_lag;
        PlatformState::remove_stored(&mut state.integrations, id, lag);
        state.configs.remove(id);
        state.actions.retain(|_, a| a.value.integration_id != id);
        state.drafts.retain(|_, a| a.value.integration_id != id);
        Ok(())
    }

    async fn get_integration_config(&self, id: &str) -> ApiResult<IntegrationConfig> {
        let mut state = self.lock();
        state.enter("get_integration_config")?;
        if !live(&state.integrations, id) {
            return Err(ApiError::not_found("integration", id));
        }
        state
            .configs
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::not_found("integration config", id))
    }

    async fn put_integration_config(
        &self,
        id: &str,
        config: &IntegrationConfig,
    ) -> ApiResult<IntegrationConfig> {
        let mut state = self.lock();
        state.enter("put_integration_config")?;
        if !live(&state.integrations, id) {
            return Err(ApiError::not_found("integration", id));
        }
        let mut current_version = state.configs.get(id).map(|c| c.version).unwrap_or(1);
        let result = state.take_version_conflict(&mut current_version, config.version);
        if let Some(current) = state.configs.get_mut(id) {
            current.version = current_version;
        }
        result?;

        let stored = IntegrationConfig {
            version: current_version + 1,
            ..config.clone()
        };
        state.configs.insert(id.to_string(), stored.clone());
        if let Some(integration) = state.integrations.get_mut(id) {
            if !stored.name.is_empty() {
                integration.value.name = stored.name.clone();
            }
        }
        Ok(stored)
    }
}

#[async_trait]
impl CredentialsApi for MemoryPlatform {
    async fn list_credentials(&self) -> ApiResult<Vec<Credential>> {
        let mut state = self.lock();
        state.enter("list_credentials")?;
        Ok(listed(&state.credentials)
            .into_iter()
            .map(|mut c| {
                c.fields.clear();
                c
            })
            .collect())
    }

    async fn create_credential(&self, input: &CredentialInput) -> ApiResult<Credential> {
        let mut state = self.lock();
        state.enter("create_credential")?;
        if input.credential_type.is_empty() {
            return Err(ApiError::new(400, "credential type is required"));
        }
        let id = state.new_id("credential");
        let credential = Credential {
            id: id.clone(),
            name: input.name.clone(),
            credential_type: input.credential_type.clone(),
            fields: input.fields.clone(),
        };
        let lag = state.read_lag;
        state
            .credentials
            .insert(id, Stored::new(credential.clone(), lag));
        Ok(Credential {
            fields: BTreeMap::new(),
            ..credential
        })
    }

    async fn get_credential(&self, id: &str) -> ApiResult<Credential> {
        let mut state = self.lock();
        state.enter("get_credential")?;
        let mut credential = read_stored(&mut state.credentials, "credential", id)?;
        credential.fields.clear();
        Ok(credential)
    }

    async fn update_credential(&self, id: &str, input: &CredentialInput) -> ApiResult<Credential> {
        let mut state = self.lock();
        state.enter("update_credential")?;
        if !live(&state.credentials, id) {
            return Err(ApiError::not_found("credential", id));
        }
        match state.credentials.get_mut(id) {
            Some(stored) => {
                stored.value.name = input.name.clone();
                stored.value.credential_type = input.credential_type.clone();
                stored.value.fields = input.fields.clone();
                Ok(Credential {
                    fields: BTreeMap::new(),
                    ..stored.value.clone()
                })
            },
            None => Err(ApiError::not_found("credential", id)),
        }
    }

    async fn delete_credential(&self, id: &str) -> ApiResult<()> {
        let mut state = self.lock();
        state.enter("delete_credential")?;
        if !live(&state.credentials, id) {
            return Err(ApiError::not_found("credential", id));
        }
        let lag = state.delete_lag;
        PlatformState::remove_stored(&mut state.credentials, id, lag);
        Ok(())
    }
}

#[async_trait]
impl ActionsApi for MemoryPlatform {
    async fn list_actions(&self) -> ApiResult<Vec<Action>> {
        let mut state = self.lock();
        state.enter("list_actions")?;
        Ok(listed(&state.actions).into_iter().map(strip_templates).collect())
    }

    async fn create_action(&self, input: &ActionInput) -> ApiResult<Action> {
        let mut state = self.lock();
        state.enter("create_action")?;
        if state.create_rejections > 0 {
            state.create_rejections -= 1;
            return Err(ApiError::new(
                400,
                format!("integration {} is not ready for actions", input.integration_id),
            ));
        }
        if !live(&state.integrations, &input.integration_id) {
            return Err(ApiError::new(
                400,
                format!("integration {} does not exist", input.integration_id),
            ));
        }
        let id = state.new_id("action");
        let action = action_from_input(id.clone(), input);
        let lag = state.read_lag;
        state.actions.insert(id, Stored::new(action.clone(), lag));
        Ok(strip_templates(action))
    }

    async fn get_action(&self, id: &str) -> ApiResult<Action> {
        let mut state = self.lock();
        state.enter("get_action")?;
        read_stored(&mut state.actions, "action", id).map(strip_templates)
    }

    async fn get_action_template(&self, id: &str, file: TemplateFile) -> ApiResult<String> {
        let mut state = self.lock();
        state.enter("get_action_template")?;
        match state.actions.get(id).filter(|s| !s.is_deleted()) {
            Some(stored) => Ok(template_of(&stored.value, file)),
            None => Err(ApiError::not_found(file.file_name(), id)),
        }
    }

    async fn update_action(&self, id: &str, update: &ActionUpdate) -> ApiResult<Action> {
        let mut state = self.lock();
        state.enter("update_action")?;
        if !live(&state.actions, id) {
            return Err(ApiError::not_found("action", id));
        }
        let mut version = state.actions.get(id).map(|s| s.value.version).unwrap_or(1);
        let result = state.take_version_conflict(&mut version, update.version);
        let Some(stored) = state.actions.get_mut(id) else {
            return Err(ApiError::not_found("action", id));
        };
        stored.value.version = version;
        result?;

        let action = &mut stored.value;
        if let Some(name) = &update.name {
            action.name = name.clone();
        }
        if let Some(category) = &update.category {
            action.category = category.clone();
        }
        action.config = update.config.clone();
        action.version += 1;
        Ok(strip_templates(action.clone()))
    }

    async fn delete_action(&self, id: &str) -> ApiResult<()> {
        let mut state = self.lock();
        state.enter("delete_action")?;
        if !live(&state.actions, id) {
            return Err(ApiError::not_found("action", id));
        }
        let lag = state.delete_lag;
        PlatformState::remove_stored(&mut state.actions, id, lag);
        Ok(())
    }
}

#[async_trait]
impl DraftsApi for MemoryPlatform {
    async fn list_drafts(&self) -> ApiResult<Vec<Action>> {
        let mut state = self.lock();
        state.enter("list_drafts")?;
        Ok(listed(&state.drafts).into_iter().map(strip_templates).collect())
    }

    async fn create_draft(&self, input: &ActionInput) -> ApiResult<Action> {
        let mut state = self.lock();
        state.enter("create_draft")?;
        if !live(&state.integrations, &input.integration_id) {
            return Err(ApiError::new(
                400,
                format!("integration {} does not exist", input.integration_id),
            ));
        }
        let id = state.new_id("draft");
        let draft = action_from_input(id.clone(), input);
        let lag = state.read_lag;
        state.drafts.insert(id, Stored::new(draft.clone(), lag));
        Ok(strip_templates(draft))
    }

    async fn get_draft(&self, id: &str) -> ApiResult<Action> {
        let mut state = self.lock();
        state.enter("get_draft")?;
        read_stored(&mut state.drafts, "draft", id).map(strip_templates)
    }

    async fn get_draft_template(&self, id: &str, file: TemplateFile) -> ApiResult<String> {
        let mut state = self.lock();
        state.enter("get_draft_template")?;
        match state.drafts.get(id).filter(|s| !s.is_deleted()) {
            Some(stored) => Ok(template_of(&stored.value, file)),
            None => Err(ApiError::not_found(file.file_name(), id)),
        }
    }

    async fn update_draft(&self, id: &str, update: &DraftUpdate) -> ApiResult<Action> {
        let mut state = self.lock();
        state.enter("update_draft")?;
        if !live(&state.drafts, id) {
            return Err(ApiError::not_found("draft", id));
        }
        match state.drafts.get_mut(id) {
            Some(stored) => {
                let draft = &mut stored.value;
                draft.name = update.name.clone();
                draft.category = update.category.clone();
                draft.secure = update.secure;
                draft.config = update.config.clone();
                draft.contract = update.contract.clone();
                draft.version += 1;
                Ok(strip_templates(draft.clone()))
            },
            None => Err(ApiError::not_found("draft", id)),
        }
    }

    async fn delete_draft(&self, id: &str) -> ApiResult<()> {
        let mut state = self.lock();
        state.enter("delete_draft")?;
        if !live(&state.drafts, id) {
            return Err(ApiError::not_found("draft", id));
        }
        let lag = state.delete_lag;
        PlatformState::remove_stored(&mut state.drafts, id, lag);
        Ok(())
    }
}

impl ClientFactory for MemoryPlatform {
    fn connect(&self, _config: &ProviderConfig) -> Result<ApiClients, ProviderError> {
        self.lock().connections += 1;
        let shared = Arc::new(self.clone());
        Ok(ApiClients {
            integrations: shared.clone(),
            credentials: shared.clone(),
            actions: shared.clone(),
            drafts: shared,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::models::ActionContract;

    fn action_input(integration_id: &str) -> ActionInput {
        let mut config = ActionConfig::default();
        config.request.request_template = Some("${input.rawRequest}".into());
        ActionInput {
            name: "Lookup".into(),
            category: "Custom".into(),
            integration_id: integration_id.into(),
            secure: false,
            config,
            contract: ActionContract::default(),
        }
    }

    async fn integration(platform: &MemoryPlatform, kind: &str) -> String {
        platform
            .create_integration(&CreateIntegrationRequest {
                integration_type: kind.into(),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_read_lag_hides_new_objects() {
        let platform = MemoryPlatform::new().with_read_lag(2);
        let id = integration(&platform, "purecloud-data-actions").await;

        assert!(platform.get_integration(&id).await.unwrap_err().is_not_found());
        assert!(platform.get_integration(&id).await.unwrap_err().is_not_found());
        assert_eq!(platform.get_integration(&id).await.unwrap().id, id);
        assert_eq!(platform.calls("get_integration"), 3);
    }

    #[tokio::test]
    async fn test_delete_lag_keeps_objects_visible() {
        let platform = MemoryPlatform::new().with_delete_lag(1);
        let credential = platform
            .create_credential(&CredentialInput {
                name: "creds".into(),
                credential_type: "basicAuth".into(),
                fields: BTreeMap::from([("password".to_string(), "secret".to_string())]),
            })
            .await
            .unwrap();
        assert!(credential.fields.is_empty());

        platform.delete_credential(&credential.id).await.unwrap();
        assert!(platform.get_credential(&credential.id).await.is_ok());
        assert!(platform
            .get_credential(&credential.id)
            .await
            .unwrap_err()
            .is_not_found());
        assert!(platform
            .delete_credential(&credential.id)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_version_conflicts() {
        let platform = MemoryPlatform::new();
        let id = integration(&platform, "purecloud-data-actions").await;
        let action = platform.create_action(&action_input(&id)).await.unwrap();

        platform.force_version_conflicts(1);
        let update = ActionUpdate {
            name: Some("Renamed".into()),
            category: None,
            version: action.version,
            config: ActionConfig::default(),
        };
        let err = platform.update_action(&action.id, &update).await.unwrap_err();
        assert!(err.is_version_mismatch());

        let current = platform.get_action(&action.id).await.unwrap();
        assert_eq!(current.version, 2);
        let updated = platform
            .update_action(
                &action.id,
                &ActionUpdate {
                    version: current.version,
                    ..update
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.version, 3);
    }

    #[tokio::test]
    async fn test_templates_served_separately() {
        let platform = MemoryPlatform::new();
        let id = integration(&platform, "purecloud-data-actions").await;
        let action = platform.create_action(&action_input(&id)).await.unwrap();

        let fetched = platform.get_action(&action.id).await.unwrap();
        assert!(fetched.config.request.request_template.is_none());
        assert_eq!(
            platform
                .get_action_template(&action.id, TemplateFile::Request)
                .await
                .unwrap(),
            "${input.rawRequest}"
        );
    }

    #[tokio::test]
    async fn test_create_rejections_and_injected_failures() {
        let platform = MemoryPlatform::new();
        let id = integration(&platform, "purecloud-data-actions").await;

        platform.reject_action_creates(1);
        assert!(platform
            .create_action(&action_input(&id))
            .await
            .unwrap_err()
            .is_bad_request());
        assert!(platform.create_action(&action_input(&id)).await.is_ok());

        platform.fail_next_call("list_actions", ApiError::new(503, "maintenance"));
        assert_eq!(platform.list_actions().await.unwrap_err().status, 503);
        assert_eq!(platform.list_actions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_custom_rest_integration_gets_custom_auth_action() {
        let platform = MemoryPlatform::new();
        let id = integration(&platform, CUSTOM_REST_ACTIONS_TYPE).await;
        let auth = platform.get_action(&custom_auth_action_id(&id)).await.unwrap();
        assert_eq!(auth.integration_id, id);
        assert_eq!(auth.version, 1);

        platform.delete_integration(&id).await.unwrap();
        assert!(platform.action(&custom_auth_action_id(&id)).is_none());
    }

    #[tokio::test]
    async fn test_connect_counts() {
        let platform = MemoryPlatform::new();
        let clients = platform.connect(&ProviderConfig::for_tests()).unwrap();
        clients
            .integrations
            .create_integration(&CreateIntegrationRequest {
                integration_type: "x".into(),
            })
            .await
            .unwrap();
        assert_eq!(platform.connections(), 1);
        assert_eq!(platform.calls("create_integration"), 1);
    }
}
