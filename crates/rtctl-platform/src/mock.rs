//! In-memory control plane for testing
//!
//! Runtimes live in memory. Every operation can be made to fail or to hang,
//! and runtimes can be scripted to complete their installation after a given
//! number of status polls.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::client::ControlPlane;
use crate::error::{PlatformError, Result};
use crate::model::{
    Component, CreatedRuntime, GitIntegrationArgs, InstallationStatus, Runtime,
    RuntimeInstallationArgs,
};

/// Control plane operations, for failure injection and call assertions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    CreateRuntime,
    GetRuntime,
    ListRuntimes,
    DeleteRuntime,
    ListComponents,
    SharedConfigRepo,
    AddGitIntegration,
    RegisterGitIntegration,
    RemoveGitIntegrations,
    RemoveFromSharedConfig,
}

struct MockState {
    runtimes: HashMap<String, Runtime>,
    components: Vec<Component>,
    shared_config_repo: Option<String>,
    /// Status polls before a created runtime reports completed; `None` = never
    complete_after: Option<usize>,
    status_polls: HashMap<String, usize>,
    /// Remaining failures per operation; `usize::MAX` = always
    failures: HashMap<Op, usize>,
    hanging: HashSet<Op>,
    git_integrations: HashMap<String, Vec<GitIntegrationArgs>>,
    registered: Vec<String>,
    removed_from_shared_config: Vec<String>,
    calls: Vec<Op>,
    last_args: Option<RuntimeInstallationArgs>,
}

/// In-memory control plane
#[derive(Clone)]
pub struct MockControlPlane {
    state: Arc<RwLock<MockState>>,
}

impl MockControlPlane {
    /// Empty control plane; created runtimes complete on the first poll
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MockState {
                runtimes: HashMap::new(),
                components: Vec::new(),
                shared_config_repo: None,
                complete_after: Some(0),
                status_polls: HashMap::new(),
                failures: HashMap::new(),
                hanging: HashSet::new(),
                git_integrations: HashMap::new(),
                registered: Vec::new(),
                removed_from_shared_config: Vec::new(),
                calls: Vec::new(),
                last_args: None,
            })),
        }
    }

    /// Pre-register a runtime
    pub fn with_runtime(self, runtime: Runtime) -> Self {
        self.state
            .write()
            .unwrap()
            .runtimes
            .insert(runtime.name.clone(), runtime);
        self
    }

    pub fn with_components(self, components: Vec<Component>) -> Self {
        self.state.write().unwrap().components = components;
        self
    }

    pub fn with_shared_config_repo(self, repo: &str) -> Self {
        self.state.write().unwrap().shared_config_repo = Some(repo.to_string());
        self
    }

    /// Report `IN_PROGRESS` for the first `polls` status polls, then `COMPLETED`
    pub fn complete_after(self, polls: usize) -> Self {
        self.state.write().unwrap().complete_after = Some(polls);
        self
    }

    /// Never report `COMPLETED`
    pub fn never_complete(self) -> Self {
        self.state.write().unwrap().complete_after = None;
        self
    }

    /// Fail `op` on every call
    pub fn failing(self, op: Op) -> Self {
        self.state.write().unwrap().failures.insert(op, usize::MAX);
        self
    }

    /// Fail `op` for its next `times` calls
    pub fn failing_times(self, op: Op, times: usize) -> Self {
        self.state.write().unwrap().failures.insert(op, times);
        self
    }

    /// Never return from `op`
    pub fn hanging(self, op: Op) -> Self {
        self.state.write().unwrap().hanging.insert(op);
        self
    }

    /// Every call made, in order
    pub fn calls(&self) -> Vec<Op> {
        self.state.read().unwrap().calls.clone()
    }

    pub fn call_count(&self, op: Op) -> usize {
        self.state.read().unwrap().calls.iter().filter(|c| **c == op).count()
    }

    pub fn has_runtime(&self, name: &str) -> bool {
        self.state.read().unwrap().runtimes.contains_key(name)
    }

    pub fn git_integrations(&self, runtime: &str) -> Vec<GitIntegrationArgs> {
        self.state
            .read()
            .unwrap()
            .git_integrations
            .get(runtime)
            .cloned()
            .unwrap_or_default()
    }

    pub fn registered_tokens(&self) -> Vec<String> {
        self.state.read().unwrap().registered.clone()
    }

    /// Runtimes removed from the shared configuration repository, in order
    pub fn removed_from_shared_config(&self) -> Vec<String> {
        self.state.read().unwrap().removed_from_shared_config.clone()
    }

    /// Arguments of the last runtime creation
    pub fn last_installation_args(&self) -> Option<RuntimeInstallationArgs> {
        self.state.read().unwrap().last_args.clone()
    }

    /// Record the call and apply injected failures
    async fn enter(&self, op: Op) -> Result<()> {
        let hang = {
            let mut state = self.state.write().unwrap();
            state.calls.push(op);
            if let Some(remaining) = state.failures.get_mut(&op) {
                if *remaining > 0 {
                    if *remaining != usize::MAX {
                        *remaining -= 1;
                    }
                    return Err(PlatformError::Status {
                        status: 500,
                        message: format!("injected {:?} failure", op),
                    });
                }
            }
            state.hanging.contains(&op)
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

impl Default for MockControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn create_runtime(&self, args: &RuntimeInstallationArgs) -> Result<CreatedRuntime> {
        self.enter(Op::CreateRuntime).await?;
        let mut state = self.state.write().unwrap();
        state.last_args = Some(args.clone());
        if state.runtimes.contains_key(&args.runtime_name) && !args.recover {
            return Err(PlatformError::AlreadyExists {
                kind: "runtime".to_string(),
                name: args.runtime_name.clone(),
            });
        }
        state.runtimes.insert(
            args.runtime_name.clone(),
            Runtime {
                name: args.runtime_name.clone(),
                namespace: Some(args.runtime_name.clone()),
                cluster: Some(args.cluster.clone()),
                runtime_version: Some(args.runtime_version.clone()),
                installation_status: InstallationStatus::Pending,
                ingress_host: args.ingress_host.clone(),
                ingress_class: args.ingress_class.clone(),
                repo: Some(args.repo.clone()),
                ..Default::default()
            },
        );
        state.status_polls.insert(args.runtime_name.clone(), 0);
        Ok(CreatedRuntime {
            new_access_token: format!("{}-token", args.runtime_name),
        })
    }

    async fn get_runtime(&self, name: &str) -> Result<Runtime> {
        self.enter(Op::GetRuntime).await?;
        let mut state = self.state.write().unwrap();
        let complete_after = state.complete_after;
        let polls = state.status_polls.get_mut(name).map(|p| {
            *p += 1;
            *p
        });
        let runtime = state
            .runtimes
            .get_mut(name)
            .ok_or_else(|| PlatformError::not_found("runtime", name))?;

        if let Some(polls) = polls {
            runtime.installation_status = match complete_after {
                Some(after) if polls > after => InstallationStatus::Completed,
                _ => InstallationStatus::InProgress,
            };
        }
        Ok(runtime.clone())
    }

    async fn list_runtimes(&self) -> Result<Vec<Runtime>> {
        self.enter(Op::ListRuntimes).await?;
        let state = self.state.read().unwrap();
        let mut runtimes: Vec<_> = state.runtimes.values().cloned().collect();
        runtimes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(runtimes)
    }

    async fn delete_runtime(&self, name: &str) -> Result<()> {
        self.enter(Op::DeleteRuntime).await?;
        let mut state = self.state.write().unwrap();
        state.status_polls.remove(name);
        state
            .runtimes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| PlatformError::not_found("runtime", name))
    }

    async fn list_components(&self, _runtime: &str) -> Result<Vec<Component>> {
        self.enter(Op::ListComponents).await?;
        Ok(self.state.read().unwrap().components.clone())
    }

    async fn shared_config_repo(&self) -> Result<Option<String>> {
        self.enter(Op::SharedConfigRepo).await?;
        Ok(self.state.read().unwrap().shared_config_repo.clone())
    }

    async fn add_git_integration(&self, runtime: &str, args: &GitIntegrationArgs) -> Result<()> {
        self.enter(Op::AddGitIntegration).await?;
        let mut state = self.state.write().unwrap();
        let integrations = state.git_integrations.entry(runtime.to_string()).or_default();
        if integrations.iter().any(|g| g.name == args.name) {
            return Err(PlatformError::AlreadyExists {
                kind: "git integration".to_string(),
                name: args.name.clone().unwrap_or_else(|| "default".to_string()),
            });
        }
        integrations.push(args.clone());
        Ok(())
    }

    async fn register_git_integration(&self, _runtime: &str, token: &str) -> Result<()> {
        self.enter(Op::RegisterGitIntegration).await?;
        self.state.write().unwrap().registered.push(token.to_string());
        Ok(())
    }

    async fn remove_git_integrations(&self, runtime: &str) -> Result<()> {
        self.enter(Op::RemoveGitIntegrations).await?;
        self.state.write().unwrap().git_integrations.remove(runtime);
        Ok(())
    }

    async fn remove_runtime_from_shared_config(&self, runtime: &str) -> Result<()> {
        self.enter(Op::RemoveFromSharedConfig).await?;
        self.state
            .write()
            .unwrap()
            .removed_from_shared_config
            .push(runtime.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(name: &str) -> RuntimeInstallationArgs {
        RuntimeInstallationArgs {
            runtime_name: name.to_string(),
            cluster: "https://127.0.0.1:6443".to_string(),
            runtime_version: "0.1.5".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_runtime_completes_after_polls() {
        let cp = MockControlPlane::new().complete_after(2);
        cp.create_runtime(&args("prod")).await.unwrap();

        let statuses: Vec<_> = futures_statuses(&cp, 3).await;
        assert_eq!(
            statuses,
            vec![
                InstallationStatus::InProgress,
                InstallationStatus::InProgress,
                InstallationStatus::Completed
            ]
        );
    }

    async fn futures_statuses(cp: &MockControlPlane, n: usize) -> Vec<InstallationStatus> {
        let mut out = Vec::new();
        for _ in 0..n {
            out.push(cp.get_runtime("prod").await.unwrap().installation_status);
        }
        out
    }

    #[tokio::test]
    async fn test_duplicate_runtime() {
        let cp = MockControlPlane::new();
        cp.create_runtime(&args("prod")).await.unwrap();
        let err = cp.create_runtime(&args("prod")).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_failing_times() {
        let cp = MockControlPlane::new().failing_times(Op::AddGitIntegration, 2);
        let git = GitIntegrationArgs::default();
        assert!(cp.add_git_integration("prod", &git).await.is_err());
        assert!(cp.add_git_integration("prod", &git).await.is_err());
        assert!(cp.add_git_integration("prod", &git).await.is_ok());
        assert_eq!(cp.call_count(Op::AddGitIntegration), 3);
    }

    #[tokio::test]
    async fn test_delete_unknown_runtime() {
        let cp = MockControlPlane::new();
        assert!(cp.delete_runtime("ghost").await.unwrap_err().is_not_found());
    }
}
