//! In-memory fake for the CI platform trait (testing only)
//!
//! `MemoryCiPlatform` keeps environments, variables and team grants in maps
//! keyed the way GitHub keys them, so writing the same thing twice cannot
//! produce a duplicate. Creates are counted separately from updates to let
//! tests assert that a second run only converges.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::ci_traits::*;
use crate::error::CiError;

/// Kinds of calls the fake can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CiCallKind {
    UpsertEnvironment,
    SetEnvironmentVariable,
    SetRepositoryVariable,
    GrantTeamPermission,
    TeamId,
}

/// Stored state of one environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeEnvironment {
    pub protection: Option<ProtectionRules>,
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct State {
    environments: BTreeMap<(RepoRef, String), FakeEnvironment>,
    repository_variables: BTreeMap<RepoRef, BTreeMap<String, String>>,
    grants: BTreeMap<(RepoRef, String), TeamPermission>,
    teams: HashMap<(String, String), u64>,
    calls: Vec<CiCallKind>,
    creates: usize,
    fail_on: Option<CiCallKind>,
}

/// In-memory CI platform.
#[derive(Debug, Default)]
pub struct MemoryCiPlatform {
    state: Mutex<State>,
}

impl MemoryCiPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a team so `team_id` and `grant_team_permission` can find it.
    pub fn with_team(self, org: &str, slug: &str, id: u64) -> Self {
        self.state
            .lock()
            .unwrap()
            .teams
            .insert((org.to_string(), slug.to_string()), id);
        self
    }

    /// Fail the next call of `kind` with an HTTP 500.
    pub fn fail_next(&self, kind: CiCallKind) {
        self.state.lock().unwrap().fail_on = Some(kind);
    }

    pub fn environment(&self, repo: &RepoRef, name: &str) -> Option<FakeEnvironment> {
        let state = self.state.lock().unwrap();
        state
            .environments
            .get(&(repo.clone(), name.to_string()))
            .cloned()
    }

    pub fn environment_names(&self, repo: &RepoRef) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .environments
            .keys()
            .filter(|(r, _)| r == repo)
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn repository_variables(&self, repo: &RepoRef) -> BTreeMap<String, String> {
        let state = self.state.lock().unwrap();
        state
            .repository_variables
            .get(repo)
            .cloned()
            .unwrap_or_default()
    }

    pub fn team_permission(&self, repo: &RepoRef, slug: &str) -> Option<TeamPermission> {
        let state = self.state.lock().unwrap();
        state.grants.get(&(repo.clone(), slug.to_string())).copied()
    }

    /// Number of objects (environments, variables, grants) created, as
    /// opposed to updated in place.
    pub fn creates(&self) -> usize {
        self.state.lock().unwrap().creates
    }

    pub fn calls(&self) -> Vec<CiCallKind> {
        self.state.lock().unwrap().calls.clone()
    }

    fn enter(&self, kind: CiCallKind) -> Result<std::sync::MutexGuard<'_, State>, CiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(kind);
        if state.fail_on == Some(kind) {
            state.fail_on = None;
            return Err(CiError::Status {
                method: "FAKE".to_string(),
                path: format!("{kind:?}"),
                status: 500,
                body: "injected failure".to_string(),
            });
        }
        Ok(state)
    }
}

#[async_trait]
impl CiPlatform for MemoryCiPlatform {
    async fn upsert_environment(&self, repo: &RepoRef, spec: &EnvironmentSpec) -> CiResult<()> {
        let mut state = self.enter(CiCallKind::UpsertEnvironment)?;
        let key = (repo.clone(), spec.name.clone());
        match state.environments.get_mut(&key) {
            Some(existing) => {
                if spec.protection.is_some() {
                    existing.protection = spec.protection.clone();
                }
            }
            None => {
                state.environments.insert(
                    key,
                    FakeEnvironment {
                        protection: spec.protection.clone(),
                        variables: BTreeMap::new(),
                    },
                );
                state.creates += 1;
            }
        }
        Ok(())
    }

    async fn set_environment_variable(
        &self,
        repo: &RepoRef,
        environment: &str,
        name: &str,
        value: &str,
    ) -> CiResult<()> {
        let mut state = self.enter(CiCallKind::SetEnvironmentVariable)?;
        let env = state
            .environments
            .get_mut(&(repo.clone(), environment.to_string()))
            .ok_or_else(|| CiError::NotFound(format!("environment {environment}")))?;
        let created = env
            .variables
            .insert(name.to_string(), value.to_string())
            .is_none();
        if created {
            state.creates += 1;
        }
        Ok(())
    }

    async fn set_repository_variable(
        &self,
        repo: &RepoRef,
        name: &str,
        value: &str,
    ) -> CiResult<()> {
        let mut state = self.enter(CiCallKind::SetRepositoryVariable)?;
        let created = state
            .repository_variables
            .entry(repo.clone())
            .or_default()
            .insert(name.to_string(), value.to_string())
            .is_none();
        if created {
            state.creates += 1;
        }
        Ok(())
    }

    async fn grant_team_permission(
        &self,
        repo: &RepoRef,
        team_slug: &str,
        permission: TeamPermission,
    ) -> CiResult<()> {
        let mut state = self.enter(CiCallKind::GrantTeamPermission)?;
        if !state
            .teams
            .contains_key(&(repo.owner.clone(), team_slug.to_string()))
        {
            return Err(CiError::NotFound(format!(
                "team {}/{}",
                repo.owner, team_slug
            )));
        }
        let created = state
            .grants
            .insert((repo.clone(), team_slug.to_string()), permission)
            .is_none();
        if created {
            state.creates += 1;
        }
        Ok(())
    }

    async fn team_id(&self, org: &str, team_slug: &str) -> CiResult<u64> {
        let state = self.enter(CiCallKind::TeamId)?;
        state
            .teams
            .get(&(org.to_string(), team_slug.to_string()))
            .copied()
            .ok_or_else(|| CiError::NotFound(format!("team {org}/{team_slug}")))
    }
}
