//! In-memory repository for testing
//!
//! Keeps a working tree and the last pushed tree in memory, useful for
//! orchestrator tests without a git remote.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::error::{RepoError, Result};
use crate::git::GitRepository;

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone)]
pub struct OperationCounts {
    pub reads: usize,
    pub writes: usize,
    pub removes: usize,
    pub pushes: usize,
}

#[derive(Debug, Default)]
struct MemoryState {
    worktree: BTreeMap<String, Vec<u8>>,
    pushed: BTreeMap<String, Vec<u8>>,
    commits: Vec<String>,
    failing_pushes: usize,
    ops: OperationCounts,
}

/// In-memory git repository
#[derive(Clone)]
pub struct MemoryRepository {
    url: String,
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryRepository {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            state: Arc::new(RwLock::new(MemoryState::default())),
        }
    }

    /// Create with files already pushed
    pub fn with_files<I, P, C>(url: impl Into<String>, files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<Vec<u8>>,
    {
        let repo = Self::new(url);
        {
            let mut state = repo.state.write().unwrap();
            for (path, content) in files {
                let (path, content) = (path.into(), content.into());
                state.worktree.insert(path.clone(), content.clone());
                state.pushed.insert(path, content);
            }
        }
        repo
    }

    /// Make the next `count` pushes fail with a rejected push
    pub fn fail_pushes(&self, count: usize) {
        self.state.write().unwrap().failing_pushes = count;
    }

    pub fn operation_counts(&self) -> OperationCounts {
        self.state.read().unwrap().ops.clone()
    }

    /// Commit messages, oldest first
    pub fn commits(&self) -> Vec<String> {
        self.state.read().unwrap().commits.clone()
    }

    /// Content of a file as last pushed
    pub fn pushed_file(&self, path: &str) -> Option<String> {
        self.state
            .read()
            .unwrap()
            .pushed
            .get(path)
            .map(|c| String::from_utf8_lossy(c).into_owned())
    }

    /// Paths present in the last pushed tree
    pub fn pushed_paths(&self) -> Vec<String> {
        self.state.read().unwrap().pushed.keys().cloned().collect()
    }
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

fn under(dir: &str, path: &str) -> bool {
    dir.is_empty() || path == dir || path.starts_with(&format!("{dir}/"))
}

#[async_trait]
impl GitRepository for MemoryRepository {
    fn url(&self) -> &str {
        &self.url
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let path = normalize(path);
        let mut state = self.state.write().unwrap();
        state.ops.reads += 1;
        state
            .worktree
            .get(&path)
            .cloned()
            .ok_or(RepoError::FileNotFound { path })
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.ops.writes += 1;
        state.worktree.insert(normalize(path), contents.to_vec());
        Ok(())
    }

    async fn remove_path(&self, path: &str) -> Result<()> {
        let path = normalize(path);
        let mut state = self.state.write().unwrap();
        state.ops.removes += 1;
        state.worktree.retain(|p, _| !under(&path, p));
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let path = normalize(path);
        let state = self.state.read().unwrap();
        Ok(state.worktree.keys().any(|p| under(&path, p)))
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<String>> {
        let dir = normalize(path);
        let state = self.state.read().unwrap();
        let mut names: Vec<String> = state
            .worktree
            .keys()
            .filter(|p| under(&dir, p) && p.as_str() != dir)
            .filter_map(|p| {
                let rest = if dir.is_empty() { p.as_str() } else { &p[dir.len() + 1..] };
                rest.split('/').next().map(str::to_string)
            })
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn commit_and_push(&self, message: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.ops.pushes += 1;
        if state.failing_pushes > 0 {
            state.failing_pushes -= 1;
            return Err(RepoError::PushRejected {
                url: self.url.clone(),
                message: "injected failure".to_string(),
            });
        }
        if state.worktree == state.pushed {
            return Ok(());
        }
        state.pushed = state.worktree.clone();
        state.commits.push(message.to_string());
        Ok(())
    }
}
