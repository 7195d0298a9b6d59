//! Installation repository access
//!
//! The installation repository is the desired-state store of a runtime. The
//! orchestrator only needs a small surface: read and write files relative to
//! the repository root, then commit and push everything in one go.

use async_trait::async_trait;
use git2::{
    Cred, ErrorCode, FetchOptions, IndexAddOption, PushOptions, RemoteCallbacks, Repository,
    Signature, build::RepoBuilder,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{RepoError, Result};

/// Desired-state store backed by a git repository
#[async_trait]
pub trait GitRepository: Send + Sync {
    /// Clone url of the repository
    fn url(&self) -> &str;

    /// Read a file; a missing file is [`RepoError::FileNotFound`]
    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    /// Create or overwrite a file
    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<()>;

    /// Remove a file or directory; removing a missing path is not an error
    async fn remove_path(&self, path: &str) -> Result<()>;

    async fn exists(&self, path: &str) -> Result<bool>;

    /// Entry names directly under `path`, sorted
    async fn list_dir(&self, path: &str) -> Result<Vec<String>>;

    /// Commit every pending change and push it; no-op when nothing changed
    async fn commit_and_push(&self, message: &str) -> Result<()>;
}

/// Read and deserialize a YAML file
pub async fn read_yaml<T: DeserializeOwned>(repo: &dyn GitRepository, path: &str) -> Result<T> {
    let bytes = repo.read_file(path).await?;
    Ok(serde_yaml::from_slice(&bytes)?)
}

/// Serialize and write a YAML file
pub async fn write_yaml<T: Serialize + Sync>(
    repo: &dyn GitRepository,
    path: &str,
    value: &T,
) -> Result<()> {
    let content = serde_yaml::to_string(value)?;
    repo.write_file(path, content.as_bytes()).await
}

/// Options for cloning the installation repository
#[derive(Debug, Clone)]
pub struct CloneOptions {
    pub url: String,

    /// Token used as the HTTPS password
    pub token: Option<String>,

    /// Branch to check out; the remote default when unset
    pub branch: Option<String>,

    /// Local checkout directory
    pub workdir: PathBuf,

    pub author_name: String,
    pub author_email: String,
}

impl CloneOptions {
    pub fn new(url: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            token: None,
            branch: None,
            workdir: workdir.into(),
            author_name: "rtctl".to_string(),
            author_email: "rtctl@users.noreply.rtctl.io".to_string(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }
}

/// libgit2-backed repository working on a local checkout
#[derive(Clone)]
pub struct Git2Repository {
    opts: Arc<CloneOptions>,
    lock: Arc<Mutex<()>>,
}

impl Git2Repository {
    /// Clone the repository, or open the checkout when it already exists.
    ///
    /// An empty remote repository is fine: the first commit creates the branch.
    pub async fn clone_or_open(opts: CloneOptions) -> Result<Self> {
        let opts = Arc::new(opts);
        let task_opts = opts.clone();
        tokio::task::spawn_blocking(move || clone_or_open_blocking(&task_opts)).await??;
        Ok(Self {
            opts,
            lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn workdir(&self) -> &Path {
        &self.opts.workdir
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(RepoError::Git {
                message: format!("path '{}' escapes the repository", path),
            });
        }
        Ok(self.opts.workdir.join(relative))
    }
}

fn callbacks(opts: &CloneOptions) -> RemoteCallbacks<'_> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |url, username_from_url, _allowed| match &opts.token {
        Some(token) => Cred::userpass_plaintext(username_from_url.unwrap_or("git"), token),
        None => {
            let config = git2::Config::open_default()?;
            Cred::credential_helper(&config, url, username_from_url)
        }
    });
    callbacks
}

fn map_git_error(url: &str, e: git2::Error) -> RepoError {
    match e.code() {
        ErrorCode::Auth | ErrorCode::Certificate => RepoError::AuthFailed {
            url: url.to_string(),
            message: e.message().to_string(),
        },
        ErrorCode::NotFastForward | ErrorCode::Conflict | ErrorCode::MergeConflict => {
            RepoError::PushRejected {
                url: url.to_string(),
                message: e.message().to_string(),
            }
        }
        ErrorCode::NotFound => RepoError::RepositoryNotFound {
            url: url.to_string(),
        },
        _ => {
            let message = e.message().to_string();
            let lower = message.to_lowercase();
            if lower.contains("authentication") || lower.contains("401") || lower.contains("403") {
                RepoError::AuthFailed {
                    url: url.to_string(),
                    message,
                }
            } else if lower.contains("not found") || lower.contains("404") {
                RepoError::RepositoryNotFound {
                    url: url.to_string(),
                }
            } else {
                RepoError::Git { message }
            }
        }
    }
}

fn clone_or_open_blocking(opts: &CloneOptions) -> Result<()> {
    if opts.workdir.join(".git").exists() {
        Repository::open(&opts.workdir).map_err(|e| map_git_error(&opts.url, e))?;
        tracing::debug!(path = %opts.workdir.display(), "using existing checkout");
        return Ok(());
    }

    std::fs::create_dir_all(&opts.workdir)?;

    let mut fetch_options = FetchOptions::new();
    fetch_options.remote_callbacks(callbacks(opts));

    let mut builder = RepoBuilder::new();
    builder.fetch_options(fetch_options);
    if let Some(branch) = &opts.branch {
        builder.branch(branch);
    }

    tracing::debug!(url = %opts.url, path = %opts.workdir.display(), "cloning repository");
    builder
        .clone(&opts.url, &opts.workdir)
        .map_err(|e| map_git_error(&opts.url, e))?;
    Ok(())
}

fn commit_and_push_blocking(opts: &CloneOptions, message: &str) -> Result<()> {
    let url = opts.url.as_str();
    let git = |e| map_git_error(url, e);
    let repo = Repository::open(&opts.workdir).map_err(git)?;

    let mut index = repo.index().map_err(git)?;
    index
        .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
        .map_err(git)?;
    index.update_all(["*"].iter(), None).map_err(git)?;
    index.write().map_err(git)?;
    let tree_id = index.write_tree().map_err(git)?;
    let tree = repo.find_tree(tree_id).map_err(git)?;

    let parent = match repo.head() {
        Ok(head) => Some(head.peel_to_commit().map_err(git)?),
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => None,
        Err(e) => return Err(git(e)),
    };
    if parent.as_ref().is_some_and(|p| p.tree_id() == tree_id) {
        tracing::debug!("nothing to commit");
        return Ok(());
    }

    let signature = Signature::now(&opts.author_name, &opts.author_email).map_err(git)?;
    let parents: Vec<_> = parent.iter().collect();
    repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
        .map_err(git)?;

    let head = repo.head().map_err(git)?;
    let refname = head.name().ok_or_else(|| RepoError::Git {
        message: "HEAD is not a valid reference".to_string(),
    })?;
    let refspec = format!("{refname}:{refname}");

    let mut rejected: Option<String> = None;
    {
        let mut cbs = callbacks(opts);
        cbs.push_update_reference(|_reference, status| {
            if let Some(status) = status {
                rejected = Some(status.to_string());
            }
            Ok(())
        });
        let mut push_options = PushOptions::new();
        push_options.remote_callbacks(cbs);

        let mut remote = repo.find_remote("origin").map_err(git)?;
        remote
            .push(&[refspec.as_str()], Some(&mut push_options))
            .map_err(git)?;
    }

    if let Some(message) = rejected {
        return Err(RepoError::PushRejected {
            url: url.to_string(),
            message,
        });
    }

    tracing::info!(%message, "pushed to installation repository");
    Ok(())
}

#[async_trait]
impl GitRepository for Git2Repository {
    fn url(&self) -> &str {
        &self.opts.url
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(RepoError::FileNotFound {
                path: path.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<()> {
        let full = self.resolve(path)?;
        let _guard = self.lock.lock().await;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, contents).await?;
        Ok(())
    }

    async fn remove_path(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        let _guard = self.lock.lock().await;
        let result = match tokio::fs::metadata(&full).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&full).await,
            Ok(_) => tokio::fs::remove_file(&full).await,
            Err(e) => Err(e),
        };
        match result {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full = self.resolve(path)?;
        Ok(tokio::fs::try_exists(&full).await?)
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<String>> {
        let full = self.resolve(path)?;
        let mut entries = match tokio::fs::read_dir(&full).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name != ".git" {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    async fn commit_and_push(&self, message: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let opts = self.opts.clone();
        let message = message.to_string();
        tokio::task::spawn_blocking(move || commit_and_push_blocking(&opts, &message)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn remote(temp: &TempDir) -> String {
        let path = temp.path().join("remote.git");
        Repository::init_bare(&path).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_write_commit_and_push_to_empty_remote() {
        let temp = TempDir::new().unwrap();
        let url = remote(&temp);
        let repo = Git2Repository::clone_or_open(CloneOptions::new(&url, temp.path().join("work")))
            .await
            .unwrap();

        repo.write_file("bootstrap/prod.yaml", b"kind: Runtime\n").await.unwrap();
        repo.commit_and_push("Persisted runtime data").await.unwrap();

        let bare = Repository::open_bare(&url).unwrap();
        let mut found = false;
        for reference in bare.references().unwrap() {
            let commit = reference.unwrap().peel_to_commit().unwrap();
            assert_eq!(commit.message(), Some("Persisted runtime data"));
            found |= commit.tree().unwrap().get_path(Path::new("bootstrap/prod.yaml")).is_ok();
        }
        assert!(found, "pushed commit should contain the file");
    }

    #[tokio::test]
    async fn test_commit_without_changes_is_noop() {
        let temp = TempDir::new().unwrap();
        let url = remote(&temp);
        let repo = Git2Repository::clone_or_open(CloneOptions::new(&url, temp.path().join("work")))
            .await
            .unwrap();

        repo.write_file("a.txt", b"a").await.unwrap();
        repo.commit_and_push("first").await.unwrap();
        repo.commit_and_push("second").await.unwrap();

        let local = Repository::open(repo.workdir()).unwrap();
        let head = local.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(head.message(), Some("first"));
    }

    #[tokio::test]
    async fn test_read_missing_file_is_not_found() {
        let temp = TempDir::new().unwrap();
        let url = remote(&temp);
        let repo = Git2Repository::clone_or_open(CloneOptions::new(&url, temp.path().join("work")))
            .await
            .unwrap();

        let err = repo.read_file("bootstrap/missing.yaml").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_remove_and_list() {
        let temp = TempDir::new().unwrap();
        let url = remote(&temp);
        let repo = Git2Repository::clone_or_open(CloneOptions::new(&url, temp.path().join("work")))
            .await
            .unwrap();

        repo.write_file("apps/events/prod/config.json", b"{}").await.unwrap();
        repo.write_file("apps/rollouts/prod/config.json", b"{}").await.unwrap();
        assert_eq!(repo.list_dir("apps").await.unwrap(), vec!["events", "rollouts"]);

        repo.remove_path("apps/events").await.unwrap();
        repo.remove_path("apps/never-existed").await.unwrap();
        assert_eq!(repo.list_dir("apps").await.unwrap(), vec!["rollouts"]);
        assert!(repo.list_dir("nothing-here").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_paths_cannot_escape_checkout() {
        let temp = TempDir::new().unwrap();
        let url = remote(&temp);
        let repo = Git2Repository::clone_or_open(CloneOptions::new(&url, temp.path().join("work")))
            .await
            .unwrap();

        assert!(repo.write_file("../outside.txt", b"x").await.is_err());
        assert!(repo.read_file("/etc/passwd").await.is_err());
    }

    #[test]
    fn test_error_mapping() {
        let auth = git2::Error::new(ErrorCode::Auth, git2::ErrorClass::Http, "denied");
        assert!(map_git_error("u", auth).is_auth());

        let nff = git2::Error::new(ErrorCode::NotFastForward, git2::ErrorClass::Reference, "nff");
        assert!(map_git_error("u", nff).is_conflict());

        let missing = git2::Error::new(
            ErrorCode::GenericError,
            git2::ErrorClass::Http,
            "unexpected http status code: 404",
        );
        assert!(map_git_error("u", missing).is_not_found());
    }
}
