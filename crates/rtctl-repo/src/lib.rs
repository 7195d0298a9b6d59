//! rtctl Repo - Installation repository and definition registry clients
//!
//! This crate provides:
//! - **GitRepository**: the desired-state store, backed by libgit2 or memory
//! - **DefinitionRegistry**: where runtime definitions are downloaded from

pub mod error;
pub mod git;
pub mod memory;
pub mod registry;

pub use error::{RepoError, Result};
pub use git::{CloneOptions, Git2Repository, GitRepository, read_yaml, write_yaml};
pub use memory::{MemoryRepository, OperationCounts};
pub use registry::{DefinitionRegistry, HttpRegistry, StaticRegistry};
