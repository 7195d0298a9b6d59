//! rtctl Platform - Control plane client for rtctl
//!
//! The control plane tracks runtimes, their components and their git
//! integrations. This crate provides the [`ControlPlane`] capability, a REST
//! implementation and an in-memory one for tests.

pub mod client;
pub mod error;
pub mod mock;
pub mod model;

pub use client::{ControlPlane, HttpControlPlane};
pub use error::{PlatformError, Result};
pub use mock::{MockControlPlane, Op};
pub use model::{
    Component, CreatedRuntime, GitIntegrationArgs, InstallationStatus, Runtime,
    RuntimeInstallationArgs,
};
