//! Shared operation context

use rtctl_core::{Settings, Summary};
use rtctl_kube::Cluster;
use rtctl_platform::ControlPlane;
use rtctl_repo::DefinitionRegistry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::emitter::ManifestEmitter;
use crate::status::ProgressMonitor;

/// Collaborators and settings of one top-level operation.
///
/// Cloning is cheap; every clone shares the same cancellation token and
/// summary.
#[derive(Clone)]
pub struct OperationContext {
    pub cluster: Arc<dyn Cluster>,
    pub platform: Arc<dyn ControlPlane>,
    pub emitter: Arc<dyn ManifestEmitter>,
    pub registry: Arc<dyn DefinitionRegistry>,
    pub settings: Arc<Settings>,
    pub cancel: CancellationToken,
    pub summary: Summary,
    /// Print component statuses while waiting
    pub show_progress: bool,
}

impl OperationContext {
    /// Start the advisory progress display for `runtime`, if enabled
    pub fn progress(&self, runtime: &str) -> Option<ProgressMonitor> {
        self.show_progress.then(|| {
            ProgressMonitor::start(
                self.platform.clone(),
                runtime,
                self.settings.wait.status_refresh,
                &self.cancel,
            )
            .with_printer()
        })
    }
}
