//! Advisory progress display
//!
//! While the installer waits for a runtime to converge, a refresher task
//! keeps a snapshot of the runtime's component statuses and an optional
//! printer task renders it. The refresher is the only writer; readers get
//! immutable snapshots through a watch channel. Both tasks run on a child of
//! the operation's cancellation token, never fail the operation, and stop
//! when the monitor is stopped or dropped.

use console::{Term, style};
use rtctl_platform::{Component, ControlPlane};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Snapshot of component statuses
pub type ComponentSnapshot = Arc<Vec<Component>>;

/// Read side of the component status cache
#[derive(Clone)]
pub struct StatusCache {
    rx: watch::Receiver<ComponentSnapshot>,
}

impl StatusCache {
    /// Latest snapshot
    pub fn cached(&self) -> ComponentSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next snapshot; `None` once the refresher has stopped
    pub async fn changed(&mut self) -> Option<ComponentSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

/// Background status refresher, and optionally a printer
pub struct ProgressMonitor {
    cancel: CancellationToken,
    cache: StatusCache,
    tasks: Vec<JoinHandle<()>>,
}

impl ProgressMonitor {
    /// Start refreshing the components of `runtime` every `every`
    pub fn start(
        platform: Arc<dyn ControlPlane>,
        runtime: &str,
        every: Duration,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let (tx, rx) = watch::channel(ComponentSnapshot::default());
        let refresher = tokio::spawn(refresh(platform, runtime.to_string(), every, tx, cancel.clone()));

        Self {
            cancel,
            cache: StatusCache { rx },
            tasks: vec![refresher],
        }
    }

    /// Also render every snapshot to stderr
    pub fn with_printer(mut self) -> Self {
        let printer = tokio::spawn(print(self.cache.clone(), self.cancel.clone()));
        self.tasks.push(printer);
        self
    }

    pub fn cache(&self) -> StatusCache {
        self.cache.clone()
    }

    /// Stop the background tasks and wait for them to exit
    pub async fn stop(mut self) {
        self.cancel.cancel();
        let tasks = std::mem::take(&mut self.tasks);
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                tracing::debug!(error = %e, "progress task ended abnormally");
            }
        }
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn refresh(
    platform: Arc<dyn ControlPlane>,
    runtime: String,
    every: Duration,
    tx: watch::Sender<ComponentSnapshot>,
    cancel: CancellationToken,
) {
    if every.is_zero() {
        tracing::warn!(runtime = %runtime, "status refresh interval is zero, not refreshing components");
        return;
    }

    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let components = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            components = platform.list_components(&runtime) => components,
        };

        match components {
            Ok(components) => {
                tx.send_replace(Arc::new(components));
            }
            Err(e) => tracing::debug!(runtime = %runtime, error = %e, "failed to refresh components state"),
        }
    }
}

async fn print(mut cache: StatusCache, cancel: CancellationToken) {
    let term = Term::stderr();
    let mut printed = 0;

    loop {
        let snapshot = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            snapshot = cache.changed() => match snapshot {
                Some(snapshot) => snapshot,
                None => return,
            },
        };

        if printed > 0 {
            let _ = term.clear_last_lines(printed);
        }
        let lines = render_components(&snapshot);
        for line in &lines {
            let _ = term.write_line(line);
        }
        printed = lines.len();
    }
}

/// Render a component status table, header first
pub fn render_components(components: &[Component]) -> Vec<String> {
    let mut lines = Vec::with_capacity(components.len() + 1);
    lines.push(format!(
        "{:<32} {:<14} {:<12} {:<10} {}",
        style("COMPONENT").bold(),
        style("HEALTH STATUS").bold(),
        style("SYNC STATUS").bold(),
        style("VERSION").bold(),
        style("ERRORS").bold()
    ));

    for c in components {
        let health = c.health_status.as_deref().unwrap_or("N/A");
        let health = if c.is_healthy() {
            style(health).green()
        } else {
            style(health).yellow()
        };
        lines.push(format!(
            "{:<32} {:<14} {:<12} {:<10} {}",
            c.name,
            health,
            c.sync_status.as_deref().unwrap_or("N/A"),
            c.version.as_deref().unwrap_or("N/A"),
            c.errors.len()
        ));
    }
    lines
}
