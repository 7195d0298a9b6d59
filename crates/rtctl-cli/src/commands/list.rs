//! List command - list runtimes known to the platform

use indicatif::{ProgressBar, ProgressStyle};
use rtctl_platform::ControlPlane;
use std::time::Duration;

use super::Session;
use crate::display;
use crate::error::{CliError, Result};

/// Run the list command
pub async fn run(session: &Session, output_json: bool) -> Result<()> {
    let platform = session.platform()?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} {msg}")
            .map_err(|e| CliError::other(e.to_string()))?,
    );
    spinner.set_message("Fetching runtimes");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let runtimes = tokio::select! {
        biased;
        _ = session.cancel.cancelled() => Err(CliError::Cancelled),
        runtimes = platform.list_runtimes() => runtimes.map_err(CliError::from),
    };
    spinner.finish_and_clear();
    let runtimes = runtimes?;

    if output_json {
        println!("{}", serde_json::to_string_pretty(&runtimes)?);
        return Ok(());
    }

    if runtimes.is_empty() {
        println!("No runtimes were found");
        return Ok(());
    }

    display::print_runtimes(&runtimes);
    Ok(())
}
